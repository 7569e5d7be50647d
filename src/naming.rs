//! Workflow name resolution
//!
//! Turns the two URL path segments of a workflow request into the canonical
//! compound identifier the engine registers workflows under, e.g.
//! `user-service` + `create-order` becomes `UserServiceCreateOrder`.
//!
//! Resolution never fails. Whether the result names a real workflow is for
//! the engine to decide at submission time.

use crate::types::WorkflowIdentifier;

/// Build the canonical workflow identifier from the two path segments
pub fn resolve(workflow_type: &str, workflow_name: &str) -> WorkflowIdentifier {
    let mut name = to_camel_case(workflow_type);
    name.push_str(&to_camel_case(workflow_name));
    WorkflowIdentifier::new(name)
}

/// Convert a snake, kebab or space separated segment to a capitalized compound.
///
/// Words that contain no lower-case letters are title-cased, so `GET_ALL`
/// becomes `GetAll`. Mixed-case words keep their inner casing.
///
/// Single connectors between words are dropped. Leading and trailing
/// connectors are kept, and a run of connectors between two words keeps all
/// but its last, so `_complex__case_` becomes `_Complex_Case_`.
pub fn to_camel_case(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    let mut leading = true;

    while !rest.is_empty() {
        let word_start = rest.find(|c: char| !is_connector(c)).unwrap_or(rest.len());
        let (connectors, tail) = rest.split_at(word_start);

        if leading || tail.is_empty() {
            out.push_str(connectors);
        } else if let Some((last, _)) = connectors.char_indices().last() {
            out.push_str(&connectors[..last]);
        }

        let word_end = tail.find(is_connector).unwrap_or(tail.len());
        let (word, after) = tail.split_at(word_end);
        push_word(&mut out, word);

        rest = after;
        leading = false;
    }

    out
}

fn push_word(out: &mut String, word: &str) {
    let shouting = !word.chars().any(char::is_lowercase);
    let mut chars = word.chars();

    if let Some(first) = chars.next() {
        out.extend(first.to_uppercase());
    }
    for c in chars {
        if shouting {
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
}

fn is_connector(c: char) -> bool {
    c == '-' || c == '_' || c.is_whitespace()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_kebab_segments() {
        let id = resolve("user-service", "create-order");
        assert_eq!(id.as_str(), "UserServiceCreateOrder");
    }

    #[test]
    fn test_resolve_simple_segments() {
        assert_eq!(resolve("order", "create").as_str(), "OrderCreate");
    }

    #[test]
    fn test_resolve_is_deterministic() {
        let inputs = [
            ("user-service", "create-order"),
            ("", ""),
            ("--", "__"),
            ("Ünïcode", "naïve_name"),
        ];
        for (first, second) in inputs {
            assert_eq!(resolve(first, second), resolve(first, second));
        }
    }

    #[test]
    fn test_snake_and_space_connectors() {
        assert_eq!(to_camel_case("some_words"), "SomeWords");
        assert_eq!(to_camel_case("some words"), "SomeWords");
        assert_eq!(to_camel_case("http_server"), "HttpServer");
    }

    #[test]
    fn test_shouting_words_are_title_cased() {
        assert_eq!(to_camel_case("GOLANG_IS_GREAT"), "GolangIsGreat");
        assert_eq!(resolve("http_server", "GET_ALL").as_str(), "HttpServerGetAll");
    }

    #[test]
    fn test_mixed_case_is_preserved() {
        assert_eq!(to_camel_case("userService"), "UserService");
        assert_eq!(to_camel_case("HTTPServer"), "HTTPServer");
    }

    #[test]
    fn test_connector_samples() {
        let samples = [
            ("some_words", "SomeWords"),
            ("http_server", "HttpServer"),
            ("no_https", "NoHttps"),
            ("_complex__case_", "_Complex_Case_"),
            ("some words", "SomeWords"),
            ("GOLANG_IS_GREAT", "GolangIsGreat"),
        ];
        for (input, expected) in samples {
            assert_eq!(to_camel_case(input), expected, "input {:?}", input);
        }
    }

    #[test]
    fn test_connector_runs() {
        assert_eq!(to_camel_case("-order"), "-Order");
        assert_eq!(to_camel_case("order-"), "Order-");
        assert_eq!(to_camel_case("a___b"), "A__B");
        assert_eq!(resolve("_user", "create_").as_str(), "_UserCreate_");
    }

    #[test]
    fn test_degenerate_segments_yield_best_effort() {
        assert_eq!(to_camel_case(""), "");
        assert_eq!(to_camel_case("---"), "---");
        assert_eq!(resolve("", "create").as_str(), "Create");
        assert_eq!(to_camel_case("v2-api"), "V2Api");
    }
}
