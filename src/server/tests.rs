use super::*;
use crate::engine::{EngineError, ExecutionHandle, InMemoryEngine, WorkflowRegistry};
use crate::types::StartExecution;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use serde_json::json;
use std::time::Duration;
use tower::ServiceExt;

const TOKEN: &str = "s3cret";

fn test_config() -> Config {
    let mut config = Config::default();
    config.auth.header = "X-Gateway-Token".to_string();
    config.auth.token = TOKEN.to_string();
    config.workflow.task_queue = "default-queue".to_string();
    config
}

fn registry() -> WorkflowRegistry {
    WorkflowRegistry::new()
        .register("OrderCreate", |_input: JsonValue| async move {
            Ok::<_, String>(json!({"status": "ok"}))
        })
        .register("EchoValue", |input: JsonValue| async move { Ok::<_, String>(input) })
        .register("PaymentCharge", |_input: JsonValue| async move {
            Err::<JsonValue, _>("card declined".to_string())
        })
        .register("ReportBuild", |_input: JsonValue| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok::<_, String>(JsonValue::Null)
        })
}

fn app_with(engine: Arc<dyn WorkflowEngine>) -> Router {
    let state = AppState::new(test_config(), engine).unwrap();
    create_router(state)
}

fn app() -> (Router, Arc<InMemoryEngine>) {
    let engine = Arc::new(InMemoryEngine::new(registry()).with_recording());
    (app_with(engine.clone()), engine)
}

fn workflow_request(uri: &str, headers: &[(&str, &str)], body: &str) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn read_json(resp: Response<Body>) -> JsonValue {
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Engine that is never reachable
struct UnreachableEngine;

#[async_trait]
impl WorkflowEngine for UnreachableEngine {
    async fn start_execution(
        &self,
        _request: StartExecution,
    ) -> Result<Box<dyn ExecutionHandle>, EngineError> {
        Err(EngineError::Connection("connection refused".to_string()))
    }
}

#[tokio::test]
async fn test_health_check() {
    let (app, _engine) = app();
    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_successful_workflow_round_trip() {
    let (app, engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/order/create",
            &[
                ("X-Gateway-Token", TOKEN),
                ("Temporal-Task-Queue", "billing"),
            ],
            r#"{"amount":10}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body = read_json(resp).await;
    assert_eq!(body["data"], json!({"status": "ok"}));
    assert!(body.get("errors").is_none());

    let submissions = engine.submissions().await;
    assert_eq!(submissions.len(), 1);
    let submitted = &submissions[0];
    assert_eq!(submitted.workflow.as_str(), "OrderCreate");
    assert_eq!(submitted.options.task_queue, "billing");
    assert_eq!(submitted.options.execution_timeout, Duration::from_secs(10));
    assert_eq!(submitted.input, json!({"amount": 10}));
    assert_eq!(body["id"], json!(submitted.id));
}

#[tokio::test]
async fn test_wrong_token_is_unauthorized() {
    let (app, engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/order/create",
            &[("X-Gateway-Token", "guess")],
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(resp).await, json!({"error": "Unauthorized"}));
    assert_eq!(engine.submission_count().await, 0);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized_before_body_parsing() {
    let (app, engine) = app();
    let resp = app
        .oneshot(workflow_request("/order/create", &[], "not-json"))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(read_json(resp).await, json!({"error": "Unauthorized"}));
    assert_eq!(engine.submission_count().await, 0);
}

#[tokio::test]
async fn test_invalid_json_body_is_bad_request() {
    let (app, engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/order/create",
            &[("X-Gateway-Token", TOKEN)],
            "not-json",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(resp).await, json!({"errors": "Invalid Request"}));
    assert_eq!(engine.submission_count().await, 0);
}

#[tokio::test]
async fn test_empty_body_is_bad_request() {
    let (app, _engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/order/create",
            &[("X-Gateway-Token", TOKEN)],
            "",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_timeout_is_server_error_without_submission() {
    let (app, engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/order/create",
            &[
                ("X-Gateway-Token", TOKEN),
                ("Temporal-Workflow-Execution-Timeout", "ten"),
            ],
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(resp).await;
    assert_eq!(body, json!({"errors": "Internal Server Error"}));
    assert_eq!(engine.submission_count().await, 0);
}

#[tokio::test]
async fn test_bad_body_wins_over_bad_timeout() {
    let (app, _engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/order/create",
            &[
                ("X-Gateway-Token", TOKEN),
                ("Temporal-Workflow-Execution-Timeout", "ten"),
            ],
            "{",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_engine_unreachable_is_server_error_with_id() {
    let app = app_with(Arc::new(UnreachableEngine));
    let resp = app
        .oneshot(workflow_request(
            "/order/create",
            &[("X-Gateway-Token", TOKEN)],
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(resp).await;
    assert_eq!(body["errors"], "Internal Server Error");
    assert!(body["id"].is_string());
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_workflow_failure_is_server_error_with_id() {
    let (app, engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/payment/charge",
            &[("X-Gateway-Token", TOKEN)],
            r#"{"amount": 10}"#,
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(resp).await;
    assert_eq!(body["errors"], "Internal Server Error");

    let submissions = engine.submissions().await;
    assert_eq!(submissions.len(), 1);
    assert_eq!(body["id"], json!(submissions[0].id));
}

#[tokio::test]
async fn test_unknown_workflow_is_server_error() {
    let (app, engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/inventory/recount",
            &[("X-Gateway-Token", TOKEN)],
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(engine.submission_count().await, 1);
    assert_eq!(
        engine.submissions().await[0].workflow.as_str(),
        "InventoryRecount"
    );
}

#[tokio::test]
async fn test_non_object_values_round_trip() {
    for input in [json!(null), json!([1, "two", {"three": 3}]), json!(7), json!("text")] {
        let (app, _engine) = app();
        let resp = app
            .oneshot(workflow_request(
                "/echo/value",
                &[("X-Gateway-Token", TOKEN)],
                &input.to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = read_json(resp).await;
        assert_eq!(body["data"], input);
        assert!(body.as_object().unwrap().contains_key("data"));
    }
}

#[tokio::test]
async fn test_default_task_queue_when_header_missing_or_empty() {
    for headers in [
        vec![("X-Gateway-Token", TOKEN)],
        vec![("X-Gateway-Token", TOKEN), ("Temporal-Task-Queue", "")],
    ] {
        let (app, engine) = app();
        let resp = app
            .oneshot(workflow_request("/order/create", &headers, "{}"))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            engine.submissions().await[0].options.task_queue,
            "default-queue"
        );
    }
}

#[tokio::test]
async fn test_custom_timeout_is_forwarded() {
    let (app, engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/order/create",
            &[
                ("X-Gateway-Token", TOKEN),
                ("Temporal-Workflow-Execution-Timeout", "60"),
            ],
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        engine.submissions().await[0].options.execution_timeout,
        Duration::from_secs(60)
    );
}

#[tokio::test(start_paused = true)]
async fn test_execution_timeout_is_server_error() {
    let (app, _engine) = app();
    let resp = app
        .oneshot(workflow_request(
            "/report/build",
            &[
                ("X-Gateway-Token", TOKEN),
                ("Temporal-Workflow-Execution-Timeout", "2"),
            ],
            "{}",
        ))
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(resp).await;
    assert!(body["id"].is_string());
}

#[tokio::test]
async fn test_get_on_workflow_route_is_not_allowed() {
    let (app, engine) = app();
    let resp = app
        .oneshot(
            Request::builder()
                .uri("/order/create")
                .header("X-Gateway-Token", TOKEN)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(engine.submission_count().await, 0);
}
