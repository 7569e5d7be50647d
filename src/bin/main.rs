/// Rhythm Gateway
///
/// Accepts `POST /:workflow_type/:workflow_name`, starts the matching workflow
/// on the engine and answers with its result once it finishes.
use rhythm_gateway::cli;

#[tokio::main]
async fn main() {
    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
