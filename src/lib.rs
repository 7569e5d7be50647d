pub mod auth;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod logging;
pub mod naming;
pub mod options;
pub mod server;
pub mod types;

// Re-export main types
pub use types::*;

pub use config::Config;
pub use dispatch::{Dispatcher, WorkflowRequest};
pub use engine::{EngineError, ExecutionHandle, InMemoryEngine, PostgresEngine, WorkflowEngine, WorkflowRegistry};
pub use error::GatewayError;
pub use server::{create_router, AppState, Server};
