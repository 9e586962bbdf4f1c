//! Sandboxed-execution daemon: dispatcher, connection multiplexer, and
//! external interfaces (spec.md overview). `main.rs` is a thin CLI
//! wrapper around `run`; integration tests drive `multiplexer::run`/
//! `DaemonState` directly.

pub mod callback_bridge;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod http_forward;
pub mod ipc;
pub mod json_bridge;
pub mod module_hook;
pub mod multiplexer;
pub mod state;
pub mod verbs;
pub mod worker;

use config::Config;
use state::DaemonState;
use tracing::info;

/// Parses CLI options, starts the isolate worker thread, binds the IPC
/// endpoint, and serves until `shutdown` resolves (spec.md §6).
pub async fn run(config: Config, shutdown: impl std::future::Future<Output = ()>) -> std::io::Result<()> {
    let state = DaemonState::new(config.max_isolates, config.memory_limit_bytes);
    info!(max_isolates = config.max_isolates, "isolate daemon starting");
    ipc::serve(config.endpoint, state, shutdown).await?;
    info!("isolate daemon shut down");
    Ok(())
}
