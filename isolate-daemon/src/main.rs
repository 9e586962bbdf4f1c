//! Entry point (spec.md §6). Shaped after the teacher's `main.rs` --
//! `tracing_subscriber::fmt()` then `tokio::select!` on ctrl_c/SIGTERM.

use isolate_daemon::config::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse_from_args();
    if let Err(err) = isolate_daemon::run(config, shutdown_signal()).await {
        tracing::error!(error = %err, "ipc listener exited with an error");
        std::process::exit(1);
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl_c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
