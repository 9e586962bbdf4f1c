//! Accept loop for the IPC endpoint. Shaped after the teacher's TCP accept
//! loop in `services/server`: bind once, then `tokio::spawn` one
//! `multiplexer::run` task per accepted connection, forever.

use std::io;

use tokio::net::{TcpListener, UnixListener};
use tracing::{error, info};

use crate::config::Endpoint;
use crate::multiplexer;
use crate::state::DaemonState;

/// Binds `endpoint` and serves connections until the process is asked to
/// shut down (`shutdown` resolving ends the loop without waiting for
/// in-flight connections -- spec.md §9 does not call for connection
/// draining).
pub async fn serve(endpoint: Endpoint, state: DaemonState, shutdown: impl std::future::Future<Output = ()>) -> io::Result<()> {
    match endpoint {
        Endpoint::Unix(path) => serve_unix(path, state, shutdown).await,
        Endpoint::Tcp(addr) => serve_tcp(addr, state, shutdown).await,
    }
}

async fn serve_unix(path: std::path::PathBuf, state: DaemonState, shutdown: impl std::future::Future<Output = ()>) -> io::Result<()> {
    if path.exists() {
        std::fs::remove_file(&path)?;
    }
    let listener = UnixListener::bind(&path)?;
    info!(path = %path.display(), "listening on unix socket");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, _addr)) => {
                        let state = state.clone();
                        tokio::spawn(async move { multiplexer::run(socket, state).await; });
                    }
                    Err(err) => error!(error = %err, "failed to accept unix connection"),
                }
            }
            () = &mut shutdown => break,
        }
    }
    let _ = std::fs::remove_file(&path);
    Ok(())
}

async fn serve_tcp(addr: std::net::SocketAddr, state: DaemonState, shutdown: impl std::future::Future<Output = ()>) -> io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "listening on tcp");

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, _addr)) => {
                        let state = state.clone();
                        tokio::spawn(async move { multiplexer::run(socket, state).await; });
                    }
                    Err(err) => error!(error = %err, "failed to accept tcp connection"),
                }
            }
            () = &mut shutdown => break,
        }
    }
    Ok(())
}
