//! Daemon persisted state: the PID file and the listening endpoint
//! (Unix socket) the engine binds for its local-socket transport, with
//! stale-state cleanup at startup.
//!
//! The accept-loop/connection-framing shape follows the same
//! one-task-per-connection pattern the reader side of `transport.rs`
//! uses for the browser-facing socket.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::error::{EngineError, Result};
use crate::router::Router;

fn pid_path(socket_path: &Path) -> PathBuf {
    socket_path.with_extension("pid")
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // Signal 0 performs no action but still validates the target exists
    // and is reachable; this is the standard `kill(pid, 0)` liveness probe.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    false
}

/// Removes a stale PID file and socket left behind by a previous
/// instance that did not shut down cleanly, or errors if the existing
/// instance is still alive.
pub async fn cleanup_stale(socket_path: &Path) -> Result<()> {
    let pid_file = pid_path(socket_path);
    if let Ok(contents) = tokio::fs::read_to_string(&pid_file).await {
        if let Ok(pid) = contents.trim().parse::<u32>() {
            if process_is_alive(pid) {
                return Err(EngineError::msg(format!(
                    "another vibium-engine instance is already running (pid {pid})"
                )));
            }
            warn!(pid, "removing stale pid file");
        }
        let _ = tokio::fs::remove_file(&pid_file).await;
    }
    if socket_path.exists() {
        tokio::fs::remove_file(socket_path).await.map_err(EngineError::from)?;
    }
    Ok(())
}

async fn write_pid_file(socket_path: &Path) -> Result<()> {
    let pid_file = pid_path(socket_path);
    crate::utils::write(&pid_file, std::process::id().to_string()).await.map_err(EngineError::from)
}

async fn remove_pid_file(socket_path: &Path) {
    let _ = tokio::fs::remove_file(pid_path(socket_path)).await;
}

async fn handle_connection(stream: UnixStream, router: Arc<Router>) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut notifications = router.subscribe_notifications();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => return,
                    Err(err) => {
                        error!("socket read error: {err}");
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(response) = router.handle_line(&line).await {
                    if write_half.write_all(response.as_bytes()).await.is_err() {
                        return;
                    }
                    if write_half.write_all(b"\n").await.is_err() {
                        return;
                    }
                }
            }
            notification = notifications.recv() => {
                let Ok(line) = notification else { continue };
                if write_half.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
                if write_half.write_all(b"\n").await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Binds the Unix socket, writes the PID file, and serves connections
/// until `daemon/shutdown` is handled. Cleans up both files on return.
pub async fn serve_unix_socket(socket_path: PathBuf, router: Arc<Router>) -> Result<()> {
    cleanup_stale(&socket_path).await?;
    if let Some(parent) = socket_path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(EngineError::from)?;
    }
    let listener = UnixListener::bind(&socket_path).map_err(EngineError::from)?;
    write_pid_file(&socket_path).await?;
    info!(socket = %socket_path.display(), "daemon listening");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _addr)) => {
                        let router = router.clone();
                        tokio::spawn(async move { handle_connection(stream, router).await });
                    }
                    Err(err) => {
                        error!("accept failed: {err}");
                    }
                }
            }
            _ = router.shutdown_requested() => {
                debug!("shutdown requested, closing listener");
                break;
            }
        }
    }

    drop(listener);
    let _ = tokio::fs::remove_file(&socket_path).await;
    remove_pid_file(&socket_path).await;
    Ok(())
}

/// Serves the JSON-RPC surface over stdio (one request per line on
/// stdin, one response per line on stdout), for MCP-style agents that
/// spawn the engine as a child process rather than dialing its socket.
pub async fn serve_stdio(router: Arc<Router>) -> Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();
    let mut notifications = router.subscribe_notifications();

    loop {
        tokio::select! {
            next = lines.next_line() => {
                match next {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        if let Some(response) = router.handle_line(&line).await {
                            stdout.write_all(response.as_bytes()).await.map_err(EngineError::from)?;
                            stdout.write_all(b"\n").await.map_err(EngineError::from)?;
                            stdout.flush().await.map_err(EngineError::from)?;
                        }
                    }
                    Ok(None) => return Ok(()),
                    Err(err) => return Err(EngineError::from(err)),
                }
            }
            notification = notifications.recv() => {
                if let Ok(line) = notification {
                    stdout.write_all(line.as_bytes()).await.map_err(EngineError::from)?;
                    stdout.write_all(b"\n").await.map_err(EngineError::from)?;
                    stdout.flush().await.map_err(EngineError::from)?;
                }
            }
            _ = router.shutdown_requested() => {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_path_is_a_sibling_of_the_socket() {
        let socket = PathBuf::from("/tmp/vibium/vibium.sock");
        assert_eq!(pid_path(&socket), PathBuf::from("/tmp/vibium/vibium.pid"));
    }
}
