//! Session Supervisor: owns the browser process end to end. Launches
//! it, resolves its BiDi endpoint, opens the Transport, arranges the
//! default event subscriptions, and tears everything down on shutdown
//! or idle timeout.
//!
//! Launch-arg construction follows a `BrowserConfig`-style builder;
//! endpoint resolution scans the child's stderr for the
//! `DevTools listening on ws://...` line a Chromium-family binary
//! prints on startup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::io::AsyncBufReadExt;
use tracing::{info, warn};

use vibium_bidi::browsing_context::{BrowsingContext, ContextTreeNode, GetTreeParams};
use vibium_bidi::session::{default_subscriptions, EndParams, NewParams};
use vibium_bidi::BidiEvent;

use crate::config::{default_executable, VibiumConfig};
use crate::error::{EngineError, Result, TransportError};
use crate::job::PeriodicJob;
use crate::process::{Child, Command, Stdio};
use crate::session::SessionState;
use crate::transport::Transport;

/// Arguments passed to every launched instance regardless of config.
const DEFAULT_ARGS: &[&str] = &[
    "--no-first-run",
    "--disable-background-networking",
    "--disable-background-timer-throttling",
    "--disable-backgrounding-occluded-windows",
    "--disable-renderer-backgrounding",
    "--disable-sync",
    "--no-default-browser-check",
];

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);

fn build_command(config: &VibiumConfig) -> Result<Command> {
    let executable = match config.chrome_path.clone() {
        Some(path) => path,
        None => default_executable().map_err(EngineError::msg)?,
    };

    let mut cmd = Command::new(executable);
    cmd.args(DEFAULT_ARGS);
    cmd.arg("--remote-debugging-port=0");
    cmd.arg(format!(
        "--user-data-dir={}",
        std::env::temp_dir().join("vibium-profile").display()
    ));
    if config.headless {
        cmd.args(["--headless=new", "--hide-scrollbars", "--mute-audio"]);
    }
    cmd.stderr(Stdio::piped());
    Ok(cmd)
}

/// Scans the launched process's stderr for the "DevTools listening on
/// ws://..." line Chromium prints once its debugging endpoint is
/// ready, or fails once `timeout` elapses or the process exits first.
async fn wait_for_endpoint(child: &mut Child, timeout: Duration) -> Result<String> {
    let stderr = child.stderr.take().ok_or_else(|| EngineError::msg("child has no stderr"))?;
    let mut reader = futures::io::BufReader::new(FuturesCompat(stderr));
    let mut line = Vec::new();
    let deadline = Instant::now() + timeout;

    loop {
        if Instant::now() >= deadline {
            return Err(EngineError::Transport(TransportError::ConnectionClosed));
        }
        line.clear();
        let remaining = deadline.saturating_duration_since(Instant::now());
        let read = tokio::time::timeout(remaining, reader.read_until(b'\n', &mut line)).await;
        match read {
            Err(_) => return Err(EngineError::Transport(TransportError::ConnectionClosed)),
            Ok(Err(err)) => return Err(EngineError::from(err)),
            Ok(Ok(0)) => return Err(EngineError::msg("browser process exited before publishing its endpoint")),
            Ok(Ok(_)) => {
                let text = String::from_utf8_lossy(&line);
                if let Some((_, url)) = text.rsplit_once("listening on ") {
                    let url = url.trim();
                    if url.starts_with("ws") {
                        return Ok(url.to_string());
                    }
                }
            }
        }
    }
}

/// Adapts `tokio`'s `AsyncRead` child stderr to the `futures::AsyncRead`
/// trait `BufReader::read_until` needs here.
struct FuturesCompat<T>(T);

impl<T: tokio::io::AsyncRead + Unpin> futures::AsyncRead for FuturesCompat<T> {
    fn poll_read(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut [u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let mut read_buf = tokio::io::ReadBuf::new(buf);
        match tokio::io::AsyncRead::poll_read(std::pin::Pin::new(&mut this.0), cx, &mut read_buf) {
            std::task::Poll::Ready(Ok(())) => std::task::Poll::Ready(Ok(read_buf.filled().len())),
            std::task::Poll::Ready(Err(err)) => std::task::Poll::Ready(Err(err)),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

/// Seeds `session.contexts` with the tabs/frames that already exist at
/// session negotiation time, so `resolve_context` has something to fall
/// back to before any `browsingContext.contextCreated` event arrives.
async fn seed_contexts(session: &mut SessionState) -> Result<()> {
    let response = session.transport.send(GetTreeParams::new()).await?;
    for node in response.result.contexts {
        record_tree(session, node, None);
    }
    Ok(())
}

fn record_tree(session: &mut SessionState, node: ContextTreeNode, parent: Option<BrowsingContext>) {
    let context = node.context.clone();
    session.record_context(context.clone(), parent, node.url);
    for child in node.children {
        record_tree(session, child, Some(context.clone()));
    }
}

/// Owns the browser process and the live [`SessionState`] built on top
/// of it. No other component may kill the process.
pub struct Supervisor {
    child: Child,
    pub session: SessionState,
}

impl Supervisor {
    /// Launches the browser, waits for its BiDi endpoint, opens the
    /// Transport, negotiates a session and subscribes to the default
    /// event set.
    pub async fn launch(config: VibiumConfig) -> Result<Self> {
        let mut cmd = build_command(&config)?;
        let mut child = cmd.spawn().map_err(EngineError::from)?;
        info!(pid = ?child.id(), "launched browser process");

        let endpoint = wait_for_endpoint(&mut child, LAUNCH_TIMEOUT).await?;
        let transport = Transport::connect(&endpoint).await?;

        transport.send(NewParams::default()).await?;
        transport.send(default_subscriptions()).await?;

        let mut session = SessionState::new(transport, config);
        seed_contexts(&mut session).await?;
        Ok(Self { child, session })
    }

    /// Runs forever, keeping `session.contexts` in sync with the
    /// browser's actual tab/frame set by consuming
    /// `browsingContext.contextCreated`/`contextDestroyed` events.
    /// Spawned alongside [`Supervisor::watch_idle`]; returns only if the
    /// underlying subscription fails.
    pub async fn track_contexts(supervisor: Arc<tokio::sync::Mutex<Supervisor>>) -> Result<()> {
        let transport = supervisor.lock().await.session.transport.clone();
        let (_subscription, mut events) = transport.subscribe("browsingContext").await?;
        while let Some(event) = events.recv().await {
            match event {
                BidiEvent::ContextCreated(info) => {
                    supervisor.lock().await.session.record_context(info.context, info.parent, info.url);
                }
                BidiEvent::ContextDestroyed(info) => {
                    supervisor.lock().await.session.forget_context(&info.context);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Orderly shutdown: tells the browser to end the BiDi session,
    /// then kills the process, then sweeps for orphaned helper
    /// processes left behind if the process tree didn't exit cleanly.
    pub async fn shutdown(&mut self) -> Result<()> {
        let _ = self.session.transport.send(EndParams::default()).await;
        self.session.transport.close();
        if self.child.try_wait().ok().flatten().is_none() {
            if let Err(err) = self.child.kill().await {
                warn!("failed to kill browser process: {err}");
            }
        }
        self.sweep_orphans();
        Ok(())
    }

    /// Best-effort cleanup of helper processes (e.g. renderer/GPU
    /// helpers) that become orphaned if the browser's own process tree
    /// didn't exit cleanly. Unix-only; on other platforms the OS
    /// reclaims the process tree when the parent exits.
    #[cfg(unix)]
    fn sweep_orphans(&self) {
        if let Some(pid) = self.child.id() {
            let _ = std::process::Command::new("pkill").args(["-9", "-P", &pid.to_string()]).status();
        }
    }

    #[cfg(not(unix))]
    fn sweep_orphans(&self) {}

    /// Runs forever, checking once a minute whether the session has
    /// been idle for at least `idle_timeout`. Returns when it decides
    /// shutdown should begin; the caller is responsible for calling
    /// [`Supervisor::shutdown`].
    pub async fn watch_idle(supervisor: &tokio::sync::Mutex<Supervisor>, idle_timeout: Duration) {
        let mut job = PeriodicJob::new(IDLE_CHECK_INTERVAL);
        loop {
            job.tick().await;
            let idle_for = supervisor.lock().await.session.idle_for();
            if idle_for >= idle_timeout {
                info!(?idle_for, "idle timeout reached, initiating shutdown");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_args_do_not_duplicate_debugging_port() {
        assert!(!DEFAULT_ARGS.iter().any(|a| a.contains("--remote-debugging-port")));
    }
}
