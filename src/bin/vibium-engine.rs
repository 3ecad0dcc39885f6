//! Daemon entrypoint: boots the Session Supervisor, binds the router to
//! its local-socket and/or stdio transports, and runs until
//! `daemon/shutdown` is handled or the idle timeout fires.
//!
//! Flags follow the supervisor's own contract (`--headless`,
//! `--idle-timeout`, `--socket`, `--log-level`): one
//! `#[arg(long, env = "...", default_value = ...)]` per flag, each also
//! settable by environment variable.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use vibium::config::VibiumConfig;
use vibium::daemon;
use vibium::router::Router;
use vibium::supervisor::Supervisor;

#[derive(Debug, Parser)]
#[command(name = "vibium-engine", about = "Vibium browser-automation engine daemon", version)]
struct Cli {
    /// Run the managed Chromium headless.
    #[arg(long, env = "VIBIUM_HEADLESS", default_value_t = true)]
    headless: bool,

    /// Shut the session down after this many seconds of inactivity.
    #[arg(long = "idle-timeout", env = "VIBIUM_IDLE_TIMEOUT_SECS", default_value_t = 300)]
    idle_timeout: u64,

    /// Path of the Unix socket to bind for the local-socket transport.
    #[arg(long, env = "VIBIUM_SOCKET_PATH")]
    socket: Option<PathBuf>,

    /// Serve the JSON-RPC surface over stdio instead of (or alongside) the socket.
    #[arg(long, env = "VIBIUM_STDIO", default_value_t = false)]
    stdio: bool,

    /// Explicit path to a Chromium-family binary; auto-detected if unset.
    #[arg(long = "chrome-path", env = "CHROME")]
    chrome_path: Option<PathBuf>,

    /// Tracing filter, e.g. "vibium=debug".
    #[arg(long = "log-level", env = "VIBIUM_LOG_LEVEL", default_value = "vibium=info")]
    log_level: String,
}

fn init_tracing(filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let mut config = VibiumConfig::from_env();
    config.headless = cli.headless;
    config.idle_timeout = Duration::from_secs(cli.idle_timeout);
    if let Some(socket) = &cli.socket {
        config.socket_path = socket.clone();
    }
    if let Some(chrome_path) = &cli.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }
    let idle_timeout = config.idle_timeout;
    let socket_path = config.socket_path.clone();

    let supervisor = Supervisor::launch(config).await?;
    let supervisor = Arc::new(tokio::sync::Mutex::new(supervisor));
    let router = Arc::new(Router::new(supervisor.clone(), socket_path.display().to_string()));

    let tracking_supervisor = supervisor.clone();
    tokio::spawn(async move {
        if let Err(err) = Supervisor::track_contexts(tracking_supervisor).await {
            tracing::warn!("context tracking stopped: {err}");
        }
    });

    let dialog_supervisor = supervisor.clone();
    let dialog_router = router.clone();
    tokio::spawn(async move {
        let transport = dialog_supervisor.lock().await.session.transport.clone();
        match transport.subscribe("browsingContext.userPromptOpened").await {
            Ok((_subscription, mut events)) => {
                while let Some(event) = events.recv().await {
                    if let vibium_bidi::BidiEvent::UserPromptOpened(info) = event {
                        dialog_router.push_notification(
                            "dialog.onOpen",
                            serde_json::json!({
                                "context": info.context.as_ref(),
                                "type": info.kind,
                                "message": info.message,
                            }),
                        );
                    }
                }
            }
            Err(err) => tracing::warn!("dialog subscription failed: {err}"),
        }
    });

    let idle_supervisor = supervisor.clone();
    let idle_watch = async move {
        Supervisor::watch_idle(&idle_supervisor, idle_timeout).await;
    };

    let serve_result = if cli.stdio {
        tokio::select! {
            result = daemon::serve_stdio(router.clone()) => result,
            _ = idle_watch => Ok(()),
        }
    } else {
        tokio::select! {
            result = daemon::serve_unix_socket(socket_path, router.clone()) => result,
            _ = idle_watch => Ok(()),
        }
    };

    if let Err(err) = &serve_result {
        tracing::error!("daemon transport exited with an error: {err}");
    }

    supervisor.lock().await.shutdown().await?;
    serve_result?;
    Ok(())
}
