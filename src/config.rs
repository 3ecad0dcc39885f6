//! Engine configuration: default timeouts, headless flag, trace/
//! download directories. Overridable by `VIBIUM_*` environment
//! variables, including `CHROME` for an explicit browser path.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct VibiumConfig {
    /// Run the managed Chromium headless. Defaults to true.
    pub headless: bool,
    /// Default per-operation timeout (locate, actionability wait, ...).
    pub default_timeout: Duration,
    /// Shut the session down after this much idle time.
    pub idle_timeout: Duration,
    /// Directory trace screenshot/snapshot resources are written under.
    pub screenshot_dir: PathBuf,
    /// Directory downloads triggered by the page are saved to.
    pub download_dir: PathBuf,
    /// Path of the daemon's listening socket (Unix socket / named pipe).
    pub socket_path: PathBuf,
    /// Explicit path to a Chromium-family binary; auto-detected if unset.
    pub chrome_path: Option<PathBuf>,
}

impl Default for VibiumConfig {
    fn default() -> Self {
        let state_dir = std::env::temp_dir().join("vibium");
        Self {
            headless: true,
            default_timeout: Duration::from_millis(30_000),
            idle_timeout: Duration::from_secs(300),
            screenshot_dir: state_dir.join("traces"),
            download_dir: state_dir.join("downloads"),
            socket_path: state_dir.join("vibium.sock"),
            chrome_path: None,
        }
    }
}

impl VibiumConfig {
    /// Applies `VIBIUM_*` environment overrides on top of [`Default`].
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(v) = std::env::var("VIBIUM_HEADLESS") {
            config.headless = !matches!(v.as_str(), "0" | "false");
        }
        if let Ok(v) = std::env::var("VIBIUM_DEFAULT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() {
                config.default_timeout = Duration::from_millis(ms);
            }
        }
        if let Ok(v) = std::env::var("VIBIUM_IDLE_TIMEOUT_SECS") {
            if let Ok(secs) = v.parse::<u64>() {
                config.idle_timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("VIBIUM_SCREENSHOT_DIR") {
            config.screenshot_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VIBIUM_DOWNLOAD_DIR") {
            config.download_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VIBIUM_SOCKET_PATH") {
            config.socket_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("CHROME") {
            config.chrome_path = Some(PathBuf::from(v));
        }
        config
    }
}

/// Returns the path to a Chromium-family executable.
///
/// If the `CHROME` environment variable is set, it is used directly.
/// Otherwise `google-chrome-stable`, `chromium`, `chromium-browser`,
/// `chrome` and `chrome-browser` are searched for on `PATH`.
pub fn default_executable() -> Result<PathBuf, String> {
    if let Ok(path) = std::env::var("CHROME") {
        if PathBuf::from(&path).exists() {
            return Ok(path.into());
        }
    }

    for app in &[
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
        "chrome",
        "chrome-browser",
    ] {
        if let Ok(path) = which::which(app) {
            return Ok(path);
        }
    }

    #[cfg(target_os = "macos")]
    {
        let default_paths = &["/Applications/Google Chrome.app/Contents/MacOS/Google Chrome"][..];
        for path in default_paths {
            if PathBuf::from(path).exists() {
                return Ok(path.into());
            }
        }
    }

    Err("could not auto-detect a Chromium executable".to_string())
}
