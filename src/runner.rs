use crate::config::AppConfig;
use crate::error::LaunchError;
use crate::launcher::{venv_bin, venv_python};
use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

/// Host runners that can execute the launch shim.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Runner {
    /// `streamlit run <shim>` — serves the dashboard over HTTP.
    Streamlit,
    /// Plain `python <shim>` — runs the entry point directly.
    Python,
}

impl Runner {
    /// Parse the runner string from config.
    pub fn from_config(s: &str) -> Result<Self, LaunchError> {
        match s.to_lowercase().as_str() {
            "streamlit" => Ok(Self::Streamlit),
            "python" | "python3" => Ok(Self::Python),
            other => Err(LaunchError::RunnerUnavailable(format!(
                "unknown runner '{}'; supported: streamlit, python",
                other
            ))),
        }
    }

    /// Human-readable name for display.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Streamlit => "Streamlit",
            Self::Python => "Python",
        }
    }

    /// Resolve the runner executable: explicit config override first, then
    /// the project venv's bin directory, then the bare name on PATH.
    pub fn resolve_executable(&self, config: &AppConfig, venv: Option<&Path>) -> PathBuf {
        match self {
            Self::Streamlit => {
                if let Some(exe) = &config.streamlit_executable {
                    return PathBuf::from(exe);
                }
                if let Some(venv) = venv {
                    let bin = venv_bin(venv, "streamlit");
                    if bin.exists() {
                        return bin;
                    }
                }
                PathBuf::from("streamlit")
            }
            Self::Python => match venv {
                Some(venv) => venv_python(venv),
                None => PathBuf::from(&config.python_executable),
            },
        }
    }

    /// Check that the executable answers `--version`.
    pub fn check_available(&self, exe: &Path) -> Result<(), String> {
        let status = Command::new(exe)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(s) if s.success() => Ok(()),
            Ok(s) => Err(format!("exited with {}", s)),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Build the runner's command line for the shim. The caller composes the
    /// environment before spawning.
    pub fn build_command(&self, exe: &Path, shim: &Path, config: &AppConfig) -> Command {
        let mut cmd = Command::new(exe);
        match self {
            Self::Streamlit => {
                cmd.arg("run")
                    .arg(shim)
                    .arg("--server.port")
                    .arg(config.port.to_string());
                if config.headless {
                    cmd.arg("--server.headless").arg("true");
                }
            }
            Self::Python => {
                cmd.arg(shim);
            }
        }
        cmd
    }

    /// Health endpoint to poll after spawn, when the runner has one.
    pub fn health_url(&self, port: u16) -> Option<String> {
        match self {
            Self::Streamlit => Some(format!("http://localhost:{port}/_stcore/health")),
            Self::Python => None,
        }
    }
}

/// Render a command for logs: program followed by its arguments.
pub fn render_command(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().to_string()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().to_string()));
    parts.join(" ")
}

/// Poll `health_url` until it answers 2xx or `timeout_secs` elapses.
/// Retries with capped exponential backoff plus jitter.
pub async fn wait_until_ready(health_url: &str, timeout_secs: u64) -> Result<()> {
    let client = reqwest::Client::new();
    let deadline = std::time::Instant::now() + Duration::from_secs(timeout_secs);
    let mut attempt: u32 = 0;
    let mut last_err: Option<anyhow::Error> = None;

    loop {
        if attempt > 0 {
            // 250ms, 500ms, 1s, 2s, then capped at 2s — and never past
            // the deadline.
            let base = Duration::from_millis(250 * (1u64 << (attempt - 1).min(3)));
            let jitter = Duration::from_millis(rand::random::<u64>() % 200);
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Err(last_err.unwrap_or_else(|| anyhow!("no response from {health_url}")));
            }
            tokio::time::sleep((base + jitter).min(remaining)).await;
        }

        if std::time::Instant::now() >= deadline {
            return Err(last_err.unwrap_or_else(|| anyhow!("no response from {health_url}")));
        }

        let result = client
            .get(health_url)
            .timeout(Duration::from_secs(2))
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            Ok(resp) => last_err = Some(anyhow!("health endpoint returned {}", resp.status())),
            Err(e) => last_err = Some(anyhow!("health check failed: {e}")),
        }

        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_runner_from_config_valid() {
        assert_eq!(Runner::from_config("streamlit").unwrap(), Runner::Streamlit);
        assert_eq!(Runner::from_config("Streamlit").unwrap(), Runner::Streamlit);
        assert_eq!(Runner::from_config("python").unwrap(), Runner::Python);
        assert_eq!(Runner::from_config("python3").unwrap(), Runner::Python);
    }

    #[test]
    fn test_runner_from_config_invalid() {
        let err = Runner::from_config("node").unwrap_err();
        assert!(matches!(err, LaunchError::RunnerUnavailable(_)));
        assert!(err.to_string().contains("node"));
    }

    #[test]
    fn test_runner_display_name() {
        assert_eq!(Runner::Streamlit.display_name(), "Streamlit");
        assert_eq!(Runner::Python.display_name(), "Python");
    }

    #[test]
    fn test_streamlit_command_line() {
        let mut config = AppConfig::default();
        config.port = 8600;
        config.headless = true;

        let cmd = Runner::Streamlit.build_command(Path::new("streamlit"), Path::new("shim.py"), &config);
        let args = args_of(&cmd);
        assert_eq!(args[0], "run");
        assert_eq!(args[1], "shim.py");
        assert!(args.windows(2).any(|w| w == ["--server.port", "8600"]));
        assert!(args.windows(2).any(|w| w == ["--server.headless", "true"]));
    }

    #[test]
    fn test_streamlit_command_line_headed() {
        let mut config = AppConfig::default();
        config.headless = false;

        let cmd = Runner::Streamlit.build_command(Path::new("streamlit"), Path::new("shim.py"), &config);
        let args = args_of(&cmd);
        assert!(!args.iter().any(|a| a == "--server.headless"));
    }

    #[test]
    fn test_python_command_line() {
        let config = AppConfig::default();
        let cmd = Runner::Python.build_command(Path::new("python3"), Path::new("shim.py"), &config);
        assert_eq!(args_of(&cmd), vec!["shim.py"]);
    }

    #[test]
    fn test_resolve_executable_explicit_override() {
        let mut config = AppConfig::default();
        config.streamlit_executable = Some("/opt/venv/bin/streamlit".to_string());
        let exe = Runner::Streamlit.resolve_executable(&config, None);
        assert_eq!(exe, PathBuf::from("/opt/venv/bin/streamlit"));
    }

    #[test]
    fn test_resolve_executable_falls_back_to_path_name() {
        let config = AppConfig::default();
        let exe = Runner::Streamlit.resolve_executable(&config, None);
        assert_eq!(exe, PathBuf::from("streamlit"));
    }

    #[test]
    fn test_resolve_python_without_venv_uses_config() {
        let mut config = AppConfig::default();
        config.python_executable = "python3.12".to_string();
        let exe = Runner::Python.resolve_executable(&config, None);
        assert_eq!(exe, PathBuf::from("python3.12"));
    }

    #[test]
    fn test_health_url() {
        assert_eq!(
            Runner::Streamlit.health_url(8501).as_deref(),
            Some("http://localhost:8501/_stcore/health")
        );
        assert!(Runner::Python.health_url(8501).is_none());
    }

    #[test]
    fn test_render_command() {
        let config = AppConfig::default();
        let cmd = Runner::Python.build_command(Path::new("python3"), Path::new("shim.py"), &config);
        assert_eq!(render_command(&cmd), "python3 shim.py");
    }

    #[tokio::test]
    async fn test_wait_until_ready_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/_stcore/health")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let url = format!("{}/_stcore/health", server.url());
        let result = wait_until_ready(&url, 5).await;
        assert!(result.is_ok());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_wait_until_ready_gives_up_on_errors() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/_stcore/health")
            .with_status(503)
            .expect_at_least(1)
            .create_async()
            .await;

        let url = format!("{}/_stcore/health", server.url());
        let err = wait_until_ready(&url, 1).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_wait_until_ready_respects_deadline() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/_stcore/health")
            .with_status(503)
            .expect_at_least(1)
            .create_async()
            .await;

        let url = format!("{}/_stcore/health", server.url());
        let started = std::time::Instant::now();
        let result = wait_until_ready(&url, 1).await;
        assert!(result.is_err());
        // The backoff sleep is clamped to the time remaining, so the
        // poll gives up close to the timeout instead of a full interval
        // past it.
        assert!(started.elapsed() < Duration::from_millis(1800));
    }

    #[tokio::test]
    async fn test_wait_until_ready_unreachable() {
        // Nothing listens on this port; the poll must time out with an error.
        let result = wait_until_ready("http://localhost:59999/_stcore/health", 1).await;
        assert!(result.is_err());
    }
}
