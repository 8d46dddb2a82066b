use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Launcher configuration, loaded from `dashrunner.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application directory. Empty/absent means the current working directory.
    pub app_dir: Option<String>,
    /// Source tree to prepend to the module search path, relative to `app_dir`.
    pub source_dir: String,
    /// Entry point as `module:callable`; the callable defaults to `main`.
    pub entry: String,
    /// Host runner: "streamlit" or "python".
    pub runner: String,
    pub port: u16,
    pub headless: bool,
    /// Poll the dashboard's health endpoint after launch and print the URL.
    pub wait_for_ready: bool,
    pub startup_timeout_secs: u64,
    /// Budget for the captured import probe.
    pub probe_timeout_secs: u64,
    /// Verify the entry point imports and is callable before launching.
    pub verify_entry: bool,
    /// Scan the entry module for third-party imports and warn about missing ones.
    pub dependency_scan: bool,
    /// Run all checks, launch nothing.
    pub check_only: bool,
    /// Prefer `<app_dir>/.venv` (or `venv`) interpreters when present.
    pub use_project_venv: bool,
    pub python_executable: String,
    /// Explicit streamlit executable; absent means venv/PATH discovery.
    pub streamlit_executable: Option<String>,
    pub log_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_dir: None,
            source_dir: "src".to_string(),
            entry: "ui.dashboard:main".to_string(),
            runner: "streamlit".to_string(),
            port: 8501,
            headless: true,
            wait_for_ready: true,
            startup_timeout_secs: 30,
            probe_timeout_secs: 20,
            verify_entry: true,
            dependency_scan: true,
            check_only: false,
            use_project_venv: true,
            python_executable: "python3".to_string(),
            streamlit_executable: None,
            log_dir: "logs".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration with the chain: `./dashrunner.toml` -> `~/dashrunner.toml` -> defaults.
    pub fn load() -> Self {
        let candidates = Self::config_paths();
        for path in &candidates {
            if let Ok(contents) = fs::read_to_string(path) {
                match toml::from_str::<AppConfig>(&contents) {
                    Ok(cfg) => return cfg,
                    Err(e) => {
                        eprintln!("Warning: failed to parse {}: {}", path.display(), e);
                    }
                }
            }
        }
        Self::default()
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("dashrunner.toml")];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join("dashrunner.toml"));
        }
        paths
    }
}
