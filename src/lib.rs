use dotenvy::dotenv;

pub mod config;
pub mod error;
pub mod interface;
pub mod launcher;
pub mod logger;
pub mod resolver;
pub mod runner;
pub mod utils;

pub use config::AppConfig;
pub use error::LaunchError;
pub use launcher::{LaunchOutcome, Launcher};
pub use resolver::{EntrySpec, ModulePath, SearchPath};
pub use runner::Runner;

/// Run the launcher: load `.env`, load config, and launch the configured
/// dashboard entry point. Returns the process exit code to relay.
pub async fn run() -> Result<i32, LaunchError> {
    // Load environment variables from .env (the application may expect
    // tokens forwarded through the child environment)
    dotenv().ok();

    let config = config::AppConfig::load();
    run_with_config(&config).await
}

/// Launch with an explicit configuration.
///
/// Every fatal condition of this layer surfaces as a `LaunchError` and is
/// recorded in the run log before it propagates; once the application is
/// running, its exit status passes through verbatim as the returned code.
pub async fn run_with_config(config: &AppConfig) -> Result<i32, LaunchError> {
    interface::print_banner();

    let logger = logger::Logger::new(&config.log_dir)?;
    match launch(config, &logger).await {
        Ok(code) => Ok(code),
        Err(e) => {
            let _ = logger.log_error(&e.to_string());
            Err(e)
        }
    }
}

async fn launch(config: &AppConfig, logger: &logger::Logger) -> Result<i32, LaunchError> {
    let base_dir = resolver::resolve_base_dir(config.app_dir.as_deref())?;
    let source_root = base_dir.join(&config.source_dir);
    let search_path = SearchPath::compose(&source_root, &SearchPath::inherited_from_env());
    let entry = EntrySpec::parse(&config.entry)?;
    let runner = Runner::from_config(&config.runner)?;

    let launcher = Launcher::new(base_dir, search_path.clone(), config);

    let mut warnings = 0usize;

    // Interpreter check. A missing interpreter is fatal for the python
    // runner; for streamlit it only disables the probe and the scan.
    let python = launcher.resolve_python();
    let interpreter_ok = match launcher.check_interpreter() {
        Ok(version) => {
            interface::status_ok(&format!("Interpreter: {} ({})", python.display(), version));
            true
        }
        Err(e) => {
            if runner == Runner::Python {
                return Err(LaunchError::RunnerUnavailable(format!(
                    "{}: {}",
                    python.display(),
                    e
                )));
            }
            interface::status_warn(&format!(
                "Interpreter {} not available ({}); entry probe skipped",
                python.display(),
                e
            ));
            warnings += 1;
            false
        }
    };

    // Module resolution happens before anything is spawned; a missing
    // module must never reach the child process.
    let resolved = search_path.resolve(&entry.module)?;
    interface::status_ok(&format!(
        "Resolved {} -> {}",
        entry.module,
        resolved.source.display()
    ));
    let _ = logger.log_resolution(entry.module.as_str(), &resolved.source);

    if config.dependency_scan && interpreter_ok {
        match launcher.scan_dependencies(&resolved.source) {
            Ok(deps) => {
                let missing = launcher.missing_dependencies(&deps);
                if missing.is_empty() {
                    interface::status_ok("Dependency scan: nothing missing");
                } else {
                    interface::status_warn(&format!(
                        "Missing third-party modules: {}",
                        missing.join(", ")
                    ));
                    warnings += 1;
                }
            }
            Err(e) => {
                interface::status_warn(&format!("Dependency scan failed: {}", e));
                warnings += 1;
            }
        }
    }

    if config.verify_entry && interpreter_ok {
        launcher.probe_entry(&entry)?;
        interface::status_ok(&format!("Entry point {} imports and is callable", entry));
    }

    let venv = launcher.find_project_venv();
    if let Some(ref venv) = venv {
        interface::status_ok(&format!("Project venv: {}", venv.display()));
    }
    let exe = runner.resolve_executable(config, venv.as_deref());
    runner
        .check_available(&exe)
        .map_err(|e| LaunchError::RunnerUnavailable(format!("{}: {}", exe.display(), e)))?;
    interface::status_ok(&format!(
        "Runner: {} ({})",
        runner.display_name(),
        exe.display()
    ));

    if config.check_only {
        if warnings == 0 {
            interface::status_ok("All checks passed");
            return Ok(0);
        }
        interface::status_warn(&format!("{} warning(s) during checks", warnings));
        return Ok(1);
    }

    if warnings > 0
        && !interface::confirm(&format!(
            "{} warning(s) during startup checks. Launch anyway?",
            warnings
        ))
    {
        return Ok(1);
    }

    let shim = launcher.write_shim(&entry)?;
    let command = runner.build_command(&exe, &shim, config);
    let _ = logger.log_spawn(&runner::render_command(&command));
    let mut child = match launcher.spawn_attached(command) {
        Ok(child) => child,
        Err(e) => {
            let _ = std::fs::remove_file(&shim);
            return Err(e);
        }
    };

    if config.wait_for_ready {
        if let Some(url) = runner.health_url(config.port) {
            let started = std::time::Instant::now();
            let spinner = interface::start_spinner("Waiting for the dashboard to come up...");
            let ready = runner::wait_until_ready(&url, config.startup_timeout_secs).await;
            interface::stop_spinner(&spinner);
            match ready {
                Ok(()) => interface::status_ok(&format!(
                    "Dashboard ready at http://localhost:{} (in {})",
                    config.port,
                    utils::format_duration(started.elapsed())
                )),
                Err(e) => interface::status_warn(&format!(
                    "Dashboard not ready within {}s: {}",
                    config.startup_timeout_secs, e
                )),
            }
        }
    }

    // Block until the application exits; the status passes through untouched.
    let status = child.wait();
    let _ = std::fs::remove_file(&shim);
    let status = status?;
    let _ = logger.log_exit(status.code());

    match status.code() {
        Some(code) => Ok(code),
        None => {
            interface::status_warn("Runner terminated by signal");
            Ok(1)
        }
    }
}
