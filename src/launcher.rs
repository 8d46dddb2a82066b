use crate::config::AppConfig;
use crate::error::LaunchError;
use crate::resolver::{EntrySpec, SearchPath};
use crate::utils::{extract_imports, is_stdlib};
use chrono::Utc;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Result of a captured child-process run.
pub struct LaunchOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl LaunchOutcome {
    /// Returns true only when the process exited with code 0.
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Report printed by the entry probe as a single JSON line on stdout.
#[derive(Debug, Deserialize)]
struct ProbeReport {
    stage: String,
    ok: bool,
    detail: String,
}

/// Prepares and spawns the application: composes the child environment from
/// the search path, writes the launch shim, runs the captured entry probe,
/// and hands attached processes back to the caller untouched.
pub struct Launcher {
    base_dir: PathBuf,
    search_path: SearchPath,
    python_executable: String,
    use_project_venv: bool,
    probe_timeout_secs: u64,
}

impl Launcher {
    pub fn new(base_dir: PathBuf, search_path: SearchPath, config: &AppConfig) -> Self {
        Self {
            base_dir,
            search_path,
            python_executable: config.python_executable.clone(),
            use_project_venv: config.use_project_venv,
            probe_timeout_secs: config.probe_timeout_secs,
        }
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    // ── Interpreter discovery ───────────────────────────────────────────

    /// Look for a project virtual environment under the application
    /// directory (`.venv`, then `venv`). Only directories that actually
    /// contain an interpreter count.
    pub fn find_project_venv(&self) -> Option<PathBuf> {
        if !self.use_project_venv {
            return None;
        }
        for name in [".venv", "venv"] {
            let dir = self.base_dir.join(name);
            if venv_python(&dir).exists() {
                return Some(dir);
            }
        }
        None
    }

    /// The interpreter used for probes: the project venv's python when one
    /// exists, the configured executable otherwise.
    pub fn resolve_python(&self) -> PathBuf {
        match self.find_project_venv() {
            Some(venv) => venv_python(&venv),
            None => PathBuf::from(&self.python_executable),
        }
    }

    /// Check that the interpreter runs at all, returning its version string.
    pub fn check_interpreter(&self) -> Result<String, String> {
        let python = self.resolve_python();
        let output = Command::new(&python)
            .arg("--version")
            .output()
            .map_err(|e| e.to_string())?;

        if !output.status.success() {
            return Err(String::from_utf8_lossy(&output.stderr).trim().to_string());
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    // ── Preflight checks ────────────────────────────────────────────────

    /// Extract third-party import roots from the entry module's source.
    pub fn scan_dependencies(&self, source: &Path) -> Result<Vec<String>, LaunchError> {
        let code = fs::read_to_string(source)?;
        Ok(extract_imports(&code)
            .into_iter()
            .filter(|pkg| !is_stdlib(pkg))
            .collect())
    }

    /// Filter `deps` down to the modules the interpreter cannot import.
    pub fn missing_dependencies(&self, deps: &[String]) -> Vec<String> {
        deps.iter()
            .filter(|dep| !self.can_import(dep))
            .cloned()
            .collect()
    }

    fn can_import(&self, module: &str) -> bool {
        let Ok(pythonpath) = self.search_path.to_env_value() else {
            return false;
        };
        Command::new(self.resolve_python())
            .args(["-c", &format!("import {module}")])
            .env("PYTHONPATH", pythonpath)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Verify the entry point without calling it: import the module and
    /// check the named attribute is callable. Runs captured under the probe
    /// timeout so a hanging import cannot stall the launcher.
    pub fn probe_entry(&self, entry: &EntrySpec) -> Result<(), LaunchError> {
        let python = self.resolve_python();
        let mut child = Command::new(&python)
            .arg("-c")
            .arg(probe_program(entry))
            .env("PYTHONPATH", self.search_path.to_env_value()?)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                LaunchError::RunnerUnavailable(format!("{}: {}", python.display(), e))
            })?;

        let timeout = Duration::from_secs(self.probe_timeout_secs);
        let status = match child.wait_timeout(timeout)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(LaunchError::ModuleImport {
                    module: entry.module.to_string(),
                    detail: format!(
                        "import probe timed out after {}s",
                        self.probe_timeout_secs
                    ),
                });
            }
        };

        let stdout = read_pipe(child.stdout.take());
        let stderr = read_pipe(child.stderr.take());

        if status.success() {
            return Ok(());
        }

        // The report is always the probe's final print; the module may have
        // written its own output to stdout while importing.
        let report = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| serde_json::from_str::<ProbeReport>(line.trim()).ok());

        match report {
            Some(report) if report.ok => Ok(()),
            Some(report) if report.stage == "callable" => {
                Err(LaunchError::EntryPointNotCallable {
                    entry: entry.to_string(),
                    detail: report.detail,
                })
            }
            Some(report) => Err(LaunchError::ModuleImport {
                module: entry.module.to_string(),
                detail: report.detail,
            }),
            // The probe crashed before it could report; relay whatever the
            // interpreter left on either stream.
            None => {
                let mut detail = String::new();
                if !stdout.trim().is_empty() {
                    detail.push_str(stdout.trim());
                }
                if !stderr.trim().is_empty() {
                    if !detail.is_empty() {
                        detail.push('\n');
                    }
                    detail.push_str(stderr.trim());
                }
                Err(LaunchError::ModuleImport {
                    module: entry.module.to_string(),
                    detail,
                })
            }
        }
    }

    // ── Launch ──────────────────────────────────────────────────────────

    /// Write the launch shim: a generated two-line module that imports the
    /// entry point and calls it. The shim never touches `sys.path`; the
    /// composed `PYTHONPATH` provides the roots.
    pub fn write_shim(&self, entry: &EntrySpec) -> Result<PathBuf, LaunchError> {
        let ts = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let path = env::temp_dir().join(format!("dashrunner_shim_{ts}.py"));
        let code = format!(
            "from {module} import {callable}\n\n{callable}()\n",
            module = entry.module,
            callable = entry.callable,
        );
        fs::write(&path, code)?;
        Ok(path)
    }

    /// Spawn a runner command attached: stdio inherited, environment
    /// composed from the search path. The child's output and exit status
    /// belong to the application, not to this layer.
    pub fn spawn_attached(&self, mut command: Command) -> Result<Child, LaunchError> {
        let program = command.get_program().to_string_lossy().to_string();
        command
            .env("PYTHONPATH", self.search_path.to_env_value()?)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| LaunchError::RunnerUnavailable(format!("{}: {}", program, e)))
    }

    /// Run a command to completion with captured output, bounded by
    /// `timeout_secs` (0 = no bound). Used by tests and the probe path; the
    /// real launch goes through `spawn_attached`.
    pub fn run_captured(
        &self,
        mut command: Command,
        timeout_secs: u64,
    ) -> Result<LaunchOutcome, LaunchError> {
        let program = command.get_program().to_string_lossy().to_string();
        let mut child = command
            .env("PYTHONPATH", self.search_path.to_env_value()?)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| LaunchError::RunnerUnavailable(format!("{}: {}", program, e)))?;

        if timeout_secs > 0 {
            let timeout = Duration::from_secs(timeout_secs);
            match child.wait_timeout(timeout)? {
                Some(status) => Ok(LaunchOutcome {
                    stdout: read_pipe(child.stdout.take()),
                    stderr: read_pipe(child.stderr.take()),
                    exit_code: status.code(),
                }),
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    Ok(LaunchOutcome {
                        stdout: String::new(),
                        stderr: format!("Process timed out after {} seconds", timeout_secs),
                        exit_code: None,
                    })
                }
            }
        } else {
            let output = child.wait_with_output()?;
            Ok(LaunchOutcome {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code(),
            })
        }
    }
}

/// Inline program run by the entry probe. Module and callable names are
/// validated identifiers, so interpolation is safe.
fn probe_program(entry: &EntrySpec) -> String {
    format!(
        concat!(
            "import importlib, json, sys\n",
            "report = {{\"stage\": \"import\", \"ok\": False, \"detail\": \"\"}}\n",
            "try:\n",
            "    mod = importlib.import_module(\"{module}\")\n",
            "except BaseException:\n",
            "    import traceback\n",
            "    report[\"detail\"] = traceback.format_exc()\n",
            "    print(json.dumps(report))\n",
            "    sys.exit(1)\n",
            "report[\"stage\"] = \"callable\"\n",
            "attr = getattr(mod, \"{callable}\", None)\n",
            "if not callable(attr):\n",
            "    report[\"detail\"] = \"attribute '{callable}' is \" + type(attr).__name__\n",
            "    print(json.dumps(report))\n",
            "    sys.exit(1)\n",
            "report[\"ok\"] = True\n",
            "print(json.dumps(report))\n",
        ),
        module = entry.module,
        callable = entry.callable,
    )
}

/// Return the Python interpreter path inside a venv.
pub(crate) fn venv_python(venv_path: &Path) -> PathBuf {
    if cfg!(windows) {
        venv_path.join("Scripts").join("python.exe")
    } else {
        // Try python3 first, then python (venv may create either or both)
        let python3 = venv_path.join("bin").join("python3");
        if python3.exists() {
            return python3;
        }
        venv_path.join("bin").join("python")
    }
}

/// Return the path of a named executable inside a venv.
pub(crate) fn venv_bin(venv_path: &Path, name: &str) -> PathBuf {
    if cfg!(windows) {
        venv_path.join("Scripts").join(format!("{name}.exe"))
    } else {
        venv_path.join("bin").join(name)
    }
}

/// Helper to read a piped child stdio handle into a String.
fn read_pipe<R: std::io::Read>(pipe: Option<R>) -> String {
    match pipe {
        Some(mut r) => {
            let mut buf = Vec::new();
            let _ = std::io::Read::read_to_end(&mut r, &mut buf);
            String::from_utf8_lossy(&buf).to_string()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_launcher(base_dir: &Path, source_root: &Path) -> Launcher {
        let config = AppConfig::default();
        Launcher::new(
            base_dir.to_path_buf(),
            SearchPath::compose(source_root, &[]),
            &config,
        )
    }

    fn python_available() -> bool {
        Command::new("python3")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_write_shim_content() {
        let base = PathBuf::from("test_launcher_shim");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();

        let launcher = test_launcher(&base, &base.join("src"));
        let entry = EntrySpec::parse("ui.dashboard:main").unwrap();
        let shim = launcher.write_shim(&entry).unwrap();

        let content = fs::read_to_string(&shim).unwrap();
        assert!(content.contains("from ui.dashboard import main"));
        assert!(content.contains("main()"));
        assert!(!content.contains("sys.path"));

        let _ = fs::remove_file(&shim);
        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_probe_program_names_entry() {
        let entry = EntrySpec::parse("ui.dashboard:render").unwrap();
        let program = probe_program(&entry);
        assert!(program.contains("import_module(\"ui.dashboard\")"));
        assert!(program.contains("getattr(mod, \"render\", None)"));
    }

    #[test]
    fn test_find_project_venv_absent() {
        let base = PathBuf::from("test_launcher_no_venv");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();

        let launcher = test_launcher(&base, &base.join("src"));
        assert!(launcher.find_project_venv().is_none());

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_find_project_venv_disabled() {
        let base = PathBuf::from("test_launcher_venv_off");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(base.join(".venv/bin")).unwrap();
        fs::write(base.join(".venv/bin/python3"), "").unwrap();

        let mut config = AppConfig::default();
        config.use_project_venv = false;
        let launcher = Launcher::new(
            base.clone(),
            SearchPath::compose(&base.join("src"), &[]),
            &config,
        );
        assert!(launcher.find_project_venv().is_none());

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_scan_dependencies_filters_stdlib() {
        let base = PathBuf::from("test_launcher_scan");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        let source = base.join("dashboard.py");
        fs::write(&source, "import os\nimport streamlit\nfrom pathlib import Path\n").unwrap();

        let launcher = test_launcher(&base, &base);
        let deps = launcher.scan_dependencies(&source).unwrap();
        assert_eq!(deps, vec!["streamlit"]);

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_probe_entry_ok() {
        if !python_available() {
            return;
        }
        let base = PathBuf::from("test_launcher_probe_ok");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(base.join("src/ui")).unwrap();
        fs::write(base.join("src/ui/dashboard.py"), "def main():\n    pass\n").unwrap();

        let launcher = test_launcher(&base, &base.join("src"));
        let entry = EntrySpec::parse("ui.dashboard:main").unwrap();
        assert!(launcher.probe_entry(&entry).is_ok());

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_probe_entry_missing_attribute() {
        if !python_available() {
            return;
        }
        let base = PathBuf::from("test_launcher_probe_attr");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(base.join("src/ui")).unwrap();
        fs::write(base.join("src/ui/dashboard.py"), "x = 1\n").unwrap();

        let launcher = test_launcher(&base, &base.join("src"));
        let entry = EntrySpec::parse("ui.dashboard:main").unwrap();
        let err = launcher.probe_entry(&entry).unwrap_err();
        assert!(matches!(err, LaunchError::EntryPointNotCallable { .. }));

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_probe_entry_not_callable() {
        if !python_available() {
            return;
        }
        let base = PathBuf::from("test_launcher_probe_nc");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(base.join("src/ui")).unwrap();
        fs::write(base.join("src/ui/dashboard.py"), "main = 42\n").unwrap();

        let launcher = test_launcher(&base, &base.join("src"));
        let entry = EntrySpec::parse("ui.dashboard:main").unwrap();
        match launcher.probe_entry(&entry) {
            Err(LaunchError::EntryPointNotCallable { detail, .. }) => {
                assert!(detail.contains("int"), "unexpected detail: {detail}");
            }
            other => panic!("expected EntryPointNotCallable, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_probe_entry_import_error() {
        if !python_available() {
            return;
        }
        let base = PathBuf::from("test_launcher_probe_import");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(base.join("src/ui")).unwrap();
        fs::write(
            base.join("src/ui/dashboard.py"),
            "import module_that_does_not_exist_xyz\n\ndef main():\n    pass\n",
        )
        .unwrap();

        let launcher = test_launcher(&base, &base.join("src"));
        let entry = EntrySpec::parse("ui.dashboard:main").unwrap();
        match launcher.probe_entry(&entry) {
            Err(LaunchError::ModuleImport { module, detail }) => {
                assert_eq!(module, "ui.dashboard");
                assert!(detail.contains("module_that_does_not_exist_xyz"));
            }
            other => panic!("expected ModuleImport, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_probe_entry_detail_survives_module_output() {
        if !python_available() {
            return;
        }
        let base = PathBuf::from("test_launcher_probe_noisy");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(base.join("src/ui")).unwrap();
        // The module prints to stdout before the import fails; the
        // traceback must still reach the error detail.
        fs::write(
            base.join("src/ui/dashboard.py"),
            "print('loading widgets...')\nimport module_missing_abc\n\ndef main():\n    pass\n",
        )
        .unwrap();

        let launcher = test_launcher(&base, &base.join("src"));
        let entry = EntrySpec::parse("ui.dashboard:main").unwrap();
        match launcher.probe_entry(&entry) {
            Err(LaunchError::ModuleImport { detail, .. }) => {
                assert!(
                    detail.contains("module_missing_abc"),
                    "traceback missing from detail: {detail:?}"
                );
            }
            other => panic!("expected ModuleImport, got {other:?}"),
        }

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_run_captured_relays_output_and_code() {
        if !python_available() {
            return;
        }
        let base = PathBuf::from("test_launcher_captured");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();

        let launcher = test_launcher(&base, &base);
        let mut command = Command::new("python3");
        command.args(["-c", "import sys; print('out'); sys.exit(3)"]);
        let outcome = launcher.run_captured(command, 10).unwrap();
        assert_eq!(outcome.exit_code, Some(3));
        assert!(outcome.stdout.contains("out"));
        assert!(!outcome.is_success());

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_run_captured_timeout() {
        if !python_available() {
            return;
        }
        let base = PathBuf::from("test_launcher_timeout");
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();

        let launcher = test_launcher(&base, &base);
        let mut command = Command::new("python3");
        command.args(["-c", "import time; time.sleep(10)"]);
        let outcome = launcher.run_captured(command, 1).unwrap();
        assert!(outcome.exit_code.is_none());
        assert!(outcome.stderr.contains("timed out"));

        let _ = fs::remove_dir_all(&base);
    }

    #[test]
    fn test_venv_python_layout() {
        let venv = PathBuf::from("test_launcher_venv_layout");
        let python = venv_python(&venv);
        if cfg!(windows) {
            assert!(python.ends_with("Scripts/python.exe"));
        } else {
            // Without an existing python3, falls back to bin/python
            assert!(python.ends_with("bin/python"));
        }
    }
}
