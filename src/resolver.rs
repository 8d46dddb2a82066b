use crate::error::LaunchError;
use regex::Regex;
use std::env;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

/// A validated dotted module path, e.g. `ui.dashboard`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePath(String);

impl ModulePath {
    /// Parse a dotted module path. Every segment must be a valid Python
    /// identifier; relative paths (leading dots) are rejected.
    pub fn parse(raw: &str) -> Result<Self, LaunchError> {
        validate_module(raw).map_err(|reason| LaunchError::InvalidEntrySpec {
            spec: raw.to_string(),
            reason,
        })?;
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for ModulePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn validate_module(raw: &str) -> Result<(), String> {
    if raw.is_empty() {
        return Err("module path is empty".to_string());
    }
    for segment in raw.split('.') {
        if segment.is_empty() {
            return Err("module path has an empty segment".to_string());
        }
        if !IDENTIFIER_RE.is_match(segment) {
            return Err(format!("'{segment}' is not a valid identifier"));
        }
    }
    Ok(())
}

/// An entry point in `module:callable` form. The callable defaults to
/// `main` when the spec carries no colon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySpec {
    pub module: ModulePath,
    pub callable: String,
}

impl EntrySpec {
    pub fn parse(raw: &str) -> Result<Self, LaunchError> {
        let invalid = |reason: String| LaunchError::InvalidEntrySpec {
            spec: raw.to_string(),
            reason,
        };

        let (module_part, callable_part) = match raw.split_once(':') {
            None => (raw, "main"),
            Some((m, c)) => {
                if c.contains(':') {
                    return Err(invalid("expected at most one ':'".to_string()));
                }
                (m, c)
            }
        };

        validate_module(module_part).map_err(invalid)?;

        if callable_part.is_empty() {
            return Err(invalid("callable part is empty".to_string()));
        }
        if !IDENTIFIER_RE.is_match(callable_part) {
            return Err(invalid(format!(
                "'{callable_part}' is not a valid callable name"
            )));
        }

        Ok(Self {
            module: ModulePath(module_part.to_string()),
            callable: callable_part.to_string(),
        })
    }
}

impl fmt::Display for EntrySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.callable)
    }
}

/// Whether a resolved module is a plain `.py` file or a package directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Module,
    Package,
}

/// A module located on disk: the search root that matched, the source file
/// (`foo.py` or `foo/__init__.py`), and its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub root: PathBuf,
    pub source: PathBuf,
    pub kind: ModuleKind,
}

/// An ordered, immutable list of module search roots. The application's
/// source root always sits at index 0 and appears exactly once.
#[derive(Debug, Clone)]
pub struct SearchPath {
    roots: Vec<PathBuf>,
}

impl SearchPath {
    /// Compose a search path from the application's source root and the
    /// inherited entries (typically from `PYTHONPATH`). The source root is
    /// placed first; any inherited entry pointing at the same directory is
    /// dropped so the root appears exactly once.
    pub fn compose(source_root: &Path, inherited: &[PathBuf]) -> Self {
        let mut roots = vec![source_root.to_path_buf()];
        for entry in inherited {
            if !same_path(entry, source_root) {
                roots.push(entry.clone());
            }
        }
        Self { roots }
    }

    /// Read the inherited search path from `PYTHONPATH`, skipping empty
    /// entries.
    pub fn inherited_from_env() -> Vec<PathBuf> {
        match env::var_os("PYTHONPATH") {
            Some(raw) => env::split_paths(&raw)
                .filter(|p| !p.as_os_str().is_empty())
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Render the search path as a `PYTHONPATH` value for a child process.
    pub fn to_env_value(&self) -> Result<OsString, LaunchError> {
        env::join_paths(&self.roots).map_err(|e| LaunchError::PathResolution {
            reason: format!("cannot build PYTHONPATH: {e}"),
        })
    }

    /// Locate `module` under the search roots, first root wins. Within a
    /// root a package (`seg/__init__.py`) shadows a module file (`seg.py`);
    /// directories without `__init__.py` act as namespace packages for
    /// intermediate segments but never satisfy the final segment.
    pub fn resolve(&self, module: &ModulePath) -> Result<ResolvedModule, LaunchError> {
        for root in &self.roots {
            if let Some(found) = resolve_in_root(root, module) {
                return Ok(found);
            }
        }
        Err(LaunchError::ModuleNotFound {
            module: module.to_string(),
            searched: self.roots.clone(),
        })
    }
}

fn resolve_in_root(root: &Path, module: &ModulePath) -> Option<ResolvedModule> {
    let segments: Vec<&str> = module.segments().collect();
    let mut dir = root.to_path_buf();

    for (i, segment) in segments.iter().enumerate() {
        let is_last = i + 1 == segments.len();
        if is_last {
            let init = dir.join(segment).join("__init__.py");
            if init.is_file() {
                return Some(ResolvedModule {
                    root: root.to_path_buf(),
                    source: init,
                    kind: ModuleKind::Package,
                });
            }
            let file = dir.join(format!("{segment}.py"));
            if file.is_file() {
                return Some(ResolvedModule {
                    root: root.to_path_buf(),
                    source: file,
                    kind: ModuleKind::Module,
                });
            }
            // A bare directory here would only be a namespace package,
            // which has no source file to run.
            return None;
        }
        // Intermediate segments must be directories; a plain `seg.py`
        // cannot contain submodules.
        let next = dir.join(segment);
        if !next.is_dir() {
            return None;
        }
        dir = next;
    }
    None
}

/// Resolve the application base directory: the configured `app_dir` when
/// set, the current working directory otherwise. The result is
/// canonicalized and must be an existing directory.
pub fn resolve_base_dir(app_dir: Option<&str>) -> Result<PathBuf, LaunchError> {
    let raw = match app_dir {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => env::current_dir().map_err(|e| LaunchError::PathResolution {
            reason: format!("cannot determine current directory: {e}"),
        })?,
    };
    let canonical = raw
        .canonicalize()
        .map_err(|e| LaunchError::PathResolution {
            reason: format!("{}: {e}", raw.display()),
        })?;
    if !canonical.is_dir() {
        return Err(LaunchError::PathResolution {
            reason: format!("{} is not a directory", canonical.display()),
        });
    }
    Ok(canonical)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(ca), Ok(cb)) => ca == cb,
        _ => a == b,
    }
}
