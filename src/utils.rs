use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

// Cached regexes — compiled once, reused across all calls
static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^import\s+([a-zA-Z_][a-zA-Z0-9_]*)").unwrap());
static FROM_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^from\s+([a-zA-Z_][a-zA-Z0-9_]*)\s+import").unwrap());

/// Find the largest char boundary in `s` that is <= `max_bytes`.
/// Safe for slicing: `&s[..find_char_boundary(s, max_bytes)]` never panics.
pub fn find_char_boundary(s: &str, max_bytes: usize) -> usize {
    if max_bytes >= s.len() {
        return s.len();
    }
    let mut boundary = max_bytes;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

/// Render a duration for human eyes: "850ms", "2.4s", "1m 12s".
pub fn format_duration(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1000 {
        return format!("{}ms", millis);
    }
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        return format!("{:.1}s", secs);
    }
    let whole = d.as_secs();
    format!("{}m {}s", whole / 60, whole % 60)
}

/// Extract top-level import roots from Python source.
///
/// Returns the first dotted segment of every `import x` / `from x import y`
/// statement. Relative imports (`from . import x`, `from ..pkg import y`)
/// are internal to the application package and are skipped.
pub fn extract_imports(code: &str) -> Vec<String> {
    let mut imports = Vec::new();

    for line in code.lines() {
        let trimmed = line.trim();

        // `from .something import x` — relative, never a dependency
        if trimmed.starts_with("from .") {
            continue;
        }

        if let Some(caps) = IMPORT_RE.captures(trimmed) {
            if let Some(pkg) = caps.get(1) {
                imports.push(pkg.as_str().to_string());
            }
        }

        if let Some(caps) = FROM_IMPORT_RE.captures(trimmed) {
            if let Some(pkg) = caps.get(1) {
                imports.push(pkg.as_str().to_string());
            }
        }
    }

    // Remove duplicates
    imports.sort();
    imports.dedup();
    imports
}

/// Check if a package is in Python's standard library
pub fn is_stdlib(package: &str) -> bool {
    // Common Python 3 standard library modules
    const STDLIB_MODULES: &[&str] = &[
        "abc", "aifc", "argparse", "array", "ast", "asynchat", "asyncio", "asyncore",
        "atexit", "audioop", "base64", "bdb", "binascii", "binhex", "bisect", "builtins",
        "bz2", "calendar", "cgi", "cgitb", "chunk", "cmath", "cmd", "code", "codecs",
        "codeop", "collections", "colorsys", "compileall", "concurrent", "configparser",
        "contextlib", "contextvars", "copy", "copyreg", "crypt", "csv", "ctypes", "curses",
        "dataclasses", "datetime", "dbm", "decimal", "difflib", "dis", "distutils", "doctest",
        "email", "encodings", "enum", "errno", "faulthandler", "fcntl", "filecmp", "fileinput",
        "fnmatch", "fractions", "ftplib", "functools", "gc", "getopt", "getpass", "gettext",
        "glob", "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http", "idlelib",
        "imaplib", "imghdr", "imp", "importlib", "inspect", "io", "ipaddress", "itertools",
        "json", "keyword", "lib2to3", "linecache", "locale", "logging", "lzma", "mailbox",
        "mailcap", "marshal", "math", "mimetypes", "mmap", "modulefinder", "msilib", "msvcrt",
        "multiprocessing", "netrc", "nis", "nntplib", "numbers", "operator", "optparse", "os",
        "ossaudiodev", "parser", "pathlib", "pdb", "pickle", "pickletools", "pipes", "pkgutil",
        "platform", "plistlib", "poplib", "posix", "posixpath", "pprint", "profile", "pstats",
        "pty", "pwd", "py_compile", "pyclbr", "pydoc", "queue", "quopri", "random", "re",
        "readline", "reprlib", "resource", "rlcompleter", "runpy", "sched", "secrets", "select",
        "selectors", "shelve", "shlex", "shutil", "signal", "site", "smtpd", "smtplib", "sndhdr",
        "socket", "socketserver", "spwd", "sqlite3", "ssl", "stat", "statistics", "string",
        "stringprep", "struct", "subprocess", "sunau", "symbol", "symtable", "sys", "sysconfig",
        "syslog", "tabnanny", "tarfile", "telnetlib", "tempfile", "termios", "test", "textwrap",
        "threading", "time", "timeit", "tkinter", "token", "tokenize", "tomllib", "trace",
        "traceback", "tracemalloc", "tty", "turtle", "turtledemo", "types", "typing", "unicodedata",
        "unittest", "urllib", "uu", "uuid", "venv", "warnings", "wave", "weakref", "webbrowser",
        "winreg", "winsound", "wsgiref", "xdrlib", "xml", "xmlrpc", "zipapp", "zipfile", "zipimport",
        "zlib", "_thread",
    ];

    STDLIB_MODULES.contains(&package)
}
