use crate::utils::find_char_boundary;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Per-run file logger. Every launch gets its own timestamped file under
/// `log_dir`, and every line carries the run id so concurrent launches into
/// the same directory stay distinguishable.
pub struct Logger {
    log_file: PathBuf,
    run_id: Uuid,
}

impl Logger {
    pub fn new(log_dir: &str) -> io::Result<Self> {
        let dir = PathBuf::from(log_dir);
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let log_file = dir.join(format!("launch_{}.log", timestamp));

        Ok(Self {
            log_file,
            run_id: Uuid::new_v4(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn log(&self, message: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;

        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        writeln!(file, "[{}] [{}] {}", timestamp, self.run_id, message)?;
        Ok(())
    }

    pub fn log_resolution(&self, module: &str, source: &Path) -> io::Result<()> {
        self.log(&format!("RESOLVED {} -> {}", module, source.display()))
    }

    pub fn log_spawn(&self, command: &str) -> io::Result<()> {
        self.log(&format!("SPAWN: {}", command))
    }

    pub fn log_exit(&self, code: Option<i32>) -> io::Result<()> {
        match code {
            Some(code) => self.log(&format!("EXIT: {}", code)),
            None => self.log("EXIT: terminated by signal"),
        }
    }

    pub fn log_error(&self, error: &str) -> io::Result<()> {
        let preview = if error.len() > 500 {
            let end = find_char_boundary(error, 500);
            format!("{}...", &error[..end])
        } else {
            error.to_string()
        };
        self.log(&format!("ERROR: {}", preview))
    }
}
