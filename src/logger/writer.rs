//! Log writer
//!
//! Process-wide sink for the access and error logs. Each target is stdout,
//! stderr or an append-mode file.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Mutex, OnceLock};

static LOG_WRITER: OnceLock<LogWriter> = OnceLock::new();

/// Severity threshold from `logging.level`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
}

impl Level {
    /// Unknown names fall back to `info`
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "debug" | "trace" => Self::Debug,
            _ => Self::Info,
        }
    }
}

enum LogTarget {
    Stdout,
    Stderr,
    File(File),
}

impl LogTarget {
    fn open(path: Option<&str>, fallback: Self) -> io::Result<Self> {
        match path {
            Some(path) => open_log_file(path).map(Self::File),
            None => Ok(fallback),
        }
    }

    fn write_line(&mut self, message: &str) {
        match self {
            Self::Stdout => println!("{message}"),
            Self::Stderr => eprintln!("{message}"),
            Self::File(file) => {
                let _ = writeln!(file, "{message}");
            }
        }
    }
}

pub struct LogWriter {
    level: Level,
    access: Mutex<LogTarget>,
    error: Mutex<LogTarget>,
}

impl LogWriter {
    fn new(level: Level, access_log_file: Option<&str>, error_log_file: Option<&str>) -> io::Result<Self> {
        Ok(Self {
            level,
            access: Mutex::new(LogTarget::open(access_log_file, LogTarget::Stdout)?),
            error: Mutex::new(LogTarget::open(error_log_file, LogTarget::Stderr)?),
        })
    }

    pub const fn level(&self) -> Level {
        self.level
    }

    /// Info and access lines share the access target
    pub fn write_access(&self, message: &str) {
        if let Ok(mut target) = self.access.lock() {
            target.write_line(message);
        }
    }

    pub fn write_error(&self, message: &str) {
        if let Ok(mut target) = self.error.lock() {
            target.write_line(message);
        }
    }
}

fn open_log_file(path: &str) -> io::Result<File> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global writer. Fails if a log file cannot be opened or the
/// writer was already installed.
pub fn init(level: Level, access_log_file: Option<&str>, error_log_file: Option<&str>) -> io::Result<()> {
    let writer = LogWriter::new(level, access_log_file, error_log_file)?;
    LOG_WRITER.set(writer).map_err(|_| {
        io::Error::new(io::ErrorKind::AlreadyExists, "Log writer already initialized")
    })
}

/// The global writer, if installed
pub fn get() -> Option<&'static LogWriter> {
    LOG_WRITER.get()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("DEBUG"), Level::Debug);
        assert_eq!(Level::parse("warning"), Level::Warn);
        assert_eq!(Level::parse("error"), Level::Error);
        assert_eq!(Level::parse("verbose"), Level::Info);
        assert!(Level::Debug > Level::Info);
    }

    #[test]
    fn test_file_target_appends() {
        let dir = std::env::temp_dir().join(format!("gw-log-{}", std::process::id()));
        let path = dir.join("nested").join("access.log");
        let path_str = path.to_string_lossy().into_owned();

        let writer = LogWriter::new(Level::Info, Some(&path_str), None).unwrap();
        writer.write_access("first");
        writer.write_access("second");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
        let _ = std::fs::remove_dir_all(dir);
    }
}
