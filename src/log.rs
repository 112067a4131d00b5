use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, OnceLock};

/// Verbosity levels for dashboard logging, ordered by how much they emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            _ => Err(format!(
                "Invalid log level '{}': expected error, warn, info, or debug",
                s
            )),
        }
    }
}

/// The sink owns both the output handle and the verbosity gate. The
/// dashboard owns the terminal's alternate screen, so log lines go to a
/// file rather than stderr; until `init_file_sink` runs (and in tests,
/// which never install one) every level is disabled and lines are dropped.
struct Sink {
    file: Mutex<File>,
    level: LogLevel,
}

static SINK: OnceLock<Sink> = OnceLock::new();

/// Install the file sink at the given verbosity. Appends to `path`,
/// creating parent directories as needed. The first sink installed wins;
/// later calls are no-ops.
pub fn init_file_sink(path: &Path, level: LogLevel) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create log directory {}: {}", parent.display(), e))?;
    }
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .map_err(|e| format!("Failed to open log file {}: {}", path.display(), e))?;
    let _ = SINK.set(Sink {
        file: Mutex::new(file),
        level,
    });
    Ok(())
}

/// Whether a line at this level would be written. Used by the log macros
/// to skip formatting entirely when the sink would drop the line anyway.
pub fn enabled(level: LogLevel) -> bool {
    SINK.get().is_some_and(|sink| level <= sink.level)
}

/// Write one formatted line to the sink. Called by the log macros; not
/// intended for direct use.
pub fn write_line(level: LogLevel, line: &str) {
    let Some(sink) = SINK.get() else {
        return;
    };
    if level > sink.level {
        return;
    }
    let Ok(mut file) = sink.file.lock() else {
        return;
    };
    let stamp = chrono::Utc::now().to_rfc3339();
    let _ = writeln!(file, "{} [{}] {}", stamp, level.tag(), line);
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Error) {
            $crate::log::write_line($crate::log::LogLevel::Error, &format!($($arg)*))
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Warn) {
            $crate::log::write_line($crate::log::LogLevel::Warn, &format!($($arg)*))
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Info) {
            $crate::log::write_line($crate::log::LogLevel::Info, &format!($($arg)*))
        }
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Debug) {
            $crate::log::write_line($crate::log::LogLevel::Debug, &format!($($arg)*))
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_known_levels_case_insensitively() {
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("INFO".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn levels_order_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Warn < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
    }

    #[test]
    fn nothing_enabled_without_a_sink() {
        // Unit tests never install the sink, so every level stays off.
        assert!(!enabled(LogLevel::Error));
        assert!(!enabled(LogLevel::Debug));
        write_line(LogLevel::Info, "dropped");
    }

    #[test]
    fn tags_match_levels() {
        assert_eq!(LogLevel::Error.tag(), "ERROR");
        assert_eq!(LogLevel::Debug.tag(), "DEBUG");
    }
}
