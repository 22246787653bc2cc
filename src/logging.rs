//! Logging configuration module
//!
//! Redis-compatible log lines (`pid:role-char timestamp message`) written to
//! the configured log file or to stderr, filtered by a Redis-style level.

use crate::config::ServerConfig;
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

/// Redis-style log levels mapped to Rust log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedisLogLevel {
    Debug,
    Verbose,
    Notice,
    Warning,
    Nothing,
}

impl RedisLogLevel {
    /// Parse Redis-style log level string, falling back to notice
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "debug" => Self::Debug,
            "verbose" => Self::Verbose,
            "notice" => Self::Notice,
            "warning" => Self::Warning,
            "nothing" => Self::Nothing,
            _ => Self::Notice,
        }
    }

    /// Convert to Rust log LevelFilter
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::Debug,
            Self::Verbose => LevelFilter::Info, // Redis "verbose" ≈ info
            Self::Notice => LevelFilter::Info,
            Self::Warning => LevelFilter::Warn,
            Self::Nothing => LevelFilter::Off,
        }
    }
}

/// Logger writing Redis-style lines to a file or stderr
pub struct CfLogger {
    level: LevelFilter,
    file: Option<Mutex<File>>,
}

impl CfLogger {
    /// Create a new logger from config
    pub fn new(config: &ServerConfig) -> Self {
        let level = RedisLogLevel::parse(&config.loglevel).to_level_filter();

        let file = if config.logfile.is_empty() {
            None
        } else {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&config.logfile)
            {
                Ok(f) => Some(Mutex::new(f)),
                Err(e) => {
                    eprintln!(
                        "Warning: Failed to open log file '{}': {}",
                        config.logfile, e
                    );
                    None
                }
            }
        };

        Self { level, file }
    }

    /// Format log record as Redis-style output
    fn format_record(&self, record: &Record) -> String {
        let level_char = match record.level() {
            log::Level::Error => '!',
            log::Level::Warn => '#',
            log::Level::Info => '*',
            log::Level::Debug => '-',
            log::Level::Trace => '.',
        };

        format!(
            "{}:M {} {} {}\n",
            std::process::id(),
            format_timestamp(SystemTime::now()),
            level_char,
            record.args()
        )
    }
}

impl Log for CfLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let formatted = self.format_record(record);

        match &self.file {
            Some(file) => {
                let _ = file.lock().write_all(formatted.as_bytes());
            }
            // Write to stderr (like Redis)
            None => eprint!("{}", formatted),
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.lock().flush();
        }
    }
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// `16 Oct 2026 09:30:00.123` in UTC
fn format_timestamp(now: SystemTime) -> String {
    let since_epoch = now.duration_since(UNIX_EPOCH).unwrap_or_default();
    let secs = since_epoch.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    let tod = secs % 86_400;

    format!(
        "{:02} {} {} {:02}:{:02}:{:02}.{:03}",
        day,
        MONTHS[(month - 1) as usize],
        year,
        tod / 3600,
        (tod / 60) % 60,
        tod % 60,
        since_epoch.subsec_millis()
    )
}

/// Days since 1970-01-01 to (year, month, day), proleptic Gregorian
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Initialize logging from server config
pub fn init_logging(config: &ServerConfig) -> Result<(), log::SetLoggerError> {
    let logger = Box::new(CfLogger::new(config));
    let level = RedisLogLevel::parse(&config.loglevel).to_level_filter();

    log::set_boxed_logger(logger)?;
    log::set_max_level(level);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(
            RedisLogLevel::parse("debug").to_level_filter(),
            LevelFilter::Debug
        );
        assert_eq!(
            RedisLogLevel::parse("VERBOSE").to_level_filter(),
            LevelFilter::Info
        );
        assert_eq!(
            RedisLogLevel::parse("warning").to_level_filter(),
            LevelFilter::Warn
        );
        assert_eq!(
            RedisLogLevel::parse("nothing").to_level_filter(),
            LevelFilter::Off
        );
        // Unknown defaults to notice
        assert_eq!(RedisLogLevel::parse("unknown"), RedisLogLevel::Notice);
    }

    #[test]
    fn test_timestamp_format() {
        assert_eq!(format_timestamp(UNIX_EPOCH), "01 Jan 1970 00:00:00.000");
        let t = UNIX_EPOCH + Duration::from_millis(951_782_400_250);
        assert_eq!(format_timestamp(t), "29 Feb 2000 00:00:00.250");
        let t = UNIX_EPOCH + Duration::from_secs(1_791_106_245);
        assert_eq!(format_timestamp(t), "04 Oct 2026 09:30:45.000");
    }

    #[test]
    fn test_init_logging_installs_once() {
        let config = ServerConfig {
            loglevel: "nothing".to_string(),
            ..Default::default()
        };
        assert!(init_logging(&config).is_ok());
        assert_eq!(log::max_level(), LevelFilter::Off);
        assert!(init_logging(&config).is_err());
    }

    #[test]
    fn test_logger_writes_file() {
        let path = std::env::temp_dir().join(format!("cuckoo-kv-log-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let config = ServerConfig {
            loglevel: "warning".to_string(),
            logfile: path.to_string_lossy().into_owned(),
            ..Default::default()
        };
        let logger = CfLogger::new(&config);

        logger.log(
            &Record::builder()
                .args(format_args!("filter is full"))
                .level(log::Level::Warn)
                .build(),
        );
        logger.log(
            &Record::builder()
                .args(format_args!("growing"))
                .level(log::Level::Debug)
                .build(),
        );
        logger.flush();

        let written = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(written.lines().count(), 1);
        assert!(written.starts_with(&format!("{}:M ", std::process::id())));
        assert!(written.trim_end().ends_with("# filter is full"));
    }
}
