//! Server configuration
//!
//! Parses redis.conf-style `directive value` files. Unknown directives are
//! ignored so a full redis.conf can be pointed at the server unchanged.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::cuckoofilter::{
    CuckooFilterConfig, DEFAULT_CHUNK_SIZE, MAX_BUCKET_SIZE, MAX_EXPANSION, MAX_ITERATIONS,
};

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Log verbosity: debug, verbose, notice, warning, nothing (default: notice)
    pub loglevel: String,
    /// Log file path, empty for stderr
    pub logfile: String,
    /// Working directory for snapshot files (default: ".")
    pub dir: String,
    /// Snapshot file name (default: dump.rdb)
    pub dbfilename: String,
    /// Parameters for filters created without CF.RESERVE
    pub cuckoo: CuckooFilterConfig,
    /// Largest bucket chunk returned by CF.SCANDUMP
    pub scandump_chunk_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            loglevel: "notice".to_string(),
            logfile: "".to_string(),
            dir: ".".to_string(),
            dbfilename: "dump.rdb".to_string(),
            cuckoo: CuckooFilterConfig::default(),
            scandump_chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ServerConfig {
    /// Full path of the snapshot file
    pub fn rdb_path(&self) -> PathBuf {
        Path::new(&self.dir).join(&self.dbfilename)
    }
}

/// Parse a configuration file on top of the defaults
pub fn parse_config_file(path: &Path) -> Result<ServerConfig> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    Ok(parse_config_str(&content))
}

/// Parse configuration text on top of the defaults.
/// Malformed lines are reported and skipped
pub fn parse_config_str(content: &str) -> ServerConfig {
    let mut config = ServerConfig::default();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();

        // Skip empty lines and comments
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Err(e) = parse_config_line(line, &mut config) {
            eprintln!("Warning: line {}: {}", line_num + 1, e);
        }
    }

    // Checked once all lines are in since it depends on cf-bucket-size too
    let cuckoo = &config.cuckoo;
    if CuckooFilterConfig::num_buckets(cuckoo.capacity, cuckoo.bucket_size).is_none() {
        let fallback = CuckooFilterConfig::default().capacity;
        eprintln!(
            "Warning: cf-default-capacity {} is too large, using {}",
            config.cuckoo.capacity, fallback
        );
        config.cuckoo.capacity = fallback;
    }

    config
}

fn parse_range<T>(value: &str, min: T, max: T, what: &str) -> std::result::Result<T, String>
where
    T: std::str::FromStr + PartialOrd + std::fmt::Display + Copy,
{
    let n: T = value
        .parse()
        .map_err(|_| format!("invalid {}: {}", what, value))?;
    if n < min || n > max {
        return Err(format!("{} must be between {} and {}", what, min, max));
    }
    Ok(n)
}

/// Parse a single configuration line
fn parse_config_line(line: &str, config: &mut ServerConfig) -> std::result::Result<(), String> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.is_empty() {
        return Ok(());
    }

    let directive = parts[0].to_lowercase();
    let value = || {
        parts
            .get(1)
            .copied()
            .ok_or_else(|| format!("{} directive requires a value", directive))
    };

    match directive.as_str() {
        "loglevel" => {
            let level = value()?.to_lowercase();
            if !matches!(
                level.as_str(),
                "debug" | "verbose" | "notice" | "warning" | "nothing"
            ) {
                return Err(format!("invalid loglevel: {}", level));
            }
            config.loglevel = level;
        }
        "logfile" => {
            // `logfile ""` selects stderr
            config.logfile = value()?.trim_matches('"').to_string();
        }
        "dir" => {
            config.dir = value()?.to_string();
        }
        "dbfilename" => {
            config.dbfilename = value()?.to_string();
        }
        "cf-default-capacity" => {
            config.cuckoo.capacity = parse_range(value()?, 1, usize::MAX, "capacity")?;
        }
        "cf-bucket-size" => {
            config.cuckoo.bucket_size = parse_range(value()?, 1, MAX_BUCKET_SIZE, "bucket size")?;
        }
        "cf-max-iterations" => {
            config.cuckoo.max_iterations =
                parse_range(value()?, 1, MAX_ITERATIONS, "max iterations")?;
        }
        "cf-expansion" => {
            config.cuckoo.expansion = parse_range(value()?, 0, MAX_EXPANSION, "expansion")?;
        }
        "cf-max-filters" => {
            config.cuckoo.max_filters = parse_range(value()?, 1, usize::MAX, "max filters")?;
        }
        "cf-scandump-chunk-size" => {
            config.scandump_chunk_size = parse_range(value()?, 1, usize::MAX, "chunk size")?;
        }
        _ => {
            // Unknown directive - ignore
        }
    }

    Ok(())
}
