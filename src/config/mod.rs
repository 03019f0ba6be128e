use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{DsmrVersion, OutputFormat};
use crate::p1_telegram::framer::FrameLimits;
use crate::p1_telegram::structs::{CaptureOptions, FieldErrorPolicy};

/// Searched in this order when no config file is given
pub const CONFIG_PATHS: [&str; 2] = ["config/p1.yaml", "p1.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Unable to parse config: {0}")]
    Parse(#[from] serde_yml::Error),
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Serial,
    File,
}

fn source_kind_default() -> SourceKind { return SourceKind::Serial }
fn source_port_default() -> String { return "/dev/ttyUSB0".to_string() }
fn source_xonxoff_default() -> bool { return true }
fn source_timeout_secs_default() -> u64 { return 12 }
fn source_file_default() -> PathBuf { return PathBuf::from("raw.out") }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SourceConfig {
    #[serde(default="source_kind_default")]
    pub kind: SourceKind,
    #[serde(default="source_port_default")]
    pub port: String,
    #[serde(default)]
    pub dsmr_version: DsmrVersion,
    /// Overrides the baud rate of the DSMR version
    #[serde(default)]
    pub baud_rate: Option<u32>,
    #[serde(default="source_xonxoff_default")]
    pub xonxoff: bool,
    #[serde(default="source_timeout_secs_default")]
    pub timeout_secs: u64,
    #[serde(default="source_file_default")]
    pub file: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig {
            kind: source_kind_default(),
            port: source_port_default(),
            dsmr_version: DsmrVersion::default(),
            baud_rate: None,
            xonxoff: source_xonxoff_default(),
            timeout_secs: source_timeout_secs_default(),
            file: source_file_default(),
        }
    }
}

/* A DSMR text message (0-0:96.13.0) alone is up to 2048 hex digits */
fn capture_max_line_len_default() -> Option<usize> { return Some(4096) }
fn capture_max_frame_len_default() -> Option<usize> { return Some(16384) }
fn capture_max_lines_default() -> Option<usize> { return Some(128) }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct CaptureConfig {
    #[serde(default="capture_max_line_len_default")]
    pub max_line_len: Option<usize>,
    #[serde(default="capture_max_frame_len_default")]
    pub max_frame_len: Option<usize>,
    #[serde(default="capture_max_lines_default")]
    pub max_lines: Option<usize>,
    #[serde(default)]
    pub sync_on_header: bool,
    #[serde(default)]
    pub allow_missing_checksum: bool,
    #[serde(default)]
    pub field_errors: FieldErrorPolicy,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        CaptureConfig {
            max_line_len: capture_max_line_len_default(),
            max_frame_len: capture_max_frame_len_default(),
            max_lines: capture_max_lines_default(),
            sync_on_header: false,
            allow_missing_checksum: false,
            field_errors: FieldErrorPolicy::default(),
        }
    }
}

impl From<&CaptureConfig> for CaptureOptions {
    fn from(config: &CaptureConfig) -> Self {
        CaptureOptions {
            limits: FrameLimits {
                max_frame_len: config.max_frame_len,
                max_lines: config.max_lines,
                sync_on_header: config.sync_on_header,
            },
            allow_missing_checksum: config.allow_missing_checksum,
            field_errors: config.field_errors,
        }
    }
}

fn driver_iterations_default() -> u64 { return 6 }
fn driver_retry_delay_ms_default() -> u64 { return 1000 }
fn driver_max_consecutive_failures_default() -> u32 { return 10 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct DriverConfig {
    /// Number of capture cycles, 0 runs forever
    #[serde(default="driver_iterations_default")]
    pub iterations: u64,
    #[serde(default="driver_retry_delay_ms_default")]
    pub retry_delay_ms: u64,
    /// 0 never gives up
    #[serde(default="driver_max_consecutive_failures_default")]
    pub max_consecutive_failures: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            iterations: driver_iterations_default(),
            retry_delay_ms: driver_retry_delay_ms_default(),
            max_consecutive_failures: driver_max_consecutive_failures_default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        /* An empty file is a valid, all default config */
        if contents.trim().is_empty() {
            return Ok(Config::default());
        }
        Ok(serde_yml::from_str(contents)?)
    }

    /// Loads `path`, or the first existing file of [`CONFIG_PATHS`].
    /// Without any config file the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match CONFIG_PATHS.iter().map(PathBuf::from).find(|p| p.exists()) {
                Some(p) => p,
                None => {
                    info!("No config file found, using defaults");
                    return Ok(Config::default());
                }
            },
        };

        debug!("Loading config from {}", path.display());
        let contents = fs::read_to_string(&path).map_err(|e| ConfigError::Io(path.clone(), e))?;
        Self::from_yaml(&contents)
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions::from(&self.capture)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::from_yaml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.source.kind, SourceKind::Serial);
        assert_eq!(config.source.port, "/dev/ttyUSB0");
        assert_eq!(config.source.timeout_secs, 12);
        assert_eq!(config.driver.iterations, 6);
        assert_eq!(config.output.format, OutputFormat::Power);
        assert_eq!(config.capture.field_errors, FieldErrorPolicy::SkipField);
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
source:
  kind: file
  file: telegrams.txt
  dsmr_version: "5.0"
capture:
  max_frame_len: null
  sync_on_header: true
  allow_missing_checksum: true
  field_errors: reject_telegram
driver:
  iterations: 0
output:
  format: table
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.source.kind, SourceKind::File);
        assert_eq!(config.source.file, PathBuf::from("telegrams.txt"));
        assert_eq!(config.source.dsmr_version, DsmrVersion::V5_0);
        assert_eq!(config.capture.max_frame_len, None);
        assert_eq!(config.capture.max_lines, Some(128));
        assert_eq!(config.driver.iterations, 0);
        assert_eq!(config.driver.retry_delay_ms, 1000);
        assert_eq!(config.output.format, OutputFormat::Table);

        let options = config.capture_options();
        assert!(options.limits.sync_on_header);
        assert!(options.allow_missing_checksum);
        assert_eq!(options.field_errors, FieldErrorPolicy::RejectTelegram);
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(Config::from_yaml("source: [1, 2"), Err(ConfigError::Parse(_))));
        assert!(matches!(Config::from_yaml("output:\n  format: cron\n"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "driver:\n  iterations: 2").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.driver.iterations, 2);

        let missing = Config::load(Some(Path::new("/nonexistent/p1.yaml")));
        assert!(matches!(missing, Err(ConfigError::Io(_, _))));
    }
}
