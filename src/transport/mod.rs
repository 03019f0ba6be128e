use log::{debug, info, warn};
use std::fs::File;
use std::io::{BufRead, BufReader};
#[cfg(feature = "serial")]
use std::time::Duration;

use crate::config::{CaptureConfig, SourceConfig, SourceKind};
#[cfg(feature = "serial")]
use crate::models::{DsmrVersion, Parity};
use crate::p1_telegram::line_reader::{LineSource, ReaderSource};
use crate::p1_telegram::structs::{CaptureOptions, P1Record};
use crate::p1_telegram::{read_telegram, TelegramError};

#[cfg(feature = "serial")]
#[derive(Debug, Clone, PartialEq)]
pub struct SerialSettings {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub parity: Parity,
    pub xonxoff: bool,
    pub timeout: Duration,
}

#[cfg(feature = "serial")]
impl SerialSettings {
    pub fn from_config(config: &SourceConfig) -> Self {
        let version: DsmrVersion = config.dsmr_version;
        Self {
            port: config.port.clone(),
            baud_rate: config.baud_rate.unwrap_or_else(|| version.baud_rate()),
            data_bits: version.data_bits(),
            parity: version.parity(),
            xonxoff: config.xonxoff,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// An opened serial port. Dropping it releases the device.
#[cfg(feature = "serial")]
pub struct SerialSource {
    name: String,
    inner: ReaderSource<BufReader<Box<dyn serialport::SerialPort>>>,
}

#[cfg(feature = "serial")]
impl SerialSource {
    pub fn open(settings: &SerialSettings, max_line_len: Option<usize>) -> Result<Self, TelegramError> {
        debug!(
            "Opening {} at {} baud, {} data bits, parity {:?}",
            settings.port, settings.baud_rate, settings.data_bits, settings.parity
        );

        let data_bits = match settings.data_bits {
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let parity = match settings.parity {
            Parity::Even => serialport::Parity::Even,
            Parity::Odd => serialport::Parity::Odd,
            Parity::None => serialport::Parity::None,
        };
        let flow_control = match settings.xonxoff {
            true => serialport::FlowControl::Software,
            false => serialport::FlowControl::None,
        };

        let port = serialport::new(settings.port.as_str(), settings.baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(serialport::StopBits::One)
            .flow_control(flow_control)
            .timeout(settings.timeout)
            .open()
            .map_err(|e| {
                TelegramError::Source(std::io::Error::other(format!("Error when opening {}: {}", settings.port, e)))
            })?;

        Ok(Self {
            name: settings.port.clone(),
            inner: ReaderSource::new(BufReader::new(port)).with_max_line_len(max_line_len),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(feature = "serial")]
impl LineSource for SerialSource {
    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize, TelegramError> {
        self.inner.read_line(buf)
    }

    fn close(&mut self) -> Result<(), TelegramError> {
        debug!("Closing {}", self.name);
        self.inner.close()
    }
}

/// Where telegrams come from, kept by the driver between capture cycles.
pub enum InputHandle {
    /// The port is opened and closed again for every telegram
    #[cfg(feature = "serial")]
    Serial {
        settings: SerialSettings,
        max_line_len: Option<usize>,
    },
    /// A recorded stream that stays open, telegrams are read one after the other
    Reader(ReaderSource<Box<dyn BufRead + Send>>),
}

impl InputHandle {
    pub fn from_config(source: &SourceConfig, capture: &CaptureConfig) -> Result<Self, TelegramError> {
        match source.kind {
            SourceKind::Serial => Self::serial(source, capture),
            SourceKind::File => {
                info!("Running in test mode, reading telegrams from {}", source.file.display());
                let file = File::open(&source.file)?;
                Ok(Self::from_reader(Box::new(BufReader::new(file)), capture.max_line_len))
            }
        }
    }

    #[cfg(feature = "serial")]
    fn serial(source: &SourceConfig, capture: &CaptureConfig) -> Result<Self, TelegramError> {
        Ok(InputHandle::Serial {
            settings: SerialSettings::from_config(source),
            max_line_len: capture.max_line_len,
        })
    }

    #[cfg(not(feature = "serial"))]
    fn serial(_source: &SourceConfig, _capture: &CaptureConfig) -> Result<Self, TelegramError> {
        Err(TelegramError::Source(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "built without serial port support",
        )))
    }

    pub fn from_reader(reader: Box<dyn BufRead + Send>, max_line_len: Option<usize>) -> Self {
        InputHandle::Reader(ReaderSource::new(reader).with_max_line_len(max_line_len))
    }

    /// One capture cycle. A serial port is opened here and closed again
    /// before returning, whatever the outcome.
    pub fn run_cycle(&mut self, options: &CaptureOptions) -> Result<P1Record, TelegramError> {
        match self {
            #[cfg(feature = "serial")]
            InputHandle::Serial { settings, max_line_len } => {
                let mut port = SerialSource::open(settings, *max_line_len)?;
                let result = read_telegram(&mut port, options);
                if let Err(e) = port.close() {
                    warn!("An error occurred when closing the serial port {}: '{}'", port.name(), e);
                }
                result
            }
            InputHandle::Reader(source) => read_telegram(source, options),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        match self {
            #[cfg(feature = "serial")]
            InputHandle::Serial { .. } => false,
            InputHandle::Reader(source) => source.is_exhausted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p1_telegram::checksum::tests::with_crc;
    use std::io::{Cursor, Write};

    #[test]
    fn test_reader_input_runs_cycles() {
        let data = with_crc("1-0:1.7.0(00.244*kW)\r\n!");
        let mut input = InputHandle::from_reader(Box::new(Cursor::new(data.into_bytes())), Some(64));
        let options = CaptureOptions::default();

        let record = input.run_cycle(&options).unwrap();
        assert_eq!(record.value("1-0:1.7.0"), Some(0.244));
        assert!(!input.is_exhausted());

        assert!(matches!(input.run_cycle(&options), Err(TelegramError::Malformed(_))));
        assert!(input.is_exhausted());
    }

    #[test]
    fn test_file_input_from_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(with_crc("1-0:1.8.1(000123.456*kWh)\r\n!").as_bytes()).unwrap();

        let source = SourceConfig {
            kind: SourceKind::File,
            file: file.path().to_path_buf(),
            ..SourceConfig::default()
        };
        let mut input = InputHandle::from_config(&source, &CaptureConfig::default()).unwrap();
        let record = input.run_cycle(&CaptureOptions::default()).unwrap();
        assert_eq!(record.value("1-0:1.8.1"), Some(123.456));
    }

    #[test]
    fn test_full_text_message_fits_default_limits() {
        let body = format!(
            "/ISK5\\2M550T-1012\r\n\r\n0-0:96.13.0({})\r\n1-0:1.7.0(00.244*kW)\r\n!",
            "41".repeat(1024)
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(with_crc(&body).as_bytes()).unwrap();

        let source = SourceConfig {
            kind: SourceKind::File,
            file: file.path().to_path_buf(),
            ..SourceConfig::default()
        };
        let capture = CaptureConfig::default();
        let mut input = InputHandle::from_config(&source, &capture).unwrap();
        let record = input.run_cycle(&CaptureOptions::from(&capture)).unwrap();

        assert!(record.valid);
        assert_eq!(record.raw_fields["0-0:96.13.0"].len(), 2050);
        assert_eq!(record.value("1-0:1.7.0"), Some(0.244));
    }

    #[test]
    fn test_next_cycle_after_long_line() {
        let broken = with_crc(&format!(
            "/ISK5\\2M550T-1012\r\n1-0:1.7.0({}*kW)\r\n1-0:2.7.0(00.050*kW)\r\n!",
            "0".repeat(100)
        ));
        let good = with_crc("/ISK5\\2M550T-1012\r\n1-0:1.7.0(00.300*kW)\r\n!");
        let data = format!("{}{}", broken, good);

        let mut input = InputHandle::from_reader(Box::new(Cursor::new(data.into_bytes())), Some(64));
        let mut options = CaptureOptions::default();
        options.limits.sync_on_header = true;

        assert!(matches!(input.run_cycle(&options), Err(TelegramError::LineTooLong(64))));
        let record = input.run_cycle(&options).unwrap();
        assert!(record.valid);
        assert_eq!(record.value("1-0:1.7.0"), Some(0.3));
    }

    #[test]
    fn test_missing_file_is_a_source_error() {
        let source = SourceConfig {
            kind: SourceKind::File,
            file: "/nonexistent/raw.out".into(),
            ..SourceConfig::default()
        };
        let err = InputHandle::from_config(&source, &CaptureConfig::default()).err().unwrap();
        assert!(err.is_source_error());
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_serial_settings_follow_dsmr_version() {
        let mut source = SourceConfig::default();
        source.dsmr_version = DsmrVersion::V2_2;
        let settings = SerialSettings::from_config(&source);
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, 7);
        assert_eq!(settings.parity, Parity::Even);

        source.dsmr_version = DsmrVersion::V5_0;
        source.baud_rate = Some(57600);
        let settings = SerialSettings::from_config(&source);
        assert_eq!(settings.baud_rate, 57600);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.timeout, Duration::from_secs(12));
    }

    #[cfg(feature = "serial")]
    #[test]
    fn test_serial_open_failure_is_a_source_error() {
        let mut source = SourceConfig::default();
        source.port = "/nonexistent/ttyUSB9".to_string();
        let mut input = InputHandle::from_config(&source, &CaptureConfig::default()).unwrap();
        let err = input.run_cycle(&CaptureOptions::default()).unwrap_err();
        assert!(err.is_source_error());
    }
}
