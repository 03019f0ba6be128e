use chrono::Local;
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::Sender;

use crate::config::DriverConfig;
use crate::transport::InputHandle;

pub mod checksum;
pub mod framer;
pub mod line_reader;
pub mod meter_definitions;
pub mod obis_parser;
pub mod structs;
pub mod utils;

use line_reader::LineSource;
use structs::{CaptureOptions, ChecksumStatus, P1Record, Telegram};

#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("Reading from the source failed: {0}")]
    Source(#[from] std::io::Error),
    #[error("Line longer than {0} bytes")]
    LineTooLong(usize),
    #[error("Telegram longer than {0} bytes")]
    FrameTooLong(usize),
    #[error("Telegram has more than {0} lines")]
    TooManyLines(usize),
    #[error("Malformed telegram: {0}")]
    Malformed(String),
    #[error("Checksum failed, given 0x{given:04X}, calculated 0x{calculated:04X}")]
    ChecksumInvalid { given: u16, calculated: u16 },
    #[error("Unable to decode {code} from '{payload}': {reason}")]
    Decode { code: String, payload: String, reason: String },
}

impl TelegramError {
    /// Errors caused by the transport rather than by the telegram contents.
    pub fn is_source_error(&self) -> bool {
        matches!(self, TelegramError::Source(_))
    }
}

/// Collects one telegram from `source`, up to and including the checksum line.
pub fn capture_telegram<S: LineSource + ?Sized>(source: &mut S, options: &CaptureOptions) -> Result<Telegram, TelegramError> {
    framer::assemble(source, &options.limits)
}

/// Verifies the checksum of `telegram` and decodes its fields.
pub fn decode_telegram(telegram: &Telegram, options: &CaptureOptions) -> Result<P1Record, TelegramError> {
    let checksum = checksum::verify_checksum(telegram, options.allow_missing_checksum)?;

    let raw_fields = obis_parser::parse_fields(telegram.as_bytes());
    let (readings, failures) = obis_parser::decode_fields(&raw_fields, options.field_errors)?;

    let meter_timestamp = raw_fields
        .get(meter_definitions::TELEGRAM_TIMESTAMP_CODE)
        .and_then(|payload| utils::parse_first_timestamp(payload));
    let gas_timestamp = meter_definitions::KNOWN_FIELDS
        .iter()
        .filter(|field| matches!(field.kind, structs::DecodeKind::GasWithTimestamp(_)))
        .find_map(|field| raw_fields.get(field.code))
        .and_then(|payload| utils::parse_first_timestamp(payload));

    debug!(
        "Decoded {} of {} fields, {} failures",
        readings.len(),
        raw_fields.len(),
        failures.len()
    );

    Ok(P1Record {
        captured_at: Local::now(),
        checksum,
        valid: checksum == ChecksumStatus::Valid,
        meter_timestamp,
        gas_timestamp,
        readings,
        raw_fields,
        failures,
    })
}

/// Capture, validate and decode one telegram.
pub fn read_telegram<S: LineSource + ?Sized>(source: &mut S, options: &CaptureOptions) -> Result<P1Record, TelegramError> {
    let telegram = capture_telegram(source, options)?;
    debug!("Captured telegram with {} lines, {} bytes", telegram.line_count(), telegram.len());
    decode_telegram(&telegram, options)
}

/// Runs capture cycles and hands every decoded record to `sender`.
pub struct P1Manager {
    sender: Sender<P1Record>,
    input: Arc<Mutex<InputHandle>>,
    options: CaptureOptions,
    driver: DriverConfig,
}

impl P1Manager {
    pub fn new(sender: Sender<P1Record>, input: InputHandle, options: CaptureOptions, driver: DriverConfig) -> Self {
        Self {
            sender,
            input: Arc::new(Mutex::new(input)),
            options,
            driver,
        }
    }

    /// Returns the number of records delivered.
    pub async fn start_thread(&mut self) -> Result<u64, TelegramError> {
        info!("Starting P1 thread");

        let mut iteration: u64 = 0;
        let mut delivered: u64 = 0;
        let mut consecutive_failures: u32 = 0;

        while self.driver.iterations == 0 || iteration < self.driver.iterations {
            iteration += 1;

            let input = Arc::clone(&self.input);
            let options = self.options.clone();

            /* The serial read blocks, keep it off the runtime */
            let cycle = tokio::task::spawn_blocking(move || {
                /* A crashed cycle leaves the handle usable for the next one */
                let mut input = input.lock().unwrap_or_else(PoisonError::into_inner);
                let result = input.run_cycle(&options);
                (result, input.is_exhausted())
            })
            .await;

            let (result, exhausted) = match cycle {
                Ok(cycle) => cycle,
                Err(e) => {
                    let error = std::io::Error::other(format!("capture task failed: {}", e));
                    (Err(TelegramError::Source(error)), false)
                }
            };

            let error = match result {
                Ok(record) => {
                    consecutive_failures = 0;
                    if self.sender.send(record).await.is_err() {
                        info!("Record receiver closed, stopping P1 thread");
                        break;
                    }
                    delivered += 1;
                    continue;
                }
                Err(e) => e,
            };

            if exhausted {
                info!("Input exhausted after {} telegrams: {}", delivered, error);
                break;
            }

            match &error {
                TelegramError::ChecksumInvalid { .. } => warn!("Discarding telegram: {}", error),
                e if e.is_source_error() => error!("There was a problem: '{}', continuing...", e),
                e => warn!("Discarding telegram: {}", e),
            }

            consecutive_failures += 1;
            if self.driver.max_consecutive_failures > 0 && consecutive_failures >= self.driver.max_consecutive_failures {
                error!("Giving up after {} failed capture cycles", consecutive_failures);
                return Err(error);
            }

            if self.driver.retry_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.driver.retry_delay_ms)).await;
            }
        }

        info!("P1 thread finished after {} cycles, {} telegrams delivered", iteration, delivered);
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p1_telegram::checksum::tests::with_crc;
    use crate::p1_telegram::line_reader::ReaderSource;
    use std::io::{BufRead, Cursor, Read};

    fn source(data: &str) -> ReaderSource<Cursor<Vec<u8>>> {
        ReaderSource::new(Cursor::new(data.as_bytes().to_vec()))
    }

    fn with_bad_crc(body: &str) -> String {
        format!("{}{:04X}\r\n", body, checksum::calculate_crc16(body.as_bytes()) ^ 0xFFFF)
    }

    const BODY: &str = "0-0:1.0.0(200102151415W)\r\n\
        1-0:1.8.1(000123.456*kWh)\r\n\
        1-0:1.7.0(00.300*kW)\r\n\
        1-0:2.7.0(00.050*kW)\r\n\
        !";

    #[test]
    fn test_read_telegram_end_to_end() {
        let mut src = source(&with_crc(BODY));
        let record = read_telegram(&mut src, &CaptureOptions::default()).unwrap();

        assert!(record.valid);
        assert_eq!(record.checksum, ChecksumStatus::Valid);
        assert_eq!(record.readings.len(), 3);
        assert_eq!(record.value("1-0:1.8.1"), Some(123.456));
        assert_eq!(record.value("1-0:1.7.0"), Some(0.300));
        assert_eq!(record.value("1-0:2.7.0"), Some(0.050));
        assert_eq!(record.value_by_name("power_delivered"), Some(0.050));

        let net = record.net_power_w().unwrap();
        assert!((net - 250.0).abs() < 1e-9);

        assert!(record.raw_fields.contains_key("0-0:1.0.0"));
        assert_eq!(
            record.meter_timestamp.map(|t| t.to_string()),
            Some("2020-01-02 15:14:15".to_string())
        );
        assert!(record.gas_timestamp.is_none());
    }

    #[test]
    fn test_gas_reading() {
        let body = "/ISK5\\2M550T-1012\r\n\r\n0-1:24.2.1(200102151415S)(00001.001*m3)\r\n!";
        let mut src = source(&with_crc(body));
        let record = read_telegram(&mut src, &CaptureOptions::default()).unwrap();

        assert_eq!(record.value("0-1:24.2.1"), Some(1.001));
        assert!(record.gas_timestamp.is_some());
        assert!(record.net_power_w().is_none());
    }

    #[test]
    fn test_invalid_checksum_is_an_error() {
        let mut telegram = with_crc(BODY).into_bytes();
        telegram[12] ^= 0x01;
        let mut src = ReaderSource::new(Cursor::new(telegram));
        assert!(matches!(
            read_telegram(&mut src, &CaptureOptions::default()),
            Err(TelegramError::ChecksumInvalid { .. })
        ));
    }

    #[test]
    fn test_truncated_source_is_malformed() {
        let mut src = source("1-0:1.8.1(000123.456*kWh)\r\n1-0:1.7.0(00.300*kW)\r\n");
        let err = read_telegram(&mut src, &CaptureOptions::default()).unwrap_err();
        assert!(matches!(err, TelegramError::Malformed(_)));
        assert!(!err.is_source_error());
    }

    #[test]
    fn test_missing_checksum_policy() {
        let data = "1-0:1.7.0(00.300*kW)\r\n!\r\n";

        let mut src = source(data);
        assert!(matches!(
            read_telegram(&mut src, &CaptureOptions::default()),
            Err(TelegramError::Malformed(_))
        ));

        let options = CaptureOptions { allow_missing_checksum: true, ..CaptureOptions::default() };
        let mut src = source(data);
        let record = read_telegram(&mut src, &options).unwrap();
        assert!(!record.valid);
        assert_eq!(record.checksum, ChecksumStatus::Missing);
        assert_eq!(record.value("1-0:1.7.0"), Some(0.3));
    }

    #[test]
    fn test_consecutive_telegrams_from_one_source() {
        let data = format!("{}{}", with_crc(BODY), with_crc("1-0:1.7.0(01.000*kW)\r\n!"));
        let mut src = source(&data);
        let options = CaptureOptions::default();

        assert_eq!(read_telegram(&mut src, &options).unwrap().value("1-0:1.7.0"), Some(0.3));
        assert_eq!(read_telegram(&mut src, &options).unwrap().value("1-0:1.7.0"), Some(1.0));
        assert!(read_telegram(&mut src, &options).is_err());
        assert!(src.is_exhausted());
    }

    #[tokio::test]
    async fn test_manager_delivers_records() {
        let data = format!("{}{}", with_crc(BODY), with_crc(BODY));
        let input = InputHandle::from_reader(Box::new(Cursor::new(data.into_bytes())), None);
        let driver = DriverConfig { iterations: 0, retry_delay_ms: 0, max_consecutive_failures: 3 };

        let (tx, mut rx) = tokio::sync::mpsc::channel(10);
        let mut manager = P1Manager::new(tx, input, CaptureOptions::default(), driver);
        let delivered = manager.start_thread().await.unwrap();
        drop(manager);

        assert_eq!(delivered, 2);
        let mut received = 0;
        while let Some(record) = rx.recv().await {
            assert!(record.valid);
            received += 1;
        }
        assert_eq!(received, 2);
    }

    #[tokio::test]
    async fn test_manager_skips_bad_telegrams() {
        let bad = with_bad_crc(BODY);
        let data = format!("{}{}", bad, with_crc(BODY));
        let input = InputHandle::from_reader(Box::new(Cursor::new(data.into_bytes())), None);
        let driver = DriverConfig { iterations: 2, retry_delay_ms: 0, max_consecutive_failures: 0 };

        let (tx, mut rx) = tokio::sync::mpsc::channel(10);
        let mut manager = P1Manager::new(tx, input, CaptureOptions::default(), driver);
        assert_eq!(manager.start_thread().await.unwrap(), 1);
        assert!(rx.recv().await.is_some());
    }

    struct CrashOnceReader {
        crashed: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for CrashOnceReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.inner.read(buf)
        }
    }

    impl BufRead for CrashOnceReader {
        fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
            if !self.crashed {
                self.crashed = true;
                panic!("serial driver crashed");
            }
            self.inner.fill_buf()
        }

        fn consume(&mut self, amt: usize) {
            self.inner.consume(amt)
        }
    }

    #[tokio::test]
    async fn test_manager_survives_crashed_cycle() {
        let reader = CrashOnceReader {
            crashed: false,
            inner: Cursor::new(with_crc(BODY).into_bytes()),
        };
        let input = InputHandle::from_reader(Box::new(reader), None);
        let driver = DriverConfig { iterations: 2, retry_delay_ms: 0, max_consecutive_failures: 0 };

        let (tx, mut rx) = tokio::sync::mpsc::channel(10);
        let mut manager = P1Manager::new(tx, input, CaptureOptions::default(), driver);
        assert_eq!(manager.start_thread().await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap().value("1-0:1.7.0"), Some(0.3));
    }

    #[tokio::test]
    async fn test_manager_gives_up_after_failures() {
        let bad = with_bad_crc(BODY);
        let data = bad.repeat(3);
        let input = InputHandle::from_reader(Box::new(Cursor::new(data.into_bytes())), None);
        let driver = DriverConfig { iterations: 0, retry_delay_ms: 0, max_consecutive_failures: 2 };

        let (tx, _rx) = tokio::sync::mpsc::channel(10);
        let mut manager = P1Manager::new(tx, input, CaptureOptions::default(), driver);
        assert!(matches!(
            manager.start_thread().await,
            Err(TelegramError::ChecksumInvalid { .. })
        ));
    }
}
