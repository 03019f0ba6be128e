//! Reader for DSMR P1 telegrams
//!
//! This library captures telegrams from a smart meter's P1 port (or from a
//! recorded file), verifies their CRC-16 checksum and decodes the known
//! OBIS fields into numeric readings.

pub mod config;
pub mod models;
pub mod obis_utils;
pub mod output;
pub mod p1_telegram;
pub mod transport;

// Re-export common types for easier access
pub use config::Config;
pub use models::{DsmrVersion, OutputFormat};
pub use p1_telegram::structs::{CaptureOptions, ChecksumStatus, P1Record};
pub use p1_telegram::{capture_telegram, decode_telegram, read_telegram, P1Manager, TelegramError};
pub use transport::InputHandle;
