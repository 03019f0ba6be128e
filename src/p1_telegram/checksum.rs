use crc16::{State, ARC};
use log::debug;

use super::structs::{ChecksumStatus, Telegram};
use super::TelegramError;

/// CRC-16/ARC as used by DSMR/ESMR (polynomial 0x8005 reflected, init 0).
pub fn calculate_crc16(data: &[u8]) -> u16 {
    State::<ARC>::calculate(data)
}

/// Position of the `!` starting the last line of the buffer.
pub fn find_terminator(raw: &[u8]) -> Option<usize> {
    raw.iter()
        .enumerate()
        .rev()
        .find(|(pos, byte)| **byte == b'!' && (*pos == 0 || raw[*pos - 1] == b'\n'))
        .map(|(pos, _)| pos)
}

/// Checks the CRC over everything from the first byte through the `!`.
pub fn validate(raw: &[u8]) -> Result<ChecksumStatus, TelegramError> {
    let bang = find_terminator(raw)
        .ok_or_else(|| TelegramError::Malformed("no checksum line found".to_string()))?;

    let rest = &raw[bang + 1..];
    let end = rest.iter().position(|b| *b == b'\r' || *b == b'\n').unwrap_or(rest.len());
    let digits = &rest[..end];

    if digits.is_empty() {
        debug!("Checksum line carries no checksum");
        return Ok(ChecksumStatus::Missing);
    }
    if digits.len() != 4 {
        return Err(TelegramError::Malformed(format!(
            "checksum must have 4 hex digits, got '{}'",
            String::from_utf8_lossy(digits)
        )));
    }

    let mut given: u16 = 0;
    for digit in digits {
        let nibble = (*digit as char).to_digit(16).ok_or_else(|| {
            TelegramError::Malformed(format!("invalid checksum '{}'", String::from_utf8_lossy(digits)))
        })?;
        given = (given << 4) | nibble as u16;
    }

    let calculated = calculate_crc16(&raw[..=bang]);
    debug!("Telegram checksum: given=0x{:04X}, calculated=0x{:04X}", given, calculated);

    if given == calculated {
        Ok(ChecksumStatus::Valid)
    } else {
        Ok(ChecksumStatus::Invalid { given, calculated })
    }
}

/// Like [`validate`], but a mismatch is an error and a missing checksum
/// is only accepted when `allow_missing` is set.
pub fn verify_checksum(telegram: &Telegram, allow_missing: bool) -> Result<ChecksumStatus, TelegramError> {
    match validate(telegram.as_bytes())? {
        ChecksumStatus::Invalid { given, calculated } => Err(TelegramError::ChecksumInvalid { given, calculated }),
        ChecksumStatus::Missing if !allow_missing => {
            Err(TelegramError::Malformed("telegram has no checksum".to_string()))
        }
        status => Ok(status),
    }
}
