use std::collections::BTreeMap;

use log::{debug, trace, warn};

use super::meter_definitions;
use super::structs::{DecodeFailure, DecodedReading, FieldErrorPolicy, FieldMap};
use super::utils;
use super::TelegramError;
use crate::obis_utils::{self, ObisData};

pub fn parse_obis_line(line: &str) -> Result<ObisData, TelegramError> {
    // Example formats:
    // 1-0:1.8.1(000123.456*kWh)
    // 1-0:1.7.0(00.244*kW)
    // 0-1:24.2.1(200102151415S)(00001.001*m3)

    let line = line.trim_end();

    let paren_start = line
        .find('(')
        .ok_or_else(|| TelegramError::Malformed(format!("data line without value: '{}'", line)))?;

    let code = obis_utils::normalize_obis_code(&line[..paren_start]);
    let value = line[paren_start..].to_string();
    let unit = obis_utils::extract_unit(&value);

    trace!("Parsed OBIS line - Code: {}, Value: {}, Unit: {:?}", code, value, unit);

    Ok(ObisData { code, value, unit })
}

/// Splits a telegram into `code -> payload`. Only lines starting with a
/// digit are data lines; the header and the checksum line are skipped.
pub fn parse_fields(raw: &[u8]) -> FieldMap {
    let text = String::from_utf8_lossy(raw);
    let mut fields = FieldMap::new();

    for line in text.split('\n') {
        let line = line.trim_end_matches('\r');
        if !line.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }

        match parse_obis_line(line) {
            Ok(obis_data) => {
                if !obis_utils::validate_obis_code(&obis_data.code) {
                    debug!("Passing through line with unusual OBIS code '{}'", obis_data.code);
                }
                if let Some(previous) = fields.insert(obis_data.code.clone(), obis_data.value) {
                    debug!("OBIS code {} seen twice, dropping earlier value {}", obis_data.code, previous);
                }
            }
            Err(e) => {
                warn!("Skipping line: {}", e);
            }
        }
    }

    fields
}

/// Decodes all registry codes found in `fields`.
///
/// With [`FieldErrorPolicy::SkipField`] broken fields end up in the failure
/// list; with [`FieldErrorPolicy::RejectTelegram`] the first one is returned.
pub fn decode_fields(
    fields: &FieldMap,
    policy: FieldErrorPolicy,
) -> Result<(BTreeMap<String, DecodedReading>, Vec<DecodeFailure>), TelegramError> {
    let mut readings = BTreeMap::new();
    let mut failures = Vec::new();

    let mut codes: Vec<&String> = fields.keys().collect();
    codes.sort();

    for code in codes {
        let payload = &fields[code];
        let field = match meter_definitions::lookup(code) {
            Some(field) => field,
            None => {
                trace!("Unknown code: {}", code);
                continue;
            }
        };

        match utils::clean_value(code, payload, field.kind) {
            Ok(value) => {
                readings.insert(
                    code.clone(),
                    DecodedReading {
                        code: code.clone(),
                        name: field.name,
                        value,
                        unit: field.kind.unit(),
                    },
                );
            }
            Err(e) if policy == FieldErrorPolicy::RejectTelegram => return Err(e),
            Err(TelegramError::Decode { code, payload, reason }) => {
                warn!("Dropping field {} with payload {}: {}", code, payload, reason);
                failures.push(DecodeFailure { code, payload, reason });
            }
            Err(e) => return Err(e),
        }
    }

    Ok((readings, failures))
}
