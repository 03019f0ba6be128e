use chrono::NaiveDateTime;
use lazy_static::lazy_static;
use regex::Regex;

use super::structs::{DecodeKind, Unit};
use super::TelegramError;

lazy_static! {
    static ref VALUE_GROUP: Regex = Regex::new(r"\(([^()]*)\)").expect("valid group pattern");
    static ref NUMBER: Regex = Regex::new(r"^[+-]?[0-9]+(\.[0-9]+)?$").expect("valid number pattern");
}

/// Contents of every parenthesized group, in order.
pub fn value_groups(payload: &str) -> Vec<&str> {
    VALUE_GROUP
        .captures_iter(payload)
        .filter_map(|caps| caps.get(1))
        .map(|group| group.as_str())
        .collect()
}

fn decode_error(code: &str, payload: &str, reason: impl Into<String>) -> TelegramError {
    TelegramError::Decode {
        code: code.to_string(),
        payload: payload.to_string(),
        reason: reason.into(),
    }
}

/// Removes a `*<unit>` tag. A tag that does not belong to `unit` is refused.
fn strip_unit(text: &str, unit: Unit) -> Result<&str, String> {
    match text.split_once('*') {
        Some((number, tag)) if unit.matches_tag(tag) => Ok(number),
        Some((_, tag)) => Err(format!("unexpected unit '{}', expected '{}'", tag, unit)),
        None => Ok(text),
    }
}

/// Turns a raw payload like `(000123.456*kWh)` into its number.
pub fn clean_value(code: &str, payload: &str, kind: DecodeKind) -> Result<f64, TelegramError> {
    let text = match kind {
        DecodeKind::Plain(_) => payload
            .trim()
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
            .ok_or_else(|| decode_error(code, payload, "value is not enclosed in parentheses"))?,
        DecodeKind::GasWithTimestamp(_) => {
            let groups = value_groups(payload);
            *groups
                .get(1)
                .ok_or_else(|| decode_error(code, payload, "no reading after the timestamp group"))?
        }
    };

    let number = strip_unit(text, kind.unit()).map_err(|reason| decode_error(code, payload, reason))?;
    let number = number.trim();
    if !NUMBER.is_match(number) {
        return Err(decode_error(code, payload, format!("'{}' is not a number", number)));
    }

    number
        .parse::<f64>()
        .map_err(|e| decode_error(code, payload, e.to_string()))
}

/// Parses a DSMR timestamp group `YYMMDDhhmmss` with an optional
/// `S` (summer) or `W` (winter) suffix.
pub fn parse_timestamp(group: &str) -> Option<NaiveDateTime> {
    let stamp = group.trim_end_matches(|c: char| c == 'S' || c == 'W');
    if stamp.len() != 12 {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, "%y%m%d%H%M%S").ok()
}

/// Timestamp in the first group of a payload such as
/// `(200102151415S)(00001.001*m3)`.
pub fn parse_first_timestamp(payload: &str) -> Option<NaiveDateTime> {
    value_groups(payload).first().and_then(|group| parse_timestamp(group))
}
