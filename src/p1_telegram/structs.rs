use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::framer::FrameLimits;

/// OBIS code -> raw payload, everything from the first `(` to the end of the line.
pub type FieldMap = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Collecting,
    Complete,
}

/// The raw bytes of one capture cycle, from the first line up to and
/// including the `!` checksum line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telegram {
    raw: Vec<u8>,
    lines: usize,
}

impl Telegram {
    pub(crate) fn new(raw: Vec<u8>, lines: usize) -> Self {
        Self { raw, lines }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn line_count(&self) -> usize {
        self.lines
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChecksumStatus {
    Valid,
    Invalid { given: u16, calculated: u16 },
    /// The `!` line carried no digits at all (DSMR 2.2 meters).
    Missing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Unit {
    #[serde(rename = "kWh")]
    KWh,
    #[serde(rename = "kW")]
    Kw,
    A,
    V,
    #[serde(rename = "m3")]
    M3,
    None,
}

impl Unit {
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::KWh => "kWh",
            Unit::Kw => "kW",
            Unit::A => "A",
            Unit::V => "V",
            Unit::M3 => "m3",
            Unit::None => "",
        }
    }

    /// Compares the tag found after `*` in a payload with this unit.
    pub fn matches_tag(&self, tag: &str) -> bool {
        match self {
            Unit::None => false,
            unit => unit.symbol().eq_ignore_ascii_case(tag.trim()),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeKind {
    /// `(<number>*<unit>)` or `(<number>)`
    Plain(Unit),
    /// `(<timestamp>)(<number>*<unit>)`, the reading is in the second group
    GasWithTimestamp(Unit),
}

impl DecodeKind {
    pub fn unit(&self) -> Unit {
        match self {
            DecodeKind::Plain(unit) | DecodeKind::GasWithTimestamp(unit) => *unit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterField {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub kind: DecodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedReading {
    pub code: String,
    pub name: &'static str,
    pub value: f64,
    pub unit: Unit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeFailure {
    pub code: String,
    pub payload: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldErrorPolicy {
    /// Drop the broken field and keep decoding the rest of the telegram
    #[default]
    SkipField,
    /// Drop the whole telegram on the first broken field
    RejectTelegram,
}

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub limits: FrameLimits,
    pub allow_missing_checksum: bool,
    pub field_errors: FieldErrorPolicy,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            limits: FrameLimits::default(),
            allow_missing_checksum: false,
            field_errors: FieldErrorPolicy::SkipField,
        }
    }
}

/// One decoded telegram as handed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct P1Record {
    pub captured_at: DateTime<Local>,
    pub checksum: ChecksumStatus,
    pub valid: bool,
    pub meter_timestamp: Option<NaiveDateTime>,
    pub gas_timestamp: Option<NaiveDateTime>,
    pub readings: BTreeMap<String, DecodedReading>,
    pub raw_fields: FieldMap,
    pub failures: Vec<DecodeFailure>,
}

impl P1Record {
    pub fn value(&self, code: &str) -> Option<f64> {
        self.readings.get(code).map(|r| r.value)
    }

    pub fn value_by_name(&self, name: &str) -> Option<f64> {
        self.readings.values().find(|r| r.name == name).map(|r| r.value)
    }

    /// Delivered minus returned power in W.
    pub fn net_power_w(&self) -> Option<f64> {
        let consumed = self.value("1-0:1.7.0")?;
        let returned = self.value("1-0:2.7.0")?;
        Some((consumed - returned) * 1000.0)
    }
}
