use lazy_static::lazy_static;
use std::collections::HashMap;

use super::structs::{DecodeKind, MeterField, Unit};

const fn plain(code: &'static str, name: &'static str, description: &'static str, unit: Unit) -> MeterField {
    MeterField { code, name, description, kind: DecodeKind::Plain(unit) }
}

const fn gas(code: &'static str, name: &'static str, description: &'static str) -> MeterField {
    MeterField { code, name, description, kind: DecodeKind::GasWithTimestamp(Unit::M3) }
}

/// Every OBIS code that is decoded into a number. Everything else in a
/// telegram is passed through as raw text.
pub static KNOWN_FIELDS: &[MeterField] = &[
    // Energy registers
    plain("1-0:1.8.1", "energy_consumed_t1", "Meter Reading electricity delivered to client (Tariff 1) in kWh", Unit::KWh),
    plain("1-0:1.8.2", "energy_consumed_t2", "Meter Reading electricity delivered to client (Tariff 2) in kWh", Unit::KWh),
    plain("1-0:2.8.1", "energy_delivered_t1", "Meter Reading electricity delivered by client (Tariff 1) in kWh", Unit::KWh),
    plain("1-0:2.8.2", "energy_delivered_t2", "Meter Reading electricity delivered by client (Tariff 2) in kWh", Unit::KWh),
    plain("0-0:96.14.0", "tariff_indicator", "Tariff indicator electricity", Unit::None),

    // Power
    plain("1-0:1.7.0", "power_consumed", "Actual electricity power delivered (+P) in kW", Unit::Kw),
    plain("1-0:2.7.0", "power_delivered", "Actual electricity power received (-P) in kW", Unit::Kw),
    plain("0-0:17.0.0", "power_threshold", "The actual threshold electricity in kW", Unit::Kw),
    plain("0-0:96.3.10", "switch_position", "Switch position electricity", Unit::None),

    // Power quality counters
    plain("0-0:96.7.21", "power_failures", "Number of power failures in any phase", Unit::None),
    plain("0-0:96.7.9", "long_power_failures", "Number of long power failures in any phase", Unit::None),
    plain("1-0:32.32.0", "voltage_sags_l1", "Number of voltage sags in phase L1", Unit::None),
    plain("1-0:52.32.0", "voltage_sags_l2", "Number of voltage sags in phase L2", Unit::None),
    plain("1-0:72.32.0", "voltage_sags_l3", "Number of voltage sags in phase L3", Unit::None),
    plain("1-0:32.36.0", "voltage_swells_l1", "Number of voltage swells in phase L1", Unit::None),
    plain("1-0:52.36.0", "voltage_swells_l2", "Number of voltage swells in phase L2", Unit::None),
    plain("1-0:72.36.0", "voltage_swells_l3", "Number of voltage swells in phase L3", Unit::None),

    // Per phase values
    plain("1-0:32.7.0", "voltage_l1", "Instantaneous voltage L1 in V", Unit::V),
    plain("1-0:52.7.0", "voltage_l2", "Instantaneous voltage L2 in V", Unit::V),
    plain("1-0:72.7.0", "voltage_l3", "Instantaneous voltage L3 in V", Unit::V),
    plain("1-0:31.7.0", "current_l1", "Instantaneous current L1 in A", Unit::A),
    plain("1-0:51.7.0", "current_l2", "Instantaneous current L2 in A", Unit::A),
    plain("1-0:71.7.0", "current_l3", "Instantaneous current L3 in A", Unit::A),
    plain("1-0:21.7.0", "active_power_l1", "Instantaneous active power L1 (+P) in kW", Unit::Kw),
    plain("1-0:41.7.0", "active_power_l2", "Instantaneous active power L2 (+P) in kW", Unit::Kw),
    plain("1-0:61.7.0", "active_power_l3", "Instantaneous active power L3 (+P) in kW", Unit::Kw),
    plain("1-0:22.7.0", "active_power_returned_l1", "Instantaneous active power L1 (-P) in kW", Unit::Kw),
    plain("1-0:42.7.0", "active_power_returned_l2", "Instantaneous active power L2 (-P) in kW", Unit::Kw),
    plain("1-0:62.7.0", "active_power_returned_l3", "Instantaneous active power L3 (-P) in kW", Unit::Kw),

    // Gas meters on the M-Bus channels
    gas("0-1:24.2.1", "gas_consumed", "Last hourly value (temperature converted), gas delivered to client in m3"),
    gas("0-2:24.2.1", "gas_consumed_ch2", "Last hourly value (temperature converted), gas delivered to client in m3 (channel 2)"),
    gas("0-3:24.2.1", "gas_consumed_ch3", "Last hourly value (temperature converted), gas delivered to client in m3 (channel 3)"),
    gas("0-4:24.2.1", "gas_consumed_ch4", "Last hourly value (temperature converted), gas delivered to client in m3 (channel 4)"),
];

/// Timestamp of the telegram itself, `YYMMDDhhmmssX`
pub const TELEGRAM_TIMESTAMP_CODE: &str = "0-0:1.0.0";

lazy_static! {
    static ref FIELDS_BY_CODE: HashMap<&'static str, &'static MeterField> =
        KNOWN_FIELDS.iter().map(|field| (field.code, field)).collect();
}

pub fn lookup(code: &str) -> Option<&'static MeterField> {
    FIELDS_BY_CODE.get(code).copied()
}

pub fn lookup_by_name(name: &str) -> Option<&'static MeterField> {
    KNOWN_FIELDS.iter().find(|field| field.name == name)
}

pub fn get_obis_description(code: &str) -> Option<&'static str> {
    lookup(code).map(|field| field.description)
}

pub fn is_known(code: &str) -> bool {
    FIELDS_BY_CODE.contains_key(code)
}

/// Width of the longest description, used to align text output.
pub fn max_description_len() -> usize {
    KNOWN_FIELDS.iter().map(|field| field.description.len()).max().unwrap_or(0)
}
