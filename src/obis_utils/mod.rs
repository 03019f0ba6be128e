#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObisData {
    pub code: String,
    /// Raw payload, from the first `(` to the end of the line
    pub value: String,
    pub unit: Option<String>,
}

pub fn validate_obis_code(code: &str) -> bool {
    // OBIS code format: A-B:C.D.E*F
    // A: Medium (0=abstract, 1=electricity, 6=heat, 7=gas, 8=water)
    // B: Channel (0-15)
    // C: Physical value (1-255)
    // D: Processing method (0-255)
    // E: Tariff/Time (0-255)
    // F: Storage (optional, 0-255)

    let parts: Vec<&str> = code.split(':').collect();
    if parts.len() != 2 {
        return false;
    }

    // Check A-B part
    let ab_parts: Vec<&str> = parts[0].split('-').collect();
    if ab_parts.len() != 2 {
        return false;
    }

    // Check C.D.E part (and optional *F)
    let cde_part = parts[1].split('*').next().unwrap_or("");
    let cde_parts: Vec<&str> = cde_part.split('.').collect();
    if cde_parts.len() != 3 {
        return false;
    }

    ab_parts.iter().chain(cde_parts.iter()).all(|part| part.parse::<u8>().is_ok())
}

pub fn normalize_obis_code(code: &str) -> String {
    code.trim().replace(' ', "")
}

/// Unit tag of the last value group, `(00001.001*m3)` -> `m3`.
pub fn extract_unit(payload: &str) -> Option<String> {
    let last_group = payload.trim_end().trim_end_matches(')');
    let last_group = last_group.rsplit('(').next().unwrap_or(last_group);
    let (_, unit) = last_group.rsplit_once('*')?;
    if unit.is_empty() {
        None
    } else {
        Some(unit.to_string())
    }
}
