use thiserror::Error;

use crate::models::OutputFormat;
use crate::p1_telegram::meter_definitions;
use crate::p1_telegram::structs::P1Record;

const TABLE_ENERGY_CODES: [&str; 4] = ["1-0:1.8.1", "1-0:1.8.2", "1-0:2.8.1", "1-0:2.8.2"];

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Record has no reading for {0}")]
    MissingReading(&'static str),
    #[error("Unable to serialize record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Printed once before the first `table` line.
pub fn table_header() -> String {
    format!(
        "{:>10},{:>9}, {:>10},{:>10},{:>10},{:>10},{:>6}",
        "Date", "Time", "Ein1", "Ein2", "Eout1", "Eout2", "Pi-Po"
    )
}

fn required(record: &P1Record, code: &'static str) -> Result<f64, OutputError> {
    record.value(code).ok_or(OutputError::MissingReading(code))
}

fn net_power(record: &P1Record) -> Result<i64, OutputError> {
    let consumed = required(record, "1-0:1.7.0")?;
    let returned = required(record, "1-0:2.7.0")?;
    Ok(((consumed - returned) * 1000.0).round() as i64)
}

/// Renders `record` as the lines to print for `format`.
pub fn format_record(record: &P1Record, format: OutputFormat) -> Result<Vec<String>, OutputError> {
    let mut lines = Vec::new();

    match format {
        OutputFormat::String | OutputFormat::Code => {
            lines.push(String::new());
            lines.push(record.captured_at.format("%Y-%m-%d %H:%M:%S%.6f").to_string());

            let width = meter_definitions::max_description_len();
            for reading in record.readings.values() {
                let line = match format {
                    OutputFormat::String => {
                        let description = meter_definitions::get_obis_description(&reading.code).unwrap_or(reading.name);
                        format!("{:<width$}{:>12}", description, reading.value, width = width)
                    }
                    _ => format!("{:<10}{:>12}", reading.code, reading.value),
                };
                lines.push(line);
            }
        }
        OutputFormat::Table => {
            let mut energies = [0.0; 4];
            for (energy, code) in energies.iter_mut().zip(TABLE_ENERGY_CODES) {
                *energy = required(record, code)?;
            }
            lines.push(format!(
                "{:>10},{:>9}, {:>10.3},{:>10.3},{:>10.3},{:>10.3},{:>6}",
                record.captured_at.format("%Y-%m-%d").to_string(),
                record.captured_at.format("%H:%M:%S").to_string(),
                energies[0],
                energies[1],
                energies[2],
                energies[3],
                net_power(record)?
            ));
        }
        OutputFormat::Power => {
            lines.push(format!("{:>8},{:>6}", record.captured_at.format("%H:%M:%S").to_string(), net_power(record)?));
        }
        OutputFormat::Json => {
            lines.push(serde_json::to_string(record)?);
        }
    }

    Ok(lines)
}
