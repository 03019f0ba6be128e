use serde::{Deserialize, Serialize};

/// Protocol generation of the meter, decides the serial line settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DsmrVersion {
    #[serde(rename = "2.2")]
    V2_2,
    #[serde(rename = "4.2")]
    #[default]
    V4_2,
    #[serde(rename = "5.0")]
    V5_0,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Parity {
    None,
    Even,
    Odd,
}

impl DsmrVersion {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "2.2" => Some(DsmrVersion::V2_2),
            "4.2" => Some(DsmrVersion::V4_2),
            "5.0" | "5" => Some(DsmrVersion::V5_0),
            _ => None,
        }
    }

    pub fn to_string(&self) -> String {
        match self {
            DsmrVersion::V2_2 => "2.2".to_string(),
            DsmrVersion::V4_2 => "4.2".to_string(),
            DsmrVersion::V5_0 => "5.0".to_string(),
        }
    }

    pub fn baud_rate(&self) -> u32 {
        match self {
            DsmrVersion::V2_2 => 9600,
            DsmrVersion::V4_2 | DsmrVersion::V5_0 => 115200,
        }
    }

    pub fn data_bits(&self) -> u8 {
        match self {
            DsmrVersion::V2_2 | DsmrVersion::V4_2 => 7,
            DsmrVersion::V5_0 => 8,
        }
    }

    pub fn parity(&self) -> Parity {
        match self {
            DsmrVersion::V2_2 | DsmrVersion::V4_2 => Parity::Even,
            DsmrVersion::V5_0 => Parity::None,
        }
    }
}

/// How decoded telegrams are printed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Description and value per known field
    String,
    /// OBIS code and value per known field
    Code,
    /// One line with date, time, all energies and the net power
    Table,
    /// Time of day and net power (in - out)
    #[default]
    Power,
    Json,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "string" => Some(OutputFormat::String),
            "code" => Some(OutputFormat::Code),
            "table" => Some(OutputFormat::Table),
            "power" => Some(OutputFormat::Power),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}
