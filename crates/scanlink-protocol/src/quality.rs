use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Bit shift that normalises the sensor's quality byte to its 6-bit range.
pub const QUALITY_SHIFT: u8 = 2;

/// Representation of the per-sample quality value on the wire.
#[derive(
    Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum QualityMode {
    /// Quality right-shifted by [`QUALITY_SHIFT`] (0–63).
    #[default]
    Shifted,
    /// Quality byte exactly as reported by the driver (0–255).
    Raw,
}

impl QualityMode {
    /// Converts a raw quality byte into this representation.
    #[must_use]
    pub const fn apply(self, quality: u8) -> u8 {
        match self {
            Self::Shifted => quality >> QUALITY_SHIFT,
            Self::Raw => quality,
        }
    }
}

/// Errors encountered while parsing a [`QualityMode`] from text.
pub type QualityModeParseError = strum::ParseError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_mode_drops_flag_bits() {
        assert_eq!(QualityMode::Shifted.apply(0xBC), 47);
        assert_eq!(QualityMode::Raw.apply(0xBC), 0xBC);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("RAW".parse::<QualityMode>().ok(), Some(QualityMode::Raw));
        assert_eq!(QualityMode::Shifted.to_string(), "shifted");
    }
}
