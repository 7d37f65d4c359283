use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display)]
pub enum MeasurementMode {
    #[default]
    #[display(fmt = "voltage")]
    Voltage,
    #[display(fmt = "current")]
    Current,
}

impl MeasurementMode {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Voltage),
            1 => Some(Self::Current),
            _ => None,
        }
    }
    pub fn code(self) -> i64 {
        match self {
            Self::Voltage => 0,
            Self::Current => 1,
        }
    }
}

/// Output gains selectable on the board.
pub const GAIN_TABLE: [f32; 22] = [
    1.0, 1.375, 2.0, 2.75, 4.0, 5.5, 8.0, 11.0, 16.0, 22.0, 32.0, 44.0, 64.0, 88.0, 128.0, 176.0,
    256.0, 352.0, 512.0, 704.0, 1024.0, 1408.0,
];
pub const GAIN_EPS: f32 = 1e-4;

/// Index of the gain table step that `gain` falls into.
pub fn gain_index(gain: f32) -> usize {
    GAIN_TABLE
        .iter()
        .position(|&g| g > gain + GAIN_EPS)
        .unwrap_or(GAIN_TABLE.len())
        .saturating_sub(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationEntry {
    #[serde(rename = "m")]
    pub slope: f32,
    #[serde(rename = "b")]
    pub offset: i16,
}

impl Default for CalibrationEntry {
    fn default() -> Self {
        Self {
            slope: 1.0,
            offset: 0,
        }
    }
}

/// EEPROM calibration atom type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[repr(u16)]
pub enum AtomType {
    Header = 0,
    VIn1 = 1,
    VIn2 = 2,
    VIn3 = 3,
    VIn4 = 4,
    VSupply = 5,
    CIn1 = 6,
    CIn2 = 7,
    CIn3 = 8,
    CIn4 = 9,
    AnaOut = 0xA,
}

/// Calibration atoms in the order they are stored on the board.
/// The atom of type `t` lives in slot `t - 1`.
pub const CALIBRATION_ATOMS: [AtomType; 9] = [
    AtomType::VIn1,
    AtomType::VIn2,
    AtomType::VIn3,
    AtomType::VIn4,
    AtomType::VSupply,
    AtomType::CIn1,
    AtomType::CIn2,
    AtomType::CIn3,
    AtomType::CIn4,
];

/// Atoms fetched by the host before a measurement.
pub const CHANNEL_ATOMS: [AtomType; 8] = [
    AtomType::VIn1,
    AtomType::VIn2,
    AtomType::VIn3,
    AtomType::VIn4,
    AtomType::CIn1,
    AtomType::CIn2,
    AtomType::CIn3,
    AtomType::CIn4,
];

impl AtomType {
    pub fn from_code(code: u16) -> Option<Self> {
        [Self::Header]
            .into_iter()
            .chain(CALIBRATION_ATOMS)
            .chain([Self::AnaOut])
            .find(|t| t.code() == code)
    }
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Atom holding the calibration of `channel` in `mode`.
    pub fn for_channel(mode: MeasurementMode, channel: usize) -> Option<Self> {
        let base = match mode {
            MeasurementMode::Voltage => Self::VIn1,
            MeasurementMode::Current => Self::CIn1,
        };
        if channel >= 4 {
            return None;
        }
        Self::from_code(base.code() + channel as u16)
    }

    /// Slot in [`CALIBRATION_ATOMS`], if this is a calibration atom.
    pub fn slot(self) -> Option<usize> {
        let slot = (self.code() as usize).checked_sub(1)?;
        match CALIBRATION_ATOMS.get(slot) {
            Some(&t) if t == self => Some(slot),
            _ => None,
        }
    }

    pub fn entry_count(self) -> usize {
        match self {
            Self::VSupply => 1,
            Self::Header | Self::AnaOut => 0,
            _ => GAIN_TABLE.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gain_index_of_table_values() {
        for (i, g) in GAIN_TABLE.iter().enumerate() {
            assert_eq!(gain_index(*g), i);
        }
    }

    #[test]
    fn gain_index_bounds() {
        assert_eq!(gain_index(0.0), 0);
        assert_eq!(gain_index(0.5), 0);
        assert_eq!(gain_index(1.2), 0);
        assert_eq!(gain_index(1.99999), 2);
        assert_eq!(gain_index(3.0), 3);
        assert_eq!(gain_index(5000.0), GAIN_TABLE.len() - 1);
    }

    #[test]
    fn atom_slots() {
        for (i, t) in CALIBRATION_ATOMS.iter().enumerate() {
            assert_eq!(t.slot(), Some(i));
            assert_eq!(t.code() as usize, i + 1);
        }
        assert_eq!(AtomType::Header.slot(), None);
        assert_eq!(AtomType::AnaOut.slot(), None);
    }

    #[test]
    fn channel_atoms() {
        assert_eq!(
            AtomType::for_channel(MeasurementMode::Voltage, 0),
            Some(AtomType::VIn1)
        );
        assert_eq!(
            AtomType::for_channel(MeasurementMode::Voltage, 3),
            Some(AtomType::VIn4)
        );
        assert_eq!(
            AtomType::for_channel(MeasurementMode::Current, 0),
            Some(AtomType::CIn1)
        );
        assert_eq!(
            AtomType::for_channel(MeasurementMode::Current, 3),
            Some(AtomType::CIn4)
        );
        assert_eq!(AtomType::for_channel(MeasurementMode::Current, 4), None);
    }

    #[test]
    fn entry_json() {
        let e: CalibrationEntry = serde_json::from_str(r#"{"m":1.5,"b":-12}"#).unwrap();
        assert_eq!(
            e,
            CalibrationEntry {
                slope: 1.5,
                offset: -12
            }
        );
    }
}
