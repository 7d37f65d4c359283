use crate::{
    channel::Channel,
    control::Control,
    error::{Error, Result},
};
use common::values::{
    gain_index, AtomType, CalibrationEntry, MeasurementMode, CALIBRATION_ATOMS, CHANNEL_ATOMS,
};

/// Calibration tables of the board, one per atom.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CalibrationStore {
    atoms: [Vec<CalibrationEntry>; CALIBRATION_ATOMS.len()],
}

fn slot(atom: AtomType) -> Result<usize> {
    atom.slot()
        .ok_or_else(|| Error::CalibrationDataInvalid(format!("{} is not a calibration atom", atom)))
}

impl CalibrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the channel atoms from the board.
    pub fn fetch<C: Channel>(control: &mut Control<C>) -> Result<Self> {
        let mut this = Self::new();
        for atom in CHANNEL_ATOMS {
            let entries = control.calibration_atom(atom)?;
            log::debug!("Calibration atom {}: {} entries", atom, entries.len());
            this.set_atom(atom, entries)?;
        }
        Ok(this)
    }

    pub fn set_atom(&mut self, atom: AtomType, entries: Vec<CalibrationEntry>) -> Result<()> {
        let slot = slot(atom)?;
        if entries.len() > atom.entry_count() {
            return Err(Error::CalibrationDataInvalid(format!(
                "atom {} has {} entries, at most {} expected",
                atom,
                entries.len(),
                atom.entry_count()
            )));
        }
        self.atoms[slot] = entries;
        Ok(())
    }

    pub fn atom(&self, atom: AtomType) -> Option<&[CalibrationEntry]> {
        self.atoms.get(atom.slot()?).map(Vec::as_slice)
    }

    /// Entry of `channel` in `mode` for the gain table step `gain` falls into.
    pub fn entry(&self, mode: MeasurementMode, channel: usize, gain: f32) -> Result<CalibrationEntry> {
        let atom = AtomType::for_channel(mode, channel).ok_or_else(|| {
            Error::OutOfRange(format!("channel index {} is out of range", channel))
        })?;
        let index = gain_index(gain);
        self.atom(atom)
            .and_then(|entries| entries.get(index))
            .copied()
            .ok_or_else(|| {
                Error::CalibrationDataInvalid(format!("no entry {} in atom {}", index, atom))
            })
    }
}
