//! Sensor drift compensation.
//!
//! References are channel averages measured in current mode and persisted to a file.
//! Deltas are the difference between a fresh measurement and the references, they are kept in
//! memory and subtracted from every delivered sample.

use crate::{
    burst::SampleBurst,
    channel::Channel,
    driver::Driver,
    error::{Error, Result},
    gpio::Gpio,
    resampler::Resampler,
    settings::{BoardSettings, DriverSettings},
};
use common::{
    config::{CHANNEL_COUNT, DRIFT_SAMPLE_COUNT, MAX_SAMPLE_RATE, SWITCHING_PERIOD},
    values::MeasurementMode,
};
use std::{
    fs,
    io::{self, Write},
    path::Path,
    thread::sleep,
};

/// Reads the references file, `None` if there is no file.
pub fn read_references(path: &Path) -> Result<Option<Vec<f32>>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(Error::DriftReferencesInvalid(err.to_string())),
    };
    let mut refs = Vec::with_capacity(CHANNEL_COUNT);
    for token in text.split_whitespace() {
        if refs.len() == CHANNEL_COUNT {
            return Err(Error::DriftReferencesInvalid("excessive references".into()));
        }
        let value = token
            .parse::<f32>()
            .map_err(|err| Error::DriftReferencesInvalid(format!("{:?}: {}", token, err)))?;
        refs.push(value);
    }
    if refs.len() < CHANNEL_COUNT {
        return Err(Error::DriftReferencesInvalid("insufficient references".into()));
    }
    Ok(Some(refs))
}

/// Writes the references file, creating its directory if needed.
pub fn write_references(path: &Path, refs: &[f32]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let line = refs
        .iter()
        .map(f32::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    let mut file = fs::File::create(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Removes the references file, a missing file is not an error.
pub fn remove_references(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err.into()),
        _ => Ok(()),
    }
}

/// Channel averages of the second half of `data`.
pub fn settled_averages(mut data: SampleBurst) -> Vec<f32> {
    data.erase_front(DRIFT_SAMPLE_COUNT / 2);
    data.channels()
        .iter()
        .map(|ch| {
            if ch.is_empty() {
                0.0
            } else {
                (ch.iter().map(|&x| x as f64).sum::<f64>() / ch.len() as f64) as f32
            }
        })
        .collect()
}

/// Driver state changed for a drift measurement.
struct Snapshot {
    settings: DriverSettings,
    resampler: Option<Resampler>,
    modes: Vec<MeasurementMode>,
}

impl<C: Channel, G: Gpio> Driver<C, G> {
    /// Runs `f` with all channels in current mode at the maximum sample rate.
    ///
    /// The previous driver settings and channel modes are restored afterwards, also when
    /// preparation or `f` fails.
    fn with_drift_state<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Self) -> Result<T>,
    {
        if self.is_measuring() {
            return Err(Error::Busy);
        }
        let mut snapshot = Snapshot {
            settings: self.settings.clone(),
            resampler: self.resampler.take(),
            modes: Vec::new(),
        };
        let result = self
            .prepare_drift_state(&mut snapshot)
            .and_then(|()| f(self));
        self.restore_drift_state(snapshot);
        result
    }

    fn prepare_drift_state(&mut self, snapshot: &mut Snapshot) -> Result<()> {
        let board = self.board_settings()?;
        for index in 0..CHANNEL_COUNT {
            let mode = board.channel_mode(index).ok_or_else(|| {
                Error::BoardSettingsInsufficient(format!("mode of channel {} is unknown", index))
            })?;
            snapshot.modes.push(mode);
        }

        let mut current = BoardSettings::new();
        for index in 0..CHANNEL_COUNT {
            current.set_channel_mode(index, MeasurementMode::Current)?;
        }
        self.set_board_settings(&current)?;
        sleep(SWITCHING_PERIOD);

        let mut settings = DriverSettings::new();
        settings
            .set_sample_rate(MAX_SAMPLE_RATE)?
            .set_burst_size(DRIFT_SAMPLE_COUNT)?;
        self.set_settings(settings)
    }

    fn restore_drift_state(&mut self, snapshot: Snapshot) {
        self.settings = snapshot.settings;
        self.resampler = snapshot.resampler;

        if snapshot.modes.is_empty() {
            return;
        }
        let mut board = BoardSettings::new();
        for (index, mode) in snapshot.modes.into_iter().enumerate() {
            if let Err(err) = board.set_channel_mode(index, mode) {
                log::warn!("Cannot restore mode of channel {}: {}", index, err);
            }
        }
        if let Err(err) = self.set_board_settings(&board) {
            log::warn!("Cannot restore channel modes: {}", err);
        }
    }

    fn collect_drift_samples(&mut self) -> Result<SampleBurst> {
        self.with_drift_state(|this| this.collect_raw(DRIFT_SAMPLE_COUNT))
    }

    /// Measures, persists and caches new references.
    pub fn calculate_drift_references(&mut self) -> Result<Vec<f32>> {
        let refs = settled_averages(self.collect_drift_samples()?);
        write_references(&self.config.drift_references_path, &refs)?;
        log::info!("Drift references: {:?}", refs);
        self.drift_references = Some(refs.clone());
        Ok(refs)
    }

    /// Removes persisted references, clears cached references and deltas.
    pub fn clear_drift_references(&mut self) -> Result<()> {
        if self.is_measuring() {
            return Err(Error::Busy);
        }
        remove_references(&self.config.drift_references_path)?;
        self.drift_references = None;
        self.drift_deltas = None;
        Ok(())
    }

    /// Measures and caches deltas against the references.
    pub fn calculate_drift_deltas(&mut self) -> Result<Vec<f32>> {
        if self.is_measuring() {
            return Err(Error::Busy);
        }
        let refs = self
            .drift_references(false)?
            .ok_or(Error::DriftReferencesNotFound)?;
        let averages = settled_averages(self.collect_drift_samples()?);
        let deltas = averages
            .iter()
            .zip(&refs)
            .map(|(avg, r)| avg - r)
            .collect::<Vec<_>>();
        log::info!("Drift deltas: {:?}", deltas);
        self.drift_deltas = Some(deltas.clone());
        Ok(deltas)
    }

    pub fn clear_drift_deltas(&mut self) -> Result<()> {
        if self.is_measuring() {
            return Err(Error::Busy);
        }
        self.drift_deltas = None;
        Ok(())
    }

    /// Cached references, read from the file if not cached or if `force` is set.
    pub fn drift_references(&mut self, force: bool) -> Result<Option<Vec<f32>>> {
        if !force {
            if let Some(refs) = &self.drift_references {
                return Ok(Some(refs.clone()));
            }
        }
        let refs = read_references(&self.config.drift_references_path)?;
        if refs.is_some() {
            self.drift_references = refs.clone();
        }
        Ok(refs)
    }

    pub fn drift_deltas(&self) -> Option<Vec<f32>> {
        self.drift_deltas.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, process};

    fn temp_path(name: &str) -> std::path::PathBuf {
        env::temp_dir()
            .join(format!("daqhat-drift-{}-{}", process::id(), name))
            .join("drift_references")
    }

    #[test]
    fn references_file_round_trip() {
        let path = temp_path("round-trip");
        let refs = [1.5, -2.25, 0.0, 1e-3];
        write_references(&path, &refs).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "1.5 -2.25 0 0.001\n");
        assert_eq!(read_references(&path).unwrap().unwrap(), refs);

        remove_references(&path).unwrap();
        assert_eq!(read_references(&path).unwrap(), None);
        remove_references(&path).unwrap();
    }

    #[test]
    fn malformed_references() {
        let path = temp_path("malformed");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        for text in ["", "1 2 3", "1 2 3 4 5", "1 2 x 4"] {
            fs::write(&path, text).unwrap();
            assert!(
                matches!(read_references(&path), Err(Error::DriftReferencesInvalid(_))),
                "{:?}",
                text
            );
        }
        fs::write(&path, "1\n2\t3  4\n").unwrap();
        assert_eq!(read_references(&path).unwrap().unwrap(), [1.0, 2.0, 3.0, 4.0]);
        remove_references(&path).unwrap();
    }

    #[test]
    fn averages_skip_first_half() {
        let mut ch = vec![100.0; DRIFT_SAMPLE_COUNT / 2];
        ch.extend(vec![2.0; DRIFT_SAMPLE_COUNT / 2]);
        let data = SampleBurst::from_channels(vec![ch.clone(), ch]);
        assert_eq!(settled_averages(data), [2.0, 2.0]);
    }
}
