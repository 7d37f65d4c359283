use crate::error::{Error, Result};
use common::{
    config::{
        CHANNEL_COUNT, MAX_BURST_SIZE, MAX_GAIN, MAX_SAMPLE_RATE, MIN_BURST_SIZE, MIN_GAIN,
        MIN_SAMPLE_RATE, PWM_COUNT, PWM_FREQUENCY_RANGE, PWM_LEVEL_RANGE,
    },
    values::MeasurementMode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn invalid_driver(what: &str) -> Error {
    Error::DriverSettingsInvalid(what.into())
}

/// Settings of the host side of the acquisition.
///
/// `burst_size` and `frequency` are mutually exclusive, setting one of them erases the other.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DriverSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sample_rate: Option<u32>,
    #[serde(default, rename = "burstBufferSize", skip_serializing_if = "Option::is_none")]
    burst_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    frequency: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    translation_offsets: Vec<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    translation_slopes: Vec<f32>,
}

impl DriverSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let this: Self = serde_json::from_str(text)
            .map_err(|err| Error::DriverSettingsInvalid(err.to_string()))?;
        this.validate()?;
        Ok(this)
    }
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Checks values and their combination, as the setters do.
    pub fn validate(&self) -> Result<()> {
        if let Some(rate) = self.sample_rate {
            check_sample_rate(rate)?;
        }
        if let Some(size) = self.burst_size {
            check_burst_size(size)?;
        }
        if let Some(frequency) = self.frequency {
            if self.burst_size.is_some() {
                return Err(invalid_driver(
                    "burstBufferSize and frequency are mutually exclusive",
                ));
            }
            check_frequency(frequency, self.sample_rate)?;
        }
        if self.translation_offsets.len() > CHANNEL_COUNT
            || self.translation_slopes.len() > CHANNEL_COUNT
        {
            return Err(invalid_driver("too many translation values"));
        }
        Ok(())
    }

    pub fn set_sample_rate(&mut self, rate: u32) -> Result<&mut Self> {
        check_sample_rate(rate)?;
        if let Some(frequency) = self.frequency {
            check_frequency(frequency, Some(rate))?;
        }
        self.sample_rate = Some(rate);
        Ok(self)
    }
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    pub fn set_burst_size(&mut self, size: usize) -> Result<&mut Self> {
        check_burst_size(size)?;
        self.burst_size = Some(size);
        self.frequency = None;
        Ok(self)
    }
    pub fn burst_size(&self) -> Option<usize> {
        self.burst_size
    }

    /// Number of deliveries per second, requires the sample rate to be set.
    pub fn set_frequency(&mut self, frequency: u32) -> Result<&mut Self> {
        check_frequency(frequency, self.sample_rate)?;
        self.frequency = Some(frequency);
        self.burst_size = None;
        Ok(self)
    }
    pub fn frequency(&self) -> Option<u32> {
        self.frequency
    }

    /// Samples per delivery.
    pub fn effective_burst_size(&self) -> Option<usize> {
        let rate = self.sample_rate? as usize;
        Some(match (self.burst_size, self.frequency) {
            (Some(size), _) => size,
            (None, Some(frequency)) => (rate / frequency as usize).max(1),
            (None, None) => rate,
        })
    }

    pub fn set_translation_offset(&mut self, index: usize, value: i32) -> Result<&mut Self> {
        set_element(&mut self.translation_offsets, index, value, 0)?;
        Ok(self)
    }
    pub fn translation_offset(&self, index: usize) -> Option<i32> {
        self.translation_offsets.get(index).copied()
    }

    pub fn set_translation_slope(&mut self, index: usize, value: f32) -> Result<&mut Self> {
        set_element(&mut self.translation_slopes, index, value, 1.0)?;
        Ok(self)
    }
    pub fn translation_slope(&self, index: usize) -> Option<f32> {
        self.translation_slopes.get(index).copied()
    }
}

fn check_sample_rate(rate: u32) -> Result<()> {
    if (MIN_SAMPLE_RATE..=MAX_SAMPLE_RATE).contains(&rate) {
        Ok(())
    } else {
        Err(invalid_driver("sample rate is out of range"))
    }
}

fn check_burst_size(size: usize) -> Result<()> {
    if (MIN_BURST_SIZE..=MAX_BURST_SIZE).contains(&size) {
        Ok(())
    } else {
        Err(invalid_driver("burst buffer size is out of range"))
    }
}

fn check_frequency(frequency: u32, rate: Option<u32>) -> Result<()> {
    let rate = rate.ok_or_else(|| invalid_driver("frequency requires sample rate"))?;
    if (1..=rate).contains(&frequency) {
        Ok(())
    } else {
        Err(invalid_driver("frequency is out of range"))
    }
}

fn set_element<T: Copy>(values: &mut Vec<T>, index: usize, value: T, default: T) -> Result<()> {
    if index >= CHANNEL_COUNT {
        return Err(invalid_driver("translation index is out of range"));
    }
    if values.len() <= index {
        values.resize(index + 1, default);
    }
    values[index] = value;
    Ok(())
}

/// Board settings as flat key/value pairs.
///
/// Channels and PWMs are numbered from `1` in keys and from `0` in methods.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardSettings {
    values: Map<String, Value>,
}

fn invalid_board(what: String) -> Error {
    Error::BoardSettingsInvalid(what)
}

fn channel_key(index: usize, name: &str) -> Result<String> {
    if index < CHANNEL_COUNT {
        Ok(format!("CH{}.{}", index + 1, name))
    } else {
        Err(invalid_board(format!("channel index {} is out of range", index)))
    }
}

fn pwm_key(index: usize, name: Option<&str>) -> Result<String> {
    if index >= PWM_COUNT {
        return Err(invalid_board(format!("PWM index {} is out of range", index)));
    }
    Ok(match name {
        Some(name) => format!("PWM{}.{}", index + 1, name),
        None => format!("PWM{}", index + 1),
    })
}

impl BoardSettings {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self { values }
    }
    pub fn from_json(text: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(text).map_err(|err| invalid_board(err.to_string()))? {
            Value::Object(values) => Ok(Self { values }),
            _ => Err(invalid_board("board settings must be an object".into())),
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }
    pub fn into_map(self) -> Map<String, Value> {
        self.values
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
    /// Sets an arbitrary key, passed to the board unchecked.
    pub fn set(&mut self, key: &str, value: Value) -> &mut Self {
        self.values.insert(key.into(), value);
        self
    }

    pub fn set_signal_mode(&mut self, mode: i32) -> &mut Self {
        self.set("Mode", mode.into())
    }
    pub fn signal_mode(&self) -> Option<i32> {
        self.int("Mode")
    }

    pub fn set_channel_mode(&mut self, index: usize, mode: MeasurementMode) -> Result<&mut Self> {
        let key = channel_key(index, "mode")?;
        Ok(self.set(&key, mode.code().into()))
    }
    pub fn channel_mode(&self, index: usize) -> Option<MeasurementMode> {
        let value = self.values.get(&channel_key(index, "mode").ok()?)?;
        MeasurementMode::from_code(value.as_i64()?)
    }

    pub fn set_channel_gain(&mut self, index: usize, gain: f32) -> Result<&mut Self> {
        let key = channel_key(index, "gain")?;
        if !(MIN_GAIN..=MAX_GAIN).contains(&gain) {
            return Err(invalid_board(format!("gain {} is out of range", gain)));
        }
        Ok(self.set(&key, gain.into()))
    }
    pub fn channel_gain(&self, index: usize) -> Option<f32> {
        let value = self.values.get(&channel_key(index, "gain").ok()?)?;
        value.as_f64().map(|x| x as f32)
    }

    pub fn set_channel_iepe(&mut self, index: usize, enabled: bool) -> Result<&mut Self> {
        let key = channel_key(index, "iepe")?;
        Ok(self.set(&key, enabled.into()))
    }
    pub fn channel_iepe(&self, index: usize) -> Option<bool> {
        self.values.get(&channel_key(index, "iepe").ok()?)?.as_bool()
    }

    pub fn set_pwm_enabled(&mut self, index: usize, enabled: bool) -> Result<&mut Self> {
        let key = pwm_key(index, None)?;
        Ok(self.set(&key, enabled.into()))
    }
    pub fn pwm_enabled(&self, index: usize) -> Option<bool> {
        self.values.get(&pwm_key(index, None).ok()?)?.as_bool()
    }

    pub fn set_pwm_frequency(&mut self, index: usize, frequency: i32) -> Result<&mut Self> {
        let key = pwm_key(index, Some("freq"))?;
        if !PWM_FREQUENCY_RANGE.contains(&frequency) {
            return Err(invalid_board(format!("PWM frequency {} is out of range", frequency)));
        }
        Ok(self.set(&key, frequency.into()))
    }
    pub fn pwm_frequency(&self, index: usize) -> Option<i32> {
        self.int(&pwm_key(index, Some("freq")).ok()?)
    }

    /// Sets low and high signal levels of a PWM.
    pub fn set_pwm_levels(&mut self, index: usize, low: i32, high: i32) -> Result<&mut Self> {
        let (low_key, high_key) = (pwm_key(index, Some("low"))?, pwm_key(index, Some("high"))?);
        if !(PWM_LEVEL_RANGE.contains(&low) && PWM_LEVEL_RANGE.contains(&high) && low <= high) {
            return Err(invalid_board(format!("invalid PWM levels {}..{}", low, high)));
        }
        self.set(&low_key, low.into());
        Ok(self.set(&high_key, high.into()))
    }
    pub fn pwm_levels(&self, index: usize) -> Option<(i32, i32)> {
        Some((
            self.int(&pwm_key(index, Some("low")).ok()?)?,
            self.int(&pwm_key(index, Some("high")).ok()?)?,
        ))
    }

    pub fn set_pwm_repeats(&mut self, index: usize, repeats: i32) -> Result<&mut Self> {
        let key = pwm_key(index, Some("repeats"))?;
        if repeats < 0 {
            return Err(invalid_board(format!("negative PWM repeat count {}", repeats)));
        }
        Ok(self.set(&key, repeats.into()))
    }
    pub fn pwm_repeats(&self, index: usize) -> Option<i32> {
        self.int(&pwm_key(index, Some("repeats")).ok()?)
    }

    pub fn set_pwm_duty(&mut self, index: usize, duty: f32) -> Result<&mut Self> {
        let key = pwm_key(index, Some("duty"))?;
        if !(duty > 0.0 && duty < 1.0) {
            return Err(invalid_board(format!("PWM duty cycle {} is out of range", duty)));
        }
        Ok(self.set(&key, duty.into()))
    }
    pub fn pwm_duty(&self, index: usize) -> Option<f32> {
        let value = self.values.get(&pwm_key(index, Some("duty")).ok()?)?;
        value.as_f64().map(|x| x as f32)
    }

    fn int(&self, key: &str) -> Option<i32> {
        self.values.get(key)?.as_i64()?.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn burst_size_and_frequency_are_exclusive() {
        let mut s = DriverSettings::new();
        assert!(s.set_frequency(10).is_err());
        s.set_sample_rate(48000).unwrap().set_frequency(10).unwrap();
        assert_eq!(s.effective_burst_size(), Some(4800));

        s.set_burst_size(240).unwrap();
        assert_eq!((s.burst_size(), s.frequency()), (Some(240), None));
        s.set_frequency(100).unwrap();
        assert_eq!((s.burst_size(), s.frequency()), (None, Some(100)));
        assert_eq!(s.effective_burst_size(), Some(480));
    }

    #[test]
    fn out_of_range_is_rejected() {
        let mut s = DriverSettings::new();
        s.set_sample_rate(1000).unwrap();
        let before = s.clone();
        for err in [
            s.set_sample_rate(31).map(|_| ()),
            s.set_sample_rate(48001).map(|_| ()),
            s.set_burst_size(20).map(|_| ()),
            s.set_frequency(0).map(|_| ()),
            s.set_frequency(1001).map(|_| ()),
            s.set_translation_offset(4, 1).map(|_| ()),
        ] {
            assert!(matches!(err, Err(Error::DriverSettingsInvalid(_))));
        }
        assert_eq!(s, before);
    }

    #[test]
    fn effective_burst_size_defaults_to_rate() {
        let mut s = DriverSettings::new();
        assert_eq!(s.effective_burst_size(), None);
        s.set_sample_rate(2400).unwrap();
        assert_eq!(s.effective_burst_size(), Some(2400));
    }

    #[test]
    fn translations() {
        let mut s = DriverSettings::new();
        s.set_translation_slope(2, 0.5).unwrap();
        assert_eq!(s.translation_slope(0), Some(1.0));
        assert_eq!(s.translation_slope(2), Some(0.5));
        assert_eq!(s.translation_slope(3), None);
        assert_eq!(s.translation_offset(0), None);
    }

    #[test]
    fn json() {
        let mut s = DriverSettings::new();
        s.set_sample_rate(1000).unwrap().set_burst_size(100).unwrap();
        s.set_translation_offset(1, -5).unwrap();
        let text = s.to_json().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&text).unwrap(),
            json!({"sampleRate": 1000, "burstBufferSize": 100, "translationOffsets": [0, -5]})
        );
        assert_eq!(DriverSettings::from_json(&text).unwrap(), s);

        for bad in [
            r#"{"sampleRate": 1000, "burstBufferSize": 100, "frequency": 10}"#,
            r#"{"frequency": 10}"#,
            r#"{"sampleRate": 5}"#,
            r#"{"rate": 1000}"#,
        ] {
            assert!(DriverSettings::from_json(bad).is_err(), "{}", bad);
        }
    }

    #[test]
    fn board_channels() {
        let mut b = BoardSettings::new();
        b.set_channel_mode(0, MeasurementMode::Current)
            .unwrap()
            .set_channel_gain(0, 2.75)
            .unwrap()
            .set_channel_iepe(3, true)
            .unwrap();
        assert_eq!(b.channel_mode(0), Some(MeasurementMode::Current));
        assert_eq!(b.channel_mode(1), None);
        assert_eq!(b.channel_gain(0), Some(2.75));
        assert_eq!(b.channel_iepe(3), Some(true));
        assert_eq!(b.get("CH1.mode"), Some(&json!(1)));
        assert_eq!(b.get("CH4.iepe"), Some(&json!(true)));

        assert!(b.set_channel_mode(4, MeasurementMode::Voltage).is_err());
        assert!(b.set_channel_gain(1, 0.5).is_err());
        assert!(b.set_channel_gain(1, 2000.0).is_err());
    }

    #[test]
    fn board_pwms() {
        let mut b = BoardSettings::new();
        b.set_pwm_enabled(1, true).unwrap();
        b.set_pwm_frequency(1, 500).unwrap();
        b.set_pwm_levels(1, 100, 4000).unwrap();
        b.set_pwm_repeats(1, 0).unwrap();
        b.set_pwm_duty(1, 0.25).unwrap();
        assert_eq!(b.get("PWM2"), Some(&json!(true)));
        assert_eq!(b.pwm_frequency(1), Some(500));
        assert_eq!(b.pwm_levels(1), Some((100, 4000)));
        assert_eq!(b.pwm_repeats(1), Some(0));
        assert_eq!(b.pwm_duty(1), Some(0.25));
        assert_eq!(b.pwm_enabled(0), None);

        assert!(b.set_pwm_enabled(2, true).is_err());
        assert!(b.set_pwm_frequency(0, 0).is_err());
        assert!(b.set_pwm_levels(0, 10, 5).is_err());
        assert!(b.set_pwm_repeats(0, -1).is_err());
        assert!(b.set_pwm_duty(0, 1.0).is_err());
    }

    #[test]
    fn board_json() {
        let b = BoardSettings::from_json(r#"{"CH2.gain": 4, "Custom": "x"}"#).unwrap();
        assert_eq!(b.channel_gain(1), Some(4.0));
        assert_eq!(b.get("Custom"), Some(&json!("x")));
        assert!(BoardSettings::from_json("[1]").is_err());
        assert_eq!(serde_json::to_value(&b).unwrap(), json!({"CH2.gain": 4, "Custom": "x"}));
    }
}
