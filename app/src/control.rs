use crate::{
    channel::Channel,
    error::{Error, Result},
    event::Event,
};
use common::{
    protocol::{self, Request},
    values::{AtomType, CalibrationEntry},
};
use serde_json::{json, Map, Value};

/// Client of the board control side-channel.
pub struct Control<C: Channel> {
    channel: C,
}

impl<C: Channel> Control<C> {
    pub fn new(channel: C) -> Self {
        Self { channel }
    }

    pub fn execute(&mut self, request: &Request) -> Result<Value> {
        self.channel
            .send_line(&request.to_line())
            .map_err(Error::ControlSend)?;
        let line = self
            .channel
            .receive_line()
            .map_err(|err| Error::ControlReceive(err.to_string()))?;
        Ok(protocol::parse_response(&line)?)
    }

    pub fn set_measurement_enabled(&mut self, enabled: bool) -> Result<()> {
        self.execute(&Request::set(
            protocol::ENABLE_MEASUREMENT,
            if enabled { "1" } else { "0" },
        ))?;
        Ok(())
    }

    /// Sets many board settings at once, returns the settings applied.
    pub fn set_settings(&mut self, settings: &Map<String, Value>) -> Result<Value> {
        let value = serde_json::to_string(settings)?;
        self.execute(&Request::set(protocol::SETTINGS, value))
    }

    /// Gets the board settings selected by `query`, all of them if `query` is empty.
    pub fn settings(&mut self, query: &Map<String, Value>) -> Result<Map<String, Value>> {
        let query = if query.is_empty() {
            String::new()
        } else {
            serde_json::to_string(query)?
        };
        match self.execute(&Request::get(protocol::SETTINGS, query))? {
            Value::Object(map) => Ok(map),
            other => Err(Error::ControlReceive(format!(
                "settings are not an object: {}",
                other
            ))),
        }
    }

    /// Gets the entries of the calibration atom `atom`.
    pub fn calibration_atom(&mut self, atom: AtomType) -> Result<Vec<CalibrationEntry>> {
        let mut query = Map::new();
        query.insert(protocol::CALIBRATION_ATOM_KEY.into(), json!(atom.code()));
        let mut result = self.settings(&query)?;
        let entries = match result.remove(protocol::CALIBRATION_DATA_KEY) {
            Some(data @ Value::Array(_)) => serde_json::from_value::<Vec<CalibrationEntry>>(data)
                .map_err(|err| Error::CalibrationDataInvalid(format!("{}: {}", atom, err)))?,
            _ => {
                return Err(Error::CalibrationDataInvalid(format!(
                    "no data for atom {}",
                    atom
                )))
            }
        };
        if entries.is_empty() {
            return Err(Error::CalibrationDataInvalid(format!(
                "atom {} is empty",
                atom
            )));
        }
        Ok(entries)
    }

    /// Gets the events occurred since the previous call.
    pub fn events(&mut self) -> Result<Vec<Event>> {
        let value = self.execute(&Request::get(protocol::EVENTS, ""))?;
        Ok(Event::parse_all(&value))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::{collections::VecDeque, io};

    /// Channel answering with prepared lines and recording requests.
    #[derive(Default)]
    pub struct Scripted {
        pub sent: Vec<String>,
        pub responses: VecDeque<String>,
    }

    impl Scripted {
        pub fn new<I: IntoIterator<Item = Value>>(responses: I) -> Self {
            Self {
                sent: Vec::new(),
                responses: responses.into_iter().map(|v| v.to_string()).collect(),
            }
        }
    }

    impl Channel for Scripted {
        fn send_line(&mut self, line: &str) -> io::Result<()> {
            self.sent.push(line.into());
            Ok(())
        }
        fn receive_line(&mut self) -> io::Result<String> {
            self.responses
                .pop_front()
                .ok_or_else(|| io::ErrorKind::TimedOut.into())
        }
    }

    #[test]
    fn enable_measurement() {
        let mut control = Control::new(Scripted::new([json!({"result": 1}), json!({"result": 0})]));
        control.set_measurement_enabled(true).unwrap();
        control.set_measurement_enabled(false).unwrap();
        assert_eq!(control.channel.sent, ["EnableADmes<1\n", "EnableADmes<0\n"]);
    }

    #[test]
    fn remote_error() {
        let mut control = Control::new(Scripted::new([json!({"error": 7, "what": "nope"})]));
        let err = control.set_measurement_enabled(true).unwrap_err();
        assert!(matches!(err, Error::ControlCommand { code: 7, .. }));
        assert_eq!(err.code(), ErrorCode::ControlCommandFailed);
    }

    #[test]
    fn no_response() {
        let mut control = Control::new(Scripted::default());
        let err = control.events().unwrap_err();
        assert_eq!(err.code(), ErrorCode::ControlReceiveFailed);
    }

    #[test]
    fn calibration_atom() {
        let mut control = Control::new(Scripted::new([
            json!({"result": {"data": [{"m": 0.5, "b": -3}, {"m": 2.0, "b": 4}]}}),
            json!({"result": {"data": []}}),
            json!({"result": {}}),
        ]));
        let entries = control.calibration_atom(AtomType::CIn2).unwrap();
        assert_eq!(
            entries,
            [
                CalibrationEntry {
                    slope: 0.5,
                    offset: -3
                },
                CalibrationEntry {
                    slope: 2.0,
                    offset: 4
                }
            ]
        );
        assert_eq!(control.channel.sent[0], "js>{\"cAtom\":7}\n");

        for _ in 0..2 {
            let err = control.calibration_atom(AtomType::VIn1).unwrap_err();
            assert_eq!(err.code(), ErrorCode::CalibrationDataInvalid);
        }
    }

    #[test]
    fn settings_round_trip() {
        let mut control = Control::new(Scripted::new([
            json!({"result": {"CH1.mode": 1}}),
            json!({"result": {"CH1.mode": 1, "CH1.gain": 2.0}}),
        ]));
        let mut settings = Map::new();
        settings.insert("CH1.mode".into(), json!(1));
        control.set_settings(&settings).unwrap();
        let all = control.settings(&Map::new()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(control.channel.sent, ["js<{\"CH1.mode\":1}\n", "js>\n"]);
    }
}
