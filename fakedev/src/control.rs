use crate::{board::State, FakeBoard};
use app::channel::Channel;
use common::{
    protocol::{self, Request},
    values::{MeasurementMode, GAIN_TABLE},
};
use serde_json::{json, Map, Value};
use std::{collections::VecDeque, io};

const UNKNOWN_REQUEST: i64 = 1;
const BAD_VALUE: i64 = 2;

type Reply = Result<Value, (i64, String)>;

fn bad_value(what: String) -> (i64, String) {
    (BAD_VALUE, what)
}

/// Request handlers of the board, selected by request name.
#[derive(Clone, Copy, Debug)]
enum Handler {
    Settings,
    Measurement,
    Events,
}

impl Handler {
    fn find(name: &str) -> Option<Self> {
        match name {
            protocol::SETTINGS => Some(Self::Settings),
            protocol::ENABLE_MEASUREMENT => Some(Self::Measurement),
            protocol::EVENTS => Some(Self::Events),
            _ => None,
        }
    }

    fn handle(self, state: &mut State, request: &Request) -> Reply {
        match (self, request) {
            (Self::Settings, Request::Set { value, .. }) => set_settings(state, value),
            (Self::Settings, Request::Get { query, .. }) => get_settings(state, query),
            (Self::Measurement, Request::Set { value, .. }) => {
                let measuring = match value.as_str() {
                    "1" => true,
                    "0" => false,
                    _ => return Err(bad_value(format!("{:?} is not a flag", value))),
                };
                if measuring && !state.measuring {
                    state.stream.restart();
                }
                state.measuring = measuring;
                log::debug!("Measurement enabled: {}", measuring);
                Ok(json!(measuring as i32))
            }
            (Self::Measurement, Request::Get { .. }) => Ok(json!(state.measuring as i32)),
            (Self::Events, Request::Get { .. }) => Ok(Value::Object(std::mem::take(&mut state.events))),
            (Self::Events, Request::Set { .. }) => {
                Err((UNKNOWN_REQUEST, "events are read-only".into()))
            }
        }
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, (i64, String)> {
    match serde_json::from_str(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(bad_value("object expected".into())),
        Err(err) => Err(bad_value(err.to_string())),
    }
}

fn check_setting(key: &str, value: &Value) -> Result<(), (i64, String)> {
    let valid = if key.ends_with(".mode") {
        value.as_i64().and_then(MeasurementMode::from_code).is_some()
    } else if key.ends_with(".gain") {
        value
            .as_f64()
            .map_or(false, |g| ((GAIN_TABLE[0] as f64)..=(GAIN_TABLE[21] as f64)).contains(&g))
    } else {
        true
    };
    if valid {
        Ok(())
    } else {
        Err(bad_value(format!("invalid value {} of {}", value, key)))
    }
}

fn set_settings(state: &mut State, text: &str) -> Reply {
    let values = parse_object(text)?;
    for (key, value) in &values {
        check_setting(key, value)?;
    }
    let count = values.len();
    state.settings.extend(values);
    Ok(json!(count))
}

fn get_settings(state: &State, text: &str) -> Reply {
    if text.is_empty() {
        return Ok(Value::Object(state.settings.clone()));
    }
    let query = parse_object(text)?;
    if let Some(code) = query.get(protocol::CALIBRATION_ATOM_KEY) {
        let entries = code
            .as_u64()
            .and_then(|c| u16::try_from(c).ok())
            .and_then(|c| state.calibration.get(&c))
            .ok_or_else(|| bad_value(format!("no calibration atom {}", code)))?;
        let mut result = Map::new();
        result.insert(protocol::CALIBRATION_DATA_KEY.into(), json!(entries));
        return Ok(Value::Object(result));
    }
    Ok(Value::Object(
        query
            .keys()
            .filter_map(|key| Some((key.clone(), state.settings.get(key)?.clone())))
            .collect(),
    ))
}

/// Control channel of the emulated board.
pub struct FakeChannel {
    board: FakeBoard,
    responses: VecDeque<String>,
}

impl FakeChannel {
    pub(crate) fn new(board: FakeBoard) -> Self {
        Self {
            board,
            responses: VecDeque::new(),
        }
    }
}

impl Channel for FakeChannel {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        let request = Request::parse(line)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "malformed request"))?;
        let reply = match Handler::find(request.name()) {
            Some(handler) => handler.handle(&mut self.board.lock(), &request),
            None => Err((UNKNOWN_REQUEST, format!("unknown request {}", request.name()))),
        };
        self.responses.push_back(match reply {
            Ok(result) => protocol::ok_line(result),
            Err((code, what)) => protocol::error_line(code, &what),
        });
        Ok(())
    }

    fn receive_line(&mut self) -> io::Result<String> {
        self.responses
            .pop_front()
            .ok_or_else(|| io::ErrorKind::TimedOut.into())
    }
}
