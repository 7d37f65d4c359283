//! Line-oriented control protocol.
//!
//! A request is a single line, either `name<value` (set) or `name>query` (get).
//! A response is a single JSON line, `{"result": ...}` or `{"error": code, "what": "..."}`.

use derive_more::Display;
use serde::Deserialize;
use serde_json::Value;

pub const ENABLE_MEASUREMENT: &str = "EnableADmes";
/// Many settings at once as a JSON object.
pub const SETTINGS: &str = "js";
pub const EVENTS: &str = "je";

pub const CALIBRATION_ATOM_KEY: &str = "cAtom";
pub const CALIBRATION_DATA_KEY: &str = "data";

const SET_SEP: char = '<';
const GET_SEP: char = '>';

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Set { name: String, value: String },
    Get { name: String, query: String },
}

impl Request {
    pub fn set(name: &str, value: impl Into<String>) -> Self {
        Self::Set {
            name: name.into(),
            value: value.into(),
        }
    }
    pub fn get(name: &str, query: impl Into<String>) -> Self {
        Self::Get {
            name: name.into(),
            query: query.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Set { name, .. } | Self::Get { name, .. } => name,
        }
    }

    /// Request line including the trailing newline.
    pub fn to_line(&self) -> String {
        match self {
            Self::Set { name, value } => format!("{}{}{}\n", name, SET_SEP, value),
            Self::Get { name, query } => format!("{}{}{}\n", name, GET_SEP, query),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let pos = line.find(|c: char| c == SET_SEP || c == GET_SEP)?;
        let (name, rest) = line.split_at(pos);
        if name.is_empty() {
            return None;
        }
        let (sep, arg) = rest.split_at(1);
        Some(if sep.starts_with(SET_SEP) {
            Self::set(name, arg)
        } else {
            Self::get(name, arg)
        })
    }
}

#[derive(Clone, Debug, PartialEq, Display)]
pub enum ResponseError {
    #[display(fmt = "board error {}: {}", code, what)]
    Remote { code: i64, what: String },
    #[display(fmt = "malformed response: {:?}", _0)]
    Malformed(String),
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Success {
    result: Value,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Failure {
    error: i64,
    what: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Response {
    Ok(Success),
    Err(Failure),
}

pub fn parse_response(line: &str) -> Result<Value, ResponseError> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    match serde_json::from_str::<Response>(line) {
        Ok(Response::Ok(Success { result })) => Ok(result),
        Ok(Response::Err(Failure { error, what })) => {
            Err(ResponseError::Remote { code: error, what })
        }
        Err(_) => Err(ResponseError::Malformed(line.into())),
    }
}

/// Response line for a successful request, including the trailing newline.
pub fn ok_line(result: Value) -> String {
    format!("{}\n", serde_json::json!({ "result": result }))
}

pub fn error_line(code: i64, what: &str) -> String {
    format!(
        "{}\n",
        serde_json::json!({ "error": code, "what": what })
    )
}
