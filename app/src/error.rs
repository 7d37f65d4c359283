use crate::resampler::DesignError;
use common::protocol::ResponseError;
use derive_more::Display;
use std::io;
use thiserror::Error;

/// Stable numeric error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
#[repr(i32)]
pub enum ErrorCode {
    Generic = 1,

    BoardSettingsInvalid = 10011,
    CalibrationDataInvalid = 10021,
    BoardSettingsInsufficient = 10031,
    BoardMeasurementStarted = 10111,

    DriverSettingsInvalid = 20111,
    DriverSettingsInsufficient = 20121,

    DriftReferencesInvalid = 30011,
    DriftReferencesNotFound = 30021,

    ControlSendFailed = 40011,
    ControlReceiveFailed = 40111,
    ControlCommandFailed = 40211,

    ResamplerDesignFailed = 50011,
    OutOfRange = 50021,
}

impl ErrorCode {
    pub fn value(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("measurement is started")]
    Busy,
    #[error("invalid board settings: {0}")]
    BoardSettingsInvalid(String),
    #[error("insufficient board settings: {0}")]
    BoardSettingsInsufficient(String),
    #[error("invalid calibration data: {0}")]
    CalibrationDataInvalid(String),

    #[error("invalid driver settings: {0}")]
    DriverSettingsInvalid(String),
    #[error("insufficient driver settings: {0}")]
    DriverSettingsInsufficient(String),

    #[error("invalid drift references: {0}")]
    DriftReferencesInvalid(String),
    #[error("no drift references")]
    DriftReferencesNotFound,

    #[error("cannot send request: {0}")]
    ControlSend(io::Error),
    #[error("cannot receive response: {0}")]
    ControlReceive(String),
    #[error("board error {code}: {what}")]
    ControlCommand { code: i64, what: String },

    #[error("cannot design resampler: {0}")]
    Resampler(#[from] DesignError),
    #[error("{0}")]
    OutOfRange(String),
}

impl Error {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Io(_) | Self::Json(_) => ErrorCode::Generic,
            Self::Busy => ErrorCode::BoardMeasurementStarted,
            Self::BoardSettingsInvalid(_) => ErrorCode::BoardSettingsInvalid,
            Self::BoardSettingsInsufficient(_) => ErrorCode::BoardSettingsInsufficient,
            Self::CalibrationDataInvalid(_) => ErrorCode::CalibrationDataInvalid,
            Self::DriverSettingsInvalid(_) => ErrorCode::DriverSettingsInvalid,
            Self::DriverSettingsInsufficient(_) => ErrorCode::DriverSettingsInsufficient,
            Self::DriftReferencesInvalid(_) => ErrorCode::DriftReferencesInvalid,
            Self::DriftReferencesNotFound => ErrorCode::DriftReferencesNotFound,
            Self::ControlSend(_) => ErrorCode::ControlSendFailed,
            Self::ControlReceive(_) => ErrorCode::ControlReceiveFailed,
            Self::ControlCommand { .. } => ErrorCode::ControlCommandFailed,
            Self::Resampler(_) => ErrorCode::ResamplerDesignFailed,
            Self::OutOfRange(_) => ErrorCode::OutOfRange,
        }
    }
}

impl From<ResponseError> for Error {
    fn from(err: ResponseError) -> Self {
        match err {
            ResponseError::Remote { code, what } => Self::ControlCommand { code, what },
            ResponseError::Malformed(line) => Self::ControlReceive(format!("malformed response {:?}", line)),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(Error::Busy.code().value(), 10111);
        assert_eq!(Error::DriftReferencesNotFound.code().value(), 30021);
        assert_eq!(
            Error::from(DesignError::ShapeFactor).code(),
            ErrorCode::ResamplerDesignFailed
        );
        let err = Error::from(ResponseError::Remote {
            code: 10011,
            what: "bad key".into(),
        });
        assert_eq!(err.code(), ErrorCode::ControlCommandFailed);
        assert_eq!(err.to_string(), "board error 10011: bad key");
    }
}
