//! Error types and wire error codes.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Stable error codes carried in `error` frames.
///
/// The numeric values are part of the wire format and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum ErrorCode {
    /// The message was not a JSON object.
    InvalidJson = 0,
    /// Unknown function, or the function requires a subscription.
    InvalidFunc = 1,
    /// Missing or unsupported group type.
    InvalidType = 2,
    /// Missing or unknown group name.
    InvalidName = 3,
    /// A required field is absent.
    MissingField = 4,
    /// A list index is out of bounds.
    BadIndex = 5,
    /// A call id is unknown or already consumed.
    BadId = 6,
    /// Any other failure, including application callback errors.
    Other = 7,
}

impl ErrorCode {
    /// Returns the symbolic name used in documentation and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::InvalidFunc => "INVALID_FUNC",
            ErrorCode::InvalidType => "INVALID_TYPE",
            ErrorCode::InvalidName => "INVALID_NAME",
            ErrorCode::MissingField => "MISSING_FIELD",
            ErrorCode::BadIndex => "BAD_INDEX",
            ErrorCode::BadId => "BAD_ID",
            ErrorCode::Other => "OTHER",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ErrorCode> for u8 {
    fn from(code: ErrorCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ErrorCode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ErrorCode::InvalidJson),
            1 => Ok(ErrorCode::InvalidFunc),
            2 => Ok(ErrorCode::InvalidType),
            3 => Ok(ErrorCode::InvalidName),
            4 => Ok(ErrorCode::MissingField),
            5 => Ok(ErrorCode::BadIndex),
            6 => Ok(ErrorCode::BadId),
            7 => Ok(ErrorCode::Other),
            other => Err(ProtocolError::UnknownErrorCode(other)),
        }
    }
}

/// Errors produced while decoding or validating a message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Text is not a JSON object.
    #[error("invalid json: {0}")]
    InvalidJson(String),

    /// The `func` key is absent or not a string.
    #[error("func is required")]
    MissingFunc,

    /// The `type` key is absent.
    #[error("type is required")]
    MissingType,

    /// The `type` key names no known group type.
    #[error("unsupported type: {0}")]
    InvalidType(String),

    /// The `name` key is absent.
    #[error("name is required")]
    MissingName,

    /// A field required by the function is absent.
    #[error("{field} is required for {func}")]
    MissingField {
        /// Function being decoded.
        func: &'static str,
        /// First missing field.
        field: &'static str,
    },

    /// A field is present but has the wrong shape.
    #[error("invalid arguments for {func}: {reason}")]
    InvalidField {
        /// Function being decoded.
        func: &'static str,
        /// Decoder message.
        reason: String,
    },

    /// An `error` frame carried a code outside the known range.
    #[error("unknown error code: {0}")]
    UnknownErrorCode(u8),

    /// Encoding an outbound message failed.
    #[error("encode error: {0}")]
    Encode(String),
}

impl ProtocolError {
    /// Returns the wire error code reported to the sender.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            ProtocolError::InvalidJson(_) => ErrorCode::InvalidJson,
            ProtocolError::MissingFunc => ErrorCode::InvalidFunc,
            ProtocolError::MissingType | ProtocolError::InvalidType(_) => ErrorCode::InvalidType,
            ProtocolError::MissingName => ErrorCode::InvalidName,
            ProtocolError::MissingField { .. } => ErrorCode::MissingField,
            ProtocolError::InvalidField { .. }
            | ProtocolError::UnknownErrorCode(_)
            | ProtocolError::Encode(_) => ErrorCode::Other,
        }
    }
}
