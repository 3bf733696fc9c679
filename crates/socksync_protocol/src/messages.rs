//! Typed arguments of every protocol function.
//!
//! Each struct is the payload of one `func`. Required fields are listed in
//! [`Args::REQUIRED`] and checked before the payload is deserialized, so a
//! missing field is reported as `MISSING_FIELD` naming the first one absent.

use crate::envelope::Payload;
use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arguments of one protocol function.
pub trait Args: Serialize + DeserializeOwned {
    /// Function name on the wire.
    const FUNC: &'static str;
    /// Fields that must be present, in reporting order.
    const REQUIRED: &'static [&'static str];

    /// Returns the first required field absent from `payload`.
    fn missing_field(payload: &Payload) -> Option<&'static str> {
        Self::REQUIRED
            .iter()
            .copied()
            .find(|field| !payload.contains_key(*field))
    }

    /// Validates required fields, then deserializes the payload.
    fn from_payload(payload: &Payload) -> ProtocolResult<Self> {
        if let Some(field) = Self::missing_field(payload) {
            return Err(ProtocolError::MissingField {
                func: Self::FUNC,
                field,
            });
        }
        serde_json::from_value(Value::Object(payload.clone())).map_err(|e| {
            ProtocolError::InvalidField {
                func: Self::FUNC,
                reason: e.to_string(),
            }
        })
    }

    /// Serializes into a payload map.
    fn to_payload(&self) -> ProtocolResult<Payload> {
        match serde_json::to_value(self).map_err(|e| ProtocolError::Encode(e.to_string()))? {
            Value::Object(map) => Ok(map),
            other => Err(ProtocolError::Encode(format!(
                "{} arguments must be an object, got {other}",
                Self::FUNC
            ))),
        }
    }
}

macro_rules! impl_args {
    ($ty:ty, $func:literal, [$($field:literal),*]) => {
        impl Args for $ty {
            const FUNC: &'static str = $func;
            const REQUIRED: &'static [&'static str] = &[$($field),*];
        }
    };
}

/// Body of an `error` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Stable error code.
    pub error_code: ErrorCode,
    /// Human readable description.
    pub message: String,
}
impl_args!(ErrorMessage, "error", ["error_code", "message"]);

/// Subscribe to a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subscribe {}
impl_args!(Subscribe, "subscribe", []);

/// Unsubscribe from a group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unsubscribe {}
impl_args!(Unsubscribe, "unsubscribe", []);

/// Request the current value of a variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarGet {}
impl_args!(VarGet, "get", []);

/// Full value of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarSet {
    /// New value.
    pub value: Value,
}
impl_args!(VarSet, "set", ["value"]);

/// Request one page of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListGet {
    /// Zero-based page number.
    pub page: usize,
    /// Requested items per page.
    pub page_size: usize,
}
impl_args!(ListGet, "get", ["page", "page_size"]);

/// A whole page of a list, replacing the mirror's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSetAll {
    /// Page number echoed from the request.
    pub page: usize,
    /// Effective page size.
    pub page_size: usize,
    /// Length of the whole list.
    pub total_item_count: usize,
    /// Items of the page.
    pub items: Vec<Value>,
}
impl_args!(
    ListSetAll,
    "set_all",
    ["page", "page_size", "total_item_count", "items"]
);

/// New length of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSetCount {
    /// Length of the whole list.
    pub total_item_count: usize,
}
impl_args!(ListSetCount, "set_count", ["total_item_count"]);

/// Insert at a page-relative index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListInsert {
    /// Page-relative index.
    pub index: usize,
    /// Inserted value.
    pub value: Value,
}
impl_args!(ListInsert, "insert", ["index", "value"]);

/// Delete at a page-relative index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListDelete {
    /// Page-relative index.
    pub index: usize,
}
impl_args!(ListDelete, "delete", ["index"]);

/// Replace at a page-relative index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListSet {
    /// Page-relative index.
    pub index: usize,
    /// Replacement value.
    pub value: Value,
}
impl_args!(ListSet, "set", ["index", "value"]);

/// Invoke a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Caller-chosen token, echoed in the `return`.
    pub id: String,
    /// Keyword arguments.
    #[serde(default)]
    pub args: Payload,
}
impl_args!(Call, "call", ["id"]);

/// Result of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Return {
    /// Token of the call being answered.
    pub id: String,
    /// Returned value.
    #[serde(default)]
    pub value: Value,
}
impl_args!(Return, "return", ["id"]);
