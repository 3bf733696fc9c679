//! The wire envelope and group identity.

use crate::error::{ErrorCode, ProtocolError, ProtocolResult};
use crate::messages::{Args, ErrorMessage};
use crate::{FUNC_ERROR, FUNC_UNSUBSCRIBE_ALL};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Operation-specific keys of a message, everything except `func`, `type`, `name`.
pub type Payload = Map<String, Value>;

/// Kind of synchronized entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    /// A single scalar value.
    Var,
    /// An ordered, paginated collection.
    List,
    /// A remotely callable function.
    Function,
}

impl GroupType {
    /// Returns the wire spelling of the type.
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Var => "var",
            GroupType::List => "list",
            GroupType::Function => "function",
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupType {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "var" => Ok(GroupType::Var),
            "list" => Ok(GroupType::List),
            "function" => Ok(GroupType::Function),
            other => Err(ProtocolError::InvalidType(other.to_string())),
        }
    }
}

/// Routing key of a group: unique per type within one socket's registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId {
    /// Entity kind.
    pub group_type: GroupType,
    /// Name within the kind.
    pub name: String,
}

impl GroupId {
    /// Creates a group id.
    pub fn new(group_type: GroupType, name: impl Into<String>) -> Self {
        Self {
            group_type,
            name: name.into(),
        }
    }

    /// Shorthand for a variable id.
    pub fn var(name: impl Into<String>) -> Self {
        Self::new(GroupType::Var, name)
    }

    /// Shorthand for a list id.
    pub fn list(name: impl Into<String>) -> Self {
        Self::new(GroupType::List, name)
    }

    /// Shorthand for a function id.
    pub fn function(name: impl Into<String>) -> Self {
        Self::new(GroupType::Function, name)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.group_type, self.name)
    }
}

/// Messages that are not addressed to a group.
#[derive(Debug, Clone, PartialEq)]
pub enum Control {
    /// An error report from the peer. Never dispatched.
    Error(ErrorMessage),
    /// The peer drops every subscription it holds with us.
    UnsubscribeAll,
}

/// One protocol message.
///
/// Decoding only checks that the text is a JSON object with a string `func`.
/// `type` and `name` stay raw until [`Envelope::target`] is asked for them, so
/// control messages can be recognized before group addressing is validated.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Envelope {
    /// Operation name, the dispatch key.
    pub func: String,
    /// Raw `type` key.
    pub group_type: Option<Value>,
    /// Raw `name` key.
    pub name: Option<Value>,
    /// Remaining keys.
    pub payload: Payload,
}

impl Envelope {
    /// Creates an envelope addressed to a group.
    pub fn for_group(id: &GroupId, func: impl Into<String>, payload: Payload) -> Self {
        Self {
            func: func.into(),
            group_type: Some(Value::String(id.group_type.as_str().to_string())),
            name: Some(Value::String(id.name.clone())),
            payload,
        }
    }

    /// Creates a group envelope from typed arguments.
    pub fn from_args<A: Args>(id: &GroupId, args: &A) -> ProtocolResult<Self> {
        Ok(Self::for_group(id, A::FUNC, args.to_payload()?))
    }

    /// Creates an `error` frame.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert("error_code".into(), Value::from(u8::from(code)));
        payload.insert("message".into(), Value::String(message.into()));
        Self {
            func: FUNC_ERROR.to_string(),
            payload,
            ..Self::default()
        }
    }

    /// Creates the `unsubscribe_all` control frame.
    pub fn unsubscribe_all() -> Self {
        Self {
            func: FUNC_UNSUBSCRIBE_ALL.to_string(),
            ..Self::default()
        }
    }

    /// Decodes one message from its text form.
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(ProtocolError::InvalidJson("expected an object".into()));
        };

        let func = match map.remove("func") {
            Some(Value::String(func)) => func,
            _ => return Err(ProtocolError::MissingFunc),
        };
        let group_type = map.remove("type");
        let name = map.remove("name");

        Ok(Self {
            func,
            group_type,
            name,
            payload: map,
        })
    }

    /// Encodes the message to its text form.
    ///
    /// `type` and `name` always win over same-named payload keys.
    pub fn encode(&self) -> ProtocolResult<String> {
        let mut map = self.payload.clone();
        map.insert("func".into(), Value::String(self.func.clone()));
        if let Some(group_type) = &self.group_type {
            map.insert("type".into(), group_type.clone());
        }
        if let Some(name) = &self.name {
            map.insert("name".into(), name.clone());
        }
        serde_json::to_string(&Value::Object(map)).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Recognizes control messages (`error`, `unsubscribe_all`).
    ///
    /// Returns `None` for anything addressed to a group. A malformed error
    /// frame is still an error frame: it is reported with code `OTHER`.
    pub fn control(&self) -> Option<Control> {
        match self.func.as_str() {
            FUNC_ERROR => Some(Control::Error(
                ErrorMessage::from_payload(&self.payload).unwrap_or_else(|e| ErrorMessage {
                    error_code: ErrorCode::Other,
                    message: e.to_string(),
                }),
            )),
            FUNC_UNSUBSCRIBE_ALL => Some(Control::UnsubscribeAll),
            _ => None,
        }
    }

    /// Validates and returns the addressed group.
    pub fn target(&self) -> ProtocolResult<GroupId> {
        let group_type = match &self.group_type {
            Some(Value::String(raw)) => raw.parse::<GroupType>()?,
            Some(other) => return Err(ProtocolError::InvalidType(other.to_string())),
            None => return Err(ProtocolError::MissingType),
        };
        let name = match &self.name {
            Some(Value::String(name)) => name.clone(),
            _ => return Err(ProtocolError::MissingName),
        };
        Ok(GroupId { group_type, name })
    }

    /// Decodes the payload as the typed arguments of `A`.
    pub fn args<A: Args>(&self) -> ProtocolResult<A> {
        A::from_payload(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::VarSet;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn decode_group_message() {
        let env = Envelope::decode(r#"{"func":"set","type":"var","name":"x","value":10}"#).unwrap();
        assert_eq!(env.func, "set");
        assert_eq!(env.target().unwrap(), GroupId::var("x"));
        assert_eq!(env.payload.get("value"), Some(&json!(10)));
        assert!(env.control().is_none());
    }

    #[test]
    fn decode_rejects_non_objects() {
        assert_eq!(
            Envelope::decode("").unwrap_err().error_code(),
            ErrorCode::InvalidJson
        );
        assert_eq!(
            Envelope::decode("{{ i am in} valid:").unwrap_err().error_code(),
            ErrorCode::InvalidJson
        );
        assert_eq!(
            Envelope::decode("[1,2]").unwrap_err().error_code(),
            ErrorCode::InvalidJson
        );
    }

    #[test]
    fn decode_requires_func() {
        let err = Envelope::decode("{}").unwrap_err();
        assert_eq!(err, ProtocolError::MissingFunc);
        assert_eq!(err.error_code(), ErrorCode::InvalidFunc);
    }

    #[test]
    fn target_checks_type_before_name() {
        let env = Envelope::decode(r#"{"func":"invalid"}"#).unwrap();
        assert_eq!(env.target().unwrap_err(), ProtocolError::MissingType);

        let env = Envelope::decode(r#"{"func":"subscribe","type":"invalid","name":"a"}"#).unwrap();
        assert_eq!(
            env.target().unwrap_err().error_code(),
            ErrorCode::InvalidType
        );

        let env = Envelope::decode(r#"{"func":"subscribe","type":"var"}"#).unwrap();
        assert_eq!(env.target().unwrap_err(), ProtocolError::MissingName);
    }

    #[test]
    fn control_messages() {
        let env = Envelope::decode(r#"{"func":"unsubscribe_all"}"#).unwrap();
        assert_eq!(env.control(), Some(Control::UnsubscribeAll));

        let env = Envelope::decode(r#"{"func":"error","error_code":5,"message":"bad"}"#).unwrap();
        match env.control() {
            Some(Control::Error(msg)) => {
                assert_eq!(msg.error_code, ErrorCode::BadIndex);
                assert_eq!(msg.message, "bad");
            }
            other => panic!("unexpected control: {other:?}"),
        }
    }

    #[test]
    fn error_frame_has_exactly_three_keys() {
        let text = Envelope::error(ErrorCode::MissingField, "value is required")
            .encode()
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        let map = value.as_object().unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map["func"], json!("error"));
        assert_eq!(map["error_code"], json!(4));
    }

    #[test]
    fn encode_injects_type_and_name() {
        let mut payload = Payload::new();
        payload.insert("name".into(), json!("spoofed"));
        payload.insert("value".into(), json!(1));
        let text = Envelope::for_group(&GroupId::list("l"), "set", payload)
            .encode()
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"func": "set", "type": "list", "name": "l", "value": 1}));
    }

    #[test]
    fn typed_args_through_envelope() {
        let env = Envelope::from_args(&GroupId::var("v"), &VarSet { value: json!("hi") }).unwrap();
        let decoded = Envelope::decode(&env.encode().unwrap()).unwrap();
        assert_eq!(decoded.args::<VarSet>().unwrap().value, json!("hi"));
    }

    proptest! {
        #[test]
        fn decode_never_panics(text in ".{0,64}") {
            let _ = Envelope::decode(&text);
        }
    }
}
