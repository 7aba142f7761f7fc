//! Wire messages.
//!
//! Every message is one JSON text frame `{"event", "id"?, "data"}`. Event
//! names are part of the contract: `init`, `change`, `a-<action>`, `ack` and
//! `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diff::Patch;
use crate::error::{ActionError, ProtocolError};

pub const INIT_EVENT: &str = "init";
pub const CHANGE_EVENT: &str = "change";
pub const ACK_EVENT: &str = "ack";
pub const ERROR_EVENT: &str = "error";
pub const ACTION_PREFIX: &str = "a-";

/// The envelope every message travels in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default)]
    pub data: Value,
}

impl Frame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            id: None,
            data,
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Handshake sent once per connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitPayload {
    pub state: Value,
    pub actions: Vec<String>,
}

/// Body of a `change` message.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangePayload {
    Patch(Patch),
    Value(Value),
}

impl ChangePayload {
    /// Root replacements carrying a scalar go out as the bare value; every
    /// other patch goes out as its op list.
    pub fn from_patch(patch: Patch) -> Self {
        match patch.as_full_replacement() {
            Some(value) if !value.is_array() && !value.is_object() => Self::Value(value.clone()),
            _ => Self::Patch(patch),
        }
    }

    /// A JSON array is a patch; anything else is a full snapshot.
    pub fn from_value(data: Value) -> Result<Self, ProtocolError> {
        if data.is_array() {
            Ok(Self::Patch(serde_json::from_value(data)?))
        } else {
            Ok(Self::Value(data))
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::Patch(patch) => serde_json::to_value(patch),
            Self::Value(value) => Ok(value.clone()),
        }
    }
}

/// Outcome of one action request, the value form of `ack(error, result)`.
#[derive(Debug, Clone, PartialEq)]
pub enum AckResult {
    Success(Value),
    Failure(String),
}

#[derive(Debug, Deserialize)]
struct AckPayload {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: Value,
}

impl AckResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn into_result(self) -> Result<Value, ActionError> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(message) => Err(ActionError::new(message)),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Self::Success(result) => serde_json::json!({ "error": null, "result": result }),
            Self::Failure(message) => serde_json::json!({ "error": message, "result": null }),
        }
    }

    fn from_value(data: Value) -> Result<Self, ProtocolError> {
        let payload: AckPayload = serde_json::from_value(data)?;
        Ok(match payload.error {
            Some(message) => Self::Failure(message),
            None => Self::Success(payload.result),
        })
    }
}

impl From<Result<Value, ActionError>> for AckResult {
    fn from(result: Result<Value, ActionError>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(err) => Self::Failure(err.message),
        }
    }
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Init(InitPayload),
    Change(ChangePayload),
    Ack { id: u64, result: AckResult },
    Error { message: String },
}

impl ServerMessage {
    pub fn into_frame(self) -> Result<Frame, serde_json::Error> {
        Ok(match self {
            Self::Init(payload) => Frame::new(INIT_EVENT, serde_json::to_value(payload)?),
            Self::Change(payload) => Frame::new(CHANGE_EVENT, payload.to_value()?),
            Self::Ack { id, result } => Frame::new(ACK_EVENT, result.to_value()).with_id(id),
            Self::Error { message } => {
                Frame::new(ERROR_EVENT, serde_json::json!({ "message": message }))
            }
        })
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        match frame.event.as_str() {
            INIT_EVENT => Ok(Self::Init(serde_json::from_value(frame.data)?)),
            CHANGE_EVENT => Ok(Self::Change(ChangePayload::from_value(frame.data)?)),
            ACK_EVENT => {
                let id = frame.id.ok_or_else(|| ProtocolError::MissingId(frame.event.clone()))?;
                Ok(Self::Ack {
                    id,
                    result: AckResult::from_value(frame.data)?,
                })
            }
            ERROR_EVENT => {
                let message = frame
                    .data
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(Self::Error { message })
            }
            _ => Err(ProtocolError::UnknownEvent(frame.event)),
        }
    }
}

/// Messages a client sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Action { id: u64, name: String, params: Value },
}

impl ClientMessage {
    pub fn into_frame(self) -> Frame {
        match self {
            Self::Action { id, name, params } => {
                Frame::new(format!("{}{}", ACTION_PREFIX, name), params).with_id(id)
            }
        }
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        let Some(name) = frame.event.strip_prefix(ACTION_PREFIX) else {
            return Err(ProtocolError::UnknownEvent(frame.event));
        };
        let id = frame
            .id
            .ok_or_else(|| ProtocolError::MissingId(frame.event.clone()))?;
        Ok(Self::Action {
            id,
            name: name.to_string(),
            params: frame.data,
        })
    }
}
