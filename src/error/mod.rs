//! Error types for every layer of the sync engine.

use thiserror::Error;

/// Route template errors, raised when a view is registered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("Route template '{0}' must start with '/'")]
    NotAbsolute(String),

    #[error("Route template '{template}' has an empty parameter name")]
    EmptyParam { template: String },

    #[error("Route template '{template}' declares parameter '{name}' more than once")]
    DuplicateParam { template: String, name: String },

    #[error("Route template '{template}' failed to compile: {message}")]
    Compile { template: String, message: String },
}

/// Errors raised while replaying a patch onto a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("Invalid pointer '{0}'")]
    InvalidPointer(String),

    #[error("Path '{0}' does not exist")]
    MissingPath(String),

    #[error("Invalid array index '{index}' at '{path}'")]
    BadIndex { index: String, path: String },

    #[error("Cannot descend into a scalar at '{0}'")]
    NotContainer(String),

    #[error("Malformed patch: {0}")]
    Malformed(String),
}

impl PatchError {
    pub fn bad_index(index: impl Into<String>, path: impl Into<String>) -> Self {
        Self::BadIndex {
            index: index.into(),
            path: path.into(),
        }
    }
}

/// A frame that does not decode into a known message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    #[error("Event '{0}' requires a request id")]
    MissingId(String),

    #[error("Invalid payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Invalid patch: {0}")]
    Patch(#[from] PatchError),
}

/// A view function failed to produce a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("View failed: {message}")]
pub struct ViewError {
    pub message: String,
}

impl ViewError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An action handler failed. Only the message ever crosses the wire.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn unknown(action: &str) -> Self {
        Self::new(format!("unknown action: {}", action))
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Reasons a subscription cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscribeError {
    #[error("No route matches '{0}'")]
    NoRoute(String),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error("Server is shutting down")]
    Closed,
}

/// Connection-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("Connection closed")]
    Closed,
}

/// Errors surfaced to client callers.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The remote handler failed; carries its message verbatim.
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Not connected")]
    Disconnected,

    #[error("Already connected")]
    AlreadyConnected,
}

impl ClientError {
    /// The handler's failure message, when the error came from the server.
    pub fn action_message(&self) -> Option<&str> {
        match self {
            Self::Action(err) => Some(&err.message),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_displays_message_only() {
        let err = ActionError::new("what!?");
        assert_eq!(err.to_string(), "what!?");
        assert_eq!(
            ClientError::from(err).action_message(),
            Some("what!?")
        );
    }

    #[test]
    fn test_unknown_action_message() {
        assert_eq!(ActionError::unknown("nope").message, "unknown action: nope");
    }
}
