//! The client's copy of a channel's state.

use serde_json::Value;

use crate::diff;
use crate::error::PatchError;
use crate::protocol::{ChangePayload, InitPayload};

/// Snapshot and action names as last announced by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientReplica {
    state: Option<Value>,
    actions: Vec<String>,
}

impl ClientReplica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> Option<&Value> {
        self.state.as_ref()
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    /// Install the handshake snapshot, discarding anything held before.
    pub fn apply_init(&mut self, init: InitPayload) -> &Value {
        self.actions = init.actions;
        &*self.state.insert(init.state)
    }

    /// Apply an update. A full value replaces the snapshot; a patch is
    /// replayed onto it. On error the snapshot is left as it was.
    pub fn apply_change(&mut self, change: ChangePayload) -> Result<&Value, PatchError> {
        let next = match change {
            ChangePayload::Value(value) => value,
            ChangePayload::Patch(patch) => match (&self.state, patch.as_full_replacement()) {
                (_, Some(value)) => value.clone(),
                (Some(current), None) => diff::apply(current, &patch)?,
                (None, None) => {
                    return Err(PatchError::Malformed(
                        "patch received before initial state".to_string(),
                    ))
                }
            },
        };
        Ok(&*self.state.insert(next))
    }

    pub fn reset(&mut self) {
        self.state = None;
        self.actions.clear();
    }
}
