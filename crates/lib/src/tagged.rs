//! Operations stamped with their position in a history.
//!
//! A [`TaggedOperation`] is what an editor sends: the operation, the history
//! id it was based on and a token that identifies the edit across the wire.
//! A [`TaggedUserOperation`] is what a history stores and broadcasts; it
//! additionally records the user who made the edit and the tokens of any
//! edits that were merged into it on the way.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::ot::Operation;

/// An operation together with the history id it is based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedOperation {
    pub history_id: u64,
    pub token: String,
    pub operation: Operation,
}

impl TaggedOperation {
    pub fn new(history_id: u64, token: impl Into<String>, operation: Operation) -> Self {
        Self {
            history_id,
            token: token.into(),
            operation,
        }
    }

    /// A copy of this operation stamped with another history id.
    pub fn with_history_id(&self, history_id: u64) -> Self {
        Self {
            history_id,
            ..self.clone()
        }
    }
}

/// A stored operation with the user it originated from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedUserOperation {
    #[serde(flatten)]
    pub tagged: TaggedOperation,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub merged_ids: Option<Vec<String>>,
}

impl TaggedUserOperation {
    pub fn new(
        history_id: u64,
        token: impl Into<String>,
        operation: Operation,
        user: Option<String>,
    ) -> Self {
        Self {
            tagged: TaggedOperation::new(history_id, token, operation),
            user,
            merged_ids: None,
        }
    }

    pub fn with_merged_ids(mut self, merged_ids: Vec<String>) -> Self {
        self.merged_ids = Some(merged_ids);
        self
    }

    pub fn history_id(&self) -> u64 {
        self.tagged.history_id
    }

    pub fn token(&self) -> &str {
        &self.tagged.token
    }

    pub fn operation(&self) -> &Operation {
        &self.tagged.operation
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// True if `token` is this operation's token or one of its merged aliases.
    pub fn includes(&self, token: &str) -> bool {
        self.tagged.token == token
            || self
                .merged_ids
                .as_ref()
                .is_some_and(|ids| ids.iter().any(|id| id == token))
    }

    /// A copy stamped with another history id.
    pub fn with_history_id(&self, history_id: u64) -> Self {
        Self {
            tagged: self.tagged.with_history_id(history_id),
            ..self.clone()
        }
    }

    /// The same operation with `operation` replaced, keeping id, token and user.
    pub fn with_operation(&self, operation: Operation) -> Self {
        Self {
            tagged: TaggedOperation {
                operation,
                ..self.tagged.clone()
            },
            ..self.clone()
        }
    }
}

impl From<TaggedOperation> for TaggedUserOperation {
    fn from(tagged: TaggedOperation) -> Self {
        Self {
            tagged,
            user: None,
            merged_ids: None,
        }
    }
}

/// Encode a tagged user operation as JSON.
pub fn to_json(op: &TaggedUserOperation) -> Result<String> {
    Ok(serde_json::to_string(op)?)
}

/// Decode a tagged user operation from JSON.
pub fn from_json(json: &str) -> Result<TaggedUserOperation> {
    Ok(serde_json::from_str(json)?)
}
