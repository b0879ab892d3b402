//! Variant command types.
//!
//! A variant study is a parent study plus an ordered list of commands. The
//! server regenerates a variant by replaying its commands in list order and
//! streams one [`CommandResult`] per command as it goes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of applying one command during a variant generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    /// Study being generated.
    pub study_id: String,
    /// Command the result belongs to.
    pub id: String,
    /// Whether the command applied cleanly.
    pub success: bool,
    /// Server message.
    #[serde(default)]
    pub message: String,
}

/// One command of a variant study.
///
/// `updated` and `result` are client-side state: `updated` marks local edits
/// not yet saved, `result` is attached out-of-band by generation events.
/// Neither is sent to the server.
///
/// # Examples
///
/// ```
/// use studyhub::CommandRecord;
///
/// let cmd = CommandRecord::new("c1", "create_area", serde_json::json!({"area_name": "north"}));
/// assert!(!cmd.updated);
/// assert!(cmd.result.is_none());
///
/// let wire = serde_json::to_value(&cmd).unwrap();
/// assert!(wire.get("updated").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    /// Identity of the command.
    pub id: String,
    /// Command name (e.g. `create_area`).
    pub action: String,
    /// Command arguments, opaque to the client.
    #[serde(default)]
    pub args: Value,
    /// Command format version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    /// Local dirty flag.
    #[serde(skip)]
    pub updated: bool,
    /// Latest generation result for this command.
    #[serde(skip)]
    pub result: Option<CommandResult>,
}

impl CommandRecord {
    /// Creates a clean command with no result.
    pub fn new(id: impl Into<String>, action: impl Into<String>, args: Value) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            args,
            version: None,
            updated: false,
            result: None,
        }
    }

    /// Returns `true` once a generation result is attached.
    pub fn has_result(&self) -> bool {
        self.result.is_some()
    }
}

/// Body for appending commands (`POST /studies/{id}/commands`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCommand {
    /// Command name.
    pub action: String,
    /// Command arguments.
    pub args: Value,
}

impl From<&CommandRecord> for NewCommand {
    fn from(cmd: &CommandRecord) -> Self {
        Self {
            action: cmd.action.clone(),
            args: cmd.args.clone(),
        }
    }
}
