//! Push channel frames.
//!
//! Server-to-client frames are `{"type": ..., "payload": ...}` and decode into
//! the [`ChannelEvent`] tagged union; adding a new event type is a new variant
//! and every `match` over it is checked by the compiler. Client-to-server
//! frames are [`ControlFrame`]s that subscribe or unsubscribe a
//! [`ChannelKey`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::command::CommandResult;
use crate::types::job::{JobRecord, JobStatus};
use crate::types::task::TaskEventPayload;

/// Name of a multiplexed channel on the push connection.
///
/// Keys are `PREFIX/identity`. The constructors cover the namespaces the
/// backend publishes on.
///
/// # Examples
///
/// ```
/// use studyhub::ChannelKey;
///
/// assert_eq!(ChannelKey::task("t-1").as_str(), "TASK/t-1");
/// assert_eq!(ChannelKey::study_generation("s-9").to_string(), "STUDY_GENERATION/s-9");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelKey(String);

impl ChannelKey {
    /// Status updates for one job.
    pub fn job_status(job_id: &str) -> Self {
        Self(format!("JOB_STATUS/{job_id}"))
    }

    /// Log lines for one job.
    pub fn job_logs(job_id: &str) -> Self {
        Self(format!("JOB_LOGS/{job_id}"))
    }

    /// Lifecycle events for one task.
    pub fn task(task_id: &str) -> Self {
        Self(format!("TASK/{task_id}"))
    }

    /// Command results streamed while a variant study is generated.
    pub fn study_generation(study_id: &str) -> Self {
        Self(format!("STUDY_GENERATION/{study_id}"))
    }

    /// The raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelKey {
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

impl From<String> for ChannelKey {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Control actions the client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlAction {
    /// Start receiving events for a key.
    Subscribe,
    /// Stop receiving events for a key.
    Unsubscribe,
}

/// Client-to-server frame.
///
/// # Examples
///
/// ```
/// use studyhub::{ChannelKey, ControlFrame};
///
/// let frame = ControlFrame::subscribe(ChannelKey::task("t1"));
/// assert_eq!(
///     frame.encode().unwrap(),
///     r#"{"action":"SUBSCRIBE","payload":"TASK/t1"}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFrame {
    /// What to do.
    pub action: ControlAction,
    /// Channel key.
    pub payload: ChannelKey,
}

impl ControlFrame {
    /// A `SUBSCRIBE` frame.
    pub fn subscribe(key: ChannelKey) -> Self {
        Self {
            action: ControlAction::Subscribe,
            payload: key,
        }
    }

    /// An `UNSUBSCRIBE` frame.
    pub fn unsubscribe(key: ChannelKey) -> Self {
        Self {
            action: ControlAction::Unsubscribe,
            payload: key,
        }
    }

    /// Serializes the frame to its JSON text form.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Minimal study reference carried by study events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyRef {
    /// Study identity.
    pub id: String,
    /// Display name, when sent.
    #[serde(default)]
    pub name: Option<String>,
}

/// Payload of `STUDY_JOB_LOG_UPDATE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobLogPayload {
    /// Job the log line belongs to.
    pub job_id: String,
    /// Appended log text.
    pub log: String,
    /// `"STDOUT"` or `"STDERR"`.
    #[serde(default)]
    pub log_type: Option<String>,
}

/// Server-to-client event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelEvent {
    /// A study was created.
    StudyCreated(StudyRef),
    /// A study's metadata changed.
    StudyEdited(StudyRef),
    /// A study was deleted.
    StudyDeleted(StudyRef),
    /// A job was accepted by the launcher.
    StudyJobStarted(JobRecord),
    /// A job changed status.
    StudyJobStatusUpdate(JobRecord),
    /// A job finished.
    StudyJobCompleted(JobRecord),
    /// New log output for a job.
    StudyJobLogUpdate(JobLogPayload),
    /// One command was applied during variant generation.
    StudyVariantGenerationCommandResult(CommandResult),
    /// A task was queued.
    TaskAdded(TaskEventPayload),
    /// A task started.
    TaskRunning(TaskEventPayload),
    /// A task finished with success.
    TaskCompleted(TaskEventPayload),
    /// A task finished with an error.
    TaskFailed(TaskEventPayload),
    /// A task was cancelled.
    TaskCancelled(TaskEventPayload),
    /// Maintenance mode was toggled.
    MaintenanceMode(bool),
    /// Broadcast information message.
    MessageInfo(String),
}

impl ChannelEvent {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for malformed JSON or an unknown `type`.
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::protocol(format!("undecodable frame: {e}")))
    }

    /// The wire name of this event's type.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StudyCreated(_) => "STUDY_CREATED",
            Self::StudyEdited(_) => "STUDY_EDITED",
            Self::StudyDeleted(_) => "STUDY_DELETED",
            Self::StudyJobStarted(_) => "STUDY_JOB_STARTED",
            Self::StudyJobStatusUpdate(_) => "STUDY_JOB_STATUS_UPDATE",
            Self::StudyJobCompleted(_) => "STUDY_JOB_COMPLETED",
            Self::StudyJobLogUpdate(_) => "STUDY_JOB_LOG_UPDATE",
            Self::StudyVariantGenerationCommandResult(_) => {
                "STUDY_VARIANT_GENERATION_COMMAND_RESULT"
            },
            Self::TaskAdded(_) => "TASK_ADDED",
            Self::TaskRunning(_) => "TASK_RUNNING",
            Self::TaskCompleted(_) => "TASK_COMPLETED",
            Self::TaskFailed(_) => "TASK_FAILED",
            Self::TaskCancelled(_) => "TASK_CANCELLED",
            Self::MaintenanceMode(_) => "MAINTENANCE_MODE",
            Self::MessageInfo(_) => "MESSAGE_INFO",
        }
    }

    /// The job/task observation carried by this event, if any.
    ///
    /// Task events are mapped to the status they announce; cancellation
    /// maps to [`JobStatus::Failed`].
    pub fn record(&self) -> Option<JobRecord> {
        match self {
            Self::StudyJobStarted(job)
            | Self::StudyJobStatusUpdate(job)
            | Self::StudyJobCompleted(job) => Some(job.clone()),
            Self::TaskAdded(task) => Some(task.to_record(JobStatus::Pending)),
            Self::TaskRunning(task) => Some(task.to_record(JobStatus::Running)),
            Self::TaskCompleted(task) => Some(task.to_record(JobStatus::Completed)),
            Self::TaskFailed(task) | Self::TaskCancelled(task) => {
                Some(task.to_record(JobStatus::Failed))
            },
            Self::StudyCreated(_)
            | Self::StudyEdited(_)
            | Self::StudyDeleted(_)
            | Self::StudyJobLogUpdate(_)
            | Self::StudyVariantGenerationCommandResult(_)
            | Self::MaintenanceMode(_)
            | Self::MessageInfo(_) => None,
        }
    }
}
