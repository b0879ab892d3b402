//! Background task wire types.
//!
//! The backend reports tasks (variant generation, copies, exports) with an
//! integer status code and a nested result object. [`TaskDto`] mirrors that
//! shape and converts into the shared [`JobRecord`] so the same
//! reconciliation logic applies to jobs and tasks alike.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;
use crate::types::job::{JobRecord, JobStatus};

/// Integer task status as sent by the backend.
///
/// `Timeout` and `Cancelled` collapse into [`JobStatus::Failed`] when
/// converted: from the client's point of view the task ended without a
/// result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskStatus {
    /// Queued.
    Pending,
    /// Executing.
    Running,
    /// Finished with success.
    Completed,
    /// Finished with an error.
    Failed,
    /// Exceeded its time budget.
    Timeout,
    /// Cancelled by a user.
    Cancelled,
}

impl TryFrom<u8> for TaskStatus {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Pending),
            2 => Ok(Self::Running),
            3 => Ok(Self::Completed),
            4 => Ok(Self::Failed),
            5 => Ok(Self::Timeout),
            6 => Ok(Self::Cancelled),
            other => Err(Error::protocol(format!("unknown task status code {other}"))),
        }
    }
}

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => 1,
            TaskStatus::Running => 2,
            TaskStatus::Completed => 3,
            TaskStatus::Failed => 4,
            TaskStatus::Timeout => 5,
            TaskStatus::Cancelled => 6,
        }
    }
}

impl From<TaskStatus> for JobStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => Self::Pending,
            TaskStatus::Running => Self::Running,
            TaskStatus::Completed => Self::Completed,
            TaskStatus::Failed | TaskStatus::Timeout | TaskStatus::Cancelled => Self::Failed,
        }
    }
}

/// Outcome attached to a finished task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Whether the task succeeded.
    pub success: bool,
    /// Server message.
    #[serde(default)]
    pub message: String,
    /// Optional return value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
}

/// A task as returned by `GET /tasks/{id}` and `POST /tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDto {
    /// Task identity.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Status code.
    pub status: TaskStatus,
    /// Creation time (UTC, ISO 8601).
    #[serde(default)]
    pub creation_date_utc: Option<String>,
    /// Completion time (UTC, ISO 8601).
    #[serde(default)]
    pub completion_date_utc: Option<String>,
    /// Outcome, once finished.
    #[serde(default)]
    pub result: Option<TaskResult>,
    /// Related entity (usually a study id).
    #[serde(default)]
    pub ref_id: Option<String>,
    /// Task category.
    #[serde(rename = "type", default)]
    pub task_type: Option<TaskType>,
}

impl From<TaskDto> for JobRecord {
    fn from(task: TaskDto) -> Self {
        let mut record = JobRecord::new(
            task.id,
            task.ref_id.unwrap_or_default(),
            task.status.into(),
        );
        record.creation_time = task.creation_date_utc;
        record.completion_time = task.completion_date_utc;
        if let Some(result) = task.result {
            record.message = Some(result.message);
            record.result_payload = result.return_value;
        }
        record
    }
}

/// Task categories the backend emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Study export.
    Export,
    /// Variant generation.
    VariantGeneration,
    /// Study copy.
    Copy,
    /// Archive.
    Archive,
    /// Unarchive.
    Unarchive,
    /// Scan of managed folders.
    Scan,
    /// Version upgrade.
    UpgradeStudy,
    /// Thermal clusters time series generation.
    ThermalClusterSeriesGeneration,
    /// Snapshot cleanup.
    SnapshotClearing,
}

/// Payload of `TASK_*` push events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEventPayload {
    /// Task identity.
    pub id: String,
    /// Progress or outcome message.
    #[serde(default)]
    pub message: String,
    /// Task category.
    #[serde(rename = "type", default)]
    pub task_type: Option<TaskType>,
    /// Study the task belongs to, when applicable.
    #[serde(default)]
    pub study_id: Option<String>,
}

impl TaskEventPayload {
    /// Builds the record observation this event stands for.
    pub fn to_record(&self, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::new(
            self.id.clone(),
            self.study_id.clone().unwrap_or_default(),
            status,
        );
        if !self.message.is_empty() {
            record.message = Some(self.message.clone());
        }
        record
    }
}

/// Filter body for `POST /tasks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskListFilter {
    /// Restrict to these statuses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<TaskStatus>,
    /// Restrict to tasks bound to this entity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    /// Restrict to these categories.
    #[serde(rename = "type", default, skip_serializing_if = "Vec::is_empty")]
    pub task_type: Vec<TaskType>,
}
