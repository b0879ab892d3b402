//! Job and task record types shared by every tracked feature area.
//!
//! A [`JobRecord`] is the in-memory view of one asynchronous unit of work on
//! the server: a simulation job launched for a study, or a background task
//! such as a variant generation. Records are identified by `id` and move
//! forward through [`JobStatus`].
//!
//! # Serialization
//!
//! Field names follow the backend's snake_case wire shape (`study_id`,
//! `creation_date`, `completion_date`, `msg`). Every field except `id` and
//! `status` is optional on the wire so partial push payloads decode cleanly.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Lifecycle status of a job or task.
///
/// Statuses are totally ordered by [`rank`](JobStatus::rank):
///
/// ```text
/// Pending (0) -> Running (1) -> Completed | Failed (2, terminal)
/// ```
///
/// A record may only move to a status of strictly higher rank, or stay on
/// the same status. Moving between the two terminal statuses is rejected:
/// the first terminal observation wins.
///
/// # Examples
///
/// ```
/// use studyhub::JobStatus;
///
/// assert!(JobStatus::Running.can_advance_to(JobStatus::Completed));
/// assert!(JobStatus::Completed.can_advance_to(JobStatus::Completed));
/// assert!(!JobStatus::Completed.can_advance_to(JobStatus::Running));
/// assert!(!JobStatus::Failed.can_advance_to(JobStatus::Completed));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted by the server, not started yet.
    Pending,
    /// Currently executing.
    Running,
    /// Finished successfully (terminal).
    #[serde(alias = "success")]
    Completed,
    /// Finished with an error (terminal).
    Failed,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl JobStatus {
    /// Position of this status in the forward-only order.
    pub fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Completed | Self::Failed => 2,
        }
    }

    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns `true` if a record in this status may take `next`.
    ///
    /// Same-status updates are accepted so that duplicate events stay
    /// idempotent.
    pub fn can_advance_to(self, next: Self) -> bool {
        self == next || next.rank() > self.rank()
    }

    /// Validates a move to `next` for the record identified by `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] when `next` would move the record
    /// backwards or from one terminal status to the other.
    pub fn validate_advance(self, id: &str, next: Self) -> Result<()> {
        if self.can_advance_to(next) {
            Ok(())
        } else {
            Err(Error::InvalidTransition {
                id: id.to_string(),
                from: self,
                to: next,
            })
        }
    }
}

/// One job or task as known to the client.
///
/// # Examples
///
/// ```
/// use studyhub::{JobRecord, JobStatus};
///
/// let record: JobRecord = serde_json::from_value(serde_json::json!({
///     "id": "job-1",
///     "study_id": "study-9",
///     "status": "success",
///     "creation_date": "2024-03-01T10:00:00",
///     "completion_date": "2024-03-01T10:05:00"
/// })).unwrap();
///
/// assert_eq!(record.status, JobStatus::Completed);
/// assert_eq!(record.subject_id, "study-9");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Identity of the record.
    pub id: String,

    /// The subject this record belongs to (usually a study id).
    #[serde(rename = "study_id", alias = "ref_id", default)]
    pub subject_id: String,

    /// Latest known status.
    pub status: JobStatus,

    /// When the server created the job (ISO 8601).
    #[serde(rename = "creation_date", default, skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<String>,

    /// When the job reached a terminal status (ISO 8601).
    #[serde(rename = "completion_date", default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<String>,

    /// Human-readable status message.
    #[serde(rename = "msg", alias = "message", default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Opaque result attached by the server on completion.
    #[serde(rename = "result", default, skip_serializing_if = "Option::is_none")]
    pub result_payload: Option<Value>,
}

impl JobRecord {
    /// Creates a record with only identity, subject, and status set.
    pub fn new(id: impl Into<String>, subject_id: impl Into<String>, status: JobStatus) -> Self {
        Self {
            id: id.into(),
            subject_id: subject_id.into(),
            status,
            creation_time: None,
            completion_time: None,
            message: None,
            result_payload: None,
        }
    }

    /// Sets the creation timestamp.
    pub fn with_creation_time(mut self, at: impl Into<String>) -> Self {
        self.creation_time = Some(at.into());
        self
    }

    /// Sets the completion timestamp.
    pub fn with_completion_time(mut self, at: impl Into<String>) -> Self {
        self.completion_time = Some(at.into());
        self
    }

    /// Sets the status message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the result payload.
    pub fn with_result(mut self, result: Value) -> Self {
        self.result_payload = Some(result);
        self
    }

    /// Returns `true` once the record reached a terminal status.
    pub fn is_final(&self) -> bool {
        self.status.is_terminal()
    }

    /// Parsed creation time, if present and well formed.
    pub fn created_at(&self) -> Option<NaiveDateTime> {
        self.creation_time.as_deref().and_then(parse_timestamp)
    }

    /// Parsed completion time, if present and well formed.
    pub fn completed_at(&self) -> Option<NaiveDateTime> {
        self.completion_time.as_deref().and_then(parse_timestamp)
    }

    /// Completion time, or creation time for unfinished records.
    pub fn last_activity(&self) -> Option<NaiveDateTime> {
        self.completed_at().or_else(|| self.created_at())
    }
}

/// Parses backend timestamps.
///
/// Accepts RFC 3339 (converted to UTC) and the naive ISO 8601 form the
/// backend emits for job dates, with or without fractional seconds.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

/// Most-recent-first comparison used for display order.
///
/// Records are keyed by their latest known activity: the completion time
/// when present, the creation time otherwise. Ties fall back to the newer
/// creation time, then to the id, so the order is total. Records without
/// any usable timestamp sort last.
pub fn most_recent_first(a: &JobRecord, b: &JobRecord) -> Ordering {
    newest_first(a.last_activity(), b.last_activity())
        .then_with(|| newest_first(a.created_at(), b.created_at()))
        .then_with(|| a.id.cmp(&b.id))
}

fn newest_first(a: Option<NaiveDateTime>, b: Option<NaiveDateTime>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
