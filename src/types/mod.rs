//! Wire and domain types.
//!
//! - [`job`] - job/task records and the forward-only status order
//! - [`task`] - backend task DTOs and task event payloads
//! - [`command`] - variant commands and generation results
//! - [`event`] - push channel frames and channel keys
//! - [`study`] - study metadata and launcher bodies

pub mod command;
pub mod event;
pub mod job;
pub mod study;
pub mod task;

pub use command::{CommandRecord, CommandResult, NewCommand};
pub use event::{ChannelEvent, ChannelKey, ControlAction, ControlFrame, JobLogPayload, StudyRef};
pub use job::{JobRecord, JobStatus};
pub use study::{
    LaunchOptions, LaunchResponse, MaintenanceStatus, StudyMetadata, StudyMetadataPatch,
    StudyOwner,
};
pub use task::{TaskDto, TaskEventPayload, TaskListFilter, TaskResult, TaskStatus, TaskType};
