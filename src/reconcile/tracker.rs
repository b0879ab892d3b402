//! Per-feature reconciled views.
//!
//! Each tracker owns the list for one feature area and feeds push events
//! and poll results through [`merge`](super::merge::merge):
//!
//! - [`JobTracker`]: job history of one study
//! - [`CommandTracker`]: commands of one variant study plus its generation
//! - [`TaskNotifications`]: in-flight background tasks and an unread counter
//!
//! Trackers are plain values. They are fed from a channel listener or a
//! poll callback and read by whatever renders them.

use crate::error::Result;
use crate::reconcile::active::compute_active_index;
use crate::reconcile::merge::{merge, sort_most_recent_first, Placement};
use crate::types::command::{CommandRecord, CommandResult};
use crate::types::event::ChannelEvent;
use crate::types::job::JobRecord;
use crate::types::task::TaskType;

/// Job history for one study.
///
/// # Examples
///
/// ```
/// use studyhub::reconcile::JobTracker;
/// use studyhub::{ChannelEvent, JobRecord, JobStatus};
///
/// let mut jobs = JobTracker::new("study-1");
/// jobs.load(vec![JobRecord::new("a", "study-1", JobStatus::Running)]);
///
/// let done = JobRecord::new("a", "study-1", JobStatus::Completed);
/// assert!(jobs.apply_event(&ChannelEvent::StudyJobCompleted(done)));
///
/// let foreign = JobRecord::new("z", "study-2", JobStatus::Running);
/// assert!(!jobs.apply_event(&ChannelEvent::StudyJobStarted(foreign)));
/// assert_eq!(jobs.records().len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct JobTracker {
    subject_id: String,
    records: Vec<JobRecord>,
}

impl JobTracker {
    /// Creates an empty tracker for `subject_id`.
    pub fn new(subject_id: impl Into<String>) -> Self {
        Self {
            subject_id: subject_id.into(),
            records: Vec::new(),
        }
    }

    /// The study this tracker follows.
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Replaces the list with a fresh fetch.
    ///
    /// Records for other subjects are dropped and duplicate ids collapse.
    pub fn load(&mut self, fetched: Vec<JobRecord>) {
        let own = fetched
            .into_iter()
            .filter(|r| r.subject_id == self.subject_id);
        self.records = merge(&[], own, Placement::Append);
    }

    /// Loads the outcome of a list fetch.
    ///
    /// # Errors
    ///
    /// On a failed fetch the list is left empty and the error is returned
    /// for the caller to report.
    pub fn load_result(&mut self, fetched: Result<Vec<JobRecord>>) -> Result<()> {
        match fetched {
            Ok(list) => {
                self.load(list);
                Ok(())
            },
            Err(err) => {
                self.records.clear();
                Err(err)
            },
        }
    }

    fn belongs(&self, record: &JobRecord) -> bool {
        record.subject_id == self.subject_id
            || (record.subject_id.is_empty() && self.get(&record.id).is_some())
    }

    /// Applies one push event. Returns `true` if the list changed.
    ///
    /// Only job events are considered; events for other studies are ignored.
    pub fn apply_event(&mut self, event: &ChannelEvent) -> bool {
        let placement = match event {
            ChannelEvent::StudyJobStarted(_) => Placement::Prepend,
            ChannelEvent::StudyJobStatusUpdate(_) | ChannelEvent::StudyJobCompleted(_) => {
                Placement::Append
            },
            _ => return false,
        };
        let Some(record) = event.record() else {
            return false;
        };
        if !self.belongs(&record) {
            return false;
        }
        self.replace(merge(&self.records, [record], placement))
    }

    /// Applies poll results. Returns `true` if the list changed.
    pub fn apply_poll(&mut self, records: impl IntoIterator<Item = JobRecord>) -> bool {
        let own: Vec<JobRecord> = records.into_iter().filter(|r| self.belongs(r)).collect();
        if own.is_empty() {
            return false;
        }
        self.replace(merge(&self.records, own, Placement::Append))
    }

    fn replace(&mut self, next: Vec<JobRecord>) -> bool {
        if next == self.records {
            return false;
        }
        self.records = next;
        true
    }

    /// Records in reconciliation order.
    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    /// Records most-recent-first.
    pub fn sorted(&self) -> Vec<JobRecord> {
        let mut out = self.records.clone();
        sort_most_recent_first(&mut out);
        out
    }

    /// Looks a record up by id.
    pub fn get(&self, id: &str) -> Option<&JobRecord> {
        self.records.iter().find(|r| r.id == id)
    }

    /// Ids of records that have not reached a terminal status.
    pub fn pending_ids(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| !r.is_final())
            .map(|r| r.id.clone())
            .collect()
    }
}

/// Commands of one variant study and the state of its generation.
#[derive(Debug, Clone)]
pub struct CommandTracker {
    study_id: String,
    commands: Vec<CommandRecord>,
    generation: Option<JobRecord>,
}

impl CommandTracker {
    /// Creates an empty tracker for the variant `study_id`.
    pub fn new(study_id: impl Into<String>) -> Self {
        Self {
            study_id: study_id.into(),
            commands: Vec::new(),
            generation: None,
        }
    }

    /// The variant study this tracker follows.
    pub fn study_id(&self) -> &str {
        &self.study_id
    }

    /// Replaces the list with a fresh fetch, in server order.
    ///
    /// Results already attached to surviving commands are kept; dirty flags
    /// are cleared.
    pub fn load(&mut self, fetched: Vec<CommandRecord>) {
        let merged = merge(&self.commands, fetched.iter().cloned(), Placement::Append);
        self.commands = fetched
            .iter()
            .filter_map(|f| merged.iter().find(|m| m.id == f.id).cloned())
            .collect();
    }

    /// Commands in list order.
    pub fn commands(&self) -> &[CommandRecord] {
        &self.commands
    }

    /// The generation task being tracked, if any.
    pub fn generation(&self) -> Option<&JobRecord> {
        self.generation.as_ref()
    }

    /// Starts tracking a generation task, discarding results of any
    /// previous generation.
    pub fn track_generation(&mut self, task: JobRecord) {
        let is_new = self.generation.as_ref().map(|g| g.id.as_str()) != Some(task.id.as_str());
        if is_new {
            for cmd in &mut self.commands {
                cmd.result = None;
            }
            self.generation = Some(task);
        } else if let Some(current) = &self.generation {
            self.generation = merge(std::slice::from_ref(current), [task], Placement::Append)
                .into_iter()
                .next();
        }
    }

    /// Returns `true` while a tracked generation has not finished.
    pub fn is_generating(&self) -> bool {
        self.generation.as_ref().is_some_and(|g| !g.is_final())
    }

    /// Index of the command currently being generated.
    pub fn active_index(&self) -> Option<usize> {
        if self.generation.is_none() {
            return None;
        }
        compute_active_index(&self.commands)
    }

    /// Attaches a generation result to its command.
    ///
    /// Returns `false` for results of other studies or unknown commands.
    pub fn attach_result(&mut self, result: &CommandResult) -> bool {
        if result.study_id != self.study_id {
            return false;
        }
        let Some(existing) = self.commands.iter().find(|c| c.id == result.id) else {
            return false;
        };
        let mut observed = existing.clone();
        observed.result = Some(result.clone());
        let next = merge(&self.commands, [observed], Placement::Append);
        if next == self.commands {
            return false;
        }
        self.commands = next;
        true
    }

    /// Applies one push event. Returns `true` if anything changed.
    pub fn apply_event(&mut self, event: &ChannelEvent) -> bool {
        match event {
            ChannelEvent::StudyVariantGenerationCommandResult(result) => {
                self.attach_result(result)
            },
            ChannelEvent::TaskAdded(payload) | ChannelEvent::TaskRunning(payload)
                if payload.task_type == Some(TaskType::VariantGeneration)
                    && payload.study_id.as_deref() == Some(self.study_id.as_str()) =>
            {
                let Some(record) = event.record() else {
                    return false;
                };
                let before = self.generation.clone();
                self.track_generation(record);
                before != self.generation
            },
            ChannelEvent::TaskCompleted(payload)
            | ChannelEvent::TaskFailed(payload)
            | ChannelEvent::TaskCancelled(payload) => {
                let tracked = self.generation.as_ref().is_some_and(|g| g.id == payload.id);
                if !tracked {
                    return false;
                }
                let Some(record) = event.record() else {
                    return false;
                };
                let before = self.generation.clone();
                self.track_generation(record);
                before != self.generation
            },
            _ => false,
        }
    }

    /// Replaces a command's arguments locally and marks it dirty.
    pub fn edit(&mut self, id: &str, args: serde_json::Value) -> bool {
        match self.commands.iter_mut().find(|c| c.id == id) {
            Some(cmd) => {
                cmd.args = args;
                cmd.updated = true;
                true
            },
            None => false,
        }
    }

    /// Clears the dirty flag after a successful save.
    pub fn mark_saved(&mut self, id: &str) {
        if let Some(cmd) = self.commands.iter_mut().find(|c| c.id == id) {
            cmd.updated = false;
        }
    }

    /// Commands with unsaved local edits.
    pub fn dirty(&self) -> impl Iterator<Item = &CommandRecord> {
        self.commands.iter().filter(|c| c.updated)
    }

    /// Appends a command created on the server.
    pub fn push(&mut self, command: CommandRecord) {
        self.commands = merge(&self.commands, [command], Placement::Append);
    }

    /// Removes a command. Returns `false` if it was not present.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.commands.len();
        self.commands.retain(|c| c.id != id);
        before != self.commands.len()
    }

    /// Moves a command to `index`, clamped to the list bounds.
    pub fn move_to(&mut self, id: &str, index: usize) -> bool {
        let Some(from) = self.commands.iter().position(|c| c.id == id) else {
            return false;
        };
        let cmd = self.commands.remove(from);
        let to = index.min(self.commands.len());
        self.commands.insert(to, cmd);
        true
    }
}

/// In-flight background tasks and an unread counter.
///
/// # Examples
///
/// ```
/// use studyhub::reconcile::TaskNotifications;
/// use studyhub::{ChannelEvent, TaskEventPayload};
///
/// let mut tasks = TaskNotifications::new();
/// let added = TaskEventPayload {
///     id: "t1".to_string(),
///     message: "copy".to_string(),
///     task_type: None,
///     study_id: None,
/// };
/// tasks.apply_event(&ChannelEvent::TaskAdded(added.clone()));
/// tasks.apply_event(&ChannelEvent::TaskAdded(added));
/// assert_eq!(tasks.notification_count(), 1);
/// assert_eq!(tasks.tasks().len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TaskNotifications {
    tasks: Vec<JobRecord>,
    notification_count: usize,
}

impl TaskNotifications {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the list with a fresh fetch without touching the counter.
    pub fn load(&mut self, fetched: Vec<JobRecord>) {
        self.tasks = merge(&[], fetched, Placement::Append);
        sort_most_recent_first(&mut self.tasks);
    }

    /// Applies one push event. Returns `true` if the list changed.
    pub fn apply_event(&mut self, event: &ChannelEvent) -> bool {
        let placement = match event {
            ChannelEvent::TaskAdded(_) => Placement::Prepend,
            ChannelEvent::TaskRunning(_)
            | ChannelEvent::TaskCompleted(_)
            | ChannelEvent::TaskFailed(_)
            | ChannelEvent::TaskCancelled(_) => Placement::Append,
            _ => return false,
        };
        let Some(record) = event.record() else {
            return false;
        };
        let unseen = !self.tasks.iter().any(|t| t.id == record.id);
        let next = merge(&self.tasks, [record], placement);
        if next == self.tasks {
            return false;
        }
        self.tasks = next;
        if unseen {
            self.notification_count += 1;
        }
        true
    }

    /// Applies a poll result for one task.
    pub fn apply_poll(&mut self, record: JobRecord) -> bool {
        let next = merge(&self.tasks, [record], Placement::Append);
        if next == self.tasks {
            return false;
        }
        self.tasks = next;
        true
    }

    /// All known tasks.
    pub fn tasks(&self) -> &[JobRecord] {
        &self.tasks
    }

    /// Tasks not yet in a terminal status.
    pub fn in_flight(&self) -> impl Iterator<Item = &JobRecord> {
        self.tasks.iter().filter(|t| !t.is_final())
    }

    /// Number of tasks seen since the last acknowledgement.
    pub fn notification_count(&self) -> usize {
        self.notification_count
    }

    /// Resets the unread counter.
    pub fn acknowledge(&mut self) {
        self.notification_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::job::JobStatus;
    use crate::types::task::TaskEventPayload;

    fn gen_payload(id: &str, study: &str) -> TaskEventPayload {
        TaskEventPayload {
            id: id.to_string(),
            message: String::new(),
            task_type: Some(TaskType::VariantGeneration),
            study_id: Some(study.to_string()),
        }
    }

    fn result(study: &str, id: &str) -> CommandResult {
        CommandResult {
            study_id: study.to_string(),
            id: id.to_string(),
            success: true,
            message: String::new(),
        }
    }

    fn commands() -> Vec<CommandRecord> {
        ["c0", "c1", "c2"]
            .iter()
            .map(|id| CommandRecord::new(*id, "noop", serde_json::Value::Null))
            .collect()
    }

    #[test]
    fn failed_fetch_leaves_list_empty() {
        let mut jobs = JobTracker::new("s");
        jobs.load(vec![JobRecord::new("a", "s", JobStatus::Running)]);
        let err = jobs.load_result(Err(Error::transport(503, "down")));
        assert!(err.is_err());
        assert!(jobs.records().is_empty());
    }

    #[test]
    fn status_update_without_subject_applies_to_known_job() {
        let mut jobs = JobTracker::new("s");
        jobs.load(vec![JobRecord::new("a", "s", JobStatus::Running)]);
        let update = JobRecord::new("a", "", JobStatus::Completed);
        assert!(jobs.apply_event(&ChannelEvent::StudyJobStatusUpdate(update)));
        assert_eq!(jobs.get("a").unwrap().status, JobStatus::Completed);
        assert_eq!(jobs.get("a").unwrap().subject_id, "s");

        let stranger = JobRecord::new("b", "", JobStatus::Running);
        assert!(!jobs.apply_event(&ChannelEvent::StudyJobStatusUpdate(stranger)));
    }

    #[test]
    fn started_job_goes_first() {
        let mut jobs = JobTracker::new("s");
        jobs.load(vec![JobRecord::new("a", "s", JobStatus::Completed)]);
        jobs.apply_event(&ChannelEvent::StudyJobStarted(JobRecord::new(
            "b",
            "s",
            JobStatus::Pending,
        )));
        assert_eq!(jobs.records()[0].id, "b");
        assert_eq!(jobs.pending_ids(), vec!["b".to_string()]);
    }

    #[test]
    fn generation_progress_moves_active_index() {
        let mut tracker = CommandTracker::new("v1");
        tracker.load(commands());
        assert_eq!(tracker.active_index(), None);

        assert!(tracker.apply_event(&ChannelEvent::TaskRunning(gen_payload("g1", "v1"))));
        assert!(tracker.is_generating());
        assert_eq!(tracker.active_index(), Some(0));

        assert!(tracker.apply_event(&ChannelEvent::StudyVariantGenerationCommandResult(
            result("v1", "c0")
        )));
        assert_eq!(tracker.active_index(), Some(1));

        tracker.attach_result(&result("v1", "c1"));
        tracker.attach_result(&result("v1", "c2"));
        assert_eq!(tracker.active_index(), None);

        assert!(tracker.apply_event(&ChannelEvent::TaskCompleted(gen_payload("g1", "v1"))));
        assert!(!tracker.is_generating());
    }

    #[test]
    fn results_for_other_study_are_ignored() {
        let mut tracker = CommandTracker::new("v1");
        tracker.load(commands());
        assert!(!tracker.attach_result(&result("v2", "c0")));
        assert!(!tracker.attach_result(&result("v1", "missing")));
        assert!(tracker.commands().iter().all(|c| c.result.is_none()));
    }

    #[test]
    fn new_generation_clears_previous_results() {
        let mut tracker = CommandTracker::new("v1");
        tracker.load(commands());
        tracker.track_generation(JobRecord::new("g1", "v1", JobStatus::Running));
        tracker.attach_result(&result("v1", "c0"));
        tracker.track_generation(JobRecord::new("g2", "v1", JobStatus::Pending));
        assert!(tracker.commands().iter().all(|c| c.result.is_none()));
    }

    #[test]
    fn reload_keeps_results_and_clears_dirty() {
        let mut tracker = CommandTracker::new("v1");
        tracker.load(commands());
        tracker.track_generation(JobRecord::new("g1", "v1", JobStatus::Running));
        tracker.attach_result(&result("v1", "c0"));
        assert!(tracker.edit("c1", serde_json::json!({"x": 1})));
        assert_eq!(tracker.dirty().count(), 1);

        let mut fetched = commands();
        fetched.swap(1, 2);
        tracker.load(fetched);
        assert_eq!(tracker.dirty().count(), 0);
        assert!(tracker.commands()[0].has_result());
        assert_eq!(tracker.commands()[1].id, "c2");
    }

    #[test]
    fn local_list_operations() {
        let mut tracker = CommandTracker::new("v1");
        tracker.load(commands());
        assert!(tracker.move_to("c0", 10));
        assert_eq!(tracker.commands()[2].id, "c0");
        assert!(tracker.remove("c1"));
        assert!(!tracker.remove("c1"));
        tracker.push(CommandRecord::new("c3", "noop", serde_json::Value::Null));
        assert_eq!(tracker.commands().len(), 3);
        tracker.edit("c3", serde_json::json!(1));
        tracker.mark_saved("c3");
        assert_eq!(tracker.dirty().count(), 0);
    }

    #[test]
    fn notifications_count_new_tasks_only() {
        let mut tasks = TaskNotifications::new();
        let payload = TaskEventPayload {
            id: "t1".to_string(),
            message: String::new(),
            task_type: None,
            study_id: None,
        };
        assert!(tasks.apply_event(&ChannelEvent::TaskAdded(payload.clone())));
        assert!(tasks.apply_event(&ChannelEvent::TaskRunning(payload.clone())));
        assert!(tasks.apply_event(&ChannelEvent::TaskCompleted(payload.clone())));
        assert!(!tasks.apply_event(&ChannelEvent::TaskCompleted(payload)));
        assert_eq!(tasks.notification_count(), 1);
        assert_eq!(tasks.in_flight().count(), 0);
        tasks.acknowledge();
        assert_eq!(tasks.notification_count(), 0);
    }
}
