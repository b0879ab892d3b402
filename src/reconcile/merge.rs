//! Identity-keyed merge of record lists.
//!
//! [`merge`] folds incoming observations (push events or poll results) into
//! the current list. Each identity appears at most once in the output, and
//! an existing entry is updated through [`Reconcile::absorb`], which does a
//! shallow merge: fields absent from the newer observation keep their old
//! value. Job records additionally refuse to move backwards in
//! [`JobStatus`](crate::types::job::JobStatus) order; such observations are
//! logged and skipped.
//!
//! The input slice is never modified. A fresh `Vec` is returned so callers
//! can detect changes by comparing against the previous list.

use crate::error::Result;
use crate::types::command::CommandRecord;
use crate::types::job::{most_recent_first, JobRecord};

/// Where previously unseen identities go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Placement {
    /// After the existing entries, in arrival order.
    #[default]
    Append,
    /// Before the existing entries, latest arrival first.
    Prepend,
}

/// A record that can be reconciled by identity.
pub trait Reconcile: Clone {
    /// Identity of the record.
    fn id(&self) -> &str;

    /// Folds a newer observation of the same identity into `self`.
    ///
    /// On error `self` must be left unchanged.
    fn absorb(&mut self, newer: Self) -> Result<()>;
}

fn keep_some<T>(slot: &mut Option<T>, newer: Option<T>) {
    if newer.is_some() {
        *slot = newer;
    }
}

impl Reconcile for JobRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn absorb(&mut self, newer: Self) -> Result<()> {
        self.status.validate_advance(&self.id, newer.status)?;
        self.status = newer.status;
        if !newer.subject_id.is_empty() {
            self.subject_id = newer.subject_id;
        }
        keep_some(&mut self.creation_time, newer.creation_time);
        keep_some(&mut self.completion_time, newer.completion_time);
        keep_some(&mut self.message, newer.message);
        keep_some(&mut self.result_payload, newer.result_payload);
        Ok(())
    }
}

impl Reconcile for CommandRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn absorb(&mut self, newer: Self) -> Result<()> {
        self.action = newer.action;
        self.args = newer.args;
        keep_some(&mut self.version, newer.version);
        self.updated = newer.updated;
        keep_some(&mut self.result, newer.result);
        Ok(())
    }
}

/// Merges `incoming` into `current` and returns the new list.
///
/// # Examples
///
/// ```
/// use studyhub::reconcile::{merge, Placement};
/// use studyhub::{JobRecord, JobStatus};
///
/// let current = vec![JobRecord::new("a", "s", JobStatus::Running)];
/// let next = merge(
///     &current,
///     [JobRecord::new("a", "s", JobStatus::Completed).with_completion_time("T2")],
///     Placement::Append,
/// );
///
/// assert_eq!(next.len(), 1);
/// assert_eq!(next[0].status, JobStatus::Completed);
/// assert_eq!(next[0].completion_time.as_deref(), Some("T2"));
/// assert_eq!(current[0].status, JobStatus::Running);
/// ```
pub fn merge<T, I>(current: &[T], incoming: I, placement: Placement) -> Vec<T>
where
    T: Reconcile,
    I: IntoIterator<Item = T>,
{
    let mut merged: Vec<T> = current.to_vec();
    let mut fresh: Vec<T> = Vec::new();

    for record in incoming {
        let existing = merged
            .iter_mut()
            .chain(fresh.iter_mut())
            .find(|r| r.id() == record.id());
        match existing {
            Some(entry) => {
                if let Err(err) = entry.absorb(record) {
                    tracing::debug!(error = %err, "ignoring stale observation");
                }
            },
            None => fresh.push(record),
        }
    }

    match placement {
        Placement::Append => {
            merged.extend(fresh);
            merged
        },
        Placement::Prepend => {
            fresh.reverse();
            fresh.extend(merged);
            fresh
        },
    }
}

/// Sorts job records most-recent-first (stable).
pub fn sort_most_recent_first(records: &mut [JobRecord]) {
    records.sort_by(most_recent_first);
}
