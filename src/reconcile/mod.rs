//! Reconciliation of push events and poll results into consistent lists.
//!
//! - [`merge`] - identity-keyed merge with shallow field merge and a
//!   forward-only status guard
//! - [`compute_active_index`] - which variant command is being generated
//! - [`JobTracker`], [`CommandTracker`], [`TaskNotifications`] - per-feature
//!   views built on `merge`
//! - [`StatusPoller`] - fixed-period status poll that stops on a final status

pub mod active;
pub mod merge;
pub mod poller;
pub mod tracker;

pub use active::compute_active_index;
pub use merge::{merge, sort_most_recent_first, Placement, Reconcile};
pub use poller::{PollHandle, StatusPoller, StatusSource};
pub use tracker::{CommandTracker, JobTracker, TaskNotifications};
