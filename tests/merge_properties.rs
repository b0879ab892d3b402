//! Properties of the identity-keyed merge and the active command index.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rstest::rstest;
use serde_json::json;
use std::cmp::Ordering;

use studyhub::reconcile::{
    compute_active_index, merge, sort_most_recent_first, Placement, TaskNotifications,
};
use studyhub::types::command::{CommandRecord, CommandResult};
use studyhub::types::job::most_recent_first;
use studyhub::{JobRecord, JobStatus};

fn status() -> impl Strategy<Value = JobStatus> {
    prop_oneof![
        Just(JobStatus::Pending),
        Just(JobStatus::Running),
        Just(JobStatus::Completed),
        Just(JobStatus::Failed),
    ]
}

fn record() -> impl Strategy<Value = JobRecord> {
    (
        prop::sample::select(vec!["a", "b", "c", "d", "e"]),
        status(),
        prop::option::of("T[0-9]"),
    )
        .prop_map(|(id, status, completed)| {
            let record = JobRecord::new(id, "study-1", status);
            match completed {
                Some(at) => record.with_completion_time(at),
                None => record,
            }
        })
}

fn unique_ids(records: &[JobRecord]) -> bool {
    let mut ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    ids.sort_unstable();
    let before = ids.len();
    ids.dedup();
    before == ids.len()
}

proptest! {
    #[test]
    fn merge_never_duplicates(
        initial in prop::collection::vec(record(), 0..6),
        batches in prop::collection::vec(prop::collection::vec(record(), 0..6), 0..6),
        prepend in any::<bool>(),
    ) {
        let placement = if prepend { Placement::Prepend } else { Placement::Append };
        let mut list = merge(&[], initial, Placement::Append);
        prop_assert!(unique_ids(&list));
        for batch in batches {
            list = merge(&list, batch, placement);
            prop_assert!(unique_ids(&list));
        }
    }

    #[test]
    fn applying_an_event_twice_equals_once(
        initial in prop::collection::vec(record(), 0..6),
        event in record(),
    ) {
        let current = merge(&[], initial, Placement::Append);
        let once = merge(&current, [event.clone()], Placement::Append);
        let twice = merge(&once, [event], Placement::Append);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn terminal_status_never_regresses(
        initial in prop::collection::vec(record(), 0..6),
        events in prop::collection::vec(record(), 0..12),
    ) {
        let mut list = merge(&[], initial, Placement::Append);
        for event in events {
            let before = list.clone();
            list = merge(&list, [event], Placement::Append);
            for old in before.iter().filter(|r| r.is_final()) {
                let now = list.iter().find(|r| r.id == old.id).map(|r| r.status);
                prop_assert_eq!(now, Some(old.status));
            }
        }
    }

    #[test]
    fn unseen_identity_is_appended(
        initial in prop::collection::vec(record(), 0..6),
        status in status(),
    ) {
        let current = merge(&[], initial, Placement::Append);
        let event = JobRecord::new("fresh", "study-1", status);
        let next = merge(&current, [event.clone()], Placement::Append);
        prop_assert_eq!(next.len(), current.len() + 1);
        prop_assert_eq!(next.last(), Some(&event));
    }
}

#[test]
fn same_id_twice_keeps_latest_fields() {
    let current = vec![JobRecord::new("a", "s", JobStatus::Pending)];
    let next = merge(
        &current,
        [
            JobRecord::new("a", "s", JobStatus::Running).with_message("starting"),
            JobRecord::new("a", "s", JobStatus::Completed).with_message("done"),
        ],
        Placement::Append,
    );
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].status, JobStatus::Completed);
    assert_eq!(next[0].message.as_deref(), Some("done"));
}

#[test]
fn completed_event_then_new_running_job() {
    let current = vec![JobRecord::new("a", "s", JobStatus::Running)];
    let after_completion = merge(
        &current,
        [JobRecord::new("a", "s", JobStatus::Completed).with_completion_time("T2")],
        Placement::Append,
    );
    assert_eq!(
        after_completion,
        vec![JobRecord::new("a", "s", JobStatus::Completed).with_completion_time("T2")]
    );

    let after_start = merge(
        &after_completion,
        [JobRecord::new("b", "s", JobStatus::Running)],
        Placement::Append,
    );
    assert_eq!(after_start.len(), 2);
    assert_eq!(after_start[0].status, JobStatus::Completed);
    assert_eq!(after_start[1].id, "b");
    assert_eq!(after_start[1].status, JobStatus::Running);
}

#[test]
fn partial_event_keeps_known_fields() {
    let current = vec![JobRecord::new("a", "s", JobStatus::Running)
        .with_creation_time("2024-03-01T10:00:00")
        .with_message("queued on node 3")];
    let next = merge(
        &current,
        [JobRecord::new("a", "", JobStatus::Completed)],
        Placement::Append,
    );
    assert_eq!(next[0].creation_time.as_deref(), Some("2024-03-01T10:00:00"));
    assert_eq!(next[0].message.as_deref(), Some("queued on node 3"));
    assert_eq!(next[0].subject_id, "s");
    assert_eq!(next[0].status, JobStatus::Completed);
}

#[test]
fn prepend_puts_latest_arrival_first() {
    let current = vec![JobRecord::new("a", "s", JobStatus::Completed)];
    let next = merge(
        &current,
        [
            JobRecord::new("b", "s", JobStatus::Running),
            JobRecord::new("c", "s", JobStatus::Running),
        ],
        Placement::Prepend,
    );
    let ids: Vec<&str> = next.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["c", "b", "a"]);
}

fn commands(with_result: &[bool]) -> Vec<CommandRecord> {
    with_result
        .iter()
        .enumerate()
        .map(|(i, done)| {
            let mut cmd = CommandRecord::new(format!("c{i}"), "update_config", json!({}));
            if *done {
                cmd.result = Some(CommandResult {
                    study_id: "v1".into(),
                    id: cmd.id.clone(),
                    success: true,
                    message: String::new(),
                });
            }
            cmd
        })
        .collect()
}

#[rstest]
#[case::empty(&[], None)]
#[case::nothing_done(&[false, false, false], Some(0))]
#[case::last_done(&[false, false, true], None)]
#[case::all_done(&[true, true], None)]
#[case::interior_done(&[true, true, false, false], Some(2))]
#[case::single_pending(&[false], Some(0))]
#[case::gap_before_last_result(&[false, true, false], Some(2))]
fn active_index_boundaries(#[case] with_result: &[bool], #[case] expected: Option<usize>) {
    assert_eq!(compute_active_index(&commands(with_result)), expected);
}

fn timestamp() -> impl Strategy<Value = String> {
    (1u32..=9, 0u32..=23).prop_map(|(day, hour)| format!("2024-01-0{day}T{hour:02}:00:00"))
}

fn mixed_records(max: usize) -> impl Strategy<Value = Vec<JobRecord>> {
    prop::collection::vec(
        (status(), prop::option::of(timestamp()), prop::option::of(timestamp())),
        0..max,
    )
    .prop_map(|rows| {
        rows.into_iter()
            .enumerate()
            .map(|(i, (status, created, completed))| {
                let mut record = JobRecord::new(format!("t{i}"), "study-1", status);
                if let Some(at) = created {
                    record = record.with_creation_time(at);
                }
                match completed {
                    Some(at) if status.is_terminal() => record.with_completion_time(at),
                    _ => record,
                }
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn recency_sort_is_a_consistent_total_order(records in mixed_records(200)) {
        let mut sorted = records.clone();
        sort_most_recent_first(&mut sorted);
        prop_assert_eq!(sorted.len(), records.len());
        for (i, earlier) in sorted.iter().enumerate() {
            for later in &sorted[i + 1..] {
                prop_assert_eq!(most_recent_first(earlier, later), Ordering::Less);
                prop_assert_eq!(most_recent_first(later, earlier), Ordering::Greater);
            }
        }

        let mut tasks = TaskNotifications::new();
        tasks.load(records);
        let ids: Vec<&str> = tasks.tasks().iter().map(|r| r.id.as_str()).collect();
        let expected: Vec<&str> = sorted.iter().map(|r| r.id.as_str()).collect();
        prop_assert_eq!(ids, expected);
    }
}
