//! Position of the command currently being generated.
//!
//! The server replays a variant's commands strictly in list order, so the
//! command in progress is the one right after the last command that already
//! has a result.

use crate::types::command::CommandRecord;

/// Index of the command currently being generated.
///
/// - `None` when the list is empty or the last command already has a result
///   (generation finished).
/// - `Some(0)` when no command has a result yet.
/// - Otherwise the index right after the last command with a result.
///
/// # Examples
///
/// ```
/// use studyhub::reconcile::compute_active_index;
/// use studyhub::CommandRecord;
///
/// let cmds: Vec<CommandRecord> = (0..3)
///     .map(|i| CommandRecord::new(format!("c{i}"), "noop", serde_json::Value::Null))
///     .collect();
/// assert_eq!(compute_active_index(&cmds), Some(0));
/// assert_eq!(compute_active_index(&[]), None);
/// ```
pub fn compute_active_index(commands: &[CommandRecord]) -> Option<usize> {
    match commands.iter().rposition(CommandRecord::has_result) {
        None if commands.is_empty() => None,
        None => Some(0),
        Some(last) if last + 1 == commands.len() => None,
        Some(last) => Some(last + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::command::CommandResult;

    fn cmd(id: &str, done: bool) -> CommandRecord {
        let mut c = CommandRecord::new(id, "update_config", serde_json::Value::Null);
        if done {
            c.result = Some(CommandResult {
                study_id: "s".to_string(),
                id: id.to_string(),
                success: true,
                message: String::new(),
            });
        }
        c
    }

    #[test]
    fn interior_result_points_past_it() {
        let cmds = [cmd("a", true), cmd("b", true), cmd("c", false), cmd("d", false)];
        assert_eq!(compute_active_index(&cmds), Some(2));
    }

    #[test]
    fn only_last_done_means_finished() {
        let cmds = [cmd("a", false), cmd("b", true)];
        assert_eq!(compute_active_index(&cmds), None);
    }

    #[test]
    fn gap_uses_last_result() {
        let cmds = [cmd("a", false), cmd("b", true), cmd("c", false)];
        assert_eq!(compute_active_index(&cmds), Some(2));
    }
}
