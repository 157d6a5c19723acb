//! Task status history.
//!
//! Each task owns a `StatusLog`: an insertion-ordered list of status records
//! that is only ever appended to. "Current status", "is completed" and
//! "running time" are computed from the log on every call and never cached.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::TaskKind;

/// Lifecycle state of a task.
///
/// Transitions:
/// - Queued -> Started -> InProgress -> Successful
/// - any -> Failed (terminal, message carries the error)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "IN PROGRESS")]
    InProgress,
    #[serde(rename = "SUCCESSFUL")]
    Successful,
    #[serde(rename = "FAILED")]
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Successful | TaskState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Queued => "QUEUED",
            TaskState::Started => "STARTED",
            TaskState::InProgress => "IN PROGRESS",
            TaskState::Successful => "SUCCESSFUL",
            TaskState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub state: TaskState,
    pub message: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(state: TaskState, message: Option<String>, recorded_at: DateTime<Utc>) -> Self {
        Self {
            state,
            message,
            recorded_at,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusLog {
    entries: Vec<TaskStatus>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, status: TaskStatus) {
        self.entries.push(status);
    }

    pub fn entries(&self) -> &[TaskStatus] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn latest(&self) -> Option<&TaskStatus> {
        self.entries.last()
    }

    pub fn current(&self) -> Option<TaskState> {
        self.latest().map(|s| s.state)
    }

    pub fn is_completed(&self) -> bool {
        self.current().is_some_and(TaskState::is_terminal)
    }

    /// Time between the first and the last record.
    ///
    /// For training tasks the clock starts at the first `IN PROGRESS` record
    /// when there is one, since queueing time is not training time.
    pub fn running_time(&self, kind: TaskKind) -> Option<TimeDelta> {
        let first = self.entries.first()?;
        let last = self.entries.last()?;
        let start = match kind {
            TaskKind::Training => self
                .entries
                .iter()
                .find(|s| s.state == TaskState::InProgress)
                .unwrap_or(first),
            TaskKind::Detection | TaskKind::Diagnostic => first,
        };
        Some(last.recorded_at - start.recorded_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, second).unwrap()
    }

    fn log(states: &[(TaskState, u32)]) -> StatusLog {
        let mut log = StatusLog::new();
        for (state, second) in states {
            log.append(TaskStatus::new(*state, None, at(*second)));
        }
        log
    }

    #[test]
    fn empty_log_has_no_status() {
        let log = StatusLog::new();
        assert_eq!(log.current(), None);
        assert!(!log.is_completed());
        assert_eq!(log.running_time(TaskKind::Detection), None);
    }

    #[rstest]
    #[case::queued(TaskState::Queued, false)]
    #[case::started(TaskState::Started, false)]
    #[case::in_progress(TaskState::InProgress, false)]
    #[case::successful(TaskState::Successful, true)]
    #[case::failed(TaskState::Failed, true)]
    fn current_is_the_last_appended(#[case] last: TaskState, #[case] completed: bool) {
        let log = log(&[(TaskState::Queued, 0), (TaskState::Started, 1), (last, 2)]);
        assert_eq!(log.current(), Some(last));
        assert_eq!(log.is_completed(), completed);
    }

    #[test]
    fn training_running_time_starts_at_in_progress() {
        let log = log(&[
            (TaskState::Queued, 0),
            (TaskState::Started, 5),
            (TaskState::InProgress, 12),
            (TaskState::Successful, 40),
        ]);
        assert_eq!(log.running_time(TaskKind::Training), Some(TimeDelta::seconds(28)));
        assert_eq!(log.running_time(TaskKind::Detection), Some(TimeDelta::seconds(40)));
    }

    #[test]
    fn training_without_in_progress_falls_back_to_first() {
        let log = log(&[
            (TaskState::Queued, 3),
            (TaskState::Started, 5),
            (TaskState::Failed, 9),
        ]);
        assert_eq!(log.running_time(TaskKind::Training), Some(TimeDelta::seconds(6)));
    }

    #[test]
    fn states_serialize_with_display_names() {
        assert_eq!(
            serde_json::to_string(&TaskState::InProgress).unwrap(),
            "\"IN PROGRESS\""
        );
        assert_eq!(TaskState::Successful.to_string(), "SUCCESSFUL");
    }
}
