//! Status queries.

use serde::Serialize;

use crate::domain::{StatusLog, TaskCode, TaskKind, TaskState, TaskStatus};

/// Snapshot of one task's progress, ready to be serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusView {
    pub kind: TaskKind,
    pub code: TaskCode,
    /// `None` while nothing has been recorded.
    pub state: Option<TaskState>,
    pub message: Option<String>,
    pub running_time_seconds: Option<f64>,
    pub is_completed: bool,
    pub history: Vec<TaskStatus>,
}

impl StatusView {
    pub fn from_log(kind: TaskKind, code: TaskCode, log: &StatusLog) -> Self {
        let latest = log.latest();
        Self {
            kind,
            code,
            state: latest.map(|s| s.state),
            message: latest.and_then(|s| s.message.clone()),
            running_time_seconds: log
                .running_time(kind)
                .map(|d| d.num_milliseconds() as f64 / 1000.0),
            is_completed: log.is_completed(),
            history: log.entries().to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn view_reports_latest_state_and_running_time() {
        let at = |s| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, s).unwrap();
        let mut log = StatusLog::new();
        log.append(TaskStatus::new(TaskState::Queued, Some("Enqueued".into()), at(0)));
        log.append(TaskStatus::new(TaskState::Started, Some("Started".into()), at(2)));
        log.append(TaskStatus::new(TaskState::InProgress, None, at(5)));
        log.append(TaskStatus::new(TaskState::Successful, Some("Successful".into()), at(9)));

        let view = StatusView::from_log(TaskKind::Training, TaskCode::new("t"), &log);
        assert_eq!(view.state, Some(TaskState::Successful));
        assert_eq!(view.message.as_deref(), Some("Successful"));
        assert_eq!(view.running_time_seconds, Some(4.0));
        assert!(view.is_completed);
        assert_eq!(view.history.len(), 4);

        let detection = StatusView::from_log(TaskKind::Detection, TaskCode::new("d"), &log);
        assert_eq!(detection.running_time_seconds, Some(9.0));
    }

    #[test]
    fn empty_log_has_no_state() {
        let view = StatusView::from_log(TaskKind::Diagnostic, TaskCode::new("x"), &StatusLog::new());
        assert_eq!(view.state, None);
        assert!(!view.is_completed);
        assert_eq!(view.running_time_seconds, None);
    }
}
