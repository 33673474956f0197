//! Decision task, activity task and timer records.
//!
//! Tasks are never deleted: once closed they stay in their execution's task
//! tables for audit. State changes go through the owning
//! [`WorkflowExecution`](crate::execution::WorkflowExecution), which also
//! records the matching history events.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::defaults::parse_timeout;
use crate::history::TimeoutType;
use crate::types::TypeKey;

/// Lifecycle state shared by decision and activity tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Scheduled,
    Started,
    Completed,
    Failed,
    Canceled,
    TimedOut,
}

impl TaskState {
    /// SCHEDULED or STARTED.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Scheduled | Self::Started)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => f.write_str("SCHEDULED"),
            Self::Started => f.write_str("STARTED"),
            Self::Completed => f.write_str("COMPLETED"),
            Self::Failed => f.write_str("FAILED"),
            Self::Canceled => f.write_str("CANCELED"),
            Self::TimedOut => f.write_str("TIMED_OUT"),
        }
    }
}

/// Fresh opaque task token.
pub(crate) fn new_task_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A unit of work handed to a decider.
#[derive(Debug, Clone, PartialEq)]
pub struct DecisionTask {
    pub task_token: String,
    pub task_list: String,
    pub start_to_close_timeout: String,
    pub state: TaskState,
    pub scheduled_event_id: u64,
    pub started_event_id: Option<u64>,
    pub identity: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
}

impl DecisionTask {
    pub(crate) fn new(
        task_list: String,
        start_to_close_timeout: String,
        scheduled_event_id: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_token: new_task_token(),
            task_list,
            start_to_close_timeout,
            state: TaskState::Scheduled,
            scheduled_event_id,
            started_event_id: None,
            identity: None,
            scheduled_at: now,
            started_at: None,
        }
    }

    pub(crate) fn start(&mut self, identity: Option<String>, started_event_id: u64, now: DateTime<Utc>) {
        self.state = TaskState::Started;
        self.identity = identity;
        self.started_event_id = Some(started_event_id);
        self.started_at = Some(now);
    }

    /// When the start-to-close timeout of a started task elapses.
    pub fn timeout_due(&self) -> Option<DateTime<Utc>> {
        if self.state != TaskState::Started {
            return None;
        }
        Some(self.started_at? + parse_timeout(&self.start_to_close_timeout)?)
    }
}

/// Timeouts resolved when an activity task is scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityTimeouts {
    pub schedule_to_start: String,
    pub schedule_to_close: String,
    pub start_to_close: String,
    pub heartbeat: String,
}

/// A unit of work handed to an activity worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityTask {
    pub task_token: String,
    pub activity_id: String,
    pub activity_type: TypeKey,
    pub task_list: String,
    pub input: Option<String>,
    pub control: Option<String>,
    pub timeouts: ActivityTimeouts,
    pub state: TaskState,
    pub scheduled_event_id: u64,
    pub started_event_id: Option<u64>,
    pub identity: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub heartbeat_details: Option<String>,
    pub cancel_requested: bool,
    pub cancel_requested_event_id: Option<u64>,
}

impl ActivityTask {
    pub(crate) fn start(&mut self, identity: Option<String>, started_event_id: u64, now: DateTime<Utc>) {
        self.state = TaskState::Started;
        self.identity = identity;
        self.started_event_id = Some(started_event_id);
        self.started_at = Some(now);
        self.last_heartbeat_at = Some(now);
    }

    pub(crate) fn heartbeat(&mut self, details: Option<String>, now: DateTime<Utc>) {
        self.last_heartbeat_at = Some(now);
        if details.is_some() {
            self.heartbeat_details = details;
        }
    }

    /// Earliest pending timeout of an open task, with its deadline.
    pub fn first_timeout(&self) -> Option<(DateTime<Utc>, TimeoutType)> {
        let after = |base: Option<DateTime<Utc>>, timeout: &str| -> Option<DateTime<Utc>> {
            Some(base? + parse_timeout(timeout)?)
        };

        let candidates = match self.state {
            TaskState::Scheduled => vec![
                (after(Some(self.scheduled_at), &self.timeouts.schedule_to_start), TimeoutType::ScheduleToStart),
                (after(Some(self.scheduled_at), &self.timeouts.schedule_to_close), TimeoutType::ScheduleToClose),
            ],
            TaskState::Started => vec![
                (after(Some(self.scheduled_at), &self.timeouts.schedule_to_close), TimeoutType::ScheduleToClose),
                (after(self.started_at, &self.timeouts.start_to_close), TimeoutType::StartToClose),
                (after(self.last_heartbeat_at, &self.timeouts.heartbeat), TimeoutType::Heartbeat),
            ],
            _ => return None,
        };

        candidates
            .into_iter()
            .filter_map(|(due, kind)| due.map(|due| (due, kind)))
            .min_by_key(|(due, _)| *due)
    }
}

/// A timer started by a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timer {
    pub timer_id: String,
    pub start_to_fire_timeout: String,
    pub started_event_id: u64,
    pub started_at: DateTime<Utc>,
}

impl Timer {
    /// When the timer fires; `None` means it never fires on its own.
    pub fn fire_at(&self) -> Option<DateTime<Utc>> {
        Some(self.started_at + parse_timeout(&self.start_to_fire_timeout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 1, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn activity(timeouts: ActivityTimeouts) -> ActivityTask {
        ActivityTask {
            task_token: new_task_token(),
            activity_id: "my-activity-001".into(),
            activity_type: TypeKey::new("test-activity", "v1.1"),
            task_list: "task-list-name".into(),
            input: None,
            control: None,
            timeouts,
            state: TaskState::Scheduled,
            scheduled_event_id: 1,
            started_event_id: None,
            identity: None,
            scheduled_at: at(0),
            started_at: None,
            last_heartbeat_at: None,
            heartbeat_details: None,
            cancel_requested: false,
            cancel_requested_event_id: None,
        }
    }

    fn timeouts(s2s: &str, s2c: &str, stc: &str, hb: &str) -> ActivityTimeouts {
        ActivityTimeouts {
            schedule_to_start: s2s.into(),
            schedule_to_close: s2c.into(),
            start_to_close: stc.into(),
            heartbeat: hb.into(),
        }
    }

    #[test]
    fn test_scheduled_task_times_out_on_schedule_to_start() {
        let task = activity(timeouts("60", "600", "300", "30"));
        assert_eq!(task.first_timeout(), Some((at(60), TimeoutType::ScheduleToStart)));
    }

    #[test]
    fn test_started_task_times_out_on_heartbeat() {
        let mut task = activity(timeouts("60", "600", "300", "30"));
        task.start(Some("worker01".into()), 2, at(10));
        assert_eq!(task.first_timeout(), Some((at(40), TimeoutType::Heartbeat)));

        task.heartbeat(Some("50%".into()), at(35));
        assert_eq!(task.first_timeout(), Some((at(65), TimeoutType::Heartbeat)));
        assert_eq!(task.heartbeat_details.as_deref(), Some("50%"));
    }

    #[test]
    fn test_none_timeouts_never_fire() {
        let mut task = activity(timeouts("NONE", "NONE", "NONE", "NONE"));
        assert_eq!(task.first_timeout(), None);
        task.start(None, 2, at(10));
        assert_eq!(task.first_timeout(), None);
    }

    #[test]
    fn test_closed_task_has_no_timeout() {
        let mut task = activity(timeouts("1", "1", "1", "1"));
        task.state = TaskState::Completed;
        assert_eq!(task.first_timeout(), None);
    }

    #[test]
    fn test_decision_task_timeout_only_when_started() {
        let mut task = DecisionTask::new("queue".into(), "300".into(), 2, at(0));
        assert_eq!(task.timeout_due(), None);
        task.start(None, 3, at(5));
        assert_eq!(task.timeout_due(), Some(at(305)));
    }

    #[test]
    fn test_tokens_are_unique() {
        assert_ne!(new_task_token(), new_task_token());
    }
}
