//! Rebuild execution state from its history.
//!
//! Replaying the events of an execution in order yields the same status, open
//! counts and task states that the live aggregate holds. The engine never
//! needs this at runtime; it backs consistency checks and offline inspection
//! of exported histories.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::execution::{CloseStatus, ExecutionStatus, OpenCounts};
use crate::history::{EventAttributes, HistoryEvent};
use crate::tasks::TaskState;

/// A history that could not have been produced by the engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReplayError {
    #[error("Event id gap: expected {expected}, found {found}")]
    EventIdGap { expected: u64, found: u64 },

    #[error("Event {event_id} is older than its predecessor")]
    TimestampRegression { event_id: u64 },

    #[error("Event {event_id} recorded after the execution closed")]
    EventAfterClose { event_id: u64 },

    #[error("Event {event_id} refers to unknown scheduled event {scheduled_event_id}")]
    UnknownScheduledEvent { event_id: u64, scheduled_event_id: u64 },

    #[error("Event {event_id} moves a task out of {state}")]
    InvalidTransition { event_id: u64, state: TaskState },

    #[error("Event {event_id} refers to timer {timer_id} which is not running")]
    UnknownTimer { event_id: u64, timer_id: String },
}

/// State derived from a history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayedState {
    pub status: ExecutionStatus,
    pub close_status: Option<CloseStatus>,
    pub open_counts: OpenCounts,
    /// Decision task states keyed by their scheduled event id.
    pub decision_tasks: BTreeMap<u64, TaskState>,
    /// Activity task states keyed by their scheduled event id.
    pub activity_tasks: BTreeMap<u64, TaskState>,
    pub open_timers: BTreeSet<String>,
    pub cancel_requested: bool,
}

impl Default for ReplayedState {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::Open,
            close_status: None,
            open_counts: OpenCounts::default(),
            decision_tasks: BTreeMap::new(),
            activity_tasks: BTreeMap::new(),
            open_timers: BTreeSet::new(),
            cancel_requested: false,
        }
    }
}

/// Fold a history into the state it implies.
pub fn replay(events: &[HistoryEvent]) -> Result<ReplayedState, ReplayError> {
    let mut state = ReplayedState::default();
    let mut previous: Option<&HistoryEvent> = None;

    for event in events {
        let expected = previous.map_or(1, |p| p.event_id + 1);
        if event.event_id != expected {
            return Err(ReplayError::EventIdGap {
                expected,
                found: event.event_id,
            });
        }
        if previous.is_some_and(|p| event.event_timestamp < p.event_timestamp) {
            return Err(ReplayError::TimestampRegression {
                event_id: event.event_id,
            });
        }
        if state.status == ExecutionStatus::Closed {
            return Err(ReplayError::EventAfterClose {
                event_id: event.event_id,
            });
        }
        state.apply(event)?;
        previous = Some(event);
    }

    Ok(state)
}

impl ReplayedState {
    fn apply(&mut self, event: &HistoryEvent) -> Result<(), ReplayError> {
        let event_id = event.event_id;
        match &event.attributes {
            EventAttributes::WorkflowExecutionCancelRequested { .. } => self.cancel_requested = true,
            EventAttributes::WorkflowExecutionCompleted { .. } => self.close(CloseStatus::Completed),
            EventAttributes::WorkflowExecutionFailed { .. } => self.close(CloseStatus::Failed),
            EventAttributes::WorkflowExecutionCanceled { .. } => self.close(CloseStatus::Canceled),
            EventAttributes::WorkflowExecutionTerminated { .. } => self.close(CloseStatus::Terminated),
            EventAttributes::WorkflowExecutionTimedOut { .. } => self.close(CloseStatus::TimedOut),

            EventAttributes::DecisionTaskScheduled { .. } => {
                self.decision_tasks.insert(event_id, TaskState::Scheduled);
                self.open_counts.open_decision_tasks += 1;
            }
            EventAttributes::DecisionTaskStarted { scheduled_event_id, .. } => {
                transition(&mut self.decision_tasks, event_id, *scheduled_event_id, TaskState::Started)?;
            }
            EventAttributes::DecisionTaskCompleted { scheduled_event_id, .. } => {
                transition(&mut self.decision_tasks, event_id, *scheduled_event_id, TaskState::Completed)?;
                self.open_counts.open_decision_tasks -= 1;
            }
            EventAttributes::DecisionTaskTimedOut { scheduled_event_id, .. } => {
                transition(&mut self.decision_tasks, event_id, *scheduled_event_id, TaskState::TimedOut)?;
                self.open_counts.open_decision_tasks -= 1;
            }

            EventAttributes::ActivityTaskScheduled { .. } => {
                self.activity_tasks.insert(event_id, TaskState::Scheduled);
                self.open_counts.open_activity_tasks += 1;
            }
            EventAttributes::ActivityTaskStarted { scheduled_event_id, .. } => {
                transition(&mut self.activity_tasks, event_id, *scheduled_event_id, TaskState::Started)?;
            }
            EventAttributes::ActivityTaskCompleted { scheduled_event_id, .. } => {
                transition(&mut self.activity_tasks, event_id, *scheduled_event_id, TaskState::Completed)?;
                self.open_counts.open_activity_tasks -= 1;
            }
            EventAttributes::ActivityTaskFailed { scheduled_event_id, .. } => {
                transition(&mut self.activity_tasks, event_id, *scheduled_event_id, TaskState::Failed)?;
                self.open_counts.open_activity_tasks -= 1;
            }
            EventAttributes::ActivityTaskTimedOut { scheduled_event_id, .. } => {
                transition(&mut self.activity_tasks, event_id, *scheduled_event_id, TaskState::TimedOut)?;
                self.open_counts.open_activity_tasks -= 1;
            }
            EventAttributes::ActivityTaskCanceled { scheduled_event_id, .. } => {
                transition(&mut self.activity_tasks, event_id, *scheduled_event_id, TaskState::Canceled)?;
                self.open_counts.open_activity_tasks -= 1;
            }

            EventAttributes::TimerStarted { timer_id, .. } => {
                self.open_timers.insert(timer_id.clone());
                self.open_counts.open_timers += 1;
            }
            EventAttributes::TimerFired { timer_id, .. } | EventAttributes::TimerCanceled { timer_id, .. } => {
                if !self.open_timers.remove(timer_id) {
                    return Err(ReplayError::UnknownTimer {
                        event_id,
                        timer_id: timer_id.clone(),
                    });
                }
                self.open_counts.open_timers -= 1;
            }

            EventAttributes::WorkflowExecutionStarted { .. }
            | EventAttributes::WorkflowExecutionSignaled { .. }
            | EventAttributes::ScheduleActivityTaskFailed { .. }
            | EventAttributes::ActivityTaskCancelRequested { .. }
            | EventAttributes::RequestCancelActivityTaskFailed { .. }
            | EventAttributes::StartTimerFailed { .. }
            | EventAttributes::CancelTimerFailed { .. }
            | EventAttributes::MarkerRecorded { .. } => {}
        }
        Ok(())
    }

    fn close(&mut self, close_status: CloseStatus) {
        self.status = ExecutionStatus::Closed;
        self.close_status = Some(close_status);
    }
}

/// Move a task to `next`, checking the move is legal.
fn transition(
    tasks: &mut BTreeMap<u64, TaskState>,
    event_id: u64,
    scheduled_event_id: u64,
    next: TaskState,
) -> Result<(), ReplayError> {
    let state = tasks
        .get_mut(&scheduled_event_id)
        .ok_or(ReplayError::UnknownScheduledEvent {
            event_id,
            scheduled_event_id,
        })?;
    let allowed = match next {
        TaskState::Started => *state == TaskState::Scheduled,
        // schedule-to-* timeouts and cancellation may hit a task nobody started
        TaskState::TimedOut | TaskState::Canceled => state.is_open(),
        _ => *state == TaskState::Started,
    };
    if !allowed {
        return Err(ReplayError::InvalidTransition {
            event_id,
            state: *state,
        });
    }
    *state = next;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::{History, TimeoutType};
    use crate::types::TaskList;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 1, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn scheduled() -> EventAttributes {
        EventAttributes::DecisionTaskScheduled {
            task_list: TaskList::new("queue"),
            start_to_close_timeout: "300".into(),
        }
    }

    #[test]
    fn test_replay_decision_lifecycle() {
        let mut history = History::new();
        history.append(at(0), scheduled());
        history.append(
            at(1),
            EventAttributes::DecisionTaskStarted {
                scheduled_event_id: 1,
                identity: None,
            },
        );
        history.append(
            at(40),
            EventAttributes::DecisionTaskTimedOut {
                scheduled_event_id: 1,
                started_event_id: 2,
                timeout_type: TimeoutType::StartToClose,
            },
        );
        history.append(at(40), scheduled());

        let state = replay(history.events()).unwrap();
        assert_eq!(state.open_counts.open_decision_tasks, 1);
        assert_eq!(state.decision_tasks.get(&1), Some(&TaskState::TimedOut));
        assert_eq!(state.decision_tasks.get(&4), Some(&TaskState::Scheduled));
        assert_eq!(state.status, ExecutionStatus::Open);
    }

    #[test]
    fn test_replay_detects_gap() {
        let mut history = History::new();
        history.append(at(0), scheduled());
        history.append(at(1), scheduled());
        let events = vec![history.events()[1].clone()];

        assert_eq!(
            replay(&events).unwrap_err(),
            ReplayError::EventIdGap {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn test_replay_rejects_unknown_task() {
        let mut history = History::new();
        history.append(
            at(0),
            EventAttributes::ActivityTaskStarted {
                scheduled_event_id: 7,
                identity: None,
            },
        );
        assert!(matches!(
            replay(history.events()),
            Err(ReplayError::UnknownScheduledEvent { .. })
        ));
    }

    #[test]
    fn test_replay_rejects_events_after_close() {
        let mut history = History::new();
        history.append(
            at(0),
            EventAttributes::WorkflowExecutionCompleted {
                decision_task_completed_event_id: 1,
                result: None,
            },
        );
        history.append(at(1), scheduled());
        assert_eq!(
            replay(history.events()).unwrap_err(),
            ReplayError::EventAfterClose { event_id: 2 }
        );
    }
}
