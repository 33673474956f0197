//! Append-only execution history.
//!
//! The history is the source of truth for an execution: open counts, task
//! states and the execution status can all be rebuilt from it (see
//! [`replay`](crate::replay)). Events are never mutated or removed once
//! appended, and ids form a gap-free sequence starting at 1.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::epoch_seconds;
use crate::error::{SwfError, SwfResult};
use crate::types::{ChildPolicy, TaskList, TypeKey};

/// Cause code carried by decision-failure events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCause {
    ActivityTypeDoesNotExist,
    ActivityTypeDeprecated,
    DefaultTaskListUndefined,
    DefaultScheduleToStartTimeoutUndefined,
    DefaultScheduleToCloseTimeoutUndefined,
    DefaultStartToCloseTimeoutUndefined,
    DefaultHeartbeatTimeoutUndefined,
    ActivityIdAlreadyInUse,
    ActivityIdUnknown,
    TimerIdAlreadyInUse,
    TimerIdUnknown,
}

impl FailureCause {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ActivityTypeDoesNotExist => "ACTIVITY_TYPE_DOES_NOT_EXIST",
            Self::ActivityTypeDeprecated => "ACTIVITY_TYPE_DEPRECATED",
            Self::DefaultTaskListUndefined => "DEFAULT_TASK_LIST_UNDEFINED",
            Self::DefaultScheduleToStartTimeoutUndefined => {
                "DEFAULT_SCHEDULE_TO_START_TIMEOUT_UNDEFINED"
            }
            Self::DefaultScheduleToCloseTimeoutUndefined => {
                "DEFAULT_SCHEDULE_TO_CLOSE_TIMEOUT_UNDEFINED"
            }
            Self::DefaultStartToCloseTimeoutUndefined => "DEFAULT_START_TO_CLOSE_TIMEOUT_UNDEFINED",
            Self::DefaultHeartbeatTimeoutUndefined => "DEFAULT_HEARTBEAT_TIMEOUT_UNDEFINED",
            Self::ActivityIdAlreadyInUse => "ACTIVITY_ID_ALREADY_IN_USE",
            Self::ActivityIdUnknown => "ACTIVITY_ID_UNKNOWN",
            Self::TimerIdAlreadyInUse => "TIMER_ID_ALREADY_IN_USE",
            Self::TimerIdUnknown => "TIMER_ID_UNKNOWN",
        }
    }
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which timeout elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeoutType {
    StartToClose,
    ScheduleToStart,
    ScheduleToClose,
    Heartbeat,
}

impl fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartToClose => f.write_str("START_TO_CLOSE"),
            Self::ScheduleToStart => f.write_str("SCHEDULE_TO_START"),
            Self::ScheduleToClose => f.write_str("SCHEDULE_TO_CLOSE"),
            Self::Heartbeat => f.write_str("HEARTBEAT"),
        }
    }
}

/// Type tag of a history event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    WorkflowExecutionStarted,
    WorkflowExecutionSignaled,
    WorkflowExecutionCancelRequested,
    WorkflowExecutionCompleted,
    WorkflowExecutionFailed,
    WorkflowExecutionCanceled,
    WorkflowExecutionTerminated,
    WorkflowExecutionTimedOut,
    DecisionTaskScheduled,
    DecisionTaskStarted,
    DecisionTaskCompleted,
    DecisionTaskTimedOut,
    ActivityTaskScheduled,
    ScheduleActivityTaskFailed,
    ActivityTaskStarted,
    ActivityTaskCompleted,
    ActivityTaskFailed,
    ActivityTaskTimedOut,
    ActivityTaskCancelRequested,
    RequestCancelActivityTaskFailed,
    ActivityTaskCanceled,
    TimerStarted,
    StartTimerFailed,
    TimerFired,
    TimerCanceled,
    CancelTimerFailed,
    MarkerRecorded,
}

impl EventType {
    /// Whether this event closes the execution.
    pub fn is_close(self) -> bool {
        matches!(
            self,
            Self::WorkflowExecutionCompleted
                | Self::WorkflowExecutionFailed
                | Self::WorkflowExecutionCanceled
                | Self::WorkflowExecutionTerminated
                | Self::WorkflowExecutionTimedOut
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Event-specific attributes, one variant per event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all_fields = "camelCase")]
pub enum EventAttributes {
    WorkflowExecutionStarted {
        child_policy: ChildPolicy,
        execution_start_to_close_timeout: String,
        task_list: TaskList,
        task_start_to_close_timeout: String,
        workflow_type: TypeKey,
        input: Option<String>,
        tag_list: Vec<String>,
    },
    WorkflowExecutionSignaled {
        signal_name: String,
        input: Option<String>,
    },
    WorkflowExecutionCancelRequested {
        cause: Option<String>,
    },
    WorkflowExecutionCompleted {
        decision_task_completed_event_id: u64,
        result: Option<String>,
    },
    WorkflowExecutionFailed {
        decision_task_completed_event_id: u64,
        reason: Option<String>,
        details: Option<String>,
    },
    WorkflowExecutionCanceled {
        decision_task_completed_event_id: u64,
        details: Option<String>,
    },
    WorkflowExecutionTerminated {
        cause: String,
        child_policy: ChildPolicy,
        reason: Option<String>,
        details: Option<String>,
    },
    WorkflowExecutionTimedOut {
        child_policy: ChildPolicy,
        timeout_type: TimeoutType,
    },
    DecisionTaskScheduled {
        task_list: TaskList,
        start_to_close_timeout: String,
    },
    DecisionTaskStarted {
        scheduled_event_id: u64,
        identity: Option<String>,
    },
    DecisionTaskCompleted {
        scheduled_event_id: u64,
        started_event_id: u64,
        execution_context: Option<String>,
    },
    DecisionTaskTimedOut {
        scheduled_event_id: u64,
        started_event_id: u64,
        timeout_type: TimeoutType,
    },
    ActivityTaskScheduled {
        activity_id: String,
        activity_type: TypeKey,
        decision_task_completed_event_id: u64,
        task_list: TaskList,
        input: Option<String>,
        control: Option<String>,
        schedule_to_start_timeout: String,
        schedule_to_close_timeout: String,
        start_to_close_timeout: String,
        heartbeat_timeout: String,
    },
    ScheduleActivityTaskFailed {
        activity_id: String,
        activity_type: TypeKey,
        cause: FailureCause,
        decision_task_completed_event_id: u64,
    },
    ActivityTaskStarted {
        scheduled_event_id: u64,
        identity: Option<String>,
    },
    ActivityTaskCompleted {
        scheduled_event_id: u64,
        started_event_id: u64,
        result: Option<String>,
    },
    ActivityTaskFailed {
        scheduled_event_id: u64,
        started_event_id: u64,
        reason: Option<String>,
        details: Option<String>,
    },
    ActivityTaskTimedOut {
        scheduled_event_id: u64,
        started_event_id: Option<u64>,
        timeout_type: TimeoutType,
        details: Option<String>,
    },
    ActivityTaskCancelRequested {
        activity_id: String,
        decision_task_completed_event_id: u64,
    },
    RequestCancelActivityTaskFailed {
        activity_id: String,
        cause: FailureCause,
        decision_task_completed_event_id: u64,
    },
    ActivityTaskCanceled {
        scheduled_event_id: u64,
        started_event_id: Option<u64>,
        latest_cancel_requested_event_id: Option<u64>,
        details: Option<String>,
    },
    TimerStarted {
        timer_id: String,
        start_to_fire_timeout: String,
        control: Option<String>,
        decision_task_completed_event_id: u64,
    },
    StartTimerFailed {
        timer_id: String,
        cause: FailureCause,
        decision_task_completed_event_id: u64,
    },
    TimerFired {
        timer_id: String,
        started_event_id: u64,
    },
    TimerCanceled {
        timer_id: String,
        started_event_id: u64,
        decision_task_completed_event_id: u64,
    },
    CancelTimerFailed {
        timer_id: String,
        cause: FailureCause,
        decision_task_completed_event_id: u64,
    },
    MarkerRecorded {
        marker_name: String,
        details: Option<String>,
        decision_task_completed_event_id: u64,
    },
}

impl EventAttributes {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::WorkflowExecutionStarted { .. } => EventType::WorkflowExecutionStarted,
            Self::WorkflowExecutionSignaled { .. } => EventType::WorkflowExecutionSignaled,
            Self::WorkflowExecutionCancelRequested { .. } => {
                EventType::WorkflowExecutionCancelRequested
            }
            Self::WorkflowExecutionCompleted { .. } => EventType::WorkflowExecutionCompleted,
            Self::WorkflowExecutionFailed { .. } => EventType::WorkflowExecutionFailed,
            Self::WorkflowExecutionCanceled { .. } => EventType::WorkflowExecutionCanceled,
            Self::WorkflowExecutionTerminated { .. } => EventType::WorkflowExecutionTerminated,
            Self::WorkflowExecutionTimedOut { .. } => EventType::WorkflowExecutionTimedOut,
            Self::DecisionTaskScheduled { .. } => EventType::DecisionTaskScheduled,
            Self::DecisionTaskStarted { .. } => EventType::DecisionTaskStarted,
            Self::DecisionTaskCompleted { .. } => EventType::DecisionTaskCompleted,
            Self::DecisionTaskTimedOut { .. } => EventType::DecisionTaskTimedOut,
            Self::ActivityTaskScheduled { .. } => EventType::ActivityTaskScheduled,
            Self::ScheduleActivityTaskFailed { .. } => EventType::ScheduleActivityTaskFailed,
            Self::ActivityTaskStarted { .. } => EventType::ActivityTaskStarted,
            Self::ActivityTaskCompleted { .. } => EventType::ActivityTaskCompleted,
            Self::ActivityTaskFailed { .. } => EventType::ActivityTaskFailed,
            Self::ActivityTaskTimedOut { .. } => EventType::ActivityTaskTimedOut,
            Self::ActivityTaskCancelRequested { .. } => EventType::ActivityTaskCancelRequested,
            Self::RequestCancelActivityTaskFailed { .. } => {
                EventType::RequestCancelActivityTaskFailed
            }
            Self::ActivityTaskCanceled { .. } => EventType::ActivityTaskCanceled,
            Self::TimerStarted { .. } => EventType::TimerStarted,
            Self::StartTimerFailed { .. } => EventType::StartTimerFailed,
            Self::TimerFired { .. } => EventType::TimerFired,
            Self::TimerCanceled { .. } => EventType::TimerCanceled,
            Self::CancelTimerFailed { .. } => EventType::CancelTimerFailed,
            Self::MarkerRecorded { .. } => EventType::MarkerRecorded,
        }
    }

    /// Cause code of a decision-failure event.
    pub fn cause(&self) -> Option<FailureCause> {
        match self {
            Self::ScheduleActivityTaskFailed { cause, .. }
            | Self::RequestCancelActivityTaskFailed { cause, .. }
            | Self::StartTimerFailed { cause, .. }
            | Self::CancelTimerFailed { cause, .. } => Some(*cause),
            _ => None,
        }
    }
}

/// One immutable entry of an execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_id: u64,
    pub event_timestamp: DateTime<Utc>,
    pub attributes: EventAttributes,
}

impl HistoryEvent {
    pub fn event_type(&self) -> EventType {
        self.attributes.event_type()
    }

    pub fn cause(&self) -> Option<FailureCause> {
        self.attributes.cause()
    }

    /// Wire shape: `eventId`, `eventType`, `eventTimestamp` and a
    /// `<eventType>EventAttributes` object with absent values omitted.
    pub fn to_value(&self) -> Value {
        let event_type = self.event_type().to_string();
        let mut attributes = match serde_json::to_value(&self.attributes) {
            Ok(Value::Object(mut tagged)) => tagged.remove(&event_type).unwrap_or(Value::Null),
            _ => Value::Null,
        };
        if let Value::Object(fields) = &mut attributes {
            fields.retain(|_, v| !v.is_null());
        }

        let mut key = event_type.clone();
        if let Some(first) = key.get_mut(0..1) {
            first.make_ascii_lowercase();
        }

        let mut event = serde_json::Map::new();
        event.insert("eventId".into(), Value::from(self.event_id));
        event.insert("eventType".into(), Value::from(event_type));
        event.insert(
            "eventTimestamp".into(),
            Value::from(epoch_seconds(self.event_timestamp)),
        );
        event.insert(format!("{key}EventAttributes"), attributes);
        Value::Object(event)
    }
}

/// One page of history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryPage {
    pub events: Vec<HistoryEvent>,
    /// Opaque token for the following page, if any.
    pub next_page_token: Option<String>,
}

/// Ordered, append-only event log of one execution.
#[derive(Debug, Clone, Default)]
pub struct History {
    events: Vec<HistoryEvent>,
}

impl History {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event and return its id.
    ///
    /// Timestamps never go backwards: an event stamped earlier than its
    /// predecessor (a timeout applied late) takes the predecessor's time.
    pub(crate) fn append(&mut self, timestamp: DateTime<Utc>, attributes: EventAttributes) -> u64 {
        let event_id = self.next_event_id();
        let event_timestamp = match self.events.last() {
            Some(last) => {
                debug_assert_eq!(last.event_id + 1, event_id, "history event ids must be gap-free");
                last.event_timestamp.max(timestamp)
            }
            None => timestamp,
        };
        tracing::trace!(event_id, event_type = %attributes.event_type(), "Appending history event");
        self.events.push(HistoryEvent {
            event_id,
            event_timestamp,
            attributes,
        });
        event_id
    }

    pub fn next_event_id(&self) -> u64 {
        self.events.len() as u64 + 1
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn get(&self, event_id: u64) -> Option<&HistoryEvent> {
        let index = usize::try_from(event_id.checked_sub(1)?).ok()?;
        self.events.get(index)
    }

    pub fn last(&self) -> Option<&HistoryEvent> {
        self.events.last()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// One page of events, oldest-first unless `reverse`.
    ///
    /// The page token is the id of the last event handed out, so events
    /// appended between fetches never shift a later page.
    pub fn page(
        &self,
        reverse: bool,
        page_size: usize,
        next_page_token: Option<&str>,
    ) -> SwfResult<HistoryPage> {
        let after = match next_page_token {
            Some(token) => Some(
                token
                    .parse::<usize>()
                    .ok()
                    .filter(|event_id| (1..=self.events.len()).contains(event_id))
                    .ok_or_else(|| SwfError::validation(format!("Invalid next page token: {token}")))?,
            ),
            None => None,
        };
        let page_size = page_size.max(1);

        let events: Vec<_> = if reverse {
            let below = after.map_or(self.events.len(), |event_id| event_id - 1);
            self.events[..below].iter().rev().take(page_size).cloned().collect()
        } else {
            let above = after.unwrap_or(0);
            self.events[above..].iter().take(page_size).cloned().collect()
        };

        let next_page_token = events.last().and_then(|last| {
            let more = if reverse {
                last.event_id > 1
            } else {
                last.event_id < self.next_event_id() - 1
            };
            more.then(|| last.event_id.to_string())
        });
        Ok(HistoryPage {
            events,
            next_page_token,
        })
    }
}
