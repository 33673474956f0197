//! Timers and markers.

use chrono::{DateTime, Utc};

use super::WorkflowExecution;
use crate::decisions::{RecordMarkerAttributes, StartTimerAttributes};
use crate::domain::Domain;
use crate::error::SwfResult;
use crate::history::{EventAttributes, FailureCause};
use crate::tasks::Timer;

impl WorkflowExecution {
    pub(super) fn start_timer_at(
        &mut self,
        decision_task_completed_event_id: u64,
        attributes: StartTimerAttributes,
        at: DateTime<Utc>,
    ) -> Option<FailureCause> {
        if self.timers.contains_key(&attributes.timer_id) {
            let cause = FailureCause::TimerIdAlreadyInUse;
            self.history.append(
                at,
                EventAttributes::StartTimerFailed {
                    timer_id: attributes.timer_id,
                    cause,
                    decision_task_completed_event_id,
                },
            );
            return Some(cause);
        }

        let started_event_id = self.history.append(
            at,
            EventAttributes::TimerStarted {
                timer_id: attributes.timer_id.clone(),
                start_to_fire_timeout: attributes.start_to_fire_timeout.clone(),
                control: attributes.control,
                decision_task_completed_event_id,
            },
        );
        tracing::debug!(workflow_id = %self.workflow_id, timer_id = %attributes.timer_id, "Started timer");
        self.timers.insert(
            attributes.timer_id.clone(),
            Timer {
                timer_id: attributes.timer_id,
                start_to_fire_timeout: attributes.start_to_fire_timeout,
                started_event_id,
                started_at: at,
            },
        );
        self.open_counts.open_timers += 1;
        None
    }

    pub(super) fn cancel_timer_at(
        &mut self,
        decision_task_completed_event_id: u64,
        timer_id: &str,
        at: DateTime<Utc>,
    ) -> Option<FailureCause> {
        let Some(timer) = self.timers.remove(timer_id) else {
            let cause = FailureCause::TimerIdUnknown;
            self.history.append(
                at,
                EventAttributes::CancelTimerFailed {
                    timer_id: timer_id.to_string(),
                    cause,
                    decision_task_completed_event_id,
                },
            );
            return Some(cause);
        };

        self.open_counts.open_timers = self.open_counts.open_timers.saturating_sub(1);
        self.history.append(
            at,
            EventAttributes::TimerCanceled {
                timer_id: timer.timer_id,
                started_event_id: timer.started_event_id,
                decision_task_completed_event_id,
            },
        );
        None
    }

    /// Fire a due timer and hand control back to the decider.
    pub(super) fn fire_timer_at(&mut self, domain: &Domain, timer_id: &str, at: DateTime<Utc>) -> SwfResult<()> {
        let Some(timer) = self.timers.remove(timer_id) else {
            return Ok(());
        };
        self.open_counts.open_timers = self.open_counts.open_timers.saturating_sub(1);
        self.history.append(
            at,
            EventAttributes::TimerFired {
                timer_id: timer.timer_id,
                started_event_id: timer.started_event_id,
            },
        );
        tracing::debug!(workflow_id = %self.workflow_id, timer_id, "Timer fired");
        self.schedule_decision_task_at(domain, at)
    }

    pub(super) fn record_marker_at(
        &mut self,
        decision_task_completed_event_id: u64,
        attributes: RecordMarkerAttributes,
        at: DateTime<Utc>,
    ) {
        self.history.append(
            at,
            EventAttributes::MarkerRecorded {
                marker_name: attributes.marker_name,
                details: attributes.details,
                decision_task_completed_event_id,
            },
        );
    }
}
