//! Timeout detection.
//!
//! Nothing fires on its own: deadlines are derived from stored timestamps and
//! compared with the execution's clock whenever [`process_timeouts`] runs.
//! Due timeouts are applied oldest first, each stamped with its due time.
//!
//! [`process_timeouts`]: WorkflowExecution::process_timeouts

use chrono::{DateTime, Utc};

use super::{CloseStatus, WorkflowExecution};
use crate::domain::Domain;
use crate::error::SwfResult;
use crate::history::{EventAttributes, TimeoutType};
use crate::tasks::TaskState;

/// A timeout waiting to be applied, ordered by variant on equal due times.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum DueTimeout {
    Workflow,
    DecisionTask(usize),
    ActivityTask(usize, TimeoutType),
    Timer(String),
}

impl WorkflowExecution {
    /// Apply every timeout due at the current time. Returns how many were
    /// applied. A workflow timeout closes the execution and ends the pass.
    pub fn process_timeouts(&mut self, domain: &Domain) -> SwfResult<usize> {
        let now = self.now();
        let mut applied = 0;
        while self.is_open() {
            let Some((due, timeout)) = self.next_timeout() else {
                break;
            };
            if due > now {
                break;
            }
            self.apply_timeout(domain, due, timeout)?;
            applied += 1;
        }
        Ok(applied)
    }

    /// Earliest pending deadline, due or not.
    pub fn next_timeout_at(&self) -> Option<DateTime<Utc>> {
        self.next_timeout().map(|(due, _)| due)
    }

    fn next_timeout(&self) -> Option<(DateTime<Utc>, DueTimeout)> {
        let workflow = self.execution_deadline.map(|due| (due, DueTimeout::Workflow));
        let decisions = self
            .decision_tasks
            .iter()
            .enumerate()
            .filter_map(|(index, task)| Some((task.timeout_due()?, DueTimeout::DecisionTask(index))));
        let activities = self.activity_tasks.iter().enumerate().filter_map(|(index, task)| {
            let (due, kind) = task.first_timeout()?;
            Some((due, DueTimeout::ActivityTask(index, kind)))
        });
        let timers = self
            .timers
            .values()
            .filter_map(|timer| Some((timer.fire_at()?, DueTimeout::Timer(timer.timer_id.clone()))));

        workflow.into_iter().chain(decisions).chain(activities).chain(timers).min()
    }

    fn apply_timeout(&mut self, domain: &Domain, due: DateTime<Utc>, timeout: DueTimeout) -> SwfResult<()> {
        match timeout {
            DueTimeout::Workflow => {
                tracing::info!(workflow_id = %self.workflow_id, run_id = %self.run_id, "Workflow execution timed out");
                self.close_at(
                    domain,
                    due,
                    CloseStatus::TimedOut,
                    EventAttributes::WorkflowExecutionTimedOut {
                        child_policy: self.child_policy,
                        timeout_type: TimeoutType::StartToClose,
                    },
                )
            }
            DueTimeout::DecisionTask(index) => {
                let task = &mut self.decision_tasks[index];
                task.state = TaskState::TimedOut;
                let attributes = EventAttributes::DecisionTaskTimedOut {
                    scheduled_event_id: task.scheduled_event_id,
                    started_event_id: task.started_event_id.unwrap_or_default(),
                    timeout_type: TimeoutType::StartToClose,
                };
                self.open_counts.open_decision_tasks = self.open_counts.open_decision_tasks.saturating_sub(1);
                self.history.append(due, attributes);
                self.decision_requested = false;
                tracing::warn!(workflow_id = %self.workflow_id, "Decision task timed out");
                self.schedule_decision_task_at(domain, due)
            }
            DueTimeout::ActivityTask(index, timeout_type) => {
                let task = &mut self.activity_tasks[index];
                if task.state == TaskState::Scheduled {
                    domain.activity_queues.remove(&task.task_list, &task.task_token);
                }
                task.state = TaskState::TimedOut;
                let attributes = EventAttributes::ActivityTaskTimedOut {
                    scheduled_event_id: task.scheduled_event_id,
                    started_event_id: task.started_event_id,
                    timeout_type,
                    details: task.heartbeat_details.clone(),
                };
                tracing::warn!(
                    workflow_id = %self.workflow_id,
                    activity_id = %task.activity_id,
                    %timeout_type,
                    "Activity task timed out"
                );
                self.open_counts.open_activity_tasks = self.open_counts.open_activity_tasks.saturating_sub(1);
                self.history.append(due, attributes);
                self.schedule_decision_task_at(domain, due)
            }
            DueTimeout::Timer(timer_id) => self.fire_timer_at(domain, &timer_id, due),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::decisions::ScheduleActivityTaskAttributes;
    use crate::execution::StartOptions;
    use crate::history::EventType;
    use crate::types::{
        ActivityType, ActivityTypeConfig, ChildPolicy, TaskList, TypeKey, WorkflowType,
        WorkflowTypeConfig,
    };

    struct Fixture {
        domain: Domain,
        clock: Arc<ManualClock>,
        wfe: WorkflowExecution,
    }

    fn fixture(execution_timeout: &str, task_timeout: &str) -> Fixture {
        let domain = Domain::new("test-domain", "90", None);
        domain
            .activity_types
            .register(ActivityType::new(
                TypeKey::new("test-activity", "v1.1"),
                ActivityTypeConfig {
                    default_task_list: Some(TaskList::new("activities")),
                    default_task_schedule_to_start_timeout: Some("60".into()),
                    default_task_schedule_to_close_timeout: Some("600".into()),
                    default_task_start_to_close_timeout: Some("300".into()),
                    default_task_heartbeat_timeout: Some("NONE".into()),
                },
                None,
                Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(),
            ))
            .unwrap();
        let workflow_type = WorkflowType::new(
            TypeKey::new("test-workflow", "v1.0"),
            WorkflowTypeConfig {
                default_task_list: Some(TaskList::new("queue")),
                default_child_policy: Some(ChildPolicy::Terminate),
                default_execution_start_to_close_timeout: Some(execution_timeout.into()),
                default_task_start_to_close_timeout: Some(task_timeout.into()),
            },
            None,
            Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(),
        );
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2015, 1, 1, 12, 0, 0).unwrap(),
        ));
        let mut wfe = WorkflowExecution::new(
            &domain,
            &workflow_type,
            "ab1234",
            StartOptions::default(),
            Arc::clone(&clock) as Arc<dyn Clock>,
        )
        .unwrap();
        wfe.start(&domain).unwrap();
        Fixture { domain, clock, wfe }
    }

    fn types(wfe: &WorkflowExecution) -> Vec<EventType> {
        wfe.events().iter().map(|e| e.event_type()).collect()
    }

    #[test]
    fn test_nothing_due() {
        let Fixture { domain, clock, mut wfe } = fixture("3600", "30");
        clock.advance_secs(10);
        assert_eq!(wfe.process_timeouts(&domain).unwrap(), 0);
        assert_eq!(wfe.next_timeout_at(), Some(wfe.start_timestamp() + chrono::TimeDelta::seconds(3600)));
    }

    #[test]
    fn test_decision_task_timeout_reschedules() {
        let Fixture { domain, clock, mut wfe } = fixture("3600", "30");
        let token = wfe.decision_tasks()[0].task_token.clone();
        wfe.start_decision_task(&domain, &token, None).unwrap();

        clock.advance_secs(31);
        assert_eq!(wfe.process_timeouts(&domain).unwrap(), 1);
        assert_eq!(
            types(&wfe),
            vec![
                EventType::WorkflowExecutionStarted,
                EventType::DecisionTaskScheduled,
                EventType::DecisionTaskStarted,
                EventType::DecisionTaskTimedOut,
                EventType::DecisionTaskScheduled,
            ]
        );
        assert_eq!(wfe.decision_tasks()[0].state, TaskState::TimedOut);
        assert_eq!(wfe.open_counts().open_decision_tasks, 1);
        assert_eq!(domain.decision_queues.pending_count("queue"), 1);

        let timed_out = &wfe.events()[3];
        assert_eq!(timed_out.event_timestamp, wfe.start_timestamp() + chrono::TimeDelta::seconds(30));
    }

    #[test]
    fn test_activity_schedule_to_start_timeout() {
        let Fixture { domain, clock, mut wfe } = fixture("3600", "NONE");
        let attributes = ScheduleActivityTaskAttributes::new("a1", TypeKey::new("test-activity", "v1.1"));
        wfe.schedule_activity_task(&domain, 1, &attributes).unwrap();
        assert_eq!(domain.activity_queues.pending_count("activities"), 1);

        clock.advance_secs(61);
        assert_eq!(wfe.process_timeouts(&domain).unwrap(), 1);
        assert_eq!(
            wfe.history().get(4).unwrap().attributes,
            EventAttributes::ActivityTaskTimedOut {
                scheduled_event_id: 3,
                started_event_id: None,
                timeout_type: TimeoutType::ScheduleToStart,
                details: None,
            }
        );
        assert_eq!(wfe.open_counts().open_activity_tasks, 0);
        assert_eq!(domain.activity_queues.pending_count("activities"), 0);
    }

    #[test]
    fn test_workflow_timeout_stops_processing() {
        let Fixture { domain, clock, mut wfe } = fixture("100", "NONE");
        let attributes = ScheduleActivityTaskAttributes::new("a1", TypeKey::new("test-activity", "v1.1"));
        wfe.schedule_activity_task(&domain, 1, &attributes).unwrap();

        clock.advance_secs(1000);
        // schedule-to-start (60s) is due before the workflow deadline (100s)
        assert_eq!(wfe.process_timeouts(&domain).unwrap(), 2);
        assert!(!wfe.is_open());
        assert_eq!(wfe.close_status(), Some(CloseStatus::TimedOut));
        assert_eq!(
            wfe.history().last().unwrap().event_type(),
            EventType::WorkflowExecutionTimedOut
        );
        assert_eq!(domain.decision_queues.pending_count("queue"), 0);
        assert_eq!(wfe.process_timeouts(&domain).unwrap(), 0);
    }
}
