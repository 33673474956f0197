//! Activity task scheduling cascade and lifecycle.

use chrono::{DateTime, Utc};

use super::WorkflowExecution;
use crate::decisions::ScheduleActivityTaskAttributes;
use crate::defaults::resolve_default;
use crate::domain::Domain;
use crate::error::{SwfError, SwfResult};
use crate::history::{EventAttributes, FailureCause};
use crate::tasks::{new_task_token, ActivityTask, ActivityTimeouts, TaskState};
use crate::types::TaskList;

impl WorkflowExecution {
    /// Schedule an activity task on behalf of a decision.
    ///
    /// Returns the failure cause when the task could not be scheduled; the
    /// matching `ScheduleActivityTaskFailed` event has already been recorded.
    pub fn schedule_activity_task(
        &mut self,
        domain: &Domain,
        decision_task_completed_event_id: u64,
        attributes: &ScheduleActivityTaskAttributes,
    ) -> SwfResult<Option<FailureCause>> {
        self.ensure_open()?;
        let now = self.now();
        Ok(self.schedule_activity_task_at(domain, decision_task_completed_event_id, attributes, now))
    }

    pub(super) fn schedule_activity_task_at(
        &mut self,
        domain: &Domain,
        decision_task_completed_event_id: u64,
        attributes: &ScheduleActivityTaskAttributes,
        at: DateTime<Utc>,
    ) -> Option<FailureCause> {
        let (task_list, timeouts) = match self.resolve_activity_task(domain, attributes) {
            Ok(resolved) => resolved,
            Err(cause) => {
                self.history.append(
                    at,
                    EventAttributes::ScheduleActivityTaskFailed {
                        activity_id: attributes.activity_id.clone(),
                        activity_type: attributes.activity_type.clone(),
                        cause,
                        decision_task_completed_event_id,
                    },
                );
                tracing::debug!(
                    workflow_id = %self.workflow_id,
                    activity_id = %attributes.activity_id,
                    %cause,
                    "Activity task could not be scheduled"
                );
                return Some(cause);
            }
        };

        let scheduled_event_id = self.history.append(
            at,
            EventAttributes::ActivityTaskScheduled {
                activity_id: attributes.activity_id.clone(),
                activity_type: attributes.activity_type.clone(),
                decision_task_completed_event_id,
                task_list: TaskList::new(task_list.clone()),
                input: attributes.input.clone(),
                control: attributes.control.clone(),
                schedule_to_start_timeout: timeouts.schedule_to_start.clone(),
                schedule_to_close_timeout: timeouts.schedule_to_close.clone(),
                start_to_close_timeout: timeouts.start_to_close.clone(),
                heartbeat_timeout: timeouts.heartbeat.clone(),
            },
        );

        let task = ActivityTask {
            task_token: new_task_token(),
            activity_id: attributes.activity_id.clone(),
            activity_type: attributes.activity_type.clone(),
            task_list,
            input: attributes.input.clone(),
            control: attributes.control.clone(),
            timeouts,
            state: TaskState::Scheduled,
            scheduled_event_id,
            started_event_id: None,
            identity: None,
            scheduled_at: at,
            started_at: None,
            last_heartbeat_at: None,
            heartbeat_details: None,
            cancel_requested: false,
            cancel_requested_event_id: None,
        };
        domain.enqueue_activity_task(&task.task_list, &task.task_token, &self.key());
        tracing::debug!(
            workflow_id = %self.workflow_id,
            activity_id = %task.activity_id,
            task_list = %task.task_list,
            scheduled_event_id,
            "Scheduled activity task"
        );
        self.activity_tasks.push(task);
        self.open_counts.open_activity_tasks += 1;
        self.latest_activity_task_timestamp = Some(at);
        None
    }

    /// The scheduling checks, in order. The first failure wins.
    fn resolve_activity_task(
        &self,
        domain: &Domain,
        attributes: &ScheduleActivityTaskAttributes,
    ) -> Result<(String, ActivityTimeouts), FailureCause> {
        let activity_type = domain
            .activity_types
            .find(&attributes.activity_type)
            .ok_or(FailureCause::ActivityTypeDoesNotExist)?;
        if activity_type.is_deprecated() {
            return Err(FailureCause::ActivityTypeDeprecated);
        }
        let defaults = activity_type.config();

        let task_list = resolve_default(
            attributes.task_list.as_ref().map(|t| t.name.clone()),
            defaults.default_task_list.as_ref().map(|t| t.name.clone()),
            || FailureCause::DefaultTaskListUndefined,
        )?;
        let timeouts = ActivityTimeouts {
            schedule_to_start: resolve_default(
                attributes.schedule_to_start_timeout.clone(),
                defaults.default_task_schedule_to_start_timeout.clone(),
                || FailureCause::DefaultScheduleToStartTimeoutUndefined,
            )?,
            schedule_to_close: resolve_default(
                attributes.schedule_to_close_timeout.clone(),
                defaults.default_task_schedule_to_close_timeout.clone(),
                || FailureCause::DefaultScheduleToCloseTimeoutUndefined,
            )?,
            start_to_close: resolve_default(
                attributes.start_to_close_timeout.clone(),
                defaults.default_task_start_to_close_timeout.clone(),
                || FailureCause::DefaultStartToCloseTimeoutUndefined,
            )?,
            heartbeat: resolve_default(
                attributes.heartbeat_timeout.clone(),
                defaults.default_task_heartbeat_timeout.clone(),
                || FailureCause::DefaultHeartbeatTimeoutUndefined,
            )?,
        };

        let id_in_use = self
            .activity_tasks
            .iter()
            .any(|t| t.state.is_open() && t.activity_id == attributes.activity_id);
        if id_in_use {
            return Err(FailureCause::ActivityIdAlreadyInUse);
        }
        Ok((task_list, timeouts))
    }

    /// Ask for cancellation of an open activity. A task nobody has started
    /// yet is canceled on the spot.
    ///
    /// Returns whether the decider must be consulted again.
    pub(super) fn request_cancel_activity_task_at(
        &mut self,
        domain: &Domain,
        decision_task_completed_event_id: u64,
        activity_id: &str,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(index) = self
            .activity_tasks
            .iter()
            .position(|t| t.state.is_open() && t.activity_id == activity_id)
        else {
            self.history.append(
                at,
                EventAttributes::RequestCancelActivityTaskFailed {
                    activity_id: activity_id.to_string(),
                    cause: FailureCause::ActivityIdUnknown,
                    decision_task_completed_event_id,
                },
            );
            return true;
        };

        let cancel_requested_event_id = self.history.append(
            at,
            EventAttributes::ActivityTaskCancelRequested {
                activity_id: activity_id.to_string(),
                decision_task_completed_event_id,
            },
        );
        let task = &mut self.activity_tasks[index];
        task.cancel_requested = true;
        task.cancel_requested_event_id = Some(cancel_requested_event_id);
        if task.state != TaskState::Scheduled {
            return false;
        }

        domain.activity_queues.remove(&task.task_list, &task.task_token);
        task.state = TaskState::Canceled;
        self.open_counts.open_activity_tasks = self.open_counts.open_activity_tasks.saturating_sub(1);
        self.history.append(
            at,
            EventAttributes::ActivityTaskCanceled {
                scheduled_event_id: task.scheduled_event_id,
                started_event_id: None,
                latest_cancel_requested_event_id: Some(cancel_requested_event_id),
                details: None,
            },
        );
        true
    }

    /// Claim a scheduled activity task for a worker.
    pub fn start_activity_task(
        &mut self,
        domain: &Domain,
        task_token: &str,
        identity: Option<String>,
    ) -> SwfResult<()> {
        self.ensure_open_for_task()?;
        let index = self.activity_task_index(task_token)?;
        let task = &self.activity_tasks[index];
        if task.state != TaskState::Scheduled {
            return Err(SwfError::validation(format!(
                "Activity task {task_token} is {}, expected SCHEDULED",
                task.state
            )));
        }

        let now = self.now();
        domain.activity_queues.remove(&task.task_list, task_token);
        let started_event_id = self.history.append(
            now,
            EventAttributes::ActivityTaskStarted {
                scheduled_event_id: task.scheduled_event_id,
                identity: identity.clone(),
            },
        );
        self.activity_tasks[index].start(identity, started_event_id, now);
        tracing::debug!(workflow_id = %self.workflow_id, started_event_id, "Started activity task");
        Ok(())
    }

    pub fn complete_activity_task(
        &mut self,
        domain: &Domain,
        task_token: &str,
        result: Option<String>,
    ) -> SwfResult<()> {
        let (index, scheduled_event_id, started_event_id) = self.started_activity_task(task_token)?;
        self.finish_activity_task(
            domain,
            index,
            TaskState::Completed,
            EventAttributes::ActivityTaskCompleted {
                scheduled_event_id,
                started_event_id,
                result,
            },
        )
    }

    pub fn fail_activity_task(
        &mut self,
        domain: &Domain,
        task_token: &str,
        reason: Option<String>,
        details: Option<String>,
    ) -> SwfResult<()> {
        let (index, scheduled_event_id, started_event_id) = self.started_activity_task(task_token)?;
        self.finish_activity_task(
            domain,
            index,
            TaskState::Failed,
            EventAttributes::ActivityTaskFailed {
                scheduled_event_id,
                started_event_id,
                reason,
                details,
            },
        )
    }

    pub fn cancel_activity_task(
        &mut self,
        domain: &Domain,
        task_token: &str,
        details: Option<String>,
    ) -> SwfResult<()> {
        let (index, scheduled_event_id, started_event_id) = self.started_activity_task(task_token)?;
        let latest_cancel_requested_event_id = self.activity_tasks[index].cancel_requested_event_id;
        self.finish_activity_task(
            domain,
            index,
            TaskState::Canceled,
            EventAttributes::ActivityTaskCanceled {
                scheduled_event_id,
                started_event_id: Some(started_event_id),
                latest_cancel_requested_event_id,
                details,
            },
        )
    }

    /// Record liveness of a started task. Returns whether cancellation of the
    /// task has been requested.
    pub fn record_activity_task_heartbeat(
        &mut self,
        task_token: &str,
        details: Option<String>,
    ) -> SwfResult<bool> {
        let (index, _, _) = self.started_activity_task(task_token)?;
        let now = self.now();
        let task = &mut self.activity_tasks[index];
        task.heartbeat(details, now);
        Ok(task.cancel_requested)
    }

    fn finish_activity_task(
        &mut self,
        domain: &Domain,
        index: usize,
        state: TaskState,
        attributes: EventAttributes,
    ) -> SwfResult<()> {
        let now = self.now();
        self.history.append(now, attributes);
        self.activity_tasks[index].state = state;
        self.open_counts.open_activity_tasks = self.open_counts.open_activity_tasks.saturating_sub(1);
        tracing::debug!(
            workflow_id = %self.workflow_id,
            activity_id = %self.activity_tasks[index].activity_id,
            %state,
            "Activity task finished"
        );
        self.schedule_decision_task_at(domain, now)
    }

    /// Index, scheduled and started event ids of a STARTED activity task.
    fn started_activity_task(&self, task_token: &str) -> SwfResult<(usize, u64, u64)> {
        self.ensure_open_for_task()?;
        let index = self.activity_task_index(task_token)?;
        let task = &self.activity_tasks[index];
        match (task.state, task.started_event_id) {
            (TaskState::Started, Some(started_event_id)) => {
                Ok((index, task.scheduled_event_id, started_event_id))
            }
            _ => Err(SwfError::validation(format!(
                "Activity task {task_token} is {}, expected STARTED",
                task.state
            ))),
        }
    }

    fn activity_task_index(&self, task_token: &str) -> SwfResult<usize> {
        self.activity_tasks
            .iter()
            .position(|t| t.task_token == task_token)
            .ok_or_else(|| SwfError::validation(format!("Invalid activity task token: {task_token}")))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;

    use super::*;
    use crate::clock::ManualClock;
    use crate::execution::StartOptions;
    use crate::history::EventType;
    use crate::types::{
        ActivityType, ActivityTypeConfig, ChildPolicy, TypeKey, WorkflowType, WorkflowTypeConfig,
    };

    fn domain_with_activity() -> Domain {
        let domain = Domain::new("test-domain", "90", None);
        domain
            .activity_types
            .register(ActivityType::new(
                TypeKey::new("test-activity", "v1.1"),
                ActivityTypeConfig::default(),
                None,
                Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(),
            ))
            .unwrap();
        domain
    }

    fn execution(domain: &Domain) -> WorkflowExecution {
        let workflow_type = WorkflowType::new(
            TypeKey::new("test-workflow", "v1.0"),
            WorkflowTypeConfig {
                default_task_list: Some(TaskList::new("queue")),
                default_child_policy: Some(ChildPolicy::Terminate),
                default_execution_start_to_close_timeout: Some("300".into()),
                default_task_start_to_close_timeout: Some("300".into()),
            },
            None,
            Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(),
        );
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2015, 1, 1, 12, 0, 0).unwrap(),
        ));
        WorkflowExecution::new(domain, &workflow_type, "ab1234", StartOptions::default(), clock)
            .unwrap()
    }

    fn valid_attributes() -> ScheduleActivityTaskAttributes {
        ScheduleActivityTaskAttributes {
            task_list: Some(TaskList::new("task-list-name")),
            schedule_to_start_timeout: Some("600".into()),
            schedule_to_close_timeout: Some("600".into()),
            start_to_close_timeout: Some("600".into()),
            heartbeat_timeout: Some("300".into()),
            ..ScheduleActivityTaskAttributes::new("my-activity-001", TypeKey::new("test-activity", "v1.1"))
        }
    }

    #[test]
    fn test_request_cancel_of_scheduled_task() {
        let domain = domain_with_activity();
        let mut wfe = execution(&domain);
        wfe.schedule_activity_task(&domain, 1, &valid_attributes()).unwrap();
        let now = wfe.now();

        assert!(wfe.request_cancel_activity_task_at(&domain, 1, "my-activity-001", now));
        let types: Vec<_> = wfe.events().iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                EventType::ActivityTaskScheduled,
                EventType::ActivityTaskCancelRequested,
                EventType::ActivityTaskCanceled,
            ]
        );
        assert_eq!(wfe.activity_tasks()[0].state, TaskState::Canceled);
        assert_eq!(wfe.open_counts().open_activity_tasks, 0);
        assert_eq!(domain.activity_queues.pending_count("task-list-name"), 0);
    }

    #[test]
    fn test_request_cancel_of_started_task() {
        let domain = domain_with_activity();
        let mut wfe = execution(&domain);
        wfe.schedule_activity_task(&domain, 1, &valid_attributes()).unwrap();
        let token = wfe.activity_tasks()[0].task_token.clone();
        wfe.start_activity_task(&domain, &token, Some("worker01".into())).unwrap();
        let now = wfe.now();

        assert!(!wfe.request_cancel_activity_task_at(&domain, 1, "my-activity-001", now));
        assert!(wfe.record_activity_task_heartbeat(&token, None).unwrap());

        wfe.cancel_activity_task(&domain, &token, Some("stopped".into())).unwrap();
        let canceled = &wfe.events()[wfe.events().len() - 2];
        assert_eq!(
            canceled.attributes,
            EventAttributes::ActivityTaskCanceled {
                scheduled_event_id: 1,
                started_event_id: Some(2),
                latest_cancel_requested_event_id: Some(3),
                details: Some("stopped".into()),
            }
        );
        assert_eq!(wfe.history().last().unwrap().event_type(), EventType::DecisionTaskScheduled);
    }

    #[test]
    fn test_request_cancel_unknown_activity() {
        let domain = domain_with_activity();
        let mut wfe = execution(&domain);
        let now = wfe.now();

        assert!(wfe.request_cancel_activity_task_at(&domain, 1, "nope", now));
        assert_eq!(
            wfe.history().last().unwrap().cause(),
            Some(FailureCause::ActivityIdUnknown)
        );
    }

    #[test]
    fn test_heartbeat_requires_started_task() {
        let domain = domain_with_activity();
        let mut wfe = execution(&domain);
        wfe.schedule_activity_task(&domain, 1, &valid_attributes()).unwrap();
        let token = wfe.activity_tasks()[0].task_token.clone();

        let err = wfe.record_activity_task_heartbeat(&token, None).unwrap_err();
        assert!(matches!(err, SwfError::Validation(_)));

        wfe.start_activity_task(&domain, &token, None).unwrap();
        assert!(!wfe.record_activity_task_heartbeat(&token, Some("10%".into())).unwrap());
        assert_eq!(wfe.activity_tasks()[0].heartbeat_details.as_deref(), Some("10%"));
    }

    #[test]
    fn test_fail_activity_task_schedules_decision() {
        let domain = domain_with_activity();
        let mut wfe = execution(&domain);
        wfe.schedule_activity_task(&domain, 1, &valid_attributes()).unwrap();
        let token = wfe.activity_tasks()[0].task_token.clone();
        wfe.start_activity_task(&domain, &token, None).unwrap();

        wfe.fail_activity_task(&domain, &token, Some("boom".into()), None).unwrap();
        assert_eq!(wfe.activity_tasks()[0].state, TaskState::Failed);
        let types: Vec<_> = wfe.events().iter().rev().take(2).map(|e| e.event_type()).collect();
        assert_eq!(types, vec![EventType::DecisionTaskScheduled, EventType::ActivityTaskFailed]);
        assert_eq!(wfe.open_counts().open_activity_tasks, 0);
        assert_eq!(wfe.open_counts().open_decision_tasks, 1);

        let err = wfe.complete_activity_task(&domain, &token, None).unwrap_err();
        assert!(matches!(err, SwfError::Validation(_)));
    }

    #[test]
    fn test_activity_id_reusable_after_close() {
        let domain = domain_with_activity();
        let mut wfe = execution(&domain);
        wfe.schedule_activity_task(&domain, 1, &valid_attributes()).unwrap();
        let token = wfe.activity_tasks()[0].task_token.clone();
        wfe.start_activity_task(&domain, &token, None).unwrap();
        wfe.complete_activity_task(&domain, &token, None).unwrap();

        let outcome = wfe.schedule_activity_task(&domain, 1, &valid_attributes()).unwrap();
        assert_eq!(outcome, None);
        assert_eq!(wfe.activity_tasks().len(), 2);
    }
}
