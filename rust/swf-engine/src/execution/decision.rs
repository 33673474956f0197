//! Decision task lifecycle and decision application.

use chrono::{DateTime, Utc};

use super::{CloseStatus, WorkflowExecution};
use crate::decisions::{validate_decisions, Decision};
use crate::domain::Domain;
use crate::error::{SwfError, SwfResult};
use crate::history::EventAttributes;
use crate::tasks::{DecisionTask, TaskState};
use crate::types::TaskList;

impl WorkflowExecution {
    /// Schedule a decision task unless one is already pending.
    ///
    /// While a decision task is STARTED the request is remembered and a new
    /// task is scheduled once the in-flight one completes or times out.
    pub fn schedule_decision_task(&mut self, domain: &Domain) -> SwfResult<()> {
        self.ensure_open()?;
        let now = self.now();
        self.schedule_decision_task_at(domain, now)
    }

    pub(super) fn schedule_decision_task_at(&mut self, domain: &Domain, at: DateTime<Utc>) -> SwfResult<()> {
        if let Some(pending) = self.decision_tasks.iter().find(|t| t.state.is_open()) {
            if pending.state == TaskState::Started {
                self.decision_requested = true;
            }
            return Ok(());
        }

        let task_list = self.task_list()?;
        let start_to_close_timeout = self.task_start_to_close_timeout()?;
        let scheduled_event_id = self.history.append(
            at,
            EventAttributes::DecisionTaskScheduled {
                task_list: TaskList::new(task_list.clone()),
                start_to_close_timeout: start_to_close_timeout.clone(),
            },
        );

        let task = DecisionTask::new(task_list, start_to_close_timeout, scheduled_event_id, at);
        domain.enqueue_decision_task(&task.task_list, &task.task_token, &self.key());
        tracing::debug!(
            workflow_id = %self.workflow_id,
            task_list = %task.task_list,
            scheduled_event_id,
            "Scheduled decision task"
        );
        self.decision_tasks.push(task);
        self.open_counts.open_decision_tasks += 1;
        Ok(())
    }

    /// Claim a scheduled decision task for a decider.
    pub fn start_decision_task(
        &mut self,
        domain: &Domain,
        task_token: &str,
        identity: Option<String>,
    ) -> SwfResult<()> {
        self.ensure_open_for_task()?;
        let index = self.decision_task_index(task_token)?;
        let task = &self.decision_tasks[index];
        if task.state != TaskState::Scheduled {
            return Err(SwfError::validation(format!(
                "Decision task {task_token} is {}, expected SCHEDULED",
                task.state
            )));
        }

        let now = self.now();
        domain.decision_queues.remove(&task.task_list, task_token);
        let started_event_id = self.history.append(
            now,
            EventAttributes::DecisionTaskStarted {
                scheduled_event_id: task.scheduled_event_id,
                identity: identity.clone(),
            },
        );
        self.decision_tasks[index].start(identity, started_event_id, now);
        tracing::debug!(workflow_id = %self.workflow_id, started_event_id, "Started decision task");
        Ok(())
    }

    /// Close a started decision task and apply its decisions in order.
    ///
    /// The whole decision list is validated before anything is recorded.
    /// When a decision fails, or new events arrived while the task was in
    /// flight, another decision task is scheduled afterwards.
    pub fn complete_decision_task(
        &mut self,
        domain: &Domain,
        task_token: &str,
        decisions: Vec<Decision>,
        execution_context: Option<String>,
    ) -> SwfResult<()> {
        let (index, started_event_id) = self.started_decision_task(task_token)?;
        validate_decisions(&decisions)?;
        let task = &self.decision_tasks[index];

        let now = self.now();
        let decision_task_completed_event_id = self.history.append(
            now,
            EventAttributes::DecisionTaskCompleted {
                scheduled_event_id: task.scheduled_event_id,
                started_event_id,
                execution_context: execution_context.clone(),
            },
        );
        self.decision_tasks[index].state = TaskState::Completed;
        self.open_counts.open_decision_tasks = self.open_counts.open_decision_tasks.saturating_sub(1);
        if execution_context.is_some() {
            self.latest_execution_context = execution_context;
        }
        tracing::debug!(
            workflow_id = %self.workflow_id,
            decisions = decisions.len(),
            decision_task_completed_event_id,
            "Completed decision task"
        );

        let mut needs_decision = std::mem::take(&mut self.decision_requested);
        for decision in decisions {
            if !self.is_open() {
                break;
            }
            needs_decision |= self.apply_decision(domain, decision_task_completed_event_id, decision, now)?;
        }

        if needs_decision && self.is_open() {
            self.schedule_decision_task_at(domain, now)?;
        }
        Ok(())
    }

    /// Apply one decision. Returns whether the decider must be consulted again.
    fn apply_decision(
        &mut self,
        domain: &Domain,
        decision_task_completed_event_id: u64,
        decision: Decision,
        at: DateTime<Utc>,
    ) -> SwfResult<bool> {
        let needs_decision = match decision {
            Decision::ScheduleActivityTask { attributes } => self
                .schedule_activity_task_at(domain, decision_task_completed_event_id, &attributes, at)
                .is_some(),
            Decision::RequestCancelActivityTask { attributes } => self.request_cancel_activity_task_at(
                domain,
                decision_task_completed_event_id,
                &attributes.activity_id,
                at,
            ),
            Decision::CompleteWorkflowExecution { attributes } => {
                self.close_at(
                    domain,
                    at,
                    CloseStatus::Completed,
                    EventAttributes::WorkflowExecutionCompleted {
                        decision_task_completed_event_id,
                        result: attributes.result,
                    },
                )?;
                false
            }
            Decision::FailWorkflowExecution { attributes } => {
                self.close_at(
                    domain,
                    at,
                    CloseStatus::Failed,
                    EventAttributes::WorkflowExecutionFailed {
                        decision_task_completed_event_id,
                        reason: attributes.reason,
                        details: attributes.details,
                    },
                )?;
                false
            }
            Decision::CancelWorkflowExecution { attributes } => {
                self.close_at(
                    domain,
                    at,
                    CloseStatus::Canceled,
                    EventAttributes::WorkflowExecutionCanceled {
                        decision_task_completed_event_id,
                        details: attributes.details,
                    },
                )?;
                false
            }
            Decision::StartTimer { attributes } => self
                .start_timer_at(decision_task_completed_event_id, attributes, at)
                .is_some(),
            Decision::CancelTimer { attributes } => self
                .cancel_timer_at(decision_task_completed_event_id, &attributes.timer_id, at)
                .is_some(),
            Decision::RecordMarker { attributes } => {
                self.record_marker_at(decision_task_completed_event_id, attributes, at);
                false
            }
        };
        Ok(needs_decision)
    }

    /// Index and started event id of a STARTED decision task.
    pub(crate) fn started_decision_task(&self, task_token: &str) -> SwfResult<(usize, u64)> {
        self.ensure_open_for_task()?;
        let index = self.decision_task_index(task_token)?;
        let task = &self.decision_tasks[index];
        match (task.state, task.started_event_id) {
            (TaskState::Started, Some(started_event_id)) => Ok((index, started_event_id)),
            _ => Err(SwfError::validation(format!(
                "Decision task {task_token} is {}, expected STARTED",
                task.state
            ))),
        }
    }

    fn decision_task_index(&self, task_token: &str) -> SwfResult<usize> {
        self.decision_tasks
            .iter()
            .position(|t| t.task_token == task_token)
            .ok_or_else(|| SwfError::validation(format!("Invalid decision task token: {task_token}")))
    }
}
