//! Workflow executions.
//!
//! A [`WorkflowExecution`] is an event-sourced aggregate: every operation
//! appends to its [`History`] and updates the derived state (status, open
//! counts, task tables) in the same step. Operations that return an error
//! leave both untouched.
//!
//! The aggregate does not own its domain. Operations that touch task-list
//! queues or type registries take the owning [`Domain`] as a parameter, and
//! callers hold the execution's mutex for the duration of the call.

mod activity;
mod decision;
mod timeouts;
mod timers;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{epoch_seconds, Clock};
use crate::defaults::{parse_timeout, resolve_default};
use crate::domain::{Domain, ExecutionKey};
use crate::error::{SwfError, SwfResult};
use crate::history::{EventAttributes, History, HistoryEvent, TimeoutType};
use crate::tasks::{ActivityTask, DecisionTask, TaskState, Timer};
use crate::types::{ChildPolicy, TaskList, TypeKey, WorkflowType, WorkflowTypeConfig};

/// OPEN until a close event is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Open,
    Closed,
}

/// How a closed execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseStatus {
    Completed,
    Failed,
    Canceled,
    Terminated,
    TimedOut,
}

impl fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("COMPLETED"),
            Self::Failed => f.write_str("FAILED"),
            Self::Canceled => f.write_str("CANCELED"),
            Self::Terminated => f.write_str("TERMINATED"),
            Self::TimedOut => f.write_str("TIMED_OUT"),
        }
    }
}

/// Caller-supplied settings for a new execution. Unset values fall back to
/// the workflow type's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartOptions {
    pub child_policy: Option<ChildPolicy>,
    pub tag_list: Vec<String>,
    pub execution_start_to_close_timeout: Option<String>,
    pub task_list: Option<TaskList>,
    pub task_start_to_close_timeout: Option<String>,
    pub input: Option<String>,
}

/// Number of non-terminal tasks and timers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenCounts {
    pub open_decision_tasks: u32,
    pub open_activity_tasks: u32,
    pub open_timers: u32,
}

/// Medium projection: identity, type, status and close information.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionInfo {
    pub execution: ExecutionKey,
    pub workflow_type: TypeKey,
    pub start_timestamp: f64,
    pub execution_status: ExecutionStatus,
    pub cancel_requested: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tag_list: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_status: Option<CloseStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_timestamp: Option<f64>,
}

/// Effective configuration, with type defaults applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionConfiguration {
    pub child_policy: ChildPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_start_to_close_timeout: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_list: Option<TaskList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_start_to_close_timeout: Option<String>,
}

/// Full projection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDetail {
    pub execution_info: ExecutionInfo,
    pub execution_configuration: ExecutionConfiguration,
    pub open_counts: OpenCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_execution_context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_activity_task_timestamp: Option<f64>,
}

/// One run of a workflow.
#[derive(Debug)]
pub struct WorkflowExecution {
    domain: String,
    workflow_type: TypeKey,
    type_defaults: WorkflowTypeConfig,
    workflow_id: String,
    run_id: String,
    child_policy: ChildPolicy,
    options: StartOptions,
    status: ExecutionStatus,
    close_status: Option<CloseStatus>,
    start_timestamp: DateTime<Utc>,
    close_timestamp: Option<DateTime<Utc>>,
    execution_deadline: Option<DateTime<Utc>>,
    cancel_requested: bool,
    latest_execution_context: Option<String>,
    latest_activity_task_timestamp: Option<DateTime<Utc>>,
    /// A decision was needed while one was in flight.
    decision_requested: bool,
    history: History,
    open_counts: OpenCounts,
    decision_tasks: Vec<DecisionTask>,
    activity_tasks: Vec<ActivityTask>,
    timers: BTreeMap<String, Timer>,
    clock: Arc<dyn Clock>,
}

impl WorkflowExecution {
    /// Create an execution without starting it; no event is recorded.
    ///
    /// The child policy is resolved here and fails with `DefaultUndefined`
    /// when neither the caller nor the type provides one.
    pub fn new(
        domain: &Domain,
        workflow_type: &WorkflowType,
        workflow_id: impl Into<String>,
        options: StartOptions,
        clock: Arc<dyn Clock>,
    ) -> SwfResult<Self> {
        let type_defaults = workflow_type.config().clone();
        let child_policy = resolve_default(options.child_policy, type_defaults.default_child_policy, || {
            SwfError::DefaultUndefined {
                attribute: "child_policy",
            }
        })?;

        let now = clock.now();
        Ok(Self {
            domain: domain.name().to_string(),
            workflow_type: workflow_type.key().clone(),
            type_defaults,
            workflow_id: workflow_id.into(),
            run_id: uuid::Uuid::new_v4().to_string(),
            child_policy,
            options,
            status: ExecutionStatus::Open,
            close_status: None,
            start_timestamp: now,
            close_timestamp: None,
            execution_deadline: None,
            cancel_requested: false,
            latest_execution_context: None,
            latest_activity_task_timestamp: None,
            decision_requested: false,
            history: History::new(),
            open_counts: OpenCounts::default(),
            decision_tasks: Vec::new(),
            activity_tasks: Vec::new(),
            timers: BTreeMap::new(),
            clock,
        })
    }

    // --- accessors --------------------------------------------------------

    pub fn key(&self) -> ExecutionKey {
        ExecutionKey::new(self.workflow_id.clone(), self.run_id.clone())
    }

    pub fn domain_name(&self) -> &str {
        &self.domain
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn workflow_type(&self) -> &TypeKey {
        &self.workflow_type
    }

    pub fn child_policy(&self) -> ChildPolicy {
        self.child_policy
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.status == ExecutionStatus::Open
    }

    pub fn close_status(&self) -> Option<CloseStatus> {
        self.close_status
    }

    pub fn start_timestamp(&self) -> DateTime<Utc> {
        self.start_timestamp
    }

    pub fn close_timestamp(&self) -> Option<DateTime<Utc>> {
        self.close_timestamp
    }

    pub fn tag_list(&self) -> &[String] {
        &self.options.tag_list
    }

    pub fn input(&self) -> Option<&str> {
        self.options.input.as_deref()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub fn latest_execution_context(&self) -> Option<&str> {
        self.latest_execution_context.as_deref()
    }

    pub fn open_counts(&self) -> OpenCounts {
        self.open_counts
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn events(&self) -> &[HistoryEvent] {
        self.history.events()
    }

    pub fn decision_tasks(&self) -> &[DecisionTask] {
        &self.decision_tasks
    }

    pub fn activity_tasks(&self) -> &[ActivityTask] {
        &self.activity_tasks
    }

    /// Open timers by id.
    pub fn timers(&self) -> &BTreeMap<String, Timer> {
        &self.timers
    }

    pub fn decision_task(&self, task_token: &str) -> Option<&DecisionTask> {
        self.decision_tasks.iter().find(|t| t.task_token == task_token)
    }

    pub fn activity_task(&self, task_token: &str) -> Option<&ActivityTask> {
        self.activity_tasks.iter().find(|t| t.task_token == task_token)
    }

    /// Started event id of the most recent decision task already processed.
    pub fn previous_started_event_id(&self) -> Option<u64> {
        self.decision_tasks
            .iter()
            .rev()
            .filter(|t| !t.state.is_open())
            .find_map(|t| t.started_event_id)
    }

    // --- default resolution -----------------------------------------------

    pub fn task_list(&self) -> SwfResult<String> {
        resolve_default(
            self.options.task_list.as_ref().map(|t| t.name.clone()),
            self.type_defaults.default_task_list.as_ref().map(|t| t.name.clone()),
            || SwfError::DefaultUndefined {
                attribute: "task_list",
            },
        )
    }

    pub fn task_start_to_close_timeout(&self) -> SwfResult<String> {
        resolve_default(
            self.options.task_start_to_close_timeout.clone(),
            self.type_defaults.default_task_start_to_close_timeout.clone(),
            || SwfError::DefaultUndefined {
                attribute: "task_start_to_close_timeout",
            },
        )
    }

    pub fn execution_start_to_close_timeout(&self) -> SwfResult<String> {
        resolve_default(
            self.options.execution_start_to_close_timeout.clone(),
            self.type_defaults.default_execution_start_to_close_timeout.clone(),
            || SwfError::DefaultUndefined {
                attribute: "execution_start_to_close_timeout",
            },
        )
    }

    // --- lifecycle --------------------------------------------------------

    /// Record `WorkflowExecutionStarted` and schedule the first decision task.
    pub fn start(&mut self, domain: &Domain) -> SwfResult<()> {
        self.ensure_open()?;
        let task_list = self.task_list()?;
        let execution_timeout = self.execution_start_to_close_timeout()?;
        let task_timeout = self.task_start_to_close_timeout()?;

        let now = self.now();
        self.start_timestamp = now;
        self.execution_deadline = parse_timeout(&execution_timeout).map(|limit| now + limit);
        self.history.append(
            now,
            EventAttributes::WorkflowExecutionStarted {
                child_policy: self.child_policy,
                execution_start_to_close_timeout: execution_timeout,
                task_list: TaskList::new(task_list),
                task_start_to_close_timeout: task_timeout,
                workflow_type: self.workflow_type.clone(),
                input: self.options.input.clone(),
                tag_list: self.options.tag_list.clone(),
            },
        );
        tracing::info!(
            domain = %self.domain,
            workflow_id = %self.workflow_id,
            run_id = %self.run_id,
            workflow_type = %self.workflow_type,
            "Started workflow execution"
        );
        self.schedule_decision_task_at(domain, now)
    }

    pub fn complete(
        &mut self,
        domain: &Domain,
        decision_task_completed_event_id: u64,
        result: Option<String>,
    ) -> SwfResult<()> {
        let now = self.now();
        self.close_at(
            domain,
            now,
            CloseStatus::Completed,
            EventAttributes::WorkflowExecutionCompleted {
                decision_task_completed_event_id,
                result,
            },
        )
    }

    pub fn fail(
        &mut self,
        domain: &Domain,
        decision_task_completed_event_id: u64,
        reason: Option<String>,
        details: Option<String>,
    ) -> SwfResult<()> {
        let now = self.now();
        self.close_at(
            domain,
            now,
            CloseStatus::Failed,
            EventAttributes::WorkflowExecutionFailed {
                decision_task_completed_event_id,
                reason,
                details,
            },
        )
    }

    pub fn cancel(
        &mut self,
        domain: &Domain,
        decision_task_completed_event_id: u64,
        details: Option<String>,
    ) -> SwfResult<()> {
        let now = self.now();
        self.close_at(
            domain,
            now,
            CloseStatus::Canceled,
            EventAttributes::WorkflowExecutionCanceled {
                decision_task_completed_event_id,
                details,
            },
        )
    }

    /// Operator-initiated close.
    pub fn terminate(
        &mut self,
        domain: &Domain,
        child_policy: Option<ChildPolicy>,
        reason: Option<String>,
        details: Option<String>,
    ) -> SwfResult<()> {
        let now = self.now();
        self.close_at(
            domain,
            now,
            CloseStatus::Terminated,
            EventAttributes::WorkflowExecutionTerminated {
                cause: "OPERATOR_INITIATED".to_string(),
                child_policy: child_policy.unwrap_or(self.child_policy),
                reason,
                details,
            },
        )
    }

    pub fn timeout(&mut self, domain: &Domain, timeout_type: TimeoutType) -> SwfResult<()> {
        let now = self.now();
        self.close_at(
            domain,
            now,
            CloseStatus::TimedOut,
            EventAttributes::WorkflowExecutionTimedOut {
                child_policy: self.child_policy,
                timeout_type,
            },
        )
    }

    /// Deliver a signal and ask the decider to look at it.
    pub fn signal(
        &mut self,
        domain: &Domain,
        signal_name: impl Into<String>,
        input: Option<String>,
    ) -> SwfResult<()> {
        self.ensure_open()?;
        self.ensure_decision_defaults()?;
        let now = self.now();
        let signal_name = signal_name.into();
        tracing::debug!(workflow_id = %self.workflow_id, signal = %signal_name, "Signaled workflow execution");
        self.history.append(
            now,
            EventAttributes::WorkflowExecutionSignaled { signal_name, input },
        );
        self.schedule_decision_task_at(domain, now)
    }

    /// Flag the execution for cancellation. Repeated requests are ignored.
    pub fn request_cancel(&mut self, domain: &Domain, cause: Option<String>) -> SwfResult<()> {
        self.ensure_open()?;
        if self.cancel_requested {
            return Ok(());
        }
        self.ensure_decision_defaults()?;
        let now = self.now();
        self.cancel_requested = true;
        self.history
            .append(now, EventAttributes::WorkflowExecutionCancelRequested { cause });
        self.schedule_decision_task_at(domain, now)
    }

    // --- projections ------------------------------------------------------

    pub fn to_short(&self) -> ExecutionKey {
        self.key()
    }

    pub fn to_medium(&self) -> ExecutionInfo {
        ExecutionInfo {
            execution: self.key(),
            workflow_type: self.workflow_type.clone(),
            start_timestamp: epoch_seconds(self.start_timestamp),
            execution_status: self.status,
            cancel_requested: self.cancel_requested,
            tag_list: self.options.tag_list.clone(),
            close_status: self.close_status,
            close_timestamp: self.close_timestamp.map(epoch_seconds),
        }
    }

    pub fn to_full(&self) -> ExecutionDetail {
        ExecutionDetail {
            execution_info: self.to_medium(),
            execution_configuration: ExecutionConfiguration {
                child_policy: self.child_policy,
                execution_start_to_close_timeout: self.execution_start_to_close_timeout().ok(),
                task_list: self.task_list().ok().map(TaskList::new),
                task_start_to_close_timeout: self.task_start_to_close_timeout().ok(),
            },
            open_counts: self.open_counts,
            latest_execution_context: self.latest_execution_context.clone(),
            latest_activity_task_timestamp: self.latest_activity_task_timestamp.map(epoch_seconds),
        }
    }

    // --- internals --------------------------------------------------------

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Direct operations on a closed execution fail with `ClosedExecution`.
    fn ensure_open(&self) -> SwfResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SwfError::ClosedExecution {
                workflow_id: self.workflow_id.clone(),
                run_id: self.run_id.clone(),
            })
        }
    }

    /// Task-token operations on a closed execution see an unknown resource.
    /// Events that ask for a decision must not be recorded when no decision
    /// task could be scheduled for them.
    fn ensure_decision_defaults(&self) -> SwfResult<()> {
        self.task_list()?;
        self.task_start_to_close_timeout()?;
        Ok(())
    }

    fn ensure_open_for_task(&self) -> SwfResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(SwfError::unknown("execution", self.key().to_string()))
        }
    }

    fn close_at(
        &mut self,
        domain: &Domain,
        at: DateTime<Utc>,
        close_status: CloseStatus,
        attributes: EventAttributes,
    ) -> SwfResult<()> {
        self.ensure_open()?;
        debug_assert!(attributes.event_type().is_close());

        self.history.append(at, attributes);
        self.status = ExecutionStatus::Closed;
        self.close_status = Some(close_status);
        self.close_timestamp = self.history.last().map(|e| e.event_timestamp);
        self.withdraw_pending_tasks(domain);
        tracing::info!(
            domain = %self.domain,
            workflow_id = %self.workflow_id,
            run_id = %self.run_id,
            close_status = %close_status,
            "Closed workflow execution"
        );
        Ok(())
    }

    /// Remove every still-scheduled task of this execution from the queues.
    fn withdraw_pending_tasks(&self, domain: &Domain) {
        for task in self.decision_tasks.iter().filter(|t| t.state == TaskState::Scheduled) {
            domain.decision_queues.remove(&task.task_list, &task.task_token);
        }
        for task in self.activity_tasks.iter().filter(|t| t.state == TaskState::Scheduled) {
            domain.activity_queues.remove(&task.task_list, &task.task_token);
        }
    }
}

impl fmt::Display for WorkflowExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WorkflowExecution(run_id: {})", self.run_id)
    }
}
