//! The service facade: every externally visible operation of the engine.
//!
//! `WorkflowService` resolves names to domains, tokens to executions, takes
//! the execution lock and delegates to [`WorkflowExecution`]. Locks are taken
//! in a fixed order (domain map, execution map, execution, then leaf locks)
//! and none is held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::decisions::parse_decisions;
use crate::domain::{Domain, DomainDetail, DomainInfo, ExecutionHandle, ExecutionKey};
use crate::error::{SwfError, SwfResult};
use crate::execution::{CloseStatus, ExecutionDetail, ExecutionInfo, StartOptions, WorkflowExecution};
use crate::history::{HistoryEvent, HistoryPage};
use crate::task_list::TaskQueues;
use crate::types::{
    ActivityType, ActivityTypeConfig, ChildPolicy, RegistrationStatus, TypeKey, WorkflowType,
    WorkflowTypeConfig,
};

/// A decision task handed to a decider, with the first page of history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionTaskInfo {
    pub task_token: String,
    pub started_event_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_started_event_id: Option<u64>,
    pub workflow_execution: ExecutionKey,
    pub workflow_type: TypeKey,
    #[serde(skip)]
    pub events: Vec<HistoryEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl DecisionTaskInfo {
    /// Wire shape, with events rendered as history event objects.
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(fields) = &mut value {
            fields.insert(
                "events".into(),
                Value::Array(self.events.iter().map(HistoryEvent::to_value).collect()),
            );
        }
        value
    }
}

/// An activity task handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTaskInfo {
    pub task_token: String,
    pub activity_id: String,
    pub started_event_id: u64,
    pub workflow_execution: ExecutionKey,
    pub activity_type: TypeKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
}

/// Filter on a workflow type: name, optionally pinned to a version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeFilter {
    pub name: String,
    pub version: Option<String>,
}

/// Criteria for listing executions. Unset criteria match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionFilter {
    pub workflow_id: Option<String>,
    pub workflow_type: Option<TypeFilter>,
    pub tag: Option<String>,
    pub close_status: Option<CloseStatus>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    /// Oldest first instead of newest first.
    pub reverse_order: bool,
}

impl ExecutionFilter {
    fn matches(&self, execution: &WorkflowExecution) -> bool {
        if self.workflow_id.as_deref().is_some_and(|id| id != execution.workflow_id()) {
            return false;
        }
        if let Some(filter) = &self.workflow_type {
            let key = execution.workflow_type();
            if filter.name != key.name || filter.version.as_ref().is_some_and(|v| *v != key.version) {
                return false;
            }
        }
        if let Some(tag) = &self.tag {
            if !execution.tag_list().contains(tag) {
                return false;
            }
        }
        if self.close_status.is_some() && self.close_status != execution.close_status() {
            return false;
        }
        let started = execution.start_timestamp();
        if self.started_after.is_some_and(|after| started < after) {
            return false;
        }
        if self.started_before.is_some_and(|before| started > before) {
            return false;
        }
        true
    }
}

/// In-process workflow service.
#[derive(Debug)]
pub struct WorkflowService {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    domains: RwLock<HashMap<String, Arc<Domain>>>,
}

impl Default for WorkflowService {
    fn default() -> Self {
        Self::new(EngineConfig::default(), Arc::new(SystemClock))
    }
}

impl WorkflowService {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            domains: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    // --- domains ----------------------------------------------------------

    pub fn register_domain(
        &self,
        name: &str,
        retention_period_days: &str,
        description: Option<String>,
    ) -> SwfResult<()> {
        let mut domains = self.domains.write();
        if domains.contains_key(name) {
            return Err(SwfError::DomainAlreadyExists(name.to_string()));
        }
        domains.insert(
            name.to_string(),
            Arc::new(Domain::new(name, retention_period_days, description)),
        );
        tracing::info!(domain = name, "Registered domain");
        Ok(())
    }

    pub fn deprecate_domain(&self, name: &str) -> SwfResult<()> {
        self.domain(name)?.deprecate()
    }

    pub fn describe_domain(&self, name: &str) -> SwfResult<DomainDetail> {
        Ok(self.domain(name)?.detail())
    }

    /// Domains with the given status, sorted by name.
    pub fn list_domains(&self, status: RegistrationStatus, reverse_order: bool) -> Vec<DomainInfo> {
        let mut listed: Vec<_> = self
            .domains
            .read()
            .values()
            .filter(|d| d.status() == status)
            .map(|d| d.info())
            .collect();
        listed.sort_by(|a, b| a.name.cmp(&b.name));
        if reverse_order {
            listed.reverse();
        }
        listed
    }

    pub fn domain(&self, name: &str) -> SwfResult<Arc<Domain>> {
        self.domains
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| SwfError::unknown("domain", name))
    }

    // --- types ------------------------------------------------------------

    pub fn register_workflow_type(
        &self,
        domain: &str,
        key: TypeKey,
        config: WorkflowTypeConfig,
        description: Option<String>,
    ) -> SwfResult<()> {
        let domain = self.domain(domain)?;
        domain.ensure_registered()?;
        domain
            .workflow_types
            .register(WorkflowType::new(key, config, description, self.clock.now()))
    }

    pub fn deprecate_workflow_type(&self, domain: &str, key: &TypeKey) -> SwfResult<()> {
        self.domain(domain)?.workflow_types.deprecate(key, self.clock.now())
    }

    pub fn describe_workflow_type(&self, domain: &str, key: &TypeKey) -> SwfResult<WorkflowType> {
        self.domain(domain)?.workflow_types.get(key)
    }

    pub fn list_workflow_types(
        &self,
        domain: &str,
        status: RegistrationStatus,
        reverse_order: bool,
    ) -> SwfResult<Vec<WorkflowType>> {
        Ok(self.domain(domain)?.workflow_types.list(status, reverse_order))
    }

    pub fn register_activity_type(
        &self,
        domain: &str,
        key: TypeKey,
        config: ActivityTypeConfig,
        description: Option<String>,
    ) -> SwfResult<()> {
        let domain = self.domain(domain)?;
        domain.ensure_registered()?;
        domain
            .activity_types
            .register(ActivityType::new(key, config, description, self.clock.now()))
    }

    pub fn deprecate_activity_type(&self, domain: &str, key: &TypeKey) -> SwfResult<()> {
        self.domain(domain)?.activity_types.deprecate(key, self.clock.now())
    }

    pub fn describe_activity_type(&self, domain: &str, key: &TypeKey) -> SwfResult<ActivityType> {
        self.domain(domain)?.activity_types.get(key)
    }

    pub fn list_activity_types(
        &self,
        domain: &str,
        status: RegistrationStatus,
        reverse_order: bool,
    ) -> SwfResult<Vec<ActivityType>> {
        Ok(self.domain(domain)?.activity_types.list(status, reverse_order))
    }

    // --- executions -------------------------------------------------------

    /// Start a new execution and return its run id.
    pub fn start_workflow_execution(
        &self,
        domain: &str,
        workflow_id: &str,
        workflow_type: &TypeKey,
        options: StartOptions,
    ) -> SwfResult<String> {
        let domain = self.domain(domain)?;
        domain.ensure_registered()?;
        let registered = domain.workflow_types.get(workflow_type)?;
        if registered.is_deprecated() {
            return Err(SwfError::TypeDeprecated {
                kind: "workflow type",
                key: workflow_type.clone(),
            });
        }

        let handle = domain.insert_unique_execution(workflow_id, || {
            let mut execution = WorkflowExecution::new(
                &domain,
                &registered,
                workflow_id,
                options,
                Arc::clone(&self.clock),
            )?;
            execution.start(&domain)?;
            Ok(execution)
        })?;
        let run_id = handle.lock().run_id().to_string();
        Ok(run_id)
    }

    pub fn signal_workflow_execution(
        &self,
        domain: &str,
        workflow_id: &str,
        run_id: Option<&str>,
        signal_name: &str,
        input: Option<String>,
    ) -> SwfResult<()> {
        let domain = self.domain(domain)?;
        let handle = domain.find_execution(workflow_id, run_id)?;
        let mut execution = handle.lock();
        execution.process_timeouts(&domain)?;
        execution.signal(&domain, signal_name, input)
    }

    pub fn request_cancel_workflow_execution(
        &self,
        domain: &str,
        workflow_id: &str,
        run_id: Option<&str>,
    ) -> SwfResult<()> {
        let domain = self.domain(domain)?;
        let handle = domain.find_execution(workflow_id, run_id)?;
        let mut execution = handle.lock();
        execution.process_timeouts(&domain)?;
        execution.request_cancel(&domain, None)
    }

    pub fn terminate_workflow_execution(
        &self,
        domain: &str,
        workflow_id: &str,
        run_id: Option<&str>,
        child_policy: Option<ChildPolicy>,
        reason: Option<String>,
        details: Option<String>,
    ) -> SwfResult<()> {
        let domain = self.domain(domain)?;
        let handle = domain.find_execution(workflow_id, run_id)?;
        let mut execution = handle.lock();
        execution.process_timeouts(&domain)?;
        execution.terminate(&domain, child_policy, reason, details)
    }

    pub fn describe_workflow_execution(
        &self,
        domain: &str,
        workflow_id: &str,
        run_id: &str,
    ) -> SwfResult<ExecutionDetail> {
        let domain = self.domain(domain)?;
        let handle = domain.execution(&ExecutionKey::new(workflow_id, run_id))?;
        let mut execution = handle.lock();
        execution.process_timeouts(&domain)?;
        Ok(execution.to_full())
    }

    pub fn list_open_workflow_executions(
        &self,
        domain: &str,
        filter: &ExecutionFilter,
    ) -> SwfResult<Vec<ExecutionInfo>> {
        self.list_executions(domain, filter, true)
    }

    pub fn list_closed_workflow_executions(
        &self,
        domain: &str,
        filter: &ExecutionFilter,
    ) -> SwfResult<Vec<ExecutionInfo>> {
        self.list_executions(domain, filter, false)
    }

    fn list_executions(
        &self,
        domain: &str,
        filter: &ExecutionFilter,
        open: bool,
    ) -> SwfResult<Vec<ExecutionInfo>> {
        let domain = self.domain(domain)?;
        let mut listed = Vec::new();
        for handle in domain.executions() {
            let mut execution = handle.lock();
            execution.process_timeouts(&domain)?;
            if execution.is_open() == open && filter.matches(&execution) {
                listed.push(execution.to_medium());
            }
        }
        listed.sort_by(|a, b| {
            b.start_timestamp
                .total_cmp(&a.start_timestamp)
                .then_with(|| a.execution.cmp(&b.execution))
        });
        if filter.reverse_order {
            listed.reverse();
        }
        Ok(listed)
    }

    pub fn count_pending_decision_tasks(&self, domain: &str, task_list: &str) -> SwfResult<usize> {
        Ok(self.domain(domain)?.decision_queues.pending_count(task_list))
    }

    pub fn count_pending_activity_tasks(&self, domain: &str, task_list: &str) -> SwfResult<usize> {
        Ok(self.domain(domain)?.activity_queues.pending_count(task_list))
    }

    pub fn get_workflow_execution_history(
        &self,
        domain: &str,
        workflow_id: &str,
        run_id: &str,
        reverse_order: bool,
        maximum_page_size: Option<usize>,
        next_page_token: Option<&str>,
    ) -> SwfResult<HistoryPage> {
        let domain = self.domain(domain)?;
        let handle = domain.execution(&ExecutionKey::new(workflow_id, run_id))?;
        let mut execution = handle.lock();
        execution.process_timeouts(&domain)?;
        execution.history().page(
            reverse_order,
            self.config.page_size(maximum_page_size),
            next_page_token,
        )
    }

    // --- polling ----------------------------------------------------------

    /// Claim the oldest pending decision task of a task list, if any.
    pub fn try_poll_for_decision_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: Option<&str>,
        reverse_order: bool,
    ) -> SwfResult<Option<DecisionTaskInfo>> {
        let domain = self.domain(domain)?;
        self.claim_decision_task(&domain, task_list, identity, reverse_order)
    }

    /// Long-poll for a decision task; `Ok(None)` when the poll timeout elapses.
    pub async fn poll_for_decision_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: Option<&str>,
        reverse_order: bool,
    ) -> SwfResult<Option<DecisionTaskInfo>> {
        let domain = self.domain(domain)?;
        let deadline = Instant::now() + self.config.poll_timeout();
        long_poll(&domain.decision_queues, deadline, || {
            self.claim_decision_task(&domain, task_list, identity, reverse_order)
        })
        .await
    }

    pub fn try_poll_for_activity_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: Option<&str>,
    ) -> SwfResult<Option<ActivityTaskInfo>> {
        let domain = self.domain(domain)?;
        self.claim_activity_task(&domain, task_list, identity)
    }

    /// Long-poll for an activity task; `Ok(None)` when the poll timeout elapses.
    pub async fn poll_for_activity_task(
        &self,
        domain: &str,
        task_list: &str,
        identity: Option<&str>,
    ) -> SwfResult<Option<ActivityTaskInfo>> {
        let domain = self.domain(domain)?;
        let deadline = Instant::now() + self.config.poll_timeout();
        long_poll(&domain.activity_queues, deadline, || {
            self.claim_activity_task(&domain, task_list, identity)
        })
        .await
    }

    fn claim_decision_task(
        &self,
        domain: &Domain,
        task_list: &str,
        identity: Option<&str>,
        reverse_order: bool,
    ) -> SwfResult<Option<DecisionTaskInfo>> {
        while let Some(pending) = domain.decision_queues.peek(task_list) {
            let Ok(handle) = domain.execution(&pending.execution) else {
                domain.decision_queues.remove(task_list, &pending.task_token);
                continue;
            };
            let mut execution = handle.lock();
            execution.process_timeouts(domain)?;
            match execution.start_decision_task(domain, &pending.task_token, identity.map(str::to_string)) {
                Ok(()) => {
                    let task = execution
                        .decision_task(&pending.task_token)
                        .ok_or_else(|| SwfError::validation("Claimed decision task vanished"))?;
                    let started_event_id = task.started_event_id.unwrap_or_default();
                    let page = execution.history().page(
                        reverse_order,
                        self.config.page_size(None),
                        None,
                    )?;
                    return Ok(Some(DecisionTaskInfo {
                        task_token: pending.task_token,
                        started_event_id,
                        previous_started_event_id: execution.previous_started_event_id(),
                        workflow_execution: execution.key(),
                        workflow_type: execution.workflow_type().clone(),
                        events: page.events,
                        next_page_token: page.next_page_token,
                    }));
                }
                Err(e) => {
                    tracing::warn!(task_token = %pending.task_token, error = %e, "Dropping stale decision task");
                    domain.decision_queues.remove(task_list, &pending.task_token);
                }
            }
        }
        Ok(None)
    }

    fn claim_activity_task(
        &self,
        domain: &Domain,
        task_list: &str,
        identity: Option<&str>,
    ) -> SwfResult<Option<ActivityTaskInfo>> {
        while let Some(pending) = domain.activity_queues.peek(task_list) {
            let Ok(handle) = domain.execution(&pending.execution) else {
                domain.activity_queues.remove(task_list, &pending.task_token);
                continue;
            };
            let mut execution = handle.lock();
            execution.process_timeouts(domain)?;
            match execution.start_activity_task(domain, &pending.task_token, identity.map(str::to_string)) {
                Ok(()) => {
                    let task = execution
                        .activity_task(&pending.task_token)
                        .ok_or_else(|| SwfError::validation("Claimed activity task vanished"))?;
                    return Ok(Some(ActivityTaskInfo {
                        task_token: pending.task_token.clone(),
                        activity_id: task.activity_id.clone(),
                        started_event_id: task.started_event_id.unwrap_or_default(),
                        workflow_execution: execution.key(),
                        activity_type: task.activity_type.clone(),
                        input: task.input.clone(),
                    }));
                }
                Err(e) => {
                    tracing::warn!(task_token = %pending.task_token, error = %e, "Dropping stale activity task");
                    domain.activity_queues.remove(task_list, &pending.task_token);
                }
            }
        }
        Ok(None)
    }

    // --- task responses ---------------------------------------------------

    pub fn respond_decision_task_completed(
        &self,
        task_token: &str,
        decisions: &[Value],
        execution_context: Option<String>,
    ) -> SwfResult<()> {
        self.with_task_execution(task_token, |domain, execution| {
            execution.started_decision_task(task_token)?;
            let decisions = parse_decisions(decisions)?;
            execution.complete_decision_task(domain, task_token, decisions, execution_context)
        })
    }

    pub fn respond_activity_task_completed(&self, task_token: &str, result: Option<String>) -> SwfResult<()> {
        self.with_task_execution(task_token, |domain, execution| {
            execution.complete_activity_task(domain, task_token, result)
        })
    }

    pub fn respond_activity_task_failed(
        &self,
        task_token: &str,
        reason: Option<String>,
        details: Option<String>,
    ) -> SwfResult<()> {
        self.with_task_execution(task_token, |domain, execution| {
            execution.fail_activity_task(domain, task_token, reason, details)
        })
    }

    pub fn respond_activity_task_canceled(&self, task_token: &str, details: Option<String>) -> SwfResult<()> {
        self.with_task_execution(task_token, |domain, execution| {
            execution.cancel_activity_task(domain, task_token, details)
        })
    }

    /// Returns whether cancellation of the activity has been requested.
    pub fn record_activity_task_heartbeat(&self, task_token: &str, details: Option<String>) -> SwfResult<bool> {
        self.with_task_execution(task_token, |_, execution| {
            execution.record_activity_task_heartbeat(task_token, details)
        })
    }

    /// Run `op` on the execution owning a task token, after applying its due
    /// timeouts.
    fn with_task_execution<T>(
        &self,
        task_token: &str,
        op: impl FnOnce(&Domain, &mut WorkflowExecution) -> SwfResult<T>,
    ) -> SwfResult<T> {
        let (domain, handle) = self.execution_for_token(task_token)?;
        let mut execution = handle.lock();
        execution.process_timeouts(&domain)?;
        op(&domain, &mut execution)
    }

    fn execution_for_token(&self, task_token: &str) -> SwfResult<(Arc<Domain>, ExecutionHandle)> {
        let domains: Vec<_> = self.domains.read().values().cloned().collect();
        for domain in domains {
            if let Some(key) = domain.execution_key_for_token(task_token) {
                let handle = domain.execution(&key)?;
                return Ok((domain, handle));
            }
        }
        Err(SwfError::validation(format!("Invalid task token: {task_token}")))
    }

    // --- timeouts ---------------------------------------------------------

    /// Apply due timeouts across every execution. Returns how many fired.
    pub fn sweep_timeouts(&self) -> usize {
        let domains: Vec<_> = self.domains.read().values().cloned().collect();
        let mut applied = 0;
        for domain in domains {
            for handle in domain.executions() {
                let mut execution = handle.lock();
                if !execution.is_open() {
                    continue;
                }
                match execution.process_timeouts(&domain) {
                    Ok(count) => applied += count,
                    Err(e) => tracing::warn!(
                        domain = %domain.name(),
                        workflow_id = %execution.workflow_id(),
                        error = %e,
                        "Failed to apply timeouts"
                    ),
                }
            }
        }
        if applied > 0 {
            tracing::debug!(applied, "Applied timeouts");
        }
        applied
    }
}

/// Retry `claim` each time `queues` is fed until it yields or `deadline` passes.
async fn long_poll<T>(
    queues: &TaskQueues,
    deadline: Instant,
    mut claim: impl FnMut() -> SwfResult<Option<T>>,
) -> SwfResult<Option<T>> {
    loop {
        let notified = queues.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(task) = claim()? {
            return Ok(Some(task));
        }
        if tokio::time::timeout_at(deadline, notified).await.is_err() {
            return Ok(None);
        }
    }
}
