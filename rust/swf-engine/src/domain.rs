//! Domains: the namespace owning types, executions and task-list queues.
//!
//! The domain is the arena of the engine. It owns every execution of the
//! namespace, keyed by [`ExecutionKey`]; executions refer back to their
//! domain and type by name only and receive `&Domain` when they need it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::error::{SwfError, SwfResult};
use crate::execution::WorkflowExecution;
use crate::task_list::{PendingTask, TaskQueues};
use crate::types::{ActivityTypeConfig, RegistrationStatus, TypeRegistry, WorkflowTypeConfig};

/// Identity of one execution within a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionKey {
    pub workflow_id: String,
    pub run_id: String,
}

impl ExecutionKey {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }
}

impl fmt::Display for ExecutionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WorkflowExecution(workflow_id: {}, run_id: {})",
            self.workflow_id, self.run_id
        )
    }
}

/// Shared handle to an execution; the mutex is the execution's only lock.
pub type ExecutionHandle = Arc<Mutex<WorkflowExecution>>;

/// `domainInfo` projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainInfo {
    pub name: String,
    pub status: RegistrationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfiguration {
    pub workflow_execution_retention_period_in_days: String,
}

/// Full domain description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainDetail {
    pub domain_info: DomainInfo,
    pub configuration: DomainConfiguration,
}

/// A registered domain.
#[derive(Debug)]
pub struct Domain {
    name: String,
    description: Option<String>,
    retention_period_days: String,
    status: RwLock<RegistrationStatus>,
    pub workflow_types: TypeRegistry<WorkflowTypeConfig>,
    pub activity_types: TypeRegistry<ActivityTypeConfig>,
    pub decision_queues: TaskQueues,
    pub activity_queues: TaskQueues,
    executions: RwLock<HashMap<ExecutionKey, ExecutionHandle>>,
    tokens: Mutex<HashMap<String, ExecutionKey>>,
}

impl Domain {
    pub fn new(
        name: impl Into<String>,
        retention_period_days: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description,
            retention_period_days: retention_period_days.into(),
            status: RwLock::new(RegistrationStatus::Registered),
            workflow_types: TypeRegistry::new(),
            activity_types: TypeRegistry::new(),
            decision_queues: TaskQueues::new(),
            activity_queues: TaskQueues::new(),
            executions: RwLock::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> RegistrationStatus {
        *self.status.read()
    }

    pub fn retention_period_days(&self) -> &str {
        &self.retention_period_days
    }

    pub fn deprecate(&self) -> SwfResult<()> {
        let mut status = self.status.write();
        if *status == RegistrationStatus::Deprecated {
            return Err(SwfError::DomainDeprecated(self.name.clone()));
        }
        *status = RegistrationStatus::Deprecated;
        tracing::info!(domain = %self.name, "Deprecated domain");
        Ok(())
    }

    /// Fail with `DomainDeprecated` unless the domain accepts new work.
    pub fn ensure_registered(&self) -> SwfResult<()> {
        match self.status() {
            RegistrationStatus::Registered => Ok(()),
            RegistrationStatus::Deprecated => Err(SwfError::DomainDeprecated(self.name.clone())),
        }
    }

    pub fn info(&self) -> DomainInfo {
        DomainInfo {
            name: self.name.clone(),
            status: self.status(),
            description: self.description.clone(),
        }
    }

    pub fn detail(&self) -> DomainDetail {
        DomainDetail {
            domain_info: self.info(),
            configuration: DomainConfiguration {
                workflow_execution_retention_period_in_days: self.retention_period_days.clone(),
            },
        }
    }

    // --- executions -------------------------------------------------------

    /// Insert an execution built by `build` unless an open execution with the
    /// same workflow id exists. The map stays locked across the check and the
    /// insert.
    pub fn insert_unique_execution(
        &self,
        workflow_id: &str,
        build: impl FnOnce() -> SwfResult<WorkflowExecution>,
    ) -> SwfResult<ExecutionHandle> {
        let mut executions = self.executions.write();
        let already_open = executions
            .iter()
            .filter(|(key, _)| key.workflow_id == workflow_id)
            .any(|(_, handle)| handle.lock().is_open());
        if already_open {
            return Err(SwfError::WorkflowExecutionAlreadyStarted {
                workflow_id: workflow_id.to_string(),
            });
        }

        let execution = build()?;
        let key = execution.key();
        let handle = Arc::new(Mutex::new(execution));
        executions.insert(key, Arc::clone(&handle));
        Ok(handle)
    }

    pub fn execution(&self, key: &ExecutionKey) -> SwfResult<ExecutionHandle> {
        self.executions
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| SwfError::unknown("execution", key.to_string()))
    }

    /// Resolve an execution by workflow id and optional run id. Without a run
    /// id the open execution of that workflow id is returned.
    pub fn find_execution(&self, workflow_id: &str, run_id: Option<&str>) -> SwfResult<ExecutionHandle> {
        if let Some(run_id) = run_id {
            return self.execution(&ExecutionKey::new(workflow_id, run_id));
        }
        self.executions
            .read()
            .iter()
            .filter(|(key, _)| key.workflow_id == workflow_id)
            .find(|(_, handle)| handle.lock().is_open())
            .map(|(_, handle)| Arc::clone(handle))
            .ok_or_else(|| {
                SwfError::unknown("execution", format!("WorkflowExecution(workflow_id: {workflow_id})"))
            })
    }

    /// Snapshot of every execution handle.
    pub fn executions(&self) -> Vec<ExecutionHandle> {
        self.executions.read().values().cloned().collect()
    }

    // --- task tokens ------------------------------------------------------

    /// Record which execution owns a task token.
    pub(crate) fn index_token(&self, task_token: &str, execution: &ExecutionKey) {
        self.tokens
            .lock()
            .insert(task_token.to_string(), execution.clone());
    }

    pub fn execution_key_for_token(&self, task_token: &str) -> Option<ExecutionKey> {
        self.tokens.lock().get(task_token).cloned()
    }

    pub(crate) fn enqueue_decision_task(&self, task_list: &str, task_token: &str, execution: &ExecutionKey) {
        self.index_token(task_token, execution);
        self.decision_queues.enqueue(
            task_list,
            PendingTask {
                task_token: task_token.to_string(),
                execution: execution.clone(),
            },
        );
    }

    pub(crate) fn enqueue_activity_task(&self, task_list: &str, task_token: &str, execution: &ExecutionKey) {
        self.index_token(task_token, execution);
        self.activity_queues.enqueue(
            task_list,
            PendingTask {
                task_token: task_token.to_string(),
                execution: execution.clone(),
            },
        );
    }
}
