//! In-process workflow orchestration engine with SWF decision/activity semantics.
//!
//! This crate provides:
//! - Domains with versioned workflow and activity type registries
//! - Event-sourced workflow executions with an append-only history
//! - Decision and activity task lifecycles with task-list queues
//! - Timers, markers, cancellation requests and timeout detection
//! - Long-polling for deciders and activity workers
//!
//! # Architecture
//!
//! A [`WorkflowService`] owns the domains. Each [`Domain`] owns its
//! executions, keyed by workflow id and run id, plus the queues of pending
//! task tokens. A [`WorkflowExecution`] records every transition as a
//! [`HistoryEvent`]; its open counts and task states are derived from that
//! history and can be rebuilt with [`replay`].
//!
//! Time comes from a [`Clock`]. Timeouts are detected by comparing stored
//! timestamps with the clock whenever an execution is touched or
//! [`WorkflowService::sweep_timeouts`] runs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use swf_engine::prelude::*;
//!
//! let service = WorkflowService::default();
//! service.register_domain("orders", "30", None)?;
//! service.register_workflow_type("orders", TypeKey::new("fulfil", "v1"), config, None)?;
//!
//! let run_id = service.start_workflow_execution("orders", "order-42", &key, StartOptions::default())?;
//! if let Some(task) = service.poll_for_decision_task("orders", "deciders", Some("decider-1"), false).await? {
//!     service.respond_decision_task_completed(&task.task_token, &decisions, None)?;
//! }
//! ```

pub mod clock;
pub mod config;
pub mod decisions;
pub mod defaults;
pub mod domain;
pub mod error;
pub mod execution;
pub mod history;
pub mod replay;
pub mod service;
pub mod task_list;
pub mod tasks;
pub mod types;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use decisions::Decision;
pub use domain::{Domain, ExecutionKey};
pub use error::{SwfError, SwfResult};
pub use execution::{CloseStatus, ExecutionStatus, OpenCounts, StartOptions, WorkflowExecution};
pub use history::{EventAttributes, EventType, FailureCause, HistoryEvent, TimeoutType};
pub use replay::{replay, ReplayError, ReplayedState};
pub use service::WorkflowService;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::EngineConfig;
    pub use crate::decisions::{parse_decisions, Decision, ScheduleActivityTaskAttributes};
    pub use crate::domain::{Domain, ExecutionKey};
    pub use crate::error::{SwfError, SwfResult};
    pub use crate::execution::{CloseStatus, ExecutionStatus, StartOptions, WorkflowExecution};
    pub use crate::history::{EventAttributes, EventType, FailureCause, HistoryEvent};
    pub use crate::service::{ActivityTaskInfo, DecisionTaskInfo, ExecutionFilter, WorkflowService};
    pub use crate::tasks::TaskState;
    pub use crate::types::{
        ActivityTypeConfig, ChildPolicy, RegistrationStatus, TaskList, TypeKey, WorkflowTypeConfig,
    };
}
