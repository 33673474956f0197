//! Domains and types registered when the daemon starts.
//!
//! ```toml
//! [[bootstrap.domains]]
//! name = "orders"
//! retention_period_days = "30"
//!
//! [[bootstrap.domains.workflow_types]]
//! name = "fulfil"
//! version = "v1"
//! default_task_list = "deciders"
//! default_child_policy = "TERMINATE"
//! default_execution_start_to_close_timeout = "3600"
//! default_task_start_to_close_timeout = "60"
//! ```

use serde::{Deserialize, Serialize};
use swf_engine::types::{ActivityTypeConfig, ChildPolicy, TaskList, TypeKey, WorkflowTypeConfig};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default)]
    pub domains: Vec<DomainSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSeed {
    pub name: String,
    #[serde(default = "default_retention")]
    pub retention_period_days: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workflow_types: Vec<WorkflowTypeSeed>,
    #[serde(default)]
    pub activity_types: Vec<ActivityTypeSeed>,
}

fn default_retention() -> String {
    "30".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowTypeSeed {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_task_list: Option<String>,
    #[serde(default)]
    pub default_child_policy: Option<ChildPolicy>,
    #[serde(default)]
    pub default_execution_start_to_close_timeout: Option<String>,
    #[serde(default)]
    pub default_task_start_to_close_timeout: Option<String>,
}

impl WorkflowTypeSeed {
    pub fn key(&self) -> TypeKey {
        TypeKey::new(&self.name, &self.version)
    }

    pub fn defaults(&self) -> WorkflowTypeConfig {
        WorkflowTypeConfig {
            default_task_list: self.default_task_list.as_deref().map(TaskList::new),
            default_child_policy: self.default_child_policy,
            default_execution_start_to_close_timeout: self.default_execution_start_to_close_timeout.clone(),
            default_task_start_to_close_timeout: self.default_task_start_to_close_timeout.clone(),
        }
    }

    /// Timeout settings with their names, for validation.
    pub(crate) fn timeouts(&self) -> [(&'static str, Option<&str>); 2] {
        [
            (
                "default_execution_start_to_close_timeout",
                self.default_execution_start_to_close_timeout.as_deref(),
            ),
            (
                "default_task_start_to_close_timeout",
                self.default_task_start_to_close_timeout.as_deref(),
            ),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityTypeSeed {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_task_list: Option<String>,
    #[serde(default)]
    pub default_task_schedule_to_start_timeout: Option<String>,
    #[serde(default)]
    pub default_task_schedule_to_close_timeout: Option<String>,
    #[serde(default)]
    pub default_task_start_to_close_timeout: Option<String>,
    #[serde(default)]
    pub default_task_heartbeat_timeout: Option<String>,
}

impl ActivityTypeSeed {
    pub fn key(&self) -> TypeKey {
        TypeKey::new(&self.name, &self.version)
    }

    pub fn defaults(&self) -> ActivityTypeConfig {
        ActivityTypeConfig {
            default_task_list: self.default_task_list.as_deref().map(TaskList::new),
            default_task_schedule_to_start_timeout: self.default_task_schedule_to_start_timeout.clone(),
            default_task_schedule_to_close_timeout: self.default_task_schedule_to_close_timeout.clone(),
            default_task_start_to_close_timeout: self.default_task_start_to_close_timeout.clone(),
            default_task_heartbeat_timeout: self.default_task_heartbeat_timeout.clone(),
        }
    }

    pub(crate) fn timeouts(&self) -> [(&'static str, Option<&str>); 4] {
        [
            (
                "default_task_schedule_to_start_timeout",
                self.default_task_schedule_to_start_timeout.as_deref(),
            ),
            (
                "default_task_schedule_to_close_timeout",
                self.default_task_schedule_to_close_timeout.as_deref(),
            ),
            (
                "default_task_start_to_close_timeout",
                self.default_task_start_to_close_timeout.as_deref(),
            ),
            (
                "default_task_heartbeat_timeout",
                self.default_task_heartbeat_timeout.as_deref(),
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_seed_defaults() {
        let seed = WorkflowTypeSeed {
            name: "fulfil".into(),
            version: "v1".into(),
            description: None,
            default_task_list: Some("deciders".into()),
            default_child_policy: Some(ChildPolicy::Terminate),
            default_execution_start_to_close_timeout: Some("3600".into()),
            default_task_start_to_close_timeout: None,
        };
        assert_eq!(seed.key(), TypeKey::new("fulfil", "v1"));
        let defaults = seed.defaults();
        assert_eq!(defaults.default_task_list, Some(TaskList::new("deciders")));
        assert_eq!(defaults.default_child_policy, Some(ChildPolicy::Terminate));
        assert_eq!(defaults.default_task_start_to_close_timeout, None);
    }
}
