//! Shared fixtures for integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use swf_engine::clock::{Clock, ManualClock};
use swf_engine::config::EngineConfig;
use swf_engine::decisions::ScheduleActivityTaskAttributes;
use swf_engine::domain::Domain;
use swf_engine::execution::{StartOptions, WorkflowExecution};
use swf_engine::service::WorkflowService;
use swf_engine::types::{
    ActivityType, ActivityTypeConfig, ChildPolicy, TaskList, TypeKey, WorkflowType, WorkflowTypeConfig,
};

pub const DOMAIN: &str = "test-domain";

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2015, 1, 1, 12, 0, 0).unwrap(),
    ))
}

/// Domain with `test-activity` v1.1 registered without defaults.
pub fn basic_domain() -> Domain {
    let domain = Domain::new(DOMAIN, "90", None);
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

pub fn workflow_type_config() -> WorkflowTypeConfig {
    WorkflowTypeConfig {
        default_task_list: Some(TaskList::new("queue")),
        default_child_policy: Some(ChildPolicy::Abandon),
        default_execution_start_to_close_timeout: Some("300".into()),
        default_task_start_to_close_timeout: Some("300".into()),
    }
}

pub fn basic_workflow_type() -> WorkflowType {
    WorkflowType::new(
        TypeKey::new("test-workflow", "v1.0"),
        workflow_type_config(),
        None,
        Utc.with_ymd_and_hms(2015, 1, 1, 0, 0, 0).unwrap(),
    )
}

pub fn make_execution(domain: &Domain, clock: Arc<ManualClock>) -> WorkflowExecution {
    WorkflowExecution::new(
        domain,
        &basic_workflow_type(),
        "ab1234",
        StartOptions {
            child_policy: Some(ChildPolicy::Terminate),
            ..Default::default()
        },
        clock as Arc<dyn Clock>,
    )
    .unwrap()
}

/// Fully specified attributes for `test-activity` v1.1.
pub fn valid_activity_attributes() -> ScheduleActivityTaskAttributes {
    ScheduleActivityTaskAttributes {
        task_list: Some(TaskList::new("task-list-name")),
        schedule_to_start_timeout: Some("600".into()),
        schedule_to_close_timeout: Some("600".into()),
        start_to_close_timeout: Some("600".into()),
        heartbeat_timeout: Some("300".into()),
        ..ScheduleActivityTaskAttributes::new("my-activity-001", TypeKey::new("test-activity", "v1.1"))
    }
}

/// Service with one domain, `test-workflow` v1.0 and `test-activity` v1.1.
pub fn service(clock: Arc<ManualClock>, config: EngineConfig) -> WorkflowService {
    let service = WorkflowService::new(config, clock as Arc<dyn Clock>);
    service.register_domain(DOMAIN, "90", None).unwrap();
    service
        .register_workflow_type(
            DOMAIN,
            TypeKey::new("test-workflow", "v1.0"),
            workflow_type_config(),
            None,
        )
        .unwrap();
    service
        .register_activity_type(
            DOMAIN,
            TypeKey::new("test-activity", "v1.1"),
            ActivityTypeConfig {
                default_task_list: Some(TaskList::new("activities")),
                default_task_schedule_to_start_timeout: Some("600".into()),
                default_task_schedule_to_close_timeout: Some("600".into()),
                default_task_start_to_close_timeout: Some("300".into()),
                default_task_heartbeat_timeout: Some("NONE".into()),
            },
            None,
        )
        .unwrap();
    service
}
