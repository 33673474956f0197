//! Timeout sweeps under a manually driven clock.

mod common;

use std::sync::Arc;

use common::{manual_clock, service, DOMAIN};
use serde_json::json;
use swf_engine::config::EngineConfig;
use swf_engine::execution::{CloseStatus, StartOptions};
use swf_engine::history::{EventAttributes, EventType, TimeoutType};
use swf_engine::replay::replay;
use swf_engine::types::TypeKey;

fn start(service: &swf_engine::WorkflowService, workflow_id: &str, options: StartOptions) -> String {
    service
        .start_workflow_execution(DOMAIN, workflow_id, &TypeKey::new("test-workflow", "v1.0"), options)
        .unwrap()
}

fn event_types(service: &swf_engine::WorkflowService, workflow_id: &str, run_id: &str) -> Vec<EventType> {
    service
        .get_workflow_execution_history(DOMAIN, workflow_id, run_id, false, None, None)
        .unwrap()
        .events
        .iter()
        .map(|e| e.event_type())
        .collect()
}

#[test]
fn test_sweep_times_out_execution() {
    let clock = manual_clock();
    let service = service(Arc::clone(&clock), EngineConfig::default());
    let run_id = start(&service, "uid-1", StartOptions::default());

    clock.advance_secs(299);
    assert_eq!(service.sweep_timeouts(), 0);

    clock.advance_secs(1);
    assert_eq!(service.sweep_timeouts(), 1);
    let detail = service
        .describe_workflow_execution(DOMAIN, "uid-1", &run_id)
        .unwrap();
    assert_eq!(detail.execution_info.close_status, Some(CloseStatus::TimedOut));
    assert_eq!(service.count_pending_decision_tasks(DOMAIN, "queue").unwrap(), 0);

    let history = service
        .get_workflow_execution_history(DOMAIN, "uid-1", &run_id, true, Some(1), None)
        .unwrap();
    assert_eq!(
        history.events[0].attributes,
        EventAttributes::WorkflowExecutionTimedOut {
            child_policy: swf_engine::types::ChildPolicy::Abandon,
            timeout_type: TimeoutType::StartToClose,
        }
    );

    // closed executions are skipped by later sweeps
    clock.advance_secs(3600);
    assert_eq!(service.sweep_timeouts(), 0);
}

#[test]
fn test_started_decision_task_times_out() {
    let clock = manual_clock();
    let service = service(Arc::clone(&clock), EngineConfig::default());
    let run_id = start(
        &service,
        "uid-1",
        StartOptions {
            execution_start_to_close_timeout: Some("3600".into()),
            task_start_to_close_timeout: Some("30".into()),
            ..Default::default()
        },
    );
    let task = service
        .try_poll_for_decision_task(DOMAIN, "queue", None, false)
        .unwrap()
        .unwrap();

    clock.advance_secs(45);
    assert_eq!(service.sweep_timeouts(), 1);
    assert_eq!(
        event_types(&service, "uid-1", &run_id),
        vec![
            EventType::WorkflowExecutionStarted,
            EventType::DecisionTaskScheduled,
            EventType::DecisionTaskStarted,
            EventType::DecisionTaskTimedOut,
            EventType::DecisionTaskScheduled,
        ]
    );
    assert!(service
        .respond_decision_task_completed(&task.task_token, &[], None)
        .is_err());
    assert_eq!(service.count_pending_decision_tasks(DOMAIN, "queue").unwrap(), 1);
}

#[test]
fn test_activity_heartbeat_timeout() {
    let clock = manual_clock();
    let service = service(Arc::clone(&clock), EngineConfig::default());
    let run_id = start(
        &service,
        "uid-1",
        StartOptions {
            execution_start_to_close_timeout: Some("3600".into()),
            ..Default::default()
        },
    );
    let task = service
        .try_poll_for_decision_task(DOMAIN, "queue", None, false)
        .unwrap()
        .unwrap();
    service
        .respond_decision_task_completed(
            &task.task_token,
            &[json!({
                "decisionType": "ScheduleActivityTask",
                "scheduleActivityTaskDecisionAttributes": {
                    "activityId": "a1",
                    "activityType": { "name": "test-activity", "version": "v1.1" },
                    "heartbeatTimeout": "20"
                }
            })],
            None,
        )
        .unwrap();
    let activity = service
        .try_poll_for_activity_task(DOMAIN, "activities", None)
        .unwrap()
        .unwrap();

    clock.advance_secs(15);
    service
        .record_activity_task_heartbeat(&activity.task_token, Some("half".into()))
        .unwrap();
    clock.advance_secs(15);
    assert_eq!(service.sweep_timeouts(), 0);

    clock.advance_secs(10);
    assert_eq!(service.sweep_timeouts(), 1);
    let history = service
        .get_workflow_execution_history(DOMAIN, "uid-1", &run_id, false, None, None)
        .unwrap();
    let timed_out = history
        .events
        .iter()
        .find(|e| e.event_type() == EventType::ActivityTaskTimedOut)
        .unwrap();
    assert!(matches!(
        &timed_out.attributes,
        EventAttributes::ActivityTaskTimedOut {
            timeout_type: TimeoutType::Heartbeat,
            details: Some(details),
            ..
        } if details == "half"
    ));
    assert_eq!(
        history.events.last().map(|e| e.event_type()),
        Some(EventType::DecisionTaskScheduled)
    );
    assert!(service
        .respond_activity_task_completed(&activity.task_token, None)
        .is_err());
}

#[test]
fn test_timer_fires_and_history_replays() {
    let clock = manual_clock();
    let service = service(Arc::clone(&clock), EngineConfig::default());
    let run_id = start(
        &service,
        "uid-1",
        StartOptions {
            execution_start_to_close_timeout: Some("3600".into()),
            ..Default::default()
        },
    );
    let task = service
        .try_poll_for_decision_task(DOMAIN, "queue", None, false)
        .unwrap()
        .unwrap();
    service
        .respond_decision_task_completed(
            &task.task_token,
            &[json!({
                "decisionType": "StartTimer",
                "startTimerDecisionAttributes": { "timerId": "t1", "startToFireTimeout": "60" }
            })],
            None,
        )
        .unwrap();
    let detail = service
        .describe_workflow_execution(DOMAIN, "uid-1", &run_id)
        .unwrap();
    assert_eq!(detail.open_counts.open_timers, 1);

    clock.advance_secs(60);
    // reading the execution applies due timeouts as well
    let detail = service
        .describe_workflow_execution(DOMAIN, "uid-1", &run_id)
        .unwrap();
    assert_eq!(detail.open_counts.open_timers, 0);
    assert_eq!(detail.open_counts.open_decision_tasks, 1);
    assert_eq!(service.sweep_timeouts(), 0);

    let history = service
        .get_workflow_execution_history(DOMAIN, "uid-1", &run_id, false, None, None)
        .unwrap();
    let state = replay(&history.events).unwrap();
    assert_eq!(state.open_counts, detail.open_counts);
    assert!(state.open_timers.is_empty());
}
