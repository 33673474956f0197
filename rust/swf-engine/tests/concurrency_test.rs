//! Many workers and signalers hitting one service from separate threads.

mod common;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use common::{manual_clock, service, DOMAIN};
use parking_lot::Mutex;
use serde_json::json;
use swf_engine::config::EngineConfig;
use swf_engine::execution::StartOptions;
use swf_engine::history::EventType;
use swf_engine::replay::replay;
use swf_engine::types::TypeKey;

const WORKERS: usize = 8;
const EXECUTIONS: usize = 100;

fn workflow_type() -> TypeKey {
    TypeKey::new("test-workflow", "v1.0")
}

fn assert_claimed_once(tokens: &[String], expected: usize) {
    let unique: HashSet<_> = tokens.iter().collect();
    assert_eq!(tokens.len(), expected);
    assert_eq!(unique.len(), expected);
}

#[test]
fn test_each_task_claimed_by_exactly_one_worker() {
    let service = service(manual_clock(), EngineConfig::default());
    for n in 0..EXECUTIONS {
        service
            .start_workflow_execution(DOMAIN, &format!("wf-{n}"), &workflow_type(), StartOptions::default())
            .unwrap();
    }

    let decision_tokens = Mutex::new(Vec::new());
    thread::scope(|scope| {
        for worker in 0..WORKERS {
            let (service, decision_tokens) = (&service, &decision_tokens);
            scope.spawn(move || {
                let identity = format!("decider-{worker}");
                while let Some(task) = service
                    .try_poll_for_decision_task(DOMAIN, "queue", Some(&identity), false)
                    .unwrap()
                {
                    let decision = json!({
                        "decisionType": "ScheduleActivityTask",
                        "scheduleActivityTaskDecisionAttributes": {
                            "activityId": format!("act-{}", task.workflow_execution.workflow_id),
                            "activityType": { "name": "test-activity", "version": "v1.1" }
                        }
                    });
                    service
                        .respond_decision_task_completed(&task.task_token, &[decision], None)
                        .unwrap();
                    decision_tokens.lock().push(task.task_token);
                }
            });
        }
    });
    assert_claimed_once(&decision_tokens.into_inner(), EXECUTIONS);
    assert_eq!(service.count_pending_decision_tasks(DOMAIN, "queue").unwrap(), 0);
    assert_eq!(service.count_pending_activity_tasks(DOMAIN, "activities").unwrap(), EXECUTIONS);

    let activity_tokens = Mutex::new(Vec::new());
    thread::scope(|scope| {
        for worker in 0..WORKERS {
            let (service, activity_tokens) = (&service, &activity_tokens);
            scope.spawn(move || {
                let identity = format!("worker-{worker}");
                while let Some(task) = service
                    .try_poll_for_activity_task(DOMAIN, "activities", Some(&identity))
                    .unwrap()
                {
                    activity_tokens.lock().push(task.task_token);
                }
            });
        }
    });
    assert_claimed_once(&activity_tokens.into_inner(), EXECUTIONS);
    assert_eq!(service.count_pending_activity_tasks(DOMAIN, "activities").unwrap(), 0);
}

#[test]
fn test_concurrent_signals_keep_history_gap_free() {
    const SIGNALERS: usize = 4;
    const SIGNALS: usize = 50;

    let service = service(manual_clock(), EngineConfig::default());
    service
        .start_workflow_execution(DOMAIN, "busy", &workflow_type(), StartOptions::default())
        .unwrap();

    let signals_done = AtomicBool::new(false);
    thread::scope(|scope| {
        let (service, signals_done) = (&service, &signals_done);
        // a decider keeps completing tasks while signals arrive
        scope.spawn(move || {
            while !signals_done.load(Ordering::Acquire) {
                match service
                    .try_poll_for_decision_task(DOMAIN, "queue", Some("decider"), false)
                    .unwrap()
                {
                    Some(task) => service
                        .respond_decision_task_completed(&task.task_token, &[], None)
                        .unwrap(),
                    None => thread::yield_now(),
                }
            }
        });

        let signalers: Vec<_> = (0..SIGNALERS)
            .map(|signaler| {
                scope.spawn(move || {
                    for n in 0..SIGNALS {
                        service
                            .signal_workflow_execution(DOMAIN, "busy", None, &format!("s{signaler}-{n}"), None)
                            .unwrap();
                    }
                })
            })
            .collect();
        for signaler in signalers {
            signaler.join().unwrap();
        }
        signals_done.store(true, Ordering::Release);
    });

    let handle = service.domain(DOMAIN).unwrap().find_execution("busy", None).unwrap();
    let execution = handle.lock();
    let events = execution.events();
    let ids: Vec<_> = events.iter().map(|e| e.event_id).collect();
    assert_eq!(ids, (1..=events.len() as u64).collect::<Vec<_>>());
    assert_eq!(
        events
            .iter()
            .filter(|e| e.event_type() == EventType::WorkflowExecutionSignaled)
            .count(),
        SIGNALERS * SIGNALS
    );

    let state = replay(events).unwrap();
    assert_eq!(state.open_counts, execution.open_counts());
    assert!(execution.open_counts().open_decision_tasks <= 1);
}
