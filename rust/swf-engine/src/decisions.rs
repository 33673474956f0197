//! Decisions submitted by deciders when completing a decision task.
//!
//! Decisions arrive as `{"decisionType": ..., "<decisionType>DecisionAttributes": {...}}`
//! objects. They are parsed into the closed [`Decision`] enum up front, so an
//! unknown or malformed decision is rejected before anything is applied.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SwfError, SwfResult};
use crate::types::{TaskList, TypeKey};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleActivityTaskAttributes {
    pub activity_id: String,
    pub activity_type: TypeKey,
    pub task_list: Option<TaskList>,
    pub input: Option<String>,
    pub control: Option<String>,
    pub schedule_to_start_timeout: Option<String>,
    pub schedule_to_close_timeout: Option<String>,
    pub start_to_close_timeout: Option<String>,
    pub heartbeat_timeout: Option<String>,
}

impl ScheduleActivityTaskAttributes {
    /// Attributes with only the required fields set.
    pub fn new(activity_id: impl Into<String>, activity_type: TypeKey) -> Self {
        Self {
            activity_id: activity_id.into(),
            activity_type,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCancelActivityTaskAttributes {
    pub activity_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteWorkflowExecutionAttributes {
    pub result: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailWorkflowExecutionAttributes {
    pub reason: Option<String>,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelWorkflowExecutionAttributes {
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTimerAttributes {
    pub timer_id: String,
    pub start_to_fire_timeout: String,
    pub control: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTimerAttributes {
    pub timer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMarkerAttributes {
    pub marker_name: String,
    pub details: Option<String>,
}

/// A decision made by a decider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decisionType")]
pub enum Decision {
    ScheduleActivityTask {
        #[serde(rename = "scheduleActivityTaskDecisionAttributes")]
        attributes: ScheduleActivityTaskAttributes,
    },
    RequestCancelActivityTask {
        #[serde(rename = "requestCancelActivityTaskDecisionAttributes")]
        attributes: RequestCancelActivityTaskAttributes,
    },
    CompleteWorkflowExecution {
        #[serde(rename = "completeWorkflowExecutionDecisionAttributes", default)]
        attributes: CompleteWorkflowExecutionAttributes,
    },
    FailWorkflowExecution {
        #[serde(rename = "failWorkflowExecutionDecisionAttributes", default)]
        attributes: FailWorkflowExecutionAttributes,
    },
    CancelWorkflowExecution {
        #[serde(rename = "cancelWorkflowExecutionDecisionAttributes", default)]
        attributes: CancelWorkflowExecutionAttributes,
    },
    StartTimer {
        #[serde(rename = "startTimerDecisionAttributes")]
        attributes: StartTimerAttributes,
    },
    CancelTimer {
        #[serde(rename = "cancelTimerDecisionAttributes")]
        attributes: CancelTimerAttributes,
    },
    RecordMarker {
        #[serde(rename = "recordMarkerDecisionAttributes")]
        attributes: RecordMarkerAttributes,
    },
}

impl Decision {
    pub fn decision_type(&self) -> &'static str {
        match self {
            Self::ScheduleActivityTask { .. } => "ScheduleActivityTask",
            Self::RequestCancelActivityTask { .. } => "RequestCancelActivityTask",
            Self::CompleteWorkflowExecution { .. } => "CompleteWorkflowExecution",
            Self::FailWorkflowExecution { .. } => "FailWorkflowExecution",
            Self::CancelWorkflowExecution { .. } => "CancelWorkflowExecution",
            Self::StartTimer { .. } => "StartTimer",
            Self::CancelTimer { .. } => "CancelTimer",
            Self::RecordMarker { .. } => "RecordMarker",
        }
    }

    /// Whether applying this decision closes the execution.
    pub fn is_close(&self) -> bool {
        matches!(
            self,
            Self::CompleteWorkflowExecution { .. }
                | Self::FailWorkflowExecution { .. }
                | Self::CancelWorkflowExecution { .. }
        )
    }

    pub fn from_value(value: &Value) -> SwfResult<Self> {
        Self::deserialize(value).map_err(|e| SwfError::BadDecision(e.to_string()))
    }

    fn check_required(&self) -> Result<(), String> {
        let missing = match self {
            Self::ScheduleActivityTask { attributes } => {
                attributes.activity_id.is_empty().then_some("activityId")
            }
            Self::RequestCancelActivityTask { attributes } => {
                attributes.activity_id.is_empty().then_some("activityId")
            }
            Self::StartTimer { attributes } => attributes.timer_id.is_empty().then_some("timerId"),
            Self::CancelTimer { attributes } => attributes.timer_id.is_empty().then_some("timerId"),
            Self::RecordMarker { attributes } => {
                attributes.marker_name.is_empty().then_some("markerName")
            }
            _ => None,
        };
        match missing {
            Some(field) => Err(format!("{} requires a non-empty {field}", self.decision_type())),
            None => Ok(()),
        }
    }
}

/// Parse raw decision objects, rejecting unknown decision types.
pub fn parse_decisions(values: &[Value]) -> SwfResult<Vec<Decision>> {
    values
        .iter()
        .enumerate()
        .map(|(index, value)| {
            Decision::deserialize(value)
                .map_err(|e| SwfError::BadDecision(format!("decisions.{}: {e}", index + 1)))
        })
        .collect()
}

/// Structural checks applied to a whole decision list before any decision runs.
///
/// A decision that closes the execution must be the last one.
pub fn validate_decisions(decisions: &[Decision]) -> SwfResult<()> {
    for (index, decision) in decisions.iter().enumerate() {
        decision
            .check_required()
            .map_err(|e| SwfError::BadDecision(format!("decisions.{}: {e}", index + 1)))?;
        if decision.is_close() && index + 1 != decisions.len() {
            return Err(SwfError::BadDecision(format!(
                "decisions.{}: {} must be the last decision",
                index + 1,
                decision.decision_type()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_schedule_activity_task() {
        let decisions = parse_decisions(&[json!({
            "decisionType": "ScheduleActivityTask",
            "scheduleActivityTaskDecisionAttributes": {
                "activityId": "my-activity-001",
                "activityType": { "name": "test-activity", "version": "v1.1" },
                "taskList": { "name": "task-list-name" },
                "heartbeatTimeout": "300"
            }
        })])
        .unwrap();

        let Decision::ScheduleActivityTask { attributes } = &decisions[0] else {
            panic!("expected ScheduleActivityTask, got {:?}", decisions[0]);
        };
        assert_eq!(attributes.activity_id, "my-activity-001");
        assert_eq!(attributes.task_list, Some(TaskList::new("task-list-name")));
        assert_eq!(attributes.heartbeat_timeout.as_deref(), Some("300"));
        assert_eq!(attributes.schedule_to_start_timeout, None);
    }

    #[test]
    fn test_close_decisions_without_attributes() {
        let decisions = parse_decisions(&[json!({ "decisionType": "CompleteWorkflowExecution" })])
            .unwrap();
        assert_eq!(
            decisions[0],
            Decision::CompleteWorkflowExecution {
                attributes: CompleteWorkflowExecutionAttributes::default()
            }
        );
        assert!(decisions[0].is_close());
    }

    #[test]
    fn test_unknown_decision_type_rejected() {
        let err = parse_decisions(&[
            json!({ "decisionType": "RecordMarker", "recordMarkerDecisionAttributes": { "markerName": "m" } }),
            json!({ "decisionType": "ContinueAsNewWorkflowExecution" }),
        ])
        .unwrap_err();
        match err {
            SwfError::BadDecision(message) => assert!(message.starts_with("decisions.2")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_required_attribute_rejected() {
        let err = Decision::from_value(&json!({
            "decisionType": "ScheduleActivityTask",
            "scheduleActivityTaskDecisionAttributes": { "activityId": "a" }
        }))
        .unwrap_err();
        assert!(matches!(err, SwfError::BadDecision(_)));
    }

    #[test]
    fn test_close_decision_must_be_last() {
        let decisions = vec![
            Decision::CompleteWorkflowExecution {
                attributes: CompleteWorkflowExecutionAttributes::default(),
            },
            Decision::RecordMarker {
                attributes: RecordMarkerAttributes {
                    marker_name: "late".into(),
                    details: None,
                },
            },
        ];
        assert!(matches!(
            validate_decisions(&decisions),
            Err(SwfError::BadDecision(_))
        ));
        assert!(validate_decisions(&decisions[..1]).is_ok());
    }

    #[test]
    fn test_empty_ids_rejected() {
        let decisions = vec![Decision::StartTimer {
            attributes: StartTimerAttributes {
                timer_id: String::new(),
                start_to_fire_timeout: "10".into(),
                control: None,
            },
        }];
        assert!(validate_decisions(&decisions).is_err());
    }
}
