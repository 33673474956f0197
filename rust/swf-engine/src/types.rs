//! Workflow and activity type definitions and their per-domain registry.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::clock::epoch_seconds;
use crate::error::{SwfError, SwfResult};

/// Immutable identity of a registered type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeKey {
    pub name: String,
    pub version: String,
}

impl TypeKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (version {})", self.name, self.version)
    }
}

/// Registration status shared by domains and types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Registered,
    Deprecated,
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registered => f.write_str("REGISTERED"),
            Self::Deprecated => f.write_str("DEPRECATED"),
        }
    }
}

/// What happens to child executions when the parent closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChildPolicy {
    Terminate,
    RequestCancel,
    Abandon,
}

impl fmt::Display for ChildPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Terminate => f.write_str("TERMINATE"),
            Self::RequestCancel => f.write_str("REQUEST_CANCEL"),
            Self::Abandon => f.write_str("ABANDON"),
        }
    }
}

impl FromStr for ChildPolicy {
    type Err = SwfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TERMINATE" => Ok(Self::Terminate),
            "REQUEST_CANCEL" => Ok(Self::RequestCancel),
            "ABANDON" => Ok(Self::Abandon),
            other => Err(SwfError::validation(format!(
                "Invalid child policy: {other}"
            ))),
        }
    }
}

/// Named task list, serialized as `{"name": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskList {
    pub name: String,
}

impl TaskList {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Per-kind behaviour of a type's default configuration.
pub trait TypeConfig: Clone + fmt::Debug + Default + Serialize + Send + Sync {
    /// Human-readable kind, used in faults.
    const KIND: &'static str;
    /// Field carrying the type identity in projections.
    const FIELD: &'static str;
}

/// Defaults registered with a workflow type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTypeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_list: Option<TaskList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_child_policy: Option<ChildPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_execution_start_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_start_to_close_timeout: Option<String>,
}

impl TypeConfig for WorkflowTypeConfig {
    const KIND: &'static str = "workflow type";
    const FIELD: &'static str = "workflowType";
}

/// Defaults registered with an activity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTypeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_list: Option<TaskList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_schedule_to_start_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_schedule_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_start_to_close_timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_task_heartbeat_timeout: Option<String>,
}

impl TypeConfig for ActivityTypeConfig {
    const KIND: &'static str = "activity type";
    const FIELD: &'static str = "activityType";
}

/// A versioned type registered in a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct RegisteredType<C> {
    key: TypeKey,
    status: RegistrationStatus,
    description: Option<String>,
    creation_date: DateTime<Utc>,
    deprecation_date: Option<DateTime<Utc>>,
    config: C,
}

pub type WorkflowType = RegisteredType<WorkflowTypeConfig>;
pub type ActivityType = RegisteredType<ActivityTypeConfig>;

impl<C: TypeConfig> RegisteredType<C> {
    pub fn new(key: TypeKey, config: C, description: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            key,
            status: RegistrationStatus::Registered,
            description,
            creation_date: now,
            deprecation_date: None,
            config,
        }
    }

    pub fn key(&self) -> &TypeKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.key.name
    }

    pub fn version(&self) -> &str {
        &self.key.version
    }

    pub fn status(&self) -> RegistrationStatus {
        self.status
    }

    pub fn is_deprecated(&self) -> bool {
        self.status == RegistrationStatus::Deprecated
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn deprecate(&mut self, now: DateTime<Utc>) {
        self.status = RegistrationStatus::Deprecated;
        self.deprecation_date = Some(now);
    }

    /// Identity only: `{"name", "version"}`.
    pub fn to_short_value(&self) -> Value {
        json!({ "name": self.key.name, "version": self.key.version })
    }

    /// Identity, status and dates.
    pub fn to_medium_value(&self) -> Value {
        let mut info = serde_json::Map::new();
        info.insert(C::FIELD.to_string(), self.to_short_value());
        info.insert("status".into(), json!(self.status));
        info.insert("creationDate".into(), json!(epoch_seconds(self.creation_date)));
        if let Some(description) = &self.description {
            info.insert("description".into(), json!(description));
        }
        if let Some(deprecated_at) = self.deprecation_date {
            info.insert("deprecationDate".into(), json!(epoch_seconds(deprecated_at)));
        }
        Value::Object(info)
    }

    /// Type info plus registered defaults.
    pub fn to_full_value(&self) -> Value {
        json!({
            "typeInfo": self.to_medium_value(),
            "configuration": self.config,
        })
    }
}

/// Registry of one kind of type, keyed by (name, version).
#[derive(Debug, Default)]
pub struct TypeRegistry<C> {
    types: RwLock<HashMap<TypeKey, RegisteredType<C>>>,
}

impl<C: TypeConfig> TypeRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            types: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, registered: RegisteredType<C>) -> SwfResult<()> {
        let mut types = self.types.write();
        if types.contains_key(&registered.key) {
            return Err(SwfError::TypeAlreadyExists {
                kind: C::KIND,
                key: registered.key,
            });
        }
        tracing::debug!(kind = C::KIND, key = %registered.key, "Registered type");
        types.insert(registered.key.clone(), registered);
        Ok(())
    }

    /// Look up a type, deprecated or not.
    pub fn get(&self, key: &TypeKey) -> SwfResult<RegisteredType<C>> {
        self.find(key).ok_or_else(|| SwfError::UnknownType {
            kind: C::KIND,
            key: key.clone(),
        })
    }

    pub fn find(&self, key: &TypeKey) -> Option<RegisteredType<C>> {
        self.types.read().get(key).cloned()
    }

    pub fn deprecate(&self, key: &TypeKey, now: DateTime<Utc>) -> SwfResult<()> {
        let mut types = self.types.write();
        let registered = types.get_mut(key).ok_or_else(|| SwfError::UnknownType {
            kind: C::KIND,
            key: key.clone(),
        })?;
        if registered.is_deprecated() {
            return Err(SwfError::TypeDeprecated {
                kind: C::KIND,
                key: key.clone(),
            });
        }
        registered.deprecate(now);
        tracing::debug!(kind = C::KIND, key = %key, "Deprecated type");
        Ok(())
    }

    /// Types with the given status, sorted by name then version.
    pub fn list(&self, status: RegistrationStatus, reverse: bool) -> Vec<RegisteredType<C>> {
        let mut listed: Vec<_> = self
            .types
            .read()
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        if reverse {
            listed.reverse();
        }
        listed
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
