//! Audit event shape emitted by write operations.
//!
//! The core builds these events and hands them back to the caller. Storing
//! them is the job of a separate audit collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Who performed a write, as supplied by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }
}

/// Kind of write being audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    /// Soft delete.
    Delete,
    HardDelete,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "CREATE"),
            Self::Update => write!(f, "UPDATE"),
            Self::Delete => write!(f, "DELETE"),
            Self::HardDelete => write!(f, "HARD_DELETE"),
        }
    }
}

/// An audit event for one write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    /// Unique event ID.
    pub event_id: Uuid,
    /// When the event occurred.
    pub occurred_at: DateTime<Utc>,

    pub user_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    pub action: AuditAction,
    /// Entity key (e.g. `work_order`).
    pub resource_type: String,
    /// Primary key of the affected row, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<Value>,

    /// Row state before the write (update/delete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_values: Option<Value>,
    /// Row state after the write (create/update/delete).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_values: Option<Value>,
}

impl AuditEvent {
    /// Create a new audit event from the caller's context.
    pub fn new(
        context: &AuditContext,
        action: AuditAction,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            user_id: context.user_id,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            old_values: None,
            new_values: None,
        }
    }

    /// Create a builder for an audit event.
    pub fn builder(
        context: &AuditContext,
        action: AuditAction,
        resource_type: impl Into<String>,
    ) -> AuditEventBuilder {
        AuditEventBuilder {
            event: Self::new(context, action, resource_type),
        }
    }

    /// Names of top-level fields whose value differs between old and new.
    pub fn changed_fields(&self) -> Vec<String> {
        let (Some(Value::Object(old)), Some(Value::Object(new))) =
            (&self.old_values, &self.new_values)
        else {
            return Vec::new();
        };
        new.iter()
            .filter(|(k, v)| old.get(*k) != Some(*v))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Format the event as a human-readable log line.
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "[{}] {} resource={}",
            self.occurred_at.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.action,
            self.resource_type,
        );
        if let Some(id) = &self.resource_id {
            line.push_str(&format!(" id={}", id));
        }
        if let Some(user) = self.user_id {
            line.push_str(&format!(" user={}", user));
        }
        let changed = self.changed_fields();
        if !changed.is_empty() {
            line.push_str(&format!(" changed_fields=[{}]", changed.join(",")));
        }
        line
    }
}

/// Builder for audit events.
#[derive(Debug)]
pub struct AuditEventBuilder {
    event: AuditEvent,
}

impl AuditEventBuilder {
    pub fn resource_id(mut self, id: Value) -> Self {
        self.event.resource_id = Some(id);
        self
    }

    pub fn old_values(mut self, values: Value) -> Self {
        self.event.old_values = Some(values);
        self
    }

    pub fn new_values(mut self, values: Value) -> Self {
        self.event.new_values = Some(values);
        self
    }

    pub fn build(self) -> AuditEvent {
        self.event
    }
}
