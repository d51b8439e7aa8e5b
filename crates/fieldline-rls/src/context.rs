//! Per-request RLS context.

use serde::{Deserialize, Serialize};

use fieldline_core::IdentitySource;

use crate::policy::Policy;

/// Caller identity for one request.
///
/// Built by the authentication layer and passed by reference into every
/// core call. The core never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RlsContext {
    pub role: String,
    pub user_id: i64,
    #[serde(default)]
    pub customer_profile_id: Option<i64>,
    #[serde(default)]
    pub technician_profile_id: Option<i64>,
    /// Resource the caller is acting on.
    pub resource: String,
    /// Pre-resolved policy. Resolved from the policy table when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<Policy>,
}

impl RlsContext {
    pub fn new(role: impl Into<String>, user_id: i64, resource: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            user_id,
            customer_profile_id: None,
            technician_profile_id: None,
            resource: resource.into(),
            policy: None,
        }
    }

    pub fn with_customer_profile(mut self, id: i64) -> Self {
        self.customer_profile_id = Some(id);
        self
    }

    pub fn with_technician_profile(mut self, id: i64) -> Self {
        self.technician_profile_id = Some(id);
        self
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// The identifier an ownership rule compares against.
    pub fn identity(&self, source: IdentitySource) -> Option<i64> {
        match source {
            IdentitySource::User => Some(self.user_id),
            IdentitySource::CustomerProfile => self.customer_profile_id,
            IdentitySource::TechnicianProfile => self.technician_profile_id,
        }
    }
}
