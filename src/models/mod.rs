//! Shared data models for the HSF backend
//!
//! Domain records live next to their services (`application`, `review`,
//! `escrow`, `dip`, `loan`); this module holds the types every domain uses.

use serde::{Deserialize, Serialize};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Organization kinds that can own a review stage
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "organization_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrganizationType {
    Developer,
    Lender,
    /// The platform's own organization (HSF). Exactly one exists.
    Internal,
}

impl OrganizationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrganizationType::Developer => "developer",
            OrganizationType::Lender => "lender",
            OrganizationType::Internal => "internal",
        }
    }
}

impl std::fmt::Display for OrganizationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Organization read model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub organization_type: OrganizationType,
}

/// Property read model, owned by the listing service
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct Property {
    pub id: Uuid,
    pub name: String,
    pub developer_organization_id: Uuid,
    pub price: Decimal,
}

/// Status shared by approval-style records (review requests, approvals,
/// offer letters, property closings, eligibilities)
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Default)]
#[sqlx(type_name = "decision_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DecisionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl DecisionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, DecisionStatus::Pending)
    }
}

/// A reviewer's verdict
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub fn from_accept(accept: bool) -> Self {
        if accept {
            Decision::Approve
        } else {
            Decision::Reject
        }
    }

    pub fn status(&self) -> DecisionStatus {
        match self {
            Decision::Approve => DecisionStatus::Approved,
            Decision::Reject => DecisionStatus::Rejected,
        }
    }
}

/// The caller of an operation, as established by the bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    /// Organization the caller acts for; home buyers have none
    pub organization_id: Option<Uuid>,
}

impl Actor {
    pub fn buyer(user_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id: None,
        }
    }

    pub fn member_of(user_id: Uuid, organization_id: Uuid) -> Self {
        Self {
            user_id,
            organization_id: Some(organization_id),
        }
    }

    pub fn acts_for(&self, organization_id: Uuid) -> bool {
        self.organization_id == Some(organization_id)
    }
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_status_terminal() {
        assert!(!DecisionStatus::Pending.is_terminal());
        assert!(DecisionStatus::Approved.is_terminal());
        assert!(DecisionStatus::Rejected.is_terminal());
    }

    #[test]
    fn test_decision_maps_to_status() {
        assert_eq!(Decision::from_accept(true).status(), DecisionStatus::Approved);
        assert_eq!(Decision::from_accept(false).status(), DecisionStatus::Rejected);
    }

    #[test]
    fn test_actor_membership() {
        let org = Uuid::new_v4();
        let actor = Actor::member_of(Uuid::new_v4(), org);
        assert!(actor.acts_for(org));
        assert!(!Actor::buyer(Uuid::new_v4()).acts_for(org));
    }
}
