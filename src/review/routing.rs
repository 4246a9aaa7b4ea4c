//! Stage routing: which organization must act on a stage

use thiserror::Error;
use uuid::Uuid;

use crate::models::OrganizationType;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("no {0} organization is linked to this request")]
    Unassigned(OrganizationType),
}

/// Organizations a request can be routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingContext {
    /// Developer of the property the request concerns
    pub developer_organization_id: Option<Uuid>,
    /// Lender of the application's eligibility, if any
    pub lender_organization_id: Option<Uuid>,
    pub internal_organization_id: Uuid,
}

pub fn route_stage(
    organization_type: OrganizationType,
    ctx: &RoutingContext,
) -> Result<Uuid, RoutingError> {
    match organization_type {
        OrganizationType::Developer => ctx
            .developer_organization_id
            .ok_or(RoutingError::Unassigned(organization_type)),
        OrganizationType::Lender => ctx
            .lender_organization_id
            .ok_or(RoutingError::Unassigned(organization_type)),
        OrganizationType::Internal => Ok(ctx.internal_organization_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_each_organization_type() {
        let developer = Uuid::new_v4();
        let lender = Uuid::new_v4();
        let internal = Uuid::new_v4();
        let ctx = RoutingContext {
            developer_organization_id: Some(developer),
            lender_organization_id: Some(lender),
            internal_organization_id: internal,
        };

        assert_eq!(route_stage(OrganizationType::Developer, &ctx), Ok(developer));
        assert_eq!(route_stage(OrganizationType::Lender, &ctx), Ok(lender));
        assert_eq!(route_stage(OrganizationType::Internal, &ctx), Ok(internal));
    }

    #[test]
    fn test_missing_lender_is_unassigned() {
        let ctx = RoutingContext {
            developer_organization_id: Some(Uuid::new_v4()),
            lender_organization_id: None,
            internal_organization_id: Uuid::new_v4(),
        };

        assert_eq!(
            route_stage(OrganizationType::Lender, &ctx),
            Err(RoutingError::Unassigned(OrganizationType::Lender))
        );
    }
}
