//! Escrow meeting models
//!
//! The coarse status record can exist before scheduling details are final,
//! so status and meeting information are separate rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "escrow_meeting_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EscrowMeetingStatus {
    /// Meeting request is going through review
    Awaiting,
    /// Reviewers confirmed; the buyer has to accept
    AwaitingAcceptance,
    Confirmed,
    Declined,
}

impl EscrowMeetingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, EscrowMeetingStatus::Declined)
    }
}

/// Escrow status record
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct EscrowStatus {
    pub id: Uuid,
    pub application_id: Uuid,
    pub review_request_id: Uuid,
    pub status: EscrowMeetingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Escrow meeting details
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct EscrowInformation {
    pub id: Uuid,
    pub application_id: Uuid,
    pub escrow_status_id: Uuid,
    pub meeting_at: DateTime<Utc>,
    pub location: String,
    pub attendees: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Request DTO for scheduling an escrow meeting
#[derive(Debug, Deserialize, Validate)]
pub struct ScheduleEscrowMeetingRequest {
    pub meeting_at: DateTime<Utc>,
    #[validate(length(min = 1, max = 500))]
    pub location: String,
    #[validate(length(min = 1))]
    pub attendees: Vec<String>,
}

impl ScheduleEscrowMeetingRequest {
    /// Checks that need the current time
    pub fn validate_schedule(&self, now: DateTime<Utc>) -> Result<(), String> {
        if self.meeting_at <= now {
            return Err("Meeting must be scheduled in the future".to_string());
        }
        if self.attendees.iter().any(|a| a.trim().is_empty()) {
            return Err("Attendee names must not be blank".to_string());
        }
        Ok(())
    }
}

/// Request DTO for the buyer's answer to a confirmed meeting
#[derive(Debug, Deserialize)]
pub struct EscrowMeetingResponse {
    pub accept: bool,
}

/// Status and details returned after scheduling
#[derive(Debug, Serialize)]
pub struct EscrowMeeting {
    pub status: EscrowStatus,
    pub information: EscrowInformation,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request() -> ScheduleEscrowMeetingRequest {
        ScheduleEscrowMeetingRequest {
            meeting_at: Utc::now() + Duration::days(3),
            location: "Victoria Island office".to_string(),
            attendees: vec!["Buyer".to_string(), "Developer rep".to_string()],
        }
    }

    #[test]
    fn test_schedule_validation() {
        let mut req = request();
        assert!(req.validate().is_ok());
        assert!(req.validate_schedule(Utc::now()).is_ok());

        req.meeting_at = Utc::now() - Duration::hours(1);
        assert!(req.validate_schedule(Utc::now()).is_err());

        let mut req = request();
        req.location = String::new();
        assert!(req.validate().is_err());

        let mut req = request();
        req.attendees = vec!["  ".to_string()];
        assert!(req.validate_schedule(Utc::now()).is_err());
    }

    #[test]
    fn test_only_declined_is_terminal() {
        assert!(EscrowMeetingStatus::Declined.is_terminal());
        assert!(!EscrowMeetingStatus::Awaiting.is_terminal());
        assert!(!EscrowMeetingStatus::Confirmed.is_terminal());
    }
}
