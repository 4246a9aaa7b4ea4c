//! Application orchestration and review workflow tests against the
//! in-memory store

mod common;

#[cfg(test)]
mod tests {
    use super::common::World;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use hsf_backend::application::{ApplicationStage, ApplicationStatus, FinancingType};
    use hsf_backend::error::AppError;
    use hsf_backend::escrow::{EscrowMeetingStatus, ScheduleEscrowMeetingRequest};
    use hsf_backend::jobs::{DipGenerationWorker, EligibilityJob, JobPayload};
    use hsf_backend::models::{Decision, DecisionStatus};
    use hsf_backend::repository::{Database, ReviewRequestRepository};
    use hsf_backend::review::RejectionPolicy;

    #[tokio::test]
    async fn test_offer_letter_walks_developer_then_hsf() {
        let world = World::new().await;
        let app = world.application(FinancingType::Outright, None).await;
        let apps = &world.services.applications;

        let submission = apps.request_offer_letter(&world.buyer, app.id).await.unwrap();
        assert_eq!(submission.approval.organization_id, world.developer_id);
        assert_eq!(submission.offer_letter.status, DecisionStatus::Pending);

        let first = apps
            .resolve_review_approval(&world.developer, submission.approval.id, Decision::Approve)
            .await
            .unwrap();
        assert!(first.terminal.is_none());
        let next = first.next.expect("second stage");
        assert_eq!(next.organization_id, world.hsf.organization_id.unwrap());

        let last = apps
            .resolve_review_approval(&world.hsf, next.id, Decision::Approve)
            .await
            .unwrap();
        assert_eq!(last.terminal, Some(DecisionStatus::Approved));
        assert!(last.next.is_none());
        assert_eq!(last.request.status, DecisionStatus::Approved);

        let details = apps.get_application(&world.buyer, app.id).await.unwrap();
        assert_eq!(details.application.status, ApplicationStatus::Processing);
        let stages: Vec<_> = details.stages.iter().map(|s| s.stage).collect();
        assert!(stages.contains(&ApplicationStage::OfferLetterRequested));
        assert!(stages.contains(&ApplicationStage::OfferLetterApproved));

        // Outright purchases never start DIP generation
        assert!(world.jobs.payloads().is_empty());
        assert!(world
            .notifier
            .templates()
            .contains(&"offer_letter_approved".to_string()));
    }

    #[tokio::test]
    async fn test_only_one_approval_pending_at_a_time() {
        let world = World::new().await;
        let app = world.application(FinancingType::Outright, None).await;
        let apps = &world.services.applications;

        let submission = apps.request_offer_letter(&world.buyer, app.id).await.unwrap();
        assert_eq!(apps.list_pending_approvals(&world.developer).await.unwrap().len(), 1);
        assert!(apps.list_pending_approvals(&world.hsf).await.unwrap().is_empty());

        apps.resolve_review_approval(&world.developer, submission.approval.id, Decision::Approve)
            .await
            .unwrap();
        assert!(apps.list_pending_approvals(&world.developer).await.unwrap().is_empty());
        assert_eq!(apps.list_pending_approvals(&world.hsf).await.unwrap().len(), 1);

        let buyer_listing = apps.list_pending_approvals(&world.buyer).await;
        assert!(matches!(buyer_listing, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_second_offer_letter_conflicts_while_pending() {
        let world = World::new().await;
        let app = world.application(FinancingType::Outright, None).await;
        let apps = &world.services.applications;

        apps.request_offer_letter(&world.buyer, app.id).await.unwrap();
        let again = apps.request_offer_letter(&world.buyer, app.id).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_rejected_offer_letter_can_be_requested_again() {
        let world = World::new().await;
        let app = world.application(FinancingType::Outright, None).await;
        let apps = &world.services.applications;

        let submission = apps.request_offer_letter(&world.buyer, app.id).await.unwrap();
        let outcome = apps
            .resolve_review_approval(&world.developer, submission.approval.id, Decision::Reject)
            .await
            .unwrap();
        assert_eq!(outcome.terminal, Some(DecisionStatus::Rejected));
        assert!(outcome.next.is_none());
        assert!(apps.list_pending_approvals(&world.hsf).await.unwrap().is_empty());

        let retry = apps.request_offer_letter(&world.buyer, app.id).await.unwrap();
        assert_ne!(retry.offer_letter.id, submission.offer_letter.id);
    }

    #[tokio::test]
    async fn test_continue_policy_lets_last_stage_decide() {
        let world = World::with_policy(RejectionPolicy::Continue).await;
        let app = world.application(FinancingType::Outright, None).await;
        let apps = &world.services.applications;

        let submission = apps.request_offer_letter(&world.buyer, app.id).await.unwrap();
        let first = apps
            .resolve_review_approval(&world.developer, submission.approval.id, Decision::Reject)
            .await
            .unwrap();
        assert!(first.terminal.is_none());
        assert_eq!(first.resolved.status, DecisionStatus::Rejected);

        let last = apps
            .resolve_review_approval(&world.hsf, first.next.unwrap().id, Decision::Approve)
            .await
            .unwrap();
        assert_eq!(last.terminal, Some(DecisionStatus::Approved));
    }

    #[tokio::test]
    async fn test_approval_guards() {
        let world = World::new().await;
        let app = world.application(FinancingType::Outright, None).await;
        let apps = &world.services.applications;

        let submission = apps.request_offer_letter(&world.buyer, app.id).await.unwrap();

        let wrong_org = apps
            .resolve_review_approval(&world.hsf, submission.approval.id, Decision::Approve)
            .await;
        assert!(matches!(wrong_org, Err(AppError::Forbidden(_))));

        apps.resolve_review_approval(&world.developer, submission.approval.id, Decision::Approve)
            .await
            .unwrap();
        let twice = apps
            .resolve_review_approval(&world.developer, submission.approval.id, Decision::Approve)
            .await;
        assert!(matches!(twice, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_mortgage_approval_enqueues_dip_generation() {
        let world = World::new().await;
        let eligibility = world.approved_eligibility(dec!(1200000)).await;
        let app = world
            .application(FinancingType::Mortgage, Some(eligibility.id))
            .await;

        world.approve_offer_letter(app.id).await;

        assert_eq!(
            world.jobs.payloads(),
            vec![JobPayload::GenerateDip(EligibilityJob {
                eligibility_id: eligibility.id
            })]
        );
    }

    #[tokio::test]
    async fn test_approval_commits_when_dip_job_cannot_be_queued() {
        let world = World::new().await;
        let eligibility = world.approved_eligibility(dec!(1200000)).await;
        let app = world
            .application(FinancingType::Mortgage, Some(eligibility.id))
            .await;

        world.jobs.set_closed(true);
        world.approve_offer_letter(app.id).await;
        assert!(world.jobs.payloads().is_empty());

        let details = world
            .services
            .applications
            .get_application(&world.buyer, app.id)
            .await
            .unwrap();
        assert_eq!(details.application.status, ApplicationStatus::Processing);

        world.jobs.set_closed(false);
        let sweeper = DipGenerationWorker::new(world.services.dips.clone());
        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert_eq!(
            world.jobs.payloads(),
            vec![JobPayload::GenerateDip(EligibilityJob {
                eligibility_id: eligibility.id
            })]
        );
    }

    #[tokio::test]
    async fn test_create_application_checks_eligibility() {
        let world = World::new().await;
        let apps = &world.services.applications;

        let missing = apps
            .create_application(
                &world.buyer,
                hsf_backend::application::CreateApplicationRequest {
                    property_id: world.property.id,
                    financing_type: FinancingType::Mortgage,
                    eligibility_id: None,
                },
            )
            .await;
        assert!(matches!(missing, Err(AppError::Invalid(_))));

        let eligibility = world.approved_eligibility(dec!(500000)).await;
        world
            .application(FinancingType::Installment, Some(eligibility.id))
            .await;
        let reused = apps
            .create_application(
                &world.buyer,
                hsf_backend::application::CreateApplicationRequest {
                    property_id: world.property.id,
                    financing_type: FinancingType::Installment,
                    eligibility_id: Some(eligibility.id),
                },
            )
            .await;
        assert!(matches!(reused, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_property_closing_completes_outright_purchase() {
        let world = World::new().await;
        let app = world.application(FinancingType::Outright, None).await;
        let apps = &world.services.applications;

        let early = apps.request_property_closing(&world.buyer, app.id).await;
        assert!(matches!(early, Err(AppError::Forbidden(_))));

        world.approve_offer_letter(app.id).await;
        let closing = apps.request_property_closing(&world.buyer, app.id).await.unwrap();

        let again = apps.request_property_closing(&world.buyer, app.id).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let not_developer = apps
            .respond_to_property_closing(&world.lender, closing.id, true)
            .await;
        assert!(matches!(not_developer, Err(AppError::Forbidden(_))));

        let decided = apps
            .respond_to_property_closing(&world.developer, closing.id, true)
            .await
            .unwrap();
        assert_eq!(decided.status, DecisionStatus::Approved);
        assert_eq!(decided.decided_by, Some(world.developer.user_id));

        let details = apps.get_application(&world.buyer, app.id).await.unwrap();
        assert_eq!(details.application.status, ApplicationStatus::Completed);

        // Completed applications accept no further transitions
        let after = apps.request_offer_letter(&world.buyer, app.id).await;
        assert!(matches!(after, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_mortgage_cannot_request_property_closing() {
        let world = World::new().await;
        let (app, _dip) = world.mortgage_with_dip().await;

        let closing = world
            .services
            .applications
            .request_property_closing(&world.buyer, app.id)
            .await;
        assert!(matches!(closing, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_rejected_application_blocks_further_actions() {
        let world = World::new().await;
        let (app, dip) = world.mortgage_with_dip().await;
        let dips = &world.services.dips;

        dips.lender_respond(&world.lender, dip.id, false).await.unwrap();

        let details = world
            .services
            .applications
            .get_application(&world.buyer, app.id)
            .await
            .unwrap();
        assert_eq!(details.application.status, ApplicationStatus::Rejected);

        let answer = dips.user_respond(&world.buyer, dip.id, true).await;
        assert!(matches!(answer, Err(AppError::Forbidden(_))));

        let closing = world
            .services
            .applications
            .request_property_closing(&world.buyer, app.id)
            .await;
        assert!(matches!(closing, Err(AppError::Forbidden(_))));

        let letter = world
            .services
            .applications
            .request_offer_letter(&world.buyer, app.id)
            .await;
        assert!(matches!(letter, Err(AppError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_escrow_meeting_review_and_acceptance() {
        let world = World::new().await;
        let app = world.application(FinancingType::Outright, None).await;
        let escrow = &world.services.escrow;
        let apps = &world.services.applications;

        let request = || ScheduleEscrowMeetingRequest {
            meeting_at: Utc::now() + Duration::days(5),
            location: "Victoria Island office".to_string(),
            attendees: vec!["Buyer".to_string(), "Developer rep".to_string()],
        };

        let early = escrow
            .schedule_escrow_meeting(&world.buyer, app.id, request())
            .await;
        assert!(matches!(early, Err(AppError::Forbidden(_))));

        world.approve_offer_letter(app.id).await;
        let meeting = escrow
            .schedule_escrow_meeting(&world.buyer, app.id, request())
            .await
            .unwrap();
        assert_eq!(meeting.status.status, EscrowMeetingStatus::Awaiting);

        let mut tx = world.store.begin().await.unwrap();
        let review = world
            .store
            .find_review_request(&mut tx, meeting.status.review_request_id)
            .await
            .unwrap()
            .unwrap();
        drop(tx);
        assert_eq!(review.candidate_name, world.property.name);

        let again = escrow
            .schedule_escrow_meeting(&world.buyer, app.id, request())
            .await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let premature = escrow
            .respond_to_escrow_meeting(&world.buyer, app.id, true)
            .await;
        assert!(matches!(premature, Err(AppError::Forbidden(_))));

        // HSF confirms first, then the developer
        let hsf_pending = apps.list_pending_approvals(&world.hsf).await.unwrap();
        assert_eq!(hsf_pending.len(), 1);
        let outcome = apps
            .resolve_review_approval(&world.hsf, hsf_pending[0].id, Decision::Approve)
            .await
            .unwrap();
        let developer_stage = outcome.next.expect("developer stage");
        assert_eq!(developer_stage.organization_id, world.developer_id);
        apps.resolve_review_approval(&world.developer, developer_stage.id, Decision::Approve)
            .await
            .unwrap();

        let fetched = escrow.get_escrow_meeting(&world.buyer, app.id).await.unwrap();
        assert_eq!(fetched.status.status, EscrowMeetingStatus::AwaitingAcceptance);
        assert_eq!(fetched.information.location, "Victoria Island office");

        let accepted = escrow
            .respond_to_escrow_meeting(&world.buyer, app.id, true)
            .await
            .unwrap();
        assert_eq!(accepted.status, EscrowMeetingStatus::Confirmed);

        let stages = apps.list_stages(&world.buyer, app.id).await.unwrap();
        assert!(stages
            .iter()
            .any(|s| s.stage == ApplicationStage::EscrowMeetingConfirmed));
    }

    #[tokio::test]
    async fn test_application_hidden_from_unrelated_actors() {
        let world = World::new().await;
        let app = world.application(FinancingType::Outright, None).await;
        let apps = &world.services.applications;

        let stranger = hsf_backend::models::Actor::buyer(uuid::Uuid::new_v4());
        let hidden = apps.get_application(&stranger, app.id).await;
        assert!(matches!(hidden, Err(AppError::NotFound(_))));

        // Outright applications have no lender to route to
        let lender_view = apps.get_application(&world.lender, app.id).await;
        assert!(matches!(lender_view, Err(AppError::NotFound(_))));

        assert!(apps.get_application(&world.developer, app.id).await.is_ok());
        assert!(apps.get_application(&world.hsf, app.id).await.is_ok());
    }
}
