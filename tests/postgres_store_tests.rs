//! Store tests against a real PostgreSQL database
//!
//! Run with `TEST_DATABASE_URL` pointing at a scratch database:
//! `cargo test --test postgres_store_tests -- --ignored`

mod common;

#[cfg(test)]
mod tests {
    use super::common::{RecordingJobs, RecordingNotifier};
    use rust_decimal_macros::dec;
    use sqlx::PgPool;
    use std::sync::Arc;
    use uuid::Uuid;

    use hsf_backend::application::{ApplicationStatus, CreateApplicationRequest, FinancingType};
    use hsf_backend::db;
    use hsf_backend::dip::{EligibilityReviewRequest, SubmitEligibilityRequest};
    use hsf_backend::error::AppError;
    use hsf_backend::jobs::LoanOriginationWorker;
    use hsf_backend::loan::RepaymentFrequency;
    use hsf_backend::models::{Actor, Decision, DecisionStatus};
    use hsf_backend::notifications::TracingActivityLog;
    use hsf_backend::repository::memory::INTERNAL_ORGANIZATION_ID;
    use hsf_backend::repository::PgStore;
    use hsf_backend::review::{RejectionPolicy, ReviewEngine};
    use hsf_backend::state::Services;

    async fn setup_test_db() -> PgPool {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/hsf_backend_test".to_string());

        let pool = db::create_pool(&database_url, 5)
            .await
            .expect("Failed to connect to test database");
        db::prepare(&pool)
            .await
            .expect("Failed to run migrations");
        pool
    }

    /// Developer organization and one of its properties
    async fn seed_listing(pool: &PgPool) -> (Uuid, Uuid) {
        let developer_id = Uuid::new_v4();
        let property_id = Uuid::new_v4();

        sqlx::query("INSERT INTO organizations (id, name, organization_type) VALUES ($1, $2, 'developer')")
            .bind(developer_id)
            .bind("Test Developer")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "INSERT INTO properties (id, name, developer_organization_id, price) VALUES ($1, $2, $3, $4)",
        )
        .bind(property_id)
        .bind("Test Property")
        .bind(developer_id)
        .bind(dec!(30000000))
        .execute(pool)
        .await
        .unwrap();

        (developer_id, property_id)
    }

    async fn seed_lender(pool: &PgPool) -> Uuid {
        let lender_id = Uuid::new_v4();
        sqlx::query("INSERT INTO organizations (id, name, organization_type) VALUES ($1, $2, 'lender')")
            .bind(lender_id)
            .bind("Test Lender")
            .execute(pool)
            .await
            .unwrap();
        lender_id
    }

    fn services(pool: PgPool) -> Services<PgStore> {
        services_on(Arc::new(PgStore::new(pool)))
    }

    fn services_on(store: Arc<PgStore>) -> Services<PgStore> {
        Services::new(
            store,
            ReviewEngine::new(RejectionPolicy::Halt),
            Arc::new(RecordingJobs::default()),
            Arc::new(RecordingNotifier::default()),
            Arc::new(TracingActivityLog),
        )
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_offer_letter_review_on_postgres() {
        let pool = setup_test_db().await;
        let (developer_id, property_id) = seed_listing(&pool).await;
        let services = services(pool);

        let buyer = Actor::buyer(Uuid::new_v4());
        let developer = Actor::member_of(Uuid::new_v4(), developer_id);
        let hsf = Actor::member_of(Uuid::new_v4(), INTERNAL_ORGANIZATION_ID);

        let app = services
            .applications
            .create_application(
                &buyer,
                CreateApplicationRequest {
                    property_id,
                    financing_type: FinancingType::Outright,
                    eligibility_id: None,
                },
            )
            .await
            .unwrap();

        let submission = services
            .applications
            .request_offer_letter(&buyer, app.id)
            .await
            .unwrap();
        let again = services.applications.request_offer_letter(&buyer, app.id).await;
        assert!(matches!(again, Err(AppError::Conflict(_))));

        let outcome = services
            .applications
            .resolve_review_approval(&developer, submission.approval.id, Decision::Approve)
            .await
            .unwrap();
        let outcome = services
            .applications
            .resolve_review_approval(&hsf, outcome.next.unwrap().id, Decision::Approve)
            .await
            .unwrap();
        assert_eq!(outcome.terminal, Some(DecisionStatus::Approved));

        let details = services
            .applications
            .get_application(&buyer, app.id)
            .await
            .unwrap();
        assert_eq!(details.application.status, ApplicationStatus::Processing);
        assert_eq!(details.stages.len(), 2);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_approval_resolves_once_on_postgres() {
        let pool = setup_test_db().await;
        let (developer_id, property_id) = seed_listing(&pool).await;
        let services = services(pool);

        let buyer = Actor::buyer(Uuid::new_v4());
        let developer = Actor::member_of(Uuid::new_v4(), developer_id);

        let app = services
            .applications
            .create_application(
                &buyer,
                CreateApplicationRequest {
                    property_id,
                    financing_type: FinancingType::Outright,
                    eligibility_id: None,
                },
            )
            .await
            .unwrap();
        let submission = services
            .applications
            .request_offer_letter(&buyer, app.id)
            .await
            .unwrap();

        let first = services.applications.resolve_review_approval(
            &developer,
            submission.approval.id,
            Decision::Approve,
        );
        let second = services.applications.resolve_review_approval(
            &developer,
            submission.approval.id,
            Decision::Reject,
        );
        let (first, second) = tokio::join!(first, second);

        assert!(first.is_ok() != second.is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_offer_letter_requested_once_on_postgres() {
        let pool = setup_test_db().await;
        let (_developer_id, property_id) = seed_listing(&pool).await;
        let services = services(pool);

        let buyer = Actor::buyer(Uuid::new_v4());
        let app = services
            .applications
            .create_application(
                &buyer,
                CreateApplicationRequest {
                    property_id,
                    financing_type: FinancingType::Outright,
                    eligibility_id: None,
                },
            )
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            services.applications.request_offer_letter(&buyer, app.id),
            services.applications.request_offer_letter(&buyer, app.id),
        );
        assert!(first.is_ok() != second.is_ok());
        let conflict = if first.is_ok() { second } else { first };
        assert!(matches!(conflict, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_long_daily_schedule_on_postgres() {
        let pool = setup_test_db().await;
        let (developer_id, property_id) = seed_listing(&pool).await;
        let lender_id = seed_lender(&pool).await;
        let store = Arc::new(PgStore::new(pool.clone()));
        let services = services_on(store.clone());

        let buyer = Actor::buyer(Uuid::new_v4());
        let developer = Actor::member_of(Uuid::new_v4(), developer_id);
        let lender = Actor::member_of(Uuid::new_v4(), lender_id);
        let hsf = Actor::member_of(Uuid::new_v4(), INTERNAL_ORGANIZATION_ID);
        let dips = &services.dips;

        // 300 months of daily installments is 9,000 schedule rows
        let eligibility = dips
            .submit_eligibility(
                &buyer,
                SubmitEligibilityRequest {
                    lender_organization_id: lender_id,
                    requested_amount: dec!(1200000),
                    monthly_income: dec!(950000),
                    term_months: 300,
                    repayment_frequency: RepaymentFrequency::Daily,
                },
            )
            .await
            .unwrap();
        dips.review_eligibility(
            &lender,
            eligibility.id,
            EligibilityReviewRequest {
                approve: true,
                interest_rate: Some(dec!(12)),
            },
        )
        .await
        .unwrap();

        let app = services
            .applications
            .create_application(
                &buyer,
                CreateApplicationRequest {
                    property_id,
                    financing_type: FinancingType::Mortgage,
                    eligibility_id: Some(eligibility.id),
                },
            )
            .await
            .unwrap();
        let submission = services
            .applications
            .request_offer_letter(&buyer, app.id)
            .await
            .unwrap();
        let outcome = services
            .applications
            .resolve_review_approval(&developer, submission.approval.id, Decision::Approve)
            .await
            .unwrap();
        services
            .applications
            .resolve_review_approval(&hsf, outcome.next.unwrap().id, Decision::Approve)
            .await
            .unwrap();

        let dip = dips.generate_dip(eligibility.id).await.unwrap();
        dips.lender_respond(&lender, dip.id, true).await.unwrap();
        dips.user_respond(&buyer, dip.id, true).await.unwrap();
        dips.mark_due_diligence_paid(app.id).await.unwrap();
        dips.submit_documents(&buyer, dip.id).await.unwrap();
        let offer = dips.complete_review(&lender, dip.id).await.unwrap();
        dips.respond_to_loan_offer(&buyer, offer.id, true).await.unwrap();
        let cp = dips.record_management_fee(app.id).await.unwrap();

        let worker = LoanOriginationWorker::new(
            store,
            Arc::new(RecordingJobs::default()),
            Arc::new(RecordingNotifier::default()),
        );
        let loan = worker.originate(cp.id).await.unwrap().expect("loan originated");

        let rows: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM loan_repayment_schedules WHERE loan_id = $1")
                .bind(loan.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(rows, 9000);
    }
}
