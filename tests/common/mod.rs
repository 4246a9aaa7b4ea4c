//! Shared fixtures: an in-memory store with one developer, one lender and
//! one property, plus collaborators that record what they were given.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use hsf_backend::application::{Application, CreateApplicationRequest, FinancingType};
use hsf_backend::dip::{
    ConditionPrecedent, Dip, Eligibility, EligibilityReviewRequest, LoanOffer,
    SubmitEligibilityRequest,
};
use hsf_backend::jobs::{JobError, JobPayload, JobSink, QueueName};
use hsf_backend::loan::RepaymentFrequency;
use hsf_backend::models::{Actor, Decision, Organization, OrganizationType, Property};
use hsf_backend::notifications::{Notification, Notifier, NotifyError, TracingActivityLog};
use hsf_backend::repository::memory::INTERNAL_ORGANIZATION_ID;
use hsf_backend::repository::MemoryStore;
use hsf_backend::review::{RejectionPolicy, ReviewEngine};
use hsf_backend::state::Services;

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn templates(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.template.clone())
            .collect()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingJobs {
    enqueued: Mutex<Vec<JobPayload>>,
    closed: AtomicBool,
}

impl RecordingJobs {
    pub fn payloads(&self) -> Vec<JobPayload> {
        self.enqueued.lock().unwrap().clone()
    }

    /// Refuse jobs until reopened, like a queue whose workers have stopped
    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }
}

impl JobSink for RecordingJobs {
    fn enqueue(&self, payload: JobPayload) -> Result<Uuid, JobError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(JobError::Closed(QueueName::DipGeneration));
        }
        self.enqueued.lock().unwrap().push(payload);
        Ok(Uuid::new_v4())
    }
}

pub struct World {
    pub store: Arc<MemoryStore>,
    pub services: Services<MemoryStore>,
    pub jobs: Arc<RecordingJobs>,
    pub notifier: Arc<RecordingNotifier>,
    pub property: Property,
    pub developer_id: Uuid,
    pub lender_id: Uuid,
    pub buyer: Actor,
    pub developer: Actor,
    pub lender: Actor,
    pub hsf: Actor,
}

impl World {
    pub async fn new() -> Self {
        Self::with_policy(RejectionPolicy::Halt).await
    }

    pub async fn with_policy(policy: RejectionPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let developer_id = Uuid::new_v4();
        let lender_id = Uuid::new_v4();

        store
            .seed_organization(Organization {
                id: developer_id,
                name: "Lekki Homes".to_string(),
                organization_type: OrganizationType::Developer,
            })
            .await;
        store
            .seed_organization(Organization {
                id: lender_id,
                name: "Union Mortgage Bank".to_string(),
                organization_type: OrganizationType::Lender,
            })
            .await;

        let property = Property {
            id: Uuid::new_v4(),
            name: "Palm Court 4B".to_string(),
            developer_organization_id: developer_id,
            price: dec!(45000000),
        };
        store.seed_property(property.clone()).await;

        let jobs = Arc::new(RecordingJobs::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let services = Services::new(
            store.clone(),
            ReviewEngine::new(policy),
            jobs.clone(),
            notifier.clone(),
            Arc::new(TracingActivityLog),
        );

        Self {
            store,
            services,
            jobs,
            notifier,
            property,
            developer_id,
            lender_id,
            buyer: Actor::buyer(Uuid::new_v4()),
            developer: Actor::member_of(Uuid::new_v4(), developer_id),
            lender: Actor::member_of(Uuid::new_v4(), lender_id),
            hsf: Actor::member_of(Uuid::new_v4(), INTERNAL_ORGANIZATION_ID),
        }
    }

    pub async fn application(
        &self,
        financing_type: FinancingType,
        eligibility_id: Option<Uuid>,
    ) -> Application {
        self.services
            .applications
            .create_application(
                &self.buyer,
                CreateApplicationRequest {
                    property_id: self.property.id,
                    financing_type,
                    eligibility_id,
                },
            )
            .await
            .expect("application created")
    }

    /// Request the offer letter and push it through the developer and HSF
    /// stages
    pub async fn approve_offer_letter(&self, application_id: Uuid) {
        let submission = self
            .services
            .applications
            .request_offer_letter(&self.buyer, application_id)
            .await
            .expect("offer letter requested");

        let outcome = self
            .services
            .applications
            .resolve_review_approval(&self.developer, submission.approval.id, Decision::Approve)
            .await
            .expect("developer approves");
        let next = outcome.next.expect("HSF stage created");

        self.services
            .applications
            .resolve_review_approval(&self.hsf, next.id, Decision::Approve)
            .await
            .expect("HSF approves");
    }

    pub async fn approved_eligibility(&self, amount: Decimal) -> Eligibility {
        let eligibility = self
            .services
            .dips
            .submit_eligibility(
                &self.buyer,
                SubmitEligibilityRequest {
                    lender_organization_id: self.lender_id,
                    requested_amount: amount,
                    monthly_income: dec!(950000),
                    term_months: 12,
                    repayment_frequency: RepaymentFrequency::Monthly,
                },
            )
            .await
            .expect("eligibility submitted");

        self.services
            .dips
            .review_eligibility(
                &self.lender,
                eligibility.id,
                EligibilityReviewRequest {
                    approve: true,
                    interest_rate: Some(dec!(12)),
                },
            )
            .await
            .expect("eligibility approved")
    }

    /// Mortgage application with an approved offer letter and a generated DIP
    pub async fn mortgage_with_dip(&self) -> (Application, Dip) {
        let eligibility = self.approved_eligibility(dec!(1200000)).await;
        let app = self
            .application(FinancingType::Mortgage, Some(eligibility.id))
            .await;
        self.approve_offer_letter(app.id).await;

        let dip = self
            .services
            .dips
            .generate_dip(eligibility.id)
            .await
            .expect("DIP generated");
        (app, dip)
    }

    /// Walk a DIP from generation to an accepted loan offer
    pub async fn accepted_loan_offer(&self) -> (Application, LoanOffer) {
        let (app, dip) = self.mortgage_with_dip().await;
        let dips = &self.services.dips;

        dips.lender_respond(&self.lender, dip.id, true).await.expect("lender accepts");
        dips.user_respond(&self.buyer, dip.id, true).await.expect("buyer accepts");
        dips.mark_due_diligence_paid(app.id).await.expect("due diligence paid");
        dips.submit_documents(&self.buyer, dip.id).await.expect("documents submitted");
        let offer = dips
            .complete_review(&self.lender, dip.id)
            .await
            .expect("loan offer issued");
        let offer = dips
            .respond_to_loan_offer(&self.buyer, offer.id, true)
            .await
            .expect("loan offer accepted");
        (app, offer)
    }

    pub async fn condition_precedent(&self) -> (Application, ConditionPrecedent) {
        let (app, _offer) = self.accepted_loan_offer().await;
        let cp = self
            .services
            .dips
            .record_management_fee(app.id)
            .await
            .expect("management fee recorded");
        (app, cp)
    }
}
