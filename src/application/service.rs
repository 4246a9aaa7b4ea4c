//! Application orchestration
//!
//! Each transition loads the application, checks it is still open, checks
//! that the targeted sub-workflow has no active instance, acts, and persists
//! the new link, all inside one transaction.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::application::{
    Application, ApplicationDetails, ApplicationStage, ApplicationStageEntry, ApplicationStatus,
    CreateApplicationRequest, FinancingType, OfferLetter, OfferLetterSubmission, PropertyClosing,
};
use crate::error::{AppError, AppResult};
use crate::escrow::EscrowMeetingStatus;
use crate::jobs::{EligibilityJob, JobPayload, JobSink};
use crate::models::{Actor, Decision, DecisionStatus};
use crate::notifications::{self, Activity, ActivityLog, Notification, Notifier, Recipient};
use crate::repository::Store;
use crate::review::{ReviewApproval, ReviewEngine, ReviewKind, ReviewOutcome, RoutingContext};

pub(crate) async fn load_application<S: Store>(
    store: &S,
    tx: &mut S::Tx,
    id: Uuid,
) -> AppResult<Application> {
    store
        .find_application(tx, id)
        .await?
        .ok_or_else(|| AppError::not_found("Application", id))
}

/// Rejected and completed applications accept no further transitions
pub(crate) fn ensure_open(app: &Application) -> AppResult<()> {
    match app.status {
        ApplicationStatus::Rejected => Err(AppError::Forbidden(
            "This application has been rejected".to_string(),
        )),
        ApplicationStatus::Completed => Err(AppError::Forbidden(
            "This application is already completed".to_string(),
        )),
        _ => Ok(()),
    }
}

pub(crate) fn ensure_owner(app: &Application, actor: &Actor) -> AppResult<()> {
    if app.user_id != actor.user_id {
        return Err(AppError::Forbidden(
            "Only the applicant can perform this action".to_string(),
        ));
    }
    Ok(())
}

/// Organizations that stages of this application's reviews are routed to
pub(crate) async fn routing_context<S: Store>(
    store: &S,
    tx: &mut S::Tx,
    app: &Application,
) -> AppResult<RoutingContext> {
    let property = store
        .find_property(tx, app.property_id)
        .await?
        .ok_or_else(|| AppError::not_found("Property", app.property_id))?;

    let lender_organization_id = match app.eligibility_id {
        Some(id) => store
            .find_eligibility(tx, id)
            .await?
            .map(|e| e.lender_organization_id),
        None => None,
    };

    let internal = store
        .find_internal_organization(tx)
        .await?
        .ok_or_else(|| AppError::Internal("internal organization is not configured".to_string()))?;

    Ok(RoutingContext {
        developer_organization_id: Some(property.developer_organization_id),
        lender_organization_id,
        internal_organization_id: internal.id,
    })
}

pub(crate) async fn append_stage<S: Store>(
    store: &S,
    tx: &mut S::Tx,
    application_id: Uuid,
    stage: ApplicationStage,
    actor_id: Uuid,
) -> AppResult<()> {
    let entry = ApplicationStageEntry::new(application_id, stage, actor_id);
    if !store.append_stage(tx, &entry).await? {
        tracing::debug!(application_id = %application_id, stage = ?stage, "Stage already recorded");
    }
    Ok(())
}

/// Review subject a request belongs to
enum Subject {
    OfferLetter(OfferLetter),
    EscrowMeeting(Uuid),
}

pub struct ApplicationService<S: Store> {
    store: Arc<S>,
    engine: ReviewEngine,
    jobs: Arc<dyn JobSink>,
    notifier: Arc<dyn Notifier>,
    activity: Arc<dyn ActivityLog>,
}

impl<S: Store> Clone for ApplicationService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            engine: self.engine,
            jobs: self.jobs.clone(),
            notifier: self.notifier.clone(),
            activity: self.activity.clone(),
        }
    }
}

impl<S: Store> ApplicationService<S> {
    pub fn new(
        store: Arc<S>,
        engine: ReviewEngine,
        jobs: Arc<dyn JobSink>,
        notifier: Arc<dyn Notifier>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            store,
            engine,
            jobs,
            notifier,
            activity,
        }
    }

    pub async fn create_application(
        &self,
        actor: &Actor,
        request: CreateApplicationRequest,
    ) -> AppResult<Application> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        store
            .find_property(&mut tx, request.property_id)
            .await?
            .ok_or_else(|| AppError::not_found("Property", request.property_id))?;

        let eligibility = match (request.financing_type.requires_eligibility(), request.eligibility_id) {
            (false, None) => None,
            (false, Some(_)) => {
                return Err(AppError::Invalid(
                    "Outright purchases do not take an eligibility".to_string(),
                ))
            }
            (true, None) => {
                return Err(AppError::Invalid(
                    "An approved eligibility is required for this financing type".to_string(),
                ))
            }
            (true, Some(id)) => {
                let eligibility = store
                    .find_eligibility(&mut tx, id)
                    .await?
                    .ok_or_else(|| AppError::not_found("Eligibility", id))?;
                if eligibility.user_id != actor.user_id {
                    return Err(AppError::Forbidden(
                        "This eligibility belongs to another user".to_string(),
                    ));
                }
                if eligibility.status != DecisionStatus::Approved {
                    return Err(AppError::Forbidden("Eligibility is not approved".to_string()));
                }
                if eligibility.application_id.is_some() {
                    return Err(AppError::Conflict(
                        "Eligibility is already attached to an application".to_string(),
                    ));
                }
                Some(eligibility)
            }
        };

        let app = Application::new(
            actor.user_id,
            request.property_id,
            request.financing_type,
            eligibility.as_ref().map(|e| e.id),
        );
        store.insert_application(&mut tx, &app).await?;

        if let Some(mut eligibility) = eligibility {
            eligibility.application_id = Some(app.id);
            eligibility.updated_at = Utc::now();
            store.update_eligibility(&mut tx, &eligibility).await?;
        }

        store.commit(tx).await?;

        tracing::info!(
            application_id = %app.id,
            financing_type = ?app.financing_type,
            "Application created"
        );
        self.activity
            .record(Activity::new(actor.user_id, app.id, "application_created"));

        Ok(app)
    }

    /// Visible to the applicant and to the organizations its reviews route to
    pub async fn get_application(&self, actor: &Actor, id: Uuid) -> AppResult<ApplicationDetails> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let application = load_application(store, &mut tx, id).await?;
        if application.user_id != actor.user_id {
            let ctx = routing_context(store, &mut tx, &application).await?;
            let visible = [
                ctx.developer_organization_id,
                ctx.lender_organization_id,
                Some(ctx.internal_organization_id),
            ]
            .into_iter()
            .flatten()
            .any(|org| actor.acts_for(org));
            if !visible {
                return Err(AppError::not_found("Application", id));
            }
        }

        let stages = store.list_stages(&mut tx, id).await?;
        Ok(ApplicationDetails { application, stages })
    }

    pub async fn list_applications(&self, actor: &Actor) -> AppResult<Vec<Application>> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;
        Ok(store.list_applications_for_user(&mut tx, actor.user_id).await?)
    }

    pub async fn list_stages(
        &self,
        actor: &Actor,
        application_id: Uuid,
    ) -> AppResult<Vec<ApplicationStageEntry>> {
        Ok(self.get_application(actor, application_id).await?.stages)
    }

    /// Approvals waiting on the caller's organization
    pub async fn list_pending_approvals(&self, actor: &Actor) -> AppResult<Vec<ReviewApproval>> {
        let organization_id = actor.organization_id.ok_or_else(|| {
            AppError::Forbidden("Only organization members review requests".to_string())
        })?;

        let store = self.store.as_ref();
        let mut tx = store.begin().await?;
        Ok(store.list_pending_approvals(&mut tx, organization_id).await?)
    }

    pub async fn request_offer_letter(
        &self,
        actor: &Actor,
        application_id: Uuid,
    ) -> AppResult<OfferLetterSubmission> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut app = load_application(store, &mut tx, application_id).await?;
        ensure_open(&app)?;
        ensure_owner(&app, actor)?;

        if let Some(letter_id) = app.offer_letter_id {
            if let Some(letter) = store.find_offer_letter(&mut tx, letter_id).await? {
                if letter.status != DecisionStatus::Rejected {
                    return Err(AppError::Conflict(
                        "You have an ongoing offer letter request".to_string(),
                    ));
                }
            }
        }

        let property = store
            .find_property(&mut tx, app.property_id)
            .await?
            .ok_or_else(|| AppError::not_found("Property", app.property_id))?;
        let ctx = routing_context(store, &mut tx, &app).await?;

        let (review, approval) = self
            .engine
            .start(
                store,
                &mut tx,
                actor.user_id,
                ReviewKind::OfferLetter(app.financing_type),
                &property.name,
                &ctx,
            )
            .await?;

        let now = Utc::now();
        let offer_letter = OfferLetter {
            id: Uuid::new_v4(),
            application_id: app.id,
            review_request_id: review.id,
            status: DecisionStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        store.insert_offer_letter(&mut tx, &offer_letter).await?;

        app.offer_letter_id = Some(offer_letter.id);
        app.updated_at = now;
        store.update_application(&mut tx, &app).await?;
        append_stage(
            store,
            &mut tx,
            app.id,
            ApplicationStage::OfferLetterRequested,
            actor.user_id,
        )
        .await?;

        store.commit(tx).await?;

        tracing::info!(
            application_id = %app.id,
            offer_letter_id = %offer_letter.id,
            review_request_id = %review.id,
            "Offer letter requested"
        );
        self.activity
            .record(Activity::new(actor.user_id, app.id, "offer_letter_requested"));
        notifications::send(
            self.notifier.as_ref(),
            Notification::new("review_approval_pending", Recipient::Organization(approval.organization_id))
                .with("application_id", app.id)
                .with("approval_id", approval.id)
                .with("request_type", &review.request_type),
        )
        .await;

        Ok(OfferLetterSubmission {
            offer_letter,
            approval,
        })
    }

    /// Resolve one review approval and apply a terminal outcome to the
    /// offer letter or escrow meeting the review belongs to
    pub async fn resolve_review_approval(
        &self,
        actor: &Actor,
        approval_id: Uuid,
        decision: Decision,
    ) -> AppResult<ReviewOutcome> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let approval = store
            .find_approval(&mut tx, approval_id)
            .await?
            .ok_or_else(|| AppError::not_found("Review approval", approval_id))?;

        let (subject, application_id) = match store
            .find_offer_letter_by_review(&mut tx, approval.review_request_id)
            .await?
        {
            Some(letter) => {
                let application_id = letter.application_id;
                (Subject::OfferLetter(letter), application_id)
            }
            None => {
                let escrow = store
                    .find_escrow_status_by_review(&mut tx, approval.review_request_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "review request {} has no subject",
                            approval.review_request_id
                        ))
                    })?;
                (Subject::EscrowMeeting(escrow.id), escrow.application_id)
            }
        };

        let mut app = load_application(store, &mut tx, application_id).await?;
        ensure_open(&app)?;
        let ctx = routing_context(store, &mut tx, &app).await?;

        let outcome = self
            .engine
            .resolve_approval(store, &mut tx, approval_id, decision, actor, &ctx)
            .await?;

        let mut follow_up = None;
        let mut buyer_notice = None;

        if let Some(status) = outcome.terminal {
            match subject {
                Subject::OfferLetter(letter) => {
                    store.set_offer_letter_status(&mut tx, letter.id, status).await?;

                    if status == DecisionStatus::Approved {
                        app.set_status(ApplicationStatus::Processing);
                        store.update_application(&mut tx, &app).await?;
                        append_stage(
                            store,
                            &mut tx,
                            app.id,
                            ApplicationStage::OfferLetterApproved,
                            actor.user_id,
                        )
                        .await?;

                        if app.financing_type == FinancingType::Mortgage {
                            follow_up = app.eligibility_id.map(|eligibility_id| {
                                JobPayload::GenerateDip(EligibilityJob { eligibility_id })
                            });
                        }
                        buyer_notice = Some("offer_letter_approved");
                    } else {
                        append_stage(
                            store,
                            &mut tx,
                            app.id,
                            ApplicationStage::OfferLetterRejected,
                            actor.user_id,
                        )
                        .await?;
                        buyer_notice = Some("offer_letter_rejected");
                    }
                }
                Subject::EscrowMeeting(escrow_status_id) => {
                    let target = if status == DecisionStatus::Approved {
                        EscrowMeetingStatus::AwaitingAcceptance
                    } else {
                        EscrowMeetingStatus::Declined
                    };
                    if !store
                        .transition_escrow_status(
                            &mut tx,
                            escrow_status_id,
                            EscrowMeetingStatus::Awaiting,
                            target,
                        )
                        .await?
                    {
                        return Err(AppError::Conflict(
                            "Escrow meeting is no longer awaiting review".to_string(),
                        ));
                    }
                    buyer_notice = Some(if status == DecisionStatus::Approved {
                        "escrow_meeting_awaiting_acceptance"
                    } else {
                        "escrow_meeting_declined"
                    });
                }
            }
        }

        store.commit(tx).await?;

        tracing::info!(
            application_id = %app.id,
            approval_id = %approval_id,
            decision = ?decision,
            terminal = ?outcome.terminal,
            "Review approval resolved"
        );
        self.activity
            .record(Activity::new(actor.user_id, app.id, "review_approval_resolved"));

        // The approval is committed; the DIP sweep picks up a failed enqueue
        if let Some(payload) = follow_up {
            if let Err(e) = self.jobs.enqueue(payload) {
                tracing::warn!(application_id = %app.id, error = %e, "DIP generation not enqueued");
            }
        }
        if let Some(next) = &outcome.next {
            notifications::send(
                self.notifier.as_ref(),
                Notification::new("review_approval_pending", Recipient::Organization(next.organization_id))
                    .with("application_id", app.id)
                    .with("approval_id", next.id)
                    .with("request_type", &outcome.request.request_type),
            )
            .await;
        }
        if let Some(template) = buyer_notice {
            notifications::send(
                self.notifier.as_ref(),
                Notification::new(template, Recipient::User(app.user_id))
                    .with("application_id", app.id),
            )
            .await;
        }

        Ok(outcome)
    }

    pub async fn request_property_closing(
        &self,
        actor: &Actor,
        application_id: Uuid,
    ) -> AppResult<PropertyClosing> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut app = load_application(store, &mut tx, application_id).await?;
        ensure_open(&app)?;
        ensure_owner(&app, actor)?;

        if app.financing_type == FinancingType::Mortgage {
            return Err(AppError::Forbidden(
                "Mortgage purchases close through loan origination".to_string(),
            ));
        }

        let letter_approved = match app.offer_letter_id {
            Some(id) => store
                .find_offer_letter(&mut tx, id)
                .await?
                .map(|l| l.status == DecisionStatus::Approved)
                .unwrap_or(false),
            None => false,
        };
        if !letter_approved {
            return Err(AppError::Forbidden(
                "The offer letter must be approved before closing".to_string(),
            ));
        }

        if let Some(closing_id) = app.property_closing_id {
            if let Some(closing) = store.find_closing(&mut tx, closing_id).await? {
                if closing.status != DecisionStatus::Rejected {
                    return Err(AppError::Conflict(
                        "You have an ongoing property closing request".to_string(),
                    ));
                }
            }
        }

        let developer = routing_context(store, &mut tx, &app)
            .await?
            .developer_organization_id;

        let closing = PropertyClosing {
            id: Uuid::new_v4(),
            application_id: app.id,
            status: DecisionStatus::Pending,
            decided_by: None,
            decided_at: None,
            created_at: Utc::now(),
        };
        store.insert_closing(&mut tx, &closing).await?;

        app.property_closing_id = Some(closing.id);
        app.updated_at = Utc::now();
        store.update_application(&mut tx, &app).await?;
        append_stage(
            store,
            &mut tx,
            app.id,
            ApplicationStage::PropertyClosingRequested,
            actor.user_id,
        )
        .await?;

        store.commit(tx).await?;

        tracing::info!(application_id = %app.id, closing_id = %closing.id, "Property closing requested");
        self.activity
            .record(Activity::new(actor.user_id, app.id, "property_closing_requested"));
        if let Some(org) = developer {
            notifications::send(
                self.notifier.as_ref(),
                Notification::new("property_closing_requested", Recipient::Organization(org))
                    .with("application_id", app.id)
                    .with("closing_id", closing.id),
            )
            .await;
        }

        Ok(closing)
    }

    /// The property's developer approves or rejects a closing
    pub async fn respond_to_property_closing(
        &self,
        actor: &Actor,
        closing_id: Uuid,
        approve: bool,
    ) -> AppResult<PropertyClosing> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut closing = store
            .find_closing(&mut tx, closing_id)
            .await?
            .ok_or_else(|| AppError::not_found("Property closing", closing_id))?;
        let mut app = load_application(store, &mut tx, closing.application_id).await?;
        ensure_open(&app)?;

        let ctx = routing_context(store, &mut tx, &app).await?;
        if !ctx
            .developer_organization_id
            .map(|org| actor.acts_for(org))
            .unwrap_or(false)
        {
            return Err(AppError::Forbidden(
                "Only the property developer can decide a closing".to_string(),
            ));
        }

        let status = Decision::from_accept(approve).status();
        let now = Utc::now();
        if !store
            .decide_closing(&mut tx, closing.id, status, actor.user_id, now)
            .await?
        {
            return Err(AppError::Conflict(
                "This property closing has already been decided".to_string(),
            ));
        }
        closing.status = status;
        closing.decided_by = Some(actor.user_id);
        closing.decided_at = Some(now);

        if status == DecisionStatus::Approved {
            app.set_status(ApplicationStatus::Completed);
            store.update_application(&mut tx, &app).await?;
            append_stage(
                store,
                &mut tx,
                app.id,
                ApplicationStage::PropertyClosingApproved,
                actor.user_id,
            )
            .await?;
        }

        store.commit(tx).await?;

        tracing::info!(
            application_id = %app.id,
            closing_id = %closing.id,
            status = ?status,
            "Property closing decided"
        );
        self.activity
            .record(Activity::new(actor.user_id, app.id, "property_closing_decided"));
        notifications::send(
            self.notifier.as_ref(),
            Notification::new(
                if approve {
                    "property_closing_approved"
                } else {
                    "property_closing_rejected"
                },
                Recipient::User(app.user_id),
            )
            .with("application_id", app.id),
        )
        .await;

        Ok(closing)
    }
}
