//! Escrow service layer - escrow meeting scheduling and responses

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::application::service::{
    append_stage, ensure_open, ensure_owner, load_application, routing_context,
};
use crate::application::ApplicationStage;
use crate::error::{AppError, AppResult};
use crate::escrow::{
    EscrowInformation, EscrowMeeting, EscrowMeetingStatus, EscrowStatus,
    ScheduleEscrowMeetingRequest,
};
use crate::models::{Actor, DecisionStatus};
use crate::notifications::{self, Activity, ActivityLog, Notification, Notifier, Recipient};
use crate::repository::Store;
use crate::review::{ReviewEngine, ReviewKind};

/// Escrow service for managing escrow meetings
pub struct EscrowService<S: Store> {
    store: Arc<S>,
    engine: ReviewEngine,
    notifier: Arc<dyn Notifier>,
    activity: Arc<dyn ActivityLog>,
}

impl<S: Store> Clone for EscrowService<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            engine: self.engine,
            notifier: self.notifier.clone(),
            activity: self.activity.clone(),
        }
    }
}

impl<S: Store> EscrowService<S> {
    pub fn new(
        store: Arc<S>,
        engine: ReviewEngine,
        notifier: Arc<dyn Notifier>,
        activity: Arc<dyn ActivityLog>,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
            activity,
        }
    }

    /// Schedule a meeting and start its confirmation review
    pub async fn schedule_escrow_meeting(
        &self,
        actor: &Actor,
        application_id: Uuid,
        request: ScheduleEscrowMeetingRequest,
    ) -> AppResult<EscrowMeeting> {
        request.validate()?;
        request
            .validate_schedule(Utc::now())
            .map_err(AppError::Invalid)?;

        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let mut app = load_application(store, &mut tx, application_id).await?;
        ensure_open(&app)?;
        ensure_owner(&app, actor)?;

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
                "The offer letter must be approved before scheduling escrow".to_string(),
            ));
        }

        if let Some(status_id) = app.escrow_status_id {
            if let Some(existing) = store.find_escrow_status(&mut tx, status_id).await? {
                if !existing.status.is_terminal() {
                    return Err(AppError::Conflict(
                        "You have an ongoing escrow meeting request".to_string(),
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
                ReviewKind::EscrowMeeting,
                &property.name,
                &ctx,
            )
            .await?;

        let now = Utc::now();
        let status = EscrowStatus {
            id: Uuid::new_v4(),
            application_id: app.id,
            review_request_id: review.id,
            status: EscrowMeetingStatus::Awaiting,
            created_at: now,
            updated_at: now,
        };
        store.insert_escrow_status(&mut tx, &status).await?;

        let information = EscrowInformation {
            id: Uuid::new_v4(),
            application_id: app.id,
            escrow_status_id: status.id,
            meeting_at: request.meeting_at,
            location: request.location,
            attendees: request.attendees,
            created_at: now,
        };
        store.insert_escrow_information(&mut tx, &information).await?;

        app.escrow_status_id = Some(status.id);
        app.escrow_information_id = Some(information.id);
        app.updated_at = now;
        store.update_application(&mut tx, &app).await?;
        append_stage(
            store,
            &mut tx,
            app.id,
            ApplicationStage::EscrowMeetingScheduled,
            actor.user_id,
        )
        .await?;

        store.commit(tx).await?;

        tracing::info!(
            application_id = %app.id,
            escrow_status_id = %status.id,
            meeting_at = %information.meeting_at,
            "Escrow meeting scheduled"
        );
        self.activity
            .record(Activity::new(actor.user_id, app.id, "escrow_meeting_scheduled"));
        notifications::send(
            self.notifier.as_ref(),
            Notification::new("review_approval_pending", Recipient::Organization(approval.organization_id))
                .with("application_id", app.id)
                .with("approval_id", approval.id)
                .with("request_type", &review.request_type),
        )
        .await;

        Ok(EscrowMeeting {
            status,
            information,
        })
    }

    /// The buyer accepts or declines a meeting the reviewers confirmed
    pub async fn respond_to_escrow_meeting(
        &self,
        actor: &Actor,
        application_id: Uuid,
        accept: bool,
    ) -> AppResult<EscrowStatus> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let app = load_application(store, &mut tx, application_id).await?;
        ensure_open(&app)?;
        ensure_owner(&app, actor)?;

        let status_id = app
            .escrow_status_id
            .ok_or_else(|| AppError::NotFound("No escrow meeting for this application".to_string()))?;
        let mut status = store
            .find_escrow_status(&mut tx, status_id)
            .await?
            .ok_or_else(|| AppError::not_found("Escrow status", status_id))?;

        if status.status != EscrowMeetingStatus::AwaitingAcceptance {
            return Err(AppError::Forbidden(
                "Escrow meeting is not awaiting your response".to_string(),
            ));
        }

        let target = if accept {
            EscrowMeetingStatus::Confirmed
        } else {
            EscrowMeetingStatus::Declined
        };
        if !store
            .transition_escrow_status(&mut tx, status.id, status.status, target)
            .await?
        {
            return Err(AppError::Conflict(
                "Escrow meeting was answered concurrently".to_string(),
            ));
        }
        status.status = target;
        status.updated_at = Utc::now();

        if accept {
            append_stage(
                store,
                &mut tx,
                app.id,
                ApplicationStage::EscrowMeetingConfirmed,
                actor.user_id,
            )
            .await?;
        }

        let developer = routing_context(store, &mut tx, &app)
            .await?
            .developer_organization_id;

        store.commit(tx).await?;

        tracing::info!(
            application_id = %app.id,
            escrow_status_id = %status.id,
            status = ?status.status,
            "Escrow meeting answered"
        );
        self.activity
            .record(Activity::new(actor.user_id, app.id, "escrow_meeting_answered"));
        if let Some(org) = developer {
            notifications::send(
                self.notifier.as_ref(),
                Notification::new(
                    if accept {
                        "escrow_meeting_confirmed"
                    } else {
                        "escrow_meeting_declined"
                    },
                    Recipient::Organization(org),
                )
                .with("application_id", app.id),
            )
            .await;
        }

        Ok(status)
    }

    pub async fn get_escrow_meeting(
        &self,
        actor: &Actor,
        application_id: Uuid,
    ) -> AppResult<EscrowMeeting> {
        let store = self.store.as_ref();
        let mut tx = store.begin().await?;

        let app = load_application(store, &mut tx, application_id).await?;
        ensure_owner(&app, actor)?;

        let not_scheduled = || AppError::NotFound("No escrow meeting for this application".to_string());
        let status_id = app.escrow_status_id.ok_or_else(not_scheduled)?;
        let information_id = app.escrow_information_id.ok_or_else(not_scheduled)?;

        let status = store
            .find_escrow_status(&mut tx, status_id)
            .await?
            .ok_or_else(not_scheduled)?;
        let information = store
            .find_escrow_information(&mut tx, information_id)
            .await?
            .ok_or_else(not_scheduled)?;

        Ok(EscrowMeeting {
            status,
            information,
        })
    }
}
