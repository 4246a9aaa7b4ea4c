//! Notification and activity-log collaborators
//!
//! Content and delivery belong to other services; this crate only decides
//! when a notification fires and with which data.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    User(Uuid),
    Organization(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub template: String,
    pub recipient: Recipient,
    pub data: BTreeMap<String, String>,
}

impl Notification {
    pub fn new(template: &str, recipient: Recipient) -> Self {
        Self {
            template: template.to_string(),
            recipient,
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.data.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(#[from] reqwest::Error),

    #[error("notification endpoint answered {0}")]
    Rejected(reqwest::StatusCode),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Deliver a notification; failures are logged and never fail the caller
pub async fn send(notifier: &dyn Notifier, notification: Notification) {
    let template = notification.template.clone();
    if let Err(e) = notifier.notify(notification).await {
        tracing::warn!(template = %template, error = %e, "Notification not delivered");
    }
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        tracing::info!(
            template = %notification.template,
            recipient = ?notification.recipient,
            data = ?notification.data,
            "Notification triggered"
        );
        Ok(())
    }
}

/// POSTs notifications as JSON to the messaging service
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            url,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), NotifyError> {
        let response = self.client.post(&self.url).json(&notification).send().await?;
        if !response.status().is_success() {
            return Err(NotifyError::Rejected(response.status()));
        }
        tracing::debug!(template = %notification.template, "Notification delivered");
        Ok(())
    }
}

/// Audit trail entry for a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub actor_id: Uuid,
    pub application_id: Uuid,
    pub action: &'static str,
}

impl Activity {
    pub fn new(actor_id: Uuid, application_id: Uuid, action: &'static str) -> Self {
        Self {
            actor_id,
            application_id,
            action,
        }
    }
}

pub trait ActivityLog: Send + Sync {
    fn record(&self, activity: Activity);
}

#[derive(Debug, Default, Clone)]
pub struct TracingActivityLog;

impl ActivityLog for TracingActivityLog {
    fn record(&self, activity: Activity) {
        tracing::info!(
            target: "activity",
            actor_id = %activity.actor_id,
            application_id = %activity.application_id,
            action = activity.action,
            "Activity recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_builder() {
        let user = Uuid::new_v4();
        let n = Notification::new("loan_generated", Recipient::User(user))
            .with("loan_id", "abc")
            .with("payments", 12);

        assert_eq!(n.data.get("payments").map(String::as_str), Some("12"));
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["recipient"]["type"], "user");
        assert_eq!(json["recipient"]["id"], user.to_string());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_everything() {
        let n = Notification::new("repayment_overdue", Recipient::Organization(Uuid::new_v4()));
        assert!(LogNotifier.notify(n).await.is_ok());
    }
}
