use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::coordinator::AbortOnDrop;
use super::domain::{Application, ApplicationId, OwnerId};

pub const NOTIFICATION_TITLE: &str = "Rooftop Solar Verification Update";

/// Status-change message handed to the push-delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotification {
    pub application_id: ApplicationId,
    pub recipient: OwnerId,
    pub title: String,
    pub body: String,
    pub data: BTreeMap<String, String>,
}

impl StatusNotification {
    pub fn status_changed(application: &Application) -> Self {
        let id = &application.id.0;
        let suffix_start = id
            .char_indices()
            .rev()
            .nth(3)
            .map_or(0, |(index, _)| index);
        let status = application.status.label();

        let mut data = BTreeMap::new();
        data.insert("app_id".to_string(), id.clone());
        data.insert("status".to_string(), status.to_string());

        Self {
            application_id: application.id.clone(),
            recipient: application.owner.clone(),
            title: NOTIFICATION_TITLE.to_string(),
            body: format!(
                "Your application (ID: {}) status is now: {}.",
                &id[suffix_start..],
                status.to_ascii_uppercase()
            ),
            data,
        }
    }
}

/// Notification dispatch error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NotificationError {
    #[error("no device registered for recipient")]
    NoRecipient,
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Outbound push-notification hook.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: StatusNotification) -> Result<(), NotificationError>;
}

/// Fire-and-forget delivery: failures, panics and timeouts are logged, never returned.
///
/// The send runs on its own task so a misbehaving sink cannot unwind into the caller.
pub(crate) async fn dispatch_best_effort<N>(
    sink: Arc<N>,
    notification: StatusNotification,
    deadline: Duration,
) where
    N: NotificationSink + ?Sized + 'static,
{
    let application_id = notification.application_id.clone();
    let task = AbortOnDrop(tokio::spawn(async move { sink.send(notification).await }));
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(Ok(()))) => debug!(%application_id, "status notification sent"),
        Ok(Ok(Err(err))) => warn!(%application_id, error = %err, "status notification failed"),
        Ok(Err(join_error)) => {
            warn!(%application_id, error = %join_error, "status notification sink faulted")
        }
        Err(_) => warn!(%application_id, ?deadline, "status notification timed out"),
    }
}
