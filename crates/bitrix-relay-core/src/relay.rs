//! # Webhook Relay
//!
//! Runs one webhook through the pipeline: payload → task id → task record →
//! message → detached delivery.
//!
//! Delivery is spawned on its own task and never awaited by the webhook
//! handler, so a slow or failing messaging API cannot delay or fail the
//! acknowledgment sent back to Bitrix24. Delivery failures reach the log only.

use crate::composer::{MessageComposer, NotificationKind};
use crate::notification::{ChatDestination, DeliveryError, Notifier, OutboundMessage};
use crate::payload::InboundPayload;
use crate::task::{FetchError, TaskFetcher};
use crate::task_id::{extract_task_id, TaskId, TaskIdError};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, instrument, warn, Instrument};

/// Error text reported for requests no parser could decode
pub const MALFORMED_REQUEST_MESSAGE: &str = "Malformed request";

/// Error text reported for missing or placeholder task ids
pub const INVALID_TASK_ID_MESSAGE: &str = "No valid task id";

/// Error text reported when the tracker could not supply the task
pub const TASK_NOT_FOUND_MESSAGE: &str = "Task not found";

/// Failures that end a webhook request before anything is sent
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// No supported encoding matched the request.
    #[error("Malformed request: no supported payload encoding matched")]
    MalformedRequest,

    /// The payload holds no usable task id.
    #[error("Invalid task id: {0}")]
    InvalidTaskId(#[from] TaskIdError),

    /// The tracker had no such task or could not be reached.
    #[error("Task lookup failed: {0}")]
    TaskUnavailable(#[from] FetchError),
}

impl RelayError {
    /// Short error text safe to return to the webhook sender
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::MalformedRequest => MALFORMED_REQUEST_MESSAGE,
            Self::InvalidTaskId(_) => INVALID_TASK_ID_MESSAGE,
            Self::TaskUnavailable(_) => TASK_NOT_FOUND_MESSAGE,
        }
    }

    /// Stable label for log fields
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedRequest => "malformed_request",
            Self::InvalidTaskId(TaskIdError::Missing) => "missing_task_id",
            Self::InvalidTaskId(TaskIdError::UnresolvedPlaceholder { .. }) => "placeholder_task_id",
            Self::TaskUnavailable(FetchError::NotFound { .. }) => "task_not_found",
            Self::TaskUnavailable(_) => "tracker_unreachable",
        }
    }
}

/// Result of a successfully relayed webhook
#[derive(Debug)]
pub struct RelayOutcome {
    pub task_id: TaskId,
    pub kind: NotificationKind,

    /// Handle of the detached delivery task.
    ///
    /// Dropping it leaves the task running; tests await it to observe the
    /// delivery result.
    pub delivery: JoinHandle<Result<(), DeliveryError>>,
}

/// The webhook-to-notification pipeline
pub struct WebhookRelay {
    fetcher: Arc<dyn TaskFetcher>,
    notifier: Arc<dyn Notifier>,
    composer: MessageComposer,
    destination: ChatDestination,
}

impl WebhookRelay {
    pub fn new(
        fetcher: Arc<dyn TaskFetcher>,
        notifier: Arc<dyn Notifier>,
        composer: MessageComposer,
        destination: ChatDestination,
    ) -> Self {
        Self {
            fetcher,
            notifier,
            composer,
            destination,
        }
    }

    pub fn destination(&self) -> &ChatDestination {
        &self.destination
    }

    /// Relay one normalized webhook payload.
    ///
    /// Returns once the notification has been composed and its delivery
    /// spawned; delivery itself is not awaited.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError`] when the payload is unparseable, carries no
    /// valid task id, or the task cannot be fetched. No fetch happens for an
    /// invalid id and no delivery happens for a failed fetch.
    #[instrument(skip(self, payload), fields(encoding = ?payload.encoding()))]
    pub async fn relay(&self, payload: &InboundPayload) -> Result<RelayOutcome, RelayError> {
        if !payload.is_parsed() {
            return Err(RelayError::MalformedRequest);
        }

        let task_id = extract_task_id(payload)?;
        let kind = NotificationKind::from_payload(payload);

        let task = self.fetcher.fetch_task(&task_id).await.inspect_err(|e| {
            warn!(task_id = %task_id, error = %e, "Could not load task from tracker");
        })?;

        let text = self.composer.compose(kind, &task);
        let message = OutboundMessage::new(text, self.destination.clone());
        let delivery = self.dispatch(message, &task_id);

        info!(
            task_id = %task_id,
            kind = %kind,
            destination = %self.destination,
            "Notification composed and handed off for delivery"
        );

        Ok(RelayOutcome {
            task_id,
            kind,
            delivery,
        })
    }

    /// Spawn delivery as a detached task whose failures are only logged.
    fn dispatch(
        &self,
        message: OutboundMessage,
        task_id: &TaskId,
    ) -> JoinHandle<Result<(), DeliveryError>> {
        let notifier = Arc::clone(&self.notifier);
        let span = info_span!("deliver_notification", task_id = %task_id);

        tokio::spawn(
            async move {
                let result = notifier.notify(&message).await;
                match &result {
                    Ok(()) => info!(destination = %message.destination, "Notification delivered"),
                    Err(e) => error!(
                        destination = %message.destination,
                        error = %e,
                        "Notification delivery failed"
                    ),
                }
                result
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
#[path = "relay_tests.rs"]
mod tests;
