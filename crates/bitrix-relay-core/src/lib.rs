//! # Bitrix Relay Core
//!
//! Domain logic for turning Bitrix24 task webhooks into Telegram notifications.
//!
//! The pipeline runs in five steps:
//! 1. [`payload::normalize`] turns a request body of unknown encoding into an
//!    [`InboundPayload`].
//! 2. [`task_id::extract_task_id`] finds the task identifier in that payload.
//! 3. A [`TaskFetcher`] loads the [`TaskRecord`] from the tracker.
//! 4. The [`MessageComposer`] renders the notification text.
//! 5. A [`Notifier`] delivers it on a detached task.
//!
//! [`WebhookRelay`] ties the steps together. Infrastructure (HTTP clients,
//! the HTTP server) lives in other crates and is injected through the
//! [`TaskFetcher`] and [`Notifier`] traits.
//!
//! ## Usage
//!
//! ```rust
//! use bitrix_relay_core::payload::{normalize, RawRequest};
//! use bitrix_relay_core::task_id::extract_task_id;
//!
//! let payload = normalize(&RawRequest::new(br#"{"id": "42"}"#, None));
//! let task_id = extract_task_id(&payload).unwrap();
//! assert_eq!(task_id.as_str(), "42");
//! ```

pub mod composer;
pub mod notification;
pub mod payload;
pub mod relay;
pub mod task;
pub mod task_id;
pub mod templates;

pub use composer::{MessageComposer, NotificationKind};
pub use notification::{ChatDestination, DeliveryError, Notifier, OutboundMessage};
pub use payload::{InboundPayload, PayloadEncoding, RawRequest};
pub use relay::{RelayError, RelayOutcome, WebhookRelay};
pub use task::{FetchError, TaskFetcher, TaskRecord};
pub use task_id::{TaskId, TaskIdError};
pub use templates::{NotificationTemplates, TemplateError};
