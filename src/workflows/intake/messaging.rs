//! Message delivery tracker.
//!
//! A sent message starts `Pending` and resolves exactly once to `Delivered`
//! or `Not Delivered` via an asynchronous provider callback. Callbacks for a
//! superseded message (the applicant's latest message has a newer id) are
//! ignored rather than rewinding newer state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    Applicant, Message, MessageAnalytics, MessageDeliveryStatus, MessageId, MessageResponseData,
};

/// Payload the delivery provider posts back after attempting a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryCallback {
    pub message_id: MessageId,
    pub status: MessageDeliveryStatus,
    pub reject_reason: Option<String>,
    pub analytics: Option<MessageAnalytics>,
}

/// Whether a callback resolved the message or was dropped as stale/duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// First transition out of `Pending`; counts toward `messages_sent`.
    Resolved(MessageDeliveryStatus),
    Ignored,
}

/// Apply a delivery callback to the applicant's latest message.
pub fn record_delivery(
    applicant: &mut Applicant,
    message: &mut Message,
    callback: &DeliveryCallback,
    now: DateTime<Utc>,
) -> DeliveryOutcome {
    if !callback.status.is_resolved() {
        return DeliveryOutcome::Ignored;
    }

    let latest = match applicant.latest_message.as_mut() {
        Some(latest) if latest.id == callback.message_id => latest,
        // A newer message was sent since this one went out.
        _ => return DeliveryOutcome::Ignored,
    };
    if latest.status.is_resolved() {
        return DeliveryOutcome::Ignored;
    }

    latest.status = callback.status;
    message.updated_at = Some(now);
    message.response = Some(MessageResponseData {
        id: callback.message_id.0.clone(),
        status: callback.status,
        reject_reason: callback.reject_reason.clone(),
        analytics: callback.analytics,
    });

    DeliveryOutcome::Resolved(callback.status)
}
