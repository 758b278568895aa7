//! Notification fan-out port.
//!
//! Events are pushed to the account's live connections, if any, after the
//! state change that triggered them has committed. Delivery is best effort
//! and at most once: implementations must not block and must swallow their
//! own failures.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Money, Party};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    /// A receiver bound the sender's token; the sender should now authorize.
    TokenBound {
        token: String,
        amount: Money,
        receiver: Party,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, account_id: Uuid, event: &NotificationEvent);
}

/// Drops every event. Used when no live channel is wired in.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, account_id: Uuid, _event: &NotificationEvent) {
        tracing::debug!(%account_id, "no notifier configured, dropping event");
    }
}
