use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The template chosen for one reconciliation pass, in priority order.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotificationKind {
    NewFailures,
    ContinuedFailures,
    TransientFailures,
    AllPassing,
    Inactive,
}

#[derive(Serialize, Clone, Debug, Eq, PartialEq)]
pub struct EmailMessage {
    pub id: String,
    pub kind: NotificationKind,
    pub recipients: BTreeSet<String>,
    pub subject: String,
    pub html_body: String,
}

/// Payload posted to the mail relay, one per recipient.
#[derive(Serialize, Deserialize, Clone, Debug, Eq, PartialEq)]
pub struct RelayRequest {
    pub id: String,
    pub to: String,
    pub subject: String,
    pub html: String,
}
