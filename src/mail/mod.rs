//! Mail gateway adapter (C4): polls a mailbox, fetches messages, downloads
//! attachments, and applies a durable processed marker.
//!
//! Two transport variants share one capability surface, selected by
//! configuration rather than a class hierarchy: OAuth-mediated API access
//! (`oauth`) and IMAP (`imap_gateway`).

pub mod imap_gateway;
pub mod oauth;

use crate::error::CoreError;
use crate::models::IncomingMessage;
use async_trait::async_trait;

/// Opaque, mailbox-assigned reference to an unprocessed message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageRef(pub String);

/// The capability set every mail transport variant implements.
#[async_trait]
pub trait MailGateway: Send + Sync {
    /// List messages whose subject starts with `subject_prefix` and which
    /// have not yet received the processed marker. Ordering is
    /// mailbox-native; callers must not depend on it.
    async fn list_unprocessed(&self, subject_prefix: &str) -> Result<Vec<MessageRef>, CoreError>;

    /// Fetch the full message (body + attachments) for a reference.
    async fn fetch(&self, message_ref: &MessageRef) -> Result<IncomingMessage, CoreError>;

    /// Apply the durable processed marker. Idempotent: a second call on the
    /// same reference is a no-op.
    async fn mark_processed(&self, message_ref: &MessageRef) -> Result<(), CoreError>;
}

/// Selects which concrete `MailGateway` variant to construct, read from
/// the `MAIL_TRANSPORT` configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayKind {
    OAuthApi,
    Imap,
}

impl GatewayKind {
    pub fn from_env_str(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "imap" => GatewayKind::Imap,
            _ => GatewayKind::OAuthApi,
        }
    }
}
