//! OAuth-mediated mailbox API variant of the mail gateway.
//!
//! The concrete provider SDK (Gmail API, Microsoft Graph, ...) is out of
//! scope per spec.md §1; this adapter speaks to whatever REST surface is
//! configured via `base_url`, matching the generic reqwest-client shape
//! used elsewhere in this crate's HTTP integrations.

use crate::error::CoreError;
use crate::mail::{MailGateway, MessageRef};
use crate::models::{AttachmentBlob, IncomingMessage};
use crate::retry::with_backoff;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Clone)]
pub struct OAuthMailGateway {
    http: reqwest::Client,
    base_url: String,
    mailbox: String,
    access_token: String,
}

impl OAuthMailGateway {
    pub fn new(base_url: String, mailbox: String, access_token: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            mailbox,
            access_token,
        }
    }
}

#[derive(Deserialize)]
struct MessageListResponse {
    messages: Vec<MessageSummary>,
}

#[derive(Deserialize)]
struct MessageSummary {
    id: String,
}

#[derive(Deserialize)]
struct MessagePayload {
    id: String,
    subject: String,
    sender: String,
    received_at: chrono::DateTime<chrono::Utc>,
    body_plain: String,
    body_html: Option<String>,
    attachments: Vec<AttachmentPayload>,
}

#[derive(Deserialize)]
struct AttachmentPayload {
    name: String,
    content_type: String,
    #[serde(with = "base64_bytes")]
    data: Vec<u8>,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[async_trait]
impl MailGateway for OAuthMailGateway {
    async fn list_unprocessed(&self, subject_prefix: &str) -> Result<Vec<MessageRef>, CoreError> {
        let url = format!(
            "{}/mailboxes/{}/messages?unread=true&subjectPrefix={}",
            self.base_url.trim_end_matches('/'),
            self.mailbox,
            urlencode(subject_prefix)
        );

        let response = with_backoff(|| async {
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| CoreError::MailFetchFailed(e.to_string()))
        })
        .await?;

        let parsed: MessageListResponse = response
            .json()
            .await
            .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;

        Ok(parsed
            .messages
            .into_iter()
            .map(|m| MessageRef(m.id))
            .collect())
    }

    async fn fetch(&self, message_ref: &MessageRef) -> Result<IncomingMessage, CoreError> {
        let url = format!(
            "{}/mailboxes/{}/messages/{}",
            self.base_url.trim_end_matches('/'),
            self.mailbox,
            message_ref.0
        );

        let payload: MessagePayload = with_backoff(|| async {
            self.http
                .get(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?
                .json()
                .await
                .map_err(|e| CoreError::MailFetchFailed(e.to_string()))
        })
        .await?;

        Ok(IncomingMessage {
            id: payload.id,
            subject: payload.subject,
            sender: payload.sender,
            received_at: payload.received_at,
            body_plain: payload.body_plain,
            body_html: payload.body_html,
            attachments: payload
                .attachments
                .into_iter()
                .map(|a| AttachmentBlob {
                    original_name: a.name,
                    content_type: a.content_type,
                    bytes: a.data,
                })
                .collect(),
        })
    }

    async fn mark_processed(&self, message_ref: &MessageRef) -> Result<(), CoreError> {
        let url = format!(
            "{}/mailboxes/{}/messages/{}/processed",
            self.base_url.trim_end_matches('/'),
            self.mailbox,
            message_ref.0
        );

        with_backoff(|| async {
            self.http
                .post(&url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .map_err(|e| CoreError::MailFetchFailed(e.to_string()))
        })
        .await?;

        Ok(())
    }
}

fn urlencode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{b:02X}"),
        })
        .collect()
}
