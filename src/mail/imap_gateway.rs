//! IMAP transport variant of the mail gateway.
//!
//! Unprocessed messages are those without the configured processed keyword;
//! marking a message applies that keyword rather than moving or deleting
//! it, matching the durable, idempotent marker semantics the trait
//! requires.

use crate::error::CoreError;
use crate::mail::{MailGateway, MessageRef};
use crate::models::{AttachmentBlob, IncomingMessage};
use crate::retry::with_backoff;
use async_imap::types::Fetch;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use mailparse::{MailHeaderMap, ParsedMail};
use tokio::sync::Mutex;

pub struct ImapMailGateway {
    host: String,
    port: u16,
    username: String,
    password: String,
    mailbox: String,
    processed_flag: String,
    session: Mutex<Option<async_imap::Session<async_native_tls::TlsStream<tokio::net::TcpStream>>>>,
}

impl ImapMailGateway {
    pub fn new(
        host: String,
        port: u16,
        username: String,
        password: String,
        mailbox: String,
        processed_flag: String,
    ) -> Self {
        Self {
            host,
            port,
            username,
            password,
            mailbox,
            processed_flag,
            session: Mutex::new(None),
        }
    }

    async fn connect(
        &self,
    ) -> Result<async_imap::Session<async_native_tls::TlsStream<tokio::net::TcpStream>>, CoreError> {
        let tcp = tokio::net::TcpStream::connect((self.host.as_str(), self.port))
            .await
            .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;
        let tls = async_native_tls::connect(self.host.as_str(), tcp)
            .await
            .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;
        let client = async_imap::Client::new(tls);
        let mut session = client
            .login(&self.username, &self.password)
            .await
            .map_err(|(e, _client)| CoreError::MailFetchFailed(e.to_string()))?;
        session
            .select(&self.mailbox)
            .await
            .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;
        Ok(session)
    }

    async fn with_session<T, F, Fut>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut async_imap::Session<async_native_tls::TlsStream<tokio::net::TcpStream>>) -> Fut,
        Fut: std::future::Future<Output = Result<T, CoreError>>,
    {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }
        let session = guard.as_mut().expect("session populated above");
        f(session).await
    }
}

fn parsed_to_incoming(uid: u32, parsed: &ParsedMail) -> IncomingMessage {
    let subject = parsed
        .headers
        .get_first_value("Subject")
        .unwrap_or_default();
    let sender = parsed.headers.get_first_value("From").unwrap_or_default();
    let received_at = parsed
        .headers
        .get_first_value("Date")
        .and_then(|raw| mailparse::dateparse(&raw).ok())
        .and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .unwrap_or_else(Utc::now);

    let mut body_plain = String::new();
    let mut body_html = None;
    let mut attachments = Vec::new();
    collect_parts(parsed, &mut body_plain, &mut body_html, &mut attachments);

    IncomingMessage {
        id: uid.to_string(),
        subject,
        sender,
        received_at,
        body_plain,
        body_html,
        attachments,
    }
}

fn collect_parts(
    part: &ParsedMail,
    body_plain: &mut String,
    body_html: &mut Option<String>,
    attachments: &mut Vec<AttachmentBlob>,
) {
    if part.subparts.is_empty() {
        let disposition = part.get_content_disposition();
        let content_type = part.ctype.mimetype.clone();
        if let Some(filename) = disposition.params.get("filename") {
            if let Ok(bytes) = part.get_body_raw() {
                attachments.push(AttachmentBlob {
                    original_name: filename.clone(),
                    content_type,
                    bytes,
                });
            }
            return;
        }
        if content_type == "text/plain" {
            if let Ok(text) = part.get_body() {
                body_plain.push_str(&text);
            }
        } else if content_type == "text/html" {
            if let Ok(text) = part.get_body() {
                *body_html = Some(text);
            }
        }
        return;
    }
    for subpart in &part.subparts {
        collect_parts(subpart, body_plain, body_html, attachments);
    }
}

#[async_trait]
impl MailGateway for ImapMailGateway {
    async fn list_unprocessed(&self, subject_prefix: &str) -> Result<Vec<MessageRef>, CoreError> {
        let prefix = subject_prefix.to_string();
        let flag = self.processed_flag.clone();
        with_backoff(|| {
            let prefix = prefix.clone();
            let flag = flag.clone();
            self.with_session(move |session| {
                let prefix = prefix.clone();
                let flag = flag.clone();
                async move {
                    let query = format!("UNKEYWORD {flag} HEADER SUBJECT \"{prefix}\"");
                    let uids = session
                        .uid_search(&query)
                        .await
                        .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;
                    let mut refs: Vec<u32> = uids.into_iter().collect();
                    refs.sort_unstable();
                    Ok(refs.into_iter().map(|uid| MessageRef(uid.to_string())).collect())
                }
            })
        })
        .await
    }

    async fn fetch(&self, message_ref: &MessageRef) -> Result<IncomingMessage, CoreError> {
        let uid: u32 = message_ref
            .0
            .parse()
            .map_err(|_| CoreError::MailFetchFailed(format!("invalid uid {}", message_ref.0)))?;

        with_backoff(|| {
            self.with_session(move |session| async move {
                let sequence = uid.to_string();
                let stream = session
                    .uid_fetch(&sequence, "RFC822")
                    .await
                    .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;
                let fetches: Vec<Fetch> = stream
                    .try_collect()
                    .await
                    .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;
                let raw = fetches
                    .first()
                    .and_then(|f| f.body())
                    .ok_or_else(|| CoreError::MailFetchFailed(format!("message {uid} has no body")))?;
                let parsed = mailparse::parse_mail(raw)
                    .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;
                Ok(parsed_to_incoming(uid, &parsed))
            })
        })
        .await
    }

    async fn mark_processed(&self, message_ref: &MessageRef) -> Result<(), CoreError> {
        let uid: u32 = message_ref
            .0
            .parse()
            .map_err(|_| CoreError::MailFetchFailed(format!("invalid uid {}", message_ref.0)))?;

        let flag = self.processed_flag.clone();
        with_backoff(|| {
            let flag = flag.clone();
            self.with_session(move |session| async move {
                let sequence = uid.to_string();
                session
                    .uid_store(&sequence, format!("+FLAGS ({flag})"))
                    .await
                    .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?
                    .try_collect::<Vec<_>>()
                    .await
                    .map_err(|e| CoreError::MailFetchFailed(e.to_string()))?;
                Ok(())
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_and_html_and_attachment() {
        let raw = b"From: a@b.com\r\nSubject: Test\r\nDate: Mon, 1 Jan 2024 00:00:00 +0000\r\nContent-Type: multipart/mixed; boundary=X\r\n\r\n--X\r\nContent-Type: text/plain\r\n\r\nhello\r\n--X\r\nContent-Type: text/html\r\n\r\n<p>hi</p>\r\n--X\r\nContent-Type: application/octet-stream\r\nContent-Disposition: attachment; filename=\"a.xlsx\"\r\n\r\nYmluYXJ5\r\n--X--\r\n";
        let parsed = mailparse::parse_mail(raw).expect("parses");
        let message = parsed_to_incoming(7, &parsed);
        assert_eq!(message.id, "7");
        assert_eq!(message.subject, "Test");
        assert!(message.body_plain.contains("hello"));
        assert!(message.body_html.as_deref().unwrap().contains("hi"));
        assert_eq!(message.attachments.len(), 1);
        assert_eq!(message.attachments[0].original_name, "a.xlsx");
    }
}
