//! Notification assembly and delivery.
//!
//! A [`Notification`] is the transport-independent form of one message; it
//! can be rendered with or without its attachments, which is what the
//! size-rejection fallback in [`DeliveryEngine`] relies on.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::response::{Category, Code, Detail, Severity};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::warn;

use crate::config::SmtpConfig;
use crate::domain::Illust;

#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport rejected the message for exceeding a size limit
    /// (SMTP 552). Recoverable by resending without attachments.
    #[error("Message rejected for size")]
    SizeRejected,

    #[error("SMTP transport error: {0}")]
    Transport(String),

    #[error("Message assembly error: {0}")]
    Build(#[from] lettre::error::Error),
}

/// One outgoing notification, built fresh per feed item.
pub struct Notification {
    pub subject: String,
    pub body: String,
    /// Provider-declared creation time; becomes the `Date` header so the
    /// recipient's mailbox sorts chronologically regardless of polling lag.
    pub date: DateTime<FixedOffset>,
    pub from: Mailbox,
    pub to: Mailbox,
    pub attachments: Vec<AttachmentData>,
}

pub struct AttachmentData {
    pub filename: String,
    pub content_type: ContentType,
    pub data: Vec<u8>,
}

/// Assemble the notification for one illustration.
///
/// Attachment paths have already been filtered to files that existed at
/// resolution time; a read failure here still drops only that attachment.
pub fn build_notification(
    illust: &Illust,
    attachment_paths: &[PathBuf],
    from: Mailbox,
    to: Mailbox,
) -> Notification {
    let mut attachments = Vec::new();
    for path in attachment_paths {
        match fs::read(path) {
            Ok(data) => {
                let filename = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("attachment")
                    .to_string();
                attachments.push(AttachmentData {
                    content_type: attachment_content_type(path),
                    filename,
                    data,
                });
            }
            Err(e) => warn!("dropping unreadable attachment {}: {e}", path.display()),
        }
    }

    Notification {
        subject: format!(
            "New illustration by {} (@{})",
            illust.user.name, illust.user.account
        ),
        body: format!(
            "{}\n-----\n{}\n-----\n{}",
            illust.title,
            illust.caption,
            illust.artwork_url()
        ),
        date: illust.create_date,
        from,
        to,
        attachments,
    }
}

fn attachment_content_type(path: &Path) -> ContentType {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| ContentType::parse(&format!("image/{}", ext.to_ascii_lowercase())).ok())
        .unwrap_or_else(|| {
            ContentType::parse("application/octet-stream").expect("static MIME type")
        })
}

impl Notification {
    /// Render to a MIME message, optionally leaving the attachments out.
    pub fn to_message(&self, with_attachments: bool) -> Result<Message, DeliveryError> {
        let builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.subject.clone())
            .date(SystemTime::from(self.date));

        if with_attachments && !self.attachments.is_empty() {
            let mut multipart = MultiPart::mixed().singlepart(SinglePart::plain(self.body.clone()));
            for attachment in &self.attachments {
                multipart = multipart.singlepart(
                    Attachment::new(attachment.filename.clone())
                        .body(attachment.data.clone(), attachment.content_type.clone()),
                );
            }
            Ok(builder.multipart(multipart)?)
        } else {
            Ok(builder.body(self.body.clone())?)
        }
    }
}

#[async_trait]
pub trait Mailer {
    async fn send(&self, message: &Message) -> Result<(), DeliveryError>;
}

/// One SMTP session, reused across all deliveries of a run.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, DeliveryError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            .map_err(|e| DeliveryError::Transport(e.to_string()))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self { transport })
    }
}

// 552: requested mail action aborted, exceeded storage allocation.
fn is_size_rejection(error: &lettre::transport::smtp::Error) -> bool {
    matches!(
        error.status(),
        Some(Code {
            severity: Severity::PermanentNegativeCompletion,
            category: Category::MailSystem,
            detail: Detail::Two,
        })
    )
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &Message) -> Result<(), DeliveryError> {
        match self.transport.send(message.clone()).await {
            Ok(_) => Ok(()),
            Err(e) if is_size_rejection(&e) => Err(DeliveryError::SizeRejected),
            Err(e) => Err(DeliveryError::Transport(e.to_string())),
        }
    }
}

/// Sends a notification, degrading to an attachment-less copy when the
/// transport rejects the full message for size. Any other failure, on
/// either attempt, is fatal.
pub struct DeliveryEngine {
    mailer: Arc<dyn Mailer + Send + Sync>,
}

impl DeliveryEngine {
    pub fn new(mailer: Arc<dyn Mailer + Send + Sync>) -> Self {
        Self { mailer }
    }

    pub async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError> {
        match self.mailer.send(&notification.to_message(true)?).await {
            Ok(()) => Ok(()),
            Err(DeliveryError::SizeRejected) => {
                warn!(
                    "message \"{}\" rejected for size, retrying without attachments",
                    notification.subject
                );
                self.mailer.send(&notification.to_message(false)?).await
            }
            Err(e) => Err(e),
        }
    }
}
