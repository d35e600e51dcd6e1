use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use thiserror::Error;
use tracing::info;

use crate::models::{ChatMessage, Newsletter};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("webhook returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("no email recipients configured")]
    NoRecipients,
}

#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn post(&self, message: &ChatMessage) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait MailSink: Send + Sync {
    async fn send(&self, newsletter: &Newsletter) -> Result<(), DispatchError>;
}

/// Posts `{"text": ...}` to an incoming-webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl ChatSink for WebhookSink {
    async fn post(&self, message: &ChatMessage) -> Result<(), DispatchError> {
        let response = self.client.post(&self.url).json(message).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        info!(status = status.as_u16(), "chat message posted");
        Ok(())
    }
}

/// Sends HTML mail over implicit TLS. A fresh connection is opened and
/// closed for every send.
#[derive(Debug, Clone)]
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Credentials,
    from: Mailbox,
    recipients: Vec<Mailbox>,
}

impl SmtpMailer {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        sender: &str,
        password: &str,
        recipients: &[String],
    ) -> Result<Self, DispatchError> {
        let from: Mailbox = sender.trim().parse()?;
        let recipients = recipients
            .iter()
            .map(|r| r.trim().parse::<Mailbox>())
            .collect::<Result<Vec<_>, _>>()?;
        if recipients.is_empty() {
            return Err(DispatchError::NoRecipients);
        }

        Ok(Self {
            host: host.into(),
            port,
            credentials: Credentials::new(sender.trim().to_string(), password.to_string()),
            from,
            recipients,
        })
    }

    pub fn build_message(&self, newsletter: &Newsletter) -> Result<Message, DispatchError> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(newsletter.subject.clone())
            .header(ContentType::TEXT_HTML);
        for recipient in &self.recipients {
            builder = builder.to(recipient.clone());
        }
        Ok(builder.body(newsletter.html.clone())?)
    }
}

#[async_trait]
impl MailSink for SmtpMailer {
    async fn send(&self, newsletter: &Newsletter) -> Result<(), DispatchError> {
        let message = self.build_message(newsletter)?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.host)?
            .port(self.port)
            .credentials(self.credentials.clone())
            .build();
        transport.send(message).await?;

        info!(recipients = self.recipients.len(), "newsletter sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn newsletter() -> Newsletter {
        Newsletter {
            subject: "Weekly Team Digest - 10-Jan-2025".to_string(),
            date_range: "03-Jan-2025 - 10-Jan-2025".to_string(),
            html: "<p>hello</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn webhook_posts_text_payload() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_json(json!({ "text": "*Daily Team Dispatch*" })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let sink = WebhookSink::new(format!("{}/hook", server.uri())).unwrap();
        sink.post(&ChatMessage {
            text: "*Daily Team Dispatch*".to_string(),
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn webhook_rejection_is_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad payload"))
            .mount(&server)
            .await;

        let sink = WebhookSink::new(server.uri()).unwrap();
        let err = sink
            .post(&ChatMessage {
                text: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Status { status: 400, .. }));
    }

    #[test]
    fn mailer_builds_html_message_for_all_recipients() {
        let mailer = SmtpMailer::new(
            "smtp.example.com",
            465,
            "digest@example.com",
            "secret",
            &["lead@example.com".to_string(), " pm@example.com ".to_string()],
        )
        .unwrap();

        let message = mailer.build_message(&newsletter()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(raw.contains("Subject: Weekly Team Digest - 10-Jan-2025"));
        assert!(raw.contains("From: digest@example.com"));
        assert!(raw.contains("lead@example.com"));
        assert!(raw.contains("pm@example.com"));
        assert!(raw.contains("Content-Type: text/html"));
        assert!(raw.contains("<p>hello</p>"));
    }

    #[test]
    fn mailer_rejects_bad_configuration() {
        assert!(matches!(
            SmtpMailer::new("smtp.example.com", 465, "digest@example.com", "pw", &[]),
            Err(DispatchError::NoRecipients)
        ));
        assert!(matches!(
            SmtpMailer::new(
                "smtp.example.com",
                465,
                "not an address",
                "pw",
                &["lead@example.com".to_string()]
            ),
            Err(DispatchError::Address(_))
        ));
    }
}
