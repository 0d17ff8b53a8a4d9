//! Outbound mail.
//!
//! Verification codes go out through the Gmail API using a delegated OAuth
//! refresh token. Each send exchanges the refresh token for a short-lived
//! access token, then posts the base64url-encoded message. Every HTTP call
//! carries a hard timeout so a stuck provider fails the request instead of
//! hanging it.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine as _,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::config::{MailConfig, MailTransport};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GMAIL_SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

pub fn from_config(cfg: &MailConfig) -> anyhow::Result<std::sync::Arc<dyn Mailer>> {
    Ok(match cfg.transport {
        MailTransport::Gmail => std::sync::Arc::new(GmailMailer::new(cfg)?),
        MailTransport::Log => std::sync::Arc::new(LogMailer),
    })
}

pub struct GmailMailer {
    http: reqwest::Client,
    token_url: String,
    send_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    sender: String,
    from_name: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: Option<String>,
}

impl GmailMailer {
    pub fn new(cfg: &MailConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .connect_timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build mail http client")?;
        Ok(Self {
            http,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            send_url: GMAIL_SEND_URL.to_string(),
            client_id: cfg.client_id.clone(),
            client_secret: cfg.client_secret.clone(),
            refresh_token: cfg.refresh_token.clone(),
            sender: cfg.sender.clone(),
            from_name: cfg.from_name.clone(),
        })
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let res = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("oauth token request")?;
        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            if detail.contains("invalid_grant") {
                anyhow::bail!("gmail refresh token rejected (invalid_grant); re-authorize the sender account");
            }
            anyhow::bail!("oauth token endpoint returned {status}: {detail}");
        }
        let token: TokenResponse = res.json().await.context("decode oauth token response")?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl Mailer for GmailMailer {
    #[instrument(skip(self, body), fields(to = %to))]
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let access_token = self.access_token().await?;
        let raw = encode_raw_message(&self.from_name, &self.sender, to, subject, body);

        let res = self
            .http
            .post(&self.send_url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .context("gmail send request")?;
        let status = res.status();
        if !status.is_success() {
            let detail = res.text().await.unwrap_or_default();
            anyhow::bail!("gmail send returned {status}: {detail}");
        }
        let sent: SendResponse = res.json().await.context("decode gmail send response")?;
        info!(message_id = sent.id.as_deref().unwrap_or("-"), "email sent");
        Ok(())
    }
}

/// Writes messages to the log instead of sending them. Local development only.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(%to, %subject, %body, "email (log transport)");
        Ok(())
    }
}

/// RFC 822 plain-text message, base64url without padding as Gmail expects.
pub fn encode_raw_message(from_name: &str, from: &str, to: &str, subject: &str, body: &str) -> String {
    let message = [
        "MIME-Version: 1.0".to_string(),
        "Content-Type: text/plain; charset=\"UTF-8\"".to_string(),
        "Content-Transfer-Encoding: 8bit".to_string(),
        format!("From: {from_name} <{from}>"),
        format!("To: {to}"),
        format!("Subject: =?utf-8?B?{}?=", STANDARD.encode(subject)),
        String::new(),
        body.replace('\n', "\r\n"),
    ]
    .join("\r\n");
    URL_SAFE_NO_PAD.encode(message)
}

pub const VERIFICATION_SUBJECT: &str = "Your CookMate Verification Code";

pub fn verification_body(code: &str) -> String {
    format!(
        "Welcome to CookMate!\n\n\
         Your verification code is: {code}\n\
         This code expires in 10 minutes.\n\
         If you didn't sign up, ignore this email."
    )
}
