use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_days: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailTransport {
    Gmail,
    Log,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub transport: MailTransport,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    pub sender: String,
    pub from_name: String,
    pub timeout_secs: u64,
}

/// S3-compatible bucket used for recipe images.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub public_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    pub url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub cookie_secure: bool,
    pub allow_admin_signup: bool,
    pub mail: MailConfig,
    pub storage: StorageConfig,
    pub chat: ChatConfig,
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is required")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is required")?,
            issuer: var_or("JWT_ISSUER", "cookmate"),
            audience: var_or("JWT_AUDIENCE", "cookmate-users"),
            ttl_days: parsed_or("JWT_TTL_DAYS", 30),
        };

        let transport = match var_or("MAIL_TRANSPORT", "gmail").to_ascii_lowercase().as_str() {
            "gmail" => MailTransport::Gmail,
            "log" => MailTransport::Log,
            other => anyhow::bail!("unknown MAIL_TRANSPORT: {other}"),
        };
        // Gmail credentials are only mandatory when Gmail actually sends the mail.
        let gmail_var = |key: &str| -> anyhow::Result<String> {
            match transport {
                MailTransport::Gmail => {
                    std::env::var(key).with_context(|| format!("{key} is required for gmail transport"))
                }
                MailTransport::Log => Ok(std::env::var(key).unwrap_or_default()),
            }
        };
        let mail = MailConfig {
            transport,
            client_id: gmail_var("GMAIL_CLIENT_ID")?,
            client_secret: gmail_var("GMAIL_CLIENT_SECRET")?,
            refresh_token: gmail_var("GMAIL_REFRESH_TOKEN")?,
            sender: gmail_var("GMAIL_USER")?,
            from_name: var_or("MAIL_FROM_NAME", "CookMate"),
            timeout_secs: parsed_or("MAIL_TIMEOUT_SECS", 10),
        };

        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT is required")?,
            bucket: std::env::var("S3_BUCKET").context("S3_BUCKET is required")?,
            access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY is required")?,
            secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY is required")?,
            region: var_or("S3_REGION", "us-east-1"),
            public_url: std::env::var("S3_PUBLIC_URL").context("S3_PUBLIC_URL is required")?,
        };

        let chat = ChatConfig {
            url: var_or("CHAT_URL", "http://localhost:11434/api/chat"),
            model: var_or("CHAT_MODEL", "llama3"),
            timeout_secs: parsed_or("CHAT_TIMEOUT_SECS", 60),
        };

        Ok(Self {
            database_url,
            database_max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
            jwt,
            cookie_secure: flag("COOKIE_SECURE"),
            allow_admin_signup: flag("ALLOW_ADMIN_SIGNUP"),
            mail,
            storage,
            chat,
        })
    }
}
