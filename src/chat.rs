//! Cooking assistant: a stateless pass-through to an Ollama-compatible chat endpoint.

use std::time::Duration;

use anyhow::Context;
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

use crate::{
    auth::extractors::CurrentUser,
    config::ChatConfig,
    error::{AppError, AppResult},
    extract::JsonBody,
    response::{self, ApiResponse, Empty},
    state::AppState,
};

const SYSTEM_PROMPT: &str = "You are CookMate AI. Provide extremely brief, clear, and helpful \
                             cooking advice. Use bullet points if needed. No long introductions. \
                             Keep it short and sweet.";

const UNAVAILABLE: &str =
    "AI service is currently unavailable. Please ensure Ollama is running locally.";

#[derive(Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

impl ChatClient {
    pub fn new(cfg: &ChatConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build chat http client")?;
        Ok(Self {
            http,
            url: cfg.url.clone(),
            model: cfg.model.clone(),
        })
    }

    #[instrument(skip(self, message), fields(model = %self.model))]
    pub async fn ask(&self, message: &str) -> AppResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
            stream: false,
        };

        let res = self.http.post(&self.url).json(&body).send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                error!(error = %e, "chat backend unreachable");
                AppError::ServiceUnavailable(UNAVAILABLE.into())
            } else {
                AppError::Internal(anyhow::Error::new(e).context("chat request"))
            }
        })?;

        let status = res.status();
        if !status.is_success() {
            return Err(AppError::Internal(anyhow::anyhow!(
                "chat backend responded with {status}"
            )));
        }
        let reply: ChatReply = res.json().await.context("decode chat reply")?;
        Ok(reply.message.content)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ai/chat", post(chat))
}

#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn chat(
    State(state): State<AppState>,
    user: CurrentUser,
    JsonBody(body): JsonBody<AskRequest>,
) -> AppResult<Json<ApiResponse<Empty>>> {
    let message = body.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("Message is required".into()));
    }
    let answer = state.chat.ask(message).await?;
    Ok(response::message(answer))
}
