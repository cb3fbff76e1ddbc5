use std::collections::BTreeMap;
use std::time::Instant;

use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::CompletionSettings;
use crate::db::{Store, StoreError, VehicleKey};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion backend misconfigured: {0}")]
    Config(String),
    #[error("completion request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("completion API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion response had no content")]
    EmptyResponse,
}

/// What the summarizer asks of a text-completion backend.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait TextCompleter: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

// ── OpenAI-compatible chat completions ──

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct OpenAiCompleter {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiCompleter {
    pub fn new(settings: &CompletionSettings) -> Result<Self, CompletionError> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| CompletionError::Config("completion.api_key must be set".into()))?;
        Ok(Self {
            http: reqwest::Client::new(),
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl TextCompleter for OpenAiCompleter {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let start = Instant::now();
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(header::AUTHORIZATION, format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        debug!(model = %self.model, latency_ms = start.elapsed().as_millis() as u64, "Completion received");

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}

// ── Summarizer ──

const PROMPT_TEMPLATE: &str = "Please provide a concise overall summary of these car reviews:\n\n\
{reviews}\n\n\
Focus on:\n\
1. General sentiment\n\
2. Key themes\n\
3. Main pros and cons\n\n\
Keep the summary under 200 words.";

/// Cut `text` to at most `budget` characters (not bytes).
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Join review bodies with newlines, then cut to the character budget.
pub fn combine_reviews(bodies: &[String], budget: usize) -> String {
    let joined = bodies.join("\n");
    truncate_chars(&joined, budget).to_string()
}

pub fn build_prompt(reviews: &str) -> String {
    PROMPT_TEMPLATE.replace("{reviews}", reviews)
}

/// Review bodies grouped by vehicle, in key order.
pub fn group_reviews(rows: Vec<(VehicleKey, String)>) -> BTreeMap<VehicleKey, Vec<String>> {
    let mut groups: BTreeMap<VehicleKey, Vec<String>> = BTreeMap::new();
    for (key, body) in rows {
        groups.entry(key).or_default().push(body);
    }
    groups
}

#[derive(Debug, Default)]
pub struct SummaryReport {
    pub summarized: usize,
    pub failed: Vec<(VehicleKey, String)>,
}

pub struct Summarizer<'a> {
    completer: &'a dyn TextCompleter,
    temperature: f32,
    max_tokens: u32,
    char_budget: usize,
}

impl<'a> Summarizer<'a> {
    pub fn new(completer: &'a dyn TextCompleter, settings: &CompletionSettings) -> Self {
        Self {
            completer,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            char_budget: settings.char_budget,
        }
    }

    pub fn request_for(&self, bodies: &[String]) -> CompletionRequest {
        CompletionRequest {
            prompt: build_prompt(&combine_reviews(bodies, self.char_budget)),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Summarize every vehicle that has reviews, one at a time. A failing
    /// group is logged and skipped; only the initial read is fatal.
    pub async fn run(&self, store: &Store) -> Result<SummaryReport, StoreError> {
        let groups = group_reviews(store.fetch_review_bodies()?);
        info!(groups = groups.len(), "Summarizing reviews");

        let pb = ProgressBar::new(groups.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}") {
            pb.set_style(style.progress_chars("=> "));
        }

        let mut report = SummaryReport::default();
        for (key, bodies) in groups {
            pb.set_message(key.to_string());
            match self.summarize_one(store, &key, &bodies).await {
                Ok(()) => report.summarized += 1,
                Err(e) => {
                    warn!(vehicle = %key, error = %e, "Summary failed, skipping");
                    report.failed.push((key, e.to_string()));
                }
            }
            pb.inc(1);
        }
        pb.finish_and_clear();

        info!(summarized = report.summarized, failed = report.failed.len(), "Summaries done");
        Ok(report)
    }

    async fn summarize_one(&self, store: &Store, key: &VehicleKey, bodies: &[String]) -> anyhow::Result<()> {
        let request = self.request_for(bodies);
        let summary = self.completer.complete(&request).await?;
        store.upsert_summary(&key.model, key.year, &summary)?;
        debug!(vehicle = %key, reviews = bodies.len(), chars = summary.chars().count(), "Stored summary");
        Ok(())
    }
}
