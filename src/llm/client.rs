use crate::error::{ReviewError, Result};
use crate::judge::JudgeModel;
use crate::llm::types::*;
use crate::orchestrator::ReviewModel;
use crate::prompts::{ChatMessage, FigureAttachment, MessageRole, PromptBundle};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{debug, warn};
use reqwest::Client;
use std::path::Path;
use tokio::fs;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    /// Sent as `HTTP-Referer` when set.
    pub referer: Option<String>,
    /// Sent as `X-Title` when set.
    pub title: Option<String>,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENROUTER_BASE_URL.to_string(),
            referer: None,
            title: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Chat-completions client for any OpenAI-compatible endpoint. Decoding is
/// pinned to temperature 0, top_p 1.
#[derive(Clone)]
pub struct OpenRouterClient {
    client: Client,
    config: LlmConfig,
}

impl OpenRouterClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(ReviewError::InvalidInput("API key is empty".to_string()));
        }
        Ok(Self {
            client: Client::new(),
            config,
        })
    }

    pub async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        figures: &[FigureAttachment],
    ) -> Result<String> {
        let images = load_figures(figures).await;
        let payload = ChatCompletionRequest {
            model: model.to_string(),
            messages: build_wire_messages(messages, &images),
            temperature: 0.0,
            top_p: 1.0,
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&payload);
        if let Some(referer) = &self.config.referer {
            request = request.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.config.title {
            request = request.header("X-Title", title);
        }

        let res = request.send().await?;
        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(ReviewError::Model(format!(
                "{} returned status {}: {}",
                model, status, err_text
            )));
        }

        let body: ChatCompletionResponse = res.json().await?;
        if let Some(usage) = body.usage {
            debug!(
                "{}: {} prompt + {} completion tokens",
                model, usage.prompt_tokens, usage.completion_tokens
            );
        }

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ReviewError::Model(format!("{} returned no message content", model)))
    }
}

/// A figure that made it onto the wire: its label and a data URL.
#[derive(Debug, Clone)]
struct LoadedFigure {
    label: String,
    data_url: String,
}

async fn load_figures(figures: &[FigureAttachment]) -> Vec<LoadedFigure> {
    let mut loaded = Vec::with_capacity(figures.len());
    for figure in figures {
        match image_data_url(Path::new(&figure.image_path)).await {
            Ok(data_url) => loaded.push(LoadedFigure {
                label: format!("Figure {}: {}", figure.figure_id, figure.caption),
                data_url,
            }),
            Err(e) => warn!("Skipping figure {} ({}): {}", figure.figure_id, figure.image_path, e),
        }
    }
    loaded
}

async fn image_data_url(path: &Path) -> Result<String> {
    let bytes = fs::read(path).await?;
    let mime_type = mime_guess::from_path(path).first_or_octet_stream();
    Ok(format!("data:{};base64,{}", mime_type, BASE64.encode(bytes)))
}

/// Images ride on the last user message, each preceded by its caption.
fn build_wire_messages(messages: &[ChatMessage], images: &[LoadedFigure]) -> Vec<WireMessage> {
    let target = if images.is_empty() {
        None
    } else {
        messages.iter().rposition(|m| m.role == MessageRole::User)
    };

    messages
        .iter()
        .enumerate()
        .map(|(idx, message)| {
            let content = if Some(idx) == target {
                let mut parts = vec![ContentPart::Text {
                    text: message.content.clone(),
                }];
                for image in images {
                    parts.push(ContentPart::Text {
                        text: image.label.clone(),
                    });
                    parts.push(ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image.data_url.clone(),
                        },
                    });
                }
                WireContent::Parts(parts)
            } else {
                WireContent::Text(message.content.clone())
            };
            WireMessage {
                role: message.role.as_str().to_string(),
                content,
            }
        })
        .collect()
}

/// Reviewer side of the pipeline, sending figures along with the prompt.
#[derive(Clone)]
pub struct ReviewerClient {
    client: OpenRouterClient,
    model: String,
}

impl ReviewerClient {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl ReviewModel for ReviewerClient {
    async fn review(&self, bundle: &PromptBundle) -> Result<String> {
        self.client
            .chat(&self.model, &bundle.messages, &bundle.figures)
            .await
    }
}

#[derive(Clone)]
pub struct JudgeClient {
    client: OpenRouterClient,
    model: String,
}

impl JudgeClient {
    pub fn new(client: OpenRouterClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl JudgeModel for JudgeClient {
    async fn judge(&self, messages: &[ChatMessage]) -> Result<String> {
        self.client.chat(&self.model, messages, &[]).await
    }
}
