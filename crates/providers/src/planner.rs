//! Storyboard planning through an OpenAI chat-completions model.

use std::time::Duration;

use async_trait::async_trait;
use clipforge_core::plan::{PlanRequest, VideoPlan};
use serde::Deserialize;

use crate::error::ProviderError;
use crate::http::{client_with_timeout, parse_json, truncate};

const PROVIDER: &str = "openai";
const CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-5-mini";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Seconds of narration a single clip should cover.
const SECONDS_PER_CLIP: i32 = 8;

#[async_trait]
pub trait Planner: Send + Sync {
    /// Turn a topic into an ordered list of clips. The result is not
    /// validated here.
    async fn plan(&self, request: &PlanRequest) -> Result<VideoPlan, ProviderError>;
}

/// Number of clips requested for a target duration (at least one).
pub fn clip_count(target_duration_secs: i32) -> i32 {
    (target_duration_secs + SECONDS_PER_CLIP - 1) / SECONDS_PER_CLIP
}

pub fn system_prompt(request: &PlanRequest) -> String {
    let clips = clip_count(request.target_duration_secs).max(1);
    let mut prompt = format!(
        "You plan short vertical videos. Split the narration into {clips} clips \
         of roughly {SECONDS_PER_CLIP} seconds each, about {} seconds in total.\n\
         Respond with a JSON object: {{\"clips\": [{{\"clip_index\", \"script\", \
         \"voice_style_instruction\", \"image_prompt\", \"video_prompt\", \
         \"estimated_duration_sec\"}}], \"total_estimated_sec\", \"narrative_structure\"}}.\n\
         Every clip needs all fields; estimated_duration_sec is a positive integer.",
        request.target_duration_secs
    );

    if let Some(tone) = &request.tone {
        prompt.push_str(&format!("\nTone: {tone}."));
    }
    if let Some(style) = &request.style_prompt {
        prompt.push_str(&format!("\nVisual style for every image prompt: {style}."));
    }
    if let Some(aspect) = &request.aspect_ratio {
        prompt.push_str(&format!("\nCompose images for a {aspect} frame."));
    }
    if let Some(language) = &request.language {
        prompt.push_str(&format!(
            "\nWrite scripts in language '{language}'; keep prompts in English."
        ));
    }
    if let Some(cta) = &request.cta {
        prompt.push_str(&format!("\nEnd the last clip with this call to action: {cta}"));
    }
    prompt
}

pub fn user_prompt(request: &PlanRequest) -> String {
    format!(
        "Topic: {}\nTarget duration: {} seconds",
        request.topic, request.target_duration_secs
    )
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

/// [`Planner`] backed by the OpenAI chat-completions API in JSON mode.
pub struct OpenAiPlanner {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiPlanner {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: client_with_timeout(REQUEST_TIMEOUT)?,
            api_key,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl Planner for OpenAiPlanner {
    async fn plan(&self, request: &PlanRequest) -> Result<VideoPlan, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system_prompt(request) },
                { "role": "user", "content": user_prompt(request) },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(CHAT_COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let chat: ChatResponse = parse_json(PROVIDER, response).await?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::invalid(PROVIDER, "no completion returned"))?;

        let plan: VideoPlan = serde_json::from_str(&content).map_err(|e| {
            tracing::warn!(
                error = %e,
                raw = truncate(&content, 2000),
                "Plan response did not parse",
            );
            ProviderError::invalid(PROVIDER, format!("failed to parse plan: {e}"))
        })?;

        tracing::debug!(
            topic = %request.topic,
            clips = plan.clips.len(),
            total_secs = plan.total_duration_secs,
            "Plan generated",
        );
        Ok(plan)
    }
}
