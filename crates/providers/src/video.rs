//! Image-to-video synthesis through xAI, driven by the async poller.

use std::time::Duration;

use async_trait::async_trait;
use clipforge_core::poll::{submit_and_poll, PollConfig, PollError, PollStatus};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::http::{client_with_timeout, parse_json, read_bytes};

const PROVIDER: &str = "xai";
const API_BASE: &str = "https://api.x.ai/v1";
const MODEL: &str = "grok-imagine-video";
const RESOLUTION: &str = "720p";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

pub const MIN_DURATION_SECS: i32 = 1;
pub const MAX_DURATION_SECS: i32 = 15;
pub const DEFAULT_DURATION_SECS: i32 = 12;
pub const DEFAULT_ASPECT_RATIO: &str = "9:16";

/// One image-to-video job.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub prompt: String,
    /// Publicly reachable source frame.
    pub image_url: String,
    pub duration_secs: i32,
    pub aspect_ratio: Option<String>,
    pub style_prompt: Option<String>,
}

#[async_trait]
pub trait VideoSynth: Send + Sync {
    /// Start a job and return its operation id.
    async fn submit(&self, request: &VideoRequest) -> Result<String, ProviderError>;

    /// Check a job; completed jobs yield the downloaded video bytes.
    async fn poll(&self, operation_id: &str) -> Result<PollStatus<Vec<u8>>, ProviderError>;
}

/// Submit `request` and wait for the finished video.
pub async fn generate_video(
    synth: &dyn VideoSynth,
    config: &PollConfig,
    cancel: &CancellationToken,
    request: &VideoRequest,
) -> Result<Vec<u8>, PollError<ProviderError>> {
    submit_and_poll(
        config,
        cancel,
        || synth.submit(request),
        move |operation_id| async move { synth.poll(&operation_id).await },
    )
    .await
}

/// Clamp a planned clip length to what the provider accepts. Zero or
/// negative estimates use the default.
pub fn clamp_duration(estimated_secs: i32) -> i32 {
    if estimated_secs <= 0 {
        return DEFAULT_DURATION_SECS;
    }
    estimated_secs.clamp(MIN_DURATION_SECS, MAX_DURATION_SECS)
}

pub fn video_prompt(prompt: &str, style_prompt: Option<&str>) -> String {
    let style = match style_prompt.map(str::trim) {
        Some(style) if !style.is_empty() => format!("Visual style: {style}."),
        _ => "Match the style and mood of the input image.".to_string(),
    };
    format!(
        "{prompt}\n\n{style}\nKeep the palette and lighting of the input image. \
         Natural, cinematic movement. Silent video, no dialogue."
    )
}

// ---------------------------------------------------------------------------
// Wire structures
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    prompt: String,
    model: &'a str,
    image: ImageInput<'a>,
    duration: i32,
    aspect_ratio: &'a str,
    resolution: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageInput<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    request_id: String,
}

#[derive(Debug, Deserialize)]
struct VideoResult {
    #[serde(default)]
    status: String,
    video: Option<VideoOutput>,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct VideoOutput {
    #[serde(default)]
    url: String,
}

/// Where a status response stands. A present video URL means done,
/// whatever the status field says.
fn classify(result: VideoResult) -> PollStatus<String> {
    if let Some(video) = result.video.filter(|v| !v.url.is_empty()) {
        return PollStatus::Completed(video.url);
    }
    if result.status == "failed" {
        let reason = if result.error.is_empty() {
            "unknown error".to_string()
        } else {
            result.error
        };
        return PollStatus::Failed(reason);
    }
    PollStatus::Pending
}

pub struct XaiVideo {
    client: reqwest::Client,
    download_client: reqwest::Client,
    api_key: String,
}

impl XaiVideo {
    pub fn new(api_key: String) -> Result<Self, ProviderError> {
        Ok(Self {
            client: client_with_timeout(REQUEST_TIMEOUT)?,
            download_client: client_with_timeout(DOWNLOAD_TIMEOUT)?,
            api_key,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.download_client.get(url).send().await?;
        let bytes = read_bytes(PROVIDER, response).await?;
        if bytes.is_empty() {
            return Err(ProviderError::invalid(PROVIDER, "downloaded video is empty"));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl VideoSynth for XaiVideo {
    async fn submit(&self, request: &VideoRequest) -> Result<String, ProviderError> {
        let duration = clamp_duration(request.duration_secs);
        let body = GenerationRequest {
            prompt: video_prompt(&request.prompt, request.style_prompt.as_deref()),
            model: MODEL,
            image: ImageInput {
                url: &request.image_url,
            },
            duration,
            aspect_ratio: request
                .aspect_ratio
                .as_deref()
                .filter(|a| !a.is_empty())
                .unwrap_or(DEFAULT_ASPECT_RATIO),
            resolution: RESOLUTION,
        };

        let response = self
            .client
            .post(format!("{API_BASE}/videos/generations"))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let submitted: GenerationResponse = parse_json(PROVIDER, response).await?;

        if submitted.request_id.is_empty() {
            return Err(ProviderError::invalid(PROVIDER, "empty request_id"));
        }
        tracing::info!(
            request_id = %submitted.request_id,
            duration,
            "Video generation submitted",
        );
        Ok(submitted.request_id)
    }

    async fn poll(&self, operation_id: &str) -> Result<PollStatus<Vec<u8>>, ProviderError> {
        let response = self
            .client
            .get(format!("{API_BASE}/videos/{operation_id}"))
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        // 202 carries a pending status body.
        let result: VideoResult = parse_json(PROVIDER, response).await?;

        match classify(result) {
            PollStatus::Completed(url) => Ok(PollStatus::Completed(self.download(&url).await?)),
            PollStatus::Failed(reason) => Ok(PollStatus::Failed(reason)),
            PollStatus::Pending => Ok(PollStatus::Pending),
        }
    }
}
