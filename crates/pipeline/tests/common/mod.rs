#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use clipforge_core::plan::{ClipPlan, PlanRequest, VideoPlan};
use clipforge_core::poll::{PollConfig, PollStatus};
use clipforge_core::resources::ResourcePool;
use clipforge_db::models::job::JobKind;
use clipforge_db::models::project::CreateProject;
use clipforge_db::MemoryStore;
use clipforge_pipeline::{
    submit_project, JobQueue, MemoryQueue, PipelineContext, PipelineSettings, Providers, QueueJob,
};
use clipforge_providers::image::{ImageGenerator, ImageOptions};
use clipforge_providers::planner::Planner;
use clipforge_providers::render::{ClipRenderInput, MediaRenderer, RenderedClip};
use clipforge_providers::speech::{Speech, SpeechRequest, SpeechSynth};
use clipforge_providers::storage::MemoryObjectStore;
use clipforge_providers::transcribe::{Transcriber, WordTimestamp};
use clipforge_providers::video::{VideoRequest, VideoSynth};
use clipforge_providers::ProviderError;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Image prompts containing this marker make [`FakeImage`] fail.
pub const FAIL_MARKER: &str = "[fail]";

pub fn plan_clip(n: i32, image_prompt: &str) -> ClipPlan {
    ClipPlan {
        clip_index: n,
        script: format!("line {n}"),
        voice_style: "warm".into(),
        image_prompt: image_prompt.into(),
        video_prompt: "slow drift".into(),
        estimated_duration_secs: 6,
    }
}

pub fn three_clip_plan() -> VideoPlan {
    VideoPlan {
        clips: (0..3).map(|n| plan_clip(n, "harbour at dawn")).collect(),
        total_duration_secs: 18,
        narrative_summary: "hook, build, payoff".into(),
    }
}

// ---------------------------------------------------------------------------
// Scripted providers
// ---------------------------------------------------------------------------

pub struct FakePlanner {
    pub plan: VideoPlan,
}

#[async_trait]
impl Planner for FakePlanner {
    async fn plan(&self, _request: &PlanRequest) -> Result<VideoPlan, ProviderError> {
        Ok(self.plan.clone())
    }
}

/// Narration bytes are the script itself, so renders can be traced.
pub struct FakeSpeech;

#[async_trait]
impl SpeechSynth for FakeSpeech {
    async fn synthesize(&self, request: &SpeechRequest<'_>) -> Result<Speech, ProviderError> {
        Ok(Speech {
            bytes: request.text.as_bytes().to_vec(),
            duration_ms: 4_000,
        })
    }
}

/// Rejects the API key after `after`.
pub struct RejectingSpeech {
    pub after: Duration,
}

#[async_trait]
impl SpeechSynth for RejectingSpeech {
    async fn synthesize(&self, _request: &SpeechRequest<'_>) -> Result<Speech, ProviderError> {
        tokio::time::sleep(self.after).await;
        Err(ProviderError::Api {
            provider: "elevenlabs",
            status: 401,
            body: "bad key".into(),
        })
    }
}

pub struct FakeImage;

#[async_trait]
impl ImageGenerator for FakeImage {
    async fn generate(
        &self,
        prompt: &str,
        _options: &ImageOptions,
    ) -> Result<Vec<u8>, ProviderError> {
        if prompt.contains(FAIL_MARKER) {
            return Err(ProviderError::Api {
                provider: "gemini",
                status: 400,
                body: "prompt rejected by safety filter".into(),
            });
        }
        Ok(b"png".to_vec())
    }
}

/// Accepts every job and never finishes it.
pub struct StalledVideo;

#[async_trait]
impl VideoSynth for StalledVideo {
    async fn submit(&self, _request: &VideoRequest) -> Result<String, ProviderError> {
        Ok("op-stalled".into())
    }

    async fn poll(&self, _operation_id: &str) -> Result<PollStatus<Vec<u8>>, ProviderError> {
        Ok(PollStatus::Pending)
    }
}

/// Never finishes, and counts how often it was polled.
#[derive(Default)]
pub struct CountingVideo {
    pub polls: AtomicUsize,
}

impl CountingVideo {
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VideoSynth for CountingVideo {
    async fn submit(&self, _request: &VideoRequest) -> Result<String, ProviderError> {
        Ok("op-counting".into())
    }

    async fn poll(&self, _operation_id: &str) -> Result<PollStatus<Vec<u8>>, ProviderError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(PollStatus::Pending)
    }
}

/// Completes on the first poll.
pub struct InstantVideo {
    pub requests: Mutex<Vec<VideoRequest>>,
}

#[async_trait]
impl VideoSynth for InstantVideo {
    async fn submit(&self, request: &VideoRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        Ok("op-1".into())
    }

    async fn poll(&self, _operation_id: &str) -> Result<PollStatus<Vec<u8>>, ProviderError> {
        Ok(PollStatus::Completed(b"mp4".to_vec()))
    }
}

pub struct FakeTranscriber {
    pub fail: bool,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(
        &self,
        _audio: &[u8],
        _language: Option<&str>,
    ) -> Result<Vec<WordTimestamp>, ProviderError> {
        if self.fail {
            return Err(ProviderError::invalid("whisper", "no words in transcription"));
        }
        Ok(vec![
            WordTimestamp {
                word: "hello".into(),
                start: 0.0,
                end: 0.4,
            },
            WordTimestamp {
                word: "world".into(),
                start: 0.4,
                end: 0.9,
            },
        ])
    }
}

/// What the renderer was asked to do for one clip.
#[derive(Debug, Clone)]
pub struct RenderCall {
    pub visual: &'static str,
    pub audio: String,
    pub has_captions: bool,
}

/// Renders a clip as `[<narration>]` and joins clips by concatenation.
#[derive(Default)]
pub struct FakeRenderer {
    pub calls: Mutex<Vec<RenderCall>>,
}

#[async_trait]
impl MediaRenderer for FakeRenderer {
    async fn render_clip(&self, input: ClipRenderInput) -> Result<RenderedClip, ProviderError> {
        let audio = String::from_utf8_lossy(&input.audio).into_owned();
        self.calls.lock().unwrap().push(RenderCall {
            visual: input.visual.kind(),
            audio: audio.clone(),
            has_captions: input.captions.is_some(),
        });
        Ok(RenderedClip {
            bytes: format!("[{audio}]").into_bytes(),
            duration_ms: None,
        })
    }

    async fn concatenate(&self, clips: Vec<Vec<u8>>) -> Result<Vec<u8>, ProviderError> {
        Ok(clips.concat())
    }

    async fn mix_background(
        &self,
        mut video: Vec<u8>,
        _music: &Path,
    ) -> Result<Vec<u8>, ProviderError> {
        video.extend_from_slice(b"+music");
        Ok(video)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub queue: Arc<MemoryQueue>,
    pub storage: Arc<MemoryObjectStore>,
    pub renderer: Arc<FakeRenderer>,
    pub ctx: PipelineContext,
}

pub struct HarnessBuilder {
    plan: VideoPlan,
    speech: Arc<dyn SpeechSynth>,
    video: Option<Arc<dyn VideoSynth>>,
    transcriber_fails: bool,
    settings: PipelineSettings,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            plan: three_clip_plan(),
            speech: Arc::new(FakeSpeech),
            video: None,
            transcriber_fails: false,
            settings: PipelineSettings::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn plan(mut self, plan: VideoPlan) -> Self {
        self.plan = plan;
        self
    }

    pub fn speech(mut self, speech: Arc<dyn SpeechSynth>) -> Self {
        self.speech = speech;
        self
    }

    pub fn video(mut self, video: Arc<dyn VideoSynth>) -> Self {
        self.video = Some(video);
        self
    }

    pub fn failing_transcriber(mut self) -> Self {
        self.transcriber_fails = true;
        self
    }

    pub fn settings(mut self, settings: PipelineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let storage = Arc::new(MemoryObjectStore::new("clipforge-test"));
        let renderer = Arc::new(FakeRenderer::default());

        let providers = Providers {
            planner: Arc::new(FakePlanner { plan: self.plan }),
            speech: self.speech,
            image: Arc::new(FakeImage),
            video: self.video,
            transcriber: Arc::new(FakeTranscriber {
                fail: self.transcriber_fails,
            }),
            storage: storage.clone(),
            renderer: renderer.clone(),
        };
        let ctx = PipelineContext {
            store: store.clone(),
            queue: queue.clone(),
            providers,
            resources: ResourcePool::default(),
            settings: Arc::new(self.settings),
        };

        Harness {
            store,
            queue,
            storage,
            renderer,
            ctx,
        }
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    pub async fn submit(&self, topic: &str) -> Uuid {
        submit_project(
            self.store.as_ref(),
            self.queue.as_ref(),
            &CreateProject::new(topic),
        )
        .await
        .unwrap()
        .id
    }

    /// Pop the next message for `kind` without waiting.
    pub async fn pop(&self, kind: JobKind) -> Option<QueueJob> {
        self.queue.dequeue(kind, Duration::ZERO).await.unwrap()
    }

    /// Pop and run every queued message for `kind`, oldest first.
    pub async fn run_all(&self, kind: JobKind) -> usize {
        let cancel = CancellationToken::new();
        let mut ran = 0;
        while let Some(job) = self.pop(kind).await {
            clipforge_pipeline::dispatcher::execute(&self.ctx, &job, &cancel).await;
            ran += 1;
        }
        ran
    }
}

pub fn fast_video_poll() -> PollConfig {
    PollConfig {
        initial_delay: Duration::from_secs(1),
        min_interval: Duration::from_secs(1),
        max_interval: Duration::from_secs(4),
        multiplier: 2.0,
        max_wait: Duration::from_secs(20),
    }
}
