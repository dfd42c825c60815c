//! Wiring from [`WorkerConfig`] to a ready [`PipelineContext`].

use std::sync::Arc;

use clipforge_core::poll::PollConfig;
use clipforge_core::resources::ResourcePool;
use clipforge_db::PgStore;
use clipforge_pipeline::{PipelineContext, PipelineSettings, Providers, RedisQueue};
use clipforge_providers::image::{GeminiImage, StyleReference};
use clipforge_providers::planner::OpenAiPlanner;
use clipforge_providers::render::FfmpegRenderer;
use clipforge_providers::speech::ElevenLabsSpeech;
use clipforge_providers::storage::SupabaseStore;
use clipforge_providers::transcribe::WhisperTranscriber;
use clipforge_providers::video::{VideoSynth, XaiVideo};
use clipforge_providers::ProviderError;

use crate::config::WorkerConfig;

/// Read the configured style reference image.
///
/// A missing or unreadable file is logged and images are generated from
/// the prompt alone.
pub async fn load_style_reference(config: &WorkerConfig) -> Option<StyleReference> {
    let path = config.style_reference_image.as_ref()?;
    match StyleReference::load(path).await {
        Ok(reference) => {
            tracing::info!(
                path = %path.display(),
                bytes = reference.bytes.len(),
                "Loaded style reference image",
            );
            Some(reference)
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Could not load style reference image, proceeding without",
            );
            None
        }
    }
}

/// Build the provider clients named by `config`.
pub fn build_providers(
    config: &WorkerConfig,
    style_reference: Option<StyleReference>,
) -> Result<Providers, ProviderError> {
    let video = match &config.xai_api_key {
        Some(key) => Some(Arc::new(XaiVideo::new(key.clone())?) as Arc<dyn VideoSynth>),
        None => None,
    };

    Ok(Providers {
        planner: Arc::new(OpenAiPlanner::new(config.openai_api_key.clone())?),
        speech: Arc::new(ElevenLabsSpeech::new(
            config.elevenlabs_api_key.clone(),
            config.elevenlabs_voice_id.clone(),
        )?),
        image: Arc::new(
            GeminiImage::new(config.gemini_api_key.clone())?.with_style_reference(style_reference),
        ),
        video,
        transcriber: Arc::new(WhisperTranscriber::new(config.openai_api_key.clone())?),
        storage: Arc::new(SupabaseStore::new(
            &config.storage_url,
            config.storage_service_key.clone(),
            config.storage_bucket.clone(),
        )),
        renderer: Arc::new(FfmpegRenderer::new(config.render_width, config.render_height)),
    })
}

/// Connect to Postgres and Redis, apply migrations and assemble the
/// pipeline context.
pub async fn connect(config: &WorkerConfig) -> anyhow::Result<PipelineContext> {
    let pool = clipforge_db::create_pool(&config.database_url).await?;
    clipforge_db::health_check(&pool).await?;
    tracing::info!("Database health check passed");

    clipforge_db::run_migrations(&pool).await?;
    tracing::info!("Database migrations applied");

    let queue = RedisQueue::open(&config.redis_url)?;
    queue.health_check().await?;
    tracing::info!(redis_url = %config.redis_url, "Redis health check passed");

    let style_reference = load_style_reference(config).await;
    let providers = build_providers(config, style_reference)?;
    tracing::info!(
        bucket = %config.storage_bucket,
        video_enabled = config.video_enabled(),
        background_music = config.background_music.is_some(),
        "Providers configured",
    );

    Ok(PipelineContext {
        store: Arc::new(PgStore::new(pool)),
        queue: Arc::new(queue),
        providers,
        resources: ResourcePool::new(config.limits),
        settings: Arc::new(PipelineSettings {
            video_poll: PollConfig::default(),
            background_music: config.background_music.clone(),
        }),
    })
}
