//! `process_clip` stage.
//!
//! A clip is built by two branches that run concurrently:
//!
//! - **visual**: image, optionally animated by the image-to-video provider
//! - **audio**: narration, then word timings for captions
//!
//! Both feed one ffmpeg render. The first fatal error in either branch
//! stops the other and marks the clip failed. Video synthesis and
//! transcription only degrade the result.

use clipforge_core::paths::{
    clip_audio_path, clip_image_path, clip_video_path, AUDIO_CONTENT_TYPE, IMAGE_CONTENT_TYPE,
    VIDEO_CONTENT_TYPE,
};
use clipforge_core::resources::Resource;
use clipforge_core::types::DbId;
use clipforge_db::models::asset::AssetKind;
use clipforge_db::models::clip::Clip;
use clipforge_db::models::job::JobKind;
use clipforge_db::models::project::Project;
use clipforge_db::models::status::ClipStatus;
use clipforge_providers::captions::build_srt;
use clipforge_providers::image::ImageOptions;
use clipforge_providers::render::{ClipRenderInput, Visual, NARRATION_LEAD_IN};
use clipforge_providers::speech::SpeechRequest;
use clipforge_providers::video::{clamp_duration, generate_video, video_prompt, VideoRequest};
use tokio_util::sync::CancellationToken;

use crate::context::{cancellable, NewObject, PipelineContext};
use crate::error::PipelineError;
use crate::queue::QueueJob;

/// Output of the audio branch.
struct Narration {
    bytes: Vec<u8>,
    duration_ms: i32,
    captions: Option<String>,
}

pub async fn handle_process_clip(
    ctx: &PipelineContext,
    job: &QueueJob,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let clip_id = job.clip_id.ok_or_else(|| {
        PipelineError::State(format!("process_clip job {} has no clip_id", job.id))
    })?;
    let clip = ctx.store.get_clip(clip_id).await?;
    if clip.project_id != job.project_id {
        return Err(PipelineError::State(format!(
            "clip {} does not belong to project {}",
            clip.id, job.project_id
        )));
    }

    match clip.status() {
        Some(ClipStatus::Rendered) => {
            tracing::info!(
                clip_id = %clip.id,
                clip_index = clip.clip_index,
                "Clip already rendered",
            );
        }
        Some(ClipStatus::Failed) => {
            return Err(PipelineError::State(format!("clip {} has failed", clip.id)));
        }
        _ => {
            let project = ctx.store.get_project(clip.project_id).await?;
            if let Err(e) = process_clip(ctx, &project, &clip, cancel).await {
                if !e.is_cancelled() {
                    tracing::error!(
                        project_id = %clip.project_id,
                        clip_index = clip.clip_index,
                        error = %e,
                        "Clip failed",
                    );
                    if let Err(store_err) = ctx.store.fail_clip(clip.id, &e.to_string()).await {
                        tracing::error!(
                            clip_id = %clip.id,
                            error = %store_err,
                            "Failed to record clip failure",
                        );
                    }
                }
                return Err(e);
            }
        }
    }

    enqueue_final_if_ready(ctx, clip.project_id).await
}

async fn process_clip(
    ctx: &PipelineContext,
    project: &Project,
    clip: &Clip,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    tracing::info!(project_id = %project.id, clip_index = clip.clip_index, "Processing clip");

    let scope = cancel.child_token();
    let _scope_guard = scope.clone().drop_guard();

    let (visual, narration) = tokio::try_join!(
        visual_branch(ctx, project, clip, &scope),
        audio_branch(ctx, project, clip, &scope),
    )?;

    let audio_duration_ms = narration.duration_ms;
    let visual_kind = visual.kind();
    let input = ClipRenderInput {
        visual,
        audio: narration.bytes,
        audio_duration_ms,
        captions: narration.captions,
    };
    let renderer = &ctx.providers.renderer;
    let rendered = ctx
        .resources
        .with_slot(Resource::Render, &scope, || {
            cancellable(&scope, async {
                renderer.render_clip(input).await.map_err(PipelineError::from)
            })
        })
        .await?;
    let rendered_ms = rendered
        .duration_ms
        .unwrap_or(audio_duration_ms + NARRATION_LEAD_IN.as_millis() as i32);

    let asset = ctx
        .store_object(
            &scope,
            NewObject {
                project_id: project.id,
                clip_id: Some(clip.id),
                kind: AssetKind::ClipVideo,
                path: clip_video_path(project.id, clip.clip_index),
                content_type: VIDEO_CONTENT_TYPE,
                data: &rendered.bytes,
            },
        )
        .await?;
    ctx.store.set_clip_video(clip.id, asset.id, rendered_ms).await?;

    tracing::info!(
        project_id = %project.id,
        clip_index = clip.clip_index,
        visual = visual_kind,
        rendered_ms,
        "Clip rendered",
    );
    Ok(())
}

async fn visual_branch(
    ctx: &PipelineContext,
    project: &Project,
    clip: &Clip,
    cancel: &CancellationToken,
) -> Result<Visual, PipelineError> {
    let options = ImageOptions {
        aspect_ratio: project.aspect_ratio.clone(),
        style_prompt: project.style_prompt.clone(),
    };
    let generator = &ctx.providers.image;
    let image = ctx
        .resources
        .with_slot(Resource::ImageGen, cancel, || {
            cancellable(cancel, async {
                generator
                    .generate(&clip.image_prompt, &options)
                    .await
                    .map_err(PipelineError::from)
            })
        })
        .await?;

    let path = clip_image_path(project.id, clip.clip_index);
    let asset = ctx
        .store_object(
            cancel,
            NewObject {
                project_id: project.id,
                clip_id: Some(clip.id),
                kind: AssetKind::Image,
                path: path.clone(),
                content_type: IMAGE_CONTENT_TYPE,
                data: &image,
            },
        )
        .await?;
    ctx.store.set_clip_image(clip.id, asset.id).await?;
    tracing::debug!(clip_index = clip.clip_index, bytes = image.len(), "Clip image stored");

    let Some(synth) = ctx.providers.video.as_deref() else {
        return Ok(Visual::Image(image));
    };

    let request = VideoRequest {
        prompt: video_prompt(&clip.video_prompt, project.style_prompt.as_deref()),
        image_url: ctx.providers.storage.public_url(&path),
        duration_secs: clamp_duration(clip.estimated_duration_secs),
        aspect_ratio: project.aspect_ratio.clone(),
        style_prompt: project.style_prompt.clone(),
    };
    let _permit = ctx.resources.acquire(Resource::VideoGen, cancel).await?;
    match generate_video(synth, &ctx.settings.video_poll, cancel, &request).await {
        Ok(video) => {
            tracing::debug!(
                clip_index = clip.clip_index,
                bytes = video.len(),
                "Clip video generated",
            );
            Ok(Visual::Video(video))
        }
        Err(_) if cancel.is_cancelled() => Err(PipelineError::Cancelled),
        Err(e) => {
            tracing::warn!(
                project_id = %project.id,
                clip_index = clip.clip_index,
                timed_out = e.is_timeout(),
                error = %e,
                "Video synthesis failed, using still image",
            );
            Ok(Visual::Image(image))
        }
    }
}

async fn audio_branch(
    ctx: &PipelineContext,
    project: &Project,
    clip: &Clip,
    cancel: &CancellationToken,
) -> Result<Narration, PipelineError> {
    let request = SpeechRequest {
        text: &clip.script,
        voice_style: &clip.voice_style,
        voice_id: project.voice_id.as_deref(),
    };
    let synth = &ctx.providers.speech;
    let speech = ctx
        .resources
        .with_slot(Resource::Speech, cancel, || {
            cancellable(cancel, async {
                synth.synthesize(&request).await.map_err(PipelineError::from)
            })
        })
        .await?;

    let asset = ctx
        .store_object(
            cancel,
            NewObject {
                project_id: project.id,
                clip_id: Some(clip.id),
                kind: AssetKind::Audio,
                path: clip_audio_path(project.id, clip.clip_index),
                content_type: AUDIO_CONTENT_TYPE,
                data: &speech.bytes,
            },
        )
        .await?;
    ctx.store
        .set_clip_audio(clip.id, asset.id, speech.duration_ms)
        .await?;

    let transcriber = &ctx.providers.transcriber;
    let transcribed = cancellable(cancel, async {
        transcriber
            .transcribe(&speech.bytes, project.language.as_deref())
            .await
            .map_err(PipelineError::from)
    })
    .await;
    let captions = match transcribed {
        Ok(words) => build_srt(&words, NARRATION_LEAD_IN),
        Err(e) if e.is_cancelled() => return Err(e),
        Err(e) => {
            tracing::warn!(
                project_id = %project.id,
                clip_index = clip.clip_index,
                error = %e,
                "Transcription failed, rendering without captions",
            );
            None
        }
    };

    Ok(Narration {
        bytes: speech.bytes,
        duration_ms: speech.duration_ms,
        captions,
    })
}

/// Hand the project to `render_final` once no clip is left to render.
///
/// Several clips can finish at once; only the caller that wins the
/// `generating -> rendering` claim enqueues the job.
async fn enqueue_final_if_ready(
    ctx: &PipelineContext,
    project_id: DbId,
) -> Result<(), PipelineError> {
    let remaining = ctx.store.count_unrendered_clips(project_id).await?;
    if remaining > 0 {
        tracing::debug!(project_id = %project_id, remaining, "Clips still pending");
        return Ok(());
    }
    if !ctx.store.claim_final_render(project_id).await? {
        tracing::debug!(project_id = %project_id, "Final render already claimed");
        return Ok(());
    }

    // The claim is spent: a lost hand-off is recovered by enqueueing a new
    // `render_final` for the project, which resumes from `rendering`.
    let job = QueueJob::new(JobKind::RenderFinal, project_id, None);
    if let Err(e) = enqueue_job(ctx, &job).await {
        tracing::error!(
            project_id = %project_id,
            job_id = %job.id,
            error = %e,
            "Final render claimed but not enqueued, re-enqueue render_final to recover",
        );
        return Err(e);
    }
    tracing::info!(
        project_id = %project_id,
        job_id = %job.id,
        "All clips rendered, final render enqueued",
    );
    Ok(())
}

async fn enqueue_job(ctx: &PipelineContext, job: &QueueJob) -> Result<(), PipelineError> {
    ctx.store.create_job(&job.record()).await?;
    ctx.queue.enqueue(job).await?;
    Ok(())
}
