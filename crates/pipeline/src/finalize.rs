//! `render_final` stage: stitch rendered clips into the deliverable.

use clipforge_core::paths::{final_video_path, VIDEO_CONTENT_TYPE};
use clipforge_core::resources::Resource;
use clipforge_db::models::asset::AssetKind;
use clipforge_db::models::project::Project;
use clipforge_db::models::status::ProjectStatus;
use tokio_util::sync::CancellationToken;

use crate::context::{cancellable, NewObject, PipelineContext};
use crate::error::PipelineError;
use crate::plan::{fail_project, UPLOAD_FAILED};
use crate::queue::QueueJob;

pub const CONCAT_FAILED: &str = "concat_failed";

pub async fn handle_render_final(
    ctx: &PipelineContext,
    job: &QueueJob,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let project = ctx.store.get_project(job.project_id).await?;
    match project.status() {
        Some(ProjectStatus::Completed) => {
            tracing::info!(project_id = %project.id, "Project already completed");
            return Ok(());
        }
        Some(ProjectStatus::Rendering) => {}
        Some(ProjectStatus::Generating) => {
            if !ctx.store.claim_final_render(project.id).await? {
                return Err(PipelineError::State(format!(
                    "project {} still has unrendered clips",
                    project.id
                )));
            }
        }
        other => {
            return Err(PipelineError::State(format!(
                "project {} is {}, cannot render final video",
                project.id,
                other.map(|s| s.as_str()).unwrap_or("unknown")
            )));
        }
    }

    render_final(ctx, &project, cancel).await
}

async fn render_final(
    ctx: &PipelineContext,
    project: &Project,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let clips = ctx.store.list_clips(project.id).await?;
    tracing::info!(project_id = %project.id, clips = clips.len(), "Rendering final video");

    let mut videos = Vec::with_capacity(clips.len());
    for clip in &clips {
        let asset_id = clip.video_asset_id.ok_or_else(|| {
            PipelineError::State(format!("clip {} has no rendered video", clip.clip_index))
        })?;
        let asset = ctx.store.get_asset(asset_id).await?;
        videos.push(ctx.fetch_object(cancel, &asset.storage_path).await?);
    }

    let renderer = &ctx.providers.renderer;
    let joined = ctx
        .resources
        .with_slot(Resource::Render, cancel, || {
            cancellable(cancel, async {
                renderer.concatenate(videos).await.map_err(PipelineError::from)
            })
        })
        .await;
    let mut video = match joined {
        Ok(video) => video,
        Err(e) => return Err(fail_project(ctx, project.id, CONCAT_FAILED, e).await),
    };

    if let Some(music) = ctx.settings.background_music.as_deref() {
        let source = video.clone();
        let mixed = ctx
            .resources
            .with_slot(Resource::Render, cancel, || {
                cancellable(cancel, async {
                    renderer
                        .mix_background(source, music)
                        .await
                        .map_err(PipelineError::from)
                })
            })
            .await;
        match mixed {
            Ok(mixed) => video = mixed,
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                tracing::warn!(
                    project_id = %project.id,
                    music = %music.display(),
                    error = %e,
                    "Background music mix failed, keeping narration only",
                );
            }
        }
    }

    let stored = ctx
        .store_object(
            cancel,
            NewObject {
                project_id: project.id,
                clip_id: None,
                kind: AssetKind::FinalVideo,
                path: final_video_path(project.id),
                content_type: VIDEO_CONTENT_TYPE,
                data: &video,
            },
        )
        .await;
    let asset = match stored {
        Ok(asset) => asset,
        Err(e) => return Err(fail_project(ctx, project.id, UPLOAD_FAILED, e).await),
    };
    ctx.store.complete_project(project.id, asset.id).await?;

    tracing::info!(
        project_id = %project.id,
        bytes = video.len(),
        path = %asset.storage_path,
        "Project completed",
    );
    Ok(())
}
