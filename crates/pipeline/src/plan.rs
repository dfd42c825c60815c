//! `plan` stage: topic to storyboard to clip rows.

use clipforge_core::error::CoreError;
use clipforge_core::paths::{plan_path, PLAN_CONTENT_TYPE};
use clipforge_core::plan::{validate_plan, VideoPlan};
use clipforge_core::types::DbId;
use clipforge_db::models::asset::AssetKind;
use clipforge_db::models::clip::CreateClip;
use clipforge_db::models::job::JobKind;
use clipforge_db::models::status::ProjectStatus;
use tokio_util::sync::CancellationToken;

use crate::context::{cancellable, NewObject, PipelineContext};
use crate::error::PipelineError;
use crate::queue::QueueJob;

pub const PLAN_GENERATION_FAILED: &str = "plan_generation_failed";
pub const PLAN_INVALID: &str = "plan_invalid";
pub const UPLOAD_FAILED: &str = "upload_failed";

/// Record a fatal project error unless the failure was an abort.
pub(crate) async fn fail_project(
    ctx: &PipelineContext,
    project_id: DbId,
    code: &str,
    err: PipelineError,
) -> PipelineError {
    if err.is_cancelled() {
        return err;
    }
    tracing::error!(project_id = %project_id, code, error = %err, "Project failed");
    if let Err(e) = ctx.store.fail_project(project_id, code, &err.to_string()).await {
        tracing::error!(project_id = %project_id, error = %e, "Failed to record project failure");
    }
    err
}

/// Order planned clips by the planner's own index. Positions, not
/// planner indices, become `clip_index`, so the result is always dense.
fn ordered_clips(mut plan: VideoPlan) -> VideoPlan {
    plan.clips.sort_by_key(|clip| clip.clip_index);
    plan
}

pub async fn handle_plan(
    ctx: &PipelineContext,
    job: &QueueJob,
    cancel: &CancellationToken,
) -> Result<(), PipelineError> {
    let project = ctx.store.get_project(job.project_id).await?;
    match project.status() {
        Some(ProjectStatus::Queued | ProjectStatus::Planning) => {}
        other => {
            return Err(PipelineError::State(format!(
                "project {} is {}, cannot plan",
                project.id,
                other.map(|s| s.as_str()).unwrap_or("unknown")
            )));
        }
    }

    ctx.store
        .set_project_status(project.id, ProjectStatus::Planning)
        .await?;
    tracing::info!(project_id = %project.id, topic = %project.topic, "Planning project");

    let request = project.plan_request();
    let planned = cancellable(cancel, async {
        ctx.providers
            .planner
            .plan(&request)
            .await
            .map_err(PipelineError::from)
    })
    .await;
    let plan = match planned {
        Ok(plan) => ordered_clips(plan),
        Err(e) => return Err(fail_project(ctx, project.id, PLAN_GENERATION_FAILED, e).await),
    };
    if let Err(e) = validate_plan(&plan) {
        return Err(fail_project(ctx, project.id, PLAN_INVALID, e.into()).await);
    }

    let plan_json = serde_json::to_vec_pretty(&plan)
        .map_err(|e| CoreError::Internal(format!("failed to encode plan: {e}")))?;
    let stored = ctx
        .store_object(
            cancel,
            NewObject {
                project_id: project.id,
                clip_id: None,
                kind: AssetKind::PlanJson,
                path: plan_path(project.id),
                content_type: PLAN_CONTENT_TYPE,
                data: &plan_json,
            },
        )
        .await;
    if let Err(e) = stored {
        return Err(fail_project(ctx, project.id, UPLOAD_FAILED, e).await);
    }

    if !ctx.store.list_clips(project.id).await?.is_empty() {
        return Err(PipelineError::State(format!(
            "project {} already has clips",
            project.id
        )));
    }

    let inserts: Vec<CreateClip> = plan
        .clips
        .iter()
        .enumerate()
        .map(|(position, clip)| CreateClip::from_plan(project.id, position, clip))
        .collect();
    let clips = ctx.store.create_clips(&inserts).await?;

    let messages: Vec<QueueJob> = clips
        .iter()
        .map(|clip| QueueJob::new(JobKind::ProcessClip, project.id, Some(clip.id)))
        .collect();
    for message in &messages {
        ctx.store.create_job(&message.record()).await?;
    }

    // Generating before any clip job is visible, so the last clip to
    // finish can always claim the final render.
    ctx.store
        .set_project_status(project.id, ProjectStatus::Generating)
        .await?;
    for message in &messages {
        ctx.queue.enqueue(message).await?;
    }

    tracing::info!(
        project_id = %project.id,
        clips = clips.len(),
        total_secs = plan.total_duration_secs,
        "Plan stored, clip jobs enqueued",
    );
    Ok(())
}
