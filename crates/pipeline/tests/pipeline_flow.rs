mod common;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use clipforge_core::paths::{clip_video_path, final_video_path, plan_path};
use clipforge_core::plan::VideoPlan;
use clipforge_db::models::asset::AssetKind;
use clipforge_db::models::job::JobKind;
use clipforge_db::models::status::{ClipStatus, JobStatus, ProjectStatus};
use clipforge_db::EntityStore;
use clipforge_pipeline::dispatcher::{execute, handle};
use clipforge_pipeline::{PipelineError, PipelineSettings, QueueJob};
use tokio_util::sync::CancellationToken;

use common::{
    fast_video_poll, plan_clip, CountingVideo, Harness, InstantVideo, RejectingSpeech,
    StalledVideo, FAIL_MARKER,
};

#[tokio::test]
async fn project_runs_end_to_end_in_clip_order() {
    let harness = Harness::builder().build();
    let project_id = harness.submit("tidal islands").await;

    assert_eq!(harness.run_all(JobKind::Plan).await, 1);
    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Generating));
    assert!(harness.storage.get(&plan_path(project_id)).is_some());

    let clips = harness.store.list_clips(project_id).await.unwrap();
    assert_eq!(clips.len(), 3);
    assert_eq!(clips.iter().map(|c| c.clip_index).collect::<Vec<_>>(), [0, 1, 2]);

    // Finish clips out of order; the final cut must still follow clip_index.
    let mut clip_jobs = harness.queue.pending(JobKind::ProcessClip);
    assert_eq!(clip_jobs.len(), 3);
    clip_jobs.reverse();
    while harness.pop(JobKind::ProcessClip).await.is_some() {}
    let cancel = CancellationToken::new();
    for job in &clip_jobs {
        execute(&harness.ctx, job, &cancel).await;
    }

    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Rendering));
    assert_eq!(harness.queue.pending(JobKind::RenderFinal).len(), 1);

    assert_eq!(harness.run_all(JobKind::RenderFinal).await, 1);
    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Completed));
    assert!(project.final_video_asset_id.is_some());

    let final_video = harness.storage.get(&final_video_path(project_id)).unwrap();
    assert_eq!(final_video.data, b"[line 0][line 1][line 2]");
    assert_eq!(final_video.content_type, "video/mp4");

    for clip in harness.store.list_clips(project_id).await.unwrap() {
        assert_eq!(clip.status(), Some(ClipStatus::Rendered));
        // Probe unavailable: narration plus lead-in.
        assert_eq!(clip.rendered_duration_ms, Some(4_500));
        assert!(harness
            .storage
            .get(&clip_video_path(project_id, clip.clip_index))
            .is_some());
    }

    let jobs = harness.store.list_jobs(project_id).await.unwrap();
    assert_eq!(jobs.len(), 5);
    assert!(jobs.iter().all(|j| j.status() == Some(JobStatus::Succeeded)));

    let calls = harness.renderer.calls.lock().unwrap().clone();
    assert!(calls.iter().all(|c| c.visual == "image" && c.has_captions));
}

#[tokio::test]
async fn failed_image_fails_only_its_clip() {
    let plan = VideoPlan {
        clips: vec![
            plan_clip(0, "harbour at dawn"),
            plan_clip(1, &format!("{FAIL_MARKER} storm")),
            plan_clip(2, "harbour at dusk"),
        ],
        total_duration_secs: 18,
        narrative_summary: String::new(),
    };
    let harness = Harness::builder().plan(plan).build();
    let project_id = harness.submit("storms").await;

    harness.run_all(JobKind::Plan).await;
    assert_eq!(harness.run_all(JobKind::ProcessClip).await, 3);

    let clips = harness.store.list_clips(project_id).await.unwrap();
    assert_eq!(clips[0].status(), Some(ClipStatus::Rendered));
    assert_eq!(clips[1].status(), Some(ClipStatus::Failed));
    assert_eq!(clips[2].status(), Some(ClipStatus::Rendered));
    assert!(clips[1]
        .error_message
        .as_deref()
        .is_some_and(|m| m.contains("safety filter")));

    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Generating));
    assert!(harness.queue.pending(JobKind::RenderFinal).is_empty());

    let failed_jobs: Vec<_> = harness
        .store
        .list_jobs(project_id)
        .await
        .unwrap()
        .into_iter()
        .filter(|j| j.status() == Some(JobStatus::Failed))
        .collect();
    assert_eq!(failed_jobs.len(), 1);
    assert_eq!(failed_jobs[0].clip_id, Some(clips[1].id));
}

#[tokio::test(start_paused = true)]
async fn speech_failure_stops_video_polling_and_fails_clip() {
    let video = Arc::new(CountingVideo::default());
    let harness = Harness::builder()
        .speech(Arc::new(RejectingSpeech {
            after: Duration::from_secs(3),
        }))
        .video(video.clone())
        .settings(PipelineSettings {
            video_poll: fast_video_poll(),
            background_music: None,
        })
        .build();
    let project_id = harness.submit("silent film").await;
    harness.run_all(JobKind::Plan).await;

    let job = harness.pop(JobKind::ProcessClip).await.unwrap();
    execute(&harness.ctx, &job, &CancellationToken::new()).await;

    // Polls at 1 s and 2 s; the next one was due at 4 s.
    let polls = video.polls();
    assert_eq!(polls, 2);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(video.polls(), polls);

    let clip = harness.store.get_clip(job.clip_id.unwrap()).await.unwrap();
    assert_eq!(clip.status(), Some(ClipStatus::Failed));
    assert_eq!(
        clip.error_message.as_deref(),
        Some("elevenlabs API error (401): bad key")
    );
    assert!(harness.renderer.calls.lock().unwrap().is_empty());

    let record = harness.store.get_job(job.id).await.unwrap();
    assert_eq!(record.status(), Some(JobStatus::Failed));
    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Generating));
}

#[tokio::test(start_paused = true)]
async fn stalled_video_synthesis_falls_back_to_still_image() {
    let harness = Harness::builder()
        .video(Arc::new(StalledVideo))
        .settings(PipelineSettings {
            video_poll: fast_video_poll(),
            background_music: None,
        })
        .build();
    let project_id = harness.submit("slow reveal").await;

    harness.run_all(JobKind::Plan).await;
    harness.run_all(JobKind::ProcessClip).await;

    for clip in harness.store.list_clips(project_id).await.unwrap() {
        assert_eq!(clip.status(), Some(ClipStatus::Rendered));
        assert_eq!(clip.error_message, None);
    }
    let calls = harness.renderer.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|c| c.visual == "image"));
}

#[tokio::test(start_paused = true)]
async fn generated_video_is_used_when_available() {
    let video = Arc::new(InstantVideo {
        requests: Mutex::new(Vec::new()),
    });
    let harness = Harness::builder()
        .video(video.clone())
        .settings(PipelineSettings {
            video_poll: fast_video_poll(),
            background_music: None,
        })
        .build();
    let project_id = harness.submit("city lights").await;

    harness.run_all(JobKind::Plan).await;
    let job = harness.pop(JobKind::ProcessClip).await.unwrap();
    execute(&harness.ctx, &job, &CancellationToken::new()).await;

    let clip = harness.store.get_clip(job.clip_id.unwrap()).await.unwrap();
    assert_eq!(clip.status(), Some(ClipStatus::Rendered));
    assert_eq!(harness.renderer.calls.lock().unwrap()[0].visual, "video");

    let requests = video.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].duration_secs, 6);
    assert_eq!(requests[0].aspect_ratio.as_deref(), Some("9:16"));
    assert!(requests[0].image_url.starts_with("memory://clipforge-test/"));
    assert!(requests[0].image_url.ends_with(&format!("{project_id}/clip_0_image.png")));
}

#[tokio::test]
async fn transcription_failure_renders_without_captions() {
    let harness = Harness::builder().failing_transcriber().build();
    let project_id = harness.submit("quiet forest").await;

    harness.run_all(JobKind::Plan).await;
    harness.run_all(JobKind::ProcessClip).await;

    assert_eq!(harness.store.count_unrendered_clips(project_id).await.unwrap(), 0);
    let calls = harness.renderer.calls.lock().unwrap().clone();
    assert!(calls.iter().all(|c| !c.has_captions));
}

#[tokio::test]
async fn invalid_plan_fails_project() {
    let mut bad = plan_clip(0, "harbour");
    bad.script.clear();
    let harness = Harness::builder()
        .plan(VideoPlan {
            clips: vec![bad],
            ..Default::default()
        })
        .build();
    let project_id = harness.submit("empty words").await;

    harness.run_all(JobKind::Plan).await;

    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Failed));
    assert_eq!(project.error_code.as_deref(), Some("plan_invalid"));
    assert!(harness.store.list_clips(project_id).await.unwrap().is_empty());
    assert!(harness.queue.pending(JobKind::ProcessClip).is_empty());
}

#[tokio::test]
async fn render_final_is_idempotent() {
    let harness = Harness::builder().build();
    let project_id = harness.submit("northern lights").await;
    harness.run_all(JobKind::Plan).await;
    harness.run_all(JobKind::ProcessClip).await;
    harness.run_all(JobKind::RenderFinal).await;

    let first = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(first.status(), Some(ProjectStatus::Completed));

    let again = QueueJob::new(JobKind::RenderFinal, project_id, None);
    handle(&harness.ctx, &again, &CancellationToken::new())
        .await
        .unwrap();

    let second = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(second.final_video_asset_id, first.final_video_asset_id);
}

#[tokio::test]
async fn lost_final_render_is_recovered_by_a_new_render_final_job() {
    let harness = Harness::builder().build();
    let project_id = harness.submit("coral bloom").await;
    harness.run_all(JobKind::Plan).await;
    harness.run_all(JobKind::ProcessClip).await;

    // Drop the hand-off; the claim is already spent.
    assert!(harness.pop(JobKind::RenderFinal).await.is_some());
    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Rendering));

    let clip = harness.store.list_clips(project_id).await.unwrap().remove(0);
    let rerun = QueueJob::new(JobKind::ProcessClip, project_id, Some(clip.id));
    handle(&harness.ctx, &rerun, &CancellationToken::new())
        .await
        .unwrap();
    assert!(harness.queue.pending(JobKind::RenderFinal).is_empty());

    let recovery = QueueJob::new(JobKind::RenderFinal, project_id, None);
    execute(&harness.ctx, &recovery, &CancellationToken::new()).await;

    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Completed));
    let final_video = harness.storage.get(&final_video_path(project_id)).unwrap();
    assert_eq!(final_video.data, b"[line 0][line 1][line 2]");
}

#[tokio::test]
async fn render_final_refuses_unfinished_project() {
    let harness = Harness::builder().build();
    let project_id = harness.submit("half done").await;
    harness.run_all(JobKind::Plan).await;

    let job = QueueJob::new(JobKind::RenderFinal, project_id, None);
    assert_matches!(
        handle(&harness.ctx, &job, &CancellationToken::new()).await,
        Err(PipelineError::State(_))
    );
    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Generating));
}

#[tokio::test]
async fn background_music_is_mixed_into_final_video() {
    let harness = Harness::builder()
        .settings(PipelineSettings {
            background_music: Some(PathBuf::from("/music/bed.mp3")),
            ..Default::default()
        })
        .build();
    let project_id = harness.submit("ocean").await;
    harness.run_all(JobKind::Plan).await;
    harness.run_all(JobKind::ProcessClip).await;
    harness.run_all(JobKind::RenderFinal).await;

    let final_video = harness.storage.get(&final_video_path(project_id)).unwrap();
    assert!(final_video.data.ends_with(b"+music"));

    let project = harness.store.get_project(project_id).await.unwrap();
    let asset = harness
        .store
        .get_asset(project.final_video_asset_id.unwrap())
        .await
        .unwrap();
    assert_eq!(asset.kind, AssetKind::FinalVideo.as_str());
}

#[tokio::test]
async fn cancelled_clip_is_left_for_redispatch() {
    let harness = Harness::builder().build();
    let project_id = harness.submit("interrupted").await;
    harness.run_all(JobKind::Plan).await;

    let job = harness.pop(JobKind::ProcessClip).await.unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();
    execute(&harness.ctx, &job, &cancel).await;

    let clip = harness.store.get_clip(job.clip_id.unwrap()).await.unwrap();
    assert_eq!(clip.status(), Some(ClipStatus::Pending));
    assert_eq!(clip.error_message, None);

    let record = harness.store.get_job(job.id).await.unwrap();
    assert_eq!(record.status(), Some(JobStatus::Failed));
    assert_eq!(record.error_message.as_deref(), Some("cancelled"));

    let project = harness.store.get_project(project_id).await.unwrap();
    assert_eq!(project.status(), Some(ProjectStatus::Generating));
}
