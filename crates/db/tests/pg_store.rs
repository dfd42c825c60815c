use assert_matches::assert_matches;
use clipforge_core::plan::ClipPlan;
use clipforge_core::types::new_id;
use clipforge_db::models::asset::{AssetKind, CreateAsset};
use clipforge_db::models::clip::CreateClip;
use clipforge_db::models::job::{CreateJob, JobKind};
use clipforge_db::models::project::CreateProject;
use clipforge_db::models::status::{ClipStatus, JobStatus, ProjectStatus};
use clipforge_db::{EntityStore, PgStore, StoreError};
use sqlx::PgPool;

fn plan_clip(n: i32) -> ClipPlan {
    ClipPlan {
        clip_index: n,
        script: format!("narration {n}"),
        voice_style: "measured".into(),
        image_prompt: "glacier".into(),
        video_prompt: "slow pan".into(),
        estimated_duration_secs: 7,
    }
}

async fn asset(store: &PgStore, project_id: uuid::Uuid, kind: AssetKind) -> uuid::Uuid {
    store
        .create_asset(&CreateAsset {
            project_id,
            clip_id: None,
            kind,
            storage_bucket: "clipforge-videos".into(),
            storage_path: format!("{project_id}/{kind}"),
            content_type: None,
            byte_size: Some(1),
        })
        .await
        .unwrap()
        .id
}

/// Connect, migrate, verify the status lookup tables are seeded.
#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_bootstrap(pool: PgPool) {
    clipforge_db::health_check(&pool).await.unwrap();

    for table in ["project_statuses", "clip_statuses", "job_statuses"] {
        let count: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap_or_else(|e| panic!("{table} query failed: {e}"));
        assert!(count.0 > 0, "{table} should have seed data, got 0 rows");
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_clip_lifecycle_is_forward_only(pool: PgPool) {
    let store = PgStore::new(pool);
    let project = store
        .create_project(&CreateProject::new("coral reefs"))
        .await
        .unwrap();
    let clips = store
        .create_clips(&[
            CreateClip::from_plan(project.id, 0, &plan_clip(0)),
            CreateClip::from_plan(project.id, 1, &plan_clip(1)),
        ])
        .await
        .unwrap();
    let clip = &clips[0];

    let image = asset(&store, project.id, AssetKind::Image).await;
    let audio = asset(&store, project.id, AssetKind::Audio).await;
    let video = asset(&store, project.id, AssetKind::ClipVideo).await;

    // Rendering before the branches land is refused.
    assert_matches!(
        store.set_clip_video(clip.id, video, 1_000).await,
        Err(StoreError::Conflict { .. })
    );

    let after_image = store.set_clip_image(clip.id, image).await.unwrap();
    assert_eq!(after_image.status(), Some(ClipStatus::Imaged));
    let after_audio = store.set_clip_audio(clip.id, audio, 5_100).await.unwrap();
    assert_eq!(after_audio.status(), Some(ClipStatus::Imaged));

    let rendered = store.set_clip_video(clip.id, video, 5_600).await.unwrap();
    assert_eq!(rendered.status(), Some(ClipStatus::Rendered));
    assert_eq!(store.count_unrendered_clips(project.id).await.unwrap(), 1);

    let listed = store.list_clips(project.id).await.unwrap();
    assert_eq!(listed[0].clip_index, 0);
    assert_eq!(listed[1].clip_index, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_final_render_claim_and_completion(pool: PgPool) {
    let store = PgStore::new(pool);
    let project = store
        .create_project(&CreateProject::new("desert winds"))
        .await
        .unwrap();
    let clips = store
        .create_clips(&[CreateClip::from_plan(project.id, 0, &plan_clip(0))])
        .await
        .unwrap();
    store
        .set_project_status(project.id, ProjectStatus::Generating)
        .await
        .unwrap();
    assert!(!store.claim_final_render(project.id).await.unwrap());

    let audio = asset(&store, project.id, AssetKind::Audio).await;
    let image = asset(&store, project.id, AssetKind::Image).await;
    let video = asset(&store, project.id, AssetKind::ClipVideo).await;
    store.set_clip_audio(clips[0].id, audio, 2_000).await.unwrap();
    store.set_clip_image(clips[0].id, image).await.unwrap();
    store.set_clip_video(clips[0].id, video, 2_500).await.unwrap();

    assert!(store.claim_final_render(project.id).await.unwrap());
    assert!(!store.claim_final_render(project.id).await.unwrap());

    let final_video = asset(&store, project.id, AssetKind::FinalVideo).await;
    store.complete_project(project.id, final_video).await.unwrap();
    let done = store.get_project(project.id).await.unwrap();
    assert_eq!(done.status(), Some(ProjectStatus::Completed));
    assert_eq!(done.final_video_asset_id, Some(final_video));
}

#[sqlx::test(migrations = "../../db/migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_start_job_upserts_attempts(pool: PgPool) {
    let store = PgStore::new(pool);
    let project = store
        .create_project(&CreateProject::new("night sky"))
        .await
        .unwrap();
    let input = CreateJob {
        id: new_id(),
        project_id: project.id,
        clip_id: None,
        kind: JobKind::Plan,
    };

    store.create_job(&input).await.unwrap();
    let first = store.start_job(&input).await.unwrap();
    assert_eq!(first.attempts, 1);
    store.fail_job(input.id, "planner down").await.unwrap();

    let second = store.start_job(&input).await.unwrap();
    assert_eq!(second.attempts, 2);
    assert_eq!(second.status(), Some(JobStatus::Running));
    assert_eq!(second.error_message, None);
}
