//! Shared handles passed to every stage handler.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use clipforge_core::poll::PollConfig;
use clipforge_core::resources::{Resource, ResourcePool};
use clipforge_core::types::DbId;
use clipforge_db::models::asset::{Asset, AssetKind, CreateAsset};
use clipforge_db::EntityStore;
use clipforge_providers::image::ImageGenerator;
use clipforge_providers::planner::Planner;
use clipforge_providers::render::MediaRenderer;
use clipforge_providers::speech::SpeechSynth;
use clipforge_providers::storage::ObjectStore;
use clipforge_providers::transcribe::Transcriber;
use clipforge_providers::video::VideoSynth;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::queue::JobQueue;

/// External service clients.
#[derive(Clone)]
pub struct Providers {
    pub planner: Arc<dyn Planner>,
    pub speech: Arc<dyn SpeechSynth>,
    pub image: Arc<dyn ImageGenerator>,
    /// Image-to-video is skipped when `None`.
    pub video: Option<Arc<dyn VideoSynth>>,
    pub transcriber: Arc<dyn Transcriber>,
    pub storage: Arc<dyn ObjectStore>,
    pub renderer: Arc<dyn MediaRenderer>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineSettings {
    pub video_poll: PollConfig,
    /// Looped under the final video when set.
    pub background_music: Option<PathBuf>,
}

/// Everything a stage handler needs. Cheap to clone.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn EntityStore>,
    pub queue: Arc<dyn JobQueue>,
    pub providers: Providers,
    pub resources: ResourcePool,
    pub settings: Arc<PipelineSettings>,
}

/// An object to persist and record as an asset.
pub(crate) struct NewObject<'a> {
    pub project_id: DbId,
    pub clip_id: Option<DbId>,
    pub kind: AssetKind,
    pub path: String,
    pub content_type: &'static str,
    pub data: &'a [u8],
}

impl PipelineContext {
    /// Upload under a storage slot, then insert the asset row.
    pub(crate) async fn store_object(
        &self,
        cancel: &CancellationToken,
        object: NewObject<'_>,
    ) -> Result<Asset, PipelineError> {
        let storage = &self.providers.storage;
        self.resources
            .with_slot(Resource::Storage, cancel, || async {
                storage
                    .upload(&object.path, object.data, object.content_type, cancel)
                    .await
                    .map_err(PipelineError::from)
            })
            .await?;

        let asset = self
            .store
            .create_asset(&CreateAsset {
                project_id: object.project_id,
                clip_id: object.clip_id,
                kind: object.kind,
                storage_bucket: storage.bucket().to_string(),
                storage_path: object.path,
                content_type: Some(object.content_type.to_string()),
                byte_size: Some(object.data.len() as i64),
            })
            .await?;
        Ok(asset)
    }

    /// Download under a storage slot.
    pub(crate) async fn fetch_object(
        &self,
        cancel: &CancellationToken,
        path: &str,
    ) -> Result<Vec<u8>, PipelineError> {
        let storage = &self.providers.storage;
        self.resources
            .with_slot(Resource::Storage, cancel, || async {
                storage
                    .download(path, cancel)
                    .await
                    .map_err(PipelineError::from)
            })
            .await
    }
}

/// Run `fut` unless `cancel` fires first.
pub(crate) async fn cancellable<T, F>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, PipelineError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = fut => result,
    }
}
