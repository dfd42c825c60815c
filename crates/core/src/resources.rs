//! Fixed-capacity concurrency limits, one per external resource class.
//!
//! Every stage that touches a rate-limited provider or a CPU-heavy local
//! tool goes through [`ResourcePool::with_slot`]. The capacity is a hard
//! ceiling: a caller either holds a permit or is parked waiting for one.
//!
//! The pool is an ordinary value owned by the worker setup and passed
//! down to the handlers, so tests can build isolated pools.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, SemaphorePermit};
use tokio_util::sync::CancellationToken;

/// External resource classes guarded by the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Object-store uploads and downloads.
    Storage,
    /// Text-to-image generation.
    ImageGen,
    /// Text-to-speech synthesis.
    Speech,
    /// Image-to-video synthesis.
    VideoGen,
    /// Local ffmpeg rendering.
    Render,
}

impl Resource {
    pub const ALL: [Resource; 5] = [
        Resource::Storage,
        Resource::ImageGen,
        Resource::Speech,
        Resource::VideoGen,
        Resource::Render,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Resource::Storage => "storage",
            Resource::ImageGen => "image_gen",
            Resource::Speech => "speech",
            Resource::VideoGen => "video_gen",
            Resource::Render => "render",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Slot capacities per resource class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    pub storage: usize,
    pub image_gen: usize,
    pub speech: usize,
    pub video_gen: usize,
    pub render: usize,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            storage: 3,
            image_gen: 2,
            speech: 4,
            video_gen: 2,
            render: 2,
        }
    }
}

impl ResourceLimits {
    /// Configured capacity for one resource class.
    pub fn capacity(&self, resource: Resource) -> usize {
        match resource {
            Resource::Storage => self.storage,
            Resource::ImageGen => self.image_gen,
            Resource::Speech => self.speech,
            Resource::VideoGen => self.video_gen,
            Resource::Render => self.render,
        }
    }
}

/// Failure to obtain a slot. The guarded work never ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("cancelled while waiting for a {0} slot")]
    Cancelled(Resource),

    #[error("{0} slot pool is closed")]
    Closed(Resource),
}

/// Named counting semaphores, one per [`Resource`].
///
/// Cloning is cheap; clones share the same permits.
#[derive(Debug, Clone)]
pub struct ResourcePool {
    limits: ResourceLimits,
    semaphores: Arc<[Semaphore; 5]>,
}

impl ResourcePool {
    pub fn new(limits: ResourceLimits) -> Self {
        let semaphores = Resource::ALL.map(|r| Semaphore::new(limits.capacity(r)));
        Self {
            limits,
            semaphores: Arc::new(semaphores),
        }
    }

    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Number of currently free slots for `resource`.
    pub fn available(&self, resource: Resource) -> usize {
        self.semaphores[resource.index()].available_permits()
    }

    /// Wait for a slot, giving up as soon as `cancel` fires.
    ///
    /// The slot is released when the returned permit is dropped.
    pub async fn acquire(
        &self,
        resource: Resource,
        cancel: &CancellationToken,
    ) -> Result<SemaphorePermit<'_>, SlotError> {
        let semaphore = &self.semaphores[resource.index()];
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SlotError::Cancelled(resource)),
            permit = semaphore.acquire() => permit.map_err(|_| SlotError::Closed(resource)),
        }
    }

    /// Run `f` while holding one slot of `resource`.
    ///
    /// Blocks until a slot is free. If `cancel` fires first, returns
    /// [`SlotError::Cancelled`] without calling `f`. The slot is released
    /// when `f` finishes, whether it returns an error or panics.
    pub async fn with_slot<F, Fut, T, E>(
        &self,
        resource: Resource,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<SlotError>,
    {
        let _permit = self.acquire(resource, cancel).await?;
        tracing::trace!(resource = %resource, "Resource slot acquired");
        f().await
    }
}

impl Default for ResourcePool {
    fn default() -> Self {
        Self::new(ResourceLimits::default())
    }
}
