//! Object storage for generated media.
//!
//! [`SupabaseStore`] talks to a Supabase-style storage REST API. Uploads
//! and downloads go through the retrying transport; signed URLs are a
//! single request. [`MemoryObjectStore`] keeps objects in a map for tests
//! and local runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use clipforge_core::retry::{retry, RetryPolicy};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::http::{ensure_success, parse_json, read_bytes};

const PROVIDER: &str = "storage";

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket recorded on asset rows.
    fn bucket(&self) -> &str;

    /// Store `data` at `path`, replacing any existing object.
    async fn upload(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError>;

    async fn download(&self, path: &str, cancel: &CancellationToken)
        -> Result<Vec<u8>, ProviderError>;

    /// Unauthenticated URL for objects in a public bucket.
    fn public_url(&self, path: &str) -> String;

    /// Time-limited URL for objects in a private bucket.
    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, ProviderError>;
}

// ---------------------------------------------------------------------------
// Supabase
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// Client for a Supabase storage bucket.
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
    upload_policy: RetryPolicy,
    download_policy: RetryPolicy,
}

impl SupabaseStore {
    /// * `base_url` - Project URL, e.g. `https://abc.supabase.co`.
    pub fn new(base_url: &str, service_key: String, bucket: String) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, service_key, bucket)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        service_key: String,
        bucket: String,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
            upload_policy: RetryPolicy::upload(),
            download_policy: RetryPolicy::download(),
        }
    }

    pub fn with_policies(mut self, upload: RetryPolicy, download: RetryPolicy) -> Self {
        self.upload_policy = upload;
        self.download_policy = download;
        self
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, path)
    }

    async fn put_once(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<(), ProviderError> {
        let response = self
            .client
            .put(self.object_url(path))
            .bearer_auth(&self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(data.to_vec())
            .send()
            .await?;

        ensure_success(PROVIDER, response).await?;
        Ok(())
    }

    async fn get_once(&self, path: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self
            .client
            .get(self.object_url(path))
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        read_bytes(PROVIDER, response).await
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        retry(&self.upload_policy, cancel, "storage.upload", move |_| {
            self.put_once(path, data, content_type)
        })
        .await
        .map_err(|e| ProviderError::from_retry("upload", e))?;

        tracing::debug!(path, bytes = data.len(), "Object uploaded");
        Ok(())
    }

    async fn download(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProviderError> {
        retry(&self.download_policy, cancel, "storage.download", move |_| {
            self.get_once(path)
        })
        .await
        .map_err(|e| ProviderError::from_retry("download", e))
    }

    fn public_url(&self, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, path
        )
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!(
                "{}/storage/v1/object/sign/{}/{}",
                self.base_url, self.bucket, path
            ))
            .bearer_auth(&self.service_key)
            .json(&serde_json::json!({ "expiresIn": ttl.as_secs() }))
            .send()
            .await?;

        let signed: SignResponse = parse_json(PROVIDER, response).await?;
        Ok(format!("{}/storage/v1{}", self.base_url, signed.signed_url))
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// [`ObjectStore`] over a process-local map.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    bucket: String,
    objects: Mutex<HashMap<String, StoredObject>>,
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

impl MemoryObjectStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            objects: Mutex::default(),
        }
    }

    pub fn get(&self, path: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn upload(
        &self,
        path: &str,
        data: &[u8],
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).insert(
            path.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn download(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ProviderError> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        self.get(path)
            .map(|object| object.data)
            .ok_or_else(|| ProviderError::Api {
                provider: PROVIDER,
                status: 404,
                body: format!("object {path} not found"),
            })
    }

    fn public_url(&self, path: &str) -> String {
        format!("memory://{}/{}", self.bucket, path)
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, ProviderError> {
        Ok(format!(
            "memory://{}/{}?expires_in={}",
            self.bucket,
            path,
            ttl.as_secs()
        ))
    }
}
