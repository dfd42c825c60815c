//! Repository for the append-only `assets` table.

use clipforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::asset::{Asset, CreateAsset};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, project_id, clip_id, kind, storage_bucket, storage_path, content_type, byte_size, created_at";

pub struct AssetRepo;

impl AssetRepo {
    pub async fn create(pool: &PgPool, id: DbId, input: &CreateAsset) -> Result<Asset, sqlx::Error> {
        let query = format!(
            "INSERT INTO assets \
                (id, project_id, clip_id, kind, storage_bucket, storage_path, content_type, byte_size) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Asset>(&query)
            .bind(id)
            .bind(input.project_id)
            .bind(input.clip_id)
            .bind(input.kind.as_str())
            .bind(&input.storage_bucket)
            .bind(&input.storage_path)
            .bind(&input.content_type)
            .bind(input.byte_size)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Asset>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM assets WHERE id = $1");
        sqlx::query_as::<_, Asset>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_by_project(pool: &PgPool, project_id: DbId) -> Result<Vec<Asset>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM assets WHERE project_id = $1 ORDER BY created_at ASC"
        );
        sqlx::query_as::<_, Asset>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }
}
