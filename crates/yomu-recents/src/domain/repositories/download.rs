use async_trait::async_trait;

use thiserror::Error;

use crate::domain::entities::download::DownloadStatus;

#[derive(Debug, Error)]
pub enum DownloadRepositoryError {
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Download status lookups keyed by chapter id. Feed annotation treats
/// failures and missing entries as "not downloaded".
#[async_trait]
pub trait DownloadRepository {
    async fn is_chapter_downloaded(
        &self,
        chapter_id: i64,
    ) -> Result<bool, DownloadRepositoryError>;

    async fn get_queued_download_status(
        &self,
        chapter_id: i64,
    ) -> Result<Option<DownloadStatus>, DownloadRepositoryError>;
}
