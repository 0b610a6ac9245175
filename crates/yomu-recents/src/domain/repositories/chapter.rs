use async_trait::async_trait;

use thiserror::Error;

use crate::domain::entities::chapter::Chapter;

#[derive(Debug, Error)]
pub enum ChapterRepositoryError {
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),
}

#[async_trait]
pub trait ChapterRepository {
    /// All chapters of a manga, in ascending source order.
    async fn get_chapters_by_manga_id(
        &self,
        manga_id: i64,
    ) -> Result<Vec<Chapter>, ChapterRepositoryError>;
}
