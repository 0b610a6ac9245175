use async_trait::async_trait;

use thiserror::Error;

use crate::domain::entities::recents::RecentsRow;

#[derive(Debug, Error)]
pub enum RecentsRepositoryError {
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),
}

/// Paged row source for the recents feed.
///
/// `query` filters by manga title in every mode, so switching view modes
/// never changes the search surface.
///
/// `endless` asks for offset-paged results for endless scrolling; without it
/// the store returns the top of the feed. `skip_offset` marks a dry re-query:
/// the store re-reads from the start, wide enough to cover every page already
/// shown, instead of advancing through the table.
#[async_trait]
pub trait RecentsRepository {
    async fn get_all_recents(
        &self,
        query: &str,
        include_read: bool,
        endless: bool,
        offset: usize,
        skip_offset: bool,
    ) -> Result<Vec<RecentsRow>, RecentsRepositoryError>;

    async fn get_history_recents(
        &self,
        query: &str,
        endless: bool,
        offset: usize,
        skip_offset: bool,
    ) -> Result<Vec<RecentsRow>, RecentsRepositoryError>;

    async fn get_update_recents(
        &self,
        query: &str,
        offset: usize,
        skip_offset: bool,
    ) -> Result<Vec<RecentsRow>, RecentsRepositoryError>;
}
