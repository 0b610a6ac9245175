use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::{
    domain::{
        entities::download::DownloadStatus,
        repositories::download::{DownloadRepository, DownloadRepositoryError},
    },
    infrastructure::database::Pool,
};

#[derive(Clone)]
pub struct DownloadRepositoryImpl {
    pool: Pool,
}

impl DownloadRepositoryImpl {
    pub fn new<P: Into<Pool>>(pool: P) -> Self {
        Self { pool: pool.into() }
    }
}

#[async_trait]
impl DownloadRepository for DownloadRepositoryImpl {
    async fn is_chapter_downloaded(
        &self,
        chapter_id: i64,
    ) -> Result<bool, DownloadRepositoryError> {
        let row = sqlx::query("SELECT downloaded_path IS NOT NULL FROM chapter WHERE id = ?")
            .bind(chapter_id)
            .fetch_optional(&self.pool as &SqlitePool)
            .await?;

        Ok(row.map(|row| row.get(0)).unwrap_or(false))
    }

    async fn get_queued_download_status(
        &self,
        chapter_id: i64,
    ) -> Result<Option<DownloadStatus>, DownloadRepositoryError> {
        let row = sqlx::query("SELECT status FROM download_queue WHERE chapter_id = ?")
            .bind(chapter_id)
            .fetch_optional(&self.pool as &SqlitePool)
            .await?;

        Ok(row.map(|row| DownloadStatus::from(row.get::<i64, _>(0))))
    }
}

#[cfg(test)]
mod test {
    use chrono::{NaiveDate, NaiveDateTime};

    use super::*;
    use crate::infrastructure::database::open_database;

    fn dt(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn download_lookups_by_chapter_id() {
        let pool = open_database(":memory:", true).await.unwrap();

        sqlx::query("INSERT INTO manga(id, title, cover_url, date_added) VALUES (1, 'One', '', ?)")
            .bind(dt(1))
            .execute(&pool as &SqlitePool)
            .await
            .unwrap();
        sqlx::query(
            r#"INSERT INTO chapter(id, manga_id, title, number, source_order, read, uploaded, date_fetch, downloaded_path)
            VALUES (1, 1, '', 0, 1, false, ?, ?, '/downloads/1')"#,
        )
        .bind(dt(2))
        .bind(dt(2))
        .execute(&pool as &SqlitePool)
        .await
        .unwrap();
        sqlx::query(
            r#"INSERT INTO chapter(id, manga_id, title, number, source_order, read, uploaded, date_fetch)
            VALUES (2, 1, '', 0, 2, false, ?, ?)"#,
        )
        .bind(dt(2))
        .bind(dt(2))
        .execute(&pool as &SqlitePool)
        .await
        .unwrap();
        sqlx::query("INSERT INTO download_queue(chapter_id, status, date_added) VALUES (2, 2, ?)")
            .bind(dt(3))
            .execute(&pool as &SqlitePool)
            .await
            .unwrap();

        let repo = DownloadRepositoryImpl::new(pool);

        assert!(repo.is_chapter_downloaded(1).await.unwrap());
        assert!(!repo.is_chapter_downloaded(2).await.unwrap());
        assert!(!repo.is_chapter_downloaded(9).await.unwrap());
        assert_eq!(
            repo.get_queued_download_status(2).await.unwrap(),
            Some(DownloadStatus::Downloading)
        );
        assert_eq!(repo.get_queued_download_status(1).await.unwrap(), None);
    }
}
