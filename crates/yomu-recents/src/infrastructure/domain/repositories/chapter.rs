use async_trait::async_trait;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use sqlx::{Row, SqlitePool};

use crate::{
    domain::{
        entities::chapter::Chapter,
        repositories::chapter::{ChapterRepository, ChapterRepositoryError},
    },
    infrastructure::database::Pool,
};

#[derive(Clone)]
pub struct ChapterRepositoryImpl {
    pool: Pool,
}

impl ChapterRepositoryImpl {
    pub fn new<P: Into<Pool>>(pool: P) -> Self {
        Self { pool: pool.into() }
    }
}

#[async_trait]
impl ChapterRepository for ChapterRepositoryImpl {
    async fn get_chapters_by_manga_id(
        &self,
        manga_id: i64,
    ) -> Result<Vec<Chapter>, ChapterRepositoryError> {
        let chapters = sqlx::query(
            r#"SELECT id, manga_id, title, number, source_order, read, uploaded, date_fetch
            FROM chapter
            WHERE manga_id = ?
            ORDER BY source_order ASC"#,
        )
        .bind(manga_id)
        .fetch_all(&self.pool as &SqlitePool)
        .await?
        .into_par_iter()
        .map(|row| Chapter {
            id: row.get(0),
            manga_id: row.get(1),
            title: row.get(2),
            number: row.get(3),
            source_order: row.get(4),
            read: row.get(5),
            uploaded_at: row.get(6),
            fetched_at: row.get(7),
        })
        .collect();

        Ok(chapters)
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
    async fn chapters_come_back_in_source_order() {
        let pool = open_database(":memory:", true).await.unwrap();

        sqlx::query("INSERT INTO manga(id, title, cover_url, date_added) VALUES (1, 'One', '', ?)")
            .bind(dt(1))
            .execute(&pool as &SqlitePool)
            .await
            .unwrap();
        for (id, source_order) in [(1, 3), (2, 1), (3, 2)] {
            sqlx::query(
                r#"INSERT INTO chapter(id, manga_id, title, number, source_order, read, uploaded, date_fetch)
                VALUES (?, 1, '', 0, ?, false, ?, ?)"#,
            )
            .bind(id)
            .bind(source_order)
            .bind(dt(2))
            .bind(dt(2))
            .execute(&pool as &SqlitePool)
            .await
            .unwrap();
        }

        let repo = ChapterRepositoryImpl::new(pool);
        let chapters = repo.get_chapters_by_manga_id(1).await.unwrap();

        let orders: Vec<i64> = chapters.iter().map(|c| c.source_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert!(repo.get_chapters_by_manga_id(9).await.unwrap().is_empty());
    }
}
