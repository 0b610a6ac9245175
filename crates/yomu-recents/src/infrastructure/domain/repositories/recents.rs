use async_trait::async_trait;
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    domain::{
        entities::{chapter::Chapter, history::HistoryEntry, manga::Manga, recents::RecentsRow},
        repositories::recents::{RecentsRepository, RecentsRepositoryError},
    },
    infrastructure::database::Pool,
};

/// Rows per fetch for paged queries.
const PAGE_SIZE: usize = 50;

#[derive(Clone)]
pub struct RecentsRepositoryImpl {
    pool: Pool,
}

impl RecentsRepositoryImpl {
    pub fn new<P: Into<Pool>>(pool: P) -> Self {
        Self { pool: pool.into() }
    }
}

/// Grouped views always read the top of the feed; endless views page by
/// offset. A dry re-query (`skip_offset`) re-reads from the start with the
/// limit widened to cover every page already shown.
fn page_bounds(endless: bool, offset: usize, skip_offset: bool) -> (i64, i64) {
    if skip_offset {
        ((offset + PAGE_SIZE) as i64, 0)
    } else if endless {
        (PAGE_SIZE as i64, offset as i64)
    } else {
        (PAGE_SIZE as i64, 0)
    }
}

fn like_pattern(query: &str) -> String {
    format!("%{query}%")
}

fn map_chapter(row: &SqliteRow, manga_id: i64) -> Chapter {
    Chapter {
        id: row.get(5),
        manga_id,
        title: row.get(6),
        number: row.get(7),
        source_order: row.get(8),
        read: row.get(9),
        uploaded_at: row.get(10),
        fetched_at: row.get(11),
    }
}

fn map_row(row: &SqliteRow) -> RecentsRow {
    let manga = Manga {
        id: row.get(1),
        title: row.get(2),
        cover_url: row.get(3),
        date_added: row.get(4),
    };

    match row.get::<i64, _>(0) {
        0 => {
            let chapter = map_chapter(row, manga.id);
            let history = HistoryEntry {
                id: row.get(12),
                chapter_id: row.get(5),
                read_at: row.get(13),
            };
            RecentsRow::History {
                manga,
                chapter,
                history,
            }
        }
        1 => RecentsRow::FreshChapter {
            chapter: map_chapter(row, manga.id),
            manga,
        },
        _ => RecentsRow::NewAddition { manga },
    }
}

#[async_trait]
impl RecentsRepository for RecentsRepositoryImpl {
    async fn get_all_recents(
        &self,
        query: &str,
        include_read: bool,
        endless: bool,
        offset: usize,
        skip_offset: bool,
    ) -> Result<Vec<RecentsRow>, RecentsRepositoryError> {
        let (limit, offset) = page_bounds(endless, offset, skip_offset);
        let pattern = like_pattern(query);

        let rows = sqlx::query(
            r#"
        SELECT * FROM (
            SELECT 0 AS kind,
                manga.id AS manga_id,
                manga.title AS manga_title,
                manga.cover_url AS cover_url,
                manga.date_added AS manga_date_added,
                chapter.id AS chapter_id,
                chapter.title AS chapter_title,
                chapter.number AS number,
                chapter.source_order AS source_order,
                chapter.read AS read,
                chapter.uploaded AS uploaded,
                chapter.date_fetch AS date_fetch,
                user_history.id AS history_id,
                MAX(user_history.read_at) AS read_at,
                MAX(user_history.read_at) AS sort_key
            FROM user_history
            JOIN chapter ON chapter.id = user_history.chapter_id
            JOIN manga ON manga.id = chapter.manga_id
            WHERE manga.title LIKE ?
            GROUP BY manga.id
            UNION ALL
            SELECT 1, manga.id, manga.title, manga.cover_url, manga.date_added,
                chapter.id, chapter.title, chapter.number, chapter.source_order,
                chapter.read, chapter.uploaded, chapter.date_fetch,
                NULL, NULL, chapter.date_fetch
            FROM chapter
            JOIN manga ON manga.id = chapter.manga_id
            LEFT JOIN user_history ON user_history.chapter_id = chapter.id
            WHERE user_history.id IS NULL AND
                manga.title LIKE ? AND
                (? OR chapter.read = false)
            UNION ALL
            SELECT 2, manga.id, manga.title, manga.cover_url, manga.date_added,
                NULL, NULL, NULL, NULL, NULL, NULL, NULL,
                NULL, NULL, manga.date_added
            FROM manga
            WHERE manga.title LIKE ?
        )
        ORDER BY sort_key DESC, manga_id DESC
        LIMIT ? OFFSET ?"#,
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(include_read)
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool as &SqlitePool)
        .await?
        .into_par_iter()
        .map(|row| map_row(&row))
        .collect();

        Ok(rows)
    }

    async fn get_history_recents(
        &self,
        query: &str,
        endless: bool,
        offset: usize,
        skip_offset: bool,
    ) -> Result<Vec<RecentsRow>, RecentsRepositoryError> {
        let (limit, offset) = page_bounds(endless, offset, skip_offset);

        let rows = sqlx::query(
            r#"
        SELECT 0 AS kind,
            manga.id AS manga_id,
            manga.title AS manga_title,
            manga.cover_url AS cover_url,
            manga.date_added AS manga_date_added,
            chapter.id AS chapter_id,
            chapter.title AS chapter_title,
            chapter.number AS number,
            chapter.source_order AS source_order,
            chapter.read AS read,
            chapter.uploaded AS uploaded,
            chapter.date_fetch AS date_fetch,
            user_history.id AS history_id,
            MAX(user_history.read_at) AS read_at,
            MAX(user_history.read_at) AS sort_key
        FROM user_history
        JOIN chapter ON chapter.id = user_history.chapter_id
        JOIN manga ON manga.id = chapter.manga_id
        WHERE manga.title LIKE ?
        GROUP BY manga.id
        ORDER BY sort_key DESC, manga.id DESC
        LIMIT ? OFFSET ?"#,
        )
        .bind(like_pattern(query))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool as &SqlitePool)
        .await?
        .into_par_iter()
        .map(|row| map_row(&row))
        .collect();

        Ok(rows)
    }

    async fn get_update_recents(
        &self,
        query: &str,
        offset: usize,
        skip_offset: bool,
    ) -> Result<Vec<RecentsRow>, RecentsRepositoryError> {
        let (limit, offset) = page_bounds(true, offset, skip_offset);

        let rows = sqlx::query(
            r#"
        SELECT 1 AS kind,
            manga.id AS manga_id,
            manga.title AS manga_title,
            manga.cover_url AS cover_url,
            manga.date_added AS manga_date_added,
            chapter.id AS chapter_id,
            chapter.title AS chapter_title,
            chapter.number AS number,
            chapter.source_order AS source_order,
            chapter.read AS read,
            chapter.uploaded AS uploaded,
            chapter.date_fetch AS date_fetch,
            NULL AS history_id,
            NULL AS read_at,
            chapter.date_fetch AS sort_key
        FROM chapter
        JOIN manga ON manga.id = chapter.manga_id
        WHERE manga.title LIKE ?
        ORDER BY sort_key DESC, chapter.id DESC
        LIMIT ? OFFSET ?"#,
        )
        .bind(like_pattern(query))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool as &SqlitePool)
        .await?
        .into_par_iter()
        .map(|row| map_row(&row))
        .collect();

        Ok(rows)
    }
}
