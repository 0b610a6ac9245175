use chrono::NaiveDateTime;

/// A chapter row. `id` is `None` when the chapter has not been persisted
/// into the chapter table yet, which happens for rows joined from the
/// newly-added leg of the recents query.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter {
    pub id: Option<i64>,
    pub manga_id: i64,
    pub title: String,
    pub number: f64,
    pub source_order: i64,
    pub read: bool,
    pub uploaded_at: NaiveDateTime,
    pub fetched_at: NaiveDateTime,
}
