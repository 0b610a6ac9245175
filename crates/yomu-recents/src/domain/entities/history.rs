use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub chapter_id: i64,
    pub read_at: NaiveDateTime,
}
