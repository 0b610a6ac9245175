use chrono::NaiveDateTime;

#[derive(Debug, Clone, PartialEq)]
pub struct Manga {
    pub id: i64,
    pub title: String,
    pub cover_url: String,
    pub date_added: NaiveDateTime,
}
