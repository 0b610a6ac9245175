pub mod chapter;
pub mod download;
pub mod history;
pub mod manga;
pub mod recents;
