use chrono::{NaiveDate, NaiveDateTime};

use super::{chapter::Chapter, download::DownloadStatus, history::HistoryEntry, manga::Manga};

/// How the recents feed is displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewMode {
    GroupAll,
    UngroupAll,
    OnlyHistory,
    OnlyUpdates,
}

impl ViewMode {
    pub fn is_ungrouped(&self) -> bool {
        matches!(self, Self::UngroupAll | Self::OnlyHistory | Self::OnlyUpdates)
    }

    /// Modes whose dedup key is the chapter rather than the manga.
    pub fn is_per_chapter(&self) -> bool {
        matches!(self, Self::OnlyHistory | Self::OnlyUpdates)
    }
}

/// One raw row from the recents query, tagged by which leg of the
/// server-side merge produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum RecentsRow {
    /// The manga has reading history; `chapter` is the last read chapter.
    History {
        manga: Manga,
        chapter: Chapter,
        history: HistoryEntry,
    },
    /// A recently fetched chapter with no history row of its own.
    FreshChapter { manga: Manga, chapter: Chapter },
    /// A manga recently added to the library, joined without a chapter.
    NewAddition { manga: Manga },
}

impl RecentsRow {
    pub fn manga(&self) -> &Manga {
        match self {
            Self::History { manga, .. }
            | Self::FreshChapter { manga, .. }
            | Self::NewAddition { manga } => manga,
        }
    }

    pub fn chapter(&self) -> Option<&Chapter> {
        match self {
            Self::History { chapter, .. } | Self::FreshChapter { chapter, .. } => Some(chapter),
            Self::NewAddition { .. } => None,
        }
    }

    pub fn chapter_id(&self) -> Option<i64> {
        self.chapter().and_then(|chapter| chapter.id)
    }

    pub fn history(&self) -> Option<&HistoryEntry> {
        match self {
            Self::History { history, .. } => Some(history),
            _ => None,
        }
    }

    pub fn last_read_at(&self) -> Option<NaiveDateTime> {
        self.history().map(|history| history.read_at)
    }
}

/// Label attached to grouped feed entries and header markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedLabel {
    NewChapters,
    ContinueReading,
    NewlyAdded,
    Day(NaiveDate),
}

/// One displayable feed row. `chapter` is the resolved chapter, which may
/// differ from the chapter joined in `row`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedEntry {
    pub row: RecentsRow,
    pub chapter: Chapter,
    pub label: Option<FeedLabel>,
    pub download: DownloadStatus,
}

impl FeedEntry {
    pub fn new(row: RecentsRow, chapter: Chapter, label: Option<FeedLabel>) -> Self {
        Self {
            row,
            chapter,
            label,
            download: DownloadStatus::NotDownloaded,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    Entry(FeedEntry),
    Header(FeedLabel),
}

impl FeedItem {
    pub fn entry(&self) -> Option<&FeedEntry> {
        match self {
            Self::Entry(entry) => Some(entry),
            Self::Header(_) => None,
        }
    }
}

/// The inputs of one aggregation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RecentsView {
    pub mode: ViewMode,
    pub query: String,
    pub show_read: bool,
}

impl Default for RecentsView {
    fn default() -> Self {
        Self {
            mode: ViewMode::GroupAll,
            query: String::new(),
            show_read: false,
        }
    }
}

/// Caller-owned feed state, threaded through every pass. The service never
/// keeps feed state of its own, so the owner decides how long a feed lives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentsFeed {
    pub items: Vec<FeedItem>,
    pub page_offset: usize,
    pub finished: bool,
    pub scroll_to_top: bool,
}

impl RecentsFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rewind pagination after a query or settings change. Items are kept;
    /// the next pass replaces them because it runs against offset zero.
    pub fn reset(&mut self) {
        self.page_offset = 0;
        self.finished = false;
        self.scroll_to_top = true;
    }

    pub fn is_on_first_page(&self) -> bool {
        self.page_offset == 0
    }

    pub fn entries(&self) -> impl Iterator<Item = &FeedEntry> {
        self.items.iter().filter_map(FeedItem::entry)
    }
}

/// Outcome of one aggregation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecentsPage {
    pub has_new_items: bool,
    pub scroll_to_top: bool,
}
