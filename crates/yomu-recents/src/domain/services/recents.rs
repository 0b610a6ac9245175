use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};

use chrono::{Duration, NaiveDateTime};
use itertools::Itertools;
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{
    entities::{
        chapter::Chapter,
        download::DownloadStatus,
        manga::Manga,
        recents::{
            FeedEntry, FeedItem, FeedLabel, RecentsFeed, RecentsPage, RecentsRow, RecentsView,
            ViewMode,
        },
    },
    repositories::{
        chapter::{ChapterRepository, ChapterRepositoryError},
        download::DownloadRepository,
        recents::{RecentsRepository, RecentsRepositoryError},
    },
};

#[derive(Debug, Error)]
pub enum RecentsError {
    #[error("recents repository error: {0}")]
    RepositoryError(#[from] RecentsRepositoryError),
    #[error("chapter repository error: {0}")]
    ChapterRepositoryError(#[from] ChapterRepositoryError),
}

fn default_new_chapters_limit() -> usize {
    4
}

fn default_first_page_limit() -> usize {
    9
}

fn default_new_additions_limit() -> usize {
    4
}

fn default_page_floor() -> usize {
    25
}

fn default_max_backfill_retries() -> usize {
    15
}

fn default_fresh_window_hours() -> i64 {
    12
}

/// Tunables of the aggregation pass. The defaults are the values the feed
/// was designed around; hosts can override them from their own config file.
#[derive(Debug, Clone, Deserialize)]
pub struct RecentsConfig {
    #[serde(default = "default_new_chapters_limit")]
    pub new_chapters_limit: usize,
    #[serde(default = "default_first_page_limit")]
    pub first_page_limit: usize,
    #[serde(default = "default_new_additions_limit")]
    pub new_additions_limit: usize,
    #[serde(default = "default_page_floor")]
    pub page_floor: usize,
    #[serde(default = "default_max_backfill_retries")]
    pub max_backfill_retries: usize,
    #[serde(default = "default_fresh_window_hours")]
    pub fresh_window_hours: i64,
}

impl Default for RecentsConfig {
    fn default() -> Self {
        Self {
            new_chapters_limit: default_new_chapters_limit(),
            first_page_limit: default_first_page_limit(),
            new_additions_limit: default_new_additions_limit(),
            page_floor: default_page_floor(),
            max_backfill_retries: default_max_backfill_retries(),
            fresh_window_hours: default_fresh_window_hours(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum DedupKey {
    Manga(i64),
    Chapter(Option<i64>),
}

fn dedup_key(row: &RecentsRow, per_chapter: bool) -> DedupKey {
    if per_chapter {
        DedupKey::Chapter(row.chapter_id())
    } else {
        DedupKey::Manga(row.manga().id)
    }
}

/// Merges history, fresh chapters and new library additions into one
/// deduplicated, paginated feed. The service holds no feed state; callers
/// own a [`RecentsFeed`] and thread it through [`Self::load_page`].
pub struct RecentsService<R, C, D>
where
    R: RecentsRepository,
    C: ChapterRepository,
    D: DownloadRepository,
{
    recents_repo: R,
    chapter_repo: C,
    download_repo: D,
    config: RecentsConfig,
}

impl<R, C, D> RecentsService<R, C, D>
where
    R: RecentsRepository,
    C: ChapterRepository,
    D: DownloadRepository,
{
    pub fn new(recents_repo: R, chapter_repo: C, download_repo: D, config: RecentsConfig) -> Self {
        Self {
            recents_repo,
            chapter_repo,
            download_repo,
            config,
        }
    }

    /// Run one aggregation pass. The feed is taken by value and handed back
    /// so a superseded pass can be dropped without leaving partial results
    /// behind.
    ///
    /// `update_page_count` marks a continuation fetch: the feed is appended
    /// to instead of replaced, and short pages trigger backfill rounds until
    /// enough fresh items accumulate or the retry bound trips.
    pub async fn load_page(
        &self,
        feed: RecentsFeed,
        view: &RecentsView,
        update_page_count: bool,
    ) -> Result<(RecentsFeed, RecentsPage), RecentsError> {
        let mut feed = feed;
        let page = self.run(&mut feed, view, update_page_count, false).await?;
        Ok((feed, page))
    }

    /// One-shot bounded probe over the ungrouped feed, for consumers that
    /// only want "which manga were read most recently". No backfill, no
    /// download annotation, read entries never shown. Manga without any
    /// history are excluded on purpose, not reported with a zero timestamp.
    pub async fn recently_read(&self) -> Result<Vec<(Manga, NaiveDateTime)>, RecentsError> {
        let view = RecentsView {
            mode: ViewMode::UngroupAll,
            ..Default::default()
        };
        let mut feed = RecentsFeed::new();
        self.run(&mut feed, &view, false, true).await?;

        Ok(feed
            .entries()
            .filter_map(|entry| {
                entry
                    .row
                    .last_read_at()
                    .map(|read_at| (entry.row.manga().clone(), read_at))
            })
            .collect())
    }

    async fn run(
        &self,
        feed: &mut RecentsFeed,
        view: &RecentsView,
        update_page_count: bool,
        limit: bool,
    ) -> Result<RecentsPage, RecentsError> {
        let show_read = view.show_read && !limit;
        let is_ungrouped = view.mode.is_ungrouped() || !view.query.is_empty();
        let endless = is_ungrouped && !limit;
        let per_chapter_key = !view.query.is_empty() || view.mode.is_per_chapter();

        let mut retry_count = 0usize;
        let mut item_count = 0usize;
        let mut has_new_items;

        loop {
            let skip_offset = !update_page_count && !feed.is_on_first_page();
            debug!(
                "recents pass: mode={:?} offset={} continuation={update_page_count}",
                view.mode, feed.page_offset
            );

            let raw = match view.mode {
                ViewMode::GroupAll | ViewMode::UngroupAll => {
                    self.recents_repo
                        .get_all_recents(
                            &view.query,
                            show_read,
                            endless,
                            feed.page_offset,
                            skip_offset,
                        )
                        .await?
                }
                ViewMode::OnlyHistory => {
                    self.recents_repo
                        .get_history_recents(&view.query, endless, feed.page_offset, skip_offset)
                        .await?
                }
                ViewMode::OnlyUpdates => {
                    self.recents_repo
                        .get_update_recents(&view.query, feed.page_offset, skip_offset)
                        .await?
                }
            };

            // The cursor advances by the raw count, not the retained count,
            // so discarded rows are still skipped server-side. Dry passes
            // past the first page leave it alone.
            if feed.is_on_first_page() || update_page_count {
                feed.page_offset += raw.len();
            }
            let replace = feed.is_on_first_page() || !update_page_count;

            let drop_existing =
                update_page_count && !feed.is_on_first_page() && view.query.is_empty();
            let existing_keys: HashSet<DedupKey> = if drop_existing {
                feed.entries()
                    .map(|entry| dedup_key(&entry.row, per_chapter_key))
                    .collect()
            } else {
                HashSet::new()
            };

            let rows: Vec<RecentsRow> = raw
                .into_iter()
                .unique_by(|row| dedup_key(row, per_chapter_key))
                .filter(|row| !existing_keys.contains(&dedup_key(row, per_chapter_key)))
                .collect();

            let mut resolved: Vec<(RecentsRow, Chapter)> = Vec::with_capacity(rows.len());
            for row in rows {
                match self.resolve_chapter(&row, view.mode, show_read).await? {
                    Some(chapter) => resolved.push((row, chapter)),
                    None => {
                        // Inherited fallback: a row both heuristics gave up on
                        // still shows under a filter or a per-chapter mode,
                        // keyed to its own chapter.
                        if (!view.query.is_empty() || view.mode.is_per_chapter())
                            && row.chapter_id().is_some()
                        {
                            if let Some(chapter) = row.chapter().cloned() {
                                resolved.push((row, chapter));
                            }
                        }
                    }
                }
            }

            let new_items: Vec<FeedItem> = if view.query.is_empty() && !is_ungrouped {
                self.group_first_page(resolved)
            } else if view.mode == ViewMode::OnlyUpdates {
                group_by_day(resolved)
            } else {
                resolved
                    .into_iter()
                    .map(|(row, chapter)| FeedItem::Entry(FeedEntry::new(row, chapter, None)))
                    .collect()
            };

            let new_len = new_items.len();
            has_new_items = new_len > 0;
            item_count += new_len;

            if replace {
                feed.items = new_items;
            } else {
                feed.items.extend(new_items);
            }

            let grouped_primary = view.mode == ViewMode::GroupAll && view.query.is_empty();
            if update_page_count && item_count < self.config.page_floor && !grouped_primary && !limit
            {
                if !has_new_items {
                    retry_count += 1;
                }
                if retry_count > self.config.max_backfill_retries {
                    warn!(
                        "backfill gave up after {retry_count} empty rounds, marking feed finished"
                    );
                    feed.finished = true;
                    has_new_items = false;
                    break;
                }
                continue;
            }
            break;
        }

        if !limit {
            self.annotate_downloads(feed).await;
        }

        let scroll_to_top = std::mem::take(&mut feed.scroll_to_top);

        Ok(RecentsPage {
            has_new_items,
            scroll_to_top,
        })
    }

    /// Pick the chapter a row should display.
    async fn resolve_chapter(
        &self,
        row: &RecentsRow,
        mode: ViewMode,
        show_read: bool,
    ) -> Result<Option<Chapter>, RecentsError> {
        let resolved = match row {
            // In updates mode the row's chapter is the update itself.
            _ if mode == ViewMode::OnlyUpdates => row.chapter().cloned(),
            RecentsRow::NewAddition { manga } => self.next_unread_chapter(manga.id).await?,
            RecentsRow::History { manga, chapter, .. }
            | RecentsRow::FreshChapter { manga, chapter }
                if chapter.read =>
            {
                let next = self.next_unread_chapter(manga.id).await?;
                next.or_else(|| {
                    (show_read && chapter.id.is_some()).then(|| chapter.clone())
                })
            }
            RecentsRow::FreshChapter { manga, chapter } => {
                let fresh = self.first_fresh_chapter(manga.id, chapter).await?;
                fresh.or_else(|| {
                    (show_read && chapter.id.is_some()).then(|| chapter.clone())
                })
            }
            RecentsRow::History { chapter, .. } => Some(chapter.clone()),
        };

        Ok(resolved)
    }

    /// Next unread chapter of a manga, scanning from the newest source order
    /// down.
    async fn next_unread_chapter(&self, manga_id: i64) -> Result<Option<Chapter>, RecentsError> {
        let mut chapters = self.chapter_repo.get_chapters_by_manga_id(manga_id).await?;
        chapters.sort_by_key(|chapter| Reverse(chapter.source_order));

        Ok(chapters.into_iter().find(|chapter| !chapter.read))
    }

    /// Earliest-in-order unread chapter fetched within the freshness window
    /// of the reference chapter.
    async fn first_fresh_chapter(
        &self,
        manga_id: i64,
        reference: &Chapter,
    ) -> Result<Option<Chapter>, RecentsError> {
        let window = Duration::hours(self.config.fresh_window_hours);
        let mut chapters = self.chapter_repo.get_chapters_by_manga_id(manga_id).await?;
        chapters.sort_by_key(|chapter| Reverse(chapter.source_order));

        Ok(chapters.into_iter().find(|chapter| {
            !chapter.read && (chapter.fetched_at - reference.fetched_at).abs() <= window
        }))
    }

    /// First-page bucketing: new chapters, continue reading, newly added.
    fn group_first_page(&self, resolved: Vec<(RecentsRow, Chapter)>) -> Vec<FeedItem> {
        let window = Duration::hours(self.config.fresh_window_hours);

        let mut new_chapters: Vec<(RecentsRow, Chapter)> = resolved
            .iter()
            .filter(|(row, _)| matches!(row, RecentsRow::FreshChapter { .. }))
            .cloned()
            .collect();
        // Fetched around the same time means sorted by upload instead, so a
        // batch fetch keeps the source's own ordering.
        new_chapters.sort_by(|(_, a), (_, b)| {
            if (a.fetched_at - b.fetched_at).abs() <= window {
                b.uploaded_at.cmp(&a.uploaded_at)
            } else {
                b.fetched_at.cmp(&a.fetched_at)
            }
        });
        new_chapters.truncate(self.config.new_chapters_limit);

        let continue_reading: Vec<(RecentsRow, Chapter)> = resolved
            .iter()
            .filter(|(row, _)| matches!(row, RecentsRow::History { .. }))
            .take(
                self.config
                    .first_page_limit
                    .saturating_sub(new_chapters.len()),
            )
            .cloned()
            .collect();

        let newly_added: Vec<(RecentsRow, Chapter)> = resolved
            .iter()
            .filter(|(row, _)| row.chapter().is_none())
            .take(self.config.new_additions_limit)
            .cloned()
            .collect();

        let mut buckets = vec![
            to_bucket(new_chapters, FeedLabel::NewChapters, true),
            to_bucket(continue_reading, FeedLabel::ContinueReading, true),
            to_bucket(newly_added, FeedLabel::NewlyAdded, false),
        ];
        // Most recently read bucket first; bucket without history trail in
        // their declared order (the sort is stable).
        buckets.sort_by_key(|items| {
            Reverse(
                items
                    .iter()
                    .filter_map(FeedItem::entry)
                    .next()
                    .and_then(|entry| entry.row.last_read_at()),
            )
        });

        buckets.into_iter().flatten().collect()
    }

    /// Stamp download status onto every entry that has a persisted chapter.
    /// Lookups are best effort; failures leave the entry untouched.
    async fn annotate_downloads(&self, feed: &mut RecentsFeed) {
        for item in feed.items.iter_mut() {
            let FeedItem::Entry(entry) = item else {
                continue;
            };
            let Some(chapter_id) = entry.chapter.id else {
                continue;
            };

            match self.download_repo.is_chapter_downloaded(chapter_id).await {
                Ok(true) => {
                    entry.download = DownloadStatus::Downloaded;
                    continue;
                }
                Ok(false) => {}
                Err(e) => {
                    debug!("download lookup failed for chapter {chapter_id}: {e}");
                    continue;
                }
            }

            match self
                .download_repo
                .get_queued_download_status(chapter_id)
                .await
            {
                Ok(Some(status)) => entry.download = status,
                Ok(None) => entry.download = DownloadStatus::NotDownloaded,
                Err(e) => debug!("download queue lookup failed for chapter {chapter_id}: {e}"),
            }
        }
    }
}

fn to_bucket(
    rows: Vec<(RecentsRow, Chapter)>,
    label: FeedLabel,
    trailing_header: bool,
) -> Vec<FeedItem> {
    let mut items: Vec<FeedItem> = rows
        .into_iter()
        .map(|(row, chapter)| FeedItem::Entry(FeedEntry::new(row, chapter, Some(label))))
        .collect();
    if trailing_header && !items.is_empty() {
        items.push(FeedItem::Header(label));
    }

    items
}

/// Updates view: one section per calendar day, newest day first, keeping
/// per-day insertion order.
fn group_by_day(resolved: Vec<(RecentsRow, Chapter)>) -> Vec<FeedItem> {
    let mut by_day: BTreeMap<Reverse<chrono::NaiveDate>, Vec<(RecentsRow, Chapter)>> =
        BTreeMap::new();
    for (row, chapter) in resolved {
        by_day
            .entry(Reverse(chapter.fetched_at.date()))
            .or_default()
            .push((row, chapter));
    }

    by_day
        .into_iter()
        .flat_map(|(Reverse(day), rows)| {
            rows.into_iter().map(move |(row, chapter)| {
                FeedItem::Entry(FeedEntry::new(row, chapter, Some(FeedLabel::Day(day))))
            })
        })
        .collect()
}
