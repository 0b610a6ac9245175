use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::domain::{
    entities::recents::{FeedItem, RecentsFeed, RecentsView, ViewMode},
    repositories::{
        chapter::ChapterRepository, download::DownloadRepository, recents::RecentsRepository,
    },
    services::recents::RecentsService,
};

pub type CommandSender = UnboundedSender<Command>;
type CommandReceiver = UnboundedReceiver<Command>;
pub type EventSender = UnboundedSender<RecentsEvent>;
pub type EventReceiver = UnboundedReceiver<RecentsEvent>;

#[derive(Debug)]
pub enum Command {
    Refresh,
    LoadNextPage,
    SetQuery(String),
    SetViewMode(ViewMode),
    SetShowRead(bool),
}

#[derive(Debug, Clone)]
pub enum RecentsEvent {
    Feed {
        items: Vec<FeedItem>,
        has_new_items: bool,
        scroll_to_top: bool,
        finished: bool,
    },
    Error(String),
}

/// Drives the recents service from a command stream, one pass at a time.
///
/// A command that arrives while a pass is running supersedes it: the pass
/// future is dropped and its half-built feed discarded, since the committed
/// feed is only swapped on completion. Consumers observe the feed through
/// [`RecentsEvent`]s.
pub struct RecentsWorker<R, C, D>
where
    R: RecentsRepository + Send + Sync + 'static,
    C: ChapterRepository + Send + Sync + 'static,
    D: DownloadRepository + Send + Sync + 'static,
{
    service: RecentsService<R, C, D>,
    view: RecentsView,
    feed: RecentsFeed,
    rx: CommandReceiver,
    tx: EventSender,
}

impl<R, C, D> RecentsWorker<R, C, D>
where
    R: RecentsRepository + Send + Sync + 'static,
    C: ChapterRepository + Send + Sync + 'static,
    D: DownloadRepository + Send + Sync + 'static,
{
    pub fn new(
        service: RecentsService<R, C, D>,
        command_receiver: CommandReceiver,
        event_sender: EventSender,
    ) -> Self {
        Self {
            service,
            view: RecentsView::default(),
            feed: RecentsFeed::new(),
            rx: command_receiver,
            tx: event_sender,
        }
    }

    pub async fn run(self) {
        let Self {
            service,
            mut view,
            mut feed,
            mut rx,
            tx,
        } = self;

        let mut pending: Option<Command> = None;
        loop {
            let command = match pending.take() {
                Some(command) => command,
                None => match rx.recv().await {
                    Some(command) => command,
                    None => break,
                },
            };

            let update_page_count = apply_command(&mut view, &mut feed, command);

            let pass = service.load_page(feed.clone(), &view, update_page_count);
            tokio::pin!(pass);
            tokio::select! {
                biased;
                command = rx.recv() => match command {
                    Some(command) => {
                        debug!("recents pass superseded by {command:?}");
                        pending = Some(command);
                    }
                    None => break,
                },
                result = &mut pass => match result {
                    Ok((new_feed, page)) => {
                        feed = new_feed;
                        let _ = tx.send(RecentsEvent::Feed {
                            items: feed.items.clone(),
                            has_new_items: page.has_new_items,
                            scroll_to_top: page.scroll_to_top,
                            finished: feed.finished,
                        });
                    }
                    Err(e) => {
                        error!("recents pass failed: {e}");
                        let _ = tx.send(RecentsEvent::Error(e.to_string()));
                    }
                },
            }
        }

        debug!("recents worker stopped");
    }
}

/// Returns whether the resulting pass is a continuation fetch.
fn apply_command(view: &mut RecentsView, feed: &mut RecentsFeed, command: Command) -> bool {
    match command {
        Command::Refresh => false,
        Command::LoadNextPage => true,
        Command::SetQuery(query) => {
            if query != view.query {
                view.query = query;
                feed.reset();
            }
            false
        }
        Command::SetViewMode(mode) => {
            view.mode = mode;
            feed.reset();
            false
        }
        Command::SetShowRead(show_read) => {
            if show_read != view.show_read {
                view.show_read = show_read;
                feed.reset();
            }
            false
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveDateTime};
    use tokio::sync::mpsc;

    use super::*;
    use crate::domain::{
        entities::{
            chapter::Chapter,
            download::DownloadStatus,
            history::HistoryEntry,
            manga::Manga,
            recents::RecentsRow,
        },
        repositories::{
            chapter::ChapterRepositoryError,
            download::DownloadRepositoryError,
            recents::RecentsRepositoryError,
        },
        services::recents::RecentsConfig,
    };

    #[derive(Default)]
    struct FakeStore {
        rows: Vec<RecentsRow>,
        queries: Mutex<Vec<String>>,
        served: Mutex<VecDeque<bool>>,
    }

    impl FakeStore {
        fn serve(&self, query: &str) -> Vec<RecentsRow> {
            self.queries.lock().unwrap().push(query.to_string());
            let first = self.served.lock().unwrap().pop_front().unwrap_or(true);
            if first { self.rows.clone() } else { vec![] }
        }
    }

    #[async_trait]
    impl RecentsRepository for Arc<FakeStore> {
        async fn get_all_recents(
            &self,
            query: &str,
            _include_read: bool,
            _endless: bool,
            _offset: usize,
            _skip_offset: bool,
        ) -> Result<Vec<RecentsRow>, RecentsRepositoryError> {
            Ok(self.serve(query))
        }

        async fn get_history_recents(
            &self,
            query: &str,
            _endless: bool,
            _offset: usize,
            _skip_offset: bool,
        ) -> Result<Vec<RecentsRow>, RecentsRepositoryError> {
            Ok(self.serve(query))
        }

        async fn get_update_recents(
            &self,
            query: &str,
            _offset: usize,
            _skip_offset: bool,
        ) -> Result<Vec<RecentsRow>, RecentsRepositoryError> {
            Ok(self.serve(query))
        }
    }

    struct NoChapters;

    #[async_trait]
    impl ChapterRepository for NoChapters {
        async fn get_chapters_by_manga_id(
            &self,
            _manga_id: i64,
        ) -> Result<Vec<Chapter>, ChapterRepositoryError> {
            Ok(vec![])
        }
    }

    struct NoDownloads;

    #[async_trait]
    impl DownloadRepository for NoDownloads {
        async fn is_chapter_downloaded(
            &self,
            _chapter_id: i64,
        ) -> Result<bool, DownloadRepositoryError> {
            Ok(false)
        }

        async fn get_queued_download_status(
            &self,
            _chapter_id: i64,
        ) -> Result<Option<DownloadStatus>, DownloadRepositoryError> {
            Ok(None)
        }
    }

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    fn history_row(manga_id: i64, chapter_id: i64) -> RecentsRow {
        RecentsRow::History {
            manga: Manga {
                id: manga_id,
                title: format!("Manga {manga_id}"),
                cover_url: String::new(),
                date_added: dt(1, 0),
            },
            chapter: Chapter {
                id: Some(chapter_id),
                manga_id,
                title: format!("Chapter {chapter_id}"),
                number: chapter_id as f64,
                source_order: 1,
                read: false,
                uploaded_at: dt(1, 0),
                fetched_at: dt(1, 0),
            },
            history: HistoryEntry {
                id: chapter_id,
                chapter_id,
                read_at: dt(10, 12),
            },
        }
    }

    fn spawn_worker(
        store: Arc<FakeStore>,
    ) -> (CommandSender, EventReceiver, tokio::task::JoinHandle<()>) {
        let service = RecentsService::new(store, NoChapters, NoDownloads, RecentsConfig::default());
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let worker = RecentsWorker::new(service, cmd_rx, event_tx);
        let handle = tokio::spawn(worker.run());
        (cmd_tx, event_rx, handle)
    }

    #[tokio::test]
    async fn refresh_emits_feed_and_worker_stops_on_close() {
        let _ = env_logger::builder().is_test(true).try_init();

        let store = Arc::new(FakeStore {
            rows: vec![history_row(1, 1), history_row(2, 2)],
            ..Default::default()
        });
        let (cmd_tx, mut event_rx, handle) = spawn_worker(store);

        cmd_tx.send(Command::Refresh).unwrap();
        let event = event_rx.recv().await.unwrap();
        match event {
            RecentsEvent::Feed {
                items,
                has_new_items,
                scroll_to_top,
                finished,
            } => {
                // Two history entries plus the continue-reading header.
                assert_eq!(items.len(), 3);
                assert!(has_new_items);
                assert!(!scroll_to_top);
                assert!(!finished);
            }
            RecentsEvent::Error(e) => panic!("unexpected error event: {e}"),
        }

        drop(cmd_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn queued_command_supersedes_pending_pass() {
        let store = Arc::new(FakeStore {
            rows: vec![history_row(1, 1)],
            ..Default::default()
        });
        let (cmd_tx, mut event_rx, handle) = spawn_worker(store.clone());

        // Both commands are queued before the worker gets to run, so the
        // refresh pass is dropped before it ever reaches the store.
        cmd_tx.send(Command::Refresh).unwrap();
        cmd_tx.send(Command::SetQuery("Manga 1".to_string())).unwrap();

        let event = event_rx.recv().await.unwrap();
        match event {
            RecentsEvent::Feed { scroll_to_top, .. } => assert!(scroll_to_top),
            RecentsEvent::Error(e) => panic!("unexpected error event: {e}"),
        }
        assert_eq!(
            *store.queries.lock().unwrap(),
            vec!["Manga 1".to_string()]
        );

        drop(cmd_tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn view_mode_change_resets_pagination() {
        let store = Arc::new(FakeStore {
            rows: vec![history_row(1, 1)],
            served: Mutex::new(VecDeque::from([true, true])),
            ..Default::default()
        });
        let (cmd_tx, mut event_rx, handle) = spawn_worker(store);

        cmd_tx.send(Command::Refresh).unwrap();
        let first = event_rx.recv().await.unwrap();
        match first {
            RecentsEvent::Feed { scroll_to_top, .. } => assert!(!scroll_to_top),
            RecentsEvent::Error(e) => panic!("unexpected error event: {e}"),
        }

        cmd_tx.send(Command::SetViewMode(ViewMode::OnlyHistory)).unwrap();
        let second = event_rx.recv().await.unwrap();
        match second {
            RecentsEvent::Feed {
                items,
                scroll_to_top,
                ..
            } => {
                assert!(scroll_to_top);
                // Per-history view is flat: no header item.
                assert_eq!(items.len(), 1);
            }
            RecentsEvent::Error(e) => panic!("unexpected error event: {e}"),
        }

        drop(cmd_tx);
        handle.await.unwrap();
    }
}
