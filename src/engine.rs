//! Process-level wiring.
//!
//! [`Engine::start`] takes a database pool, the external capabilities, a
//! notifier and a config channel, and runs everything:
//!
//! 1. jobs left `active` by a previous process go back to `waiting`
//! 2. the startup rescue resubmits stuck tracks
//! 3. both stage workers start under hot-reload supervisors
//! 4. the periodic rescuer and the subscription synchronizer start
//!
//! [`Engine::shutdown`] stops all of it cooperatively.

use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::Result;
use crate::events::Notifier;
use crate::external::{
    CachedCatalog, CatalogResolver, ConfiguredLayout, PlaylistIndexWriter, Retriever, SourceFinder,
    TrackLayout,
};
use crate::history::{self, HistorySummary};
use crate::ingest::{self, Ingested};
use crate::model::Track;
use crate::pipeline::{DownloadStage, Pipeline, SearchStage};
use crate::queue::{JobKind, JobQueue, WorkerPolicy, spawn_supervised};
use crate::rescuer::{self, Rescuer, RescuerCommand};
use crate::sync::{SyncCommand, Synchronizer};

/// External capabilities the engine drives.
#[derive(Clone)]
pub struct Capabilities {
    pub catalog: Arc<dyn CatalogResolver>,
    pub finder: Arc<dyn SourceFinder>,
    pub retriever: Arc<dyn Retriever>,
    pub index_writer: Arc<dyn PlaylistIndexWriter>,
    /// On-disk naming; `None` follows the `[library]` config section
    pub layout: Option<Arc<dyn TrackLayout>>,
}

/// A running engine.
pub struct Engine {
    pipeline: Pipeline,
    catalog: Arc<CachedCatalog<dyn CatalogResolver>>,
    shutdown: watch::Sender<bool>,
    rescuer: mpsc::Sender<RescuerCommand>,
    synchronizer: mpsc::Sender<SyncCommand>,
    tasks: Vec<JoinHandle<()>>,
}

impl Engine {
    /// Recover from the previous run and start all background work.
    pub async fn start(
        pool: SqlitePool,
        capabilities: Capabilities,
        notifier: Arc<dyn Notifier>,
        config: watch::Receiver<Config>,
    ) -> Result<Self> {
        let queue = JobQueue::new(pool.clone());
        let requeued = queue.requeue_stalled().await?;
        if requeued > 0 {
            tracing::info!(target: "engine", requeued, "Requeued jobs left active by the previous run");
        }

        let pipeline = Pipeline::new(pool, queue.clone(), notifier, config.clone());
        let settings = pipeline.config();

        let catalog = Arc::new(CachedCatalog::new(
            capabilities.catalog,
            settings.catalog.cache_ttl(),
        ));

        rescuer::rescue_on_startup(&pipeline, settings.rescuer.stuck_timeout()).await?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let search = Arc::new(SearchStage::new(pipeline.clone(), capabilities.finder));
        tasks.push(spawn_supervised(
            queue.clone(),
            JobKind::Search,
            search,
            config.clone(),
            |c| WorkerPolicy::search(&c.queue),
            shutdown_rx.clone(),
        ));

        let layout: Arc<dyn TrackLayout> = match capabilities.layout {
            Some(layout) => layout,
            None => Arc::new(ConfiguredLayout::new(config.clone())),
        };
        let download = Arc::new(DownloadStage::new(
            pipeline.clone(),
            capabilities.retriever,
            capabilities.index_writer,
            layout,
        ));
        tasks.push(spawn_supervised(
            queue,
            JobKind::Download,
            download,
            config,
            |c| WorkerPolicy::download(&c.queue),
            shutdown_rx,
        ));

        let periodic = Rescuer::new(pipeline.clone());
        let rescuer = periodic.command_sender();
        tasks.push(periodic.start());

        let sync = Synchronizer::new(pipeline.clone(), catalog.clone());
        let synchronizer = sync.command_sender();
        tasks.push(sync.start());

        tracing::info!(target: "engine", "Engine started");

        Ok(Self {
            pipeline,
            catalog,
            shutdown,
            rescuer,
            synchronizer,
            tasks,
        })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Ingest a catalog URL.
    pub async fn add_from_url(&self, url: &str, subscribe: bool) -> Result<Ingested> {
        ingest::add_from_url(&self.pipeline, self.catalog.as_ref(), url, subscribe).await
    }

    pub async fn retry_track(&self, track_id: i64) -> Result<Track> {
        self.pipeline.retry_track(track_id).await
    }

    pub async fn retry_playlist(&self, playlist_id: i64) -> Result<usize> {
        ingest::retry_playlist(&self.pipeline, playlist_id).await
    }

    pub async fn set_subscribed(&self, playlist_id: i64, subscribed: bool) -> Result<()> {
        ingest::set_subscribed(&self.pipeline, playlist_id, subscribed).await
    }

    pub async fn delete_playlist(&self, playlist_id: i64) -> Result<()> {
        ingest::delete_playlist(&self.pipeline, playlist_id).await
    }

    /// Forget cached catalog responses for a URL.
    pub async fn invalidate_catalog(&self, url: &str) {
        self.catalog.invalidate(url).await;
    }

    /// Consolidated download history.
    pub async fn history(&self) -> Result<Vec<HistorySummary>> {
        let limit = self.pipeline.config().history.page_limit;
        history::history_view(self.pipeline.pool(), limit).await
    }

    /// Run a subscription pass without waiting for the interval.
    pub async fn sync_now(&self) {
        let _ = self.synchronizer.send(SyncCommand::SyncNow).await;
    }

    /// Run a stuck-track sweep without waiting for the interval.
    pub async fn sweep_now(&self) {
        let _ = self.rescuer.send(RescuerCommand::SweepNow).await;
    }

    /// Stop all background work, letting in-flight jobs finish.
    pub async fn shutdown(self) {
        tracing::info!(target: "engine", "Shutting down");
        let _ = self.shutdown.send(true);
        let _ = self.rescuer.send(RescuerCommand::Stop).await;
        let _ = self.synchronizer.send(SyncCommand::Stop).await;

        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(target: "engine", "Background task failed: {}", e);
            }
        }
        tracing::info!(target: "engine", "Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::events::{Event, RecordingNotifier};
    use crate::external::traits::mocks::{
        MockCatalog, MockIndexWriter, MockRetriever, MockSourceFinder,
    };
    use crate::external::{CatalogListing, CatalogTrack};
    use crate::model::{PlaylistKind, TrackStatus};
    use crate::test_utils::{new_track, set_created_at, temp_db, wait_until};

    const URL: &str = "https://cat/playlist/road-trip";

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.queue.poll_interval_ms = 20;
        config.queue.downloads_per_minute = 6_000;
        config.queue.retry_backoff_ms = 10;
        config.library.download_dir = "/music".into();
        config
    }

    fn listing(names: &[&str]) -> CatalogListing {
        CatalogListing {
            name: "Road Trip".into(),
            cover_url: None,
            kind: PlaylistKind::Playlist,
            tracks: names
                .iter()
                .map(|name| CatalogTrack {
                    name: name.to_string(),
                    artist: "Band".into(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    struct Harness {
        catalog: Arc<MockCatalog>,
        retriever: Arc<MockRetriever>,
        index_writer: Arc<MockIndexWriter>,
        notifier: Arc<RecordingNotifier>,
        _config: watch::Sender<Config>,
    }

    async fn start(pool: SqlitePool, finder: MockSourceFinder, retriever: MockRetriever) -> (Engine, Harness) {
        let catalog = Arc::new(MockCatalog::new());
        let retriever = Arc::new(retriever);
        let index_writer = Arc::new(MockIndexWriter::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let (config_tx, config_rx) = watch::channel(fast_config());

        let engine = Engine::start(
            pool,
            Capabilities {
                catalog: catalog.clone(),
                finder: Arc::new(finder),
                retriever: retriever.clone(),
                index_writer: index_writer.clone(),
                layout: None,
            },
            notifier.clone(),
            config_rx,
        )
        .await
        .unwrap();

        (
            engine,
            Harness {
                catalog,
                retriever,
                index_writer,
                notifier,
                _config: config_tx,
            },
        )
    }

    async fn statuses(pool: &SqlitePool, playlist_id: i64) -> Vec<TrackStatus> {
        db::get_playlist_tracks(pool, playlist_id)
            .await
            .unwrap()
            .iter()
            .map(Track::status)
            .collect()
    }

    #[tokio::test]
    async fn test_end_to_end_success() {
        let (pool, _dir) = temp_db().await;
        let (engine, h) = start(pool.clone(), MockSourceFinder::found("https://src/x"), MockRetriever::ok()).await;
        h.catalog.set_listing(URL, listing(&["One", "Two"]));

        let playlist = engine.add_from_url(URL, true).await.unwrap().playlist;
        wait_until(|| async {
            statuses(&pool, playlist.id).await == vec![TrackStatus::Completed; 2]
        })
        .await;

        let history = engine.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].track_count, 2);
        assert_eq!(history[0].playlist_id, Some(playlist.id));

        assert_eq!(h.retriever.call_count(), 2);
        assert!(
            h.retriever
                .destinations
                .lock()
                .iter()
                .all(|path| path.starts_with("/music/Road Trip"))
        );
        assert!(!h.index_writer.writes.lock().is_empty());
        assert_eq!(h.notifier.count(Event::DownloadHistoryUpdated), 2);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_end_to_end_search_failure() {
        let (pool, _dir) = temp_db().await;
        let (engine, h) = start(pool.clone(), MockSourceFinder::not_found("no source"), MockRetriever::ok()).await;
        h.catalog.set_listing(URL, listing(&["One"]));

        let playlist = engine.add_from_url(URL, false).await.unwrap().playlist;
        wait_until(|| async { statuses(&pool, playlist.id).await == vec![TrackStatus::Error] }).await;

        let track = &db::get_playlist_tracks(&pool, playlist.id).await.unwrap()[0];
        assert!(track.error().unwrap().contains("no source"));
        assert_eq!(h.retriever.call_count(), 0);
        assert!(engine.history().await.unwrap().is_empty());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_growing_subscription_downloads_only_new_tracks() {
        let (pool, _dir) = temp_db().await;
        let (engine, h) = start(pool.clone(), MockSourceFinder::found("https://src/x"), MockRetriever::ok()).await;
        h.catalog.set_listing(URL, listing(&["One", "Two"]));

        let playlist = engine.add_from_url(URL, true).await.unwrap().playlist;
        wait_until(|| async { h.retriever.call_count() == 2 }).await;

        h.catalog.set_tracks(URL, listing(&["One", "Two", "Three"]).tracks);
        // The cached listing hides the change until the entry expires
        engine.invalidate_catalog(URL).await;
        engine.sync_now().await;

        wait_until(|| async {
            statuses(&pool, playlist.id).await == vec![TrackStatus::Completed; 3]
        })
        .await;
        assert_eq!(h.retriever.call_count(), 3);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_startup_rescues_stuck_tracks() {
        let (pool, _dir) = temp_db().await;
        let mut track = db::insert_track(&pool, new_track("Band", "Stuck")).await.unwrap();
        track.mark_searching().unwrap();
        track.mark_queued("https://src/old").unwrap();
        db::update_track_lifecycle(&pool, &track).await.unwrap();
        set_created_at(&pool, track.id, db::now() - chrono::Duration::hours(1)).await;

        let (engine, h) = start(pool.clone(), MockSourceFinder::found("https://src/new"), MockRetriever::ok()).await;
        wait_until(|| async {
            db::require_track(&pool, track.id).await.unwrap().status() == TrackStatus::Completed
        })
        .await;

        let stored = db::require_track(&pool, track.id).await.unwrap();
        assert_eq!(stored.source_url(), Some("https://src/new"));
        assert_eq!(h.retriever.call_count(), 1);

        engine.shutdown().await;
    }
}
