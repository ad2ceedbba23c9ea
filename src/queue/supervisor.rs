//! Hot reload of stage workers.
//!
//! The supervisor derives a [`WorkerPolicy`] from every published config.
//! When the policy changes, the running worker is closed (in-flight jobs
//! finish) before a replacement starts, so a stage never has two workers.
//! The claim pacer is carried over unless the per-minute ceiling changed, so
//! a restart cannot open a fresh window.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::worker::{Pacer, pacer};
use super::{JobHandler, JobKind, JobQueue, Worker, WorkerPolicy};
use crate::config::Config;

/// Pacer for the next worker: the current one while the ceiling holds.
fn carry_pacer(
    current: Option<Pacer>,
    from: &WorkerPolicy,
    to: &WorkerPolicy,
) -> Option<Pacer> {
    if from.per_minute == to.per_minute {
        current
    } else {
        pacer(to.per_minute)
    }
}

/// Run a stage worker that follows config changes until `shutdown` flips.
pub fn spawn_supervised(
    queue: JobQueue,
    kind: JobKind,
    handler: Arc<dyn JobHandler>,
    mut config: watch::Receiver<Config>,
    policy_of: fn(&Config) -> WorkerPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut policy = policy_of(&config.borrow_and_update());
        let mut paced = pacer(policy.per_minute);
        let mut worker =
            Worker::start_paced(queue.clone(), kind, policy, paced.clone(), Arc::clone(&handler));
        let mut watching = true;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = config.changed(), if watching => {
                    if changed.is_err() {
                        // Publisher gone; keep the current policy
                        watching = false;
                        continue;
                    }
                    let next = policy_of(&config.borrow_and_update());
                    if next != policy {
                        tracing::info!(
                            target: "queue::worker",
                            stage = %kind,
                            "Policy changed, restarting worker"
                        );
                        worker.close().await;
                        paced = carry_pacer(paced, &policy, &next);
                        policy = next;
                        worker = Worker::start_paced(
                            queue.clone(),
                            kind,
                            policy,
                            paced.clone(),
                            Arc::clone(&handler),
                        );
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        worker.close().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::queue::{Job, JobOptions, TrackSnapshot, search_job_id};
    use crate::test_utils::temp_db;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl JobHandler for Counting {
        async fn handle(&self, _job: &Job) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn snapshot(track_id: i64) -> TrackSnapshot {
        TrackSnapshot {
            track_id,
            playlist_id: None,
            artist: "A".into(),
            name: "B".into(),
            album: String::new(),
        }
    }

    async fn wait_for(check: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !check() {
            assert!(Instant::now() < deadline, "timed out waiting for condition");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_reload_keeps_processing() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);
        let handler = Arc::new(Counting::default());

        let mut initial = Config::default();
        initial.queue.poll_interval_ms = 20;
        let (config_tx, config_rx) = watch::channel(initial.clone());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = spawn_supervised(
            queue.clone(),
            JobKind::Search,
            handler.clone(),
            config_rx,
            |c| WorkerPolicy::search(&c.queue),
            shutdown_rx,
        );

        queue
            .enqueue(JobKind::Search, &search_job_id(1), &snapshot(1), JobOptions::once())
            .await
            .unwrap();
        wait_for(|| handler.0.load(Ordering::SeqCst) == 1).await;

        let mut reloaded = initial;
        reloaded.queue.search_concurrency = 8;
        config_tx.send(reloaded).unwrap();

        for i in 2..=4 {
            queue
                .enqueue(JobKind::Search, &search_job_id(i), &snapshot(i), JobOptions::once())
                .await
                .unwrap();
        }
        wait_for(|| handler.0.load(Ordering::SeqCst) == 4).await;

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
        assert_eq!(queue.pending_count(JobKind::Search).await.unwrap(), 0);
    }

    #[test]
    fn test_pacer_carried_unless_ceiling_changes() {
        let mut config = Config::default();
        let before = WorkerPolicy::download(&config.queue);
        let current = pacer(before.per_minute);

        config.queue.poll_interval_ms = 5;
        let polled = WorkerPolicy::download(&config.queue);
        assert_ne!(before, polled);
        let kept = carry_pacer(current.clone(), &before, &polled).unwrap();
        assert!(Arc::ptr_eq(&kept, current.as_ref().unwrap()));

        config.queue.downloads_per_minute = before.per_minute.unwrap().get() + 1;
        let faster = WorkerPolicy::download(&config.queue);
        let rebuilt = carry_pacer(current.clone(), &polled, &faster).unwrap();
        assert!(!Arc::ptr_eq(&rebuilt, current.as_ref().unwrap()));

        let search = WorkerPolicy::search(&config.queue);
        assert!(carry_pacer(None, &search, &search).is_none());
    }

    #[tokio::test]
    async fn test_stops_when_config_publisher_dropped() {
        let (pool, _dir) = temp_db().await;
        let queue = JobQueue::new(pool);
        let (config_tx, config_rx) = watch::channel(Config::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = spawn_supervised(
            queue,
            JobKind::Download,
            Arc::new(Counting::default()),
            config_rx,
            |c| WorkerPolicy::download(&c.queue),
            shutdown_rx,
        );
        drop(config_tx);
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("supervisor did not stop")
            .unwrap();
    }
}
