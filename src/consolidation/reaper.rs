//! The idle reaper: a dedicated background task that detects per-user
//! inactivity and triggers consolidation exactly once per idle epoch.
//!
//! The reaper talks to request handling only through the shared activity
//! map. Consolidation failures are logged and never stop the loop or
//! block other users' sweeps.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::consolidation::Consolidate;
use crate::session::activity::ActivityTracker;

pub struct IdleReaper {
    activity: Arc<ActivityTracker>,
    worker: Arc<dyn Consolidate>,
    idle_threshold: Duration,
    poll_interval: Duration,
}

impl IdleReaper {
    pub fn new(
        activity: Arc<ActivityTracker>,
        worker: Arc<dyn Consolidate>,
        idle_threshold: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            activity,
            worker,
            idle_threshold,
            poll_interval,
        }
    }

    /// One sweep over the tracked users. Users crossing the idle threshold
    /// this sweep are consolidated concurrently; a failure for one user
    /// does not block the others.
    pub async fn scan_once(&self, now: DateTime<Utc>) {
        let idlers: Vec<String> = self
            .activity
            .tracked_users()
            .into_iter()
            .filter(|user_id| self.activity.begin_idle(user_id, now, self.idle_threshold))
            .collect();

        let sweeps = idlers.into_iter().map(|user_id| {
            let worker = self.worker.clone();
            async move {
                tracing::info!(user_id = %user_id, "user went idle, consolidating session");
                if let Err(error) = worker.consolidate(&user_id).await {
                    tracing::warn!(user_id = %user_id, %error, "idle consolidation failed");
                }
            }
        });
        futures::future::join_all(sweeps).await;
    }

    /// Start the polling loop on its own task. The returned handle stops
    /// the loop via a shutdown channel independent of request handling.
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let reaper = Arc::new(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reaper.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; consume the first tick so the
            // first sweep happens one full period after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => reaper.scan_once(Utc::now()).await,
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("idle reaper stopped");
        });

        ReaperHandle {
            task,
            shutdown: shutdown_tx,
        }
    }
}

/// Handle to a running reaper task.
pub struct ReaperHandle {
    task: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl ReaperHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConsolidationError;
    use crate::metadata::UserMetadata;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const THRESHOLD: Duration = Duration::from_secs(300);
    const POLL: Duration = Duration::from_secs(60);

    #[derive(Default)]
    struct CountingWorker {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Consolidate for CountingWorker {
        async fn consolidate(&self, user_id: &str) -> Result<UserMetadata, ConsolidationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ConsolidationError::Parse(
                    crate::error::ExtractionParseError::new("scripted failure"),
                ))
            } else {
                Ok(UserMetadata::new(user_id))
            }
        }
    }

    fn reaper_with(
        worker: Arc<CountingWorker>,
    ) -> (IdleReaper, Arc<ActivityTracker>) {
        let activity = Arc::new(ActivityTracker::new());
        (
            IdleReaper::new(activity.clone(), worker, THRESHOLD, POLL),
            activity,
        )
    }

    #[tokio::test]
    async fn test_consolidates_exactly_once_per_idle_epoch() {
        let worker = Arc::new(CountingWorker::default());
        let (reaper, activity) = reaper_with(worker.clone());

        let t0 = Utc::now();
        activity.touch("u1", t0);

        // Crossing the threshold fires once.
        reaper.scan_once(t0 + chrono::Duration::seconds(400)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);

        // Staying idle does not fire again.
        reaper.scan_once(t0 + chrono::Duration::seconds(800)).await;
        reaper.scan_once(t0 + chrono::Duration::seconds(1200)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);

        // New activity starts a new epoch; idling again fires a second time.
        let t1 = t0 + chrono::Duration::seconds(1300);
        activity.touch("u1", t1);
        reaper.scan_once(t1 + chrono::Duration::seconds(400)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_below_threshold_does_not_fire() {
        let worker = Arc::new(CountingWorker::default());
        let (reaper, activity) = reaper_with(worker.clone());

        let t0 = Utc::now();
        activity.touch("u1", t0);
        reaper.scan_once(t0 + chrono::Duration::seconds(120)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed_and_does_not_refire() {
        let worker = Arc::new(CountingWorker {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let (reaper, activity) = reaper_with(worker.clone());

        let t0 = Utc::now();
        activity.touch("u1", t0);
        reaper.scan_once(t0 + chrono::Duration::seconds(400)).await;
        reaper.scan_once(t0 + chrono::Duration::seconds(800)).await;

        // The failed run counts as this epoch's one invocation.
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_each_user_reaped_independently() {
        let worker = Arc::new(CountingWorker::default());
        let (reaper, activity) = reaper_with(worker.clone());

        let t0 = Utc::now();
        activity.touch("u1", t0);
        activity.touch("u2", t0 + chrono::Duration::seconds(200));

        // Only u1 has crossed the threshold at this point.
        reaper.scan_once(t0 + chrono::Duration::seconds(400)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);

        reaper.scan_once(t0 + chrono::Duration::seconds(600)).await;
        assert_eq!(worker.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_spawned_reaper_stops_on_shutdown() {
        let worker = Arc::new(CountingWorker::default());
        let activity = Arc::new(ActivityTracker::new());
        let reaper = IdleReaper::new(
            activity,
            worker,
            THRESHOLD,
            Duration::from_millis(10),
        );

        let handle = reaper.spawn();
        handle.stop().await;
    }
}
