//! Last-activity ledger for users and projects.
//!
//! Tracking only touches memory. Each entry carries its own atomic timestamp
//! and dirty flag, so callers never contend on a shared lock and never wait
//! for the database. A background task writes dirty entries to
//! `activity_system` on a fixed cadence.
//!
//! Ordering between a tracker and the flusher: a tracker stores the timestamp
//! and then raises the dirty flag; the flusher clears the flag and then reads
//! the timestamp. Any write the flusher misses leaves the flag raised for the
//! next cycle.

use crate::config::{ActivityConfig, ServerMode};
use crate::models::{ActivityRecord, ActivitySubject, ResourceOwner, SubjectKind, WalletOwner};
use crate::services::clock::Clock;
use crate::services::metrics::{record_flush, record_flush_failure, set_tracked_subjects};
use crate::services::store::ActivityStore;
use dashmap::DashMap;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Default)]
struct ActivityEntry {
    last_activity: AtomicI64,
    dirty: AtomicBool,
}

impl ActivityEntry {
    fn synced(last_activity: i64) -> Self {
        Self {
            last_activity: AtomicI64::new(last_activity),
            dirty: AtomicBool::new(false),
        }
    }

    fn touch(&self, now: i64) {
        self.last_activity.store(now, Ordering::Release);
        self.dirty.store(true, Ordering::Release);
    }

    /// Clear the dirty flag and return the timestamp if it was set.
    fn take_dirty(&self) -> Option<i64> {
        if self.dirty.swap(false, Ordering::AcqRel) {
            Some(self.last_activity.load(Ordering::Acquire))
        } else {
            None
        }
    }
}

pub struct ActivityLedger {
    personal: DashMap<String, ActivityEntry>,
    projects: DashMap<String, ActivityEntry>,
    store: Arc<dyn ActivityStore>,
    clock: Arc<dyn Clock>,
    config: ActivityConfig,
    server_mode: ServerMode,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ActivityLedger {
    pub fn new(
        store: Arc<dyn ActivityStore>,
        clock: Arc<dyn Clock>,
        config: ActivityConfig,
        server_mode: ServerMode,
    ) -> Self {
        Self {
            personal: DashMap::new(),
            projects: DashMap::new(),
            store,
            clock,
            config,
            server_mode,
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    fn entries(&self, kind: SubjectKind) -> &DashMap<String, ActivityEntry> {
        match kind {
            SubjectKind::Personal => &self.personal,
            SubjectKind::Project => &self.projects,
        }
    }

    // =========================================================================
    // Tracking
    // =========================================================================

    pub fn track_usage(&self, subject: &ActivitySubject) {
        let now = self.clock.now_millis();
        let entries = self.entries(subject.kind());

        // Read lock on the shard for the common case of a known subject.
        if let Some(entry) = entries.get(subject.id()) {
            entry.touch(now);
            return;
        }

        entries
            .entry(subject.id().to_string())
            .or_insert_with(|| {
                debug!(
                    subject_kind = %subject.kind(),
                    subject_id = subject.id(),
                    "New activity subject"
                );
                ActivityEntry::default()
            })
            .touch(now);
    }

    pub fn track_usage_personal(&self, username: &str) {
        self.track_usage(&ActivitySubject::Personal(username.to_string()));
    }

    pub fn track_usage_project(&self, project_id: &str) {
        self.track_usage(&ActivitySubject::Project(project_id.to_string()));
    }

    pub fn track_usage_resource_owner(&self, owner: &ResourceOwner) {
        self.track_usage(&ActivitySubject::from(owner));
    }

    pub fn track_usage_wallet_owner(&self, owner: &WalletOwner) {
        self.track_usage(&ActivitySubject::from(owner));
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Last activity in milliseconds, or 0 if the subject was never seen.
    pub fn query_last_active(&self, subject: &ActivitySubject) -> i64 {
        self.entries(subject.kind())
            .get(subject.id())
            .map(|entry| entry.last_activity.load(Ordering::Acquire))
            .unwrap_or(0)
    }

    pub fn query_last_active_personal(&self, username: &str) -> i64 {
        self.query_last_active(&ActivitySubject::Personal(username.to_string()))
    }

    pub fn query_last_active_project(&self, project_id: &str) -> i64 {
        self.query_last_active(&ActivitySubject::Project(project_id.to_string()))
    }

    /// Whether the subject has changes not yet written to the database.
    pub fn is_dirty(&self, subject: &ActivitySubject) -> bool {
        self.entries(subject.kind())
            .get(subject.id())
            .is_some_and(|entry| entry.dirty.load(Ordering::Acquire))
    }

    /// Number of subjects held in memory.
    pub fn len(&self) -> usize {
        self.personal.len() + self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Load every stored row into memory as already synced.
    ///
    /// A subject tracked before loading finishes keeps the newer timestamp.
    #[instrument(skip(self))]
    pub async fn rehydrate(&self) -> Result<usize, AppError> {
        let records = self.store.load_activity().await?;
        let count = records.len();

        for record in records {
            let entries = self.entries(record.kind());
            match entries.get(&record.workspace_reference) {
                Some(entry) => {
                    entry
                        .last_activity
                        .fetch_max(record.last_activity, Ordering::AcqRel);
                }
                None => {
                    entries
                        .entry(record.workspace_reference)
                        .or_insert_with(|| ActivityEntry::synced(record.last_activity));
                }
            }
        }

        set_tracked_subjects(self.len());
        info!(rows = count, "Activity ledger rehydrated");
        Ok(count)
    }

    fn take_dirty_snapshot(&self) -> Vec<ActivityRecord> {
        let mut snapshot = Vec::new();
        for (kind, entries) in [
            (SubjectKind::Personal, &self.personal),
            (SubjectKind::Project, &self.projects),
        ] {
            for item in entries.iter() {
                if let Some(last_activity) = item.value().take_dirty() {
                    snapshot.push(ActivityRecord::new(kind, item.key(), last_activity));
                }
            }
        }
        snapshot
    }

    fn mark_dirty(&self, records: &[ActivityRecord]) {
        for record in records {
            if let Some(entry) = self.entries(record.kind()).get(&record.workspace_reference) {
                entry.dirty.store(true, Ordering::Release);
            }
        }
    }

    /// Write every dirty entry to the database in batches.
    ///
    /// On failure the unwritten entries are marked dirty again and the error
    /// is returned; written batches stay written.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> Result<usize, AppError> {
        let snapshot = self.take_dirty_snapshot();
        set_tracked_subjects(self.len());

        if snapshot.is_empty() {
            debug!("No dirty activity entries");
            return Ok(0);
        }

        let batch_size = self.config.batch_size.max(1);
        let mut written = 0;

        for chunk in snapshot.chunks(batch_size) {
            if let Err(e) = self.store.upsert_activity(chunk).await {
                self.mark_dirty(&snapshot[written..]);
                return Err(e);
            }
            written += chunk.len();
        }

        Ok(written)
    }

    async fn flush_and_record(&self) -> Duration {
        let started = Instant::now();
        match self.flush().await {
            Ok(rows) => {
                let elapsed = started.elapsed();
                record_flush(elapsed.as_secs_f64(), rows);
                if rows > 0 {
                    info!(
                        rows,
                        duration_ms = elapsed.as_millis() as u64,
                        "Activity flushed"
                    );
                }
                elapsed
            }
            Err(e) => {
                record_flush_failure();
                error!(error = %e, "Activity flush failed, entries will be retried");
                started.elapsed()
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Rehydrate from the database, then spawn the flush loop.
    ///
    /// Does nothing outside server mode or when already started. The
    /// lifecycle is one-shot: once stopped, a ledger cannot be started again.
    pub async fn start(self: &Arc<Self>) -> Result<(), AppError> {
        if !self.server_mode.should_run_server_code() {
            debug!(mode = ?self.server_mode, "Activity ledger disabled outside server mode");
            return Ok(());
        }

        if self.shutdown.is_cancelled() {
            warn!("Activity ledger was stopped and cannot be restarted");
            return Err(AppError::FailedPrecondition(anyhow::anyhow!(
                "activity ledger has been stopped"
            )));
        }

        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Activity ledger already started");
            return Ok(());
        }

        self.rehydrate().await?;

        let ledger = Arc::clone(self);
        *task = Some(tokio::spawn(async move { ledger.run().await }));

        info!(
            interval_secs = self.config.flush_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Activity flush loop started"
        );
        Ok(())
    }

    /// Sleep for whatever is left of the interval after the previous flush.
    async fn run(&self) {
        let mut last_flush = Duration::ZERO;
        loop {
            let pause = self.config.flush_interval.saturating_sub(last_flush);
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
            last_flush = self.flush_and_record().await;
        }
        debug!("Activity flush loop stopped");
    }

    /// Stop the loop and write out whatever is still dirty.
    pub async fn stop(&self) -> Result<(), AppError> {
        if !self.server_mode.should_run_server_code() {
            return Ok(());
        }

        self.shutdown.cancel();

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Activity flush loop panicked");
            }
        }

        let rows = self.flush().await?;
        info!(rows, "Activity ledger stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::ManualClock;
    use async_trait::async_trait;

    #[derive(Default)]
    struct NullStore;

    #[async_trait]
    impl ActivityStore for NullStore {
        async fn load_activity(&self) -> Result<Vec<ActivityRecord>, AppError> {
            Ok(vec![])
        }

        async fn upsert_activity(&self, _records: &[ActivityRecord]) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn ledger(clock: Arc<ManualClock>) -> ActivityLedger {
        ActivityLedger::new(
            Arc::new(NullStore),
            clock,
            ActivityConfig::default(),
            ServerMode::Server,
        )
    }

    #[test]
    fn unknown_subjects_read_as_zero() {
        let ledger = ledger(Arc::new(ManualClock::new(5)));
        assert_eq!(ledger.query_last_active_personal("nobody"), 0);
        assert!(!ledger.is_dirty(&ActivitySubject::Personal("nobody".to_string())));
    }

    #[test]
    fn personal_and_project_namespaces_are_separate() {
        let clock = Arc::new(ManualClock::new(100));
        let ledger = ledger(clock.clone());

        ledger.track_usage_personal("same");
        clock.set(200);
        ledger.track_usage_project("same");

        assert_eq!(ledger.query_last_active_personal("same"), 100);
        assert_eq!(ledger.query_last_active_project("same"), 200);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn snapshot_clears_dirty_flags() {
        let clock = Arc::new(ManualClock::new(42));
        let ledger = ledger(clock);
        ledger.track_usage_project("p1");

        let snapshot = ledger.take_dirty_snapshot();
        assert_eq!(snapshot, vec![ActivityRecord::new(SubjectKind::Project, "p1", 42)]);
        assert!(!ledger.is_dirty(&ActivitySubject::Project("p1".to_string())));
        assert!(ledger.take_dirty_snapshot().is_empty());
    }
}
