//! The monitor loop
//!
//! One periodic tick composes the whole pipeline: housekeeping, session
//! resolution, file-set reconciliation, then per-file read → classify →
//! dedup → deliver → checkpoint. Ticks never overlap: a tick that fires
//! while a cycle is in flight is dropped outright, so sustained slow
//! downstream I/O sheds cycles instead of building a backlog.
//!
//! Every failure is contained here and surfaced through logs; nothing a
//! cycle encounters terminates the process.

use crate::checkpoint::CheckpointStore;
use crate::classify::{RawRecord, RecordClassifier};
use crate::config::Config;
use crate::dedup::DedupGuard;
use crate::deliver::{DeliveryPipeline, Messenger};
use crate::error::Result;
use crate::fileset::FileSetTracker;
use crate::plan::PlanDetector;
use crate::reader::IncrementalReader;
use crate::session::SessionResolver;
use crate::types::{Classification, CycleReport, FileKey, WatchedFile};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Cool-down before the same plan confirmation may re-emit.
const PLAN_COOLDOWN_SECS: u64 = 300;

/// Narrow interface to the terminal-automation layer driving the agent.
///
/// Both methods are optional capabilities: a `None` simply disables the
/// corresponding feature for the cycle.
#[async_trait]
pub trait AgentTerminal: Send + Sync {
    /// Working directory of the driving process, used to locate the
    /// session log root.
    async fn working_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Recent terminal output, used for plan-confirmation detection.
    async fn screen_text(&self) -> Option<String> {
        None
    }
}

/// Terminal stub for deployments without a terminal link.
pub struct NoTerminal;

#[async_trait]
impl AgentTerminal for NoTerminal {}

/// Periodic orchestrator over the whole ingest → deliver pipeline.
pub struct Monitor {
    log_root: PathBuf,
    resolver: SessionResolver,
    tracker: FileSetTracker,
    store: CheckpointStore,
    guard: DedupGuard,
    reader: IncrementalReader,
    classifier: RecordClassifier,
    plan: PlanDetector,
    pipeline: DeliveryPipeline,
    terminal: Arc<dyn AgentTerminal>,

    busy: AtomicBool,
    cycle_count: u64,
    last_flush: Instant,
    last_forced_resolve: Option<Instant>,

    flush_interval: Duration,
    force_resolve_interval: Duration,
    cleanup_every_cycles: u64,
    max_persisted_ids: usize,
}

impl Monitor {
    /// Build a monitor on the default XDG paths.
    pub fn new(
        config: &Config,
        messenger: Arc<dyn Messenger>,
        terminal: Arc<dyn AgentTerminal>,
    ) -> Result<Self> {
        let project_path = match &config.project_path {
            Some(path) => path.clone(),
            None => std::env::current_dir()?,
        };
        Ok(Self::with_roots(
            config,
            config.session_log_root(),
            project_path,
            Config::checkpoint_path(),
            messenger,
            terminal,
        ))
    }

    /// Build a monitor with explicit roots (used by tests and embedders).
    pub fn with_roots(
        config: &Config,
        log_root: PathBuf,
        project_path: PathBuf,
        checkpoint_path: PathBuf,
        messenger: Arc<dyn Messenger>,
        terminal: Arc<dyn AgentTerminal>,
    ) -> Self {
        let resolver = SessionResolver::new(&log_root, &project_path);
        let store = CheckpointStore::open(checkpoint_path, config.dedup.ttl_secs);
        let guard = DedupGuard::new(config.dedup.cache_size, config.dedup.ttl_secs);
        let plan = PlanDetector::new(config.delivery.plan_excerpt_len, PLAN_COOLDOWN_SECS);
        let pipeline = DeliveryPipeline::new(
            messenger,
            config.delivery.max_chunk_len,
            config.delivery.chunk_delay_ms,
        );

        Self {
            log_root,
            resolver,
            tracker: FileSetTracker::new(),
            store,
            guard,
            reader: IncrementalReader::new(),
            classifier: RecordClassifier::new(),
            plan,
            pipeline,
            terminal,
            busy: AtomicBool::new(false),
            cycle_count: 0,
            last_flush: Instant::now(),
            last_forced_resolve: None,
            flush_interval: Duration::from_secs(config.monitor.flush_interval_secs),
            force_resolve_interval: Duration::from_secs(config.monitor.force_resolve_secs),
            cleanup_every_cycles: config.monitor.cleanup_every_cycles.max(1),
            max_persisted_ids: config.dedup.max_persisted_ids,
        }
    }

    /// Run one cycle, unless one is already in flight (then the tick is
    /// dropped, not queued).
    pub async fn tick(&mut self) -> CycleReport {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Cycle already in flight, dropping tick");
            return CycleReport::default();
        }
        let report = self.run_cycle().await;
        self.busy.store(false, Ordering::SeqCst);
        report
    }

    /// Record the current session as processed and wait for a new one.
    ///
    /// Must not be called while a cycle is in flight; the monitor provides
    /// no internal locking for this interaction.
    pub fn reset(&mut self) {
        if let Some(id) = self.resolver.current_id().map(str::to_string) {
            self.store.purge_session(&id);
        }
        self.resolver.reset();
        self.tracker.clear();
    }

    /// Final persistence flush. Called once when the loop stops.
    pub fn stop(&mut self) {
        if let Err(e) = self.store.flush() {
            tracing::warn!(error = %e, "Final checkpoint flush failed");
        }
    }

    /// Drive the tick loop until `shutdown` flips to true.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>, poll_interval: Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            poll_ms = poll_interval.as_millis() as u64,
            log_root = %self.log_root.display(),
            "Monitor loop started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    if !report.is_quiet() {
                        tracing::debug!(
                            session = report.session_id.as_deref().unwrap_or("-"),
                            files = report.files_scanned,
                            lines = report.lines_read,
                            delivered = report.delivered,
                            suppressed = report.suppressed,
                            deduped = report.deduped,
                            "Cycle complete"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.stop();
        tracing::info!("Monitor loop stopped");
    }

    // ----- cycle internals -----

    async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        self.cycle_count += 1;

        // (1) periodic housekeeping
        if self.cycle_count % self.cleanup_every_cycles == 0 {
            let expired = self.store.purge_expired_ids() + self.guard.purge_expired();
            let trimmed = self.store.trim_ids(self.max_persisted_ids);
            if expired + trimmed > 0 {
                tracing::debug!(expired, trimmed, "Dedup housekeeping");
            }
        }

        // The driving process may have moved to another project
        if let Some(cwd) = self.terminal.working_dir().await {
            self.resolver.set_project(&self.log_root, &cwd);
        }

        // (2) session resolution, forced periodically to catch silent
        // rotations
        let force = match self.last_forced_resolve {
            Some(at) => at.elapsed() >= self.force_resolve_interval,
            None => true,
        };
        if force {
            self.last_forced_resolve = Some(Instant::now());
        }
        let resolution = self.resolver.resolve(force);

        if let Some(old) = &resolution.switched_from {
            self.tracker.clear();
            self.store.purge_session(old);
        }

        // (3) waiting for a genuinely new session
        if resolution.waiting {
            report.waiting = true;
            report.session_id = resolution.session_id;
            self.flush_if_due();
            return report;
        }

        let Some(session_id) = resolution.session_id else {
            self.flush_if_due();
            return report;
        };
        report.session_id = Some(session_id.clone());

        // (4) file-set reconciliation
        let files = FileSetTracker::discover(self.resolver.project_dir(), &session_id);
        self.tracker.reconcile(&session_id, &files, &self.store);
        report.files_scanned = self.tracker.len();

        // (5) per-file processing
        let watched: Vec<WatchedFile> = self.tracker.files().to_vec();
        for file in watched {
            self.process_file(&session_id, &file, &mut report).await;
        }

        // Terminal-derived plan confirmation (no record id; its own gate)
        if let Some(screen) = self.terminal.screen_text().await {
            if let Some(interaction) = self.plan.detect(&screen) {
                let outcome = self.pipeline.deliver_interaction(&interaction).await;
                report.delivered += 1;
                if !outcome.success {
                    let error = outcome.error.unwrap_or_default();
                    tracing::warn!(error = %error, "Plan confirmation dispatch failed");
                    report.warnings.push(format!("plan dispatch: {}", error));
                }
            }
        }

        self.flush_if_due();
        report
    }

    async fn process_file(
        &mut self,
        session_id: &str,
        file: &WatchedFile,
        report: &mut CycleReport,
    ) {
        let batch = match self.reader.read_new(&file.path, file.offset) {
            Ok(batch) => batch,
            Err(e) => {
                // Transient filesystem error: zero new bytes, no state change
                tracing::debug!(path = %file.path.display(), error = %e, "Read failed, skipping file this cycle");
                report
                    .warnings
                    .push(format!("{}: {}", file.path.display(), e));
                return;
            }
        };

        if batch.lines.is_empty() && batch.new_offset == file.offset {
            return;
        }
        report.lines_read += batch.lines.len();

        for line in &batch.lines {
            let record = match RawRecord::decode(line) {
                Ok(record) => record,
                Err(e) => {
                    // Malformed line: skipped on its own, offset still
                    // advances past it
                    tracing::debug!(path = %file.path.display(), error = %e, "Undecodable line skipped");
                    continue;
                }
            };

            match self.classifier.classify(&record) {
                Classification::Suppress => {
                    report.suppressed += 1;
                    if let Some(id) = &record.uuid {
                        self.guard.mark_seen(id, &mut self.store);
                    }
                }
                classification => {
                    if let Some(id) = &record.uuid {
                        if self.guard.seen(id, &mut self.store) {
                            report.deduped += 1;
                            continue;
                        }
                    }

                    let outcome = match &classification {
                        Classification::Interactive(q) => {
                            self.pipeline.deliver_interaction(q).await
                        }
                        Classification::DeliverText(text) => self.pipeline.deliver(text).await,
                        Classification::Suppress => unreachable!(),
                    };
                    report.delivered += 1;
                    if !outcome.success {
                        let error = outcome.error.unwrap_or_default();
                        tracing::warn!(
                            uuid = record.uuid.as_deref().unwrap_or("-"),
                            error = %error,
                            "Dispatch failed; record stays marked seen"
                        );
                        report.warnings.push(format!("dispatch: {}", error));
                    }

                    // At-most-once: marked seen regardless of outcome
                    if let Some(id) = &record.uuid {
                        self.guard.mark_seen(id, &mut self.store);
                    }
                }
            }
        }

        // Checkpoint progress for this file
        let key = FileKey::new(session_id, file.path.clone());
        let mtime_ms = file_mtime_ms(&file.path);
        self.store
            .advance_offset(&key, batch.new_offset, batch.new_offset, mtime_ms);
        self.tracker
            .set_offset(&file.path, batch.new_offset, batch.new_offset);
    }

    fn flush_if_due(&mut self) {
        if !self.store.is_dirty() || self.last_flush.elapsed() < self.flush_interval {
            return;
        }
        match self.store.flush() {
            Ok(()) => self.last_flush = Instant::now(),
            Err(e) => {
                // State stays dirty; retried on the next due flush
                tracing::warn!(error = %e, "Checkpoint flush failed, will retry");
            }
        }
    }
}

fn file_mtime_ms(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .map(|t| DateTime::<Utc>::from(t).timestamp_millis())
        .unwrap_or_else(|_| Utc::now().timestamp_millis())
}
