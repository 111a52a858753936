//! Per-session file set tracking
//!
//! A session owns one primary log plus any number of sub-logs that appear
//! over time under `{sessionId}/subagents/`. Each cycle the full set is
//! recomputed from the directory listing and reconciled against the
//! previously tracked set: new paths are seeded from the checkpoint store
//! (or offset 0), vanished paths are dropped from the active set while
//! their checkpoints survive until the session itself is purged.

use crate::checkpoint::CheckpointStore;
use crate::types::{FileKey, WatchedFile};
use std::path::{Path, PathBuf};

/// Tracks the files belonging to the current session.
pub struct FileSetTracker {
    watched: Vec<WatchedFile>,
}

impl FileSetTracker {
    pub fn new() -> Self {
        Self {
            watched: Vec::new(),
        }
    }

    /// Compute the ordered file set for `session_id`: the primary log
    /// first, then sub-logs in listing order.
    pub fn discover(project_dir: &Path, session_id: &str) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let primary = project_dir.join(format!("{}.jsonl", session_id));
        if primary.is_file() {
            files.push(primary);
        }

        let pattern = project_dir
            .join(session_id)
            .join("subagents")
            .join("*.jsonl");
        match glob::glob(&pattern.to_string_lossy()) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    files.push(entry);
                }
            }
            Err(e) => {
                tracing::warn!(pattern = %pattern.display(), error = %e, "Invalid sub-log glob");
            }
        }

        files
    }

    /// Reconcile the freshly discovered set against the tracked one.
    ///
    /// Newly appeared paths start from their checkpointed offset when one
    /// exists for (session, path), else from 0. Paths absent from the new
    /// set are dropped.
    pub fn reconcile(
        &mut self,
        session_id: &str,
        files: &[PathBuf],
        store: &CheckpointStore,
    ) {
        for w in &self.watched {
            if !files.contains(&w.path) {
                tracing::debug!(path = %w.path.display(), "File left the session set");
            }
        }

        // Rebuild in discovery order: survivors keep their progress,
        // newcomers seed from the checkpoint
        let mut next = Vec::with_capacity(files.len());
        for path in files {
            if let Some(existing) = self.watched.iter().find(|w| &w.path == path) {
                next.push(existing.clone());
                continue;
            }
            let key = FileKey::new(session_id, path.clone());
            let (offset, last_size) = store
                .file_checkpoint(&key)
                .map(|cp| (cp.position, cp.last_size))
                .unwrap_or((0, 0));
            tracing::debug!(path = %path.display(), offset, "Watching new session file");
            next.push(WatchedFile {
                path: path.clone(),
                offset,
                last_size,
            });
        }
        self.watched = next;
    }

    /// Currently watched files in processing order.
    pub fn files(&self) -> &[WatchedFile] {
        &self.watched
    }

    /// Record progress for one file after a cycle.
    pub fn set_offset(&mut self, path: &Path, offset: u64, size: u64) {
        if let Some(w) = self.watched.iter_mut().find(|w| w.path == path) {
            w.offset = offset;
            w.last_size = size;
        }
    }

    /// Forget every watched file (session switch).
    pub fn clear(&mut self) {
        self.watched.clear();
    }

    pub fn len(&self) -> usize {
        self.watched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty()
    }
}

impl Default for FileSetTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const SID: &str = "11111111-aaaa-bbbb-cccc-000000000001";

    fn fresh_store(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::open(dir.path().join("checkpoint.json"), 3600)
    }

    #[test]
    fn test_discover_primary_and_sublogs() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::write(root.join(format!("{}.jsonl", SID)), "{}\n").unwrap();
        let sub = root.join(SID).join("subagents");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("agent-b.jsonl"), "{}\n").unwrap();
        fs::write(sub.join("agent-a.jsonl"), "{}\n").unwrap();
        fs::write(sub.join("notes.txt"), "ignored").unwrap();

        let files = FileSetTracker::discover(root, SID);
        assert_eq!(files.len(), 3);
        // Primary first, then sub-logs
        assert_eq!(files[0], root.join(format!("{}.jsonl", SID)));
        assert!(files[1..].iter().all(|p| p.starts_with(&sub)));
    }

    #[test]
    fn test_discover_without_primary() {
        let dir = TempDir::new().unwrap();
        let sub = dir.path().join(SID).join("subagents");
        fs::create_dir_all(&sub).unwrap();
        fs::write(sub.join("agent-a.jsonl"), "{}\n").unwrap();

        let files = FileSetTracker::discover(dir.path(), SID);
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_reconcile_seeds_from_checkpoint() {
        let dir = TempDir::new().unwrap();
        let mut store = fresh_store(&dir);
        let path = dir.path().join(format!("{}.jsonl", SID));
        store.advance_offset(&FileKey::new(SID, path.clone()), 42, 64, 1);

        let mut tracker = FileSetTracker::new();
        tracker.reconcile(SID, &[path.clone()], &store);

        assert_eq!(tracker.files().len(), 1);
        assert_eq!(tracker.files()[0].offset, 42);
    }

    #[test]
    fn test_reconcile_seeds_unknown_at_zero() {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        let path = dir.path().join("fresh.jsonl");

        let mut tracker = FileSetTracker::new();
        tracker.reconcile(SID, &[path.clone()], &store);
        assert_eq!(tracker.files()[0].offset, 0);
    }

    #[test]
    fn test_reconcile_preserves_progress_and_drops_vanished() {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");

        let mut tracker = FileSetTracker::new();
        tracker.reconcile(SID, &[a.clone(), b.clone()], &store);
        tracker.set_offset(&a, 100, 100);

        // b vanishes, a keeps its in-memory progress
        tracker.reconcile(SID, &[a.clone()], &store);
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.files()[0].offset, 100);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let dir = TempDir::new().unwrap();
        let store = fresh_store(&dir);
        let a = dir.path().join("a.jsonl");

        let mut tracker = FileSetTracker::new();
        tracker.reconcile(SID, &[a], &store);
        assert!(!tracker.is_empty());
        tracker.clear();
        assert!(tracker.is_empty());
    }
}
