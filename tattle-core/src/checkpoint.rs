//! Durable checkpoint store
//!
//! Two logical tables persisted in one JSON file:
//! - `uuids`: delivered-record identifier → last-seen epoch milliseconds
//! - `files`: (session, path) → byte offset / size / mtime
//!
//! The file is written atomically (temp file + rename) with owner-only
//! permissions. Identifier entries expire after a TTL and are removed
//! lazily on lookup; file entries are purged wholesale when their session
//! stops being current.
//!
//! On disk the file key is the `"sessionId:path"` string from the wire
//! format. The value carries `sessionId` redundantly, which is what makes
//! the split unambiguous on load even when the path itself contains `:`.

use crate::error::{Error, Result};
use crate::types::{FileCheckpoint, FileKey};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Wire format version written to the checkpoint file.
const CHECKPOINT_VERSION: u32 = 1;

/// Serialized checkpoint file shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CheckpointFile {
    #[serde(default)]
    uuids: HashMap<String, i64>,
    #[serde(default)]
    files: HashMap<String, FileEntry>,
    #[serde(default = "default_version")]
    version: u32,
}

fn default_version() -> u32 {
    CHECKPOINT_VERSION
}

/// Serialized per-file entry.
#[derive(Debug, Serialize, Deserialize)]
struct FileEntry {
    position: u64,
    #[serde(rename = "lastSize")]
    last_size: u64,
    mtime: i64,
    #[serde(rename = "sessionId")]
    session_id: String,
}

/// Durable key/value store of processed identifiers and per-file offsets.
pub struct CheckpointStore {
    path: PathBuf,
    uuids: HashMap<String, i64>,
    files: HashMap<FileKey, FileCheckpoint>,
    ttl_ms: i64,
    dirty: bool,
}

impl CheckpointStore {
    /// Open (or create) a store backed by the given file.
    ///
    /// A missing file yields an empty store. A corrupt file is logged and
    /// replaced on the next flush rather than aborting the monitor.
    pub fn open(path: impl AsRef<Path>, ttl_secs: u64) -> Self {
        let path = path.as_ref().to_path_buf();
        let ttl_ms = (ttl_secs as i64).saturating_mul(1000);

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Self {
                    path,
                    uuids: HashMap::new(),
                    files: HashMap::new(),
                    ttl_ms,
                    dirty: false,
                };
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read checkpoint, starting empty");
                return Self {
                    path,
                    uuids: HashMap::new(),
                    files: HashMap::new(),
                    ttl_ms,
                    dirty: false,
                };
            }
        };

        let parsed: CheckpointFile = match serde_json::from_str(&raw) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt checkpoint file, starting empty");
                CheckpointFile::default()
            }
        };

        if parsed.version > CHECKPOINT_VERSION {
            tracing::warn!(
                version = parsed.version,
                "Checkpoint written by a newer version, fields may be ignored"
            );
        }

        let mut files = HashMap::new();
        for (key, entry) in parsed.files {
            // The path is the key minus the "sessionId:" prefix
            let prefix = format!("{}:", entry.session_id);
            let Some(path_part) = key.strip_prefix(&prefix) else {
                tracing::warn!(key = %key, "Checkpoint file entry has mismatched session prefix, dropping");
                continue;
            };
            files.insert(
                FileKey::new(entry.session_id.clone(), path_part),
                FileCheckpoint {
                    position: entry.position,
                    last_size: entry.last_size,
                    mtime: entry.mtime,
                },
            );
        }

        tracing::debug!(
            path = %path.display(),
            uuids = parsed.uuids.len(),
            files = files.len(),
            "Checkpoint loaded"
        );

        Self {
            path,
            uuids: parsed.uuids,
            files,
            ttl_ms,
            dirty: false,
        }
    }

    // ----- identifier table -----

    /// Whether `id` was recorded within the TTL window.
    ///
    /// An expired entry is removed on the way out (lazy eviction).
    pub fn contains_id(&mut self, id: &str) -> bool {
        self.contains_id_at(id, Utc::now().timestamp_millis())
    }

    fn contains_id_at(&mut self, id: &str, now_ms: i64) -> bool {
        match self.uuids.get(id) {
            Some(&ts) if now_ms.saturating_sub(ts) < self.ttl_ms => true,
            Some(_) => {
                self.uuids.remove(id);
                self.dirty = true;
                false
            }
            None => false,
        }
    }

    /// Record `id` as processed now.
    pub fn record_id(&mut self, id: &str) {
        self.record_id_at(id, Utc::now().timestamp_millis());
    }

    fn record_id_at(&mut self, id: &str, now_ms: i64) {
        self.uuids.insert(id.to_string(), now_ms);
        self.dirty = true;
    }

    /// Remove every identifier entry older than the TTL. Returns the count.
    pub fn purge_expired_ids(&mut self) -> usize {
        let now_ms = Utc::now().timestamp_millis();
        let before = self.uuids.len();
        let ttl_ms = self.ttl_ms;
        self.uuids.retain(|_, &mut ts| now_ms.saturating_sub(ts) < ttl_ms);
        let removed = before - self.uuids.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Trim the identifier table down to `max` entries, oldest first.
    ///
    /// Used by the memory-pressure housekeeping pass.
    pub fn trim_ids(&mut self, max: usize) -> usize {
        if self.uuids.len() <= max {
            return 0;
        }
        let mut entries: Vec<(String, i64)> =
            self.uuids.iter().map(|(k, &v)| (k.clone(), v)).collect();
        entries.sort_by_key(|&(_, ts)| ts);
        let excess = entries.len() - max;
        for (id, _) in entries.into_iter().take(excess) {
            self.uuids.remove(&id);
        }
        self.dirty = true;
        excess
    }

    /// Number of identifier entries currently held.
    pub fn id_count(&self) -> usize {
        self.uuids.len()
    }

    // ----- file offset table -----

    /// Look up the checkpoint for one (session, file) pair.
    pub fn file_checkpoint(&self, key: &FileKey) -> Option<&FileCheckpoint> {
        self.files.get(key)
    }

    /// Advance the offset for one (session, file) pair.
    ///
    /// Offsets never move backwards while a session is current; a smaller
    /// `position` is ignored.
    pub fn advance_offset(&mut self, key: &FileKey, position: u64, size: u64, mtime_ms: i64) {
        let entry = self.files.entry(key.clone()).or_default();
        if position < entry.position {
            tracing::debug!(
                path = %key.path.display(),
                have = entry.position,
                got = position,
                "Ignoring offset regression"
            );
            return;
        }
        entry.position = position;
        entry.last_size = size;
        entry.mtime = mtime_ms;
        self.dirty = true;
    }

    /// Remove every file entry belonging to `session_id`. Returns the count.
    pub fn purge_session(&mut self, session_id: &str) -> usize {
        let before = self.files.len();
        self.files.retain(|key, _| key.session_id != session_id);
        let removed = before - self.files.len();
        if removed > 0 {
            self.dirty = true;
            tracing::info!(session = %session_id, removed, "Purged session file checkpoints");
        }
        removed
    }

    // ----- persistence -----

    /// Whether in-memory state differs from the last successful flush.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Write the store to disk atomically if anything changed.
    ///
    /// On failure the state stays dirty and is retried on the next flush.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.save()?;
        self.dirty = false;
        Ok(())
    }

    /// Unconditional atomic write: serialize to a temp file in the target
    /// directory, fix permissions, then rename over the destination.
    pub fn save(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;

        let wire = CheckpointFile {
            uuids: self.uuids.clone(),
            files: self
                .files
                .iter()
                .map(|(key, cp)| {
                    let wire_key = format!("{}:{}", key.session_id, key.path.display());
                    (
                        wire_key,
                        FileEntry {
                            position: cp.position,
                            last_size: cp.last_size,
                            mtime: cp.mtime,
                            session_id: key.session_id.clone(),
                        },
                    )
                })
                .collect(),
            version: CHECKPOINT_VERSION,
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        serde_json::to_writer(&mut tmp, &wire)?;
        tmp.flush()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(tmp.path(), std::fs::Permissions::from_mode(0o600))?;
        }

        tmp.persist(&self.path)
            .map_err(|e| Error::Checkpoint(format!("rename failed: {}", e.error)))?;

        tracing::debug!(
            path = %self.path.display(),
            uuids = self.uuids.len(),
            files = self.files.len(),
            "Checkpoint flushed"
        );
        Ok(())
    }
}
