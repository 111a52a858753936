//! Session discovery and switchover
//!
//! Sessions live under the agent's log root in a per-project directory
//! whose name is the project path with `/` replaced by `-`. Candidates are
//! both per-session sub-directories and `{sessionId}.jsonl` files; the
//! newest modification time wins.
//!
//! The resolver caches the winning id between scans. A forced rescan
//! catches rotations that happen without any external signal. `reset()`
//! records the outgoing id and enters a waiting mode: the orchestrator
//! skips processing while the rescan keeps returning the outgoing id, and
//! resumes once a genuinely different id appears.

use crate::types::{SessionOrigin, SessionRef};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Encode a project path the way the agent names its log directories:
/// `/` becomes `-`, with a leading `-` enforced.
pub fn encode_project_path(path: &Path) -> String {
    let encoded = path.display().to_string().replace('/', "-");
    if encoded.starts_with('-') {
        encoded
    } else {
        format!("-{}", encoded)
    }
}

/// Loose check for the `8-4-4-4-12` hex session-id naming pattern.
fn looks_like_session_id(name: &str) -> bool {
    let bytes = name.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

/// Outcome of one resolution pass.
#[derive(Debug, Default)]
pub struct Resolution {
    /// The current session id, when one exists
    pub session_id: Option<String>,
    /// Set when the id changed from the previously cached one; the caller
    /// must drop the old session's watched files and checkpoints
    pub switched_from: Option<String>,
    /// True while the resolved id still equals the reset-recorded outgoing
    /// id; the caller skips processing for this cycle
    pub waiting: bool,
}

/// Discovers the current logical session for one project.
pub struct SessionResolver {
    project_dir: PathBuf,
    cached: Option<String>,
    last_processed: Option<String>,
    waiting: bool,
}

impl SessionResolver {
    pub fn new(log_root: &Path, project_path: &Path) -> Self {
        let project_dir = log_root.join(encode_project_path(project_path));
        Self {
            project_dir,
            cached: None,
            last_processed: None,
            waiting: false,
        }
    }

    /// The per-project directory holding session logs.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Point the resolver at a different project. Clears the cached id so
    /// the next cycle rescans.
    pub fn set_project(&mut self, log_root: &Path, project_path: &Path) {
        let project_dir = log_root.join(encode_project_path(project_path));
        if project_dir != self.project_dir {
            tracing::info!(dir = %project_dir.display(), "Project changed, rescanning sessions");
            self.project_dir = project_dir;
            self.cached = None;
        }
    }

    /// Resolve the current session.
    ///
    /// With `force_refresh` false a cached id is returned as-is; with true
    /// the directory is rescanned even when a cached id exists, which is
    /// how silent rotations are eventually noticed.
    pub fn resolve(&mut self, force_refresh: bool) -> Resolution {
        if !force_refresh && !self.waiting {
            if let Some(id) = &self.cached {
                return Resolution {
                    session_id: Some(id.clone()),
                    switched_from: None,
                    waiting: false,
                };
            }
        }

        let Some(best) = self.scan() else {
            // A transiently unreadable directory keeps the known session
            return Resolution {
                session_id: self.cached.clone(),
                switched_from: None,
                waiting: self.waiting,
            };
        };

        if self.waiting {
            if self.last_processed.as_deref() == Some(best.id.as_str()) {
                // Still the session we already finished with
                return Resolution {
                    session_id: Some(best.id),
                    switched_from: None,
                    waiting: true,
                };
            }
            // A genuinely new session ends the waiting mode
            let outgoing = self.last_processed.take();
            self.waiting = false;
            self.cached = Some(best.id.clone());
            tracing::info!(session = %best.id, "New session observed, resuming");
            return Resolution {
                session_id: Some(best.id),
                switched_from: outgoing,
                waiting: false,
            };
        }

        let switched_from = match &self.cached {
            Some(prev) if prev != &best.id => Some(prev.clone()),
            _ => None,
        };
        if let Some(prev) = &switched_from {
            tracing::info!(from = %prev, to = %best.id, "Session rotated");
        }
        self.cached = Some(best.id.clone());

        Resolution {
            session_id: Some(best.id),
            switched_from,
            waiting: false,
        }
    }

    /// Record the current id as processed and wait for a different one.
    pub fn reset(&mut self) {
        self.last_processed = self.cached.take();
        self.waiting = true;
        tracing::info!(
            outgoing = self.last_processed.as_deref().unwrap_or("-"),
            "Resolver reset, waiting for a new session"
        );
    }

    /// Whether the resolver is waiting for a genuinely new session.
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// The cached current session id, if any.
    pub fn current_id(&self) -> Option<&str> {
        self.cached.as_deref()
    }

    /// Scan the project directory for session candidates and pick the most
    /// recently modified; ties keep the earliest-discovered candidate.
    fn scan(&self) -> Option<SessionRef> {
        let entries = match std::fs::read_dir(&self.project_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::debug!(dir = %self.project_dir.display(), error = %e, "Session scan failed");
                return None;
            }
        };

        // Unified by id, keeping the max mtime across duplicate origins
        let mut candidates: Vec<SessionRef> = Vec::new();

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let modified_at: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::from)
                .unwrap_or_else(|_| Utc::now());

            let candidate = if metadata.is_dir() && looks_like_session_id(name) {
                SessionRef {
                    id: name.to_string(),
                    origin: SessionOrigin::Directory,
                    modified_at,
                }
            } else if metadata.is_file() {
                let Some(stem) = name.strip_suffix(".jsonl") else {
                    continue;
                };
                if !looks_like_session_id(stem) {
                    continue;
                }
                SessionRef {
                    id: stem.to_string(),
                    origin: SessionOrigin::LogFile,
                    modified_at,
                }
            } else {
                continue;
            };

            match candidates.iter_mut().find(|c| c.id == candidate.id) {
                Some(existing) => {
                    if candidate.modified_at > existing.modified_at {
                        existing.modified_at = candidate.modified_at;
                    }
                }
                None => candidates.push(candidate),
            }
        }

        let mut best: Option<SessionRef> = None;
        for candidate in candidates {
            let better = match &best {
                Some(current) => candidate.modified_at > current.modified_at,
                None => true,
            };
            if better {
                best = Some(candidate);
            }
        }
        best
    }
}
