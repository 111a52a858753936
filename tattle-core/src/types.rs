//! Core domain types for tattle
//!
//! These types model the path a log record travels: discovered session →
//! watched file → decoded record → classification → outbound chunks.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Session** | One logical run of the monitored agent; one primary log plus zero or more sub-logs |
//! | **Checkpoint** | Persisted read position for a file, or a delivered identifier |
//! | **Record** | One decoded line of a session log |
//! | **Interaction** | A record or terminal observation that needs a human decision |
//! | **Chunk** | A length-bounded fragment of one outbound message |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================
// Sessions
// ============================================

/// Where a session candidate was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOrigin {
    /// A per-session sub-directory under the project log root
    Directory,
    /// A `{uuid}.jsonl` file directly under the project log root
    LogFile,
}

impl SessionOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOrigin::Directory => "directory",
            SessionOrigin::LogFile => "log_file",
        }
    }
}

/// A session candidate found while scanning the project log root.
#[derive(Debug, Clone)]
pub struct SessionRef {
    /// Opaque session identifier (the file stem or directory name)
    pub id: String,
    /// Where this candidate was discovered
    pub origin: SessionOrigin,
    /// Last-modified time used to rank candidates
    pub modified_at: DateTime<Utc>,
}

// ============================================
// Checkpoints
// ============================================

/// Composite key for a file checkpoint.
///
/// Offsets are scoped to (session, path): a session switch purges every
/// entry carrying the outgoing session id. Kept as a struct rather than a
/// `"session:path"` string so paths containing the delimiter cannot
/// corrupt lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileKey {
    pub session_id: String,
    pub path: PathBuf,
}

impl FileKey {
    pub fn new(session_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            path: path.into(),
        }
    }
}

/// Persisted read state for one (session, file) pair.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileCheckpoint {
    /// Byte offset of the next unread byte
    pub position: u64,
    /// File size observed when the offset was last advanced
    #[serde(rename = "lastSize")]
    pub last_size: u64,
    /// Modification time observed then (epoch milliseconds)
    pub mtime: i64,
}

/// A file currently tracked as part of the active session's file set.
#[derive(Debug, Clone)]
pub struct WatchedFile {
    /// Path to the log file
    pub path: PathBuf,
    /// Next byte to read
    pub offset: u64,
    /// Size observed on the previous cycle
    pub last_size: u64,
}

// ============================================
// Interactions
// ============================================

/// Sub-type of an interaction requiring a human decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// The agent asked an explicit question with options
    Question,
    /// The agent produced a plan and is waiting for confirmation
    PlanConfirmation,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionKind::Question => "question",
            InteractionKind::PlanConfirmation => "plan_confirmation",
        }
    }
}

/// One selectable option presented to the human.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub label: String,
    /// Optional longer description attached to the option
    #[serde(default)]
    pub description: Option<String>,
}

/// A record or terminal observation that needs a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    /// Question vs. plan confirmation
    pub kind: InteractionKind,
    /// Short header shown above the body (may be empty)
    pub header: String,
    /// The question or prompt text
    pub body: String,
    /// Ordered options the human can pick from
    pub options: Vec<QuestionOption>,
    /// Whether multiple options may be selected
    pub multi_select: bool,
    /// Referenced plan document, when one was detected
    pub plan_path: Option<PathBuf>,
    /// Truncated plan contents, when loaded
    pub plan_excerpt: Option<String>,
}

// ============================================
// Classification
// ============================================

/// Outcome of classifying one decoded log record.
#[derive(Debug, Clone)]
pub enum Classification {
    /// Internal noise: tool invocations, thinking, empty content
    Suppress,
    /// An interactive prompt the human must answer
    Interactive(Interaction),
    /// Plain assistant text to forward
    DeliverText(String),
}

impl Classification {
    /// True when the record produces no outbound message.
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Classification::Suppress)
    }
}

// ============================================
// Delivery
// ============================================

/// A length-bounded fragment of one outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryChunk {
    /// Text to send, including any `[i/total]` prefix
    pub text: String,
    /// 1-based position within the split message
    pub index: usize,
    /// Total chunks in the split message
    pub total: usize,
}

// ============================================
// Cycle accounting
// ============================================

/// Summary of one monitor cycle.
#[derive(Debug, Default, Clone)]
pub struct CycleReport {
    /// Session the cycle processed, if one resolved
    pub session_id: Option<String>,
    /// Files inspected this cycle
    pub files_scanned: usize,
    /// Complete lines read across all files
    pub lines_read: usize,
    /// Records forwarded to the messenger
    pub delivered: usize,
    /// Records classified as internal noise
    pub suppressed: usize,
    /// Records dropped as already seen
    pub deduped: usize,
    /// Cycle skipped while waiting for a new session
    pub waiting: bool,
    /// Non-fatal problems encountered
    pub warnings: Vec<String>,
}

impl CycleReport {
    /// True when the cycle observed no new content at all.
    pub fn is_quiet(&self) -> bool {
        self.lines_read == 0 && self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_key_distinguishes_sessions() {
        let a = FileKey::new("session-a", "/tmp/log.jsonl");
        let b = FileKey::new("session-b", "/tmp/log.jsonl");
        assert_ne!(a, b);
    }

    #[test]
    fn test_file_key_path_with_delimiter() {
        // Paths containing ':' must not collide with other keys
        let a = FileKey::new("s", "/tmp/a:b.jsonl");
        let b = FileKey::new("s:a", "/tmp/b.jsonl");
        assert_ne!(a, b);
    }

    #[test]
    fn test_interaction_kind_as_str() {
        assert_eq!(InteractionKind::Question.as_str(), "question");
        assert_eq!(
            InteractionKind::PlanConfirmation.as_str(),
            "plan_confirmation"
        );
    }

    #[test]
    fn test_cycle_report_quiet() {
        let report = CycleReport::default();
        assert!(report.is_quiet());
    }
}
