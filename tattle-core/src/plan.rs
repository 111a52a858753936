//! Plan-confirmation detection from terminal output
//!
//! The agent's "plan ready" state never appears in the session log as a
//! single record; it shows up on the terminal as a fixed marker phrase
//! followed by a numbered option list. This detector pattern-matches
//! recent terminal text, synthesizes the same [`Interaction`] shape the
//! classifier produces for questions, and gates re-emission with a
//! content-hash cool-down since terminal state has no record identifier.

use crate::types::{Interaction, InteractionKind, QuestionOption};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

/// Marker phrase the agent prints when a plan awaits confirmation.
pub const PLAN_MARKER: &str = "Would you like to proceed?";

/// Detects the plan-ready terminal state.
pub struct PlanDetector {
    /// Character cap applied to an inlined plan document
    excerpt_cap: usize,
    /// Cool-down window before the same plan text may re-emit
    cooldown_ms: i64,
    /// Content hash → last emission (epoch ms)
    recent: HashMap<String, i64>,
}

impl PlanDetector {
    pub fn new(excerpt_cap: usize, cooldown_secs: u64) -> Self {
        Self {
            excerpt_cap,
            cooldown_ms: (cooldown_secs as i64).saturating_mul(1000),
            recent: HashMap::new(),
        }
    }

    /// Scan recent terminal text for the plan-confirmation state.
    ///
    /// Returns `None` when no marker is present, the option list is
    /// incomplete, or the same content emitted within the cool-down.
    pub fn detect(&mut self, screen: &str) -> Option<Interaction> {
        self.detect_at(screen, Utc::now().timestamp_millis())
    }

    fn detect_at(&mut self, screen: &str, now_ms: i64) -> Option<Interaction> {
        let marker_pos = screen.rfind(PLAN_MARKER)?;
        let region = &screen[marker_pos..];

        let options = numbered_options(region);
        if options.len() < 2 {
            return None;
        }

        // Identity of this confirmation is the marker region itself
        let mut hasher = Sha256::new();
        hasher.update(PLAN_MARKER.as_bytes());
        for opt in &options {
            hasher.update(opt.label.as_bytes());
        }
        let hash = format!("{:x}", hasher.finalize());

        self.recent
            .retain(|_, &mut ts| now_ms.saturating_sub(ts) < self.cooldown_ms);
        if self.recent.contains_key(&hash) {
            return None;
        }
        self.recent.insert(hash, now_ms);

        let plan_path = extract_plan_path(screen);
        let plan_excerpt = plan_path.as_ref().and_then(|p| self.load_excerpt(p));

        Some(Interaction {
            kind: InteractionKind::PlanConfirmation,
            header: "Plan ready".to_string(),
            body: PLAN_MARKER.to_string(),
            options,
            multi_select: false,
            plan_path,
            plan_excerpt,
        })
    }

    /// Load the referenced plan document, truncated to the configured cap.
    fn load_excerpt(&self, path: &PathBuf) -> Option<String> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Plan document unreadable");
                return None;
            }
        };
        Some(truncate_chars(&content, self.excerpt_cap))
    }

    /// Number of hashes currently inside the cool-down window.
    pub fn pending_count(&self) -> usize {
        self.recent.len()
    }
}

/// Collect `1. ...` style option lines in order.
fn numbered_options(region: &str) -> Vec<QuestionOption> {
    let mut options = Vec::new();
    let mut expected = 1usize;
    for line in region.lines() {
        let trimmed = line.trim();
        let prefix = format!("{}.", expected);
        if let Some(rest) = trimmed.strip_prefix(&prefix) {
            let label = rest.trim();
            if !label.is_empty() {
                options.push(QuestionOption {
                    label: label.to_string(),
                    description: None,
                });
                expected += 1;
            }
        }
    }
    options
}

/// Find a referenced plan document: the last whitespace-delimited path
/// token ending in `.md`.
fn extract_plan_path(screen: &str) -> Option<PathBuf> {
    screen
        .split_whitespace()
        .filter(|tok| tok.ends_with(".md") && tok.contains('/'))
        .next_back()
        .map(PathBuf::from)
}

/// Truncate on a character boundary at or below `cap` bytes.
fn truncate_chars(s: &str, cap: usize) -> String {
    if s.len() <= cap {
        return s.to_string();
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SCREEN: &str = "\
Here is the plan I came up with.
Plan saved to /tmp/plans/refactor.md

Would you like to proceed?
1. Yes, and auto-accept edits
2. Yes, and manually approve edits
3. No, keep planning
";

    #[test]
    fn test_detects_plan_confirmation() {
        let mut detector = PlanDetector::new(1500, 300);
        let interaction = detector.detect(SCREEN).expect("should detect");

        assert_eq!(interaction.kind, InteractionKind::PlanConfirmation);
        assert_eq!(interaction.options.len(), 3);
        assert_eq!(interaction.options[0].label, "Yes, and auto-accept edits");
        assert_eq!(
            interaction.plan_path,
            Some(PathBuf::from("/tmp/plans/refactor.md"))
        );
    }

    #[test]
    fn test_cooldown_suppresses_repeat() {
        let mut detector = PlanDetector::new(1500, 300);
        assert!(detector.detect(SCREEN).is_some());
        assert!(detector.detect(SCREEN).is_none());
    }

    #[test]
    fn test_reemits_after_cooldown() {
        let mut detector = PlanDetector::new(1500, 300);
        let now = Utc::now().timestamp_millis();
        assert!(detector.detect_at(SCREEN, now).is_some());
        assert!(detector.detect_at(SCREEN, now + 1000).is_none());
        assert!(detector.detect_at(SCREEN, now + 301_000).is_some());
    }

    #[test]
    fn test_different_plans_are_independent() {
        let mut detector = PlanDetector::new(1500, 300);
        assert!(detector.detect(SCREEN).is_some());

        let other = SCREEN.replace("keep planning", "abandon");
        assert!(detector.detect(&other).is_some());
    }

    #[test]
    fn test_no_marker_no_detection() {
        let mut detector = PlanDetector::new(1500, 300);
        assert!(detector.detect("just some scrollback\n1. option\n2. other").is_none());
    }

    #[test]
    fn test_requires_at_least_two_options() {
        let mut detector = PlanDetector::new(1500, 300);
        let screen = "Would you like to proceed?\n1. Yes\n";
        assert!(detector.detect(screen).is_none());
    }

    #[test]
    fn test_plan_excerpt_loaded_and_truncated() {
        let dir = TempDir::new().unwrap();
        let plan_path = dir.path().join("big-plan.md");
        std::fs::write(&plan_path, "x".repeat(500)).unwrap();

        let screen = format!(
            "Plan saved to {}\n\nWould you like to proceed?\n1. Yes\n2. No\n",
            plan_path.display()
        );

        let mut detector = PlanDetector::new(100, 300);
        let interaction = detector.detect(&screen).expect("should detect");
        let excerpt = interaction.plan_excerpt.expect("excerpt loaded");
        // 100 chars plus the ellipsis
        assert_eq!(excerpt.chars().count(), 101);
        assert!(excerpt.ends_with('…'));
    }

    #[test]
    fn test_missing_plan_document_is_not_fatal() {
        let screen =
            "Plan saved to /nonexistent/plan.md\n\nWould you like to proceed?\n1. Yes\n2. No\n";
        let mut detector = PlanDetector::new(100, 300);
        let interaction = detector.detect(screen).expect("should detect");
        assert!(interaction.plan_excerpt.is_none());
        assert_eq!(
            interaction.plan_path,
            Some(PathBuf::from("/nonexistent/plan.md"))
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate_chars(s, 3);
        assert!(t.ends_with('…'));
        assert!(t.len() <= 3 + '…'.len_utf8());
    }
}
