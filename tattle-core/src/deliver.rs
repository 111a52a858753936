//! Outbound message chunking and delivery
//!
//! Deliverable text is split into channel-size-bounded chunks along
//! paragraph, then line, then character boundaries. Chunks are contiguous
//! substrings of the original, so concatenating the payloads reproduces
//! the message exactly. Multi-chunk messages carry a `[i/total]` prefix
//! and are dispatched strictly in order with a fixed pacing delay.
//!
//! Delivery is at-most-once: a failed dispatch is logged and never
//! retried, and the caller's dedup marking stands either way.

use crate::types::{DeliveryChunk, Interaction};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Room reserved for the `[i/total] ` prefix when a message splits.
const PREFIX_RESERVE: usize = 12;

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub success: bool,
    pub error: Option<String>,
}

impl Delivery {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The external notification channel.
///
/// Implementations send one bounded chunk of text; the pipeline owns
/// splitting and pacing. `send_question` has a plain-text fallback for
/// channels without native question support.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_text(&self, text: &str) -> Delivery;

    async fn send_question(&self, question: &Interaction) -> Delivery {
        self.send_text(&render_interaction(question)).await
    }
}

/// Render an interaction as plain text for channels without native
/// question support.
pub fn render_interaction(q: &Interaction) -> String {
    let mut out = String::new();
    if !q.header.is_empty() {
        out.push_str(&q.header);
        out.push('\n');
    }
    out.push_str(&q.body);
    out.push('\n');
    for (i, opt) in q.options.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!("{}. {}", i + 1, opt.label));
        if let Some(desc) = &opt.description {
            out.push_str(&format!(" ({})", desc));
        }
    }
    if q.multi_select {
        out.push_str("\n\nMultiple options may be selected.");
    }
    if let Some(path) = &q.plan_path {
        out.push_str(&format!("\n\nPlan: {}", path.display()));
    }
    if let Some(excerpt) = &q.plan_excerpt {
        out.push_str("\n\n");
        out.push_str(excerpt);
    }
    out
}

/// Largest byte index `<= max` that is a char boundary.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    let mut i = max;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split `text` into contiguous pieces of at most `max_len` bytes,
/// preferring paragraph breaks, then line breaks, then a hard character
/// cut. Concatenating the pieces reproduces `text` exactly.
fn split_pieces(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut pieces = Vec::new();
    let mut rest = text;

    while rest.len() > max_len {
        // Always make progress: the window holds at least one char even
        // when the budget is smaller than the char itself
        let window_end = match floor_char_boundary(rest, max_len) {
            0 => rest.chars().next().map(char::len_utf8).unwrap_or(rest.len()),
            end => end,
        };
        let window = &rest[..window_end];

        // Break after the last blank line in the window, else after the
        // last line break, else hard-cut at the window edge.
        let cut = window
            .rfind("\n\n")
            .map(|i| i + 2)
            .or_else(|| window.rfind('\n').map(|i| i + 1))
            .unwrap_or(window_end);

        pieces.push(rest[..cut].to_string());
        rest = &rest[cut..];
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Split a message into dispatchable chunks.
///
/// A message within the limit goes out untouched as a single chunk;
/// anything larger is split with room reserved for the `[i/total]` prefix.
pub fn split_message(text: &str, max_len: usize) -> Vec<DeliveryChunk> {
    if text.len() <= max_len {
        return vec![DeliveryChunk {
            text: text.to_string(),
            index: 1,
            total: 1,
        }];
    }

    let budget = max_len.saturating_sub(PREFIX_RESERVE).max(1);
    let pieces = split_pieces(text, budget);
    let total = pieces.len();

    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| DeliveryChunk {
            text: format!("[{}/{}] {}", i + 1, total, piece),
            index: i + 1,
            total,
        })
        .collect()
}

/// Splits, paces, and dispatches outbound messages.
pub struct DeliveryPipeline {
    messenger: Arc<dyn Messenger>,
    max_chunk_len: usize,
    chunk_delay: Duration,
}

impl DeliveryPipeline {
    pub fn new(messenger: Arc<dyn Messenger>, max_chunk_len: usize, chunk_delay_ms: u64) -> Self {
        Self {
            messenger,
            max_chunk_len,
            chunk_delay: Duration::from_millis(chunk_delay_ms),
        }
    }

    /// Deliver one message, splitting as needed.
    ///
    /// Returns the first failure when any chunk fails; remaining chunks
    /// are still attempted so the readable tail of a long message is not
    /// lost to one transient error.
    pub async fn deliver(&self, text: &str) -> Delivery {
        let chunks = split_message(text, self.max_chunk_len);
        let total = chunks.len();
        let mut first_error: Option<String> = None;

        for chunk in chunks {
            let outcome = self.messenger.send_text(&chunk.text).await;
            if !outcome.success {
                let error = outcome
                    .error
                    .unwrap_or_else(|| "unknown send failure".to_string());
                tracing::warn!(
                    chunk = chunk.index,
                    total,
                    error = %error,
                    "Chunk dispatch failed"
                );
                first_error.get_or_insert(error);
            }
            if chunk.index < total {
                tokio::time::sleep(self.chunk_delay).await;
            }
        }

        match first_error {
            None => Delivery::ok(),
            Some(error) => Delivery::failed(error),
        }
    }

    /// Deliver an interaction through the messenger's native question
    /// support, falling back to rendered text.
    pub async fn deliver_interaction(&self, question: &Interaction) -> Delivery {
        self.messenger.send_question(question).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InteractionKind, QuestionOption};
    use std::sync::Mutex;

    /// Captures every send; fails on texts containing a poison marker.
    struct RecordingMessenger {
        sent: Mutex<Vec<String>>,
        poison: Option<String>,
    }

    impl RecordingMessenger {
        fn new() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                poison: None,
            }
        }

        fn poisoned(marker: &str) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                poison: Some(marker.to_string()),
            }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn send_text(&self, text: &str) -> Delivery {
            self.sent.lock().unwrap().push(text.to_string());
            match &self.poison {
                Some(marker) if text.contains(marker.as_str()) => Delivery::failed("poisoned"),
                _ => Delivery::ok(),
            }
        }
    }

    fn strip_prefix(chunk: &str) -> &str {
        match chunk.strip_prefix('[') {
            Some(rest) => {
                let end = rest.find("] ").expect("prefix present");
                &rest[end + 2..]
            }
            None => chunk,
        }
    }

    #[test]
    fn test_short_message_is_one_chunk() {
        let chunks = split_message("hello", 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello");
        assert_eq!((chunks[0].index, chunks[0].total), (1, 1));
    }

    #[test]
    fn test_split_reassembles_exactly() {
        let paragraphs: Vec<String> = (0..30)
            .map(|i| format!("paragraph {} with a little bit of filler text", i))
            .collect();
        let original = paragraphs.join("\n\n");
        let max = 120;

        let chunks = split_message(&original, max);
        assert!(chunks.len() > 1);

        let mut rebuilt = String::new();
        for chunk in &chunks {
            assert!(chunk.text.len() <= max, "chunk too long: {}", chunk.text.len());
            assert!(chunk.text.starts_with(&format!("[{}/{}] ", chunk.index, chunk.total)));
            rebuilt.push_str(strip_prefix(&chunk.text));
        }
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_split_prefers_paragraph_boundaries() {
        let original = format!("{}\n\n{}", "a".repeat(50), "b".repeat(50));
        let chunks = split_message(&original, 80);
        assert_eq!(chunks.len(), 2);
        // First chunk carries the whole first paragraph plus the break
        assert!(strip_prefix(&chunks[0].text).ends_with("\n\n"));
        assert_eq!(strip_prefix(&chunks[1].text), "b".repeat(50));
    }

    #[test]
    fn test_oversize_paragraph_splits_by_line() {
        let original = format!("{}\n{}\n{}", "a".repeat(40), "b".repeat(40), "c".repeat(40));
        let chunks = split_message(&original, 70);
        assert!(chunks.len() >= 2);
        let rebuilt: String = chunks.iter().map(|c| strip_prefix(&c.text)).collect();
        assert_eq!(rebuilt, original);
    }

    #[test]
    fn test_oversize_line_hard_splits() {
        let original = "x".repeat(500);
        let max = 100;
        let chunks = split_message(&original, max);
        assert!(chunks.len() > 1);
        let rebuilt: String = chunks.iter().map(|c| strip_prefix(&c.text)).collect();
        assert_eq!(rebuilt, original);
        assert!(chunks.iter().all(|c| c.text.len() <= max));
    }

    #[test]
    fn test_hard_split_respects_utf8() {
        let original = "é".repeat(300);
        let chunks = split_message(&original, 100);
        let rebuilt: String = chunks.iter().map(|c| strip_prefix(&c.text)).collect();
        assert_eq!(rebuilt, original);
    }

    #[tokio::test]
    async fn test_deliver_dispatches_in_order() {
        let messenger = Arc::new(RecordingMessenger::new());
        let pipeline = DeliveryPipeline::new(messenger.clone(), 60, 0);

        let text = format!("{}\n\n{}\n\n{}", "a".repeat(30), "b".repeat(30), "c".repeat(30));
        let outcome = pipeline.deliver(&text).await;
        assert!(outcome.success);

        let sent = messenger.sent();
        assert!(sent.len() > 1);
        for (i, msg) in sent.iter().enumerate() {
            assert!(msg.starts_with(&format!("[{}/{}] ", i + 1, sent.len())));
        }
    }

    #[tokio::test]
    async fn test_failure_is_reported_but_tail_still_sent() {
        let messenger = Arc::new(RecordingMessenger::poisoned("[1/"));
        let pipeline = DeliveryPipeline::new(messenger.clone(), 60, 0);

        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let outcome = pipeline.deliver(&text).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("poisoned"));
        // The second chunk still went out
        assert_eq!(messenger.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_question_fallback_renders_options() {
        let messenger = Arc::new(RecordingMessenger::new());
        let pipeline = DeliveryPipeline::new(messenger.clone(), 1900, 0);

        let question = Interaction {
            kind: InteractionKind::Question,
            header: "Decision".to_string(),
            body: "Proceed?".to_string(),
            options: vec![
                QuestionOption {
                    label: "Yes".to_string(),
                    description: Some("go ahead".to_string()),
                },
                QuestionOption {
                    label: "No".to_string(),
                    description: None,
                },
            ],
            multi_select: false,
            plan_path: None,
            plan_excerpt: None,
        };

        let outcome = pipeline.deliver_interaction(&question).await;
        assert!(outcome.success);

        let sent = messenger.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("Decision"));
        assert!(sent[0].contains("Proceed?"));
        assert!(sent[0].contains("1. Yes (go ahead)"));
        assert!(sent[0].contains("2. No"));
    }
}
