//! Log record decoding and classification
//!
//! One line of the session log decodes into a [`RawRecord`]; the
//! classifier then decides whether the record is internal noise, an
//! interactive prompt, or plain text the human should see.
//!
//! Decoding is resilient: a malformed line fails on its own, unknown
//! content-block shapes map to an explicit `Unknown` variant rather than
//! being guessed at, and a record missing the expected envelope is simply
//! non-matching.

use crate::types::{Classification, Interaction, InteractionKind, QuestionOption};
use serde::Deserialize;

/// Tool name that marks an interactive question.
pub const ASK_QUESTION_TOOL: &str = "ask-user-question";

/// Text-block prefixes reserved for internal traffic. A block starting
/// with any of these never reaches the human.
const INTERNAL_PREFIXES: &[&str] = &[
    "<thinking>",
    "<system-reminder>",
    "<local-command-caveat>",
    "<command-name>",
    "<task-notification>",
    "Caveat:",
];

// ============================================
// Raw JSONL record types (serde deserialization)
// ============================================

/// One decoded line of the session log.
///
/// Uses `#[serde(default)]` liberally so missing fields degrade to
/// non-matching rather than decode errors.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    /// Record kind tag ("assistant", "user", "summary", ...)
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Stable record identifier used for dedup
    pub uuid: Option<String>,
    pub message: Option<RawMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawMessage {
    pub role: Option<String>,
    /// Kept loose here; [`RawRecord::blocks`] narrows it to known shapes
    pub content: Option<serde_json::Value>,
}

/// A tagged content block. Anything that matches none of the known tags
/// lands in `Unknown` and is logged, never guessed at.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum RawBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool-invocation")]
    ToolInvocation {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Unknown,
}

impl RawRecord {
    /// Decode one log line.
    pub fn decode(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    /// The record's content blocks, or `None` when the record does not
    /// match the expected envelope (missing message, non-array content).
    pub fn blocks(&self) -> Option<Vec<RawBlock>> {
        let content = self.message.as_ref()?.content.as_ref()?;
        let items = content.as_array()?;

        let mut blocks = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<RawBlock>(item.clone()) {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    tracing::debug!(error = %e, "Unparseable content block, treating as unknown");
                    blocks.push(RawBlock::Unknown);
                }
            }
        }
        Some(blocks)
    }
}

// ============================================
// Classifier
// ============================================

/// Separates user-visible records from internal noise.
pub struct RecordClassifier;

impl RecordClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify one decoded record. First match wins:
    ///
    /// 1. an `ask-user-question` invocation → interactive question
    /// 2. any other tool invocation → suppress (agent is mid-work)
    /// 3. a text block with a reserved internal prefix → suppress
    /// 4. non-empty text → deliver, blocks joined by newlines
    /// 5. anything else → suppress
    pub fn classify(&self, record: &RawRecord) -> Classification {
        // Only assistant records can carry user-visible output
        if record.kind.as_deref() != Some("assistant") {
            return Classification::Suppress;
        }

        let Some(blocks) = record.blocks() else {
            // Missing envelope: non-matching, not an error
            return Classification::Suppress;
        };

        // 1. Interactive question
        for block in &blocks {
            if let RawBlock::ToolInvocation { name, input } = block {
                if name == ASK_QUESTION_TOOL {
                    return match extract_question(input) {
                        Some(interaction) => Classification::Interactive(interaction),
                        None => {
                            tracing::warn!(
                                uuid = record.uuid.as_deref().unwrap_or("-"),
                                "Malformed ask-user-question input, suppressing"
                            );
                            Classification::Suppress
                        }
                    };
                }
            }
        }

        // 2. Any other tool invocation means the agent is still working
        if blocks
            .iter()
            .any(|b| matches!(b, RawBlock::ToolInvocation { .. }))
        {
            return Classification::Suppress;
        }

        // 3. Reserved internal markers
        for block in &blocks {
            if let RawBlock::Text { text } = block {
                let trimmed = text.trim_start();
                if INTERNAL_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
                    return Classification::Suppress;
                }
            }
        }

        // 4. Plain deliverable text
        let texts: Vec<&str> = blocks
            .iter()
            .filter_map(|b| match b {
                RawBlock::Text { text } if !text.trim().is_empty() => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if !texts.is_empty() {
            return Classification::DeliverText(texts.join("\n"));
        }

        // 5. Nothing user-facing
        Classification::Suppress
    }
}

impl Default for RecordClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the first question entry out of an `ask-user-question` input.
///
/// Returns `None` when the structure is missing its options list.
fn extract_question(input: &serde_json::Value) -> Option<Interaction> {
    let question = input.get("questions")?.as_array()?.first()?;

    let body = question
        .get("question")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let header = question
        .get("header")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let multi_select = question
        .get("multiSelect")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let raw_options = question.get("options")?.as_array()?;
    let options: Vec<QuestionOption> = raw_options
        .iter()
        .filter_map(|opt| {
            // Options are either bare strings or {label, description}
            if let Some(label) = opt.as_str() {
                return Some(QuestionOption {
                    label: label.to_string(),
                    description: None,
                });
            }
            let label = opt.get("label")?.as_str()?.to_string();
            let description = opt
                .get("description")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            Some(QuestionOption { label, description })
        })
        .collect();

    if options.is_empty() {
        return None;
    }

    Some(Interaction {
        kind: InteractionKind::Question,
        header,
        body,
        options,
        multi_select,
        plan_path: None,
        plan_excerpt: None,
    })
}
