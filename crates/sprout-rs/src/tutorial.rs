//! Tutorial-mode detection and learning-step derivation.
//!
//! An image analysis that mentions educational content switches the client
//! into a guided, multi-step UI. The steps come from a second completion,
//! parsed by [`parse_learning_steps`].

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::config::TutorConfig;
use crate::prompt::{LEARNING_STEPS_SYSTEM_PROMPT, learning_steps_request};
use crate::{ChatRequest, Message, ProviderClient};

/// Substrings that mark educational content, matched case-insensitively.
/// `read` covers `reading`; `writ` covers `write` and `writing`.
pub const EDUCATIONAL_SIGNATURES: &[&str] = &[
    "math problem",
    "equation",
    "science question",
    "experiment",
    "read",
    "writ",
    "homework",
    "problem to solve",
    "steps to follow",
];

/// Upper bound on steps taken by the line-based fallback.
pub const MAX_FALLBACK_STEPS: usize = 5;

static ORDINAL_STEP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*\d+\.[ \t]+[^\n]+").expect("valid regex"));

/// The first educational signature found in `text`, if any.
pub fn matched_signature(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    EDUCATIONAL_SIGNATURES
        .iter()
        .copied()
        .find(|sig| lower.contains(sig))
}

/// Whether `text` describes content worth a step-by-step tutorial.
pub fn detect_tutorial_mode(text: &str) -> bool {
    matched_signature(text).is_some()
}

/// Split a step-generation reply into steps.
///
/// Lines starting with `<digits>.` win. Without any, the first
/// [`MAX_FALLBACK_STEPS`] non-blank lines are used, skipping markdown
/// headings. Steps are trimmed and keep the provider's order.
pub fn parse_learning_steps(reply: &str) -> Vec<String> {
    let numbered: Vec<String> = ORDINAL_STEP_RE
        .find_iter(reply)
        .map(|m| m.as_str().trim().to_string())
        .collect();
    if !numbered.is_empty() {
        return numbered;
    }

    reply
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .take(MAX_FALLBACK_STEPS)
        .map(str::to_string)
        .collect()
}

/// Ask the provider for 3-5 learning steps based on an image analysis.
pub async fn derive_learning_steps(
    client: &ProviderClient,
    config: &TutorConfig,
    analysis: &str,
) -> Result<Vec<String>, String> {
    let body = ChatRequest {
        model: config.steps_model.clone(),
        messages: vec![
            Message::system(LEARNING_STEPS_SYSTEM_PROMPT),
            Message::user(learning_steps_request(analysis)),
        ],
        max_tokens: config.max_tokens,
        ..Default::default()
    };
    let reply = client.chat(&body).await?.into_text()?;
    let steps = parse_learning_steps(&reply);
    debug!("learning steps reply: {} chars", reply.len());
    info!("derived {} learning step(s)", steps.len());
    Ok(steps)
}
