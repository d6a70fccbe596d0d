//! Step-by-step explanations for the explanation panel.
//!
//! The provider is asked for `{"steps": [{"title", "content"}]}`, possibly
//! inside a fenced `json` block. A reply that is JSON without usable steps
//! becomes one step; a reply that is not JSON at all is split into one step
//! per paragraph.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Title of the single step used when the reply has no structure.
pub const FALLBACK_TITLE: &str = "Let's Learn!";

static JSON_FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```json\s*([\s\S]*?)\s*```").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationStep {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Explanation {
    pub steps: Vec<ExplanationStep>,
}

impl Explanation {
    fn single(content: &str) -> Self {
        Self {
            steps: vec![ExplanationStep {
                title: FALLBACK_TITLE.to_string(),
                content: content.to_string(),
            }],
        }
    }
}

/// Turn an explanation reply into steps. Never fails.
pub fn parse_explanation(reply: &str) -> Explanation {
    let body = JSON_FENCE_RE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map_or(reply, |m| m.as_str());

    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => match value
            .get("steps")
            .cloned()
            .map(serde_json::from_value::<Vec<ExplanationStep>>)
        {
            Some(Ok(steps)) if !steps.is_empty() => Explanation { steps },
            _ => {
                debug!("explanation JSON has no usable steps");
                Explanation::single(body)
            }
        },
        Err(_) => {
            debug!("explanation is not JSON, splitting paragraphs");
            paragraph_steps(body)
        }
    }
}

fn paragraph_steps(text: &str) -> Explanation {
    let paragraphs: Vec<&str> = text.split("\n\n").collect();
    if paragraphs.len() <= 1 {
        return Explanation::single(text);
    }

    let steps: Vec<ExplanationStep> = paragraphs
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.trim().is_empty())
        .map(|(i, p)| paragraph_step(i, p))
        .collect();
    if steps.is_empty() {
        Explanation::single(text)
    } else {
        Explanation { steps }
    }
}

/// `Title: content` when the first line has a colon, otherwise the first
/// sentence as the title. A single sentence keeps a numbered title.
fn paragraph_step(index: usize, paragraph: &str) -> ExplanationStep {
    let first_line = paragraph.lines().next().unwrap_or_default();
    if first_line.contains(':')
        && let Some((title, content)) = paragraph.split_once(':')
    {
        return ExplanationStep {
            title: title.trim().to_string(),
            content: content.trim().to_string(),
        };
    }

    match paragraph.split_once(". ") {
        Some((title, rest)) => ExplanationStep {
            title: title.trim().to_string(),
            content: rest.to_string(),
        },
        None => ExplanationStep {
            title: format!("Step {}", index + 1),
            content: paragraph.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(title: &str, content: &str) -> ExplanationStep {
        ExplanationStep {
            title: title.into(),
            content: content.into(),
        }
    }

    #[test]
    fn fenced_json_steps() {
        let reply = "Here you go!\n```json\n\
                     {\"steps\": [{\"title\": \"Count\", \"content\": \"1, 2, 3\"}]}\n```";
        assert_eq!(
            parse_explanation(reply).steps,
            vec![step("Count", "1, 2, 3")]
        );
    }

    #[test]
    fn bare_json_steps() {
        let reply = r#"{"steps": [
            {"title": "A", "content": "one"},
            {"title": "B", "content": "two"}
        ]}"#;
        assert_eq!(parse_explanation(reply).steps.len(), 2);
    }

    #[test]
    fn json_without_steps_becomes_one_step() {
        let reply = r#"{"answer": "twelve"}"#;
        assert_eq!(
            parse_explanation(reply).steps,
            vec![step(FALLBACK_TITLE, reply)]
        );
        let empty = r#"{"steps": []}"#;
        assert_eq!(parse_explanation(empty).steps[0].title, FALLBACK_TITLE);
    }

    #[test]
    fn paragraphs_become_steps() {
        let reply = "Adding: put the groups together.\n\n\
                     Count them all. Start from the bigger group.\n\n\
                     Great job";
        assert_eq!(
            parse_explanation(reply).steps,
            vec![
                step("Adding", "put the groups together."),
                step("Count them all", "Start from the bigger group."),
                step("Step 3", "Great job"),
            ]
        );
    }

    #[test]
    fn blank_paragraphs_keep_their_position() {
        let reply = "First idea\n\n   \n\nThird idea";
        let steps = parse_explanation(reply).steps;
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].title, "Step 3");
    }

    #[test]
    fn single_paragraph_is_one_step() {
        let reply = "Plants drink water through their roots.";
        assert_eq!(
            parse_explanation(reply).steps,
            vec![step(FALLBACK_TITLE, reply)]
        );
    }
}
