//! Turning provider output into an [`AnalysisResult`].
//!
//! [`classify`] has a fixed precedence:
//!
//! 1. A `record_analysis` function call whose arguments satisfy the
//!    [`StructuredAnalysis`] schema.
//! 2. A JSON object embedded in the text body that satisfies the same schema.
//! 3. Regex heuristics over the text body (`correct: true|false`,
//!    `confusion: N`), with `false` and `5` as defaults.
//!
//! Classification never fails. An unusable reply still yields a result with
//! the defaults and the raw text as feedback.

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ChatCompletion, ToolChoice, ToolDef, json_schema_for};

/// Name of the function the analysis request forces the model to call.
pub const ANALYSIS_FUNCTION: &str = "record_analysis";

/// Confusion level used when none can be read from the reply.
pub const DEFAULT_CONFUSION_LEVEL: u8 = 5;

/// Highest confusion level.
pub const MAX_CONFUSION_LEVEL: u8 = 10;

/// Normalized feedback on a student's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub is_correct: bool,
    /// Always within `0..=10`.
    pub confusion_level: u8,
    pub misconceptions: Vec<String>,
    pub feedback: String,
}

/// Arguments of the `record_analysis` function.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct StructuredAnalysis {
    /// Whether the student is on the right track.
    pub is_correct: bool,
    /// How confused the student seems, from 0 (not at all) to 10 (completely lost).
    pub confusion_level: i64,
    /// Specific misunderstandings, one short sentence each.
    #[serde(default)]
    pub misconceptions: Vec<String>,
    /// Educational feedback with hints, never the answer.
    pub feedback: String,
}

impl From<StructuredAnalysis> for AnalysisResult {
    fn from(s: StructuredAnalysis) -> Self {
        Self {
            is_correct: s.is_correct,
            confusion_level: clamp_confusion(s.confusion_level),
            misconceptions: s.misconceptions,
            feedback: s.feedback,
        }
    }
}

/// Tool definition for `record_analysis`.
pub fn analysis_tool() -> ToolDef {
    ToolDef::new(
        ANALYSIS_FUNCTION,
        "Record the analysis of a student's response.",
        json_schema_for::<StructuredAnalysis>(),
    )
}

/// `tool_choice` forcing the `record_analysis` call.
pub fn analysis_tool_choice() -> ToolChoice {
    ToolChoice::function(ANALYSIS_FUNCTION)
}

static ANALYSIS_VALIDATOR: LazyLock<Option<jsonschema::Validator>> =
    LazyLock::new(|| jsonschema::validator_for(&json_schema_for::<StructuredAnalysis>()).ok());

static CORRECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)correct:\s*(true|false)").expect("valid regex"));

static CONFUSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)confusion:\s*(\d+)").expect("valid regex"));

/// Classify a completion returned for an analysis request.
pub fn classify(completion: &ChatCompletion) -> AnalysisResult {
    let structured = completion
        .tool_calls
        .iter()
        .filter(|c| c.function.name == ANALYSIS_FUNCTION)
        .find_map(|c| parse_structured(&c.function.arguments));
    if let Some(s) = structured {
        debug!("analysis: structured function-call payload");
        return s.into();
    }

    let text = completion.content.as_deref().unwrap_or_default();
    if let Some(s) = embedded_json(text).and_then(parse_structured) {
        debug!("analysis: structured JSON in text body");
        return s.into();
    }

    debug!("analysis: regex fallback");
    classify_text(text)
}

/// Regex fallback over free text. The whole text becomes the feedback.
pub fn classify_text(text: &str) -> AnalysisResult {
    let is_correct = CORRECT_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .is_some_and(|m| m.as_str().eq_ignore_ascii_case("true"));

    let confusion_level = CONFUSION_RE
        .captures(text)
        .and_then(|c| c.get(1))
        // All digits, so a failed parse means overflow.
        .map(|m| m.as_str().parse::<i64>().unwrap_or(i64::MAX))
        .map_or(DEFAULT_CONFUSION_LEVEL, clamp_confusion);

    AnalysisResult {
        is_correct,
        confusion_level,
        misconceptions: Vec::new(),
        feedback: text.to_string(),
    }
}

/// Parse and validate a `record_analysis` payload.
fn parse_structured(raw: &str) -> Option<StructuredAnalysis> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if let Some(validator) = ANALYSIS_VALIDATOR.as_ref()
        && !validator.is_valid(&value)
    {
        debug!("analysis payload failed schema validation");
        return None;
    }
    serde_json::from_value(value).ok()
}

/// The span from the first `{` to the last `}`, if any.
fn embedded_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}

fn clamp_confusion(level: i64) -> u8 {
    level.clamp(0, i64::from(MAX_CONFUSION_LEVEL)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallType, FunctionCallData, ToolCall};

    fn with_call(arguments: &str) -> ChatCompletion {
        ChatCompletion {
            tool_calls: vec![ToolCall {
                id: "call-1".into(),
                call_type: CallType::Function,
                function: FunctionCallData {
                    name: ANALYSIS_FUNCTION.into(),
                    arguments: arguments.into(),
                },
            }],
            ..Default::default()
        }
    }

    #[test]
    fn structured_payload_taken_as_is() {
        let r = classify(&with_call(
            r#"{"is_correct": true, "confusion_level": 3, "feedback": "ok"}"#,
        ));
        assert_eq!(
            r,
            AnalysisResult {
                is_correct: true,
                confusion_level: 3,
                misconceptions: vec![],
                feedback: "ok".into(),
            }
        );
    }

    #[test]
    fn structured_payload_keeps_misconceptions_in_order() {
        let r = classify(&with_call(
            r#"{"is_correct": false, "confusion_level": 8,
                "misconceptions": ["adds tens as ones", "forgets carry"],
                "feedback": "Look at the tens column."}"#,
        ));
        assert!(!r.is_correct);
        assert_eq!(r.misconceptions, vec!["adds tens as ones", "forgets carry"]);
    }

    #[test]
    fn structured_confusion_is_clamped() {
        let high = classify(&with_call(
            r#"{"is_correct": false, "confusion_level": 42, "feedback": "x"}"#,
        ));
        assert_eq!(high.confusion_level, 10);
        let low = classify(&with_call(
            r#"{"is_correct": false, "confusion_level": -3, "feedback": "x"}"#,
        ));
        assert_eq!(low.confusion_level, 0);
    }

    #[test]
    fn structured_payload_missing_required_field_falls_back() {
        let mut completion = with_call(r#"{"is_correct": true, "confusion_level": 2}"#);
        completion.content = Some("correct: false\nconfusion: 9".into());
        let r = classify(&completion);
        assert!(!r.is_correct);
        assert_eq!(r.confusion_level, 9);
        assert_eq!(r.feedback, "correct: false\nconfusion: 9");
    }

    #[test]
    fn structured_payload_wrong_type_falls_back() {
        let r = classify(&with_call(
            r#"{"is_correct": "yes", "confusion_level": 2, "feedback": "x"}"#,
        ));
        assert!(!r.is_correct);
        assert_eq!(r.confusion_level, DEFAULT_CONFUSION_LEVEL);
    }

    #[test]
    fn other_function_calls_are_ignored() {
        let mut completion =
            with_call(r#"{"is_correct": true, "confusion_level": 1, "feedback": "x"}"#);
        completion.tool_calls[0].function.name = "something_else".into();
        let r = classify(&completion);
        assert!(!r.is_correct);
        assert_eq!(r.confusion_level, DEFAULT_CONFUSION_LEVEL);
    }

    #[test]
    fn json_in_text_body_is_structured() {
        let text = "Here is my analysis:\n```json\n{\"is_correct\": true, \"confusion_level\": 1, \
                    \"misconceptions\": [], \"feedback\": \"Nice work\"}\n```";
        let r = classify(&ChatCompletion::from_text(text));
        assert!(r.is_correct);
        assert_eq!(r.confusion_level, 1);
        assert_eq!(r.feedback, "Nice work");
    }

    #[test]
    fn fallback_reads_markers() {
        let text = "correct: true\nconfusion: 7\nkeep going";
        let r = classify(&ChatCompletion::from_text(text));
        assert_eq!(
            r,
            AnalysisResult {
                is_correct: true,
                confusion_level: 7,
                misconceptions: vec![],
                feedback: text.into(),
            }
        );
    }

    #[test]
    fn fallback_is_case_insensitive() {
        let r = classify_text("Correct: TRUE, Confusion:2");
        assert!(r.is_correct);
        assert_eq!(r.confusion_level, 2);
    }

    #[test]
    fn fallback_defaults_without_markers() {
        let text = "You're getting there, try counting on your fingers.";
        let r = classify(&ChatCompletion::from_text(text));
        assert_eq!(
            r,
            AnalysisResult {
                is_correct: false,
                confusion_level: 5,
                misconceptions: vec![],
                feedback: text.into(),
            }
        );
    }

    #[test]
    fn fallback_clamps_including_overflow() {
        assert_eq!(classify_text("confusion: 99").confusion_level, 10);
        assert_eq!(
            classify_text("confusion: 99999999999999999999999").confusion_level,
            MAX_CONFUSION_LEVEL
        );
    }

    #[test]
    fn malformed_json_in_body_uses_regex() {
        let text = "{ not json } correct: true";
        let r = classify_text(text);
        assert!(r.is_correct);
        let r = classify(&ChatCompletion::from_text(text));
        assert!(r.is_correct);
        assert_eq!(r.feedback, text);
    }

    #[test]
    fn analysis_tool_schema_requires_core_fields() {
        let tool = analysis_tool();
        assert_eq!(tool.function.name, ANALYSIS_FUNCTION);
        let required = tool.function.parameters["required"].as_array().unwrap();
        for field in ["is_correct", "confusion_level", "feedback"] {
            assert!(required.contains(&field.into()), "missing {field}");
        }
        assert!(!required.contains(&"misconceptions".into()));
    }
}
