//! Request flows: each method is one round of provider calls for one
//! endpoint.
//!
//! Calls run strictly one after another. The image flow is vision analysis,
//! then learning steps if the analysis looks educational, then speech.
//! Nothing is retried; the first failure ends the flow.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info};

use crate::classify::{AnalysisResult, analysis_tool, analysis_tool_choice, classify};
use crate::config::TutorConfig;
use crate::explain::{Explanation, parse_explanation};
use crate::media::{MediaError, MediaStore, StoredMedia};
use crate::prompt::{
    IMAGE_ANALYSIS_PROMPT, IMAGE_QUESTION, LESSON_LENGTH_SYSTEM_PROMPT, LearningTurn,
    analysis_prompt, explanation_prompt, lesson_length_request, lesson_opening_message,
    lesson_plan_prompt, student_response_message,
};
use crate::tutorial::{derive_learning_steps, matched_signature};
use crate::{ChatRequest, EMPTY_COMPLETION, Message, ProviderClient, SpeechRequest};

/// Step count used when the provider's answer has no number in it.
pub const DEFAULT_LESSON_STEPS: u32 = 3;
const MIN_LESSON_STEPS: u32 = 3;
const MAX_LESSON_STEPS: u32 = 5;

/// Format requested from speech synthesis; stored files get this extension.
const SPEECH_FORMAT: &str = "mp3";

static FIRST_NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Errors from a tutor flow.
#[derive(Debug, Error)]
pub enum TutorError {
    /// The provider call failed or returned something unusable.
    #[error("{0}")]
    Upstream(String),

    #[error(transparent)]
    Storage(#[from] MediaError),
}

/// A student's answer to analyse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub student_response: String,
    pub context: String,
    pub subject: String,
    pub current_step: i64,
    pub total_steps: i64,
}

/// Result of a guidance turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub next_step: String,
    pub is_final_step: bool,
    /// Transcript including this turn.
    pub context: String,
    pub audio: StoredMedia,
}

/// Result of analysing an uploaded image.
#[derive(Debug, Clone)]
pub struct ImageAnalysis {
    pub response: String,
    pub audio: StoredMedia,
    pub should_enter_tutorial_mode: bool,
    pub learning_context: String,
    pub learning_steps: Vec<String>,
}

/// Opening of an interactive lesson.
#[derive(Debug, Clone)]
pub struct LessonStart {
    pub first_step: String,
    pub total_steps: u32,
    pub audio: StoredMedia,
}

/// Reply to a relayed conversation.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub text: String,
    pub audio: StoredMedia,
}

/// Provider client, configuration and media store for the tutoring flows.
pub struct Tutor {
    client: ProviderClient,
    config: TutorConfig,
    media: MediaStore,
}

impl Tutor {
    /// The media store takes its upload ceiling from `config`.
    pub fn new(client: ProviderClient, config: TutorConfig, media: MediaStore) -> Self {
        let media = media.with_max_upload_bytes(config.max_upload_bytes);
        Self {
            client,
            config,
            media,
        }
    }

    pub fn config(&self) -> &TutorConfig {
        &self.config
    }

    pub fn media(&self) -> &MediaStore {
        &self.media
    }

    /// Judge a student's answer: correctness, confusion, misconceptions.
    pub async fn analyze_response(
        &self,
        req: &AnalysisRequest,
    ) -> Result<AnalysisResult, TutorError> {
        let body = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                Message::system(analysis_prompt(
                    &req.subject,
                    req.current_step,
                    req.total_steps,
                    &req.context,
                )),
                Message::user(student_response_message(&req.student_response)),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tools: Some(vec![analysis_tool()]),
            tool_choice: Some(analysis_tool_choice()),
        };
        let completion = self.client.chat(&body).await.map_err(TutorError::Upstream)?;
        if completion.is_empty() {
            return Err(TutorError::Upstream(EMPTY_COMPLETION.to_string()));
        }
        let result = classify(&completion);
        info!(
            "analysis: subject={}, step {}/{}, correct={}, confusion={}, misconceptions={}",
            req.subject,
            req.current_step,
            req.total_steps,
            result.is_correct,
            result.confusion_level,
            result.misconceptions.len()
        );
        Ok(result)
    }

    /// Produce the tutor's next message for a guidance turn, with audio.
    pub async fn process_turn(&self, turn: &LearningTurn) -> Result<TurnOutcome, TutorError> {
        let is_final_step = turn.is_final_step();
        debug!(
            "turn: type={}, step {}/{}, final={is_final_step}, context={} chars",
            turn.response_type,
            turn.current_step,
            turn.total_steps,
            turn.context.len()
        );
        let body = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                Message::system(turn.system_prompt()),
                Message::user(turn.user_message()),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        };
        let next_step = self.complete(&body).await?;
        let audio = self.speak(&next_step, None).await?;

        Ok(TurnOutcome {
            context: turn.updated_context(&next_step),
            next_step,
            is_final_step,
            audio,
        })
    }

    /// Describe an image, decide on tutorial mode, and voice the description.
    pub async fn analyze_image(&self, image_url: &str) -> Result<ImageAnalysis, TutorError> {
        let body = ChatRequest {
            model: self.config.vision_model.clone(),
            messages: vec![
                Message::system(IMAGE_ANALYSIS_PROMPT),
                Message::user_with_image(IMAGE_QUESTION, image_url),
            ],
            max_tokens: self.config.max_tokens,
            ..Default::default()
        };
        let analysis = self.complete(&body).await?;

        let signature = matched_signature(&analysis);
        let should_enter_tutorial_mode = signature.is_some();
        info!(
            "image analysis: {} chars, tutorial mode={should_enter_tutorial_mode} ({})",
            analysis.len(),
            signature.unwrap_or("no signature")
        );

        let learning_steps = if should_enter_tutorial_mode {
            derive_learning_steps(&self.client, &self.config, &analysis)
                .await
                .map_err(TutorError::Upstream)?
        } else {
            Vec::new()
        };

        let audio = self.speak(&analysis, None).await?;

        Ok(ImageAnalysis {
            learning_context: analysis.clone(),
            response: analysis,
            audio,
            should_enter_tutorial_mode,
            learning_steps,
        })
    }

    /// Open an interactive lesson: first step, step count, audio.
    pub async fn start_lesson(
        &self,
        query: &str,
        subject: &str,
        grade_level: u32,
    ) -> Result<LessonStart, TutorError> {
        let plan = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                Message::system(lesson_plan_prompt(query, subject, grade_level)),
                Message::user(lesson_opening_message(query)),
            ],
            max_tokens: self.config.lesson_max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        };
        let first_step = self.complete(&plan).await?;

        let length = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                Message::system(LESSON_LENGTH_SYSTEM_PROMPT),
                Message::user(lesson_length_request(query, subject, grade_level)),
            ],
            max_tokens: 10,
            temperature: 0.3,
            ..Default::default()
        };
        let length_reply = self.complete(&length).await?;
        let total_steps = parse_step_count(&length_reply);

        let audio = self.speak(&first_step, None).await?;
        info!("lesson started: subject={subject}, total_steps={total_steps}");

        Ok(LessonStart {
            first_step,
            total_steps,
            audio,
        })
    }

    /// Kid-friendly step-by-step explanation of `query`.
    pub async fn explain(&self, query: &str, subject: &str) -> Result<Explanation, TutorError> {
        let body = ChatRequest {
            model: self.config.chat_model.clone(),
            messages: vec![
                Message::system(explanation_prompt(subject)),
                Message::user(query),
            ],
            max_tokens: self.config.explanation_max_tokens,
            temperature: self.config.temperature,
            ..Default::default()
        };
        let reply = self.complete(&body).await?;
        let explanation = parse_explanation(&reply);
        info!(
            "explanation: subject={subject}, steps={}",
            explanation.steps.len()
        );
        Ok(explanation)
    }

    /// Forward a client-supplied conversation as-is and voice the reply.
    pub async fn relay_chat(&self, messages: Vec<Message>) -> Result<ChatReply, TutorError> {
        debug!("relaying {} message(s)", messages.len());
        let body = ChatRequest {
            model: self.config.chat_model.clone(),
            messages,
            ..Default::default()
        };
        let text = self.complete(&body).await?;
        let audio = self.speak(&text, None).await?;
        Ok(ChatReply { text, audio })
    }

    /// Synthesize `text` and store the audio. `voice` overrides the
    /// configured default.
    pub async fn speak(&self, text: &str, voice: Option<&str>) -> Result<StoredMedia, TutorError> {
        let body = SpeechRequest {
            model: self.config.speech_model.clone(),
            voice: voice.unwrap_or(self.config.voice.as_str()).to_string(),
            input: text.to_string(),
            response_format: Some(SPEECH_FORMAT.to_string()),
        };
        let bytes = self
            .client
            .speech(&body)
            .await
            .map_err(TutorError::Upstream)?;
        Ok(self.media.store_synthesized_audio(&bytes).await?)
    }

    async fn complete(&self, body: &ChatRequest) -> Result<String, TutorError> {
        self.client
            .chat(body)
            .await
            .and_then(|c| c.into_text())
            .map_err(TutorError::Upstream)
    }
}

/// First integer in `reply`, clamped to 3..=5; 3 when there is none.
pub fn parse_step_count(reply: &str) -> u32 {
    FIRST_NUMBER_RE
        .find(reply)
        // All digits, so a failed parse means overflow.
        .map(|m| m.as_str().parse::<u32>().unwrap_or(u32::MAX))
        .map_or(DEFAULT_LESSON_STEPS, |n| {
            n.clamp(MIN_LESSON_STEPS, MAX_LESSON_STEPS)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_count_parsing() {
        assert_eq!(parse_step_count("4"), 4);
        assert_eq!(parse_step_count("I'd suggest 5 steps."), 5);
        assert_eq!(parse_step_count("9"), 5);
        assert_eq!(parse_step_count("1"), 3);
        assert_eq!(parse_step_count("99999999999"), 5);
        assert_eq!(parse_step_count("a few"), DEFAULT_LESSON_STEPS);
    }

    #[test]
    fn storage_rejections_stay_distinguishable() {
        let err = TutorError::from(MediaError::NotAnImage("text/plain".into()));
        assert!(matches!(err, TutorError::Storage(ref m) if m.is_rejection()));
        assert_eq!(err.to_string(), "file must be an image (got text/plain)");
    }

    #[tokio::test]
    async fn upload_ceiling_comes_from_config() {
        let client = ProviderClient::with_base_url("k", "http://127.0.0.1:9/v1").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = TutorConfig {
            max_upload_bytes: 4,
            ..Default::default()
        };
        let tutor = Tutor::new(client, config, MediaStore::new(dir.path()));
        assert_eq!(tutor.media().max_upload_bytes(), 4);

        let err = tutor
            .media()
            .store_upload(&[0; 100], "image/png", Some("a.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::TooLarge { size: 100, limit: 4 }));
    }

    #[tokio::test]
    async fn provider_failure_is_upstream_error() {
        // Nothing listens on port 9 on the loopback; the connect fails fast.
        let client = ProviderClient::with_base_url("k", "http://127.0.0.1:9/v1").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let tutor = Tutor::new(client, TutorConfig::default(), MediaStore::new(dir.path()));
        let err = tutor
            .analyze_response(&AnalysisRequest {
                student_response: "12".into(),
                context: "7 + 5".into(),
                subject: "Math".into(),
                current_step: 1,
                total_steps: 2,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::Upstream(ref m) if m.starts_with("request failed")));
    }
}
