//! REST endpoint handlers.
//!
//! Each handler validates its input, runs one [`Tutor`] flow and shapes the
//! result as JSON. Media URLs are made absolute using the request's `Host`
//! (and `X-Forwarded-Proto`, when a proxy sets it).

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Multipart, State};
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use sprout_rs::classify::AnalysisResult;
use sprout_rs::explain::Explanation;
use sprout_rs::prompt::{LearningTurn, ResponseType};
use sprout_rs::tutor::{AnalysisRequest, Tutor};
use sprout_rs::{Message, MessageRole};
use tracing::{debug, info};

use crate::error::ApiError;

/// Shared application state passed to all handlers via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub tutor: Arc<Tutor>,
    /// Hide provider and storage error detail from clients.
    pub redact_errors: bool,
}

impl AppState {
    fn fail(&self, err: ApiError) -> ApiError {
        if self.redact_errors { err.redact() } else { err }
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `scheme://host` of the incoming request.
pub fn request_base(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{scheme}://{host}")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

// ── Health ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
}

/// GET /api/health
pub async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "ok",
    })
}

// ── Response analysis ──────────────────────────────────────────────

/// Request body for POST /api/learning/analyze.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponseRequest {
    pub student_response: Option<String>,
    pub context: Option<String>,
    pub subject: Option<String>,
    pub current_step: Option<i64>,
    pub total_steps: Option<i64>,
}

#[derive(Serialize, Debug)]
pub struct AnalyzeResponseBody {
    pub success: bool,
    #[serde(flatten)]
    pub analysis: AnalysisResult,
}

/// POST /api/learning/analyze: Judge a student's answer.
///
/// Returns 400 if `studentResponse` or `context` is missing.
pub async fn post_analyze_response(
    State(app): State<AppState>,
    payload: Result<Json<AnalyzeResponseRequest>, JsonRejection>,
) -> ApiResult<AnalyzeResponseBody> {
    let Json(body) = payload?;
    let (Some(student_response), Some(context)) =
        (non_empty(body.student_response), non_empty(body.context))
    else {
        return Err(ApiError::Validation(
            "Student response and context are required".into(),
        ));
    };

    let req = AnalysisRequest {
        student_response,
        context,
        subject: non_empty(body.subject).unwrap_or_else(|| "General".into()),
        current_step: body.current_step.unwrap_or(1),
        total_steps: body.total_steps.unwrap_or(1),
    };
    let analysis = app
        .tutor
        .analyze_response(&req)
        .await
        .map_err(|e| app.fail(ApiError::from_tutor("Error analyzing response", e)))?;

    Ok(Json(AnalyzeResponseBody {
        success: true,
        analysis,
    }))
}

// ── Guidance turns ─────────────────────────────────────────────────

/// Request body for POST /api/learning/process.
#[derive(Deserialize, Debug, Default)]
pub struct ProcessTurnRequest {
    pub message: Option<String>,
    pub user_query: Option<String>,
    pub subject: Option<String>,
    pub current_step: Option<i64>,
    pub total_steps: Option<i64>,
    pub context: Option<String>,
    pub response_type: Option<String>,
}

impl ProcessTurnRequest {
    /// Build the turn, or `None` if `message` or `subject` is missing.
    /// An absent `response_type` means a hint.
    pub fn into_turn(self) -> Option<LearningTurn> {
        let message = non_empty(self.message)?;
        let subject = non_empty(self.subject)?;
        Some(LearningTurn {
            message,
            user_query: self.user_query.unwrap_or_default(),
            subject,
            current_step: self.current_step.unwrap_or(1),
            total_steps: self.total_steps.unwrap_or(1),
            context: self.context.unwrap_or_default(),
            response_type: self
                .response_type
                .as_deref()
                .map_or(ResponseType::Hint, ResponseType::from),
        })
    }
}

#[derive(Serialize, Debug)]
pub struct ProcessTurnBody {
    pub success: bool,
    pub next_step: String,
    pub is_final_step: bool,
    pub context: String,
    pub audio_url: String,
}

/// POST /api/learning/process: Next tutor message for a guided session.
///
/// Returns 400 if `message` or `subject` is missing.
pub async fn post_process_turn(
    State(app): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ProcessTurnRequest>, JsonRejection>,
) -> ApiResult<ProcessTurnBody> {
    let Json(body) = payload?;
    let turn = body
        .into_turn()
        .ok_or_else(|| ApiError::Validation("Student message and subject are required".into()))?;

    let outcome = app
        .tutor
        .process_turn(&turn)
        .await
        .map_err(|e| app.fail(ApiError::from_tutor("Error processing response", e)))?;

    Ok(Json(ProcessTurnBody {
        success: true,
        next_step: outcome.next_step,
        is_final_step: outcome.is_final_step,
        context: outcome.context,
        audio_url: outcome.audio.url(&request_base(&headers)),
    }))
}

// ── Lessons ────────────────────────────────────────────────────────

/// Request body for POST /api/learning/start.
#[derive(Deserialize, Debug, Default)]
pub struct StartLessonRequest {
    pub query: Option<String>,
    pub subject: Option<String>,
    pub grade_level: Option<u32>,
}

#[derive(Serialize, Debug)]
pub struct StartLessonBody {
    pub success: bool,
    pub first_step: String,
    pub total_steps: u32,
    pub audio_url: String,
}

/// POST /api/learning/start: Open an interactive lesson on a topic.
pub async fn post_start_lesson(
    State(app): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<StartLessonRequest>, JsonRejection>,
) -> ApiResult<StartLessonBody> {
    let Json(body) = payload?;
    let query =
        non_empty(body.query).ok_or_else(|| ApiError::Validation("Query is required".into()))?;
    let subject = non_empty(body.subject).unwrap_or_else(|| "General".into());

    let lesson = app
        .tutor
        .start_lesson(&query, &subject, body.grade_level.unwrap_or(3))
        .await
        .map_err(|e| app.fail(ApiError::from_tutor("Error starting learning", e)))?;

    Ok(Json(StartLessonBody {
        success: true,
        first_step: lesson.first_step,
        total_steps: lesson.total_steps,
        audio_url: lesson.audio.url(&request_base(&headers)),
    }))
}

// ── Explanations ───────────────────────────────────────────────────

/// Request body for POST /api/chat/generate-explanation.
#[derive(Deserialize, Debug, Default)]
pub struct ExplanationRequest {
    pub query: Option<String>,
    pub subject: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct ExplanationBody {
    pub success: bool,
    pub subject: String,
    pub query: String,
    pub explanation: Explanation,
}

/// POST /api/chat/generate-explanation: Step-by-step explanation for the
/// explanation panel. `subject` defaults to `"Math"`.
pub async fn post_generate_explanation(
    State(app): State<AppState>,
    payload: Result<Json<ExplanationRequest>, JsonRejection>,
) -> ApiResult<ExplanationBody> {
    let Json(body) = payload?;
    let query =
        non_empty(body.query).ok_or_else(|| ApiError::Validation("Query is required".into()))?;
    let subject = non_empty(body.subject).unwrap_or_else(|| "Math".into());

    let explanation = app
        .tutor
        .explain(&query, &subject)
        .await
        .map_err(|e| app.fail(ApiError::from_tutor("Failed to generate explanation", e)))?;

    Ok(Json(ExplanationBody {
        success: true,
        subject,
        query,
        explanation,
    }))
}

// ── Chat relay ─────────────────────────────────────────────────────

/// One message of a relayed conversation.
#[derive(Deserialize, Debug, Clone)]
pub struct RelayMessage {
    pub role: MessageRole,
    pub content: String,
}

/// Request body for POST /api/chatgpt.
#[derive(Deserialize, Debug, Default)]
pub struct ChatRelayRequest {
    #[serde(default)]
    pub messages: Vec<RelayMessage>,
}

#[derive(Serialize, Debug)]
pub struct ChatRelayBody {
    pub success: bool,
    pub text: String,
    pub audio_url: String,
}

/// POST /api/chatgpt: Forward a conversation and voice the reply.
///
/// Returns 400 if `messages` is missing or empty.
pub async fn post_chat_relay(
    State(app): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ChatRelayRequest>, JsonRejection>,
) -> ApiResult<ChatRelayBody> {
    let Json(body) = payload?;
    if body.messages.is_empty() {
        return Err(ApiError::Validation("No messages provided".into()));
    }
    let messages = body
        .messages
        .into_iter()
        .map(|m| Message::with_role(m.role, m.content))
        .collect();

    let reply = app
        .tutor
        .relay_chat(messages)
        .await
        .map_err(|e| app.fail(ApiError::from_tutor("Error in chat", e)))?;

    Ok(Json(ChatRelayBody {
        success: true,
        text: reply.text,
        audio_url: reply.audio.url(&request_base(&headers)),
    }))
}

// ── Images ─────────────────────────────────────────────────────────

#[derive(Serialize, Debug)]
pub struct UploadBody {
    pub success: bool,
    pub image_url: String,
    pub message: &'static str,
}

/// POST /api/images/upload: Store an image from the multipart field `image`.
///
/// Non-image content types and oversized files are rejected before anything
/// is written.
pub async fn post_upload_image(
    State(app): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<UploadBody> {
    let media = app.tutor.media();

    while let Some(mut field) = multipart.next_field().await? {
        if field.name() != Some("image") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_name = field.file_name().map(str::to_string);
        media
            .check_content_type(&content_type)
            .map_err(|e| ApiError::from_media("Error uploading image", e))?;

        // Drain the whole field so the client gets a clean response, but
        // stop buffering once it is over the limit.
        let mut bytes = Vec::new();
        let mut size = 0usize;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len();
            if size <= media.max_upload_bytes() {
                bytes.extend_from_slice(&chunk);
            }
        }
        media
            .check_size(size)
            .map_err(|e| ApiError::from_media("Error uploading image", e))?;

        let stored = media
            .store_upload(&bytes, &content_type, file_name.as_deref())
            .await
            .map_err(|e| app.fail(ApiError::from_media("Error uploading image", e)))?;

        return Ok(Json(UploadBody {
            success: true,
            image_url: stored.url(&request_base(&headers)),
            message: "Image uploaded successfully",
        }));
    }

    Err(ApiError::Validation("No image file provided".into()))
}

/// Request body for POST /api/images/analyze.
#[derive(Deserialize, Debug, Default)]
pub struct AnalyzeImageRequest {
    pub image_url: Option<String>,
    /// Accepted for client compatibility; nothing is stored per conversation.
    pub conversation_id: Option<serde_json::Value>,
}

#[derive(Serialize, Debug)]
pub struct AnalyzeImageBody {
    pub success: bool,
    pub response: String,
    pub audio_url: String,
    pub should_enter_tutorial_mode: bool,
    pub learning_context: String,
    pub learning_steps: Vec<String>,
}

/// POST /api/images/analyze: Describe an image and decide on tutorial mode.
///
/// Returns 400 if `image_url` is missing.
pub async fn post_analyze_image(
    State(app): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<AnalyzeImageRequest>, JsonRejection>,
) -> ApiResult<AnalyzeImageBody> {
    let Json(body) = payload?;
    let image_url = non_empty(body.image_url)
        .ok_or_else(|| ApiError::Validation("Image URL is required".into()))?;
    debug!("analyze image: conversation={:?}", body.conversation_id);

    let analysis = app
        .tutor
        .analyze_image(&image_url)
        .await
        .map_err(|e| app.fail(ApiError::from_tutor("Error analyzing image", e)))?;
    info!(
        "image analyzed: tutorial={}, steps={}",
        analysis.should_enter_tutorial_mode,
        analysis.learning_steps.len()
    );

    Ok(Json(AnalyzeImageBody {
        success: true,
        audio_url: analysis.audio.url(&request_base(&headers)),
        response: analysis.response,
        should_enter_tutorial_mode: analysis.should_enter_tutorial_mode,
        learning_context: analysis.learning_context,
        learning_steps: analysis.learning_steps,
    }))
}

// ── Speech ─────────────────────────────────────────────────────────

/// Request body for POST /api/tts.
#[derive(Deserialize, Debug, Default)]
pub struct SpeechToFileRequest {
    pub text: Option<String>,
    pub voice: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct SpeechBody {
    pub success: bool,
    pub audio_url: String,
}

/// POST /api/tts: Synthesize speech for arbitrary text.
pub async fn post_tts(
    State(app): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<SpeechToFileRequest>, JsonRejection>,
) -> ApiResult<SpeechBody> {
    let Json(body) = payload?;
    let text =
        non_empty(body.text).ok_or_else(|| ApiError::Validation("No text provided".into()))?;
    let voice = non_empty(body.voice);

    let audio = app
        .tutor
        .speak(&text, voice.as_deref())
        .await
        .map_err(|e| app.fail(ApiError::from_tutor("Error generating speech", e)))?;

    Ok(Json(SpeechBody {
        success: true,
        audio_url: audio.url(&request_base(&headers)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn analyze_request_uses_camel_case() {
        let json = r#"{"studentResponse":"12","context":"7+5","currentStep":2,"totalSteps":3}"#;
        let req: AnalyzeResponseRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.student_response.as_deref(), Some("12"));
        assert_eq!(req.current_step, Some(2));
        assert_eq!(req.subject, None);
    }

    #[test]
    fn process_request_defaults_to_hint() {
        let req: ProcessTurnRequest =
            serde_json::from_str(r#"{"message":"12","subject":"Math"}"#).unwrap();
        let turn = req.into_turn().unwrap();
        assert_eq!(turn.response_type, ResponseType::Hint);
        assert_eq!(turn.current_step, 1);
        assert_eq!(turn.total_steps, 1);
        assert!(turn.is_final_step());
    }

    #[test]
    fn process_request_unknown_type_is_default() {
        let req: ProcessTurnRequest = serde_json::from_str(
            r#"{"message":"12","subject":"Math","response_type":"riddle"}"#,
        )
        .unwrap();
        assert_eq!(req.into_turn().unwrap().response_type, ResponseType::Default);
    }

    #[test]
    fn process_request_requires_message_and_subject() {
        let missing_subject: ProcessTurnRequest =
            serde_json::from_str(r#"{"message":"12"}"#).unwrap();
        assert!(missing_subject.into_turn().is_none());
        let blank_message: ProcessTurnRequest =
            serde_json::from_str(r#"{"message":"  ","subject":"Math"}"#).unwrap();
        assert!(blank_message.into_turn().is_none());
    }

    #[test]
    fn analyze_body_flattens_result() {
        let body = AnalyzeResponseBody {
            success: true,
            analysis: AnalysisResult {
                is_correct: true,
                confusion_level: 2,
                misconceptions: vec![],
                feedback: "ok".into(),
            },
        };
        let json = serde_json::to_value(body).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["is_correct"], true);
        assert_eq!(json["confusion_level"], 2);
        assert_eq!(json["feedback"], "ok");
    }

    #[test]
    fn request_base_honours_forwarded_proto() {
        let mut headers = HeaderMap::new();
        headers.insert("host", HeaderValue::from_static("tutor.example:8443"));
        assert_eq!(request_base(&headers), "http://tutor.example:8443");
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https, http"));
        assert_eq!(request_base(&headers), "https://tutor.example:8443");
    }

    #[test]
    fn image_request_accepts_numeric_conversation_id() {
        let json = r#"{"image_url":"http://x/a.png","conversation_id":7}"#;
        let req: AnalyzeImageRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.image_url.as_deref(), Some("http://x/a.png"));
        assert_eq!(req.conversation_id, Some(serde_json::json!(7)));
    }

    #[test]
    fn relay_request_reads_roles() {
        let json = r#"{"messages":[
            {"role":"system","content":"Be kind"},
            {"role":"user","content":"Hi"}
        ]}"#;
        let req: ChatRelayRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[0].role, MessageRole::System);

        let empty: ChatRelayRequest = serde_json::from_str("{}").unwrap();
        assert!(empty.messages.is_empty());
        assert!(serde_json::from_str::<ChatRelayRequest>(
            r#"{"messages":[{"role":"robot","content":"beep"}]}"#
        )
        .is_err());
    }
}
