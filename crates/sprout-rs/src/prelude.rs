//! Convenience re-exports for common `sprout-rs` types.
//!
//! ```ignore
//! use sprout_rs::prelude::*;
//! ```

// ── Provider client ─────────────────────────────────────────────────
pub use crate::{
    ChatCompletion, ChatRequest, Message, MessageRole, ProviderClient, SpeechRequest,
};

// ── Tutoring ────────────────────────────────────────────────────────
pub use crate::classify::{AnalysisResult, classify};
pub use crate::config::TutorConfig;
pub use crate::explain::{Explanation, ExplanationStep};
pub use crate::media::{MediaError, MediaStore, StoredMedia};
pub use crate::prompt::{LearningTurn, ResponseType, build_prompt};
pub use crate::tutor::{
    AnalysisRequest, ChatReply, ImageAnalysis, LessonStart, Tutor, TutorError, TurnOutcome,
};
pub use crate::tutorial::{detect_tutorial_mode, parse_learning_steps};
