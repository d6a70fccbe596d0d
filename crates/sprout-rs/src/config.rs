//! Tutor configuration with sensible defaults.
//!
//! [`TutorConfig`] captures which models to call and with what limits. The
//! web binary fills it from CLI flags and environment variables; library
//! users can start from [`TutorConfig::default()`] and override fields.

/// Five mebibytes, the default upload ceiling.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Model and limit settings for every provider call the tutor makes.
#[derive(Debug, Clone)]
pub struct TutorConfig {
    /// Model for analysis and guidance turns. Default: `"gpt-4"`.
    pub chat_model: String,
    /// Vision-capable model for image analysis. Default: `"gpt-4o-mini"`.
    pub vision_model: String,
    /// Model for learning-step generation. Default: `"gpt-4"`.
    pub steps_model: String,
    /// Speech synthesis model. Default: `"tts-1"`.
    pub speech_model: String,
    /// Default synthesis voice. Default: `"alloy"`.
    pub voice: String,
    /// Token limit for analysis, guidance, vision and step calls. Default: `500`.
    pub max_tokens: u32,
    /// Token limit for the opening step of a lesson. Default: `300`.
    pub lesson_max_tokens: u32,
    /// Token limit for step-by-step explanations. Default: `800`.
    pub explanation_max_tokens: u32,
    /// Sampling temperature for tutoring text. Default: `0.7`.
    pub temperature: f32,
    /// Largest accepted image upload in bytes. Applied to the media store by
    /// [`Tutor::new`](crate::tutor::Tutor::new). Default: 5 MiB.
    pub max_upload_bytes: usize,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            chat_model: "gpt-4".to_string(),
            vision_model: "gpt-4o-mini".to_string(),
            steps_model: "gpt-4".to_string(),
            speech_model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            max_tokens: 500,
            lesson_max_tokens: 300,
            explanation_max_tokens: 800,
            temperature: 0.7,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = TutorConfig::default();
        assert_eq!(config.chat_model, "gpt-4");
        assert_eq!(config.vision_model, "gpt-4o-mini");
        assert_eq!(config.speech_model, "tts-1");
        assert_eq!(config.voice, "alloy");
        assert_eq!(config.max_tokens, 500);
        assert_eq!(config.explanation_max_tokens, 800);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.max_upload_bytes, 5_242_880);
    }
}
