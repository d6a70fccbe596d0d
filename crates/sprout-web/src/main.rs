//! Tutoring relay server.
//!
//! # Usage
//!
//! ```bash
//! OPENAI_API_KEY=sk-... cargo run -p sprout-web
//! OPENAI_API_KEY=sk-... cargo run -p sprout-web -- --port 8080 --static-dir public
//! OPENAI_API_KEY=sk-... cargo run -p sprout-web -- --redact-errors
//! ```
//!
//! Every option can also be set through the environment variable named in
//! `--help`.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use sprout_rs::prelude::*;
use sprout_web::{WebConfig, spawn_web};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const DEFAULT_LOG_FILTER: &str = "sprout_web=info,sprout_rs=info,tower_http=info";

/// AI tutoring relay.
#[derive(Parser)]
#[command(about = "HTTP relay between tutoring clients and an AI provider")]
struct Args {
    /// Provider API key.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    /// Provider base URL (OpenAI-compatible).
    #[arg(long, env = "OPENAI_BASE_URL", default_value = sprout_rs::DEFAULT_BASE_URL)]
    base_url: String,

    /// Address to bind to.
    #[arg(long, env = "SPROUT_HOST", default_value = "127.0.0.1")]
    host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "SPROUT_PORT", default_value_t = 3000)]
    port: u16,

    /// Directory for uploads and synthesized audio, served at /static.
    #[arg(long, env = "SPROUT_STATIC_DIR", default_value = "static")]
    static_dir: PathBuf,

    /// Model for answer analysis, guidance turns and lessons.
    #[arg(long, env = "SPROUT_CHAT_MODEL", default_value = "gpt-4")]
    chat_model: String,

    /// Vision-capable model for image analysis.
    #[arg(long, env = "SPROUT_VISION_MODEL", default_value = "gpt-4o-mini")]
    vision_model: String,

    /// Model for learning-step generation.
    #[arg(long, env = "SPROUT_STEPS_MODEL", default_value = "gpt-4")]
    steps_model: String,

    /// Speech synthesis model.
    #[arg(long, env = "SPROUT_SPEECH_MODEL", default_value = "tts-1")]
    speech_model: String,

    /// Default synthesis voice.
    #[arg(long, env = "SPROUT_VOICE", default_value = "alloy")]
    voice: String,

    /// Largest accepted image upload in bytes.
    #[arg(
        long,
        env = "SPROUT_MAX_UPLOAD_BYTES",
        default_value_t = sprout_rs::config::DEFAULT_MAX_UPLOAD_BYTES
    )]
    max_upload_bytes: usize,

    /// Return a generic message instead of provider/storage error detail.
    #[arg(long, env = "SPROUT_REDACT_ERRORS")]
    redact_errors: bool,
}

impl Args {
    fn tutor_config(&self) -> TutorConfig {
        TutorConfig {
            chat_model: self.chat_model.clone(),
            vision_model: self.vision_model.clone(),
            steps_model: self.steps_model.clone(),
            speech_model: self.speech_model.clone(),
            voice: self.voice.clone(),
            max_upload_bytes: self.max_upload_bytes,
            ..Default::default()
        }
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();
    init_tracing();

    let client = ProviderClient::with_base_url(&args.api_key, &args.base_url)?;
    let config = args.tutor_config();
    let media = MediaStore::new(&args.static_dir);
    info!(
        "models: chat={}, vision={}, steps={}, speech={} ({})",
        config.chat_model,
        config.vision_model,
        config.steps_model,
        config.speech_model,
        config.voice
    );
    let tutor = Arc::new(Tutor::new(client, config, media));

    let web_config = WebConfig {
        bind_addr: (args.host, args.port).into(),
        redact_errors: args.redact_errors,
    };
    let addr = spawn_web(tutor, web_config)
        .await
        .map_err(|e| format!("failed to bind {}:{}: {e}", args.host, args.port))?;
    info!(
        "listening on http://{addr} (static files from {})",
        args.static_dir.display()
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("failed to wait for shutdown signal: {e}"))?;
    info!("shutting down");
    Ok(())
}
