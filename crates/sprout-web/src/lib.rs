//! HTTP relay for the sprout tutoring backend.
//!
//! `sprout-web` wraps a [`Tutor`] in an axum server: JSON endpoints for
//! answer analysis, guidance turns, lessons, image analysis and speech, plus
//! a multipart upload endpoint and static serving of everything the tutor
//! stores.
//!
//! # Quick start
//!
//! ```ignore
//! use std::sync::Arc;
//! use sprout_rs::prelude::*;
//! use sprout_web::{WebConfig, spawn_web};
//!
//! let client = ProviderClient::new(api_key)?;
//! let tutor = Tutor::new(client, TutorConfig::default(), MediaStore::new("public"));
//! let addr = spawn_web(Arc::new(tutor), WebConfig::default()).await?;
//! println!("Listening on http://{addr}");
//! ```
//!
//! # Routes
//!
//! ```text
//! GET  /api/health
//! POST /api/learning/analyze    answer analysis
//! POST /api/learning/process    next guidance turn (+ audio)
//! POST /api/learning/start      open a lesson (+ audio)
//! POST /api/images/upload       multipart field `image`
//! POST /api/images/analyze      vision analysis, tutorial mode (+ audio)
//! POST /api/tts                 speech for arbitrary text
//! POST /api/chat/generate-explanation  step-by-step explanation
//! POST /api/chatgpt             relay a conversation (+ audio)
//! GET  /static/*                stored images and audio
//! ```

pub mod api;
pub mod error;
mod server;

pub use api::AppState;
pub use error::ApiError;
pub use server::build_router;

use std::net::SocketAddr;
use std::sync::Arc;

use sprout_rs::tutor::Tutor;

/// Configuration for the web server.
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Address to bind to. Default: `127.0.0.1:3000`.
    pub bind_addr: SocketAddr,
    /// Replace provider and storage error detail with a generic message.
    /// Default: `false`.
    pub redact_errors: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            redact_errors: false,
        }
    }
}

/// Spawn the web server on a Tokio task and return the bound address.
///
/// Static files are served from the tutor's media root. The server runs
/// until the Tokio runtime shuts down.
pub async fn spawn_web(tutor: Arc<Tutor>, config: WebConfig) -> std::io::Result<SocketAddr> {
    let state = AppState {
        tutor,
        redact_errors: config.redact_errors,
    };
    let router = server::build_router(state);
    server::start_server(router, config.bind_addr).await
}
