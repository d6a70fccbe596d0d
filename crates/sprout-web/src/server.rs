//! Axum server setup and router construction.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::api::{self, AppState};

/// Build the full axum router.
///
/// The router serves:
/// - REST API at `/api/*`
/// - Stored uploads and synthesized audio at `/static/*`
pub fn build_router(app_state: AppState) -> Router {
    let media = app_state.tutor.media();
    let static_root = media.root().to_path_buf();
    // Multipart framing adds a little on top of the file itself; the exact
    // ceiling is enforced while reading the field.
    let upload_limit = media.max_upload_bytes().saturating_mul(2);

    // Browser clients are served from other origins.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/api/health", get(api::get_health))
        .route("/api/learning/analyze", post(api::post_analyze_response))
        .route("/api/learning/process", post(api::post_process_turn))
        .route("/api/learning/start", post(api::post_start_lesson))
        .route(
            "/api/images/upload",
            post(api::post_upload_image).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/images/analyze", post(api::post_analyze_image))
        .route("/api/tts", post(api::post_tts))
        .route(
            "/api/chat/generate-explanation",
            post(api::post_generate_explanation),
        )
        .route("/api/chatgpt", post(api::post_chat_relay))
        .with_state(app_state);

    // Stored files are served with their extension's type, never a sniffed one.
    let static_files = Router::new()
        .fallback_service(ServeDir::new(static_root))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    Router::new()
        .merge(api_routes)
        .nest("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Bind `bind_addr`, serve `router` on a Tokio task, and return the bound
/// address.
pub async fn start_server(router: Router, bind_addr: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("server exited: {e}");
        }
    });

    Ok(addr)
}
