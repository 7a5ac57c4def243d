//! HTTP surface of the service.

mod handlers;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::audio::Transcoder;
use crate::config::ServiceConfig;
use crate::preprocess::Preprocessor;
use crate::synthesis::{SynthesisInvoker, SynthesisLimits, VoiceCloner};
use crate::validate::AudioValidator;
use crate::workspace::Workspace;

/// Room for multipart boundaries and headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// Everything a request handler may touch. Built once at startup.
pub struct AppState {
    pub config: ServiceConfig,
    pub workspace: Workspace,
    pub validator: AudioValidator,
    pub preprocessor: Preprocessor,
    pub synthesis: SynthesisInvoker,
}

impl AppState {
    /// Wire the components together around an already loaded model.
    pub fn new(config: ServiceConfig, cloner: Option<Arc<dyn VoiceCloner>>) -> Arc<Self> {
        let workspace = Workspace::from_config(&config);
        let transcoder = Transcoder::new(config.ffmpeg_path.clone());
        let synthesis = SynthesisInvoker::new(
            cloner,
            workspace.clone(),
            transcoder.clone(),
            SynthesisLimits::from_config(&config),
        );
        Arc::new(Self {
            validator: AudioValidator::new(config.min_duration, config.max_duration),
            preprocessor: Preprocessor::new(transcoder),
            synthesis,
            workspace,
            config,
        })
    }
}

/// Build the router with CORS, request tracing and the upload size cap.
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = usize::try_from(state.config.max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/validate-audio", post(handlers::validate_audio))
        .route("/process-voice-sample", post(handlers::process_voice_sample))
        .route("/synthesize", post(handlers::synthesize))
        .route("/download/{filename}", get(handlers::download))
        .route("/cleanup", post(handlers::cleanup))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
