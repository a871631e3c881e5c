pub mod error;
pub mod transcripts;

use std::sync::Arc;

use axum::{Router, routing::get};

use archive_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    /// Origin used for the discussion link in evidence citations.
    pub public_url: String,
    /// Messages shipped with the transcript document.
    pub initial_page: u32,
    /// Upper bound for one `/messages` page.
    pub page_size: u32,
}

/// All archive routes. Layers (CORS, tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/transcripts/{slug}", get(transcripts::get_transcript))
        .route("/transcripts/{slug}/messages", get(transcripts::get_messages))
        .route("/transcripts/{slug}/evidence", get(transcripts::get_evidence))
        .route("/transcripts/{slug}/render", get(transcripts::render))
        .route("/health", get(transcripts::health))
        .with_state(state)
}
