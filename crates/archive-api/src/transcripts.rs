use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderName, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{debug, error};

use archive_render::{
    EvidenceOptions, GroupingOptions, PageOutcome, TranscriptSession, TranscriptSource,
    extract_evidence, open_transcript, render_transcript,
};
use archive_types::Snowflake;
use archive_types::api::{PageResponse, TranscriptResponse};

use crate::AppState;
use crate::error::ApiError;

/// Pages of a finished transcript never change.
const FINISHED_PAGE_MAX_AGE: u32 = 30 * 24 * 60 * 60;
const IN_PROGRESS_MAX_AGE: u32 = 60;
const DOCUMENT_MAX_AGE: u32 = 60 * 60;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    /// Id of the oldest message the client already holds.
    pub before: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct EvidenceQuery {
    /// Cite every Finding block, not just the latest.
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Deserialize)]
pub struct RenderQuery {
    pub split_on_reply: Option<bool>,
}

fn cache_for(max_age: u32) -> [(HeaderName, String); 1] {
    [(header::CACHE_CONTROL, format!("public, max-age={}", max_age))]
}

fn document_max_age(in_progress: bool) -> u32 {
    if in_progress { IN_PROGRESS_MAX_AGE } else { DOCUMENT_MAX_AGE }
}

/// Run blocking DB work off the async runtime.
async fn blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal
    })
}

/// The transcript document: newest page, roster and the evidence citation.
pub async fn get_transcript(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let (transcript, md) = blocking(move || {
        // The citation needs every message, the document only the newest page.
        let mut transcript = open_transcript(&db.db, &slug, None)?;
        let options = EvidenceOptions {
            collect_all_findings: false,
            discussion_base_url: db.public_url.clone(),
        };
        let md = extract_evidence(&transcript, &options);
        transcript.messages.truncate(db.initial_page as usize);
        Some((transcript, md))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let max_age = document_max_age(transcript.in_progress());
    Ok((cache_for(max_age), Json(TranscriptResponse { transcript, md })))
}

/// Next older page. Empty when nothing older exists (yet).
pub async fn get_messages(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<MessageQuery>,
) -> Result<Response, ApiError> {
    let before = query
        .before
        .map(|raw| Snowflake::parse(raw.clone()).map_err(|_| ApiError::BadCursor(raw)))
        .transpose()?;
    let limit = query.limit.unwrap_or(state.page_size).clamp(1, state.page_size.max(1));

    let db = state.clone();
    let outcome = blocking(move || {
        db.db.fetch_page(&slug, before.as_ref(), limit).map_err(|e| {
            error!("Failed to fetch page of '{}' before {:?}: {:#}", slug, before, e);
            ApiError::NotFound
        })
    })
    .await??;

    let page = match outcome {
        PageOutcome::Page(page) => page,
        PageOutcome::NotFound => return Err(ApiError::NotFound),
    };
    debug!("Serving {} messages (in progress: {})", page.messages.len(), page.in_progress);

    let body = Json(PageResponse {
        messages: page.messages,
        in_progress: page.in_progress,
    });
    if page.in_progress {
        Ok(body.into_response())
    } else {
        Ok((cache_for(FINISHED_PAGE_MAX_AGE), body).into_response())
    }
}

/// Evidence citation alone, as markdown.
pub async fn get_evidence(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<EvidenceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let (md, in_progress) = blocking(move || {
        let transcript = open_transcript(&db.db, &slug, None)?;
        let options = EvidenceOptions {
            collect_all_findings: query.all,
            discussion_base_url: db.public_url.clone(),
        };
        Some((extract_evidence(&transcript, &options), transcript.in_progress()))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let max_age = document_max_age(in_progress);
    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (header::CACHE_CONTROL, format!("public, max-age={}", max_age)),
        ],
        md,
    ))
}

/// The first page grouped by author with mentions resolved, ready to draw.
pub async fn render(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<RenderQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let options = GroupingOptions {
        split_on_reply: query.split_on_reply.unwrap_or(true),
    };

    let db = state.clone();
    let rendered = blocking(move || {
        let transcript = open_transcript(&db.db, &slug, Some(db.initial_page))?;
        let session = TranscriptSession::with_page_size(&transcript, db.page_size);
        Some(render_transcript(&transcript, &session, options))
    })
    .await?
    .ok_or(ApiError::NotFound)?;

    let max_age = document_max_age(rendered.in_progress);
    Ok((cache_for(max_age), Json(rendered)))
}

pub async fn health() -> &'static str {
    "ok"
}
