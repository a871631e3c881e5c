use anyhow::Result;
use tracing::warn;

use archive_types::{Snowflake, Transcript};

use crate::pagination::PageOutcome;

/// Where transcripts come from. The hosting application owns the
/// implementation (and its connection lifecycle) and hands it in.
pub trait TranscriptSource {
    /// Roster, metadata and the newest `initial_limit` messages, newest
    /// first. `None` as the limit loads every message. `Ok(None)` when no
    /// transcript has this slug.
    fn fetch_transcript(&self, slug: &str, initial_limit: Option<u32>) -> Result<Option<Transcript>>;

    /// Up to `limit` messages strictly older than `before`, newest first.
    /// Without a cursor this returns the newest page.
    fn fetch_page(&self, slug: &str, before: Option<&Snowflake>, limit: u32) -> Result<PageOutcome>;
}

impl<S: TranscriptSource + ?Sized> TranscriptSource for &S {
    fn fetch_transcript(&self, slug: &str, initial_limit: Option<u32>) -> Result<Option<Transcript>> {
        (**self).fetch_transcript(slug, initial_limit)
    }

    fn fetch_page(&self, slug: &str, before: Option<&Snowflake>, limit: u32) -> Result<PageOutcome> {
        (**self).fetch_page(slug, before, limit)
    }
}

/// Load a transcript for display. Collaborator failures are logged and
/// reported as "not found" so the view never renders a partial transcript.
pub fn open_transcript<S: TranscriptSource + ?Sized>(
    source: &S,
    slug: &str,
    initial_limit: Option<u32>,
) -> Option<Transcript> {
    match source.fetch_transcript(slug, initial_limit) {
        Ok(transcript) => transcript,
        Err(e) => {
            warn!("Failed to fetch transcript '{}': {:#}", slug, e);
            None
        }
    }
}
