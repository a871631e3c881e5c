//! Backward paging through a transcript.
//!
//! The view starts from the newest [`INITIAL_PAGE_SIZE`] messages and asks
//! for [`PAGE_SIZE`] older ones at a time, using the oldest held message as
//! an exclusive cursor. An empty page ends paging unless the transcriber is
//! still appending, in which case the view should poll again later.

use thiserror::Error;
use tracing::debug;

use archive_types::{Message, Snowflake, Transcript};

use crate::source::TranscriptSource;

pub const INITIAL_PAGE_SIZE: u32 = 250;
pub const PAGE_SIZE: u32 = 100;

/// A page fetch the session has handed out and not yet seen completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub slug: String,
    pub before: Option<Snowflake>,
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Newest first.
    pub messages: Vec<Message>,
    pub in_progress: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    Page(Page),
    /// Unknown transcript or cursor. Treated as the end of the transcript.
    NotFound,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Older messages were added, oldest first, ready to be merged in front
    /// of the existing groups.
    Appended(Vec<Message>),
    /// Nothing older yet but the transcript is still being written.
    Waiting,
    /// No more messages will come.
    Exhausted,
    /// The response belonged to another transcript or an outdated request.
    Discarded,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a page request is already in flight for '{0}'")]
    Busy(String),
    #[error("transcript '{0}' has no more pages")]
    Exhausted(String),
    #[error("failed to fetch page: {0:#}")]
    Source(#[from] anyhow::Error),
}

/// Host-side paging state for one open transcript.
///
/// Holds the accumulated messages newest first and only ever appends older
/// ones. At most one request is outstanding at a time.
#[derive(Debug, Clone)]
pub struct TranscriptSession {
    slug: String,
    messages: Vec<Message>,
    message_count: u64,
    in_progress: bool,
    exhausted: bool,
    page_size: u32,
    in_flight: Option<PageRequest>,
}

impl TranscriptSession {
    pub fn new(transcript: &Transcript) -> Self {
        Self::with_page_size(transcript, PAGE_SIZE)
    }

    pub fn with_page_size(transcript: &Transcript, page_size: u32) -> Self {
        let mut messages = transcript.messages.clone();
        messages.sort_by(|a, b| b.id.cmp(&a.id));
        messages.dedup_by(|a, b| a.id == b.id);

        let in_progress = transcript.in_progress();
        let exhausted = !in_progress && messages.len() as u64 >= transcript.message_count;
        Self {
            slug: transcript.slug.clone(),
            messages,
            message_count: transcript.message_count,
            in_progress,
            exhausted,
            page_size: page_size.max(1),
            in_flight: None,
        }
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Newest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Oldest first, for display and grouping.
    pub fn chronological(&self) -> Vec<Message> {
        self.messages.iter().rev().cloned().collect()
    }

    /// Exclusive cursor for the next page: the oldest held message.
    pub fn cursor(&self) -> Option<&Snowflake> {
        self.messages.last().map(|m| &m.id)
    }

    pub fn has_more(&self) -> bool {
        !self.exhausted
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Known total, never less than what is already held.
    pub fn message_count(&self) -> u64 {
        self.message_count.max(self.messages.len() as u64)
    }

    /// Claim the next page fetch. Fails while another fetch is outstanding
    /// or once the transcript is exhausted; the caller should just drop the
    /// trigger in either case.
    pub fn begin_load(&mut self) -> Result<PageRequest, SessionError> {
        if self.in_flight.is_some() {
            return Err(SessionError::Busy(self.slug.clone()));
        }
        if self.exhausted {
            return Err(SessionError::Exhausted(self.slug.clone()));
        }
        let request = PageRequest {
            slug: self.slug.clone(),
            before: self.cursor().cloned(),
            limit: self.page_size,
        };
        self.in_flight = Some(request.clone());
        Ok(request)
    }

    /// Release a claimed request after the fetch itself failed. Paging stays
    /// open so the caller may retry.
    pub fn abort_load(&mut self, request: &PageRequest) {
        if self.in_flight.as_ref() == Some(request) {
            self.in_flight = None;
        }
    }

    /// Merge the result of a request obtained from [`begin_load`].
    ///
    /// [`begin_load`]: Self::begin_load
    pub fn complete_load(&mut self, request: &PageRequest, outcome: PageOutcome) -> LoadOutcome {
        if request.slug != self.slug || self.in_flight.as_ref() != Some(request) {
            debug!(
                "Discarding page for '{}' (session '{}', in flight: {})",
                request.slug,
                self.slug,
                self.in_flight.is_some()
            );
            return LoadOutcome::Discarded;
        }
        self.in_flight = None;

        let page = match outcome {
            PageOutcome::Page(page) => page,
            PageOutcome::NotFound => {
                debug!("Cursor {:?} not found for '{}', paging done", request.before, self.slug);
                self.exhausted = true;
                return LoadOutcome::Exhausted;
            }
        };
        self.in_progress = page.in_progress;

        // Anything not strictly older than the cursor is already held.
        let mut older: Vec<Message> = page
            .messages
            .into_iter()
            .filter(|m| request.before.as_ref().is_none_or(|cursor| m.id < *cursor))
            .collect();
        older.sort_by(|a, b| b.id.cmp(&a.id));
        older.dedup_by(|a, b| a.id == b.id);

        if older.is_empty() {
            if self.in_progress {
                debug!("No older messages for '{}' yet, transcription in progress", self.slug);
                return LoadOutcome::Waiting;
            }
            debug!("'{}' fully loaded ({} messages)", self.slug, self.messages.len());
            self.exhausted = true;
            return LoadOutcome::Exhausted;
        }

        debug!("Appending {} older messages to '{}'", older.len(), self.slug);
        self.messages.extend(older.iter().cloned());
        older.reverse();
        LoadOutcome::Appended(older)
    }

    /// Fetch and merge the next page synchronously.
    pub fn load_more<S: TranscriptSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<LoadOutcome, SessionError> {
        let request = self.begin_load()?;
        match source.fetch_page(&request.slug, request.before.as_ref(), request.limit) {
            Ok(outcome) => Ok(self.complete_load(&request, outcome)),
            Err(e) => {
                self.abort_load(&request);
                Err(SessionError::Source(e))
            }
        }
    }
}
