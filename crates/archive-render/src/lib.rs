//! The transcript pipeline: grouping messages into turns, resolving inline
//! mentions, distilling an evidence citation, and paging older messages in.
//!
//! Everything here is synchronous and side-effect free apart from logging.
//! Data access goes through [`source::TranscriptSource`].

pub mod color;
pub mod evidence;
pub mod grouping;
pub mod mentions;
pub mod pagination;
pub mod source;
pub mod view;

pub use evidence::{EvidenceOptions, extract_evidence};
pub use grouping::{GroupingOptions, MessageGroup, MessageGroups, group_messages};
pub use mentions::{Mentions, resolve_mentions};
pub use pagination::{
    INITIAL_PAGE_SIZE, LoadOutcome, Page, PageOutcome, PageRequest, PAGE_SIZE, SessionError,
    TranscriptSession,
};
pub use source::{TranscriptSource, open_transcript};
pub use view::render_transcript;
