use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Attachment, Embed, Message, Reaction, Transcript, User};
use crate::snowflake::Snowflake;

// -- Transcripts --

/// Template endpoint payload: the transcript plus its evidence citation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub transcript: Transcript,
    pub md: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResponse {
    pub messages: Vec<Message>,
    pub in_progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Rendering --

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionKind {
    Channel,
    Role,
    User,
}

impl MentionKind {
    /// Character drawn in front of the resolved name.
    pub fn sigil(self) -> &'static str {
        match self {
            Self::Channel => "#",
            Self::Role | Self::User => "@",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub kind: MentionKind,
    pub sigil: String,
    pub id: String,
    pub name: String,
    pub title: String,
    pub color: Option<String>,
    /// CSS background for colored mentions.
    pub background: Option<String>,
}

/// One piece of a message body after mention resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Chunk {
    Text { text: String },
    Mention(Mention),
}

impl Chunk {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text { text: s.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyPreview {
    pub id: Snowflake,
    /// `None` when the referenced message is not part of the transcript.
    pub author: Option<User>,
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedEmbed {
    pub embed: Embed,
    pub description: Vec<Chunk>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub id: Snowflake,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub chunks: Vec<Chunk>,
    pub embeds: Vec<RenderedEmbed>,
    pub attachments: Vec<Attachment>,
    pub reactions: Vec<Reaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedGroup {
    pub author: User,
    pub display_name: String,
    pub title: String,
    pub color: Option<String>,
    pub avatar_url: String,
    pub reply: Option<ReplyPreview>,
    pub messages: Vec<RenderedMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderedTranscript {
    pub slug: String,
    pub server_name: String,
    pub server_icon: Option<String>,
    pub channel_name: String,
    /// Known total, never less than what has actually been fetched.
    pub message_count: u64,
    pub in_progress: bool,
    pub has_more: bool,
    pub groups: Vec<RenderedGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_are_tagged_on_the_wire() {
        let text = serde_json::to_value(Chunk::text("hi ")).unwrap();
        assert_eq!(text["type"], "text");
        assert_eq!(text["text"], "hi ");

        let mention = serde_json::to_value(Chunk::Mention(Mention {
            kind: MentionKind::Channel,
            sigil: "#".into(),
            id: "222222222222222222".into(),
            name: "general".into(),
            title: "222222222222222222".into(),
            color: None,
            background: None,
        }))
        .unwrap();
        assert_eq!(mention["type"], "mention");
        assert_eq!(mention["kind"], "channel");
        assert_eq!(mention["name"], "general");
    }
}
