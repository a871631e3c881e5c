//! Database row types. These map directly to SQLite rows.
//! Distinct from archive-types models to keep the DB layer independent.
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;

use archive_types::{Channel, Message, Role, Snowflake, User};

pub struct TranscriptRow {
    pub id: i64,
    pub slug: String,
    pub server_id: String,
    pub server_name: String,
    pub server_icon: Option<String>,
    pub channel_name: String,
    pub queued_by: Option<String>,
    pub created_at: String,
}

pub struct UserRow {
    pub id: String,
    pub nickname: Option<String>,
    pub username: Option<String>,
    pub tag: Option<String>,
    pub avatar: Option<String>,
    pub role_color: Option<String>,
    pub bot: Option<bool>,
    pub verified: Option<bool>,
}

pub struct MessageRow {
    pub id: String,
    pub author_id: String,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub content: String,
    pub embeds: String,
    pub attachments: String,
    pub reactions: String,
    pub reply: Option<String>,
}

pub struct MentionRow {
    pub id: String,
    pub name: String,
    /// Channel type or role color, depending on the table.
    pub extra: Option<String>,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: snowflake(&self.id, "user id")?,
            nickname: self.nickname,
            username: self.username,
            tag: self.tag,
            avatar: self.avatar,
            role_color: self.role_color,
            bot: self.bot,
            verified: self.verified,
        })
    }
}

impl MessageRow {
    /// Any unreadable column fails the whole row.
    pub fn into_message(self) -> Result<Message> {
        let id = snowflake(&self.id, "message id")?;
        let context = || format!("message '{}'", self.id);

        Ok(Message {
            author_id: snowflake(&self.author_id, "author id").with_context(context)?,
            created_at: parse_timestamp(&self.created_at).with_context(context)?,
            edited_at: self
                .edited_at
                .as_deref()
                .map(parse_timestamp)
                .transpose()
                .with_context(context)?,
            reply: self
                .reply
                .as_deref()
                .map(|r| snowflake(r, "reply id"))
                .transpose()
                .with_context(context)?,
            embeds: json_column(&self.embeds, "embeds").with_context(context)?,
            attachments: json_column(&self.attachments, "attachments").with_context(context)?,
            reactions: json_column(&self.reactions, "reactions").with_context(context)?,
            content: self.content,
            id,
        })
    }
}

impl MentionRow {
    pub fn into_channel(self) -> Result<Channel> {
        Ok(Channel {
            id: snowflake(&self.id, "channel id")?,
            name: self.name,
            kind: self.extra,
        })
    }

    pub fn into_role(self) -> Result<Role> {
        Ok(Role {
            id: snowflake(&self.id, "role id")?,
            name: self.name,
            color: self.extra,
        })
    }
}

pub fn snowflake(raw: &str, what: &str) -> Result<Snowflake> {
    Snowflake::parse(raw).with_context(|| format!("Corrupt {} '{}'", what, raw))
}

fn json_column<T: DeserializeOwned>(raw: &str, column: &str) -> Result<Vec<T>> {
    serde_json::from_str(raw).with_context(|| format!("Corrupt {} column", column))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite's own datetime() output: "YYYY-MM-DD HH:MM:SS", no timezone.
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("Corrupt timestamp '{}'", raw))
}
