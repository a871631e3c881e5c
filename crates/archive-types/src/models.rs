use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::snowflake::Snowflake;

const CDN_BASE: &str = "https://cdn.discordapp.com";
const DEFAULT_AVATAR: &str =
    "https://cdn.discordapp.com/attachments/247122362942619649/980958465566572604/unknown.png";

/// Longest side an inline image or video is drawn at.
pub const MAX_MEDIA_EDGE: f64 = 576.0;

// -- Roster --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Snowflake,
    pub nickname: Option<String>,
    pub username: Option<String>,
    pub tag: Option<String>,
    pub avatar: Option<String>,
    pub role_color: Option<String>,
    pub bot: Option<bool>,
    pub verified: Option<bool>,
}

impl User {
    /// Stand-in for an author who is missing from the roster (for example,
    /// someone who left the server before the transcript was taken).
    pub fn placeholder(id: Snowflake) -> Self {
        Self {
            id,
            nickname: None,
            username: None,
            tag: None,
            avatar: None,
            role_color: None,
            bot: None,
            verified: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.nickname
            .as_deref()
            .or(self.username.as_deref())
            .unwrap_or(self.id.as_str())
    }

    /// Hover text for the author name: `username#tag`.
    pub fn title(&self) -> String {
        format!(
            "{}#{}",
            self.username.as_deref().unwrap_or("???"),
            self.tag.as_deref().unwrap_or("????")
        )
    }

    /// Role color for the author name. Pure black is what the platform
    /// reports for "no colored role", so it is treated as absent.
    pub fn name_color(&self) -> Option<&str> {
        self.role_color
            .as_deref()
            .filter(|c| !c.eq_ignore_ascii_case("#000000"))
    }

    pub fn avatar_url(&self) -> String {
        match &self.avatar {
            Some(hash) => format!("{}/avatars/{}/{}.png", CDN_BASE, self.id, hash),
            None => DEFAULT_AVATAR.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
    pub color: Option<String>,
}

/// Everything a message body can point at: authors plus the channels and
/// roles mentioned anywhere in the transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub users: Vec<User>,
    pub channels: Vec<Channel>,
    pub roles: Vec<Role>,
}

impl Roster {
    pub fn user(&self, id: &str) -> Option<&User> {
        self.users.iter().find(|u| u.id == id)
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// Roster entry for `id`, or a placeholder when the author is unknown.
    pub fn user_or_placeholder(&self, id: &Snowflake) -> User {
        self.user(id.as_str())
            .cloned()
            .unwrap_or_else(|| User::placeholder(id.clone()))
    }
}

// -- Messages --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub author_id: Snowflake,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub reactions: Vec<Reaction>,
    /// Identifier of the message this one replies to.
    pub reply: Option<Snowflake>,
}

impl Message {
    /// Edit time if the message was ever edited, creation time otherwise.
    pub fn last_touched(&self) -> DateTime<Utc> {
        self.edited_at.unwrap_or(self.created_at)
    }

    pub fn is_reply(&self) -> bool {
        self.reply.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub thumbnail: Option<Attachment>,
    pub image: Option<Attachment>,
    pub video: Option<Attachment>,
}

impl Embed {
    /// Embeds with only a thumbnail are shown as a bare attachment.
    pub fn is_thumbnail_only(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.thumbnail.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Image,
    Video,
    File,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: Option<String>,
    pub url: String,
    pub size: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    #[serde(default)]
    pub spoiler: bool,
}

impl Attachment {
    pub fn kind(&self) -> AttachmentKind {
        let path = Url::parse(&self.url)
            .map(|u| u.path().to_ascii_lowercase())
            .unwrap_or_else(|_| self.url.to_ascii_lowercase());

        const IMAGES: &[&str] = &[".png", ".jpg", ".jpeg", ".gif", ".webp"];
        const VIDEOS: &[&str] = &[".mp4", ".mov", ".webm", ".avi", ".flv"];

        if IMAGES.iter().any(|ext| path.ends_with(ext)) {
            AttachmentKind::Image
        } else if VIDEOS.iter().any(|ext| path.ends_with(ext)) {
            AttachmentKind::Video
        } else {
            AttachmentKind::File
        }
    }

    /// Display size with the longest edge clamped to [`MAX_MEDIA_EDGE`].
    /// Returns `None` when the dimensions are unknown or already fit.
    pub fn scaled_size(&self) -> Option<(f64, f64)> {
        let (w, h) = (f64::from(self.width?), f64::from(self.height?));
        if w == 0.0 || h == 0.0 {
            return None;
        }
        if w >= h && w > MAX_MEDIA_EDGE {
            Some((MAX_MEDIA_EDGE, h / w * MAX_MEDIA_EDGE))
        } else if h >= w && h > MAX_MEDIA_EDGE {
            Some((w / h * MAX_MEDIA_EDGE, MAX_MEDIA_EDGE))
        } else {
            None
        }
    }

    /// Human readable size, `"?"` when unknown.
    pub fn size_label(&self) -> String {
        self.size.map(format_size).unwrap_or_else(|| "?".into())
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    let b = bytes as f64;
    if bytes < KB {
        format!("{}B", bytes)
    } else if bytes < 100 * KB {
        format!("{:.2}KB", b / KB as f64)
    } else if bytes < MB {
        format!("{:.1}KB", b / KB as f64)
    } else if bytes < 100 * MB {
        format!("{:.2}MB", b / MB as f64)
    } else {
        format!("{:.1}MB", b / MB as f64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Emoji {
    pub name: Option<String>,
    pub id: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub emoji: Emoji,
    pub count: u32,
}

// -- Transcript --

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: Snowflake,
    pub name: String,
    pub icon: Option<String>,
}

impl Server {
    pub fn icon_url(&self) -> Option<String> {
        self.icon
            .as_ref()
            .map(|icon| format!("{}/icons/{}/{}.png", CDN_BASE, self.id, icon))
    }
}

/// An archived ticket conversation, as handed to the view.
///
/// `messages` is the first page only, newest first. Older messages are
/// paged in on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub server: Server,
    pub channel_name: String,
    pub messages: Vec<Message>,
    pub roster: Roster,
    pub message_count: u64,
    /// Name of whoever queued the transcription. Present while the
    /// transcriber is still appending messages.
    pub queued_by: Option<String>,
    /// Prior contributors from the originating ticket, as `username\#tag`.
    #[serde(default)]
    pub contributors: Vec<String>,
}

impl Transcript {
    pub fn in_progress(&self) -> bool {
        self.queued_by.is_some()
    }

    /// The held messages oldest first.
    pub fn chronological(&self) -> Vec<Message> {
        let mut messages = self.messages.clone();
        messages.sort_by(|a, b| a.id.cmp(&b.id));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(s: &str) -> Snowflake {
        Snowflake::parse(s).unwrap()
    }

    #[test]
    fn placeholder_user_falls_back_to_id() {
        let user = User::placeholder(sf("111111111111111111"));
        assert_eq!(user.display_name(), "111111111111111111");
        assert_eq!(user.title(), "???#????");
        assert!(user.name_color().is_none());
        assert!(user.avatar_url().ends_with("unknown.png"));
    }

    #[test]
    fn black_role_color_is_ignored() {
        let mut user = User::placeholder(sf("1"));
        user.role_color = Some("#000000".into());
        assert_eq!(user.name_color(), None);
        user.role_color = Some("#e91e63".into());
        assert_eq!(user.name_color(), Some("#e91e63"));
    }

    #[test]
    fn roster_synthesizes_missing_author() {
        let roster = Roster::default();
        let user = roster.user_or_placeholder(&sf("42"));
        assert_eq!(user, User::placeholder(sf("42")));
    }

    #[test]
    fn attachment_kind_uses_url_path() {
        let mut a = Attachment {
            url: "https://cdn.example.com/a/B.PNG?size=20".into(),
            ..Default::default()
        };
        assert_eq!(a.kind(), AttachmentKind::Image);
        a.url = "https://cdn.example.com/clip.webm".into();
        assert_eq!(a.kind(), AttachmentKind::Video);
        a.url = "https://cdn.example.com/log.txt".into();
        assert_eq!(a.kind(), AttachmentKind::File);
    }

    #[test]
    fn attachment_scaling_keeps_aspect_ratio() {
        let a = Attachment {
            url: "x.png".into(),
            width: Some(1152),
            height: Some(576),
            ..Default::default()
        };
        assert_eq!(a.scaled_size(), Some((576.0, 288.0)));

        let small = Attachment {
            url: "x.png".into(),
            width: Some(100),
            height: Some(50),
            ..Default::default()
        };
        assert_eq!(small.scaled_size(), None);
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(2048), "2.00KB");
        assert_eq!(format_size(200 * 1024), "200.0KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00MB");
        assert_eq!(format_size(200 * 1024 * 1024), "200.0MB");
    }
}
