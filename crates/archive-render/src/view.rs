use std::collections::HashMap;

use archive_types::api::{RenderedEmbed, RenderedGroup, RenderedMessage, RenderedTranscript, ReplyPreview};
use archive_types::{Message, Roster, Snowflake, Transcript};

use crate::grouping::{GroupingOptions, MessageGroup, group_messages};
use crate::mentions::resolve_mentions;
use crate::pagination::TranscriptSession;

/// Group and resolve everything the session currently holds.
pub fn render_transcript(
    transcript: &Transcript,
    session: &TranscriptSession,
    options: GroupingOptions,
) -> RenderedTranscript {
    let messages = session.chronological();
    let groups = group_messages(&messages, &transcript.roster, options);

    RenderedTranscript {
        slug: transcript.slug.clone(),
        server_name: transcript.server.name.clone(),
        server_icon: transcript.server.icon_url(),
        channel_name: transcript.channel_name.clone(),
        message_count: session.message_count(),
        in_progress: session.in_progress(),
        has_more: session.has_more(),
        groups: render_groups(&groups, &messages, &transcript.roster),
    }
}

/// `held` is every loaded message, used to resolve reply targets.
pub fn render_groups(groups: &[MessageGroup], held: &[Message], roster: &Roster) -> Vec<RenderedGroup> {
    let by_id: HashMap<&Snowflake, &Message> = held.iter().map(|m| (&m.id, m)).collect();

    groups
        .iter()
        .map(|group| RenderedGroup {
            display_name: group.author.display_name().to_string(),
            title: group.author.title(),
            color: group.author.name_color().map(str::to_string),
            avatar_url: group.author.avatar_url(),
            reply: group
                .first()
                .reply
                .as_ref()
                .map(|target| reply_preview(target, by_id.get(target).copied(), roster)),
            messages: group.messages.iter().map(|m| render_message(m, roster)).collect(),
            author: group.author.clone(),
        })
        .collect()
}

pub fn render_message(message: &Message, roster: &Roster) -> RenderedMessage {
    RenderedMessage {
        id: message.id.clone(),
        created_at: message.created_at,
        edited_at: message.edited_at,
        chunks: resolve_mentions(&message.content, roster),
        embeds: message
            .embeds
            .iter()
            .map(|embed| RenderedEmbed {
                description: resolve_mentions(embed.description.as_deref().unwrap_or_default(), roster),
                embed: embed.clone(),
            })
            .collect(),
        attachments: message.attachments.clone(),
        reactions: message.reactions.clone(),
    }
}

/// One-line preview of a reply target. The target may have been paged out or
/// deleted, in which case only the id is known.
pub fn reply_preview(id: &Snowflake, target: Option<&Message>, roster: &Roster) -> ReplyPreview {
    match target {
        Some(message) => ReplyPreview {
            id: id.clone(),
            author: Some(roster.user_or_placeholder(&message.author_id)),
            chunks: resolve_mentions(message.content.lines().next().unwrap_or_default(), roster),
        },
        None => ReplyPreview {
            id: id.clone(),
            author: None,
            chunks: vec![],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_types::api::Chunk;
    use archive_types::{Server, User};
    use chrono::{TimeZone, Utc};

    fn sf(s: &str) -> Snowflake {
        Snowflake::parse(s).unwrap()
    }

    fn msg(id: &str, author: &str, content: &str, reply: Option<&str>) -> Message {
        Message {
            id: sf(id),
            author_id: sf(author),
            created_at: Utc.timestamp_opt(1_650_000_000, 0).unwrap(),
            edited_at: None,
            content: content.into(),
            embeds: vec![],
            attachments: vec![],
            reactions: vec![],
            reply: reply.map(sf),
        }
    }

    fn transcript(messages: Vec<Message>) -> Transcript {
        let mut ann = User::placeholder(sf("111111111111111111"));
        ann.nickname = Some("Ann".into());
        ann.role_color = Some("#000000".into());
        Transcript {
            slug: "s".into(),
            created_at: Utc.timestamp_opt(1_650_000_000, 0).unwrap(),
            server: Server {
                id: sf("9"),
                name: "KQM".into(),
                icon: Some("abc".into()),
            },
            channel_name: "ticket-1".into(),
            message_count: messages.len() as u64,
            messages,
            roster: Roster {
                users: vec![ann],
                ..Default::default()
            },
            queued_by: None,
            contributors: vec![],
        }
    }

    #[test]
    fn renders_groups_replies_and_mentions() {
        // Newest first, the way the first page arrives.
        let t = transcript(vec![
            msg("4", "111111111111111111", "ok", Some("404")),
            msg("3", "111111111111111111", "yes\nsecond line", Some("1")),
            msg("2", "111111111111111111", "more", None),
            msg("1", "222222222222222222", "hey <@111111111111111111>\nline two", None),
        ]);
        let session = TranscriptSession::new(&t);
        let rendered = render_transcript(&t, &session, GroupingOptions::default());

        assert!(!rendered.has_more);
        assert_eq!(rendered.server_icon.as_deref(), Some("https://cdn.discordapp.com/icons/9/abc.png"));
        assert_eq!(rendered.groups.len(), 4);

        let stranger = &rendered.groups[0];
        assert_eq!(stranger.display_name, "222222222222222222");
        assert!(stranger.reply.is_none());
        assert!(matches!(&stranger.messages[0].chunks[1], Chunk::Mention(m) if m.name == "Ann"));

        let ann = &rendered.groups[1];
        assert_eq!(ann.display_name, "Ann");
        assert_eq!(ann.color, None);

        let reply = rendered.groups[2].reply.as_ref().unwrap();
        assert_eq!(reply.id, "1");
        assert_eq!(reply.author.as_ref().map(|u| u.id.as_str()), Some("222222222222222222"));
        assert_eq!(reply.chunks.len(), 2, "only the first line is previewed");

        let missing = rendered.groups[3].reply.as_ref().unwrap();
        assert!(missing.author.is_none());
        assert!(missing.chunks.is_empty());
    }
}
