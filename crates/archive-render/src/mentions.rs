use once_cell::sync::Lazy;
use regex::Regex;

use archive_types::Roster;
use archive_types::api::{Chunk, Mention, MentionKind};

use crate::color::mention_background;

/// `<#id>` channel, `<@&id>` role, `<@id>` / `<@!id>` user.
static MENTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(#|@&|@!?)(\d{17,19})>").expect("mention regex pattern is valid")
});

/// Lazy chunking of a message body.
///
/// Scans left to right and yields the literal text before each reference,
/// then the resolved reference. Malformed references stay literal. Cloning
/// the iterator restarts from the same position, and the output depends only
/// on the content and the roster.
#[derive(Debug, Clone)]
pub struct Mentions<'a> {
    rest: &'a str,
    roster: &'a Roster,
    queued: Option<Chunk>,
}

impl<'a> Mentions<'a> {
    pub fn new(content: &'a str, roster: &'a Roster) -> Self {
        Self {
            rest: content,
            roster,
            queued: None,
        }
    }
}

impl Iterator for Mentions<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if let Some(chunk) = self.queued.take() {
            return Some(chunk);
        }
        if self.rest.is_empty() {
            return None;
        }

        let Some(caps) = MENTION_RE.captures(self.rest) else {
            let tail = std::mem::take(&mut self.rest);
            return Some(Chunk::text(tail));
        };

        let whole = caps.get_match();
        let prefix = &self.rest[..whole.start()];
        let kind = match &caps[1] {
            "#" => MentionKind::Channel,
            "@&" => MentionKind::Role,
            _ => MentionKind::User,
        };
        let mention = Chunk::Mention(resolve(kind, &caps[2], self.roster));
        self.rest = &self.rest[whole.end()..];

        if prefix.is_empty() {
            Some(mention)
        } else {
            self.queued = Some(mention);
            Some(Chunk::text(prefix))
        }
    }
}

/// Resolve every mention in `content` against `roster`.
pub fn resolve_mentions(content: &str, roster: &Roster) -> Vec<Chunk> {
    Mentions::new(content, roster).collect()
}

fn resolve(kind: MentionKind, id: &str, roster: &Roster) -> Mention {
    let (name, title, color) = match kind {
        MentionKind::Channel => {
            let name = roster.channel(id).map(|c| c.name.clone());
            (name, None, None)
        }
        MentionKind::Role => match roster.role(id) {
            Some(role) => (Some(role.name.clone()), None, role.color.clone()),
            None => (None, None, None),
        },
        MentionKind::User => match roster.user(id) {
            Some(user) => {
                let name = user.nickname.clone().or_else(|| user.username.clone());
                let title = user.username.as_ref().map(|username| match &user.tag {
                    Some(tag) => format!("{}#{}", username, tag),
                    None => username.clone(),
                });
                // Role color stays off user mentions; only role mentions are tinted.
                (name, title, None)
            }
            None => (None, None, None),
        },
    };

    let background = color.as_deref().and_then(mention_background);
    Mention {
        kind,
        sigil: kind.sigil().to_string(),
        id: id.to_string(),
        name: name.unwrap_or_else(|| id.to_string()),
        title: title.unwrap_or_else(|| id.to_string()),
        color,
        background,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_types::{Channel, Role, Snowflake, User};

    const BOB: &str = "111111111111111111";
    const GENERAL: &str = "222222222222222222";
    const MODS: &str = "333333333333333333";

    fn roster() -> Roster {
        let mut bob = User::placeholder(Snowflake::parse(BOB).unwrap());
        bob.nickname = Some("Bob".into());
        bob.username = Some("bobby".into());
        bob.tag = Some("0420".into());
        bob.role_color = Some("#3498db".into());
        Roster {
            users: vec![bob],
            channels: vec![Channel {
                id: Snowflake::parse(GENERAL).unwrap(),
                name: "general".into(),
                kind: None,
            }],
            roles: vec![Role {
                id: Snowflake::parse(MODS).unwrap(),
                name: "Moderators".into(),
                color: Some("#ff0000".into()),
            }],
        }
    }

    fn mention(chunk: &Chunk) -> &Mention {
        match chunk {
            Chunk::Mention(m) => m,
            other => panic!("expected mention, got {:?}", other),
        }
    }

    #[test]
    fn resolves_user_and_channel() {
        let roster = roster();
        let chunks = resolve_mentions(&format!("hi <@{}> see <#{}>", BOB, GENERAL), &roster);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0], Chunk::text("hi "));
        let bob = mention(&chunks[1]);
        assert_eq!((bob.sigil.as_str(), bob.name.as_str()), ("@", "Bob"));
        assert_eq!(bob.title, "bobby#0420");
        assert_eq!(chunks[2], Chunk::text(" see "));
        let general = mention(&chunks[3]);
        assert_eq!((general.sigil.as_str(), general.name.as_str()), ("#", "general"));
    }

    #[test]
    fn user_mentions_are_never_colored() {
        let roster = roster();
        let chunks = resolve_mentions(&format!("<@!{}>", BOB), &roster);
        assert_eq!(chunks.len(), 1);
        let bob = mention(&chunks[0]);
        assert_eq!(bob.kind, MentionKind::User);
        assert_eq!(bob.name, "Bob");
        assert!(bob.color.is_none());
        assert!(bob.background.is_none());
    }

    #[test]
    fn role_mentions_carry_color() {
        let roster = roster();
        let chunks = resolve_mentions(&format!("ping <@&{}>!", MODS), &roster);
        let role = mention(&chunks[1]);
        assert_eq!(role.kind, MentionKind::Role);
        assert_eq!(role.name, "Moderators");
        assert_eq!(role.color.as_deref(), Some("#ff0000"));
        assert!(role.background.is_some());
        assert_eq!(chunks[2], Chunk::text("!"));
    }

    #[test]
    fn unknown_targets_fall_back_to_raw_id() {
        let roster = Roster::default();
        let id = "444444444444444444";
        for (raw, sigil) in [
            (format!("<@{}>", id), "@"),
            (format!("<#{}>", id), "#"),
            (format!("<@&{}>", id), "@"),
        ] {
            let chunks = resolve_mentions(&raw, &roster);
            let m = mention(&chunks[0]);
            assert_eq!(m.sigil, sigil);
            assert_eq!(m.name, id);
            assert_eq!(m.title, id);
            assert!(m.color.is_none());
        }
    }

    #[test]
    fn malformed_references_stay_literal() {
        let roster = roster();
        for raw in [
            "<@1234>",
            "<@12345678901234567890>",
            "<@11111111111111111a>",
            "<!111111111111111111>",
            "@111111111111111111",
        ] {
            assert_eq!(resolve_mentions(raw, &roster), vec![Chunk::text(raw)], "{}", raw);
        }
    }

    #[test]
    fn leftmost_reference_wins_and_scan_continues() {
        let roster = roster();
        let content = format!("<#{}><@{}> and <@{}> end", GENERAL, BOB, BOB);
        let chunks = resolve_mentions(&content, &roster);
        let kinds: Vec<&str> = chunks
            .iter()
            .map(|c| match c {
                Chunk::Text { .. } => "text",
                Chunk::Mention(m) if m.kind == MentionKind::Channel => "channel",
                Chunk::Mention(_) => "user",
            })
            .collect();
        assert_eq!(kinds, vec!["channel", "user", "text", "user", "text"]);
        assert_eq!(chunks[4], Chunk::text(" end"));
    }

    #[test]
    fn empty_and_plain_content() {
        let roster = roster();
        assert!(resolve_mentions("", &roster).is_empty());
        assert_eq!(resolve_mentions("just text", &roster), vec![Chunk::text("just text")]);
    }

    #[test]
    fn resolution_is_deterministic_and_restartable() {
        let roster = roster();
        let content = format!("a <@{}> b <@&{}> c <#{}>", BOB, MODS, GENERAL);
        let first = resolve_mentions(&content, &roster);
        let second = resolve_mentions(&content, &roster);
        assert_eq!(first, second);

        let mut iter = Mentions::new(&content, &roster);
        iter.next();
        let restart = iter.clone();
        assert_eq!(iter.collect::<Vec<_>>(), restart.collect::<Vec<_>>());
    }
}
