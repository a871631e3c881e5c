use crate::Database;
use crate::models::{
    MentionRow, MessageRow, TranscriptRow, UserRow, format_timestamp, parse_timestamp, snowflake,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use archive_render::pagination::{Page, PageOutcome};
use archive_render::source::TranscriptSource;
use archive_types::{Channel, Message, Role, Roster, Server, Snowflake, Transcript, User};

impl Database {
    // -- Ingestion --

    pub fn insert_server(&self, server: &Server) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO servers (id, name, icon) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name, icon = excluded.icon",
                rusqlite::params![server.id.as_str(), server.name, server.icon],
            )?;
            Ok(())
        })
    }

    pub fn insert_channel(&self, server_id: &Snowflake, id: &Snowflake, name: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channels (id, server_id, name) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                (id.as_str(), server_id.as_str(), name),
            )?;
            Ok(())
        })
    }

    /// Returns the new transcript's row id.
    pub fn insert_transcript(
        &self,
        slug: &str,
        server_id: &Snowflake,
        channel_id: &Snowflake,
        created_at: DateTime<Utc>,
        queued_by: Option<&str>,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO transcripts (slug, server_id, channel_id, queued_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    slug,
                    server_id.as_str(),
                    channel_id.as_str(),
                    queued_by,
                    format_timestamp(created_at)
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Mark a transcript as being written (`Some`) or finished (`None`).
    /// Returns false if the slug is unknown.
    pub fn set_queued_by(&self, slug: &str, queued_by: Option<&str>) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE transcripts SET queued_by = ?2 WHERE slug = ?1",
                rusqlite::params![slug, queued_by],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn upsert_user(&self, transcript_id: i64, user: &User) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (transcript_id, id, nickname, username, tag, avatar, role_color, bot, verified)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(transcript_id, id) DO UPDATE SET
                    nickname = excluded.nickname,
                    username = excluded.username,
                    tag = excluded.tag,
                    avatar = excluded.avatar,
                    role_color = excluded.role_color,
                    bot = excluded.bot,
                    verified = excluded.verified",
                rusqlite::params![
                    transcript_id,
                    user.id.as_str(),
                    user.nickname,
                    user.username,
                    user.tag,
                    user.avatar,
                    user.role_color,
                    user.bot,
                    user.verified
                ],
            )?;
            Ok(())
        })
    }

    pub fn insert_message(&self, transcript_id: i64, message: &Message) -> Result<()> {
        self.with_conn(|conn| insert_message_row(conn, transcript_id, message))
    }

    /// Insert a batch in one transaction.
    pub fn insert_messages(&self, transcript_id: i64, messages: &[Message]) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for message in messages {
                insert_message_row(&tx, transcript_id, message)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn insert_mentioned_channel(&self, transcript_id: i64, channel: &Channel) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO mentioned_channels (transcript_id, id, name, kind) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![transcript_id, channel.id.as_str(), channel.name, channel.kind],
            )?;
            Ok(())
        })
    }

    pub fn insert_mentioned_role(&self, transcript_id: i64, role: &Role) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO mentioned_roles (transcript_id, id, name, color) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![transcript_id, role.id.as_str(), role.name, role.color],
            )?;
            Ok(())
        })
    }

    pub fn add_contributor(&self, transcript_id: i64, username: &str, tag: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO contributors (transcript_id, username, tag) VALUES (?1, ?2, ?3)",
                (transcript_id, username, tag),
            )?;
            Ok(())
        })
    }

    // -- Reads --

    /// The transcript with its newest `initial_limit` messages (all of them
    /// for `None`), newest first.
    pub fn get_transcript(&self, slug: &str, initial_limit: Option<u32>) -> Result<Option<Transcript>> {
        self.with_conn(|conn| {
            let Some(row) = query_transcript(conn, slug)? else {
                return Ok(None);
            };

            let messages = query_messages(conn, row.id, None, initial_limit)?;
            let message_count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE transcript_id = ?1",
                [row.id],
                |r| r.get(0),
            )?;
            let roster = Roster {
                users: query_users(conn, row.id)?,
                channels: query_mentions(conn, "mentioned_channels", "kind", row.id)?
                    .into_iter()
                    .map(MentionRow::into_channel)
                    .collect::<Result<_>>()?,
                roles: query_mentions(conn, "mentioned_roles", "color", row.id)?
                    .into_iter()
                    .map(MentionRow::into_role)
                    .collect::<Result<_>>()?,
            };
            let contributors = query_contributors(conn, row.id)?;

            let server_id = snowflake(&row.server_id, "server id")
                .with_context(|| format!("Transcript '{}'", row.slug))?;

            Ok(Some(Transcript {
                created_at: parse_timestamp(&row.created_at)
                    .with_context(|| format!("Transcript '{}'", row.slug))?,
                slug: row.slug,
                server: Server {
                    id: server_id,
                    name: row.server_name,
                    icon: row.server_icon,
                },
                channel_name: row.channel_name,
                messages,
                roster,
                message_count: message_count.max(0) as u64,
                queued_by: row.queued_by,
                contributors,
            }))
        })
    }

    /// Up to `limit` messages strictly older than `before`, newest first.
    ///
    /// `None` when the slug is unknown or `before` is not a message of this
    /// transcript. A cursor at the oldest message gives an empty page.
    pub fn get_messages_before(
        &self,
        slug: &str,
        before: Option<&Snowflake>,
        limit: u32,
    ) -> Result<Option<Page>> {
        self.with_conn(|conn| {
            let Some(row) = query_transcript(conn, slug)? else {
                return Ok(None);
            };
            if let Some(cursor) = before {
                let known = conn
                    .query_row(
                        "SELECT 1 FROM messages WHERE transcript_id = ?1 AND id = ?2",
                        rusqlite::params![row.id, cursor.as_str()],
                        |_| Ok(()),
                    )
                    .optional()?;
                if known.is_none() {
                    return Ok(None);
                }
            }

            Ok(Some(Page {
                messages: query_messages(conn, row.id, before, Some(limit))?,
                in_progress: row.queued_by.is_some(),
            }))
        })
    }
}

impl TranscriptSource for Database {
    fn fetch_transcript(&self, slug: &str, initial_limit: Option<u32>) -> Result<Option<Transcript>> {
        self.get_transcript(slug, initial_limit)
    }

    fn fetch_page(&self, slug: &str, before: Option<&Snowflake>, limit: u32) -> Result<PageOutcome> {
        Ok(match self.get_messages_before(slug, before, limit)? {
            Some(page) => PageOutcome::Page(page),
            None => PageOutcome::NotFound,
        })
    }
}

fn insert_message_row(conn: &Connection, transcript_id: i64, message: &Message) -> Result<()> {
    conn.execute(
        "INSERT INTO messages
            (id, transcript_id, author_id, created_at, edited_at, content, embeds, attachments, reactions, reply)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            message.id.as_str(),
            transcript_id,
            message.author_id.as_str(),
            format_timestamp(message.created_at),
            message.edited_at.map(format_timestamp),
            message.content,
            serde_json::to_string(&message.embeds)?,
            serde_json::to_string(&message.attachments)?,
            serde_json::to_string(&message.reactions)?,
            message.reply.as_ref().map(Snowflake::as_str)
        ],
    )?;
    Ok(())
}

fn query_transcript(conn: &Connection, slug: &str) -> Result<Option<TranscriptRow>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.slug, s.id, s.name, s.icon, c.name, t.queued_by, t.created_at
         FROM transcripts t
         JOIN servers s ON t.server_id = s.id
         JOIN channels c ON t.channel_id = c.id
         WHERE t.slug = ?1",
    )?;

    let row = stmt
        .query_row([slug], |row| {
            Ok(TranscriptRow {
                id: row.get(0)?,
                slug: row.get(1)?,
                server_id: row.get(2)?,
                server_name: row.get(3)?,
                server_icon: row.get(4)?,
                channel_name: row.get(5)?,
                queued_by: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_messages(
    conn: &Connection,
    transcript_id: i64,
    before: Option<&Snowflake>,
    limit: Option<u32>,
) -> Result<Vec<Message>> {
    // Numeric snowflake order without casting: shorter ids are older.
    let mut stmt = conn.prepare(
        "SELECT id, author_id, created_at, edited_at, content, embeds, attachments, reactions, reply
         FROM messages
         WHERE transcript_id = ?1
           AND (?2 IS NULL OR length(id) < length(?2) OR (length(id) = length(?2) AND id < ?2))
         ORDER BY length(id) DESC, id DESC
         LIMIT ?3",
    )?;

    // SQLite treats a negative LIMIT as "no limit".
    let limit = limit.map(i64::from).unwrap_or(-1);
    let rows = stmt
        .query_map(
            rusqlite::params![transcript_id, before.map(Snowflake::as_str), limit],
            |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    author_id: row.get(1)?,
                    created_at: row.get(2)?,
                    edited_at: row.get(3)?,
                    content: row.get(4)?,
                    embeds: row.get(5)?,
                    attachments: row.get(6)?,
                    reactions: row.get(7)?,
                    reply: row.get(8)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(MessageRow::into_message).collect()
}

fn query_users(conn: &Connection, transcript_id: i64) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(
        "SELECT id, nickname, username, tag, avatar, role_color, bot, verified
         FROM users WHERE transcript_id = ?1",
    )?;

    let rows = stmt
        .query_map([transcript_id], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                nickname: row.get(1)?,
                username: row.get(2)?,
                tag: row.get(3)?,
                avatar: row.get(4)?,
                role_color: row.get(5)?,
                bot: row.get(6)?,
                verified: row.get(7)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(UserRow::into_user).collect()
}

/// `table` and `extra` are compile-time constants, never user input.
fn query_mentions(
    conn: &Connection,
    table: &'static str,
    extra: &'static str,
    transcript_id: i64,
) -> Result<Vec<MentionRow>> {
    let sql = format!("SELECT id, name, {} FROM {} WHERE transcript_id = ?1", extra, table);
    let mut stmt = conn.prepare(&sql)?;

    let rows = stmt
        .query_map([transcript_id], |row| {
            Ok(MentionRow {
                id: row.get(0)?,
                name: row.get(1)?,
                extra: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Formatted `username\#tag`, ready for the citation's By line.
fn query_contributors(conn: &Connection, transcript_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT username, tag FROM contributors WHERE transcript_id = ?1 ORDER BY rowid",
    )?;

    let rows = stmt
        .query_map([transcript_id], |row| {
            let username: String = row.get(0)?;
            let tag: String = row.get(1)?;
            Ok(format!("{}\\#{}", username, tag))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archive_render::pagination::{LoadOutcome, SessionError, TranscriptSession};
    use archive_render::source::open_transcript;
    use chrono::TimeZone;

    const SERVER: &str = "100000000000000000";
    const CHANNEL: &str = "200000000000000000";

    fn sf(s: &str) -> Snowflake {
        Snowflake::parse(s).unwrap()
    }

    fn message(id: u64, author: &str, content: &str) -> Message {
        Message {
            id: sf(&id.to_string()),
            author_id: sf(author),
            created_at: Utc.timestamp_opt(1_650_000_000 + id as i64, 0).unwrap(),
            edited_at: None,
            content: content.into(),
            embeds: vec![],
            attachments: vec![],
            reactions: vec![],
            reply: None,
        }
    }

    /// Transcript "t" with messages 95..=105: ids cross a digit boundary so
    /// ordering must be numeric, not lexical.
    fn seeded(queued_by: Option<&str>) -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        db.insert_server(&Server {
            id: sf(SERVER),
            name: "KQM".into(),
            icon: None,
        })
        .unwrap();
        db.insert_channel(&sf(SERVER), &sf(CHANNEL), "ticket-0001").unwrap();
        let tid = db
            .insert_transcript(
                "t",
                &sf(SERVER),
                &sf(CHANNEL),
                Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap(),
                queued_by,
            )
            .unwrap();

        let mut alice = User::placeholder(sf("7"));
        alice.username = Some("alice".into());
        alice.tag = Some("0001".into());
        db.upsert_user(tid, &alice).unwrap();

        let messages: Vec<Message> = (95..=105).map(|i| message(i, "7", "hello")).collect();
        db.insert_messages(tid, &messages).unwrap();
        (db, tid)
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.id.to_string()).collect()
    }

    #[test]
    fn transcript_loads_with_roster_and_count() {
        let (db, tid) = seeded(None);
        db.insert_mentioned_channel(
            tid,
            &Channel {
                id: sf("300000000000000000"),
                name: "general".into(),
                kind: Some("text".into()),
            },
        )
        .unwrap();
        db.insert_mentioned_role(
            tid,
            &Role {
                id: sf("400000000000000000"),
                name: "Mods".into(),
                color: Some("#ff0000".into()),
            },
        )
        .unwrap();
        db.add_contributor(tid, "bob", "0002").unwrap();
        db.add_contributor(tid, "bob", "0002").unwrap();

        let t = db.get_transcript("t", Some(4)).unwrap().unwrap();
        assert_eq!(t.channel_name, "ticket-0001");
        assert_eq!(t.message_count, 11);
        assert_eq!(ids(&t.messages), vec!["105", "104", "103", "102"]);
        assert_eq!(t.roster.user("7").and_then(|u| u.username.as_deref()), Some("alice"));
        assert_eq!(t.roster.channel("300000000000000000").map(|c| c.name.as_str()), Some("general"));
        assert_eq!(t.roster.role("400000000000000000").and_then(|r| r.color.as_deref()), Some("#ff0000"));
        assert_eq!(t.contributors, vec!["bob\\#0002".to_string()]);
        assert!(!t.in_progress());

        let all = db.get_transcript("t", None).unwrap().unwrap();
        assert_eq!(all.messages.len(), 11);

        assert!(db.get_transcript("missing", None).unwrap().is_none());
    }

    #[test]
    fn pages_are_strictly_older_than_the_cursor() {
        let (db, _) = seeded(None);
        let page = db.get_messages_before("t", Some(&sf("100")), 3).unwrap().unwrap();
        assert_eq!(ids(&page.messages), vec!["99", "98", "97"]);
        assert!(!page.in_progress);

        let newest = db.get_messages_before("t", None, 2).unwrap().unwrap();
        assert_eq!(ids(&newest.messages), vec!["105", "104"]);
    }

    #[test]
    fn cursor_at_oldest_message_gives_empty_page() {
        let (db, _) = seeded(None);
        let page = db.get_messages_before("t", Some(&sf("95")), 100).unwrap().unwrap();
        assert!(page.messages.is_empty());
    }

    #[test]
    fn unknown_cursor_or_slug_is_not_found() {
        let (db, _) = seeded(None);
        assert!(db.get_messages_before("t", Some(&sf("1")), 10).unwrap().is_none());
        assert!(db.get_messages_before("nope", None, 10).unwrap().is_none());
        assert_eq!(
            db.fetch_page("t", Some(&sf("1")), 10).unwrap(),
            PageOutcome::NotFound
        );
    }

    #[test]
    fn in_progress_flag_follows_queue_state() {
        let (db, _) = seeded(Some("transcriber"));
        let page = db.get_messages_before("t", Some(&sf("95")), 10).unwrap().unwrap();
        assert!(page.in_progress);

        assert!(db.set_queued_by("t", None).unwrap());
        assert!(!db.set_queued_by("missing", None).unwrap());
        let page = db.get_messages_before("t", Some(&sf("95")), 10).unwrap().unwrap();
        assert!(!page.in_progress);
    }

    #[test]
    fn session_drains_the_database() {
        let (db, _) = seeded(None);
        let transcript = db.fetch_transcript("t", Some(5)).unwrap().unwrap();
        let mut session = TranscriptSession::with_page_size(&transcript, 4);
        assert!(session.has_more());

        let mut pages = 0;
        while session.has_more() {
            if let LoadOutcome::Appended(_) = session.load_more(&db).unwrap() {
                pages += 1;
            }
        }
        assert_eq!(pages, 2);
        assert_eq!(session.messages().len(), 11);
    }

    #[test]
    fn corrupt_rows_fail_the_page_instead_of_shrinking_it() {
        let (db, _) = seeded(None);
        let transcript = db.fetch_transcript("t", Some(4)).unwrap().unwrap();
        let mut session = TranscriptSession::with_page_size(&transcript, 4);

        // The whole next page (98..=101) is unreadable; 95..=97 are fine.
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE messages SET author_id = 'x' WHERE id IN ('98', '99', '100', '101')",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        assert!(db.get_messages_before("t", Some(&sf("102")), 4).is_err());
        assert!(matches!(session.load_more(&db), Err(SessionError::Source(_))));
        assert!(session.has_more());
        assert!(!session.is_loading());
        assert_eq!(session.messages().len(), 4);
    }

    #[test]
    fn corrupt_transcript_timestamp_is_not_found() {
        let (db, _) = seeded(None);
        db.with_conn(|conn| {
            conn.execute("UPDATE transcripts SET created_at = 'garbage' WHERE slug = 't'", [])?;
            Ok(())
        })
        .unwrap();

        assert!(db.get_transcript("t", None).is_err());
        assert!(open_transcript(&db, "t", None).is_none());
    }

    #[test]
    fn message_payloads_roundtrip() {
        let (db, tid) = seeded(None);
        let mut m = message(1000, "7", "with extras");
        m.edited_at = Some(Utc.with_ymd_and_hms(2022, 7, 1, 0, 0, 0).unwrap());
        m.reply = Some(sf("99"));
        m.attachments = vec![archive_types::Attachment {
            name: Some("clip.mp4".into()),
            url: "https://cdn.example.com/clip.mp4".into(),
            size: Some(1024),
            ..Default::default()
        }];
        db.insert_message(tid, &m).unwrap();

        let t = db.get_transcript("t", Some(1)).unwrap().unwrap();
        assert_eq!(t.messages, vec![m]);
    }
}
