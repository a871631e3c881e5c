use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS servers (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            icon        TEXT
        );

        CREATE TABLE IF NOT EXISTS channels (
            id          TEXT PRIMARY KEY,
            server_id   TEXT NOT NULL REFERENCES servers(id),
            name        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS transcripts (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            slug        TEXT NOT NULL UNIQUE,
            server_id   TEXT NOT NULL REFERENCES servers(id),
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            queued_by   TEXT,
            created_at  TEXT NOT NULL
        );

        -- Roster snapshot per transcript: nicknames and colors as they were
        -- when the ticket was archived.
        CREATE TABLE IF NOT EXISTS users (
            transcript_id   INTEGER NOT NULL REFERENCES transcripts(id),
            id              TEXT NOT NULL,
            nickname        TEXT,
            username        TEXT,
            tag             TEXT,
            avatar          TEXT,
            role_color      TEXT,
            bot             INTEGER,
            verified        INTEGER,
            PRIMARY KEY (transcript_id, id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            transcript_id   INTEGER NOT NULL REFERENCES transcripts(id),
            author_id       TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            edited_at       TEXT,
            content         TEXT NOT NULL DEFAULT '',
            embeds          TEXT NOT NULL DEFAULT '[]',
            attachments     TEXT NOT NULL DEFAULT '[]',
            reactions       TEXT NOT NULL DEFAULT '[]',
            reply           TEXT
        );

        -- Snowflakes are compared as numbers: shorter id sorts first.
        CREATE INDEX IF NOT EXISTS idx_messages_transcript
            ON messages(transcript_id, length(id), id);

        CREATE TABLE IF NOT EXISTS mentioned_channels (
            transcript_id   INTEGER NOT NULL REFERENCES transcripts(id),
            id              TEXT NOT NULL,
            name            TEXT NOT NULL,
            kind            TEXT,
            PRIMARY KEY (transcript_id, id)
        );

        CREATE TABLE IF NOT EXISTS mentioned_roles (
            transcript_id   INTEGER NOT NULL REFERENCES transcripts(id),
            id              TEXT NOT NULL,
            name            TEXT NOT NULL,
            color           TEXT,
            PRIMARY KEY (transcript_id, id)
        );

        CREATE TABLE IF NOT EXISTS contributors (
            transcript_id   INTEGER NOT NULL REFERENCES transcripts(id),
            username        TEXT NOT NULL,
            tag             TEXT NOT NULL,
            PRIMARY KEY (transcript_id, username, tag)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
