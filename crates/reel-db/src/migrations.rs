use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                created_at  INTEGER NOT NULL
            );

            CREATE TABLE follows (
                follower_id INTEGER NOT NULL REFERENCES users(id),
                followee_id INTEGER NOT NULL REFERENCES users(id),
                created_at  INTEGER NOT NULL,
                PRIMARY KEY (follower_id, followee_id),
                CHECK (follower_id != followee_id)
            );

            CREATE INDEX idx_follows_followee
                ON follows(followee_id);

            CREATE TABLE videos (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                author_id   INTEGER NOT NULL REFERENCES users(id),
                title       TEXT NOT NULL,
                video_path  TEXT NOT NULL DEFAULT '',
                cover_path  TEXT,
                status      TEXT NOT NULL DEFAULT 'pending',
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX idx_videos_created
                ON videos(status, created_at);

            CREATE INDEX idx_videos_author
                ON videos(author_id, created_at);

            CREATE TABLE messages (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                from_user_id  INTEGER NOT NULL REFERENCES users(id),
                to_user_id    INTEGER NOT NULL REFERENCES users(id),
                content       TEXT NOT NULL,
                created_at    INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_pair
                ON messages(from_user_id, to_user_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
