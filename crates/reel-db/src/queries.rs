use crate::Database;
use crate::models::{MessageRow, UserRow, VideoRow, VideoStatus};
use anyhow::Result;
use rusqlite::{Row, params_from_iter};

/// Upper bound on bound parameters per statement. SQLite builds since 3.32
/// accept 32766; a little headroom is kept for the non-list parameters.
const MAX_BATCH_PARAMS: usize = 32_000;

const USER_COLUMNS: &str = "u.id, u.username, u.password, u.created_at";
const VIDEO_COLUMNS: &str = "id, author_id, title, video_path, cover_path, status, created_at";
const MESSAGE_COLUMNS: &str = "id, from_user_id, to_user_id, content, created_at";

impl Database {
    // -- Users --

    /// Inserts a user and returns its generated id, or `None` when the
    /// username is already taken.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        created_at: i64,
    ) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password, created_at) VALUES (?1, ?2, ?3)",
                (username, password_hash, created_at),
            );
            match inserted {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(rusqlite::Error::SqliteFailure(err, _))
                    if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(None)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users u WHERE u.username = ?1", USER_COLUMNS);
            conn.query_row(&sql, [username], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM users u WHERE u.id = ?1", USER_COLUMNS);
            conn.query_row(&sql, [id], user_from_row).optional()
        })
    }

    /// Batch-fetch users by id. Unknown ids are skipped; order is by id.
    pub fn get_users_by_ids(&self, ids: &[i64]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut users = Vec::with_capacity(ids.len());
            for chunk in ids.chunks(MAX_BATCH_PARAMS) {
                let sql = format!(
                    "SELECT {} FROM users u WHERE u.id IN ({}) ORDER BY u.id",
                    USER_COLUMNS,
                    placeholders(1, chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(chunk.iter()), user_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                users.extend(rows);
            }
            Ok(users)
        })
    }

    // -- Follows --

    /// Returns false when the edge already existed.
    pub fn insert_follow(
        &self,
        follower_id: i64,
        followee_id: i64,
        created_at: i64,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO follows (follower_id, followee_id, created_at)
                 VALUES (?1, ?2, ?3)",
                (follower_id, followee_id, created_at),
            )?;
            Ok(changed == 1)
        })
    }

    /// Returns false when there was no edge to remove.
    pub fn delete_follow(&self, follower_id: i64, followee_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
                (follower_id, followee_id),
            )?;
            Ok(changed == 1)
        })
    }

    /// Users `user_id` follows, in the order the edges were created.
    pub fn list_following(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM follows f
                 JOIN users u ON u.id = f.followee_id
                 WHERE f.follower_id = ?1
                 ORDER BY f.rowid",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users following `user_id`, in the order the edges were created.
    pub fn list_followers(&self, user_id: i64) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM follows f
                 JOIN users u ON u.id = f.follower_id
                 WHERE f.followee_id = ?1
                 ORDER BY f.rowid",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// The subset of `candidates` that `follower_id` follows, in edge creation
    /// order. One statement per `MAX_BATCH_PARAMS` candidates.
    pub fn following_among(&self, follower_id: i64, candidates: &[i64]) -> Result<Vec<i64>> {
        if candidates.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut found = Vec::new();
            for chunk in candidates.chunks(MAX_BATCH_PARAMS) {
                let sql = format!(
                    "SELECT followee_id FROM follows
                     WHERE follower_id = ?1 AND followee_id IN ({})
                     ORDER BY rowid",
                    placeholders(2, chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let params = std::iter::once(&follower_id).chain(chunk.iter());
                let ids = stmt
                    .query_map(params_from_iter(params), |row| row.get::<_, i64>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                found.extend(ids);
            }
            Ok(found)
        })
    }

    /// (following, followers) for a user.
    pub fn follow_counts(&self, user_id: i64) -> Result<(i64, i64)> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM follows WHERE follower_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE followee_id = ?1)",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(counts)
        })
    }

    // -- Videos --

    /// Creates a pending video row and returns its generated id. Pending rows
    /// are invisible to feed and publish-list queries.
    pub fn create_pending_video(
        &self,
        author_id: i64,
        title: &str,
        created_at: i64,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO videos (author_id, title, status, created_at) VALUES (?1, ?2, ?3, ?4)",
                (author_id, title, VideoStatus::Pending.as_str(), created_at),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Records where the file landed and makes the video visible.
    pub fn publish_video(&self, id: i64, video_path: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE videos SET video_path = ?2, status = ?3 WHERE id = ?1",
                (id, video_path, VideoStatus::Published.as_str()),
            )?;
            Ok(changed == 1)
        })
    }

    pub fn set_video_cover(&self, id: i64, cover_path: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE videos SET cover_path = ?2 WHERE id = ?1",
                (id, cover_path),
            )?;
            Ok(changed == 1)
        })
    }

    pub fn delete_video(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM videos WHERE id = ?1", [id])?;
            Ok(changed == 1)
        })
    }

    pub fn get_video(&self, id: i64) -> Result<Option<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM videos WHERE id = ?1", VIDEO_COLUMNS);
            conn.query_row(&sql, [id], video_from_row).optional()
        })
    }

    /// Published videos of one author, newest first.
    pub fn list_videos_by_author(&self, author_id: i64) -> Result<Vec<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM videos
                 WHERE author_id = ?1 AND status = ?2
                 ORDER BY created_at DESC, id DESC",
                VIDEO_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((author_id, VideoStatus::Published.as_str()), video_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Published videos created strictly before `cursor`, newest first.
    pub fn list_videos_before(&self, cursor: i64, limit: u32) -> Result<Vec<VideoRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM videos
                 WHERE status = ?1 AND created_at < ?2
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?3",
                VIDEO_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((VideoStatus::Published.as_str(), cursor, limit), video_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(
        &self,
        from_user_id: i64,
        to_user_id: i64,
        content: &str,
        created_at: i64,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (from_user_id, to_user_id, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (from_user_id, to_user_id, content, created_at),
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Messages between two users in both directions, created strictly after
    /// `after`, oldest first.
    pub fn chat_history(&self, a: i64, b: i64, after: i64) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE ((from_user_id = ?1 AND to_user_id = ?2)
                     OR (from_user_id = ?2 AND to_user_id = ?1))
                   AND created_at > ?3
                 ORDER BY created_at, id",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((a, b, after), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Newest message exchanged between two users, in either direction.
    pub fn latest_message(&self, a: i64, b: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages
                 WHERE (from_user_id = ?1 AND to_user_id = ?2)
                    OR (from_user_id = ?2 AND to_user_id = ?1)
                 ORDER BY created_at DESC, id DESC
                 LIMIT 1",
                MESSAGE_COLUMNS
            );
            conn.query_row(&sql, (a, b), message_from_row).optional()
        })
    }

    /// Newest message between `subject` and each of `others`, one row per
    /// counterpart that has any message at all.
    pub fn latest_messages_with(&self, subject: i64, others: &[i64]) -> Result<Vec<MessageRow>> {
        if others.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let mut latest = Vec::with_capacity(others.len());
            for chunk in others.chunks(MAX_BATCH_PARAMS) {
                let list = placeholders(2, chunk.len());
                let sql = format!(
                    "SELECT {cols} FROM (
                        SELECT {cols},
                               ROW_NUMBER() OVER (
                                   PARTITION BY CASE WHEN from_user_id = ?1
                                                     THEN to_user_id ELSE from_user_id END
                                   ORDER BY created_at DESC, id DESC
                               ) AS rn
                        FROM messages
                        WHERE (from_user_id = ?1 AND to_user_id IN ({list}))
                           OR (to_user_id = ?1 AND from_user_id IN ({list}))
                     )
                     WHERE rn = 1",
                    cols = MESSAGE_COLUMNS,
                    list = list
                );
                let mut stmt = conn.prepare(&sql)?;
                let params = std::iter::once(&subject).chain(chunk.iter());
                let rows = stmt
                    .query_map(params_from_iter(params), message_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                latest.extend(rows);
            }
            Ok(latest)
        })
    }
}

/// `?start, ?start+1, ...` for `count` numbered parameters.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn video_from_row(row: &Row<'_>) -> rusqlite::Result<VideoRow> {
    let status: String = row.get(5)?;
    let status = VideoStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown video status '{}'", status).into(),
        )
    })?;

    Ok(VideoRow {
        id: row.get(0)?,
        author_id: row.get(1)?,
        title: row.get(2)?,
        video_path: row.get(3)?,
        cover_path: row.get(4)?,
        status,
        created_at: row.get(6)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        from_user_id: row.get(1)?,
        to_user_id: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
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
    use rusqlite::Connection;

    fn table_count(conn: &Connection, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table);
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    fn db_with_users(names: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|name| db.create_user(name, "hash", 0).unwrap().unwrap())
            .collect();
        (db, ids)
    }

    #[test]
    fn duplicate_username_is_rejected_without_a_write() {
        let (db, _) = db_with_users(&["alice"]);

        assert_eq!(db.create_user("alice", "other", 1).unwrap(), None);
        let users = db.with_conn(|conn| table_count(conn, "users")).unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn follow_edges_show_up_on_both_sides() {
        let (db, ids) = db_with_users(&["a", "b"]);
        let (a, b) = (ids[0], ids[1]);

        assert!(db.insert_follow(a, b, 10).unwrap());
        assert_eq!(db.list_following(a).unwrap()[0].id, b);
        assert_eq!(db.list_followers(b).unwrap()[0].id, a);
        assert!(db.list_followers(a).unwrap().is_empty());

        assert!(db.delete_follow(a, b).unwrap());
        assert!(db.list_following(a).unwrap().is_empty());
        assert!(db.list_followers(b).unwrap().is_empty());
    }

    #[test]
    fn duplicate_follow_is_ignored() {
        let (db, ids) = db_with_users(&["a", "b"]);

        assert!(db.insert_follow(ids[0], ids[1], 1).unwrap());
        assert!(!db.insert_follow(ids[0], ids[1], 2).unwrap());
        assert_eq!(db.follow_counts(ids[0]).unwrap(), (1, 0));
        assert_eq!(db.follow_counts(ids[1]).unwrap(), (0, 1));
    }

    #[test]
    fn following_among_returns_exact_subset() {
        let (db, ids) = db_with_users(&["viewer", "x", "y", "z"]);
        let viewer = ids[0];
        db.insert_follow(viewer, ids[3], 1).unwrap();
        db.insert_follow(viewer, ids[1], 2).unwrap();

        assert!(db.following_among(viewer, &[]).unwrap().is_empty());

        let found = db.following_among(viewer, &[ids[1], ids[2], ids[3], 9_999]).unwrap();
        // edge creation order, not candidate order
        assert_eq!(found, vec![ids[3], ids[1]]);
    }

    #[test]
    fn pending_videos_are_hidden_until_published() {
        let (db, ids) = db_with_users(&["author"]);
        let id = db.create_pending_video(ids[0], "clip", 100).unwrap();

        assert!(db.list_videos_before(i64::MAX, 10).unwrap().is_empty());
        assert!(db.list_videos_by_author(ids[0]).unwrap().is_empty());

        db.publish_video(id, "upload/video/1.mp4").unwrap();
        let feed = db.list_videos_before(i64::MAX, 10).unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].video_path, "upload/video/1.mp4");
        assert_eq!(feed[0].status, VideoStatus::Published);
        assert_eq!(feed[0].cover_path, None);
    }

    #[test]
    fn videos_before_cursor_are_newest_first() {
        let (db, ids) = db_with_users(&["author"]);
        for t in [10, 20, 30, 40] {
            let id = db.create_pending_video(ids[0], &format!("t{}", t), t).unwrap();
            db.publish_video(id, &format!("upload/video/{}.mp4", id)).unwrap();
        }

        let page: Vec<i64> = db
            .list_videos_before(30, 10)
            .unwrap()
            .iter()
            .map(|v| v.created_at)
            .collect();
        assert_eq!(page, vec![20, 10]);

        let limited = db.list_videos_before(i64::MAX, 2).unwrap();
        assert_eq!(limited.iter().map(|v| v.created_at).collect::<Vec<_>>(), vec![40, 30]);
    }

    #[test]
    fn latest_messages_pick_newest_in_either_direction() {
        let (db, ids) = db_with_users(&["me", "f1", "f2", "f3"]);
        let (me, f1, f2, f3) = (ids[0], ids[1], ids[2], ids[3]);
        db.insert_message(me, f1, "hi f1", 1).unwrap();
        db.insert_message(f1, me, "hey back", 5).unwrap();
        db.insert_message(me, f2, "only one", 3).unwrap();
        db.insert_message(f2, f3, "not mine", 9).unwrap();

        let mut latest = db.latest_messages_with(me, &[f1, f2, f3]).unwrap();
        latest.sort_by_key(|m| m.created_at);
        let contents: Vec<&str> = latest.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["only one", "hey back"]);

        let single = db.latest_message(f1, me).unwrap().unwrap();
        assert_eq!(single.content, "hey back");
        assert!(db.latest_message(me, f3).unwrap().is_none());
    }

    #[test]
    fn chat_history_is_after_cursor_and_ascending() {
        let (db, ids) = db_with_users(&["a", "b"]);
        db.insert_message(ids[0], ids[1], "one", 1).unwrap();
        db.insert_message(ids[1], ids[0], "two", 2).unwrap();
        db.insert_message(ids[0], ids[1], "three", 3).unwrap();

        let history = db.chat_history(ids[1], ids[0], 1).unwrap();
        let contents: Vec<&str> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["two", "three"]);
    }
}
