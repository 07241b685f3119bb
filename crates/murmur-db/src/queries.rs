use crate::models::{MessageRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const MESSAGE_COLUMNS: &str = "id, sender, recipient, content, created_at, is_read, read_at";

/// Newest stored timestamp. Answered from `idx_messages_created_at`.
const LAST_CREATED_AT: &str = "SELECT MAX(created_at) FROM messages";

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn list_usernames(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT username FROM users ORDER BY username")?;
            let names = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(names)
        })
    }

    // -- Messages --

    /// Append a message. The timestamp is assigned here, under the connection
    /// lock, and is strictly greater than every timestamp already stored.
    pub fn insert_message(&self, sender: &str, recipient: &str, content: &str) -> Result<MessageRow> {
        self.with_conn(|conn| {
            let last: Option<i64> =
                conn.query_row(LAST_CREATED_AT, [], |row| row.get(0))?;
            let now = chrono::Utc::now().timestamp_micros();
            let created_at = match last {
                Some(last) if last >= now => last + 1,
                _ => now,
            };

            conn.execute(
                "INSERT INTO messages (sender, recipient, content, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![sender, recipient, content, created_at],
            )?;

            Ok(MessageRow {
                id: conn.last_insert_rowid(),
                sender: sender.to_string(),
                recipient: recipient.to_string(),
                content: content.to_string(),
                created_at,
                is_read: false,
                read_at: None,
            })
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1");
            conn.query_row(&sql, [id], message_from_row).optional()
        })
    }

    /// Newest `limit` messages exchanged between `a` and `b` (either
    /// direction) created strictly before `before`, returned oldest first.
    pub fn get_conversation(
        &self,
        a: &str,
        b: &str,
        before: Option<i64>,
        limit: u32,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_conversation(conn, a, b, before, limit))
    }

    /// Newest `limit` messages sent or received by `username`, oldest first.
    pub fn get_recent_for_user(&self, username: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE sender = ?1 OR recipient = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map(rusqlite::params![username, limit], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Flag every unread message from `sender` to `recipient` as read.
    /// Returns how many rows changed.
    pub fn mark_read(&self, sender: &str, recipient: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let now = chrono::Utc::now().timestamp_micros();
            let updated = conn.execute(
                "UPDATE messages SET is_read = 1, read_at = ?3
                 WHERE sender = ?1 AND recipient = ?2 AND is_read = 0",
                rusqlite::params![sender, recipient, now],
            )?;
            Ok(updated)
        })
    }

    /// Unread messages addressed to `recipient`, grouped by sender. Notes to
    /// self never count.
    pub fn unread_counts(&self, recipient: &str) -> Result<Vec<(String, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender, COUNT(*) FROM messages
                 WHERE recipient = ?1 AND is_read = 0 AND sender <> recipient
                 GROUP BY sender",
            )?;
            let counts = stmt
                .query_map([recipient], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(counts)
        })
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                created_at: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_conversation(
    conn: &Connection,
    a: &str,
    b: &str,
    before: Option<i64>,
    limit: u32,
) -> Result<Vec<MessageRow>> {
    // Newest first so LIMIT keeps the most recent page, then flipped for the caller
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages
         WHERE ((sender = ?1 AND recipient = ?2) OR (sender = ?2 AND recipient = ?1))
           AND (?3 IS NULL OR created_at < ?3)
         ORDER BY created_at DESC, id DESC
         LIMIT ?4"
    );
    let mut stmt = conn.prepare(&sql)?;

    let mut rows = stmt
        .query_map(rusqlite::params![a, b, before, limit], message_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    rows.reverse();

    Ok(rows)
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender: row.get(1)?,
        recipient: row.get(2)?,
        content: row.get(3)?,
        created_at: row.get(4)?,
        is_read: row.get(5)?,
        read_at: row.get(6)?,
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

    fn db() -> Database {
        Database::open_in_memory().expect("in-memory database")
    }

    #[test]
    fn timestamps_are_strictly_increasing() {
        let db = db();
        let rows: Vec<MessageRow> = (0..20)
            .map(|i| db.insert_message("alice", "bob", &format!("m{i}")).unwrap())
            .collect();

        for pair in rows.windows(2) {
            assert!(pair[0].created_at < pair[1].created_at);
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[test]
    fn conversation_pages_backwards_in_ascending_order() {
        let db = db();
        for i in 0..5 {
            let (from, to) = if i % 2 == 0 { ("alice", "bob") } else { ("bob", "alice") };
            db.insert_message(from, to, &format!("m{i}")).unwrap();
        }
        db.insert_message("alice", "carol", "unrelated").unwrap();

        let page = db.get_conversation("alice", "bob", None, 2).unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4"]);

        let page = db.get_conversation("bob", "alice", Some(page[0].created_at), 2).unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m1", "m2"]);

        let page = db.get_conversation("alice", "bob", Some(page[0].created_at), 2).unwrap();
        let contents: Vec<_> = page.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0"]);
    }

    #[test]
    fn mark_read_only_touches_one_direction() {
        let db = db();
        db.insert_message("alice", "bob", "one").unwrap();
        db.insert_message("alice", "bob", "two").unwrap();
        db.insert_message("carol", "bob", "three").unwrap();
        db.insert_message("bob", "alice", "four").unwrap();

        let mut counts = db.unread_counts("bob").unwrap();
        counts.sort();
        assert_eq!(counts, vec![("alice".to_string(), 2), ("carol".to_string(), 1)]);

        assert_eq!(db.mark_read("alice", "bob").unwrap(), 2);
        assert_eq!(db.mark_read("alice", "bob").unwrap(), 0);

        assert_eq!(db.unread_counts("bob").unwrap(), vec![("carol".to_string(), 1)]);
        assert_eq!(db.unread_counts("alice").unwrap(), vec![("bob".to_string(), 1)]);

        let read = db.get_conversation("alice", "bob", None, 10).unwrap();
        for row in read.iter().filter(|r| r.sender == "alice") {
            assert!(row.is_read);
            assert!(row.read_at.is_some());
        }
    }

    #[test]
    fn recent_for_user_keeps_newest_and_replays_oldest_first() {
        let db = db();
        for i in 0..4 {
            db.insert_message("alice", "bob", &format!("m{i}")).unwrap();
        }
        db.insert_message("carol", "dave", "elsewhere").unwrap();

        let rows = db.get_recent_for_user("bob", 3).unwrap();
        let contents: Vec<_> = rows.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m1", "m2", "m3"]);
    }

    #[test]
    fn users_are_unique_and_listed_sorted() {
        let db = db();
        db.create_user("2", "zed", "hash").unwrap();
        db.create_user("1", "amy", "hash").unwrap();
        assert!(db.create_user("3", "amy", "hash").is_err());

        assert_eq!(db.list_usernames().unwrap(), ["amy", "zed"]);
        assert!(db.get_user_by_username("amy").unwrap().is_some());
        assert!(db.get_user_by_username("nobody").unwrap().is_none());
        assert!(db.get_message(42).unwrap().is_none());
    }

    #[test]
    fn notes_to_self_are_not_unread() {
        let db = db();
        db.insert_message("alice", "alice", "note").unwrap();
        db.insert_message("bob", "alice", "hi").unwrap();

        assert_eq!(db.unread_counts("alice").unwrap(), vec![("bob".to_string(), 1)]);
    }

    #[test]
    fn last_timestamp_lookup_uses_the_created_at_index() {
        let db = db();
        let plan = db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {LAST_CREATED_AT}"))?;
                let details = stmt
                    .query_map([], |row| row.get::<_, String>(3))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(details.join("\n"))
            })
            .unwrap();

        assert!(plan.contains("idx_messages_created_at"), "plan: {plan}");
    }
}
