use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, Connection, Result};
use std::path::Path;
use tracing::warn;

use crate::models::{Session, SessionEntry, Topic};
use crate::store::{sort_oldest_first, SessionStore, Store, StoreResult, TopicStore};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS topics (
                user_id TEXT NOT NULL,
                id TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                base_score REAL NOT NULL,
                date_added TEXT NOT NULL,
                last_seen TEXT,
                attempts INTEGER NOT NULL DEFAULT 0,
                successes INTEGER NOT NULL DEFAULT 0,
                rec_scores TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (user_id, id)
            );

            -- Open recommendation sets awaiting feedback
            CREATE TABLE IF NOT EXISTS sessions (
                session_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS session_entries (
                session_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                topic_id TEXT NOT NULL,
                category TEXT NOT NULL,
                PRIMARY KEY (session_id, position),
                FOREIGN KEY (session_id) REFERENCES sessions(session_id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_topics_user ON topics(user_id, ordinal);
            CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
            "#,
        )?;

        Ok(())
    }

    fn read_topic_rows(&self, user_id: &str) -> Result<Vec<TopicRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, name, category, base_score, date_added, last_seen,
                   attempts, successes, rec_scores
            FROM topics
            WHERE user_id = ?1
            ORDER BY ordinal
            "#,
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(TopicRow {
                id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                base_score: row.get(3)?,
                date_added: row.get(4)?,
                last_seen: row.get(5)?,
                attempts: row.get(6)?,
                successes: row.get(7)?,
                rec_scores: row.get(8)?,
            })
        })?;
        rows.collect()
    }

    fn read_session(&self, session_id: &str) -> Result<Option<(String, String)>> {
        let session = self.conn.query_row(
            "SELECT user_id, created_at FROM sessions WHERE session_id = ?1",
            params![session_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        );

        match session {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn read_session_entries(&self, session_id: &str) -> Result<Vec<SessionEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT position, topic_id, category
            FROM session_entries
            WHERE session_id = ?1
            ORDER BY position
            "#,
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            let position: i64 = row.get(0)?;
            Ok(SessionEntry {
                position: position as usize,
                topic_id: row.get(1)?,
                category: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    pub fn count_sessions(&self) -> Result<i64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
    }
}

// Untyped column values; SQLite does not enforce declared types, so every
// conversion happens in `decode` where a bad row can be reported
struct TopicRow {
    id: Value,
    name: Value,
    category: Value,
    base_score: Value,
    date_added: Value,
    last_seen: Value,
    attempts: Value,
    successes: Value,
    rec_scores: Value,
}

impl TopicRow {
    fn decode(self) -> std::result::Result<Topic, String> {
        let date_added = parse_timestamp(&text(self.date_added, "date_added")?)?;
        let last_seen = match self.last_seen {
            Value::Null => None,
            other => Some(parse_timestamp(&text(other, "last_seen")?)?),
        };
        let rec_scores: Vec<f64> = serde_json::from_str(&text(self.rec_scores, "rec_scores")?)
            .map_err(|e| format!("rec_scores: {}", e))?;

        let mut topic = Topic {
            id: text(self.id, "id")?,
            name: text(self.name, "name")?,
            category: text(self.category, "category")?,
            base_score: real(self.base_score, "base_score")?,
            date_added,
            last_seen,
            attempts: count(self.attempts, "attempts")?,
            successes: count(self.successes, "successes")?,
            rec_scores,
        };
        topic.normalize();
        Ok(topic)
    }
}

fn text(value: Value, column: &str) -> std::result::Result<String, String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(format!("{}: expected text, found {}", column, other.data_type())),
    }
}

fn real(value: Value, column: &str) -> std::result::Result<f64, String> {
    match value {
        Value::Real(v) if v.is_finite() => Ok(v),
        Value::Integer(v) => Ok(v as f64),
        other => Err(format!("{}: expected a number, found {}", column, other.data_type())),
    }
}

fn count(value: Value, column: &str) -> std::result::Result<u32, String> {
    match value {
        Value::Integer(v) => u32::try_from(v).map_err(|_| format!("{} out of range: {}", column, v)),
        other => Err(format!("{}: expected an integer, found {}", column, other.data_type())),
    }
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp {:?}: {}", raw, e))
}

impl TopicStore for Database {
    fn load(&self, user_id: &str) -> StoreResult<Vec<Topic>> {
        let rows = self.read_topic_rows(user_id)?;

        let mut topics = Vec::with_capacity(rows.len());
        for (index, row) in rows.into_iter().enumerate() {
            match row.decode() {
                Ok(topic) => topics.push(topic),
                Err(reason) => {
                    warn!(user_id, row = index, %reason, "corrupt topic row, treating collection as empty");
                    return Ok(Vec::new());
                }
            }
        }
        Ok(topics)
    }

    fn save(&self, user_id: &str, topics: &[Topic]) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_topics(&tx, user_id, topics)?;
        tx.commit()?;
        Ok(())
    }
}

fn write_topics(conn: &Connection, user_id: &str, topics: &[Topic]) -> StoreResult<()> {
    conn.execute("DELETE FROM topics WHERE user_id = ?1", params![user_id])?;

    let mut stmt = conn.prepare(
        r#"
        INSERT INTO topics (user_id, id, ordinal, name, category, base_score,
                            date_added, last_seen, attempts, successes, rec_scores)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )?;
    for (ordinal, topic) in topics.iter().enumerate() {
        stmt.execute(params![
            user_id,
            topic.id,
            ordinal as i64,
            topic.name,
            topic.category,
            topic.base_score,
            topic.date_added.to_rfc3339(),
            topic.last_seen.map(|t| t.to_rfc3339()),
            topic.attempts,
            topic.successes,
            serde_json::to_string(&topic.rec_scores)?,
        ])?;
    }
    Ok(())
}

impl SessionStore for Database {
    fn put(&self, session: &Session) -> StoreResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM sessions WHERE session_id = ?1",
            params![session.session_id],
        )?;
        tx.execute(
            "INSERT INTO sessions (session_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![
                session.session_id,
                session.user_id,
                session.created_at.to_rfc3339()
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO session_entries (session_id, position, topic_id, category) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for entry in &session.entries {
                stmt.execute(params![
                    session.session_id,
                    entry.position as i64,
                    entry.topic_id,
                    entry.category
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let Some((user_id, created_at)) = self.read_session(session_id)? else {
            return Ok(None);
        };

        let created_at = match parse_timestamp(&created_at) {
            Ok(ts) => ts,
            Err(reason) => {
                warn!(session_id, %reason, "corrupt session row, treating as absent");
                return Ok(None);
            }
        };

        Ok(Some(Session {
            session_id: session_id.to_string(),
            user_id,
            entries: self.read_session_entries(session_id)?,
            created_at,
        }))
    }

    fn delete(&self, session_id: &str) -> StoreResult<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
        Ok(rows > 0)
    }

    fn list_for_user(&self, user_id: &str) -> StoreResult<Vec<Session>> {
        let headers = {
            let mut stmt = self
                .conn
                .prepare("SELECT session_id, created_at FROM sessions WHERE user_id = ?1")?;
            let rows = stmt.query_map(params![user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<Result<Vec<_>>>()?
        };

        let mut sessions = Vec::with_capacity(headers.len());
        for (session_id, created_at) in headers {
            match parse_timestamp(&created_at) {
                Ok(created_at) => sessions.push(Session {
                    entries: self.read_session_entries(&session_id)?,
                    session_id,
                    user_id: user_id.to_string(),
                    created_at,
                }),
                Err(reason) => {
                    warn!(session_id = %session_id, %reason, "corrupt session row, skipping");
                }
            }
        }
        sort_oldest_first(&mut sessions);
        Ok(sessions)
    }
}

impl Store for Database {
    fn close_session(
        &self,
        user_id: &str,
        topics: Option<&[Topic]>,
        session_id: &str,
    ) -> StoreResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        if let Some(topics) = topics {
            write_topics(&tx, user_id, topics)?;
        }
        let removed = tx.execute("DELETE FROM sessions WHERE session_id = ?1", params![session_id])?;
        tx.commit()?;
        Ok(removed > 0)
    }
}
