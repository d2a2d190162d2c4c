//! SQLite-based mirror storage

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use rusqlite_migration::{M, Migrations};

use super::traits::{LocalChange, MailStore};
use crate::models::{HistoryId, Message, MessageId, Watermark};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Sync cursor per account
            CREATE TABLE watermarks (
                account_id TEXT PRIMARY KEY,
                history_id TEXT,
                updated_at TEXT NOT NULL
            );

            -- Mirrored inbox messages
            CREATE TABLE messages (
                account_id TEXT NOT NULL,
                id TEXT NOT NULL,
                subject TEXT NOT NULL,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                received_at TEXT NOT NULL,
                snippet TEXT NOT NULL,
                is_starred INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (account_id, id)
            );

            CREATE INDEX idx_messages_received_at
                ON messages(account_id, received_at DESC);
            "#,
        ),
    ])
}

const MESSAGE_COLUMNS: &str = "id, subject, sender, recipient, received_at, snippet, is_starred";

/// SQLite-based mirror storage
///
/// A single connection behind a mutex; every page commit is one transaction.
pub struct SqliteMailStore {
    conn: Mutex<Connection>,
}

impl SqliteMailStore {
    /// Open (or create) the database at `db_path` and run migrations
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL keeps readers (the serving layer) unblocked while a page commits.
        // NORMAL sync is safe under WAL.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection mutex poisoned"))
    }

    /// Apply one change inside an open transaction; returns 1 if a row was created
    fn apply_change(tx: &Transaction<'_>, account_id: &str, change: LocalChange) -> Result<usize> {
        let created = match change {
            LocalChange::Insert(message) => tx.execute(
                "INSERT OR IGNORE INTO messages
                 (account_id, id, subject, sender, recipient, received_at, snippet, is_starred)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    account_id,
                    message.id.as_str(),
                    message.subject,
                    message.sender,
                    message.recipient,
                    message.received_at.to_rfc3339(),
                    message.snippet,
                    message.is_starred,
                ],
            )?,
            LocalChange::Delete(id) => {
                tx.execute(
                    "DELETE FROM messages WHERE account_id = ? AND id = ?",
                    params![account_id, id.as_str()],
                )?;
                0
            }
            LocalChange::SetStarred(id, starred) => {
                tx.execute(
                    "UPDATE messages SET is_starred = ? WHERE account_id = ? AND id = ?",
                    params![starred, account_id, id.as_str()],
                )?;
                0
            }
        };
        Ok(created)
    }

    fn write_watermark(conn: &Connection, watermark: &Watermark) -> Result<()> {
        conn.execute(
            "INSERT INTO watermarks (account_id, history_id, updated_at)
             VALUES (?, ?, ?)
             ON CONFLICT(account_id) DO UPDATE SET
                history_id = excluded.history_id,
                updated_at = excluded.updated_at",
            params![
                watermark.account_id,
                watermark.history_id.as_ref().map(HistoryId::as_str),
                watermark.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    let received_at: String = row.get(4)?;
    Ok(Message {
        id: MessageId::new(row.get::<_, String>(0)?),
        subject: row.get(1)?,
        sender: row.get(2)?,
        recipient: row.get(3)?,
        received_at: parse_timestamp(&received_at),
        snippet: row.get(5)?,
        is_starred: row.get(6)?,
    })
}

impl MailStore for SqliteMailStore {
    fn commit_page(
        &self,
        account_id: &str,
        changes: Vec<LocalChange>,
        checkpoint: Option<Watermark>,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut created = 0;
        for change in changes {
            created += Self::apply_change(&tx, account_id, change)?;
        }

        if let Some(watermark) = &checkpoint {
            Self::write_watermark(&tx, watermark)?;
        }

        tx.commit().context("Failed to commit page")?;
        Ok(created)
    }

    fn has_message(&self, account_id: &str, id: &MessageId) -> Result<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM messages WHERE account_id = ? AND id = ?)",
            params![account_id, id.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn get_message(&self, account_id: &str, id: &MessageId) -> Result<Option<Message>> {
        let conn = self.conn()?;
        let message = conn
            .query_row(
                &format!(
                    "SELECT {} FROM messages WHERE account_id = ? AND id = ?",
                    MESSAGE_COLUMNS
                ),
                params![account_id, id.as_str()],
                message_from_row,
            )
            .optional()?;
        Ok(message)
    }

    fn list_messages(&self, account_id: &str, limit: usize, offset: usize) -> Result<Vec<Message>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE account_id = ?
             ORDER BY received_at DESC, id LIMIT ? OFFSET ?",
            MESSAGE_COLUMNS
        ))?;

        let messages = stmt
            .query_map(
                params![account_id, limit as i64, offset as i64],
                message_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }

    fn list_message_ids(&self, account_id: &str) -> Result<Vec<MessageId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id FROM messages WHERE account_id = ? ORDER BY id")?;
        let ids = stmt
            .query_map([account_id], |row| row.get::<_, String>(0))?
            .map(|id| id.map(MessageId::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    fn count_messages(&self, account_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE account_id = ?",
            [account_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn get_watermark(&self, account_id: &str) -> Result<Option<Watermark>> {
        let conn = self.conn()?;
        let row: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT account_id, history_id, updated_at FROM watermarks WHERE account_id = ?",
                [account_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        Ok(row.map(|(account_id, history_id, updated_at)| Watermark {
            account_id,
            history_id: history_id.map(HistoryId::new),
            updated_at: parse_timestamp(&updated_at),
        }))
    }

    fn save_watermark(&self, watermark: Watermark) -> Result<()> {
        let conn = self.conn()?;
        Self::write_watermark(&conn, &watermark)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "DELETE FROM messages;
             DELETE FROM watermarks;",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const ACCOUNT: &str = "user@gmail.com";

    fn create_test_store() -> (SqliteMailStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        // Use .test.sqlite extension to clearly distinguish from production databases
        let db_path = dir.path().join("mirror.test.sqlite");
        let store = SqliteMailStore::new(&db_path).unwrap();
        (store, dir)
    }

    fn make_test_message(id: &str, hours_ago: i64) -> Message {
        Message::builder(MessageId::new(id))
            .subject(format!("Subject {}", id))
            .sender("sender@example.com")
            .recipient("me@example.com")
            .snippet("Test snippet")
            .received_at(Utc::now() - chrono::Duration::hours(hours_ago))
            .build()
    }

    #[test]
    fn test_insert_is_idempotent() {
        let (store, _dir) = create_test_store();

        assert!(store.insert_message(ACCOUNT, make_test_message("m1", 1)).unwrap());
        assert!(!store.insert_message(ACCOUNT, make_test_message("m1", 1)).unwrap());
        assert_eq!(store.count_messages(ACCOUNT).unwrap(), 1);
    }

    #[test]
    fn test_insert_does_not_overwrite() {
        let (store, _dir) = create_test_store();

        let mut original = make_test_message("m1", 1);
        original.is_starred = true;
        store.insert_message(ACCOUNT, original).unwrap();
        store.insert_message(ACCOUNT, make_test_message("m1", 1)).unwrap();

        let stored = store.get_message(ACCOUNT, &MessageId::new("m1")).unwrap().unwrap();
        assert!(stored.is_starred);
    }

    #[test]
    fn test_message_round_trip() {
        let (store, _dir) = create_test_store();
        let message = make_test_message("m1", 2);
        store.insert_message(ACCOUNT, message.clone()).unwrap();

        let stored = store.get_message(ACCOUNT, &MessageId::new("m1")).unwrap().unwrap();
        assert_eq!(stored.subject, message.subject);
        assert_eq!(stored.sender, message.sender);
        assert_eq!(stored.recipient, message.recipient);
        assert_eq!(stored.snippet, message.snippet);
        assert_eq!(stored.received_at.timestamp(), message.received_at.timestamp());
        assert!(store.get_message(ACCOUNT, &MessageId::new("m2")).unwrap().is_none());
    }

    #[test]
    fn test_accounts_are_isolated() {
        let (store, _dir) = create_test_store();
        store.insert_message(ACCOUNT, make_test_message("m1", 1)).unwrap();
        store.insert_message("other@gmail.com", make_test_message("m1", 1)).unwrap();

        store.delete_message("other@gmail.com", &MessageId::new("m1")).unwrap();

        assert!(store.has_message(ACCOUNT, &MessageId::new("m1")).unwrap());
        assert_eq!(store.count_messages("other@gmail.com").unwrap(), 0);
    }

    #[test]
    fn test_commit_page_applies_in_order() {
        let (store, _dir) = create_test_store();
        store.insert_message(ACCOUNT, make_test_message("m1", 1)).unwrap();

        let created = store
            .commit_page(
                ACCOUNT,
                vec![
                    LocalChange::Delete(MessageId::new("m1")),
                    LocalChange::Insert(make_test_message("m1", 1)),
                    LocalChange::Insert(make_test_message("m2", 1)),
                    LocalChange::SetStarred(MessageId::new("m2"), true),
                    LocalChange::Delete(MessageId::new("missing")),
                ],
                Some(Watermark::new(ACCOUNT, "500")),
            )
            .unwrap();

        assert_eq!(created, 2);
        assert!(store.has_message(ACCOUNT, &MessageId::new("m1")).unwrap());
        assert!(
            store
                .get_message(ACCOUNT, &MessageId::new("m2"))
                .unwrap()
                .unwrap()
                .is_starred
        );

        let watermark = store.get_watermark(ACCOUNT).unwrap().unwrap();
        assert_eq!(watermark.history_id, Some(HistoryId::new("500")));
    }

    #[test]
    fn test_set_starred_on_missing_message_is_noop() {
        let (store, _dir) = create_test_store();
        store.set_starred(ACCOUNT, &MessageId::new("ghost"), true).unwrap();
        assert_eq!(store.count_messages(ACCOUNT).unwrap(), 0);
    }

    #[test]
    fn test_list_messages_newest_first() {
        let (store, _dir) = create_test_store();
        for (id, age) in [("old", 5), ("new", 1), ("mid", 3)] {
            store.insert_message(ACCOUNT, make_test_message(id, age)).unwrap();
        }

        let listed: Vec<String> = store
            .list_messages(ACCOUNT, 10, 0)
            .unwrap()
            .into_iter()
            .map(|m| m.id.0)
            .collect();
        assert_eq!(listed, vec!["new", "mid", "old"]);

        assert_eq!(store.list_messages(ACCOUNT, 1, 1).unwrap()[0].id.as_str(), "mid");
        assert_eq!(
            store.list_message_ids(ACCOUNT).unwrap(),
            vec![MessageId::new("mid"), MessageId::new("new"), MessageId::new("old")]
        );
    }

    #[test]
    fn test_watermark_upsert() {
        let (store, _dir) = create_test_store();

        assert!(store.get_watermark(ACCOUNT).unwrap().is_none());

        store.save_watermark(Watermark::unsynced(ACCOUNT)).unwrap();
        let stored = store.get_watermark(ACCOUNT).unwrap().unwrap();
        assert!(stored.history_id.is_none());

        store.save_watermark(Watermark::new(ACCOUNT, "12345")).unwrap();
        store.save_watermark(Watermark::new("other@gmail.com", "1")).unwrap();

        let stored = store.get_watermark(ACCOUNT).unwrap().unwrap();
        assert_eq!(stored.history_id, Some(HistoryId::new("12345")));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("mirror.test.sqlite");

        {
            let store = SqliteMailStore::new(&db_path).unwrap();
            store
                .commit_page(
                    ACCOUNT,
                    vec![LocalChange::Insert(make_test_message("m1", 1))],
                    Some(Watermark::new(ACCOUNT, "42")),
                )
                .unwrap();
        }

        let store = SqliteMailStore::new(&db_path).unwrap();
        assert!(store.has_message(ACCOUNT, &MessageId::new("m1")).unwrap());
        assert_eq!(
            store.get_watermark(ACCOUNT).unwrap().unwrap().history_id,
            Some(HistoryId::new("42"))
        );
    }

    #[test]
    fn test_clear() {
        let store = SqliteMailStore::open_in_memory().unwrap();
        store.insert_message(ACCOUNT, make_test_message("m1", 1)).unwrap();
        store.save_watermark(Watermark::new(ACCOUNT, "1")).unwrap();

        store.clear().unwrap();
        assert_eq!(store.count_messages(ACCOUNT).unwrap(), 0);
        assert!(store.get_watermark(ACCOUNT).unwrap().is_none());
    }
}
