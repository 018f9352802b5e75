use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use courier_core::ids::{MessageId, UserId};
use courier_core::message::MessageKind;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// A stored message row. Immutable once created except the `read` flag,
/// whose only transition is false -> true via `mark_read_up_to`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    pub created_at: String,
    pub read: bool,
}

impl MessageRow {
    /// Wall-clock label (`%H:%M`) for delivery and history payloads.
    pub fn clock_label(&self) -> String {
        chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.format("%H:%M").to_string())
            .unwrap_or_else(|_| self.created_at.clone())
    }
}

/// Per-conversation append lock, keyed by the canonical unordered pair.
/// Two concurrent appends to the same conversation must not interleave.
struct ConversationLocks {
    locks: HashMap<(String, String), Arc<Mutex<()>>>,
}

impl ConversationLocks {
    fn new() -> Self {
        Self {
            locks: HashMap::new(),
        }
    }

    fn get(&mut self, a: &UserId, b: &UserId) -> Arc<Mutex<()>> {
        let key = if a.as_str() <= b.as_str() {
            (a.as_str().to_owned(), b.as_str().to_owned())
        } else {
            (b.as_str().to_owned(), a.as_str().to_owned())
        };
        self.locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

pub struct MessageRepo {
    db: Database,
    conversation_locks: Mutex<ConversationLocks>,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            conversation_locks: Mutex::new(ConversationLocks::new()),
        }
    }

    /// Append a message to a conversation. Atomically, under the
    /// per-conversation lock:
    /// 1. Assigns `created_at` (persistence time, never client-supplied)
    /// 2. Inserts the row; SQLite assigns the monotonic `id`
    /// 3. Returns the full record for delivery
    #[instrument(skip(self, content), fields(sender = %sender, receiver = %receiver, kind = %kind))]
    pub fn append(
        &self,
        sender: &UserId,
        receiver: &UserId,
        content: &str,
        kind: MessageKind,
    ) -> Result<MessageRow, StoreError> {
        let lock = self.conversation_locks.lock().get(sender, receiver);
        let _guard = lock.lock();

        let created_at = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, content, kind, created_at, read)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0)",
                rusqlite::params![
                    sender.as_str(),
                    receiver.as_str(),
                    content,
                    kind.to_string(),
                    created_at,
                ],
            )?;

            Ok(MessageRow {
                id: MessageId::from_raw(conn.last_insert_rowid()),
                sender_id: sender.clone(),
                receiver_id: receiver.clone(),
                content: content.to_owned(),
                kind,
                created_at: created_at.clone(),
                read: false,
            })
        })
    }

    /// All messages between the unordered pair `{a, b}`, either direction,
    /// ordered by `created_at` then `id`. Empty pair yields an empty vec.
    #[instrument(skip(self), fields(a = %a, b = %b))]
    pub fn conversation(&self, a: &UserId, b: &UserId) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, kind, created_at, read
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query(rusqlite::params![a.as_str(), b.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }

    /// Mark every message in the conversation addressed to `receiver` as
    /// read. Idempotent; returns the number of rows that actually flipped.
    #[instrument(skip(self), fields(receiver = %receiver, other = %other))]
    pub fn mark_read_up_to(
        &self,
        receiver: &UserId,
        other: &UserId,
    ) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE messages SET read = 1
                 WHERE receiver_id = ?1 AND sender_id = ?2 AND read = 0",
                rusqlite::params![receiver.as_str(), other.as_str()],
            )?)
        })
    }

    /// Message count for a pair (both directions).
    #[instrument(skip(self), fields(a = %a, b = %b))]
    pub fn count(&self, a: &UserId, b: &UserId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)",
                rusqlite::params![a.as_str(), b.as_str()],
                |row| row.get(0),
            )?)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<MessageRow, StoreError> {
    let kind_raw: String = row_helpers::get(row, 4, "messages", "kind")?;

    Ok(MessageRow {
        id: MessageId::from_raw(row_helpers::get(row, 0, "messages", "id")?),
        sender_id: UserId::from_raw(row_helpers::get::<String>(row, 1, "messages", "sender_id")?),
        receiver_id: UserId::from_raw(row_helpers::get::<String>(
            row,
            2,
            "messages",
            "receiver_id",
        )?),
        content: row_helpers::get(row, 3, "messages", "content")?,
        kind: row_helpers::parse_enum(&kind_raw, "messages", "kind")?,
        created_at: row_helpers::get(row, 5, "messages", "created_at")?,
        read: row_helpers::get(row, 6, "messages", "read")?,
    })
}
