//! Conversation history reads.
//!
//! Serving history to the receiving party is also the moment their unread
//! messages flip to read (lazy inbox semantics — there is no read-receipt
//! push channel).

use serde::Serialize;
use tracing::instrument;

use courier_core::errors::ChatError;
use courier_core::ids::UserId;
use courier_core::message::MessageKind;
use courier_store::{Database, MessageRepo, MessageRow};

/// One history line as sent on the wire.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryEntry {
    pub content: String,
    pub kind: MessageKind,
    pub sender_id: UserId,
    pub time: String,
    pub read: bool,
}

impl HistoryEntry {
    fn from_row(row: MessageRow) -> Self {
        let time = row.clock_label();
        Self {
            content: row.content,
            kind: row.kind,
            sender_id: row.sender_id,
            time,
            read: row.read,
        }
    }
}

pub struct HistoryService {
    repo: MessageRepo,
}

impl HistoryService {
    pub fn new(db: Database) -> Self {
        Self {
            repo: MessageRepo::new(db),
        }
    }

    /// The caller's conversation with `other`. An unauthenticated caller is
    /// rejected before any store access.
    pub fn fetch(
        &self,
        caller: Option<&UserId>,
        other: &UserId,
    ) -> Result<Vec<HistoryEntry>, ChatError> {
        let caller = caller.ok_or_else(|| ChatError::Authorization("no access".into()))?;
        self.fetch_between(caller, caller, other)
    }

    /// History of the pair `{a, b}`, readable only by a participant. As a
    /// side effect of the caller opening the conversation, messages
    /// addressed to them flip to read before the rows are fetched.
    #[instrument(skip(self), fields(caller = %caller, a = %a, b = %b))]
    pub fn fetch_between(
        &self,
        caller: &UserId,
        a: &UserId,
        b: &UserId,
    ) -> Result<Vec<HistoryEntry>, ChatError> {
        if caller != a && caller != b {
            return Err(ChatError::Authorization("no access".into()));
        }
        let other = if caller == a { b } else { a };

        self.repo
            .mark_read_up_to(caller, other)
            .map_err(|e| ChatError::Storage(e.to_string()))?;

        let rows = self
            .repo
            .conversation(caller, other)
            .map_err(|e| ChatError::Storage(e.to_string()))?;

        Ok(rows.into_iter().map(HistoryEntry::from_row).collect())
    }
}
