//! Append-only operation history.

use esim_error::EsimError;
use esim_types::{InodeId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Create,
    Delete,
}

impl OpKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OpOutcome {
    Accepted,
    Rejected { kind: String, reason: String },
}

impl OpOutcome {
    #[must_use]
    pub fn rejected(error: &EsimError) -> Self {
        Self::Rejected {
            kind: error.kind().to_owned(),
            reason: error.to_string(),
        }
    }

    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// One recorded operation. Entries are never modified after being appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub seq: u64,
    pub kind: OpKind,
    pub name: String,
    /// Requested size for creates; always 0 for deletes.
    pub size_bytes: u64,
    /// `None` only for rejected operations that never resolved an inode.
    pub inode_id: Option<InodeId>,
    pub outcome: OpOutcome,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry and return its sequence number (starting at 1).
    pub fn record(
        &mut self,
        kind: OpKind,
        name: &str,
        size_bytes: u64,
        inode_id: Option<InodeId>,
        outcome: OpOutcome,
    ) -> u64 {
        let seq = self.last_seq() + 1;
        self.entries.push(HistoryEntry {
            seq,
            kind,
            name: name.to_owned(),
            size_bytes,
            inode_id,
            outcome,
            timestamp: Timestamp::now(),
        });
        seq
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Sequence number of the latest entry, 0 when empty.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.entries.last().map_or(0, |entry| entry.seq)
    }

    pub fn accepted(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().filter(|entry| entry.outcome.is_accepted())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_are_monotonic_from_one() {
        let mut log = HistoryLog::new();
        assert_eq!(log.last_seq(), 0);
        let a = log.record(OpKind::Create, "a", 10, Some(InodeId(0)), OpOutcome::Accepted);
        let b = log.record(OpKind::Delete, "a", 0, Some(InodeId(0)), OpOutcome::Accepted);
        assert_eq!((a, b), (1, 2));
        assert_eq!(log.len(), 2);
        assert!(log.entries()[0].timestamp <= log.entries()[1].timestamp);
    }

    #[test]
    fn rejected_entries_are_filtered_from_accepted() {
        let mut log = HistoryLog::new();
        log.record(OpKind::Create, "a", 10, Some(InodeId(0)), OpOutcome::Accepted);
        log.record(
            OpKind::Create,
            "a",
            10,
            None,
            OpOutcome::rejected(&EsimError::DuplicateName("a".into())),
        );
        assert_eq!(log.accepted().count(), 1);
        assert_eq!(log.last_seq(), 2);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let json = serde_json::to_string(&OpOutcome::rejected(&EsimError::NoFreeInode)).unwrap();
        assert_eq!(
            json,
            r#"{"status":"rejected","kind":"no_free_inode","reason":"no free inode available"}"#
        );
        assert_eq!(
            serde_json::to_string(&OpOutcome::Accepted).unwrap(),
            r#"{"status":"accepted"}"#
        );
    }
}
