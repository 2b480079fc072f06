//! Append-only keyed message log.
//!
//! Messages are partitioned into buckets by `(server, target)` with
//! monotonically increasing per-bucket ids. Entry keys are the bucket name,
//! a NUL separator, and the id as eight big-endian bytes, so lexicographic
//! cursor order within a bucket equals numeric id order.

use std::path::Path;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::search::SearchIndex;

const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");
const SEQUENCES: TableDefinition<&[u8], u64> = TableDefinition::new("sequences");

/// One chat line as stored in the log. `server` and `to` are implied by the
/// bucket and not part of the stored record; they are filled back in on
/// read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Per-bucket monotonic sequence id, starting at 1.
    pub id: u64,
    #[serde(skip)]
    pub server: String,
    pub from: String,
    #[serde(skip)]
    pub to: String,
    pub content: String,
    /// Unix seconds.
    pub time: i64,
}

/// A per-user message store: the durable log plus its full-text index.
/// Opened at user session start and closed (dropped) on teardown; dropping
/// releases both handles.
pub struct MessageStore {
    log: Database,
    index: SearchIndex,
}

impl MessageStore {
    /// Open the store rooted at `dir`, creating the directory (owner-only
    /// permissions), the log, and the index as needed.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref();
        create_dir_restricted(dir)?;

        let log_path = dir.join("messages.db");
        let log = Database::create(&log_path)?;
        restrict_file(&log_path)?;
        {
            let txn = log.begin_write()?;
            txn.open_table(MESSAGES)?;
            txn.open_table(SEQUENCES)?;
            txn.commit()?;
        }

        let index_dir = dir.join("index");
        create_dir_restricted(&index_dir)?;
        let index = SearchIndex::open(&index_dir)?;

        tracing::debug!(path = %dir.display(), "message store opened");
        Ok(Self { log, index })
    }

    /// Append one message to its `(server, to)` bucket and index it.
    ///
    /// The log write commits first; an index failure is returned but does
    /// not roll the log back. Returns the assigned id.
    pub fn log_message(
        &self,
        server: &str,
        from: &str,
        to: &str,
        content: &str,
    ) -> Result<u64, StoreError> {
        let bucket = bucket_key(server, to);
        let id;
        let txn = self.log.begin_write()?;
        {
            let mut sequences = txn.open_table(SEQUENCES)?;
            let last = sequences
                .get(bucket.as_bytes())?
                .map(|guard| guard.value())
                .unwrap_or(0);
            id = last + 1;
            sequences.insert(bucket.as_bytes(), id)?;

            let record = StoredMessage {
                id,
                server: server.to_string(),
                from: from.to_string(),
                to: to.to_string(),
                content: content.to_string(),
                time: Utc::now().timestamp(),
            };
            let payload = serde_json::to_vec(&record)?;
            let mut messages = txn.open_table(MESSAGES)?;
            messages.insert(entry_key(&bucket, id).as_slice(), payload.as_slice())?;
        }
        txn.commit()?;

        let doc_id = format!("{bucket}:{id}");
        if let Err(err) = self.index.add(&doc_id, server, to, content) {
            tracing::warn!(%doc_id, error = %err, "message logged but not indexed");
            return Err(err);
        }
        Ok(id)
    }

    /// The most recent `count` messages of a bucket in chronological order.
    /// An absent or empty bucket yields an empty vector.
    pub fn get_last_messages(
        &self,
        server: &str,
        channel: &str,
        count: usize,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.read_backward(server, channel, count, None)
    }

    /// Up to `count` messages strictly older than `from_id`, in
    /// chronological order: the page preceding a message the caller already
    /// has.
    pub fn get_messages(
        &self,
        server: &str,
        channel: &str,
        count: usize,
        from_id: u64,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        self.read_backward(server, channel, count, Some(from_id))
    }

    /// Fuzzy full-text search within one bucket. Hits come back in the
    /// order the index ranked them, resolved to their log records.
    pub fn search_messages(
        &self,
        server: &str,
        channel: &str,
        query: &str,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let doc_ids = self.index.search(server, channel, query)?;
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.log.begin_read()?;
        let table = txn.open_table(MESSAGES)?;

        let mut messages = Vec::with_capacity(doc_ids.len());
        for doc_id in doc_ids {
            let Some((bucket, id)) = split_doc_id(&doc_id) else {
                continue;
            };
            if let Some(value) = table.get(entry_key(bucket, id).as_slice())? {
                let mut msg: StoredMessage = serde_json::from_slice(value.value())?;
                msg.server = server.to_string();
                msg.to = channel.to_string();
                messages.push(msg);
            }
        }
        Ok(messages)
    }

    fn read_backward(
        &self,
        server: &str,
        channel: &str,
        count: usize,
        before: Option<u64>,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        let bucket = bucket_key(server, channel);
        let (lower, upper) = bucket_bounds(&bucket);
        // Walking backward from the key of `before` excludes it, matching
        // the "give me the page before this" contract.
        let upper = match before {
            Some(id) => entry_key(&bucket, id),
            None => upper,
        };

        let txn = self.log.begin_read()?;
        let table = txn.open_table(MESSAGES)?;

        let mut messages = Vec::with_capacity(count);
        let range = table.range::<&[u8]>(lower.as_slice()..upper.as_slice())?;
        for item in range.rev().take(count) {
            let (_key, value) = item?;
            let mut msg: StoredMessage = serde_json::from_slice(value.value())?;
            msg.server = server.to_string();
            msg.to = channel.to_string();
            messages.push(msg);
        }
        messages.reverse();
        Ok(messages)
    }
}

/// The composite partition key `"<server>:<target>"`.
fn bucket_key(server: &str, target: &str) -> String {
    format!("{server}:{target}")
}

/// Entry key inside the flat messages table: bucket, NUL, 8-byte BE id.
fn entry_key(bucket: &str, id: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(bucket.len() + 9);
    key.extend_from_slice(bucket.as_bytes());
    key.push(0);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Half-open key range covering every entry of one bucket. The separator
/// byte 0x00 sorts below 0x01, so `bucket\x00…` < `bucket\x01`.
fn bucket_bounds(bucket: &str) -> (Vec<u8>, Vec<u8>) {
    let mut lower = bucket.as_bytes().to_vec();
    lower.push(0x00);
    let mut upper = bucket.as_bytes().to_vec();
    upper.push(0x01);
    (lower, upper)
}

/// Recover `(bucket, id)` from an index document id by splitting at the
/// last `:`.
fn split_doc_id(doc_id: &str) -> Option<(&str, u64)> {
    let idx = doc_id.rfind(':')?;
    let id = doc_id[idx + 1..].parse().ok()?;
    Some((&doc_id[..idx], id))
}

fn create_dir_restricted(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(path)
}

pub(crate) fn restrict_file(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_keys_order_numerically() {
        let bucket = "irc.example:#chan";
        let mut keys: Vec<Vec<u8>> = [1u64, 255, 256, 2, 65536]
            .iter()
            .map(|&id| entry_key(bucket, id))
            .collect();
        keys.sort();
        let ids: Vec<u64> = keys
            .iter()
            .map(|k| {
                let tail: [u8; 8] = k[k.len() - 8..].try_into().unwrap();
                u64::from_be_bytes(tail)
            })
            .collect();
        assert_eq!(ids, vec![1, 2, 255, 256, 65536]);
    }

    #[test]
    fn bucket_bounds_contain_only_own_entries() {
        let (lower, upper) = bucket_bounds("srv:#a");
        let inside = entry_key("srv:#a", u64::MAX);
        let other = entry_key("srv:#ab", 1);
        assert!(lower.as_slice() < inside.as_slice());
        assert!(inside.as_slice() < upper.as_slice());
        assert!(!(lower.as_slice() <= other.as_slice() && other.as_slice() < upper.as_slice()));
    }

    #[test]
    fn doc_id_round_trip() {
        assert_eq!(split_doc_id("srv:#chan:42"), Some(("srv:#chan", 42)));
        assert_eq!(split_doc_id("no-separator"), None);
        assert_eq!(split_doc_id("srv:#chan:notanum"), None);
    }
}
