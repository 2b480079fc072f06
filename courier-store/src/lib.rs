//! Per-user persistent message log with full-text search.
//!
//! A [`MessageStore`] is an append-only log of chat messages partitioned by
//! `(server, target)` with monotonically increasing per-bucket ids, fronted
//! by a full-text index supporting fuzzy content search filtered by server
//! and target. One store is opened per user session and dropped on
//! teardown.
//!
//! # Example
//!
//! ```no_run
//! use courier_store::MessageStore;
//!
//! # fn example() -> Result<(), courier_store::StoreError> {
//! let store = MessageStore::open("/var/lib/courier/users/alice")?;
//! store.log_message("irc.example", "bob", "#chan", "hi")?;
//! let recent = store.get_last_messages("irc.example", "#chan", 50)?;
//! let hits = store.search_messages("irc.example", "#chan", "hi")?;
//! # let _ = (recent, hits);
//! # Ok(())
//! # }
//! ```

mod error;
mod search;
mod store;

pub use error::StoreError;
pub use store::{MessageStore, StoredMessage};
