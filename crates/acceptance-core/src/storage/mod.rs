//! # Storage Module
//!
//! [`AcceptanceStore`](crate::store::AcceptanceStore) implementations.
//!
//! - `MemoryStore`: BTreeMap-backed, for tests and embedding.
//! - `RedbStore`: redb embedded database with ACID write transactions,
//!   crash safety (copy-on-write B-trees) and MVCC readers. Each revision
//!   check and its write happen inside one write transaction.

mod memory;
mod redb_store;

pub use memory::MemoryStore;
pub use redb_store::RedbStore;
