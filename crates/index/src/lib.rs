//! # Index — Ordered Key → Position Maps
//!
//! The in-memory half of the Bitcask design: an ordered map from user key to
//! the [`Position`] of that key's latest record on disk. Three interchangeable
//! implementations sit behind one trait:
//!
//! | Variant                | Backing store                        | Survives restart |
//! |------------------------|--------------------------------------|------------------|
//! | [`BTreeIndex`]         | `BTreeMap` under a `RwLock`          | no (rebuilt)     |
//! | [`RadixTreeIndex`]     | adaptive radix trie under a `RwLock` | no (rebuilt)     |
//! | [`BPlusTreeIndex`]     | `redb` B+ tree in `bptree-index`     | yes              |
//!
//! The in-memory variants give their iterators a materialized snapshot of the
//! ordered entries, decoupling iteration from concurrent mutation. The
//! persistent variant's iterator owns a read transaction instead and walks
//! the on-disk tree cursor-style; choosing it also changes the engine's open
//! path, which no longer replays data files to rebuild the map.

mod art;
mod bptree;
mod btree;

pub use art::RadixTreeIndex;
pub use bptree::{BPlusTreeIndex, BPTREE_INDEX_FILE_NAME};
pub use btree::BTreeIndex;

use std::path::Path;

use datafile::Position;
use thiserror::Error;

/// Errors from index mutations and lookups. The in-memory variants are
/// infallible; everything here comes from the persistent backend.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Database(#[from] redb::DatabaseError),

    #[error(transparent)]
    Transaction(#[from] redb::TransactionError),

    #[error(transparent)]
    Table(#[from] redb::TableError),

    #[error(transparent)]
    Storage(#[from] redb::StorageError),

    #[error(transparent)]
    Commit(#[from] redb::CommitError),

    /// A stored position entry failed to decode.
    #[error("malformed position entry in index")]
    Corrupted,
}

pub type Result<T> = std::result::Result<T, IndexError>;

/// Which index implementation the engine is configured with. Selected once
/// at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    /// In-memory balanced tree.
    BTree,
    /// In-memory adaptive radix tree; prefix-friendly lookups.
    AdaptiveRadixTree,
    /// Persistent B+ tree stored next to the data files; for key sets larger
    /// than RAM.
    BPlusTree,
}

/// Ordered map from key to the position of its latest live record.
///
/// Implementations are internally synchronized; all methods take `&self`.
pub trait Indexer: Send + Sync {
    /// Atomically inserts or replaces, returning the displaced position.
    fn put(&self, key: Vec<u8>, pos: Position) -> Result<Option<Position>>;

    fn get(&self, key: &[u8]) -> Result<Option<Position>>;

    /// Removes `key`, returning the previous position and whether anything
    /// was removed.
    fn delete(&self, key: &[u8]) -> Result<(Option<Position>, bool)>;

    /// Number of keys currently indexed.
    fn size(&self) -> Result<usize>;

    /// Ordered iterator, positioned at the first entry. Dropping it releases
    /// whatever it holds (snapshot memory or a read transaction).
    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator + '_>>;

    /// Persistent variants flush; in-memory variants are a no-op.
    fn close(&self) -> Result<()>;
}

/// Pull-based cursor over an index.
///
/// `key`/`value` must only be called while `valid()` is true.
pub trait IndexIterator: Send {
    /// Back to the first entry (last, in reverse mode).
    fn rewind(&mut self);

    /// Forward mode: least key ≥ `key`. Reverse mode: greatest key ≤ `key`.
    fn seek(&mut self, key: &[u8]);

    fn next(&mut self);

    fn valid(&self) -> bool;

    fn key(&self) -> &[u8];

    fn value(&self) -> Position;
}

/// Constructs the configured index variant. `dir` and `sync` only matter for
/// the persistent B+ tree, which opens its backing file immediately.
pub fn new_indexer(typ: IndexType, dir: &Path, sync: bool) -> Result<Box<dyn Indexer>> {
    match typ {
        IndexType::BTree => Ok(Box::new(BTreeIndex::new())),
        IndexType::AdaptiveRadixTree => Ok(Box::new(RadixTreeIndex::new())),
        IndexType::BPlusTree => Ok(Box::new(BPlusTreeIndex::open(dir, sync)?)),
    }
}

/// Iterator over a materialized `(key, position)` snapshot, shared by the
/// in-memory index variants. `items` is ascending in forward mode and
/// descending in reverse mode, so `next` is always "advance the cursor".
pub(crate) struct SnapshotIterator {
    items: Vec<(Vec<u8>, Position)>,
    reverse: bool,
    idx: usize,
}

impl SnapshotIterator {
    pub(crate) fn new(mut items: Vec<(Vec<u8>, Position)>, reverse: bool) -> Self {
        if reverse {
            items.reverse();
        }
        Self {
            items,
            reverse,
            idx: 0,
        }
    }
}

impl IndexIterator for SnapshotIterator {
    fn rewind(&mut self) {
        self.idx = 0;
    }

    fn seek(&mut self, key: &[u8]) {
        self.idx = if self.reverse {
            // Descending order: skip entries greater than the target.
            self.items.partition_point(|(k, _)| k.as_slice() > key)
        } else {
            self.items.partition_point(|(k, _)| k.as_slice() < key)
        };
    }

    fn next(&mut self) {
        self.idx += 1;
    }

    fn valid(&self) -> bool {
        self.idx < self.items.len()
    }

    fn key(&self) -> &[u8] {
        &self.items[self.idx].0
    }

    fn value(&self) -> Position {
        self.items[self.idx].1
    }
}
