use std::collections::BTreeMap;

use datafile::Position;
use parking_lot::RwLock;

use crate::{IndexIterator, Indexer, Result, SnapshotIterator};

/// In-memory balanced-tree index: a `BTreeMap` behind a single
/// readers-writer lock. Iterators snapshot the ordered entries at creation
/// time so iteration never contends with writers.
pub struct BTreeIndex {
    tree: RwLock<BTreeMap<Vec<u8>, Position>>,
}

impl BTreeIndex {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for BTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for BTreeIndex {
    fn put(&self, key: Vec<u8>, pos: Position) -> Result<Option<Position>> {
        Ok(self.tree.write().insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Position>> {
        Ok(self.tree.read().get(key).copied())
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<Position>, bool)> {
        let old = self.tree.write().remove(key);
        let removed = old.is_some();
        Ok((old, removed))
    }

    fn size(&self) -> Result<usize> {
        Ok(self.tree.read().len())
    }

    fn iterator(&self, reverse: bool) -> Result<Box<dyn IndexIterator + '_>> {
        let items: Vec<(Vec<u8>, Position)> = self
            .tree
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        Ok(Box::new(SnapshotIterator::new(items, reverse)))
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
