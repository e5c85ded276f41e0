use datafile::Position;
use parking_lot::RwLock;
use radix_trie::{Trie, TrieCommon};

use crate::{IndexIterator, Indexer, Result, SnapshotIterator};

/// Adaptive radix tree index.
///
/// Wraps an off-the-shelf patricia trie; compared to the balanced tree it
/// trades some per-node overhead for prefix-compressed lookups, which pays
/// off for long keys sharing common prefixes. Iteration uses the same
/// snapshot strategy as [`crate::BTreeIndex`] — trie traversal order is
/// lexicographic byte order, so snapshots come out sorted.
pub struct RadixTreeIndex {
    tree: RwLock<Trie<Vec<u8>, Position>>,
}

impl RadixTreeIndex {
    pub fn new() -> Self {
        Self {
            tree: RwLock::new(Trie::new()),
        }
    }
}

impl Default for RadixTreeIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl Indexer for RadixTreeIndex {
    fn put(&self, key: Vec<u8>, pos: Position) -> Result<Option<Position>> {
        Ok(self.tree.write().insert(key, pos))
    }

    fn get(&self, key: &[u8]) -> Result<Option<Position>> {
        Ok(self.tree.read().get(&key.to_vec()).copied())
    }

    fn delete(&self, key: &[u8]) -> Result<(Option<Position>, bool)> {
        let old = self.tree.write().remove(&key.to_vec());
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
