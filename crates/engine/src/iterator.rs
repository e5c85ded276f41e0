//! User-facing ordered iteration, layered over an index iterator.

use index::IndexIterator;

use crate::{Engine, IteratorConfig, Result};

/// Pull-based iterator over the engine's live keys.
///
/// Wraps an index iterator (a snapshot for the in-memory variants, a read
/// transaction for the persistent one) and applies the configured prefix
/// filter. `value()` reads through the engine, so it always observes the
/// record the snapshot pointed at.
pub struct EngineIterator<'a> {
    engine: &'a Engine,
    index_iter: Box<dyn IndexIterator + 'a>,
    config: IteratorConfig,
}

impl Engine {
    /// Creates an iterator positioned at the first matching key.
    pub fn iterator(&self, config: IteratorConfig) -> Result<EngineIterator<'_>> {
        // Snapshot under the read lock so a batch mid-commit is either fully
        // visible or not at all.
        let index_iter = {
            let _state = self.state.read();
            self.index.iterator(config.reverse)?
        };
        let mut iter = EngineIterator {
            engine: self,
            index_iter,
            config,
        };
        iter.skip_to_next();
        Ok(iter)
    }
}

impl EngineIterator<'_> {
    /// Back to the first matching key.
    pub fn rewind(&mut self) {
        self.index_iter.rewind();
        self.skip_to_next();
    }

    /// Positions at the least key ≥ `key` (greatest ≤ `key` in reverse mode).
    pub fn seek(&mut self, key: &[u8]) {
        self.index_iter.seek(key);
        self.skip_to_next();
    }

    /// Advances to the next matching key.
    pub fn next(&mut self) {
        self.index_iter.next();
        self.skip_to_next();
    }

    /// Whether the iterator points at a key.
    pub fn valid(&self) -> bool {
        self.index_iter.valid()
    }

    /// Current key; only call while `valid()`.
    pub fn key(&self) -> &[u8] {
        self.index_iter.key()
    }

    /// Reads the current key's value from disk under the engine read lock.
    pub fn value(&self) -> Result<Vec<u8>> {
        let pos = self.index_iter.value();
        let state = self.engine.state.read();
        self.engine.value_at_position(&state, &pos)
    }

    /// Releases the underlying snapshot or read transaction.
    pub fn close(self) {}

    fn skip_to_next(&mut self) {
        let prefix = &self.config.prefix;
        if prefix.is_empty() {
            return;
        }
        while self.index_iter.valid() {
            let key = self.index_iter.key();
            if key.len() >= prefix.len() && &key[..prefix.len()] == prefix.as_slice() {
                break;
            }
            self.index_iter.next();
        }
    }
}
