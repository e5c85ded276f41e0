//! Read path: `get` plus the position → value resolution shared with
//! iterators and `fold`.
//!
//! Every reader holds the engine read lock from before its index lookup
//! until the value leaves disk. Batch commits install their records while
//! holding the write lock, so a lookup can never observe a half-committed
//! batch.

use datafile::{LogRecordType, Position};

use crate::{Engine, EngineState, Error, Result};

impl Engine {
    /// Returns the live value for `key`.
    ///
    /// # Errors
    ///
    /// `KeyIsEmpty` for a zero-length key, `KeyNotFound` when no live record
    /// exists (including tombstoned keys).
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }

        let state = self.state.read();
        let pos = self.index.get(key)?.ok_or(Error::KeyNotFound)?;
        self.value_at_position(&state, &pos)
    }

    /// Reads the record at `pos` and returns its value. Caller holds the
    /// engine lock (read is enough: data files only ever grow).
    pub(crate) fn value_at_position(
        &self,
        state: &EngineState,
        pos: &Position,
    ) -> Result<Vec<u8>> {
        let active_id = state.active_file.as_ref().map(|active| active.file_id());
        let data_file = if active_id == Some(pos.file_id) {
            state.active_file.as_ref()
        } else {
            state.archived_files.get(&pos.file_id)
        };
        let Some(data_file) = data_file else {
            return Err(Error::DataFileNotFound);
        };

        let (record, _) = data_file.read_record(pos.offset)?;
        if record.rec_type == LogRecordType::Deleted {
            return Err(Error::KeyNotFound);
        }
        Ok(record.value)
    }

    /// All live keys in ascending order.
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>> {
        let _state = self.state.read();
        let mut iter = self.index.iterator(false)?;
        let mut keys = Vec::new();
        while iter.valid() {
            keys.push(iter.key().to_vec());
            iter.next();
        }
        Ok(keys)
    }

    /// Calls `f(key, value)` for every live pair in ascending key order,
    /// stopping early when `f` returns `false`.
    ///
    /// Holds the engine read lock for the whole walk: `f` must not call back
    /// into a mutating engine operation.
    pub fn fold<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let state = self.state.read();
        let mut iter = self.index.iterator(false)?;
        while iter.valid() {
            let pos = iter.value();
            let value = self.value_at_position(&state, &pos)?;
            if !f(iter.key(), &value) {
                break;
            }
            iter.next();
        }
        Ok(())
    }
}
