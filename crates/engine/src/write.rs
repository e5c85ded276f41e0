//! Write path: `put`, `delete`, `sync`, and the append protocol shared with
//! batch commits and merge.
//!
//! Every mutation is an appended record; the index always points at the
//! newest one and every displaced position is credited to `reclaim_size` so
//! merge knows how much space a rewrite would recover.

use datafile::{DataFile, LogRecord, LogRecordType, Position};
use fio::IoKind;

use crate::batch::{encode_key_with_seq, NON_TRANSACTION_SEQ_NO};
use crate::{Engine, EngineState, Error, Result};

impl Engine {
    /// Stores `value` under `key`, replacing any previous value.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }

        let record = LogRecord {
            key: encode_key_with_seq(key, NON_TRANSACTION_SEQ_NO),
            value: value.to_vec(),
            rec_type: LogRecordType::Normal,
        };

        // Append and index update under one write-lock hold, so readers see
        // either the old position or the new one, never the gap between.
        let mut state = self.state.write();
        let pos = self.append_record(&mut state, &record)?;
        if let Some(old) = self.index.put(key.to_vec(), pos)? {
            state.reclaim_size += u64::from(old.size);
        }
        Ok(())
    }

    /// Removes `key`. Deleting an absent key succeeds without touching disk.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }

        let mut state = self.state.write();
        if self.index.get(key)?.is_none() {
            return Ok(());
        }

        let record = LogRecord {
            key: encode_key_with_seq(key, NON_TRANSACTION_SEQ_NO),
            value: Vec::new(),
            rec_type: LogRecordType::Deleted,
        };

        let pos = self.append_record(&mut state, &record)?;
        // The tombstone itself is dead weight from the moment it lands.
        state.reclaim_size += u64::from(pos.size);

        let (old, removed) = self.index.delete(key)?;
        if !removed {
            return Err(Error::IndexUpdateFailed);
        }
        if let Some(old) = old {
            state.reclaim_size += u64::from(old.size);
        }
        Ok(())
    }

    /// Flushes the active file to stable storage.
    pub fn sync(&self) -> Result<()> {
        let state = self.state.write();
        if let Some(active) = state.active_file.as_ref() {
            active.sync()?;
        }
        Ok(())
    }

    /// Appends `record` to the active file, rotating first when the write
    /// would cross `file_size`. Caller holds the engine write lock.
    pub(crate) fn append_record(
        &self,
        state: &mut EngineState,
        record: &LogRecord,
    ) -> Result<Position> {
        // The first write of a fresh database creates file 0. A missing
        // active file after a failed rotation retries with the next id
        // instead, so an archived file is never reopened for writes.
        if state.active_file.is_none() {
            let next_id = state
                .archived_files
                .keys()
                .max()
                .map_or(0, |max_id| max_id + 1);
            self.open_active_file(state, next_id)?;
        }

        let (encoded, _) = record.encode();
        let size = encoded.len() as u64;

        let rotate = state
            .active_file
            .as_ref()
            .map(|active| active.write_off() + size > self.config.file_size)
            .unwrap_or(false);
        if rotate {
            // Existing bytes must be durable before the file goes read-only.
            let old_id = match state.active_file.as_ref() {
                Some(active) => {
                    active.sync()?;
                    active.file_id()
                }
                None => return Err(Error::DataFileNotFound),
            };
            if let Some(old) = state.active_file.take() {
                state.archived_files.insert(old_id, old);
            }
            // On failure the next append retries the rotation.
            self.open_active_file(state, old_id + 1)?;
            state.bytes_since_sync = 0;
            log::debug!("rotated to data file {:09}", old_id + 1);
        }

        let Some(active) = state.active_file.as_mut() else {
            return Err(Error::DataFileNotFound);
        };
        let offset = active.write_off();
        active.append(&encoded)?;
        let file_id = active.file_id();

        state.bytes_since_sync += size;
        let need_sync = self.config.sync_writes
            || (self.config.bytes_per_sync > 0
                && state.bytes_since_sync >= self.config.bytes_per_sync);
        if need_sync {
            active.sync()?;
            state.bytes_since_sync = 0;
        }

        Ok(Position {
            file_id,
            offset,
            size: size as u32,
        })
    }

    /// Opens the data file with `file_id` as the new active file.
    pub(crate) fn open_active_file(&self, state: &mut EngineState, file_id: u32) -> Result<()> {
        let data_file = DataFile::open(&self.config.dir_path, file_id, IoKind::Standard)?;
        state.active_file = Some(data_file);
        Ok(())
    }
}
