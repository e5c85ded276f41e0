//! The cold-start path: discovering data files, fast-loading positions from
//! the hint file, replaying data files into the index (with transaction
//! buffering), and restoring the transaction id for the persistent-index
//! variant.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::Ordering;

use datafile::{
    decode_position, DataFile, LogRecord, LogRecordType, Position, RecordError,
    DATA_FILE_SUFFIX, HINT_FILE_NAME, MERGE_FINISHED_FILE_NAME, SEQ_NO_FILE_NAME,
};
use fio::IoKind;
use index::Indexer;

use crate::batch::{parse_key, NON_TRANSACTION_SEQ_NO};
use crate::{Engine, Error, IndexType, Result};

/// Key of the single record inside the `seq-no` file.
pub(crate) const SEQ_NO_KEY: &[u8] = b"seq.no";

impl Engine {
    /// Scans the directory for `*.data` files, opens them all (mmap-backed
    /// when configured) and installs the highest id as the active file.
    ///
    /// Returns the sorted file ids for the replay step.
    pub(crate) fn load_data_files(&self) -> Result<Vec<u32>> {
        let mut file_ids: Vec<u32> = Vec::new();
        for entry in fs::read_dir(&self.config.dir_path)? {
            let name = entry?.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(stem) = name.strip_suffix(DATA_FILE_SUFFIX) else {
                continue;
            };
            let id: u32 = stem.parse().map_err(|_| Error::DataDirectoryCorrupted)?;
            file_ids.push(id);
        }
        file_ids.sort_unstable();

        // The mmap backend only pays off for the replay scan, which the
        // persistent-index variant skips; it also never swaps back.
        let use_mmap =
            self.config.mmap_at_startup && self.config.index_type != IndexType::BPlusTree;
        let kind = if use_mmap {
            IoKind::Mmap
        } else {
            IoKind::Standard
        };

        let mut state = self.state.write();
        for (i, &file_id) in file_ids.iter().enumerate() {
            let data_file = DataFile::open(&self.config.dir_path, file_id, kind)?;
            if i == file_ids.len() - 1 {
                state.active_file = Some(data_file);
            } else {
                state.archived_files.insert(file_id, data_file);
            }
        }
        Ok(file_ids)
    }

    /// Fast path after a merge: install every `(key, position)` the merge
    /// recorded, without touching the merged data files.
    pub(crate) fn load_index_from_hint_file(&self) -> Result<()> {
        let hint_path = self.config.dir_path.join(HINT_FILE_NAME);
        if !hint_path.exists() {
            return Ok(());
        }

        let hint_file = DataFile::open_hint_file(&self.config.dir_path)?;
        let mut offset = 0u64;
        loop {
            let (record, size) = match hint_file.read_record(offset) {
                Ok(found) => found,
                Err(RecordError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let pos = decode_position(&record.value).ok_or(Error::DataDirectoryCorrupted)?;
            self.index.put(record.key, pos)?;
            offset += size;
        }
        Ok(())
    }

    /// Replays data files in ascending id order into the index.
    ///
    /// Records with the non-transactional sequence apply immediately.
    /// Transactional records buffer under their sequence number and only
    /// apply when that transaction's `TxnFinished` terminator is seen, so a
    /// batch that crashed mid-commit vanishes. Files below a recorded
    /// non-merge-file-id are skipped — the hint file already covered them.
    pub(crate) fn load_index_from_data_files(&self, file_ids: &[u32]) -> Result<()> {
        if file_ids.is_empty() {
            return Ok(());
        }

        let mut has_merge = false;
        let mut non_merge_file_id = 0u32;
        if self
            .config
            .dir_path
            .join(MERGE_FINISHED_FILE_NAME)
            .exists()
        {
            non_merge_file_id = self.non_merge_file_id(&self.config.dir_path)?;
            has_merge = true;
        }

        let mut state = self.state.write();
        let state = &mut *state;

        // Uncommitted transactions, keyed by sequence number.
        let mut txn_buffer: HashMap<u64, Vec<(LogRecord, Position)>> = HashMap::new();
        let mut max_seq_no = NON_TRANSACTION_SEQ_NO;
        let mut records = 0usize;

        for (i, &file_id) in file_ids.iter().enumerate() {
            if has_merge && file_id < non_merge_file_id {
                continue;
            }
            let is_active = i == file_ids.len() - 1;
            let data_file = if is_active {
                state.active_file.as_ref()
            } else {
                state.archived_files.get(&file_id)
            };
            let Some(data_file) = data_file else {
                return Err(Error::DataFileNotFound);
            };

            let mut offset = 0u64;
            loop {
                let (record, size) = match data_file.read_record(offset) {
                    Ok(found) => found,
                    Err(RecordError::Eof) => break,
                    Err(e) => return Err(e.into()),
                };
                let pos = Position {
                    file_id,
                    offset,
                    size: size as u32,
                };

                let (real_key, seq_no) = parse_key(&record.key);
                if seq_no == NON_TRANSACTION_SEQ_NO {
                    apply_record(
                        self.index.as_ref(),
                        &mut state.reclaim_size,
                        real_key,
                        record.rec_type,
                        pos,
                    )?;
                } else if record.rec_type == LogRecordType::TxnFinished {
                    // Terminator: the whole transaction becomes visible.
                    if let Some(buffered) = txn_buffer.remove(&seq_no) {
                        for (rec, rec_pos) in buffered {
                            apply_record(
                                self.index.as_ref(),
                                &mut state.reclaim_size,
                                rec.key,
                                rec.rec_type,
                                rec_pos,
                            )?;
                        }
                    }
                } else {
                    let mut rec = record;
                    rec.key = real_key;
                    txn_buffer.entry(seq_no).or_default().push((rec, pos));
                }

                if seq_no > max_seq_no {
                    max_seq_no = seq_no;
                }
                records += 1;
                offset += size;
            }

            // The next append continues where the replay stopped.
            if is_active {
                if let Some(active) = state.active_file.as_mut() {
                    active.set_write_off(offset);
                }
            }
        }

        self.seq_no.store(max_seq_no, Ordering::SeqCst);
        log::info!(
            "replayed {} record(s), {} uncommitted transaction(s) discarded",
            records,
            txn_buffer.len(),
        );
        Ok(())
    }

    /// Restores the transaction id from the `seq-no` file, then deletes it:
    /// a stale id must never be consumed twice.
    pub(crate) fn load_seq_no(&mut self) -> Result<()> {
        let path = self.config.dir_path.join(SEQ_NO_FILE_NAME);
        if !path.exists() {
            return Ok(());
        }

        let seq_no_file = DataFile::open_seq_no_file(&self.config.dir_path)?;
        let (record, _) = seq_no_file.read_record(0)?;
        let seq_no: u64 = std::str::from_utf8(&record.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::DataDirectoryCorrupted)?;

        self.seq_no.store(seq_no, Ordering::SeqCst);
        self.seq_no_file_exists = true;
        fs::remove_file(path)?;
        Ok(())
    }

    /// Writes a fresh `seq-no` file holding the current transaction id.
    pub(crate) fn persist_seq_no(&self) -> Result<()> {
        let path = self.config.dir_path.join(SEQ_NO_FILE_NAME);
        if path.exists() {
            fs::remove_file(&path)?;
        }

        let mut seq_no_file = DataFile::open_seq_no_file(&self.config.dir_path)?;
        let record = LogRecord {
            key: SEQ_NO_KEY.to_vec(),
            value: self
                .seq_no
                .load(Ordering::SeqCst)
                .to_string()
                .into_bytes(),
            rec_type: LogRecordType::Normal,
        };
        let (encoded, _) = record.encode();
        seq_no_file.append(&encoded)?;
        seq_no_file.sync()?;
        Ok(())
    }

    /// Swaps every data file from the startup mmap back to a standard handle
    /// before the engine serves writes.
    pub(crate) fn reset_io_kind(&self) -> Result<()> {
        let mut state = self.state.write();
        let state = &mut *state;
        if let Some(active) = state.active_file.as_mut() {
            active.set_io_manager(&self.config.dir_path, IoKind::Standard)?;
        }
        for data_file in state.archived_files.values_mut() {
            data_file.set_io_manager(&self.config.dir_path, IoKind::Standard)?;
        }
        Ok(())
    }
}

/// Installs one resolved record into the index, crediting `reclaim_size`
/// exactly like the live write paths.
fn apply_record(
    index: &dyn Indexer,
    reclaim_size: &mut u64,
    key: Vec<u8>,
    rec_type: LogRecordType,
    pos: Position,
) -> Result<()> {
    let old = match rec_type {
        LogRecordType::Deleted => {
            *reclaim_size += u64::from(pos.size);
            index.delete(&key)?.0
        }
        _ => index.put(key, pos)?,
    };
    if let Some(old) = old {
        *reclaim_size += u64::from(old.size);
    }
    Ok(())
}
