//! Merge/compaction: rewrite the live subset of the archived files into a
//! sibling `<dir>-merge` directory, emit a hint file, and mark completion.
//!
//! Nothing is installed in place. The *next* open finds the sibling
//! directory: with a `merge-finished` marker it deletes the superseded data
//! files and moves the merge output in; without one the residue is discarded
//! untouched. Either way a crash anywhere in the protocol is safe.

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use datafile::{
    DataFile, LogRecord, LogRecordType, RecordError, MERGE_FINISHED_FILE_NAME,
    SEQ_NO_FILE_NAME,
};
use fio::IoKind;
use index::BPTREE_INDEX_FILE_NAME;

use crate::batch::{encode_key_with_seq, parse_key, NON_TRANSACTION_SEQ_NO};
use crate::{fsutil, Engine, EngineState, Error, IndexType, Result, FILE_LOCK_NAME};

/// Appended to the database directory name to form the merge directory.
const MERGE_DIR_SUFFIX: &str = "-merge";

/// Key of the single record inside the `merge-finished` file.
const MERGE_FINISHED_KEY: &[u8] = b"merge.finished";

impl Engine {
    /// Rewrites all archived data files, dropping every record the index no
    /// longer points at. User writes proceed concurrently: the engine lock is
    /// only held while the active file is rotated out of the merge set.
    ///
    /// # Errors
    ///
    /// `MergeInProgress` when a merge is already running,
    /// `MergeRatioUnreached` below the configured reclaimable threshold, and
    /// `NoEnoughSpaceForMerge` when the rewrite could not fit on disk.
    pub fn merge(&self) -> Result<()> {
        {
            let state = self.state.read();
            if state.active_file.is_none() {
                return Ok(());
            }
        }

        let mut state = self.state.write();
        if state.is_merging {
            return Err(Error::MergeInProgress);
        }

        let total_size = fsutil::dir_size(&self.config.dir_path)?;
        if (state.reclaim_size as f32) / (total_size as f32) < self.config.merge_ratio {
            return Err(Error::MergeRatioUnreached);
        }
        let available = fsutil::available_disk_size(&self.config.dir_path)?;
        if total_size - state.reclaim_size >= available {
            return Err(Error::NoEnoughSpaceForMerge);
        }

        state.is_merging = true;
        let prepared = self.prepare_merge(&mut state);
        let (merge_file_ids, non_merge_file_id) = match prepared {
            Ok(prep) => prep,
            Err(e) => {
                state.is_merging = false;
                return Err(e);
            }
        };
        drop(state);

        log::info!(
            "merging {} file(s), non-merge file id {}",
            merge_file_ids.len(),
            non_merge_file_id,
        );
        let result = self.rewrite_merge_files(&merge_file_ids, non_merge_file_id);
        self.state.write().is_merging = false;
        result
    }

    /// Under the write lock: sync and archive the active file, open a fresh
    /// one so writes continue, and snapshot the merge set.
    fn prepare_merge(&self, state: &mut EngineState) -> Result<(Vec<u32>, u32)> {
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
        self.open_active_file(state, old_id + 1)?;

        let mut merge_file_ids: Vec<u32> = state.archived_files.keys().copied().collect();
        merge_file_ids.sort_unstable();
        Ok((merge_file_ids, old_id + 1))
    }

    /// The unlocked bulk of the merge. Correctness relies on the index being
    /// the source of truth for liveness and on archived files being
    /// immutable, so fresh read-only handles are safe here.
    fn rewrite_merge_files(&self, merge_file_ids: &[u32], non_merge_file_id: u32) -> Result<()> {
        let merge_path = self.merge_path();
        if merge_path.exists() {
            fs::remove_dir_all(&merge_path)?;
        }
        fs::create_dir_all(&merge_path)?;

        // A scratch engine owns the rewritten files; its index is write-only
        // scratch, so the cheap in-memory variant always suffices.
        let mut merge_config = self.config.clone();
        merge_config.dir_path = merge_path.clone();
        merge_config.sync_writes = false;
        merge_config.mmap_at_startup = false;
        merge_config.index_type = IndexType::BTree;
        let merge_engine = Engine::open(merge_config)?;

        let mut hint_file = DataFile::open_hint_file(&merge_path)?;

        for &file_id in merge_file_ids {
            let data_file = DataFile::open(&self.config.dir_path, file_id, IoKind::Standard)?;
            let mut offset = 0u64;
            loop {
                let (record, size) = match data_file.read_record(offset) {
                    Ok(found) => found,
                    Err(RecordError::Eof) => break,
                    Err(e) => return Err(e.into()),
                };

                let (real_key, _) = parse_key(&record.key);
                // Only the record the index still points at is live.
                if let Some(live) = self.index.get(&real_key)? {
                    if live.file_id == file_id && live.offset == offset {
                        // Transactions in the merge set are all complete;
                        // consolidate them back to the plain sequence.
                        let rewritten = LogRecord {
                            key: encode_key_with_seq(&real_key, NON_TRANSACTION_SEQ_NO),
                            value: record.value,
                            rec_type: record.rec_type,
                        };
                        let pos = {
                            let mut merge_state = merge_engine.state.write();
                            merge_engine.append_record(&mut merge_state, &rewritten)?
                        };
                        hint_file.write_hint_record(&real_key, &pos)?;
                    }
                }
                offset += size;
            }
        }

        hint_file.sync()?;
        merge_engine.sync()?;

        // The marker is the commit point of the whole merge.
        let mut finished_file = DataFile::open_merge_finished_file(&merge_path)?;
        let marker = LogRecord {
            key: MERGE_FINISHED_KEY.to_vec(),
            value: non_merge_file_id.to_string().into_bytes(),
            rec_type: LogRecordType::Normal,
        };
        let (encoded, _) = marker.encode();
        finished_file.append(&encoded)?;
        finished_file.sync()?;

        log::info!("merge finished, awaiting installation on next open");
        Ok(())
    }

    /// `<parent>/<base>-merge`, sibling of the database directory.
    pub(crate) fn merge_path(&self) -> PathBuf {
        let parent = self
            .config
            .dir_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new(""));
        let mut name = self
            .config
            .dir_path
            .file_name()
            .map(OsString::from)
            .unwrap_or_default();
        name.push(MERGE_DIR_SUFFIX);
        parent.join(name)
    }

    /// Reads the first id that did not participate in the merge out of the
    /// `merge-finished` file under `dir`.
    pub(crate) fn non_merge_file_id(&self, dir: &std::path::Path) -> Result<u32> {
        let finished_file = DataFile::open_merge_finished_file(dir)?;
        let (record, _) = finished_file.read_record(0)?;
        std::str::from_utf8(&record.value)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::DataDirectoryCorrupted)
    }

    /// Finalizes (or discards) merge residue at open.
    ///
    /// With the marker present: every data file strictly below the recorded
    /// non-merge id is superseded and deleted, then the merge output moves
    /// into the main directory. Without it the residue is removed untouched.
    /// Both outcomes are idempotent, which is what makes merge crash-safe.
    pub(crate) fn load_merge_files(&self) -> Result<()> {
        let merge_path = self.merge_path();
        if !merge_path.exists() {
            return Ok(());
        }

        let mut merge_finished = false;
        let mut file_names: Vec<OsString> = Vec::new();
        for entry in fs::read_dir(&merge_path)? {
            let name = entry?.file_name();
            if name == MERGE_FINISHED_FILE_NAME {
                merge_finished = true;
            }
            if name == SEQ_NO_FILE_NAME
                || name == FILE_LOCK_NAME
                || name == BPTREE_INDEX_FILE_NAME
            {
                continue;
            }
            file_names.push(name);
        }

        if !merge_finished {
            log::warn!("discarding unfinished merge residue at {:?}", merge_path);
            fs::remove_dir_all(&merge_path)?;
            return Ok(());
        }

        let non_merge_file_id = self.non_merge_file_id(&merge_path)?;

        // Superseded files first: their live records exist in the output.
        for file_id in 0..non_merge_file_id {
            let path = datafile::data_file_path(&self.config.dir_path, file_id);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        for name in file_names {
            let src = merge_path.join(&name);
            let dst = self.config.dir_path.join(&name);
            fs::rename(src, dst)?;
        }
        fs::remove_dir_all(&merge_path)?;

        log::info!("installed merge output into {:?}", self.config.dir_path);
        Ok(())
    }
}
