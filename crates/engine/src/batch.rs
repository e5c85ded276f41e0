//! Atomic write batches.
//!
//! A batch buffers mutations in memory and commits them as one transaction:
//! every staged record is appended with a fresh transaction id encoded into
//! its key, followed by a `TxnFinished` terminator. Recovery only installs
//! records whose terminator made it to disk, which is what gives commits
//! all-or-nothing visibility (see `recovery.rs`).

use std::collections::HashMap;
use std::sync::atomic::Ordering;

use datafile::{decode_uvarint, encode_uvarint, LogRecord, LogRecordType, Position};
use parking_lot::Mutex;

use crate::{Engine, Error, IndexType, Result, WriteBatchConfig};

/// Sequence number of every record written outside a batch.
pub const NON_TRANSACTION_SEQ_NO: u64 = 0;

/// Reserved key of the per-batch terminator record.
pub(crate) const TXN_FIN_KEY: &[u8] = b"txn-fin";

/// Prefixes `key` with the uvarint-encoded sequence number, producing the
/// on-disk key of every data record.
pub(crate) fn encode_key_with_seq(key: &[u8], seq_no: u64) -> Vec<u8> {
    let mut prefix = [0u8; 10];
    let n = encode_uvarint(seq_no, &mut prefix);
    let mut out = Vec::with_capacity(n + key.len());
    out.extend_from_slice(&prefix[..n]);
    out.extend_from_slice(key);
    out
}

/// Splits an on-disk key into the real key and its sequence number.
pub(crate) fn parse_key(key: &[u8]) -> (Vec<u8>, u64) {
    match decode_uvarint(key) {
        Some((seq_no, n)) => (key[n..].to_vec(), seq_no),
        None => (key.to_vec(), NON_TRANSACTION_SEQ_NO),
    }
}

/// A buffered set of mutations committed atomically.
///
/// Repeated writes to one key coalesce: only the latest staged record per
/// key reaches the log. The batch may be filled from several threads, but a
/// single commit runs at a time (the pending map's mutex is held for its
/// duration).
pub struct WriteBatch<'a> {
    engine: &'a Engine,
    config: WriteBatchConfig,
    pending: Mutex<HashMap<Vec<u8>, LogRecord>>,
}

impl Engine {
    /// Creates an empty batch against this engine.
    ///
    /// # Panics
    ///
    /// With the persistent B+-tree index, batches need the transaction id
    /// restored from the `seq-no` file; on a non-fresh directory without one
    /// the id would restart at zero and violate batch ordering, so this
    /// panics rather than corrupt.
    pub fn new_write_batch(&self, config: WriteBatchConfig) -> WriteBatch<'_> {
        if self.config.index_type == IndexType::BPlusTree
            && !self.seq_no_file_exists
            && !self.is_initial
        {
            panic!("cannot create write batch: sequence-number file does not exist");
        }
        WriteBatch {
            engine: self,
            config,
            pending: Mutex::new(HashMap::new()),
        }
    }
}

impl WriteBatch<'_> {
    /// Stages a put of `key` → `value`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }
        self.pending.lock().insert(
            key.to_vec(),
            LogRecord {
                key: key.to_vec(),
                value: value.to_vec(),
                rec_type: LogRecordType::Normal,
            },
        );
        Ok(())
    }

    /// Stages a delete of `key`.
    ///
    /// A key absent from both the index and the pending map is a no-op; a
    /// key only staged in this batch just drops its pending entry.
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::KeyIsEmpty);
        }

        let mut pending = self.pending.lock();
        if self.engine.index.get(key)?.is_none() {
            pending.remove(key);
            return Ok(());
        }
        pending.insert(
            key.to_vec(),
            LogRecord {
                key: key.to_vec(),
                value: Vec::new(),
                rec_type: LogRecordType::Deleted,
            },
        );
        Ok(())
    }

    /// Number of records currently staged.
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Commits the batch: appends every staged record tagged with a fresh
    /// transaction id, writes the terminator, then installs the records into
    /// the index in one pass.
    ///
    /// An empty batch is a no-op. Fails with `ExceedMaxBatchNum` when the
    /// batch outgrew its configured maximum; any error before the index pass
    /// leaves the index untouched (recovery discards the orphan records).
    pub fn commit(&self) -> Result<()> {
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }
        if pending.len() > self.config.max_batch_num {
            return Err(Error::ExceedMaxBatchNum);
        }

        let mut state = self.engine.state.write();
        let seq_no = self.engine.seq_no.fetch_add(1, Ordering::SeqCst) + 1;

        // Log phase: all records, then the terminator, contiguously under
        // the write lock.
        let mut positions: Vec<(Vec<u8>, LogRecordType, Position)> =
            Vec::with_capacity(pending.len());
        for (key, record) in pending.iter() {
            let tagged = LogRecord {
                key: encode_key_with_seq(key, seq_no),
                value: record.value.clone(),
                rec_type: record.rec_type,
            };
            let pos = self.engine.append_record(&mut state, &tagged)?;
            positions.push((key.clone(), record.rec_type, pos));
        }
        let terminator = LogRecord {
            key: encode_key_with_seq(TXN_FIN_KEY, seq_no),
            value: Vec::new(),
            rec_type: LogRecordType::TxnFinished,
        };
        self.engine.append_record(&mut state, &terminator)?;

        if self.config.sync_writes {
            if let Some(active) = state.active_file.as_ref() {
                active.sync()?;
            }
        }

        // Index phase, still under the engine write lock: readers hold the
        // read lock across their index lookups, so no `get` can observe a
        // half-installed batch.
        for (key, rec_type, pos) in positions {
            let old = match rec_type {
                LogRecordType::Normal => self.engine.index.put(key, pos)?,
                LogRecordType::Deleted => self.engine.index.delete(&key)?.0,
                LogRecordType::TxnFinished => None,
            };
            if let Some(old) = old {
                state.reclaim_size += u64::from(old.size);
            }
        }

        pending.clear();
        Ok(())
    }
}
