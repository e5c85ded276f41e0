//! # Engine — LodeKV Storage Core
//!
//! A Bitcask-family embedded key-value store: every write is appended to a
//! rolling sequence of immutable data files while an ordered index maps each
//! key to the position of its latest record on disk.
//!
//! ```text
//! put/delete            get
//!     |                  |
//!     v                  v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → encode record → append to active   │
//! │              |      (rotate at file_size)     │
//! │              v                                │
//! │           index.put(key, position)            │
//! │                                               │
//! │ read.rs  → index.get(key) → read_record(pos)  │
//! │                                               │
//! │ merge.rs → rewrite live records → <dir>-merge │
//! │            + hint file, installed on reopen   │
//! └───────────────────────────────────────────────┘
//!
//! <dir>/  000000000.data ... NNNNNNNNN.data   (highest id = active)
//!         hint-index  merge-finished  seq-no  flock  [bptree-index]
//! ```
//!
//! | Module        | Purpose                                                |
//! |---------------|--------------------------------------------------------|
//! | `lib.rs`      | `Engine` struct, `open`, `close`, `Drop`               |
//! | [`config`]    | `Config` + iterator/batch options                      |
//! | `write`       | `put`/`delete`/`sync`, append protocol, rotation       |
//! | `read`        | `get`, position → value resolution                     |
//! | `recovery`    | hint-file fast load, data-file replay, seq-no restore  |
//! | `batch`       | atomic multi-write commits (`WriteBatch`)              |
//! | `merge`       | space reclamation + crash-safe finalization at open    |
//! | `iterator`    | ordered iteration with prefix filtering                |
//! | `stats`       | `Stat` and `backup`                                    |
//!
//! ## Concurrency
//!
//! One engine per directory per process, enforced by an advisory `flock`.
//! An engine-wide readers-writer lock protects the active file, the archived
//! map and the durability counters; the index synchronizes itself. All
//! methods take `&self`, so a single `Arc<Engine>` serves any number of
//! threads.
//!
//! ## Durability
//!
//! `sync_writes` makes every append durable before it returns;
//! `bytes_per_sync` trades that for one fsync per N bytes; otherwise data
//! reaches disk at rotation, merge, `sync`, and `close`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use engine::{Config, Engine};
//!
//! let mut config = Config::default();
//! config.dir_path = "/tmp/lodekv-demo".into();
//!
//! let db = Engine::open(config)?;
//! db.put(b"hello", b"world")?;
//! assert_eq!(db.get(b"hello")?, b"world");
//! db.delete(b"hello")?;
//! db.close()?;
//! # Ok::<(), engine::Error>(())
//! ```

pub mod config;
pub mod error;

mod batch;
mod fsutil;
mod iterator;
mod merge;
mod read;
mod recovery;
mod stats;
mod write;

pub use batch::WriteBatch;
pub use config::{Config, IndexType, IteratorConfig, WriteBatchConfig};
pub use error::{Error, Result};
pub use iterator::EngineIterator;
pub use stats::Stat;

use std::collections::HashMap;
use std::fs;
use std::fs::File;
use std::sync::atomic::AtomicU64;

use fs2::FileExt;
use parking_lot::RwLock;

use datafile::DataFile;
use index::Indexer;

/// Advisory-lock file guarding the directory against a second engine.
pub const FILE_LOCK_NAME: &str = "flock";

/// Mutable engine state guarded by the engine-wide readers-writer lock.
pub(crate) struct EngineState {
    /// The unique data file accepting appends; `None` until the first write
    /// on a fresh directory.
    pub(crate) active_file: Option<DataFile>,
    /// Immutable, read-only data files by id.
    pub(crate) archived_files: HashMap<u32, DataFile>,
    /// Bytes appended since the last fsync; drives `bytes_per_sync`.
    pub(crate) bytes_since_sync: u64,
    /// Bytes made obsolete by later writes; the merge input estimate.
    pub(crate) reclaim_size: u64,
    /// A merge is running; guards against a second one.
    pub(crate) is_merging: bool,
}

/// The storage engine. See the crate docs for the overall design.
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) state: RwLock<EngineState>,
    pub(crate) index: Box<dyn Indexer>,
    /// Latest transaction id handed to a write batch.
    pub(crate) seq_no: AtomicU64,
    /// Holds the directory's advisory lock for the engine's lifetime.
    lock_file: File,
    /// The directory was empty (or absent) at open.
    pub(crate) is_initial: bool,
    /// A `seq-no` file was consumed at open (persistent-index path).
    pub(crate) seq_no_file_exists: bool,
}

impl Engine {
    /// Opens (or creates) the database at `config.dir_path` and replays
    /// on-disk state into the index.
    ///
    /// # Errors
    ///
    /// `Config` for an invalid configuration, `DatabaseInUse` when another
    /// engine holds the directory lock, `DataDirectoryCorrupted` when a data
    /// file name does not parse, plus any IO or corruption error from the
    /// replay. Partial work is undone on failure: the advisory lock releases
    /// with its handle.
    pub fn open(config: Config) -> Result<Engine> {
        check_config(&config)?;

        let dir = config.dir_path.clone();
        let mut is_initial = false;
        if !dir.is_dir() {
            is_initial = true;
            fs::create_dir_all(&dir)?;
        } else if fs::read_dir(&dir)?.next().is_none() {
            is_initial = true;
        }

        let lock_file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(dir.join(FILE_LOCK_NAME))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| Error::DatabaseInUse)?;

        let index = index::new_indexer(config.index_type, &dir, config.sync_writes)?;

        let mut engine = Engine {
            config,
            state: RwLock::new(EngineState {
                active_file: None,
                archived_files: HashMap::new(),
                bytes_since_sync: 0,
                reclaim_size: 0,
                is_merging: false,
            }),
            index,
            seq_no: AtomicU64::new(0),
            lock_file,
            is_initial,
            seq_no_file_exists: false,
        };

        // A finished merge from a previous run installs itself here; an
        // unfinished one is discarded.
        engine.load_merge_files()?;

        let file_ids = engine.load_data_files()?;

        if engine.config.index_type == IndexType::BPlusTree {
            // The index is already on disk; just restore the transaction id
            // and the write cursor.
            engine.load_seq_no()?;
            let mut state = engine.state.write();
            if let Some(active) = state.active_file.as_mut() {
                let size = active.size()?;
                active.set_write_off(size);
            }
        } else {
            engine.load_index_from_hint_file()?;
            engine.load_index_from_data_files(&file_ids)?;
            if engine.config.mmap_at_startup {
                engine.reset_io_kind()?;
            }
        }

        let key_count = engine.index.size()?;
        log::info!(
            "opened database at {:?}: {} data file(s), {} key(s)",
            engine.config.dir_path,
            file_ids.len(),
            key_count,
        );
        Ok(engine)
    }

    /// Number of live keys.
    pub fn len(&self) -> Result<usize> {
        Ok(self.index.size()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Gracefully shuts the engine down: persists the transaction id for the
    /// persistent-index variant, closes the index, syncs the active file and
    /// releases the directory lock.
    ///
    /// Consumes the engine so the lock is provably released; an engine
    /// dropped without `close` still syncs its active file on drop.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&self) -> Result<()> {
        {
            let state = self.state.read();
            if let Some(active) = state.active_file.as_ref() {
                if self.config.index_type == IndexType::BPlusTree {
                    self.persist_seq_no()?;
                }
                active.sync()?;
            }
        }
        self.index.close()?;
        self.lock_file.unlock()?;
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Best-effort durability for engines abandoned without close(); the
        // advisory lock releases with the file handle.
        if let Some(state) = self.state.try_read() {
            if let Some(active) = state.active_file.as_ref() {
                let _ = active.sync();
            }
        }
    }
}

fn check_config(config: &Config) -> Result<()> {
    if config.dir_path.as_os_str().is_empty() {
        return Err(Error::Config("database directory path is empty"));
    }
    if config.file_size == 0 {
        return Err(Error::Config("data file size must be positive"));
    }
    if !(0.0..=1.0).contains(&config.merge_ratio) {
        return Err(Error::Config("merge ratio must be between 0 and 1"));
    }
    Ok(())
}

#[cfg(test)]
mod tests;
