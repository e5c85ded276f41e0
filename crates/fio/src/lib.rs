//! # FIO — File IO Managers
//!
//! The lowest layer of the LodeKV storage engine: an abstraction over a
//! single append-only file. Everything above this crate (data files, the
//! engine's recovery scan, the merge rewrite) performs its disk IO through
//! the [`IoManager`] trait.
//!
//! Two backends exist:
//!
//! | Backend    | Opened as                  | Used for                        |
//! |------------|----------------------------|---------------------------------|
//! | [`FileIo`] | create + read + append     | all live reads and writes       |
//! | [`MmapIo`] | read-only memory map       | accelerating the startup scan   |
//!
//! The mmap backend exists *only* to speed up sequential record replay when
//! the engine opens a database directory; it rejects `write` and `sync`.
//! The engine swaps a data file's manager back to [`FileIo`] before serving
//! writes (see `DataFile::set_io_manager` in the `datafile` crate).
//!
//! Closing is RAII: dropping a manager closes the underlying handle.

mod file_io;
mod mmap;

pub use file_io::FileIo;
pub use mmap::MmapIo;

use std::io;
use std::path::Path;

/// Which IO backend to open a file with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
    /// Standard buffered file handle: read + append + fsync.
    Standard,
    /// Read-only memory map; `write`/`sync` are rejected.
    Mmap,
}

/// Abstraction over a single append-only file.
///
/// Implementations must be usable through a shared reference: positioned
/// reads never move a shared cursor, and appends always land at end-of-file.
pub trait IoManager: Send + Sync {
    /// Reads up to `buf.len()` bytes starting at `offset`, filling `buf`
    /// completely or failing with `UnexpectedEof`.
    fn read(&self, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Appends `buf` at end-of-file, returning the number of bytes written.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Durability barrier: flushes file content to stable storage.
    fn sync(&self) -> io::Result<()>;

    /// Current size of the file in bytes.
    fn size(&self) -> io::Result<u64>;
}

/// Opens `path` with the requested backend.
pub fn new_io_manager(path: &Path, kind: IoKind) -> io::Result<Box<dyn IoManager>> {
    match kind {
        IoKind::Standard => Ok(Box::new(FileIo::open(path)?)),
        IoKind::Mmap => Ok(Box::new(MmapIo::open(path)?)),
    }
}
