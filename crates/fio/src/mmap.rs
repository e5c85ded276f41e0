use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use memmap2::Mmap;

use crate::IoManager;

/// Read-only memory-mapped IO manager.
///
/// Used only to accelerate the sequential record scan when a database opens.
/// The map is taken once at open; a zero-length file maps to an empty buffer
/// (mapping zero bytes is not portable, so we simply skip it).
///
/// `write` and `sync` return [`io::ErrorKind::Unsupported`]: this backend
/// must never carry live writes, and failing loudly beats corrupting a write
/// cursor with a silent no-op.
pub struct MmapIo {
    map: Option<Mmap>,
}

impl MmapIo {
    /// Opens (creating if absent) and maps `path` read-only.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let map = if len == 0 {
            None
        } else {
            // Safety: the engine holds an exclusive directory lock, and data
            // files are append-only; the mapped prefix is immutable.
            Some(unsafe { Mmap::map(&file)? })
        };
        Ok(Self { map })
    }

    fn len(&self) -> u64 {
        self.map.as_ref().map_or(0, |m| m.len() as u64)
    }
}

impl IoManager for MmapIo {
    fn read(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let len = self.len();
        if offset >= len || offset + buf.len() as u64 > len {
            return Err(io::ErrorKind::UnexpectedEof.into());
        }
        let map = self
            .map
            .as_ref()
            .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))?;
        let start = offset as usize;
        buf.copy_from_slice(&map[start..start + buf.len()]);
        Ok(buf.len())
    }

    fn write(&self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mmap io manager is read-only",
        ))
    }

    fn sync(&self) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "mmap io manager is read-only",
        ))
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len())
    }
}
