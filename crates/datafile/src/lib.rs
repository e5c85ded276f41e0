//! # DataFile — Append-Only Log Files
//!
//! A LodeKV database directory is a rolling sequence of immutable,
//! append-only data files plus a handful of well-known bookkeeping files:
//!
//! ```text
//! <dir>/
//!   000000000.data, 000000001.data, ...   record logs (dense, increasing ids)
//!   hint-index                            position index written by merge
//!   merge-finished                        marker: first id NOT merged
//!   seq-no                                last committed transaction id
//! ```
//!
//! Exactly one data file — the one with the highest id — is *active* and
//! accepts appends; all others are archived and read-only. A [`DataFile`]
//! composes an id, a write cursor, and a [`fio::IoManager`], and knows how to
//! frame and verify individual records (see [`record`] for the byte layout).
//!
//! Reading a record back performs a bounded header read (clipped to the file
//! size), short-circuits on the zero sentinel, validates the decoded lengths
//! against the file length, and re-checks the CRC over the full payload.

pub mod record;

pub use record::{
    decode_header, decode_position, decode_uvarint, decode_varint, encode_position,
    encode_uvarint, encode_varint, record_crc, LogRecord, LogRecordType, Position, RecordError,
    RecordHeader, Result, MAX_HEADER_SIZE,
};

use std::path::{Path, PathBuf};

use fio::{new_io_manager, IoKind, IoManager};

/// Suffix of every record log.
pub const DATA_FILE_SUFFIX: &str = ".data";
/// Position index produced by merge to accelerate the next open.
pub const HINT_FILE_NAME: &str = "hint-index";
/// Marker written when a merge completed; its value is the first id that did
/// not participate.
pub const MERGE_FINISHED_FILE_NAME: &str = "merge-finished";
/// Highest committed transaction id, written on close for the persistent
/// index variant.
pub const SEQ_NO_FILE_NAME: &str = "seq-no";

/// Path of the data file with the given id: `<dir>/<9-digit-id>.data`.
pub fn data_file_path(dir: &Path, file_id: u32) -> PathBuf {
    dir.join(format!("{:09}{}", file_id, DATA_FILE_SUFFIX))
}

/// One append-only log file: id + write cursor + IO backend.
pub struct DataFile {
    file_id: u32,
    write_off: u64,
    io: Box<dyn IoManager>,
}

impl DataFile {
    /// Opens (or creates) the data file with `file_id` under `dir`.
    pub fn open(dir: &Path, file_id: u32, kind: IoKind) -> Result<Self> {
        Self::open_path(&data_file_path(dir, file_id), file_id, kind)
    }

    /// Opens the hint file under `dir`.
    pub fn open_hint_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(HINT_FILE_NAME), 0, IoKind::Standard)
    }

    /// Opens the merge-finished marker file under `dir`.
    pub fn open_merge_finished_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(MERGE_FINISHED_FILE_NAME), 0, IoKind::Standard)
    }

    /// Opens the sequence-number file under `dir`.
    pub fn open_seq_no_file(dir: &Path) -> Result<Self> {
        Self::open_path(&dir.join(SEQ_NO_FILE_NAME), 0, IoKind::Standard)
    }

    fn open_path(path: &Path, file_id: u32, kind: IoKind) -> Result<Self> {
        let io = new_io_manager(path, kind)?;
        Ok(Self {
            file_id,
            write_off: 0,
            io,
        })
    }

    pub fn file_id(&self) -> u32 {
        self.file_id
    }

    pub fn write_off(&self) -> u64 {
        self.write_off
    }

    /// Repositions the write cursor; used once by recovery after replay.
    pub fn set_write_off(&mut self, off: u64) {
        self.write_off = off;
    }

    pub fn size(&self) -> Result<u64> {
        Ok(self.io.size()?)
    }

    /// Reads the record starting at `offset`.
    ///
    /// Returns the decoded record and its total encoded length, or
    /// [`RecordError::Eof`] when `offset` is at/after the end of valid data.
    pub fn read_record(&self, offset: u64) -> Result<(LogRecord, u64)> {
        let file_size = self.io.size()?;
        if offset >= file_size {
            return Err(RecordError::Eof);
        }

        // The last record may sit closer than a full header to end-of-file.
        let header_len = std::cmp::min(MAX_HEADER_SIZE as u64, file_size - offset) as usize;
        let mut header_buf = vec![0u8; header_len];
        self.io.read(&mut header_buf, offset)?;

        let Some((header, header_size)) = decode_header(&header_buf) else {
            return Err(RecordError::Eof);
        };
        if header.crc == 0 && header.key_size == 0 && header.value_size == 0 {
            return Err(RecordError::Eof);
        }
        if header.key_size < 0
            || header.value_size < 0
            || header.key_size as u64 > file_size
            || header.value_size as u64 > file_size
        {
            return Err(RecordError::InvalidSize);
        }

        let key_size = header.key_size as usize;
        let value_size = header.value_size as usize;
        let total = header_size as u64 + key_size as u64 + value_size as u64;

        let mut payload = vec![0u8; key_size + value_size];
        if !payload.is_empty() {
            self.io.read(&mut payload, offset + header_size as u64)?;
        }
        let value = payload.split_off(key_size);
        let key = payload;

        let crc = record_crc(&header_buf[4..header_size], &key, &value);
        if crc != header.crc {
            return Err(RecordError::InvalidCrc);
        }

        let rec_type = LogRecordType::try_from(header.rec_type)?;
        Ok((
            LogRecord {
                key,
                value,
                rec_type,
            },
            total,
        ))
    }

    /// Appends raw frame bytes and advances the write cursor.
    pub fn append(&mut self, buf: &[u8]) -> Result<()> {
        let n = self.io.write(buf)?;
        self.write_off += n as u64;
        Ok(())
    }

    /// Writes a hint record: `key` → encoded `pos`, framed like any record.
    pub fn write_hint_record(&mut self, key: &[u8], pos: &Position) -> Result<()> {
        let record = LogRecord {
            key: key.to_vec(),
            value: encode_position(pos),
            rec_type: LogRecordType::Normal,
        };
        let (buf, _) = record.encode();
        self.append(&buf)
    }

    pub fn sync(&self) -> Result<()> {
        Ok(self.io.sync()?)
    }

    /// Swaps the IO backend, e.g. from the startup mmap back to a standard
    /// handle before serving writes. The old backend closes on drop.
    pub fn set_io_manager(&mut self, dir: &Path, kind: IoKind) -> Result<()> {
        self.io = new_io_manager(&data_file_path(dir, self.file_id), kind)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests;
