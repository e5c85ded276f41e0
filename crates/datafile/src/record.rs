//! Log-record frame codec.
//!
//! ## Binary Record Format
//!
//! ```text
//! [crc32: u32 LE][type: u8][key_len: varint][val_len: varint][key][value]
//! ```
//!
//! The CRC covers every byte after itself (type through end of value).
//! Lengths are zigzag-encoded LEB128 varints, so the header is between 7 and
//! [`MAX_HEADER_SIZE`] (15) bytes. A header whose crc, key length and value
//! length are all zero marks the logical end of the log: appends never
//! produce it, so hitting one means the bytes beyond were never written.
//!
//! The same framing carries hint records (value = encoded [`Position`]) and
//! the merge-finished / sequence-number bookkeeping records.

use byteorder::{ByteOrder, LittleEndian};
use thiserror::Error;

/// crc (4) + type (1) + two varint lengths (5 each).
pub const MAX_HEADER_SIZE: usize = 4 + 1 + 5 + 5;

/// Errors surfaced while reading records back from disk.
#[derive(Debug, Error)]
pub enum RecordError {
    /// An underlying IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Logical end of the log: the zero sentinel, a truncated header, or an
    /// offset at/after end-of-file. Scans stop here; it is not corruption.
    #[error("end of data file reached")]
    Eof,

    /// The stored CRC does not match the record content.
    #[error("invalid crc value, log record maybe corrupted")]
    InvalidCrc,

    /// A decoded key/value length is negative or exceeds the file size.
    #[error("invalid size value in log record")]
    InvalidSize,

    /// The type byte is none of the known record types.
    #[error("unknown log record type {0}")]
    InvalidRecordType(u8),
}

pub type Result<T> = std::result::Result<T, RecordError>;

/// What a record means to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    /// A live key/value pair.
    Normal = 0,
    /// A tombstone: the key is deleted.
    Deleted = 1,
    /// Terminator making a batch's preceding records visible on recovery.
    TxnFinished = 2,
}

impl TryFrom<u8> for LogRecordType {
    type Error = RecordError;

    fn try_from(b: u8) -> Result<Self> {
        match b {
            0 => Ok(LogRecordType::Normal),
            1 => Ok(LogRecordType::Deleted),
            2 => Ok(LogRecordType::TxnFinished),
            other => Err(RecordError::InvalidRecordType(other)),
        }
    }
}

/// A single log record as it travels through the engine.
///
/// `key` is the *on-disk* key, i.e. already carrying the uvarint
/// sequence-number prefix; the engine strips it on the way back out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub rec_type: LogRecordType,
}

/// Decoded record header, before the payload is read.
#[derive(Debug, Clone, Copy)]
pub struct RecordHeader {
    pub crc: u32,
    pub rec_type: u8,
    pub key_size: i64,
    pub value_size: i64,
}

impl LogRecord {
    /// Encodes the record into a single frame, returning the buffer and its
    /// total length.
    pub fn encode(&self) -> (Vec<u8>, usize) {
        let mut header = [0u8; MAX_HEADER_SIZE];
        header[4] = self.rec_type as u8;

        let mut idx = 5;
        idx += encode_varint(self.key.len() as i64, &mut header[idx..]);
        idx += encode_varint(self.value.len() as i64, &mut header[idx..]);

        let size = idx + self.key.len() + self.value.len();
        let mut buf = Vec::with_capacity(size);
        buf.extend_from_slice(&header[..idx]);
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&buf[4..]);
        let crc = hasher.finalize();
        LittleEndian::write_u32(&mut buf[..4], crc);

        (buf, size)
    }

    /// Total encoded length without materializing the frame.
    pub fn encoded_len(&self) -> usize {
        let mut scratch = [0u8; 10];
        5 + encode_varint(self.key.len() as i64, &mut scratch[..])
            + encode_varint(self.value.len() as i64, &mut scratch[..])
            + self.key.len()
            + self.value.len()
    }
}

/// Decodes a record header from the front of `buf`.
///
/// Returns the header and the number of bytes it occupied, or `None` when
/// `buf` is too short to hold even the fixed prefix or a length varint is
/// malformed (both mean the log ends here).
pub fn decode_header(buf: &[u8]) -> Option<(RecordHeader, usize)> {
    if buf.len() <= 4 {
        return None;
    }

    let crc = LittleEndian::read_u32(&buf[..4]);
    let rec_type = buf[4];

    let mut idx = 5;
    let (key_size, n) = decode_varint(&buf[idx..])?;
    idx += n;
    let (value_size, n) = decode_varint(&buf[idx..])?;
    idx += n;

    Some((
        RecordHeader {
            crc,
            rec_type,
            key_size,
            value_size,
        },
        idx,
    ))
}

/// CRC of a record given the header tail (everything after the crc field up
/// to the end of the header) and the key/value payload.
pub fn record_crc(header_tail: &[u8], key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header_tail);
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

/// Where a record lives on disk: the index value and the hint-file payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Data file id.
    pub file_id: u32,
    /// Byte offset of the record frame within the file.
    pub offset: u64,
    /// Total encoded length of the frame.
    pub size: u32,
}

/// Encodes a position as three signed varints: file-id, offset, size.
pub fn encode_position(pos: &Position) -> Vec<u8> {
    let mut buf = [0u8; 30];
    let mut idx = 0;
    idx += encode_varint(pos.file_id as i64, &mut buf[idx..]);
    idx += encode_varint(pos.offset as i64, &mut buf[idx..]);
    idx += encode_varint(pos.size as i64, &mut buf[idx..]);
    buf[..idx].to_vec()
}

/// Decodes a position previously produced by [`encode_position`].
///
/// `None` means the buffer is malformed (truncated or over-long varint).
pub fn decode_position(buf: &[u8]) -> Option<Position> {
    let mut idx = 0;
    let (file_id, n) = decode_varint(&buf[idx..])?;
    idx += n;
    let (offset, n) = decode_varint(&buf[idx..])?;
    idx += n;
    let (size, _) = decode_varint(&buf[idx..])?;
    Some(Position {
        file_id: file_id as u32,
        offset: offset as u64,
        size: size as u32,
    })
}

// -------------------- varint primitives --------------------
//
// LEB128 with zigzag for the signed flavor; bit-compatible with the classic
// protobuf/Go encoding so the on-disk format stays exchangeable.

/// Writes `v` zigzag + LEB128 encoded, returning the bytes used.
pub fn encode_varint(v: i64, buf: &mut [u8]) -> usize {
    encode_uvarint(((v << 1) ^ (v >> 63)) as u64, buf)
}

/// Writes `v` LEB128 encoded, returning the bytes used.
pub fn encode_uvarint(mut v: u64, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while v >= 0x80 {
        buf[i] = (v as u8) | 0x80;
        v >>= 7;
        i += 1;
    }
    buf[i] = v as u8;
    i + 1
}

/// Reads a zigzag varint from the front of `buf`.
pub fn decode_varint(buf: &[u8]) -> Option<(i64, usize)> {
    let (ux, n) = decode_uvarint(buf)?;
    let mut v = (ux >> 1) as i64;
    if ux & 1 != 0 {
        v = !v;
    }
    Some((v, n))
}

/// Reads an unsigned varint from the front of `buf`.
///
/// `None` on truncation or a value longer than 10 bytes.
pub fn decode_uvarint(buf: &[u8]) -> Option<(u64, usize)> {
    let mut x: u64 = 0;
    let mut shift: u32 = 0;
    for (i, &b) in buf.iter().enumerate() {
        if i == 10 {
            return None;
        }
        if b < 0x80 {
            if i == 9 && b > 1 {
                return None;
            }
            return Some((x | (u64::from(b) << shift), i + 1));
        }
        x |= u64::from(b & 0x7f) << shift;
        shift += 7;
    }
    None
}
