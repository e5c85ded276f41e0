use std::fs;
use std::path::Path;

use crate::{Config, IndexType};

/// Baseline test configuration: plain file IO, no forced syncs.
pub fn test_config(dir: &Path) -> Config {
    Config {
        dir_path: dir.to_path_buf(),
        file_size: 64 * 1024 * 1024,
        sync_writes: false,
        bytes_per_sync: 0,
        index_type: IndexType::BTree,
        mmap_at_startup: false,
        merge_ratio: 0.5,
    }
}

/// Deterministic 20-byte test key.
pub fn test_key(n: usize) -> Vec<u8> {
    format!("lodekv-key-{:09}", n).into_bytes()
}

/// Deterministic value padded to `len` bytes.
pub fn value_of_len(n: usize, len: usize) -> Vec<u8> {
    let mut v = format!("lodekv-value-{:09}-", n).into_bytes();
    while v.len() < len {
        v.push(b'x');
    }
    v.truncate(len);
    v
}

pub fn test_value(n: usize) -> Vec<u8> {
    value_of_len(n, 24)
}

pub fn count_data_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|name| name.ends_with(".data"))
                .unwrap_or(false)
        })
        .count()
}
