//! Small filesystem helpers for merge sizing and backup.

use std::fs;
use std::io;
use std::path::Path;

/// Total size in bytes of every file under `dir`, recursively.
pub(crate) fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            total += dir_size(&entry.path())?;
        } else {
            total += meta.len();
        }
    }
    Ok(total)
}

/// Free bytes on the filesystem holding `dir`.
pub(crate) fn available_disk_size(dir: &Path) -> io::Result<u64> {
    fs2::available_space(dir)
}

/// Recursively copies `src` into `dst`, skipping names in `exclude`.
pub(crate) fn copy_dir(src: &Path, dst: &Path, exclude: &[&str]) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if exclude.iter().any(|ex| name == *ex) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        if entry.metadata()?.is_dir() {
            copy_dir(&src_path, &dst_path, exclude)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}
