//! Host-native metadata to wire form.
//!
//! The wire `mode` uses the Unix `st_mode` layout (permission bits, special
//! bits, type bits 12-15), which on Unix is exactly what
//! `MetadataExt::mode()` returns, so the value is forwarded verbatim rather
//! than rebuilt from per-platform constants.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

use mobfs_proto::FileInfo;

/// Build the wire metadata for a directory entry.
pub fn file_info(name: &str, meta: &Metadata) -> FileInfo {
    FileInfo {
        name: name.to_string(),
        size: meta.len() as i64,
        mode: meta.mode(),
        mod_time_unix: meta.mtime(),
        is_dir: meta.is_dir(),
    }
}
