//! Wire metadata to kernel stat form.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{FileAttr, FileType};
use mobfs_proto::FileInfo;

const BLOCK_SIZE: u32 = 4096;

/// Decode the file type from the wire mode's `S_IFMT` bits.
pub fn file_type(mode: u32) -> FileType {
    match mode & libc::S_IFMT as u32 {
        m if m == libc::S_IFDIR as u32 => FileType::Directory,
        m if m == libc::S_IFLNK as u32 => FileType::Symlink,
        m if m == libc::S_IFIFO as u32 => FileType::NamedPipe,
        m if m == libc::S_IFSOCK as u32 => FileType::Socket,
        m if m == libc::S_IFCHR as u32 => FileType::CharDevice,
        m if m == libc::S_IFBLK as u32 => FileType::BlockDevice,
        _ => FileType::RegularFile,
    }
}

/// Build the kernel attributes for a remote file.
///
/// The host only ships a modification time, so every timestamp mirrors it;
/// ownership is pinned to the mounting user.
pub fn fill_attr(ino: u64, info: &FileInfo, uid: u32, gid: u32) -> FileAttr {
    let size = info.size.max(0) as u64;
    let mtime = UNIX_EPOCH + Duration::from_secs(info.mod_time_unix.max(0) as u64);

    FileAttr {
        ino,
        size,
        blocks: size.div_ceil(512),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: file_type(info.mode),
        perm: (info.mode & 0o7777) as u16,
        nlink: if info.is_dir { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(mode: u32, size: i64, is_dir: bool) -> FileInfo {
        FileInfo {
            name: "x".to_string(),
            size,
            mode,
            mod_time_unix: 1_700_000_000,
            is_dir,
        }
    }

    #[test]
    fn type_bits_decode() {
        assert_eq!(file_type(0o100644), FileType::RegularFile);
        assert_eq!(file_type(0o040755), FileType::Directory);
        assert_eq!(file_type(0o120777), FileType::Symlink);
        assert_eq!(file_type(0o010644), FileType::NamedPipe);
        assert_eq!(file_type(0o140644), FileType::Socket);
        assert_eq!(file_type(0o020644), FileType::CharDevice);
        assert_eq!(file_type(0o060644), FileType::BlockDevice);
    }

    #[test]
    fn attr_preserves_size_mode_and_mtime() {
        let attr = fill_attr(7, &info(0o100640, 1025, false), 1000, 1000);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.size, 1025);
        assert_eq!(attr.perm, 0o640);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.nlink, 1);
        assert_eq!(attr.blocks, 3); // ceil(1025 / 512)
        assert_eq!(
            attr.mtime,
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
        assert_eq!(attr.atime, attr.mtime);
        assert_eq!(attr.ctime, attr.mtime);
    }

    #[test]
    fn directories_get_two_links() {
        let attr = fill_attr(1, &info(0o040755, 0, true), 0, 0);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn special_permission_bits_survive() {
        let attr = fill_attr(2, &info(0o104755, 0, false), 0, 0);
        assert_eq!(attr.perm, 0o4755); // setuid preserved
    }
}
