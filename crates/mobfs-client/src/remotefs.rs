//! The FUSE proxy filesystem.
//!
//! Every kernel operation is translated into a file-service call; nothing
//! is cached. The kernel speaks inodes while the wire speaks paths, so the
//! proxy keeps an inode table alongside the open-handle table. Writes are
//! last-writer-wins by design: concurrent editors see whichever bytes
//! reached the host last.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::future::Future;
use std::sync::Arc;

use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use parking_lot::Mutex;

use crate::attr::{file_type, fill_attr};
use crate::constants::ATTR_TTL;
use crate::handles::HandleTable;
use crate::transport::{FileTransport, FsError};

const ROOT_INO: u64 = 1;

/// Synthetic statfs numbers for a filesystem whose real capacity lives on
/// another machine: 2^28 x 4 KiB blocks, about 1 TiB.
const STATFS_BLOCKS: u64 = 1 << 28;
const STATFS_BFREE: u64 = 1 << 27;
const STATFS_FILES: u64 = 1 << 20;
const STATFS_FFREE: u64 = 1 << 19;
const STATFS_BSIZE: u32 = 4096;
const STATFS_NAMELEN: u32 = 255;

/// Bidirectional inode <-> workspace-path map. Inode 1 is the mount root
/// `/`; the rest are allocated monotonically as the kernel discovers paths.
struct InodeTable {
    next: u64,
    by_ino: HashMap<u64, String>,
    by_path: HashMap<String, u64>,
}

impl InodeTable {
    fn new() -> Self {
        let mut by_ino = HashMap::new();
        let mut by_path = HashMap::new();
        by_ino.insert(ROOT_INO, "/".to_string());
        by_path.insert("/".to_string(), ROOT_INO);
        Self {
            next: 2,
            by_ino,
            by_path,
        }
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.by_ino.get(&ino).cloned()
    }

    fn ino_for(&mut self, path: &str) -> u64 {
        if let Some(&ino) = self.by_path.get(path) {
            return ino;
        }
        let ino = self.next;
        self.next += 1;
        self.by_ino.insert(ino, path.to_string());
        self.by_path.insert(path.to_string(), ino);
        ino
    }

    fn forget_path(&mut self, path: &str) {
        if let Some(ino) = self.by_path.remove(path) {
            self.by_ino.remove(&ino);
        }
    }

    /// Keep the inode stable across a rename so open kernel references
    /// keep resolving.
    fn remap(&mut self, old_path: &str, new_path: &str) {
        if let Some(ino) = self.by_path.remove(old_path) {
            self.by_path.insert(new_path.to_string(), ino);
            self.by_ino.insert(ino, new_path.to_string());
        }
    }
}

fn child_path(parent: &str, name: &OsStr) -> Option<String> {
    let name = name.to_str()?;
    if parent == "/" {
        Some(format!("/{name}"))
    } else {
        Some(format!("{parent}/{name}"))
    }
}

fn parent_path(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

/// Proxies kernel filesystem operations to a remote file service.
pub struct RemoteFs {
    transport: Arc<dyn FileTransport>,
    runtime: tokio::runtime::Handle,
    handles: HandleTable,
    inodes: Mutex<InodeTable>,
}

impl RemoteFs {
    pub fn new(transport: Arc<dyn FileTransport>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            transport,
            runtime,
            handles: HandleTable::new(),
            inodes: Mutex::new(InodeTable::new()),
        }
    }

    /// Bridge a transport future onto the FUSE callback thread.
    fn call<T>(&self, fut: impl Future<Output = Result<T, FsError>>) -> Result<T, FsError> {
        self.runtime.block_on(fut)
    }

    fn path_of(&self, ino: u64) -> Option<String> {
        self.inodes.lock().path_of(ino)
    }

    fn errno(&self, err: &FsError, op: &str, path: &str) -> i32 {
        if err.is_transport() {
            tracing::warn!(op = op, path = path, error = %err, "rpc failure");
        }
        err.errno()
    }
}

impl Filesystem for RemoteFs {
    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };

        match self.call(self.transport.stat(&path)) {
            Ok(info) => {
                let ino = self.inodes.lock().ino_for(&path);
                reply.entry(&ATTR_TTL, &fill_attr(ino, &info, req.uid(), req.gid()), 0);
            }
            Err(err) => reply.error(self.errno(&err, "lookup", &path)),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.call(self.transport.stat(&path)) {
            Ok(info) => reply.attr(&ATTR_TTL, &fill_attr(ino, &info, req.uid(), req.gid())),
            Err(err) => reply.error(self.errno(&err, "getattr", &path)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        if let Some(size) = size {
            if let Err(err) = self.call(self.transport.truncate(&path, size as i64)) {
                reply.error(self.errno(&err, "truncate", &path));
                return;
            }
        }

        if let Some(mode) = mode {
            if let Err(err) = self.call(self.transport.chmod(&path, mode)) {
                reply.error(self.errno(&err, "chmod", &path));
                return;
            }
        }

        match self.call(self.transport.stat(&path)) {
            Ok(info) => reply.attr(&ATTR_TTL, &fill_attr(ino, &info, req.uid(), req.gid())),
            Err(err) => reply.error(self.errno(&err, "setattr", &path)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let infos = match self.call(self.transport.read_dir(&path)) {
            Ok(infos) => infos,
            Err(err) => {
                reply.error(self.errno(&err, "readdir", &path));
                return;
            }
        };

        // The host never synthesizes dot entries; the client always leads
        // with them.
        let parent_ino = {
            let mut inodes = self.inodes.lock();
            inodes.ino_for(parent_path(&path))
        };
        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (parent_ino, FileType::Directory, "..".to_string()),
        ];
        for info in &infos {
            let Some(entry_path) = child_path(&path, OsStr::new(&info.name)) else {
                continue;
            };
            let entry_ino = self.inodes.lock().ino_for(&entry_path);
            entries.push((entry_ino, file_type(info.mode), info.name.clone()));
        }

        for (i, (entry_ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        // Probe existence; the actual I/O stays path-addressed.
        match self.call(self.transport.stat(&path)) {
            Ok(_) => reply.opened(self.handles.alloc(&path), 0),
            Err(err) => reply.error(self.errno(&err, "open", &path)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        self.handles.free(fh);
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.call(self.transport.stat(&path)) {
            Ok(_) => reply.opened(self.handles.alloc(&path), 0),
            Err(err) => reply.error(self.errno(&err, "opendir", &path)),
        }
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, fh: u64, _flags: i32, reply: ReplyEmpty) {
        self.handles.free(fh);
        reply.ok();
    }

    #[allow(clippy::too_many_arguments)]
    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(path) = self.handles.path(fh).or_else(|| self.path_of(ino)) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.call(self.transport.read_file(&path, offset, size as i64)) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(self.errno(&err, "read", &path)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(path) = self.handles.path(fh).or_else(|| self.path_of(ino)) else {
            reply.error(libc::ENOENT);
            return;
        };

        match self.call(
            self.transport
                .write_file(&path, data.to_vec(), offset, false),
        ) {
            Ok(()) => reply.written(data.len() as u32),
            Err(err) => reply.error(self.errno(&err, "write", &path)),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };

        let created = self
            .call(self.transport.create(&path, mode))
            .and_then(|()| self.call(self.transport.stat(&path)));
        match created {
            Ok(info) => {
                let ino = self.inodes.lock().ino_for(&path);
                let fh = self.handles.alloc(&path);
                reply.created(
                    &ATTR_TTL,
                    &fill_attr(ino, &info, req.uid(), req.gid()),
                    0,
                    fh,
                    0,
                );
            }
            Err(err) => reply.error(self.errno(&err, "create", &path)),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };

        let made = self
            .call(self.transport.mkdir(&path, mode))
            .and_then(|()| self.call(self.transport.stat(&path)));
        match made {
            Ok(info) => {
                let ino = self.inodes.lock().ino_for(&path);
                reply.entry(&ATTR_TTL, &fill_attr(ino, &info, req.uid(), req.gid()), 0);
            }
            Err(err) => reply.error(self.errno(&err, "mkdir", &path)),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };

        match self.call(self.transport.remove(&path)) {
            Ok(()) => {
                self.inodes.lock().forget_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(self.errno(&err, "unlink", &path)),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.path_of(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(path) = child_path(&parent_path, name) else {
            reply.error(libc::EINVAL);
            return;
        };

        // Same RPC as unlink; the host picks the right removal.
        match self.call(self.transport.remove(&path)) {
            Ok(()) => {
                self.inodes.lock().forget_path(&path);
                reply.ok();
            }
            Err(err) => reply.error(self.errno(&err, "rmdir", &path)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (old_path, new_path) = {
            let inodes = self.inodes.lock();
            let old_parent = inodes.path_of(parent);
            let new_parent = inodes.path_of(newparent);
            match (old_parent, new_parent) {
                (Some(op), Some(np)) => (child_path(&op, name), child_path(&np, newname)),
                _ => {
                    reply.error(libc::ENOENT);
                    return;
                }
            }
        };
        let (Some(old_path), Some(new_path)) = (old_path, new_path) else {
            reply.error(libc::EINVAL);
            return;
        };

        match self.call(self.transport.rename(&old_path, &new_path)) {
            Ok(()) => {
                self.inodes.lock().remap(&old_path, &new_path);
                reply.ok();
            }
            Err(err) => reply.error(self.errno(&err, "rename", &old_path)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        reply.statfs(
            STATFS_BLOCKS,
            STATFS_BFREE,
            STATFS_BFREE,
            STATFS_FILES,
            STATFS_FFREE,
            STATFS_BSIZE,
            STATFS_NAMELEN,
            STATFS_BSIZE,
        );
    }

    fn flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        // Writes go straight to the host; there is nothing local to flush
        // and no durability claim to honor.
        reply.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_table_roots_at_one() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INO).as_deref(), Some("/"));
        assert_eq!(table.path_of(2), None);
    }

    #[test]
    fn inode_allocation_is_stable_per_path() {
        let mut table = InodeTable::new();
        let a = table.ino_for("/a.txt");
        let b = table.ino_for("/b.txt");
        assert_eq!(a, 2);
        assert_eq!(b, 3);
        assert_eq!(table.ino_for("/a.txt"), a);
    }

    #[test]
    fn rename_keeps_the_inode() {
        let mut table = InodeTable::new();
        let ino = table.ino_for("/old.txt");
        table.remap("/old.txt", "/new.txt");

        assert_eq!(table.path_of(ino).as_deref(), Some("/new.txt"));
        assert_eq!(table.ino_for("/new.txt"), ino);
    }

    #[test]
    fn forget_path_drops_both_directions() {
        let mut table = InodeTable::new();
        let ino = table.ino_for("/gone.txt");
        table.forget_path("/gone.txt");

        assert_eq!(table.path_of(ino), None);
        assert_ne!(table.ino_for("/gone.txt"), ino, "a fresh inode is allocated");
    }

    #[test]
    fn child_paths_join_under_the_root() {
        assert_eq!(
            child_path("/", OsStr::new("a.txt")).as_deref(),
            Some("/a.txt")
        );
        assert_eq!(
            child_path("/sub", OsStr::new("b.txt")).as_deref(),
            Some("/sub/b.txt")
        );
    }

    #[test]
    fn parent_paths() {
        assert_eq!(parent_path("/"), "/");
        assert_eq!(parent_path("/a"), "/");
        assert_eq!(parent_path("/a/b/c"), "/a/b");
    }
}
