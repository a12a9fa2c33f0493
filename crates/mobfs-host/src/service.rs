//! The `FileService` implementation.
//!
//! Serves stat/read/write/create/mkdir/remove/rename/chmod/truncate/readdir
//! plus the change-event stream, all read-through to the host filesystem.
//! Every path goes through the resolver; every I/O failure goes through one
//! status codec.

use std::io::SeekFrom;
use std::os::unix::fs::PermissionsExt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tonic::{Request, Response, Status};

use mobfs_proto::{
    ChangeType, ChmodRequest, ChmodResponse, CreateRequest, CreateResponse, FileChangeEvent,
    FileService, MkdirRequest, MkdirResponse, ReadDirRequest, ReadDirResponse, ReadFileRequest,
    ReadFileResponse, RemoveRequest, RemoveResponse, RenameRequest, RenameResponse, StatRequest,
    StatResponse, TruncateRequest, TruncateResponse, WatchChangesRequest, WriteFileRequest,
    WriteFileResponse,
};

use crate::constants::MAX_READ_SIZE;
use crate::meta::file_info;
use crate::path::{PathError, PathResolver};
use crate::watcher::{ChangeEvent, ChangeKind, Subscription, WorkspaceWatcher};

/// Serves files from the workspace root.
pub struct FileServer {
    resolver: PathResolver,
    watcher: Option<Arc<WorkspaceWatcher>>,
}

impl FileServer {
    pub fn new(root: impl Into<std::path::PathBuf>, watcher: Option<Arc<WorkspaceWatcher>>) -> Self {
        Self {
            resolver: PathResolver::new(root),
            watcher,
        }
    }

    fn resolve(&self, wire_path: &str) -> Result<std::path::PathBuf, Status> {
        self.resolver.resolve(wire_path).map_err(path_status)
    }
}

fn path_status(err: PathError) -> Status {
    Status::invalid_argument(err.to_string())
}

/// Host I/O failure to RPC status.
fn io_status(err: std::io::Error) -> Status {
    use std::io::ErrorKind;
    match err.kind() {
        ErrorKind::NotFound => Status::not_found(err.to_string()),
        ErrorKind::PermissionDenied => Status::permission_denied(err.to_string()),
        ErrorKind::AlreadyExists => Status::already_exists(err.to_string()),
        _ => Status::internal(err.to_string()),
    }
}

fn base_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "/".to_string())
}

fn event_to_proto(event: ChangeEvent) -> FileChangeEvent {
    let kind = match event.kind {
        ChangeKind::Created => ChangeType::Created,
        ChangeKind::Modified => ChangeType::Modified,
        ChangeKind::Deleted => ChangeType::Deleted,
        ChangeKind::Renamed => ChangeType::Renamed,
    };
    FileChangeEvent {
        path: event.path,
        kind: kind as i32,
    }
}

/// Server stream for WatchChanges. Dropping it (RPC context end) drops the
/// subscription, which unsubscribes from the watcher.
pub struct ChangeEventStream {
    sub: Subscription,
}

impl tokio_stream::Stream for ChangeEventStream {
    type Item = Result<FileChangeEvent, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.sub
            .poll_recv(cx)
            .map(|event| event.map(|event| Ok(event_to_proto(event))))
    }
}

#[tonic::async_trait]
impl FileService for FileServer {
    async fn stat(&self, request: Request<StatRequest>) -> Result<Response<StatResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;
        let meta = fs::symlink_metadata(&abs).await.map_err(io_status)?;
        Ok(Response::new(StatResponse {
            info: Some(file_info(&base_name(&abs), &meta)),
        }))
    }

    async fn read_file(
        &self,
        request: Request<ReadFileRequest>,
    ) -> Result<Response<ReadFileResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;

        let mut file = fs::File::open(&abs).await.map_err(io_status)?;

        let mut length = req.length;
        if length <= 0 || length > MAX_READ_SIZE {
            length = MAX_READ_SIZE;
        }

        if req.offset > 0 {
            file.seek(SeekFrom::Start(req.offset as u64))
                .await
                .map_err(|err| Status::internal(format!("seek: {err}")))?;
        }

        let mut data = vec![0u8; length as usize];
        let read = file.read(&mut data).await.map_err(io_status)?;
        data.truncate(read);

        Ok(Response::new(ReadFileResponse { data }))
    }

    async fn write_file(
        &self,
        request: Request<WriteFileRequest>,
    ) -> Result<Response<WriteFileResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;

        // Never creates; clients open a path with Create first.
        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(req.truncate)
            .open(&abs)
            .await
            .map_err(io_status)?;

        if req.offset > 0 {
            file.seek(SeekFrom::Start(req.offset as u64))
                .await
                .map_err(|err| Status::internal(format!("seek: {err}")))?;
        }

        file.write_all(&req.data)
            .await
            .map_err(|err| Status::internal(format!("write: {err}")))?;

        Ok(Response::new(WriteFileResponse {}))
    }

    async fn read_dir(
        &self,
        request: Request<ReadDirRequest>,
    ) -> Result<Response<ReadDirResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;

        let mut dir = fs::read_dir(&abs).await.map_err(io_status)?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.next_entry().await.map_err(io_status)? {
            // Entries that disappear between listing and stat are skipped.
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            entries.push(file_info(&name, &meta));
        }

        Ok(Response::new(ReadDirResponse { entries }))
    }

    async fn create(
        &self,
        request: Request<CreateRequest>,
    ) -> Result<Response<CreateResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;

        let mode = if req.mode == 0 { 0o644 } else { req.mode };
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(&abs)
            .await
            .map_err(io_status)?;

        Ok(Response::new(CreateResponse {}))
    }

    async fn mkdir(
        &self,
        request: Request<MkdirRequest>,
    ) -> Result<Response<MkdirResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;

        let mode = if req.mode == 0 { 0o755 } else { req.mode };
        fs::create_dir(&abs).await.map_err(io_status)?;
        fs::set_permissions(&abs, std::fs::Permissions::from_mode(mode))
            .await
            .map_err(io_status)?;

        Ok(Response::new(MkdirResponse {}))
    }

    async fn remove(
        &self,
        request: Request<RemoveRequest>,
    ) -> Result<Response<RemoveResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;

        let meta = fs::symlink_metadata(&abs).await.map_err(io_status)?;
        if meta.is_dir() {
            fs::remove_dir(&abs).await.map_err(io_status)?;
        } else {
            fs::remove_file(&abs).await.map_err(io_status)?;
        }

        Ok(Response::new(RemoveResponse {}))
    }

    async fn rename(
        &self,
        request: Request<RenameRequest>,
    ) -> Result<Response<RenameResponse>, Status> {
        let req = request.into_inner();
        let old_abs = self.resolve(&req.old_path)?;
        let new_abs = self.resolve(&req.new_path)?;

        fs::rename(&old_abs, &new_abs).await.map_err(io_status)?;
        Ok(Response::new(RenameResponse {}))
    }

    async fn chmod(&self, request: Request<ChmodRequest>) -> Result<Response<ChmodResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;

        fs::set_permissions(&abs, std::fs::Permissions::from_mode(req.mode))
            .await
            .map_err(io_status)?;
        Ok(Response::new(ChmodResponse {}))
    }

    async fn truncate(
        &self,
        request: Request<TruncateRequest>,
    ) -> Result<Response<TruncateResponse>, Status> {
        let req = request.into_inner();
        let abs = self.resolve(&req.path)?;

        let size = u64::try_from(req.size)
            .map_err(|_| Status::invalid_argument("negative truncate size"))?;

        let file = fs::OpenOptions::new()
            .write(true)
            .open(&abs)
            .await
            .map_err(io_status)?;
        file.set_len(size).await.map_err(io_status)?;

        Ok(Response::new(TruncateResponse {}))
    }

    type WatchChangesStream = ChangeEventStream;

    async fn watch_changes(
        &self,
        _request: Request<WatchChangesRequest>,
    ) -> Result<Response<Self::WatchChangesStream>, Status> {
        let watcher = self
            .watcher
            .as_ref()
            .ok_or_else(|| Status::unavailable("file watcher not running"))?;

        Ok(Response::new(ChangeEventStream {
            sub: watcher.subscribe(),
        }))
    }
}
