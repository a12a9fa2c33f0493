//! RPC transport abstraction for the filesystem proxy.
//!
//! The proxy talks to [`FileTransport`], not to the generated gRPC stubs,
//! so it can be exercised against an in-memory fake. [`GrpcTransport`] is
//! the wire implementation; every call carries a fixed deadline.

use async_trait::async_trait;
use thiserror::Error;
use tonic::transport::Channel;
use tonic::{Code, Request, Status};

use mobfs_proto::{
    ChmodRequest, CreateRequest, FileInfo, FileServiceClient, MkdirRequest, ReadDirRequest,
    ReadFileRequest, RemoveRequest, RenameRequest, StatRequest, TruncateRequest, WriteFileRequest,
};

use crate::constants::RPC_TIMEOUT;

/// A file-service failure, as seen by the proxy.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("host unavailable: {0}")]
    Unavailable(String),

    #[error("rpc: {0}")]
    Rpc(String),
}

impl FsError {
    /// The errno handed back to the kernel bridge.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound(_) => libc::ENOENT,
            FsError::PermissionDenied(_) => libc::EACCES,
            FsError::AlreadyExists(_) => libc::EEXIST,
            FsError::InvalidArgument(_) => libc::EINVAL,
            FsError::DeadlineExceeded(_) | FsError::Unavailable(_) | FsError::Rpc(_) => libc::EIO,
        }
    }

    /// Transport-class failures are worth a warning; everything else is
    /// ordinary filesystem traffic.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            FsError::DeadlineExceeded(_) | FsError::Unavailable(_) | FsError::Rpc(_)
        )
    }
}

impl From<Status> for FsError {
    fn from(status: Status) -> Self {
        let message = status.message().to_string();
        match status.code() {
            Code::NotFound => FsError::NotFound(message),
            Code::PermissionDenied => FsError::PermissionDenied(message),
            Code::AlreadyExists => FsError::AlreadyExists(message),
            Code::InvalidArgument => FsError::InvalidArgument(message),
            Code::DeadlineExceeded => FsError::DeadlineExceeded(message),
            Code::Unavailable => FsError::Unavailable(message),
            _ => FsError::Rpc(message),
        }
    }
}

/// The file-service operations the proxy needs.
#[async_trait]
pub trait FileTransport: Send + Sync {
    async fn stat(&self, path: &str) -> Result<FileInfo, FsError>;
    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>, FsError>;
    async fn read_file(&self, path: &str, offset: i64, length: i64) -> Result<Vec<u8>, FsError>;
    async fn write_file(
        &self,
        path: &str,
        data: Vec<u8>,
        offset: i64,
        truncate: bool,
    ) -> Result<(), FsError>;
    async fn create(&self, path: &str, mode: u32) -> Result<(), FsError>;
    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), FsError>;
    async fn remove(&self, path: &str) -> Result<(), FsError>;
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), FsError>;
    async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError>;
    async fn truncate(&self, path: &str, size: i64) -> Result<(), FsError>;
}

/// gRPC-backed transport.
pub struct GrpcTransport {
    client: FileServiceClient<Channel>,
}

impl GrpcTransport {
    pub fn new(channel: Channel) -> Self {
        Self {
            client: FileServiceClient::new(channel),
        }
    }

    fn request<T>(message: T) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(RPC_TIMEOUT);
        request
    }
}

#[async_trait]
impl FileTransport for GrpcTransport {
    async fn stat(&self, path: &str) -> Result<FileInfo, FsError> {
        let response = self
            .client
            .clone()
            .stat(Self::request(StatRequest {
                path: path.to_string(),
            }))
            .await?;
        response
            .into_inner()
            .info
            .ok_or_else(|| FsError::Rpc("stat response missing file info".to_string()))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<FileInfo>, FsError> {
        let response = self
            .client
            .clone()
            .read_dir(Self::request(ReadDirRequest {
                path: path.to_string(),
            }))
            .await?;
        Ok(response.into_inner().entries)
    }

    async fn read_file(&self, path: &str, offset: i64, length: i64) -> Result<Vec<u8>, FsError> {
        let response = self
            .client
            .clone()
            .read_file(Self::request(ReadFileRequest {
                path: path.to_string(),
                offset,
                length,
            }))
            .await?;
        Ok(response.into_inner().data)
    }

    async fn write_file(
        &self,
        path: &str,
        data: Vec<u8>,
        offset: i64,
        truncate: bool,
    ) -> Result<(), FsError> {
        self.client
            .clone()
            .write_file(Self::request(WriteFileRequest {
                path: path.to_string(),
                data,
                offset,
                truncate,
            }))
            .await?;
        Ok(())
    }

    async fn create(&self, path: &str, mode: u32) -> Result<(), FsError> {
        self.client
            .clone()
            .create(Self::request(CreateRequest {
                path: path.to_string(),
                mode,
            }))
            .await?;
        Ok(())
    }

    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), FsError> {
        self.client
            .clone()
            .mkdir(Self::request(MkdirRequest {
                path: path.to_string(),
                mode,
            }))
            .await?;
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), FsError> {
        self.client
            .clone()
            .remove(Self::request(RemoveRequest {
                path: path.to_string(),
            }))
            .await?;
        Ok(())
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        self.client
            .clone()
            .rename(Self::request(RenameRequest {
                old_path: old_path.to_string(),
                new_path: new_path.to_string(),
            }))
            .await?;
        Ok(())
    }

    async fn chmod(&self, path: &str, mode: u32) -> Result<(), FsError> {
        self.client
            .clone()
            .chmod(Self::request(ChmodRequest {
                path: path.to_string(),
                mode,
            }))
            .await?;
        Ok(())
    }

    async fn truncate(&self, path: &str, size: i64) -> Result<(), FsError> {
        self.client
            .clone()
            .truncate(Self::request(TruncateRequest {
                path: path.to_string(),
                size,
            }))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_errno() {
        let cases = [
            (Code::NotFound, libc::ENOENT),
            (Code::PermissionDenied, libc::EACCES),
            (Code::AlreadyExists, libc::EEXIST),
            (Code::InvalidArgument, libc::EINVAL),
            (Code::DeadlineExceeded, libc::EIO),
            (Code::Unavailable, libc::EIO),
            (Code::Internal, libc::EIO),
        ];
        for (code, errno) in cases {
            let err = FsError::from(Status::new(code, "boom"));
            assert_eq!(err.errno(), errno, "code {code:?}");
        }
    }

    #[test]
    fn transport_classification() {
        assert!(FsError::Unavailable("down".into()).is_transport());
        assert!(FsError::DeadlineExceeded("slow".into()).is_transport());
        assert!(FsError::Rpc("h2".into()).is_transport());
        assert!(!FsError::NotFound("f".into()).is_transport());
    }
}
