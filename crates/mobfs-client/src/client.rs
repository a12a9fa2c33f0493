//! Client orchestrator.
//!
//! Dials the host, probes the connection by listing the workspace root,
//! prepares `$HOME/mob/<host>` as the mount point, and runs the FUSE
//! session until cancellation requests an unmount.

use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;
use std::sync::Arc;

use fuser::MountOption;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tonic::transport::Endpoint;

use crate::constants::DEFAULT_PORT;
use crate::remotefs::RemoteFs;
use crate::transport::{FileTransport, FsError, GrpcTransport};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: tonic::transport::Error,
    },

    #[error("probe host {addr}: {source}")]
    Probe { addr: String, source: FsError },

    #[error("HOME is not set; cannot pick a mount point")]
    NoHome,

    #[error("create mount point {path}: {source}")]
    MountPoint {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("FUSE mount failed: {0}; is FUSE installed? (apt install fuse3 / brew install macfuse)")]
    Mount(std::io::Error),
}

/// Derive the mount directory name from the connect target: the host
/// portion, up to the first `:`.
fn mount_name(addr: &str) -> &str {
    addr.split(':').next().unwrap_or(addr)
}

/// Append the default port when the target carries none.
fn normalize_addr(addr: &str) -> String {
    if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{addr}:{DEFAULT_PORT}")
    }
}

/// A mounted view of one remote workspace.
pub struct Client {
    addr: String,
}

impl Client {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: normalize_addr(addr),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Connect, mount, and block until the shutdown token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), ClientError> {
        tracing::info!(addr = %self.addr, "connecting to host");

        let endpoint = Endpoint::from_shared(format!("http://{}", self.addr)).map_err(|err| {
            ClientError::Connect {
                addr: self.addr.clone(),
                source: err,
            }
        })?;
        let channel = endpoint.connect().await.map_err(|err| ClientError::Connect {
            addr: self.addr.clone(),
            source: err,
        })?;
        let transport: Arc<dyn FileTransport> = Arc::new(GrpcTransport::new(channel));

        // Probe before mounting anything.
        let entries = transport
            .read_dir("/")
            .await
            .map_err(|err| ClientError::Probe {
                addr: self.addr.clone(),
                source: err,
            })?;

        let home = std::env::var_os("HOME").ok_or(ClientError::NoHome)?;
        let mount_path = PathBuf::from(home).join("mob").join(mount_name(&self.addr));
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(&mount_path)
            .map_err(|err| ClientError::MountPoint {
                path: mount_path.clone(),
                source: err,
            })?;

        tracing::info!(
            mount = %mount_path.display(),
            files = entries.len(),
            "connected to host workspace"
        );
        println!("Mounted workspace at {}", mount_path.display());
        println!("Ready. All changes sync to host.");

        let fs = RemoteFs::new(transport, tokio::runtime::Handle::current());
        let options = [
            MountOption::FSName("mobfs".to_string()),
            MountOption::AutoUnmount,
        ];
        let session =
            fuser::spawn_mount2(fs, &mount_path, &options).map_err(ClientError::Mount)?;

        shutdown.cancelled().await;
        tracing::info!("unmounting");
        session.join();

        Ok(())
    }
}
