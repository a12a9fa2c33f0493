//! Host orchestrator.
//!
//! Owns the watcher, the auto-commit engine, and the gRPC server, and runs
//! them until the shutdown token fires. Shutdown order matters: the engine
//! drains its final commit before the watcher closes and the server stops
//! accepting requests.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use mobfs_gitops::AutoCommit;
use mobfs_proto::FileServiceServer;

use crate::service::FileServer;
use crate::watcher::WorkspaceWatcher;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("resolve workspace root: {0}")]
    Root(std::io::Error),

    #[error("workspace root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("start watcher: {0}")]
    Watcher(#[from] notify::Error),

    #[error("invalid listen address: {0}")]
    Addr(#[from] std::net::AddrParseError),

    #[error("serve: {0}")]
    Serve(#[from] tonic::transport::Error),
}

/// A mob session host for one workspace directory.
pub struct Host {
    root: PathBuf,
    port: u16,
    session_id: String,
}

impl Host {
    pub fn new(root: impl AsRef<Path>, port: u16, session_id: String) -> Result<Self, HostError> {
        let root = root.as_ref().canonicalize().map_err(HostError::Root)?;
        let meta = std::fs::metadata(&root).map_err(HostError::Root)?;
        if !meta.is_dir() {
            return Err(HostError::NotADirectory(root));
        }

        Ok(Self {
            root,
            port,
            session_id,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Serve the workspace until the shutdown token is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), HostError> {
        let watcher = Arc::new(WorkspaceWatcher::new(&self.root)?);

        let engine = self.start_engine().await.map(Arc::new);

        // A dedicated watcher subscription drives the commit pipeline.
        if let Some(engine) = &engine {
            let engine = Arc::clone(engine);
            let mut changes = watcher.subscribe();
            tokio::spawn(async move {
                while changes.recv().await.is_some() {
                    engine.notify_change();
                }
            });
        }

        let service = FileServer::new(&self.root, Some(Arc::clone(&watcher)));
        let addr: SocketAddr = format!("0.0.0.0:{}", self.port).parse()?;

        let branch = format!("mob/session-{}", self.session_id);
        tracing::info!(
            path = %self.root.display(),
            session = %self.session_id,
            branch = %branch,
            "starting mob session"
        );
        println!("Session: {} | Branch: {}", self.session_id, branch);
        println!("Listening on {addr}");
        println!("Join with: mobfs --connect <YOUR_IP>:{}", self.port);
        println!(
            "Workspace: {}",
            self.root
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.root.display().to_string())
        );

        // Stop the engine (final commit + branch restore) and the watcher
        // before the server stops accepting requests.
        let grpc_shutdown = CancellationToken::new();
        {
            let shutdown = shutdown.clone();
            let grpc_shutdown = grpc_shutdown.clone();
            let watcher = Arc::clone(&watcher);
            let engine = engine.clone();
            tokio::spawn(async move {
                shutdown.cancelled().await;
                tracing::info!("shutting down");
                if let Some(engine) = engine {
                    engine.stop().await;
                }
                watcher.close();
                grpc_shutdown.cancel();
            });
        }

        Server::builder()
            .add_service(FileServiceServer::new(service))
            .serve_with_shutdown(addr, grpc_shutdown.cancelled())
            .await?;

        Ok(())
    }

    /// Best-effort engine startup: a workspace without git (or one where
    /// the session branch cannot be created) still serves files.
    async fn start_engine(&self) -> Option<AutoCommit> {
        let engine = match AutoCommit::new(&self.root, &self.session_id).await {
            Ok(engine) => engine,
            Err(err) => {
                tracing::warn!(error = %err, "git integration disabled (not a git repo?)");
                return None;
            }
        };

        match engine.start().await {
            Ok(()) => Some(engine),
            Err(err) => {
                tracing::warn!(error = %err, "failed to start git integration");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_root() {
        let result = Host::new("/definitely/not/here", 7654, "abcd1234".into());
        assert!(matches!(result, Err(HostError::Root(_))));
    }

    #[test]
    fn rejects_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let result = Host::new(&file, 7654, "abcd1234".into());
        assert!(matches!(result, Err(HostError::NotADirectory(_))));
    }

    #[test]
    fn canonicalizes_root() {
        let dir = tempfile::tempdir().unwrap();
        let host = Host::new(dir.path(), 7654, "abcd1234".into()).unwrap();
        assert!(host.root().is_absolute());
        assert_eq!(host.session_id(), "abcd1234");
    }
}
