//! Host side of mobfs.
//!
//! Exposes a workspace directory over the `FileService` gRPC surface,
//! watches the workspace subtree for changes, and feeds quiescent changes
//! into the auto-commit engine.

pub mod constants;
pub mod host;
pub mod meta;
pub mod path;
pub mod service;
pub mod watcher;

pub use host::{Host, HostError};
pub use path::PathResolver;
pub use service::FileServer;
pub use watcher::{ChangeEvent, ChangeKind, Subscription, WorkspaceWatcher};
