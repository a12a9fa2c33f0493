//! Client side of mobfs.
//!
//! Dials a host's file service and mounts the remote workspace as a FUSE
//! filesystem under `$HOME/mob/<host>`. Every kernel operation is forwarded
//! over the wire; nothing is cached locally.

pub mod attr;
pub mod client;
pub mod constants;
pub mod handles;
pub mod remotefs;
pub mod transport;

pub use client::{Client, ClientError};
pub use remotefs::RemoteFs;
pub use transport::{FileTransport, FsError, GrpcTransport};
