//! Generated gRPC bindings for the mobfs file service.

/// Generated protobuf/gRPC types for `mobfs.v1`.
#[allow(clippy::all)]
pub mod v1 {
    tonic::include_proto!("mobfs.v1");
}

pub use v1::file_service_client::FileServiceClient;
pub use v1::file_service_server::{FileService, FileServiceServer};
pub use v1::*;
