//! Integration tests for the file service over a real TCP gRPC connection.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_stream::StreamExt;
use tonic::transport::Server;

use mobfs_host::{FileServer, WorkspaceWatcher};
use mobfs_proto::{
    ChangeType, FileServiceClient, FileServiceServer, ReadDirRequest, ReadFileRequest,
    StatRequest, WatchChangesRequest, WriteFileRequest,
};

/// Start a file service on an ephemeral port and return its address.
async fn start_server(root: &Path, with_watcher: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let watcher = with_watcher.then(|| Arc::new(WorkspaceWatcher::new(root).unwrap()));
    let service = FileServer::new(root, watcher);

    tokio::spawn(async move {
        Server::builder()
            .add_service(FileServiceServer::new(service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr
}

async fn connect(addr: SocketAddr) -> FileServiceClient<tonic::transport::Channel> {
    FileServiceClient::connect(format!("http://{addr}"))
        .await
        .expect("connect to test server")
}

#[tokio::test]
async fn probe_and_stat_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::write(root.join("a.txt"), b"hello").unwrap();
    std::fs::create_dir(root.join("subdir")).unwrap();

    let addr = start_server(&root, false).await;
    let mut client = connect(addr).await;

    // The client-side startup probe: list the root.
    let listing = client
        .read_dir(ReadDirRequest {
            path: "/".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    let names: Vec<_> = listing.entries.iter().map(|e| e.name.as_str()).collect();
    assert!(names.contains(&"a.txt"));
    assert!(names.contains(&"subdir"));

    let stat = client
        .stat(StatRequest {
            path: "/a.txt".to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    let info = stat.info.unwrap();
    assert_eq!(info.size, 5);
    assert!(!info.is_dir);
}

#[tokio::test]
async fn write_read_round_trip_over_the_wire() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    std::fs::write(root.join("test.txt"), b"initial").unwrap();

    let addr = start_server(&root, false).await;
    let mut client = connect(addr).await;

    client
        .write_file(WriteFileRequest {
            path: "/test.txt".to_string(),
            data: b"updated".to_vec(),
            offset: 0,
            truncate: true,
        })
        .await
        .unwrap();

    let read = client
        .read_file(ReadFileRequest {
            path: "/test.txt".to_string(),
            offset: 0,
            length: 64,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(read.data, b"updated");

    // And the bytes really landed on the host filesystem.
    assert_eq!(std::fs::read(root.join("test.txt")).unwrap(), b"updated");
}

#[tokio::test]
async fn watch_stream_delivers_created_event() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();

    let addr = start_server(&root, true).await;
    let mut client = connect(addr).await;

    let mut stream = client
        .watch_changes(WatchChangesRequest {})
        .await
        .unwrap()
        .into_inner();

    // Let the subscription settle before producing the event.
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(root.join("fresh.txt"), b"x").unwrap();

    let event = tokio::time::timeout(Duration::from_secs(3), stream.next())
        .await
        .expect("timed out waiting for change event")
        .expect("stream ended")
        .expect("stream error");

    assert_eq!(event.path, "/fresh.txt");
    assert_eq!(event.kind, ChangeType::Created as i32);
}
