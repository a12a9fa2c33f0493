//! mobfs binary.
//!
//! Host mode (default) shares the current working directory; client mode
//! (`--connect`) mounts a remote workspace under `$HOME/mob/<host>`.
//!
//! ## Usage
//!
//! ```bash
//! # Share the current directory (default port 7654)
//! mobfs
//! mobfs --port 9000
//!
//! # Join someone else's session
//! mobfs --connect 10.0.0.5
//! mobfs --connect 10.0.0.5:9000
//! ```

use std::env;
use std::process::ExitCode;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mobfs_client::Client;
use mobfs_host::constants::DEFAULT_PORT;
use mobfs_host::Host;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!(
        r#"mobfs - mob programming over a mounted remote workspace

USAGE:
    mobfs [OPTIONS]

OPTIONS:
    --connect <ADDR>    Join a session as a client (host or host:port)
    --port <PORT>       Host-mode listen port (default: {port})
    --version           Print version and exit
    --help, -h          Show this help

Without --connect, mobfs hosts the current working directory and
auto-commits changes to a mob/session-<id> branch while the session runs.
"#,
        port = DEFAULT_PORT
    );
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().collect();
    let mut connect: Option<String> = None;
    let mut port = DEFAULT_PORT;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--version" => {
                println!("{VERSION}");
                return ExitCode::SUCCESS;
            }
            "--help" | "-h" => {
                print_usage();
                return ExitCode::SUCCESS;
            }
            "--connect" => {
                let Some(addr) = args.get(i + 1) else {
                    eprintln!("--connect requires an address");
                    return ExitCode::FAILURE;
                };
                connect = Some(addr.clone());
                i += 2;
            }
            "--port" => {
                let Some(value) = args.get(i + 1).and_then(|s| s.parse().ok()) else {
                    eprintln!("--port requires a port number");
                    return ExitCode::FAILURE;
                };
                port = value;
                i += 2;
            }
            other => {
                eprintln!("Unknown option: {other}");
                print_usage();
                return ExitCode::FAILURE;
            }
        }
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        });
    }

    if let Some(addr) = connect {
        return run_client(&addr, shutdown).await;
    }
    run_host(port, shutdown).await
}

async fn run_client(addr: &str, shutdown: CancellationToken) -> ExitCode {
    let client = Client::new(addr);
    if let Err(err) = client.run(shutdown).await {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run_host(port: u16, shutdown: CancellationToken) -> ExitCode {
    let cwd = match env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    // An opaque 8-char session token; everything below main treats it as
    // caller-supplied.
    let session_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();

    let host = match Host::new(&cwd, port, session_id) {
        Ok(host) => host,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = host.run(shutdown).await {
        eprintln!("Error: {err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
