#![allow(dead_code)]

use hup_sv::cli::{Cli, DEFAULT_MAX_UPLOAD_SIZE};
use hup_sv::config::ServerConfig;
use hup_sv::server::run_server;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tempfile::{tempdir, TempDir};

/// A server running on an OS-assigned port over a scratch directory.
pub struct TestServer {
    pub addr: SocketAddr,
    pub dir: TempDir,
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    /// Root contains `a.txt` (10 bytes) and an empty `Sub/`.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_UPLOAD_SIZE)
    }

    pub fn with_limit(max_upload_size: u64) -> Self {
        Self::start(|cli| cli.max_upload_size = max_upload_size)
    }

    /// Same tree, served over TLS with the `localhost` fixture certificate.
    pub fn with_tls() -> Self {
        Self::start(|cli| {
            cli.ssl = true;
            cli.cert = Some(fixture("localhost.pem"));
            cli.key = Some(fixture("localhost.key"));
        })
    }

    fn start(configure: impl FnOnce(&mut Cli)) -> Self {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"0123456789").unwrap();
        fs::create_dir(dir.path().join("Sub")).unwrap();

        let mut cli = Cli {
            directory: dir.path().to_path_buf(),
            listen: "127.0.0.1".to_string(),
            port: Some(0),
            threads: 4,
            chunk_size: 1024,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            ssl: false,
            cert: None,
            key: None,
            verbose: false,
            detailed_logging: false,
        };
        configure(&mut cli);
        let config = ServerConfig::from_cli(&cli).unwrap();

        let (shutdown_tx, shutdown_rx) = mpsc::channel();
        let (addr_tx, addr_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            if let Err(e) = run_server(config, Some(shutdown_rx), Some(addr_tx)) {
                eprintln!("Server thread failed: {e}");
            }
        });
        let addr = addr_rx.recv().unwrap();

        TestServer {
            addr,
            dir,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

pub fn fixture(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shutdown_tx.send(()).ok();
            handle.join().unwrap();
        }
    }
}
