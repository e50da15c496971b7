use crate::config::ServerConfig;
use crate::error::AppError;
use crate::http::handle_client;
use crate::tls;
use log::{debug, error, info, warn};
use rand::Rng;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{mpsc, Arc};
use std::time::Duration;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
use threadpool::ThreadPool;

/// Accepts connections until `shutdown_rx` fires (or forever without one).
///
/// The bound address is reported through `addr_tx`, which lets callers bind
/// port 0 and learn the port the OS picked.
pub fn run_server(
    config: ServerConfig,
    shutdown_rx: Option<mpsc::Receiver<()>>,
    addr_tx: Option<mpsc::Sender<SocketAddr>>,
) -> Result<(), AppError> {
    let listener = TcpListener::bind(config.bind_address())?;
    let local_addr = listener.local_addr()?;
    listener.set_nonblocking(true)?;

    if let Some(tx) = addr_tx {
        if tx.send(local_addr).is_err() {
            return Err(AppError::InternalServerError(
                "Failed to report the bound server address".to_string(),
            ));
        }
    }

    info!(
        "Server listening on {}://{} for directory '{}' ({} worker threads)",
        if config.tls.is_some() { "https" } else { "http" },
        local_addr,
        config.root.display(),
        config.threads
    );

    let pool = ThreadPool::new(config.threads);
    let config = Arc::new(config);

    'server_loop: loop {
        if let Some(ref rx) = shutdown_rx {
            if rx.try_recv().is_ok() {
                info!("Shutdown signal received. Shutting down gracefully.");
                break 'server_loop;
            }
        }

        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = stream.set_nonblocking(false) {
                    error!("Could not switch connection from {peer} to blocking mode: {e}");
                    continue;
                }
                let config = Arc::clone(&config);
                let log_prefix = format!("[ReqID: {}][Peer: {peer}]", generate_request_id());

                pool.execute(move || {
                    debug!("{log_prefix} Handling client connection");
                    serve_connection(stream, &config, &log_prefix);
                    debug!("{log_prefix} Client handled");
                });
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(100));
                continue;
            }
            Err(e) => {
                error!("Error accepting connection: {e}");
            }
        }
    }

    info!("Server shutting down gracefully.");
    Ok(())
}

fn serve_connection(stream: TcpStream, config: &ServerConfig, log_prefix: &str) {
    let Some(tls_config) = &config.tls else {
        handle_client(stream, config, log_prefix);
        return;
    };

    if let Err(e) = stream.set_read_timeout(Some(HANDSHAKE_TIMEOUT)) {
        debug!("{log_prefix} Could not set handshake timeout: {e}");
        return;
    }
    match tls::accept(tls_config, stream) {
        Ok(tls_stream) => {
            if let Err(e) = tls_stream.sock.set_read_timeout(None) {
                debug!("{log_prefix} Could not clear handshake timeout: {e}");
                return;
            }
            handle_client(tls_stream, config, log_prefix);
        }
        Err(e) => warn!("{log_prefix} TLS handshake failed: {e}"),
    }
}

fn generate_request_id() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(8)
        .map(char::from)
        .collect()
}
