use crate::error::AppError;
use crate::transport::TlsStream;
use log::info;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConnection;
use std::fs::File;
use std::io::BufReader;
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;

/// Builds the TLS server settings from a PEM certificate chain and private key.
pub fn load_tls_config(cert: &Path, key: &Path) -> Result<Arc<rustls::ServerConfig>, AppError> {
    let certs = load_certs(cert)?;
    let key = load_private_key(key)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| AppError::Tls(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| AppError::Tls(format!("certificate rejected: {e}")))?;

    info!("Loaded TLS certificate from '{}'", cert.display());
    Ok(Arc::new(config))
}

fn open_pem(path: &Path) -> Result<BufReader<File>, AppError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| AppError::Tls(format!("cannot open {}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, AppError> {
    let mut reader = open_pem(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Tls(format!("invalid certificate {}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(AppError::Tls(format!(
            "no certificate found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, AppError> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| AppError::Tls(format!("invalid private key {}: {e}", path.display())))?
        .ok_or_else(|| AppError::Tls(format!("no private key found in {}", path.display())))
}

/// Runs the TLS handshake on a freshly accepted socket.
pub fn accept(
    config: &Arc<rustls::ServerConfig>,
    mut sock: TcpStream,
) -> Result<TlsStream, AppError> {
    let mut conn =
        ServerConnection::new(Arc::clone(config)).map_err(|e| AppError::Tls(e.to_string()))?;
    while conn.is_handshaking() {
        conn.complete_io(&mut sock)?;
    }
    Ok(TlsStream::new(conn, sock))
}
