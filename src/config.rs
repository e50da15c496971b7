use crate::cli::{Cli, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
use crate::error::AppError;
use crate::tls::load_tls_config;
use std::path::PathBuf;
use std::sync::Arc;

/// Settings shared read-only by every request handler.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Canonical root directory; request paths are anchored here.
    pub root: PathBuf,
    pub listen: String,
    pub port: u16,
    pub threads: usize,
    pub chunk_size: usize,
    pub max_upload_size: u64,
    /// Present when connections are served over TLS.
    pub tls: Option<Arc<rustls::ServerConfig>>,
}

impl ServerConfig {
    pub fn from_cli(cli: &Cli) -> Result<Self, AppError> {
        let root = cli.directory.canonicalize().map_err(|e| {
            AppError::DirectoryNotFound(format!("{} ({e})", cli.directory.display()))
        })?;
        if !root.is_dir() {
            return Err(AppError::DirectoryNotFound(
                cli.directory.to_string_lossy().into_owned(),
            ));
        }
        if cli.threads == 0 {
            return Err(AppError::InternalServerError(
                "thread count must be at least 1".to_string(),
            ));
        }
        if cli.chunk_size == 0 {
            return Err(AppError::InternalServerError(
                "chunk size must be at least 1 byte".to_string(),
            ));
        }

        let tls = if cli.ssl {
            match (&cli.cert, &cli.key) {
                (Some(cert), Some(key)) => Some(load_tls_config(cert, key)?),
                _ => {
                    return Err(AppError::Tls(
                        "--ssl needs both --cert and --key".to_string(),
                    ))
                }
            }
        } else {
            None
        };
        let default_port = if tls.is_some() {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_HTTP_PORT
        };

        Ok(Self {
            root,
            listen: cli.listen.clone(),
            port: cli.port.unwrap_or(default_port),
            threads: cli.threads,
            chunk_size: cli.chunk_size,
            max_upload_size: cli.max_upload_size,
            tls,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::DEFAULT_MAX_UPLOAD_SIZE;
    use std::fs::File;
    use tempfile::tempdir;

    fn cli_for(directory: PathBuf) -> Cli {
        Cli {
            directory,
            listen: "127.0.0.1".to_string(),
            port: Some(0),
            threads: 2,
            chunk_size: 1024,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            ssl: false,
            cert: None,
            key: None,
            verbose: false,
            detailed_logging: false,
        }
    }

    #[test]
    fn test_root_is_canonicalized() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::from_cli(&cli_for(dir.path().join("."))).unwrap();
        assert_eq!(config.root, dir.path().canonicalize().unwrap());
        assert_eq!(config.bind_address(), "127.0.0.1:0");
    }

    #[test]
    fn test_rejects_missing_or_file_root() {
        let dir = tempdir().unwrap();
        let missing = ServerConfig::from_cli(&cli_for(dir.path().join("nope")));
        assert!(matches!(missing, Err(AppError::DirectoryNotFound(_))));

        let file = dir.path().join("plain.txt");
        File::create(&file).unwrap();
        let not_dir = ServerConfig::from_cli(&cli_for(file));
        assert!(matches!(not_dir, Err(AppError::DirectoryNotFound(_))));
    }

    #[test]
    fn test_rejects_zero_threads() {
        let dir = tempdir().unwrap();
        let mut cli = cli_for(dir.path().to_path_buf());
        cli.threads = 0;
        assert!(ServerConfig::from_cli(&cli).is_err());
    }

    fn fixture(name: &str) -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    #[test]
    fn test_port_defaults_follow_tls() {
        let dir = tempdir().unwrap();
        let mut cli = cli_for(dir.path().to_path_buf());
        cli.port = None;
        let plain = ServerConfig::from_cli(&cli).unwrap();
        assert_eq!(plain.port, 80);
        assert!(plain.tls.is_none());

        cli.ssl = true;
        cli.cert = Some(fixture("localhost.pem"));
        cli.key = Some(fixture("localhost.key"));
        let secure = ServerConfig::from_cli(&cli).unwrap();
        assert_eq!(secure.port, 443);
        assert!(secure.tls.is_some());

        cli.port = Some(8443);
        assert_eq!(ServerConfig::from_cli(&cli).unwrap().port, 8443);
    }

    #[test]
    fn test_ssl_requires_certificate_files() {
        let dir = tempdir().unwrap();
        let mut cli = cli_for(dir.path().to_path_buf());
        cli.ssl = true;
        assert!(matches!(ServerConfig::from_cli(&cli), Err(AppError::Tls(_))));

        cli.cert = Some(dir.path().join("missing.pem"));
        cli.key = Some(dir.path().join("missing.key"));
        assert!(matches!(ServerConfig::from_cli(&cli), Err(AppError::Tls(_))));
    }
}
