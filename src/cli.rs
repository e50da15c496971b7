use clap::Parser;
use std::path::PathBuf;

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default multipart body ceiling: 10 GiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024 * 1024;

// Command-line interface for the upload server.
#[derive(Parser, Debug, Clone)]
#[command(
    version,
    long_about = "A small HTTP file server that shares a directory tree.\n GET on a directory returns an HTML index, GET on a file streams it back.\n POST a multipart form with a file field named `upload` to drop a file into the directory you are viewing.\n Existing files are never overwritten: a clashing upload is answered with 409 Conflict.\n Requests that are missing answer 404, unsupported methods answer 405.\n",
    about = "Minimal HTTP file server with browsing, download and upload."
)]
pub struct Cli {
    /// Directory to serve; every request path is resolved below it.
    #[arg(short, long, default_value = ".")]
    pub directory: PathBuf,

    /// Host address to listen on (e.g., "127.0.0.1" for local only, "0.0.0.0" for everyone).
    #[arg(short, long, default_value = "0.0.0.0")]
    pub listen: String,

    /// Port number to listen on [default: 80, or 443 with --ssl].
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of worker threads handling requests concurrently.
    #[arg(short, long, default_value_t = 8)]
    pub threads: usize,

    /// Buffer size in bytes used when streaming files to clients.
    #[arg(short, long, default_value_t = 8192)]
    pub chunk_size: usize,

    /// Largest accepted multipart upload body, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_UPLOAD_SIZE)]
    pub max_upload_size: u64,

    /// Serve HTTPS using the certificate and key given with --cert and --key.
    #[arg(long, default_value_t = false, requires_all = ["cert", "key"])]
    pub ssl: bool,

    /// PEM file holding the server certificate chain.
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// PEM file holding the private key for --cert.
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Enable verbose logging (log level: debug).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Enable detailed logging (log level: info).
    #[arg(long, default_value_t = false)]
    pub detailed_logging: bool,
}
