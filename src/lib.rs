/// # hup_sv
///
/// A minimal HTTP file server: browse a directory tree, download files, and
/// upload new files through a multipart form.
///
/// The `run` function parses the command line, sets up logging and serves
/// until the process is stopped.
pub mod cli;
pub mod config;
pub mod error;
pub mod fs;
pub mod http;
pub mod resolver;
pub mod response;
pub mod server;
pub mod templates;
pub mod tls;
pub mod transport;
pub mod upload;
pub mod utils;


use crate::cli::Cli;
use crate::config::ServerConfig;
use clap::Parser;
use env_logger::Env;
use log::error;

/// Initializes the logger, parses command-line arguments, and starts the server.
///
/// If configuration or the server fails, the error is logged and the process exits.
pub fn run() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        "debug"
    } else if cli.detailed_logging {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    log::debug!("Log level set to: {log_level}");

    let result = ServerConfig::from_cli(&cli).and_then(|config| server::run_server(config, None, None));
    if let Err(e) = result {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}
