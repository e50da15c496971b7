use crate::error::AppError;
use log::{debug, error, info, warn};
use std::fs::File;
use std::io::{prelude::*, ErrorKind};
use std::path::Path;

const SERVER_NAME: &str = concat!("hup_sv/", env!("CARGO_PKG_VERSION"));

/// Content type for a file download, inferred from its extension.
pub fn get_mime_type(path: &Path) -> String {
    if path.extension().is_none() {
        return "application/octet-stream".to_string();
    }
    match mime_guess::from_path(path).first_raw() {
        Some(mime) if mime.starts_with("text/") => format!("{mime}; charset=utf-8"),
        Some(mime) => mime.to_string(),
        None => "text/plain; charset=utf-8".to_string(),
    }
}

/// A fully buffered HTTP response. `Content-Length` is always the body size.
pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        Self {
            status_code,
            status_text: status_text.to_string(),
            headers: vec![
                ("Server".to_string(), SERVER_NAME.to_string()),
                ("Connection".to_string(), "close".to_string()),
            ],
            body: Vec::new(),
        }
    }

    pub fn with_html_body(mut self, body: Vec<u8>) -> Self {
        self.headers.push((
            "Content-Type".to_string(),
            "text/html; charset=utf-8".to_string(),
        ));
        self.body = body;
        self
    }

    pub fn with_text_body(mut self, body: String) -> Self {
        self.headers.push((
            "Content-Type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        ));
        self.body = body.into_bytes();
        self
    }

    pub fn with_body(mut self, body: Vec<u8>, mime_type: &str) -> Self {
        self.headers
            .push(("Content-Type".to_string(), mime_type.to_string()));
        self.body = body;
        self
    }

    pub fn add_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn send<W: Write>(self, stream: &mut W, log_prefix: &str) -> Result<(), AppError> {
        debug!(
            "{} Sending response - Status: {}, Body Length: {}",
            log_prefix,
            self.status_code,
            self.body.len()
        );

        let mut head = status_line(self.status_code, &self.status_text);
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        for (name, value) in &self.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str("\r\n");

        stream.write_all(head.as_bytes()).map_err(|e| {
            error!("{log_prefix} Failed to write response headers: {e}");
            AppError::Io(e)
        })?;

        if !self.body.is_empty() {
            stream.write_all(&self.body).map_err(|e| {
                error!("{log_prefix} Failed to write response body: {e}");
                AppError::Io(e)
            })?;
        }

        stream.flush().map_err(|e| {
            error!("{log_prefix} Failed to flush response: {e}");
            AppError::Io(e)
        })?;

        Ok(())
    }
}

fn status_line(status_code: u16, status_text: &str) -> String {
    format!("HTTP/1.1 {status_code} {status_text}\r\n")
}

/// Plain-text error response carrying the error's message.
pub fn create_error_response(err: &AppError) -> HttpResponse {
    let (status_code, status_text) = err.status();
    let response = HttpResponse::new(status_code, status_text);
    match err {
        AppError::MethodNotAllowed => response.add_header("Allow", "GET, POST"),
        _ => response.with_text_body(err.to_string()),
    }
}

/// Streams a regular file with a `Content-Length` taken from its metadata.
///
/// Errors before the first header byte is written are returned. Once the
/// headers are out the status cannot change, so write and read failures
/// after that point are logged and the body is left truncated.
pub fn send_file<W: Write>(
    stream: &mut W,
    path: &Path,
    chunk_size: usize,
    log_prefix: &str,
    location: &str,
) -> Result<(), AppError> {
    info!("{} serve_file started for: '{}'", log_prefix, path.display());
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(AppError::NotFound(location.to_string()))
        }
        Err(e) => return Err(AppError::Io(e)),
    };
    let file_size = file.metadata()?.len();

    let mut head = status_line(200, "OK");
    head.push_str(&format!("Content-Length: {file_size}\r\n"));
    head.push_str(&format!("Content-Type: {}\r\n", get_mime_type(path)));
    head.push_str(&format!("Server: {SERVER_NAME}\r\nConnection: close\r\n\r\n"));

    if let Err(e) = stream.write_all(head.as_bytes()) {
        warn!("{log_prefix} Failed to write file headers: {e}");
        return Ok(());
    }

    let mut reader = file.take(file_size);
    let mut buffer = vec![0; chunk_size];
    let mut sent: u64 = 0;
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!("{log_prefix} Read failed after {sent} of {file_size} bytes: {e}");
                return Ok(());
            }
        };
        if let Err(e) = stream.write_all(&buffer[..bytes_read]) {
            warn!("{log_prefix} Client write failed after {sent} of {file_size} bytes: {e}");
            return Ok(());
        }
        sent += bytes_read as u64;
    }

    if sent < file_size {
        warn!("{log_prefix} File shrank while streaming: sent {sent} of {file_size} bytes");
    }
    if let Err(e) = stream.flush() {
        warn!("{log_prefix} Failed to flush file body: {e}");
    }

    info!("{} serve_file finished for: '{}'", log_prefix, path.display());
    Ok(())
}
