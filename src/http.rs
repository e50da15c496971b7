use crate::config::ServerConfig;
use crate::error::AppError;
use crate::fs::generate_directory_listing;
use crate::resolver::{classify, resolve, PathKind};
use crate::response::{create_error_response, send_file, HttpResponse};
use crate::templates::asset;
use crate::transport::{Connection, Transport};
use crate::upload::handle_upload;
use crate::utils::{decode_request_path, display_location};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_LINE_LENGTH: u64 = 8 * 1024;
const MAX_HEADERS: usize = 100;
const FAVICON_LOCATION: &str = "/favicon.svg";
const LINGER_TIMEOUT: Duration = Duration::from_secs(2);
const MAX_LINGER_BYTES: u64 = 1024 * 1024;

/// Request line and headers of an incoming request. The body is left unread.
#[derive(Debug)]
pub struct Request {
    pub method: String,
    pub target: String,
    pub version: String,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, AppError> {
    let mut raw = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_LINE_LENGTH)
        .read_until(b'\n', &mut raw)?;
    if read == 0 {
        return Ok(None);
    }
    if !raw.ends_with(b"\n") {
        return Err(AppError::BadRequest(
            "request line or header too long".to_string(),
        ));
    }
    let line = String::from_utf8(raw)
        .map_err(|_| AppError::BadRequest("request head is not valid UTF-8".to_string()))?;
    Ok(Some(line.trim_end_matches(&['\r', '\n'][..]).to_string()))
}

/// Reads the request head. `Ok(None)` means the peer closed the connection
/// without sending anything.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<Request>, AppError> {
    let request_line = match read_line(reader)? {
        Some(line) => line,
        None => return Ok(None),
    };

    let mut parts = request_line.split_whitespace();
    let (method, target, version) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(target), Some(version), None) if version.starts_with("HTTP/") => {
            (method.to_string(), target.to_string(), version.to_string())
        }
        _ => {
            return Err(AppError::BadRequest(format!(
                "malformed request line: {request_line}"
            )))
        }
    };

    let mut headers = HashMap::new();
    loop {
        let line = read_line(reader)?
            .ok_or_else(|| AppError::BadRequest("connection closed inside headers".to_string()))?;
        if line.is_empty() {
            break;
        }
        if headers.len() >= MAX_HEADERS {
            return Err(AppError::BadRequest("too many headers".to_string()));
        }
        match line.split_once(':') {
            Some((name, value)) => {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
            None => return Err(AppError::BadRequest(format!("malformed header: {line}"))),
        }
    }

    Ok(Some(Request {
        method,
        target,
        version,
        headers,
    }))
}

/// Handles one connection: a single request and its response.
pub fn handle_client<T: Transport>(transport: T, config: &ServerConfig, log_prefix: &str) {
    let mut conn = Connection::new(transport);

    let outcome = match read_request(&mut conn) {
        Ok(Some(request)) => dispatch(&request, &mut conn, config, log_prefix),
        Ok(None) => {
            debug!("{log_prefix} Connection closed before a request was sent");
            return;
        }
        Err(e) => Err(e),
    };

    if let Err(err) = outcome {
        let (status_code, _) = err.status();
        if status_code >= 500 {
            error!("{log_prefix} {err}");
        } else {
            warn!("{log_prefix} {err}");
        }
        if let Err(send_err) = create_error_response(&err).send(&mut conn, log_prefix) {
            debug!("{log_prefix} Could not deliver error response: {send_err}");
        }
    }

    finish_connection(&mut conn, log_prefix);
}

/// Half-closes the connection and drains what the client is still sending.
///
/// Closing a socket with unread input makes the kernel answer with a reset,
/// which can destroy a response the client has not read yet. Bodies of
/// accepted uploads are consumed in full before this point; what is left here
/// is input the server refused to read (an oversized or unparsable request),
/// so only a bounded amount of it is discarded.
fn finish_connection<T: Transport>(conn: &mut Connection<T>, log_prefix: &str) {
    if let Err(e) = conn.close_write() {
        debug!("{log_prefix} Shutdown failed: {e}");
        return;
    }
    if let Err(e) = conn.set_read_timeout(LINGER_TIMEOUT) {
        debug!("{log_prefix} Could not set linger timeout: {e}");
        return;
    }
    match io::copy(&mut conn.take(MAX_LINGER_BYTES), &mut io::sink()) {
        Ok(0) => {}
        Ok(n) => debug!("{log_prefix} Discarded {n} unread request bytes"),
        Err(e) => debug!("{log_prefix} Stopped draining connection: {e}"),
    }
}

/// Reads and drops the rest of a request body.
fn discard_body<R: Read>(body: &mut R, log_prefix: &str) {
    match io::copy(body, &mut io::sink()) {
        Ok(0) => {}
        Ok(n) => debug!("{log_prefix} Discarded {n} unused request body bytes"),
        Err(e) => debug!("{log_prefix} Stopped reading request body: {e}"),
    }
}

/// Routes a parsed request by method and writes the success response.
/// Errors are returned for the caller to turn into a status code.
///
/// `conn` carries the unread request body and takes the response.
pub fn dispatch<S: BufRead + Write>(
    request: &Request,
    conn: &mut S,
    config: &ServerConfig,
    log_prefix: &str,
) -> Result<(), AppError> {
    let location = decode_request_path(&request.target)?;
    info!(
        "{} {} {} {}",
        log_prefix,
        request.version,
        request.method,
        display_location(&location)
    );

    match request.method.as_str() {
        "GET" => serve_get(&location, conn, config, log_prefix),
        "POST" => serve_post(request, &location, conn, config, log_prefix),
        _ => Err(AppError::MethodNotAllowed),
    }
}

fn serve_get<W: Write>(
    location: &str,
    stream: &mut W,
    config: &ServerConfig,
    log_prefix: &str,
) -> Result<(), AppError> {
    if location == FAVICON_LOCATION {
        let icon = asset("favicon.svg").ok_or_else(|| {
            AppError::InternalServerError("favicon asset missing".to_string())
        })?;
        return HttpResponse::new(200, "OK")
            .with_body(icon.into_owned(), "image/svg+xml")
            .send(stream, log_prefix);
    }

    let path = resolve(&config.root, location)?;
    match classify(&path)? {
        PathKind::Directory => serve_directory(stream, &path, location, log_prefix),
        PathKind::RegularFile => send_file(stream, &path, config.chunk_size, log_prefix, location),
        PathKind::NotFound | PathKind::Other => {
            Err(AppError::NotFound(display_location(location).to_string()))
        }
    }
}

fn accepted_content_length(request: &Request, config: &ServerConfig) -> Result<u64, AppError> {
    if request.header("Transfer-Encoding").is_some() {
        return Err(AppError::BadRequest(
            "chunked upload bodies are not supported".to_string(),
        ));
    }
    let content_length = request
        .header("Content-Length")
        .ok_or_else(|| AppError::BadRequest("Content-Length is required".to_string()))?
        .parse::<u64>()
        .map_err(|_| AppError::BadRequest("invalid Content-Length".to_string()))?;
    if content_length > config.max_upload_size {
        return Err(AppError::RequestTooLarge {
            limit: config.max_upload_size,
        });
    }
    Ok(content_length)
}

fn upload_target(location: &str, config: &ServerConfig) -> Result<PathBuf, AppError> {
    let target_directory = resolve(&config.root, location)?;
    match classify(&target_directory)? {
        PathKind::Directory => Ok(target_directory),
        PathKind::RegularFile => Err(AppError::BadRequest(format!(
            "{} is not a directory",
            display_location(location)
        ))),
        PathKind::NotFound | PathKind::Other => {
            Err(AppError::NotFound(display_location(location).to_string()))
        }
    }
}

fn serve_post<S: BufRead + Write>(
    request: &Request,
    location: &str,
    conn: &mut S,
    config: &ServerConfig,
    log_prefix: &str,
) -> Result<(), AppError> {
    // Past the length check the body is read to its end before any response,
    // unless the client is still holding it back for 100 Continue.
    let content_length = accepted_content_length(request, config)?;
    let expects_continue = request
        .header("Expect")
        .is_some_and(|expect| expect.eq_ignore_ascii_case("100-continue"));

    let prepared = upload_target(location, config).and_then(|target_directory| {
        let content_type = request
            .header("Content-Type")
            .ok_or_else(|| AppError::BadRequest("Content-Type is required".to_string()))?;
        Ok((target_directory, content_type))
    });
    let (target_directory, content_type) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            // A client waiting for 100 Continue may never send the body.
            if !expects_continue {
                discard_body(&mut Read::take(&mut *conn, content_length), log_prefix);
            }
            return Err(err);
        }
    };

    if expects_continue {
        conn.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
        conn.flush()?;
    }

    let mut body = Read::take(&mut *conn, content_length);
    let uploaded = handle_upload(
        &mut body,
        content_type,
        content_length,
        &target_directory,
        location,
        log_prefix,
    );
    discard_body(&mut body, log_prefix);
    uploaded?;

    serve_directory(conn, &target_directory, location, log_prefix)
}

fn serve_directory<W: Write>(
    stream: &mut W,
    path: &Path,
    location: &str,
    log_prefix: &str,
) -> Result<(), AppError> {
    info!("{} serve_directory started for: '{}'", log_prefix, path.display());
    let html = generate_directory_listing(path, location)?;
    HttpResponse::new(200, "OK")
        .with_html_body(html)
        .send(stream, log_prefix)?;
    info!("{} serve_directory finished for: '{}'", log_prefix, path.display());
    Ok(())
}
