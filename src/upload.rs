//! Multipart form upload handling.
//!
//! The body is parsed as a stream: the `upload` part is copied straight into
//! its destination file, so memory use stays flat regardless of upload size.

use crate::error::AppError;
use humansize::{format_size, BINARY};
use log::{debug, info, warn};
use percent_encoding::percent_decode_str;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

/// Name of the form field carrying the file.
pub const UPLOAD_FIELD: &str = "upload";

const READ_CHUNK: usize = 64 * 1024;
const MAX_PART_HEADER_LINE: usize = 8 * 1024;
const MAX_PART_HEADERS: usize = 32;

/// A file written by a successful upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub saved_path: PathBuf,
    pub size: u64,
}

/// The upload part found in a request body, not yet written anywhere.
pub struct UploadRequest<'a, R: Read> {
    pub target_directory: &'a Path,
    pub file_name: String,
    content: PartReader<'a, R>,
}

/// Extracts the multipart boundary from a `Content-Type` header value.
pub fn parse_boundary(content_type: &str) -> Result<String, AppError> {
    let mut params = content_type.split(';');
    let media_type = params.next().unwrap_or_default().trim();
    if !media_type.eq_ignore_ascii_case("multipart/form-data") {
        return Err(AppError::BadRequest(format!(
            "expected multipart/form-data, got '{media_type}'"
        )));
    }

    params
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| unquote(value.trim()))
        .filter(|boundary| !boundary.is_empty() && boundary.len() <= 70)
        .ok_or_else(|| AppError::BadRequest("missing multipart boundary".to_string()))
}

fn unquote(value: &str) -> String {
    match value
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
    {
        Some(inner) => {
            let mut out = String::with_capacity(inner.len());
            let mut chars = inner.chars();
            while let Some(c) = chars.next() {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        out.push(escaped);
                    }
                } else {
                    out.push(c);
                }
            }
            out
        }
        None => value.to_string(),
    }
}

/// `name` and `filename` from a part's `Content-Disposition` header.
#[derive(Debug, Default, PartialEq, Eq)]
struct Disposition {
    name: Option<String>,
    filename: Option<String>,
}

fn parse_disposition(value: &str) -> Disposition {
    let mut disposition = Disposition::default();
    let mut extended_filename = false;
    // Quoted values may contain ';', so split by hand rather than with str::split.
    let mut rest = value;
    while let Some(pos) = rest.find(';') {
        rest = rest[pos + 1..].trim_start();
        let Some((key, tail)) = rest.split_once('=') else {
            break;
        };
        let (raw, remaining) = if tail.starts_with('"') {
            let mut end = None;
            let mut escaped = false;
            for (i, c) in tail.char_indices().skip(1) {
                match c {
                    '\\' if !escaped => escaped = true,
                    '"' if !escaped => {
                        end = Some(i);
                        break;
                    }
                    _ => escaped = false,
                }
            }
            match end {
                Some(end) => (&tail[..=end], &tail[end + 1..]),
                None => (tail, ""),
            }
        } else {
            match tail.find(';') {
                Some(end) => (&tail[..end], &tail[end..]),
                None => (tail, ""),
            }
        };

        let value = unquote(raw.trim());
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => disposition.name = Some(value),
            "filename" if !extended_filename => disposition.filename = Some(value),
            "filename*" => {
                if let Some(decoded) = decode_extended_value(&value) {
                    disposition.filename = Some(decoded);
                    extended_filename = true;
                }
            }
            _ => {}
        }
        rest = remaining;
    }
    disposition
}

/// Decodes an RFC 5987 `charset'language'percent-encoded` value. Only UTF-8 is accepted.
fn decode_extended_value(value: &str) -> Option<String> {
    let mut pieces = value.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    percent_decode_str(encoded)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Streaming reader over a `multipart/form-data` body.
pub struct Multipart<R: Read> {
    inner: R,
    buf: Vec<u8>,
    delimiter: Vec<u8>,
    finished: bool,
}

impl<R: Read> Multipart<R> {
    pub fn new(inner: R, boundary: &str) -> Self {
        // Seeding the buffer with CRLF lets the first boundary match the same
        // "\r\n--boundary" delimiter as every later one.
        Self {
            inner,
            buf: b"\r\n".to_vec(),
            delimiter: format!("\r\n--{boundary}").into_bytes(),
            finished: false,
        }
    }

    fn fill(&mut self) -> io::Result<usize> {
        let start = self.buf.len();
        self.buf.resize(start + READ_CHUNK, 0);
        let read = loop {
            match self.inner.read(&mut self.buf[start..]) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };
        self.buf.truncate(start + *read.as_ref().unwrap_or(&0));
        read
    }

    fn truncated() -> AppError {
        AppError::BadRequest("multipart body ended unexpectedly".to_string())
    }

    /// Copies bytes up to the next delimiter into `out` and consumes the delimiter.
    fn copy_until_delimiter<W: Write>(&mut self, out: &mut W) -> Result<u64, AppError> {
        let mut written = 0u64;
        loop {
            if let Some(pos) = find(&self.buf, &self.delimiter) {
                out.write_all(&self.buf[..pos])?;
                written += pos as u64;
                self.buf.drain(..pos + self.delimiter.len());
                return Ok(written);
            }
            // Keep a tail that could still be the start of a split delimiter.
            let keep = self.delimiter.len() - 1;
            if self.buf.len() > keep {
                let flush = self.buf.len() - keep;
                out.write_all(&self.buf[..flush])?;
                written += flush as u64;
                self.buf.drain(..flush);
            }
            if self.fill()? == 0 {
                return Err(Self::truncated());
            }
        }
    }

    fn read_line(&mut self) -> Result<String, AppError> {
        loop {
            if let Some(pos) = find(&self.buf, b"\r\n") {
                let line = String::from_utf8_lossy(&self.buf[..pos]).into_owned();
                self.buf.drain(..pos + 2);
                return Ok(line);
            }
            if self.buf.len() > MAX_PART_HEADER_LINE {
                return Err(AppError::BadRequest(
                    "multipart header line too long".to_string(),
                ));
            }
            if self.fill()? == 0 {
                return Err(Self::truncated());
            }
        }
    }

    /// Moves to the next part and returns its disposition, or `None` after the
    /// closing boundary.
    fn next_part(&mut self) -> Result<Option<Disposition>, AppError> {
        if self.finished {
            return Ok(None);
        }
        // Whatever is left of the previous part (or the preamble) is skipped.
        self.copy_until_delimiter(&mut io::sink())?;

        while self.buf.len() < 2 {
            if self.fill()? == 0 {
                return Err(Self::truncated());
            }
        }
        if self.buf.starts_with(b"--") {
            self.finished = true;
            return Ok(None);
        }
        // Rest of the boundary line: optional padding, then CRLF.
        self.read_line()?;

        let mut disposition = Disposition::default();
        for _ in 0..=MAX_PART_HEADERS {
            let line = self.read_line()?;
            if line.is_empty() {
                return Ok(Some(disposition));
            }
            if let Some((name, value)) = line.split_once(':') {
                if name.trim().eq_ignore_ascii_case("content-disposition") {
                    disposition = parse_disposition(value.trim());
                }
            }
        }
        Err(AppError::BadRequest(
            "too many headers in multipart part".to_string(),
        ))
    }

    /// Scans forward to the file part named `field`.
    pub fn file_part(&mut self, field: &str) -> Result<(String, PartReader<'_, R>), AppError> {
        while let Some(disposition) = self.next_part()? {
            if disposition.name.as_deref() != Some(field) {
                continue;
            }
            match disposition.filename {
                Some(filename) if !filename.is_empty() => {
                    return Ok((filename, PartReader { multipart: self }));
                }
                _ => {
                    return Err(AppError::BadRequest(format!(
                        "form field '{field}' does not carry a file"
                    )))
                }
            }
        }
        Err(AppError::BadRequest(format!(
            "no file field named '{field}' in the form"
        )))
    }
}

/// The body of one part, borrowed from its [`Multipart`].
pub struct PartReader<'a, R: Read> {
    multipart: &'a mut Multipart<R>,
}

impl<R: Read> PartReader<'_, R> {
    pub fn copy_to<W: Write>(self, out: &mut W) -> Result<u64, AppError> {
        self.multipart.copy_until_delimiter(out)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Client supplied names are used as-is, but must name a single entry in the
/// target directory.
fn validate_file_name(name: &str) -> Result<(), AppError> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if !single_normal || name.contains(&['/', '\\', '\0'][..]) {
        return Err(AppError::BadRequest(format!(
            "invalid upload file name '{name}'"
        )));
    }
    Ok(())
}

impl<'a, R: Read> UploadRequest<'a, R> {
    /// Locates the `upload` file part in `multipart`.
    pub fn extract(
        multipart: &'a mut Multipart<R>,
        target_directory: &'a Path,
    ) -> Result<Self, AppError> {
        let (file_name, content) = multipart.file_part(UPLOAD_FIELD)?;
        validate_file_name(&file_name)?;
        Ok(Self {
            target_directory,
            file_name,
            content,
        })
    }

    /// Writes the part to `target_directory/file_name`, never replacing an
    /// existing entry. `location` is the request path used in error messages.
    pub fn save(self, location: &str, log_prefix: &str) -> Result<UploadedFile, AppError> {
        let saved_path = self.target_directory.join(&self.file_name);
        let shown = format!("{location}/{}", self.file_name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&saved_path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => AppError::AlreadyExists(shown.clone()),
                _ => AppError::Io(e),
            })?;
        debug!("{log_prefix} Created '{}'", saved_path.display());

        let mut writer = BufWriter::new(file);
        let written = self
            .content
            .copy_to(&mut writer)
            .and_then(|size| writer.flush().map(|_| size).map_err(AppError::Io));

        match written {
            Ok(size) => {
                drop(writer);
                info!(
                    "{log_prefix} Uploaded '{shown}' ({})",
                    format_size(size, BINARY)
                );
                Ok(UploadedFile {
                    file_name: self.file_name,
                    saved_path,
                    size,
                })
            }
            Err(e) => {
                drop(writer);
                warn!("{log_prefix} Upload of '{shown}' failed, removing partial file: {e}");
                if let Err(remove_err) = fs::remove_file(&saved_path) {
                    warn!("{log_prefix} Could not remove '{}': {remove_err}", saved_path.display());
                }
                Err(e)
            }
        }
    }
}

/// Reads a multipart body of `content_length` bytes from `body` and stores
/// its `upload` file under `target_directory`.
pub fn handle_upload<R: Read>(
    body: R,
    content_type: &str,
    content_length: u64,
    target_directory: &Path,
    location: &str,
    log_prefix: &str,
) -> Result<UploadedFile, AppError> {
    let boundary = parse_boundary(content_type)?;
    let mut multipart = Multipart::new(body.take(content_length), &boundary);
    UploadRequest::extract(&mut multipart, target_directory)?.save(location, log_prefix)
}
