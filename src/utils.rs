use crate::error::AppError;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes that stay literal inside one encoded path segment (RFC 3986 unreserved).
/// Everything else is escaped, which also keeps the result safe inside an HTML attribute.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encodes a single name so it can be used as one URL path segment.
pub fn percent_encode_segment(name: &str) -> String {
    utf8_percent_encode(name, PATH_SEGMENT).to_string()
}

/// Percent-encodes a decoded location (`/a b/c`) segment by segment, keeping the slashes.
pub fn percent_encode_location(location: &str) -> String {
    location
        .split('/')
        .map(percent_encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

/// Turns a raw request target into the decoded location used for resolution.
///
/// The query string is discarded, the remainder is percent-decoded, and a
/// trailing slash is stripped so `/dir/` and `/dir` resolve identically. The
/// root comes back as the empty string.
pub fn decode_request_path(target: &str) -> Result<String, AppError> {
    if !target.starts_with('/') {
        return Err(AppError::BadRequest(format!(
            "request target must be an absolute path: {target}"
        )));
    }

    let raw_path = target.split_once('?').map_or(target, |(path, _)| path);
    let decoded = percent_decode_str(raw_path)
        .decode_utf8()
        .map_err(|_| AppError::BadRequest("request path is not valid UTF-8".to_string()))?;

    if decoded.contains('\0') {
        return Err(AppError::BadRequest(
            "request path contains a NUL byte".to_string(),
        ));
    }

    Ok(decoded.trim_end_matches('/').to_string())
}

/// Human facing form of a decoded location: the root is shown as `/`.
pub fn display_location(location: &str) -> &str {
    if location.is_empty() {
        "/"
    } else {
        location
    }
}
