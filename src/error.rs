use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Io(std::io::Error),
    NotFound(String),
    AlreadyExists(String),
    RequestTooLarge { limit: u64 },
    MethodNotAllowed,
    BadRequest(String),
    Forbidden,
    DirectoryNotFound(String),
    Tls(String),
    InternalServerError(String),
}

impl AppError {
    /// Status code and reason phrase sent to the client for this error.
    pub fn status(&self) -> (u16, &'static str) {
        match self {
            AppError::NotFound(_) => (404, "Not Found"),
            AppError::AlreadyExists(_) => (409, "Conflict"),
            AppError::RequestTooLarge { .. } => (413, "Payload Too Large"),
            AppError::MethodNotAllowed => (405, "Method Not Allowed"),
            AppError::BadRequest(_) => (400, "Bad Request"),
            AppError::Forbidden => (403, "Forbidden"),
            AppError::Io(_)
            | AppError::DirectoryNotFound(_)
            | AppError::Tls(_)
            | AppError::InternalServerError(_) => (500, "Internal Server Error"),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Io(err) => write!(f, "IO error: {err}"),
            AppError::NotFound(path) => write!(f, "{path} not found"),
            AppError::AlreadyExists(path) => write!(f, "{path} already exists"),
            AppError::RequestTooLarge { limit } => {
                write!(f, "Request body exceeds the {limit} byte upload limit")
            }
            AppError::MethodNotAllowed => write!(f, "Method not allowed"),
            AppError::BadRequest(reason) => write!(f, "Bad request: {reason}"),
            AppError::Forbidden => write!(f, "Forbidden"),
            AppError::DirectoryNotFound(path) => write!(f, "Directory not found: {path}"),
            AppError::Tls(msg) => write!(f, "TLS error: {msg}"),
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {msg}"),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Io(err) => Some(err),
            _ => None,
        }
    }
}
