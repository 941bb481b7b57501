use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Listing page had no table, or a row did not line up with the header.
    #[error("parse error: {0}")]
    Parse(String),

    /// Bad user input, e.g. an unknown date-range token.
    #[error("invalid input: {0}")]
    Validation(String),

    /// A browser step failed.
    #[error("automation error: {0}")]
    Automation(String),

    #[error("transfer error: {0}")]
    Transfer(#[from] reqwest::Error),

    #[error("transfer error: GET {url} returned {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error ({key}): {message}")]
    Config { key: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    Validation,
    Automation,
    Transfer,
    Io,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Parse(_) => ErrorKind::Parse,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Automation(_) => ErrorKind::Automation,
            Error::Transfer(_) | Error::Status { .. } => ErrorKind::Transfer,
            Error::Io(_) => ErrorKind::Io,
            Error::Config { .. } => ErrorKind::Config,
        }
    }

    pub(crate) fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

impl ErrorKind {
    /// Process exit code for this kind, following the sysexits(3) numbering.
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Validation => 64,
            ErrorKind::Parse => 65,
            ErrorKind::Automation => 69,
            ErrorKind::Io => 74,
            ErrorKind::Transfer => 75,
            ErrorKind::Config => 78,
        }
    }
}
