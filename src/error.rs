use std::fmt;

/// Type Alias: A rebranding of the `Result` enum from the standard library which focuses on errors
/// that may result from improper use of the simulator.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used to pick the severity of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    CapacityExceeded,
    NotResident,
    NotOnDisk,
    NotFound,
    ProtectionFault,
    Io,
    Json,
}

// Every simulator failure is recoverable. The message is what the user gets to see.
#[derive(Debug)]
pub enum Error {
    InvalidInput(String),
    CapacityExceeded(String),
    NotResident(String),
    NotOnDisk(String),
    NotFound(String),
    ProtectionFault(String),
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            Error::NotResident(_) => ErrorKind::NotResident,
            Error::NotOnDisk(_) => ErrorKind::NotOnDisk,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::ProtectionFault(_) => ErrorKind::ProtectionFault,
            Error::Io(_) => ErrorKind::Io,
            Error::Json(_) => ErrorKind::Json,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidInput(msg)
            | Error::CapacityExceeded(msg)
            | Error::NotResident(msg)
            | Error::NotOnDisk(msg)
            | Error::NotFound(msg)
            | Error::ProtectionFault(msg) => f.write_str(msg),
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Json(err) => write!(f, "malformed json: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Json(value)
    }
}
