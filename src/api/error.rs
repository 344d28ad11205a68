use std::fmt::Formatter;
use std::io;
use std::result;

#[derive(Debug)]
pub enum Error {
    /// Disk or file failure, fatal to the operation in flight.
    IO(io::Error),
    /// Checksum or structure mismatch detected on the given page.
    Corruption(u32, String),
    /// Cursor used out of sequence.
    InvalidState(String),
    TransactionInProgress,
    NoActiveTransaction,
    /// Operation on a database handle that has already been closed.
    Closed,
    Other(String),
}

pub type Result<T> = result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IO(io) => write!(f, "IO error: '{}'.", io),
            Error::Corruption(id, msg) => write!(f, "Corruption (page: {}): '{}'.", id, msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: '{}'.", msg),
            Error::TransactionInProgress => write!(f, "Transaction already in progress."),
            Error::NoActiveTransaction => write!(f, "No active transaction."),
            Error::Closed => write!(f, "Database is closed."),
            Error::Other(msg) => write!(f, "Other error: '{}'.", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IO(io) => Some(io),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IO(e)
    }
}

impl From<String> for Error {
    fn from(str: String) -> Self {
        Error::Other(str)
    }
}
