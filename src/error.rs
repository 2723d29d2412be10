use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Calibration(String),
    RtSetup(String),
    InvalidArgs(String),
    Invariant(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Calibration(msg) => write!(f, "calibration error: {}", msg),
            Error::RtSetup(msg) => write!(f, "real-time setup error: {}", msg),
            Error::InvalidArgs(msg) => write!(f, "invalid arguments: {}", msg),
            Error::Invariant(msg) => write!(f, "engine invariant violated: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
