//! Centralized error handling for cmip5
//!
//! Every fallible operation in the crate returns [`Result`], carrying a
//! [`Cmip5Error`] that keeps enough context to tell the user which file,
//! period or command went wrong.

use std::fmt;

/// Main error type for cmip5 operations
#[derive(Debug)]
pub enum Cmip5Error {
    /// NetCDF file operation errors
    NetCDFError(netcdf::Error),

    /// I/O operation errors
    IoError(std::io::Error),

    /// File name does not follow the CMIP5 DRS layout
    InvalidFileName { name: String, reason: String },

    /// Period component could not be parsed
    InvalidPeriod { period: String, reason: String },

    /// Files passed together do not belong to the same simulation and variable
    MixedSimulations { component: String },

    /// A climatology file was given where raw time slices are expected
    ClimatologyInput { file: String },

    /// Year selection does not intersect the data span
    InvalidYearSelection { message: String },

    /// Key sequence absent from a nested map
    KeyNotFound { key: String },

    /// Malformed `key=value` search criterion
    InvalidCriterion { criterion: String },

    /// HTTP request to an ESGF node failed
    HttpError(reqwest::Error),

    /// ESGF node answered with a non-success status
    EsgStatus { url: String, status: u16 },

    /// ESGF node URL could not be parsed
    UrlError(url::ParseError),

    /// Response body was not the expected JSON
    JsonError(serde_json::Error),

    /// External command exited unsuccessfully
    CommandFailed { command: String, status: Option<i32> },

    /// Thread pool configuration error
    ThreadPoolError(String),

    /// Generic error for everything else
    Generic(String),
}

impl fmt::Display for Cmip5Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cmip5Error::NetCDFError(e) => write!(f, "NetCDF error: {}", e),
            Cmip5Error::IoError(e) => write!(f, "I/O error: {}", e),
            Cmip5Error::InvalidFileName { name, reason } => {
                write!(f, "Invalid CMIP5 file name '{}': {}", name, reason)
            }
            Cmip5Error::InvalidPeriod { period, reason } => {
                write!(f, "Invalid period '{}': {}", period, reason)
            }
            Cmip5Error::MixedSimulations { component } => write!(
                f,
                "Files don't all belong to the same simulation and variable (differing {})",
                component
            ),
            Cmip5Error::ClimatologyInput { file } => {
                write!(f, "Climatology file found: {}", file)
            }
            Cmip5Error::InvalidYearSelection { message } => {
                write!(f, "Invalid year selection: {}", message)
            }
            Cmip5Error::KeyNotFound { key } => write!(f, "This key does not exist: {}", key),
            Cmip5Error::InvalidCriterion { criterion } => write!(
                f,
                "Invalid search criterion '{}': expected 'key=value[,value...]'",
                criterion
            ),
            Cmip5Error::HttpError(e) => write!(f, "HTTP error: {}", e),
            Cmip5Error::EsgStatus { url, status } => {
                write!(f, "ESGF node returned status {} for {}", status, url)
            }
            Cmip5Error::UrlError(e) => write!(f, "URL error: {}", e),
            Cmip5Error::JsonError(e) => write!(f, "JSON error: {}", e),
            Cmip5Error::CommandFailed { command, status } => match status {
                Some(code) => write!(f, "Command exited with status {}: {}", code, command),
                None => write!(f, "Command terminated by signal: {}", command),
            },
            Cmip5Error::ThreadPoolError(msg) => write!(f, "Thread pool error: {}", msg),
            Cmip5Error::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Cmip5Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Cmip5Error::NetCDFError(e) => Some(e),
            Cmip5Error::IoError(e) => Some(e),
            Cmip5Error::HttpError(e) => Some(e),
            Cmip5Error::UrlError(e) => Some(e),
            Cmip5Error::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<netcdf::Error> for Cmip5Error {
    fn from(error: netcdf::Error) -> Self {
        Cmip5Error::NetCDFError(error)
    }
}

impl From<std::io::Error> for Cmip5Error {
    fn from(error: std::io::Error) -> Self {
        Cmip5Error::IoError(error)
    }
}

impl From<reqwest::Error> for Cmip5Error {
    fn from(error: reqwest::Error) -> Self {
        Cmip5Error::HttpError(error)
    }
}

impl From<url::ParseError> for Cmip5Error {
    fn from(error: url::ParseError) -> Self {
        Cmip5Error::UrlError(error)
    }
}

impl From<serde_json::Error> for Cmip5Error {
    fn from(error: serde_json::Error) -> Self {
        Cmip5Error::JsonError(error)
    }
}

impl From<String> for Cmip5Error {
    fn from(error: String) -> Self {
        Cmip5Error::Generic(error)
    }
}

impl From<&str> for Cmip5Error {
    fn from(error: &str) -> Self {
        Cmip5Error::Generic(error.to_string())
    }
}

/// Result type alias for cmip5 operations
pub type Result<T> = std::result::Result<T, Cmip5Error>;
