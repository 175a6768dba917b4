//! Error types for pgnest

use std::fmt;

use thiserror::Error;

/// What went wrong with the transport when a [`PgnestError::Connection`] is raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionErrorKind {
    /// The peer reset or aborted the connection, or the server terminated the backend
    Reset,
    /// Nothing was listening on the target address
    Refused,
    /// The host name could not be resolved
    HostNotFound,
    /// Connecting or waiting for the server took too long
    TimedOut,
    /// The connection was already closed when it was used
    Closed,
    /// Any other transport failure
    Other,
}

impl ConnectionErrorKind {
    /// Map an I/O error kind onto a connection error kind
    pub fn from_io_kind(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind;

        match kind {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof => Self::Reset,
            ErrorKind::ConnectionRefused => Self::Refused,
            ErrorKind::TimedOut => Self::TimedOut,
            ErrorKind::NotConnected => Self::Closed,
            _ => Self::Other,
        }
    }

    /// Recognize a connection failure from an error message.
    ///
    /// Some transport failures only surface as text (resolver errors, errors
    /// forwarded through a TLS layer), so this matches the usual wording of
    /// those messages. Returns `None` if nothing matches.
    pub fn from_message(message: &str) -> Option<Self> {
        let message = message.to_ascii_lowercase();

        if message.contains("econnreset")
            || message.contains("connection reset")
            || message.contains("broken pipe")
            || message.contains("terminating connection")
        {
            Some(Self::Reset)
        } else if message.contains("econnrefused") || message.contains("connection refused") {
            Some(Self::Refused)
        } else if message.contains("enotfound")
            || message.contains("failed to lookup address")
            || message.contains("name or service not known")
            || message.contains("nodename nor servname")
        {
            Some(Self::HostNotFound)
        } else if message.contains("etimedout")
            || message.contains("timed out")
            || message.contains("timeout")
        {
            Some(Self::TimedOut)
        } else if message.contains("connection closed") {
            Some(Self::Closed)
        } else {
            None
        }
    }
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Reset => "reset",
            Self::Refused => "refused",
            Self::HostNotFound => "host not found",
            Self::TimedOut => "timed out",
            Self::Closed => "closed",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Core error type for pgnest operations
#[derive(Error, Debug)]
pub enum PgnestError {
    #[error("Not connected: connect to a branch before running queries")]
    NotConnected,

    #[error("No connection info available for the connected branch")]
    NoConnectionInfo,

    #[error("Database not found on the connected branch: {0}")]
    DatabaseNotFound(String),

    #[error("Connection error ({kind}): {message}")]
    Connection {
        kind: ConnectionErrorKind,
        message: String,
    },

    #[error("Pool acquisition failed: {0}")]
    PoolAcquisition(String),

    #[error("{message}")]
    QueryExecution {
        message: String,
        /// SQLSTATE reported by the server, if any
        code: Option<String>,
    },

    #[error("Connected to database \"{actual}\" but expected \"{expected}\"")]
    DatabaseMismatch { expected: String, actual: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PgnestError {
    pub fn connection(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self::Connection {
            kind,
            message: message.into(),
        }
    }

    pub fn query(message: impl Into<String>, code: Option<String>) -> Self {
        Self::QueryExecution {
            message: message.into(),
            code,
        }
    }

    /// SQLSTATE attached to a statement error
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::QueryExecution { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the failure means the connection itself is unusable.
    ///
    /// True for every [`PgnestError::Connection`], and for statement errors
    /// without a SQLSTATE whose message mentions the connection. Errors the
    /// server attributes to a statement (they carry a SQLSTATE) never count,
    /// even if their text happens to contain the word.
    pub fn is_connection_class(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::QueryExecution {
                message,
                code: None,
            } => message.to_ascii_lowercase().contains("connection"),
            _ => false,
        }
    }
}

/// Result type alias for pgnest operations
pub type Result<T> = std::result::Result<T, PgnestError>;

#[cfg(test)]
mod tests;
