//! Mapping tokio-postgres failures onto `PgnestError`

use pgnest_core::{ConnectionErrorKind, PgnestError};
use std::error::Error as StdError;

/// Server message plus detail, hint and column when the server sent them
pub fn format_postgres_error(error: &tokio_postgres::Error) -> String {
    let Some(db_error) = error.as_db_error() else {
        return error.to_string();
    };

    let mut message = db_error.message().to_string();

    let extras = [
        ("detail", db_error.detail()),
        ("hint", db_error.hint()),
        ("column", db_error.column()),
    ];
    for (label, text) in extras {
        if let Some(text) = text
            && !text.trim().is_empty()
        {
            message.push_str(&format!(" ({label}: {text})"));
        }
    }

    message
}

/// SQLSTATEs that mean the session is gone rather than the statement failed:
/// class 08 (connection exception) and the 57P0x shutdown/termination codes.
/// `08P01` is excluded: the server reports malformed bind parameters with it
/// and keeps the session open.
pub(crate) fn is_connection_sqlstate(code: &str) -> bool {
    (code.starts_with("08") && code != "08P01") || matches!(code, "57P01" | "57P02" | "57P03")
}

/// Classify a tokio-postgres error
pub fn map_postgres_error(error: &tokio_postgres::Error) -> PgnestError {
    if let Some(db_error) = error.as_db_error() {
        let code = db_error.code().code();
        let message = format_postgres_error(error);
        if is_connection_sqlstate(code) {
            return PgnestError::connection(ConnectionErrorKind::Reset, message);
        }
        return PgnestError::query(message, Some(code.to_string()));
    }

    let message = describe(error);

    if error.is_closed() {
        return PgnestError::connection(ConnectionErrorKind::Closed, message);
    }

    if let Some(io_error) = find_io_error(error) {
        let kind = match ConnectionErrorKind::from_io_kind(io_error.kind()) {
            ConnectionErrorKind::Other => {
                ConnectionErrorKind::from_message(&message).unwrap_or(ConnectionErrorKind::Other)
            }
            kind => kind,
        };
        return PgnestError::connection(kind, message);
    }

    match ConnectionErrorKind::from_message(&message) {
        Some(kind) => PgnestError::connection(kind, message),
        None => PgnestError::query(message, None),
    }
}

/// Error text including its source chain; tokio-postgres keeps the useful
/// part (the I/O or TLS failure) in the source
fn describe(error: &tokio_postgres::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

fn find_io_error(error: &tokio_postgres::Error) -> Option<&std::io::Error> {
    let mut source = error.source();
    while let Some(cause) = source {
        if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
            return Some(io_error);
        }
        source = cause.source();
    }
    None
}
