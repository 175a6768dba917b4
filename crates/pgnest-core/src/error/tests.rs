use super::*;
use std::io;

#[test]
fn test_connection_errors_are_connection_class() {
    for kind in [
        ConnectionErrorKind::Reset,
        ConnectionErrorKind::Refused,
        ConnectionErrorKind::HostNotFound,
        ConnectionErrorKind::TimedOut,
        ConnectionErrorKind::Closed,
        ConnectionErrorKind::Other,
    ] {
        assert!(PgnestError::connection(kind, "boom").is_connection_class());
    }
}

#[test]
fn test_statement_errors_with_sqlstate_are_not_connection_class() {
    let error = PgnestError::query(
        "duplicate key value violates unique constraint \"connection_pkey\"",
        Some("23505".into()),
    );

    assert!(!error.is_connection_class());
    assert_eq!(error.code(), Some("23505"));
}

#[test]
fn test_uncoded_message_mentioning_connection_is_connection_class() {
    let error = PgnestError::query("Connection terminated unexpectedly", None);
    assert!(error.is_connection_class());

    let error = PgnestError::query("syntax error at end of input", None);
    assert!(!error.is_connection_class());
}

#[test]
fn test_lifecycle_errors_are_not_retryable() {
    assert!(!PgnestError::NotConnected.is_connection_class());
    assert!(!PgnestError::NoConnectionInfo.is_connection_class());
    assert!(!PgnestError::PoolAcquisition("timed out".into()).is_connection_class());
    assert!(
        !PgnestError::DatabaseMismatch {
            expected: "app".into(),
            actual: "neondb".into(),
        }
        .is_connection_class()
    );
}

#[test]
fn test_kind_from_io_kind() {
    assert_eq!(
        ConnectionErrorKind::from_io_kind(io::ErrorKind::ConnectionReset),
        ConnectionErrorKind::Reset
    );
    assert_eq!(
        ConnectionErrorKind::from_io_kind(io::ErrorKind::ConnectionRefused),
        ConnectionErrorKind::Refused
    );
    assert_eq!(
        ConnectionErrorKind::from_io_kind(io::ErrorKind::TimedOut),
        ConnectionErrorKind::TimedOut
    );
    assert_eq!(
        ConnectionErrorKind::from_io_kind(io::ErrorKind::PermissionDenied),
        ConnectionErrorKind::Other
    );
}

#[test]
fn test_kind_from_message() {
    assert_eq!(
        ConnectionErrorKind::from_message("read ECONNRESET"),
        Some(ConnectionErrorKind::Reset)
    );
    assert_eq!(
        ConnectionErrorKind::from_message("connect ECONNREFUSED 127.0.0.1:5432"),
        Some(ConnectionErrorKind::Refused)
    );
    assert_eq!(
        ConnectionErrorKind::from_message("getaddrinfo ENOTFOUND ep-cool-1.neon.tech"),
        Some(ConnectionErrorKind::HostNotFound)
    );
    assert_eq!(
        ConnectionErrorKind::from_message("failed to lookup address information"),
        Some(ConnectionErrorKind::HostNotFound)
    );
    assert_eq!(
        ConnectionErrorKind::from_message("connect ETIMEDOUT"),
        Some(ConnectionErrorKind::TimedOut)
    );
    assert_eq!(ConnectionErrorKind::from_message("relation does not exist"), None);
}

#[test]
fn test_display_includes_kind() {
    let error = PgnestError::connection(ConnectionErrorKind::Refused, "nothing listening");
    assert_eq!(
        error.to_string(),
        "Connection error (refused): nothing listening"
    );
}
