//! PostgreSQL connector built on tokio-postgres

mod connection;
mod driver;
mod error;
mod tls;
mod value;

pub use connection::PostgresConnection;
pub use driver::PostgresConnector;
pub use error::{format_postgres_error, map_postgres_error};
pub use tls::{PostgresTlsConnector, TlsError, sslmode_name};
