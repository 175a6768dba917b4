//! pgnest Core - shared abstractions for the pgnest connection layer
//!
//! This crate provides the traits and types every other pgnest crate
//! depends on:
//!
//! - `Connection` - a live database session that runs statements
//! - `Connector` - opens connections from a `ConnectionConfig`
//! - `PgnestError` - the error taxonomy, including connection-class detection
//! - `Value`, `Row`, `QueryResult` - result and parameter types

mod connection;
mod driver;
mod error;
pub mod security;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use security::*;
pub use types::*;
