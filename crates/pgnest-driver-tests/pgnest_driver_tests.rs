//! pgnest driver and service tests against a real PostgreSQL server
//!
//! A PostgreSQL container is started on first use with testcontainers and
//! shared by every test in the process. The container gets a second
//! database, `analytics`, so database selection and verification can be
//! exercised.
//!
//! The tests need Docker and are ignored by default:
//!
//! ```bash
//! cargo test -p pgnest-driver-tests -- --ignored
//! ```

pub mod fixtures;
pub mod test_containers;

#[cfg(test)]
mod connection_tests;

#[cfg(test)]
mod service_tests;
