//! Connection trait

use crate::{PgnestError, QueryResult, Result, Value};
use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked when a connection fails outside of any request,
/// for example when the server terminates an idle backend
pub type ErrorListener = Arc<dyn Fn(&PgnestError) + Send + Sync>;

/// A live database session
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgres")
    fn driver_name(&self) -> &str;

    /// Run a statement with positional parameters (`$1`, `$2`, ...).
    ///
    /// Row-producing statements return their rows; other statements return
    /// an empty row set with `row_count` set to the number of affected rows.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Close the session. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;

    /// Whether the session is known to be unusable
    fn is_closed(&self) -> bool;
}
