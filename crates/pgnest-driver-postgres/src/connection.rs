//! PostgreSQL connection implementation

use async_trait::async_trait;
use futures::{TryStreamExt, pin_mut};
use pgnest_core::{
    ColumnMeta, Connection, ConnectionConfig, ConnectionErrorKind, ErrorListener, PgnestError,
    QueryResult, Result, Row, Value,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, NoTls, SimpleQueryMessage};

use crate::error::map_postgres_error;
use crate::tls::{PostgresTlsConnector, ssl_mode};
use crate::value::{PgValue, postgres_to_value};

/// PostgreSQL connection wrapper
pub struct PostgresConnection {
    /// `None` once closed; dropping the client ends the background task
    client: Mutex<Option<Client>>,
    closed: Arc<AtomicBool>,
    database: String,
}

impl PostgresConnection {
    /// Connect to a PostgreSQL database.
    ///
    /// The returned connection drives its socket on a spawned task. If that
    /// task ends with an error, the connection is marked closed and
    /// `on_error` is called with the classified error.
    pub async fn connect(
        config: &ConnectionConfig,
        on_error: Option<ErrorListener>,
    ) -> Result<Self> {
        tracing::debug!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            ssl_mode = crate::sslmode_name(config.tls.mode),
            "connecting to PostgreSQL database"
        );

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .application_name(&config.application_name)
            .connect_timeout(config.connect_timeout)
            .ssl_mode(ssl_mode(config.tls.mode));
        if let Some(password) = &config.password {
            pg_config.password(password);
        }

        let closed = Arc::new(AtomicBool::new(false));

        let client = if config.tls.mode.uses_tls() {
            let tls = PostgresTlsConnector::build(&config.tls)?;
            let (client, connection) =
                with_timeout(config, pg_config.connect(tls)).await?;
            spawn_connection_task(connection, Arc::clone(&closed), on_error);
            client
        } else {
            let (client, connection) =
                with_timeout(config, pg_config.connect(NoTls)).await?;
            spawn_connection_task(connection, Arc::clone(&closed), on_error);
            client
        };

        tracing::info!(
            endpoint = %config.endpoint(),
            "PostgreSQL connection established"
        );

        Ok(Self {
            client: Mutex::new(Some(client)),
            closed,
            database: config.database.clone(),
        })
    }

    /// Database this connection was opened against
    pub fn database(&self) -> &str {
        &self.database
    }

    async fn run_prepared(
        client: &Client,
        sql: &str,
        params: &[Value],
        start: Instant,
    ) -> Result<QueryResult> {
        let statement = match client.prepare(sql).await {
            Ok(statement) => statement,
            Err(e) if params.is_empty() && is_multi_statement_rejection(&e) => {
                tracing::debug!("statement rejected for the extended protocol, using simple query");
                return Self::run_simple(client, sql, start).await;
            }
            Err(e) => return Err(map_postgres_error(&e)),
        };

        let param_types = statement.params();
        if param_types.len() != params.len() {
            return Err(PgnestError::query(
                format!(
                    "statement expects {} parameters but {} were supplied",
                    param_types.len(),
                    params.len()
                ),
                None,
            ));
        }
        let pg_params = params
            .iter()
            .zip(param_types)
            .map(|(value, target_type)| PgValue::for_type(value, target_type))
            .collect::<Vec<_>>();

        let columns = statement
            .columns()
            .iter()
            .enumerate()
            .map(|(ordinal, column)| ColumnMeta {
                name: column.name().to_string(),
                data_type: column.type_().name().to_string(),
                ordinal,
            })
            .collect::<Vec<_>>();
        let names: Arc<[String]> = columns.iter().map(|c| c.name.clone()).collect();

        let stream = client
            .query_raw(&statement, pg_params.iter())
            .await
            .map_err(|e| map_postgres_error(&e))?;
        pin_mut!(stream);

        let mut rows = Vec::new();
        while let Some(pg_row) = stream.try_next().await.map_err(|e| map_postgres_error(&e))? {
            let values = (0..columns.len())
                .map(|idx| postgres_to_value(&pg_row, idx))
                .collect::<Result<Vec<_>>>()?;
            rows.push(Row::new(Arc::clone(&names), values));
        }

        let row_count = stream.rows_affected().unwrap_or(rows.len() as u64);

        Ok(QueryResult {
            columns,
            rows,
            row_count,
            execution_time_ms: elapsed_ms(start),
        })
    }

    /// Run a parameterless script through the simple-query protocol.
    ///
    /// Values arrive as text. The result describes the last statement of
    /// the script, matching what the extended protocol reports for a
    /// single statement.
    async fn run_simple(client: &Client, sql: &str, start: Instant) -> Result<QueryResult> {
        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| map_postgres_error(&e))?;

        let mut names: Option<Arc<[String]>> = None;
        let mut current = Vec::new();
        let mut last_rows = Vec::new();
        let mut last_names = None;
        let mut row_count = 0;

        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    let columns = names
                        .get_or_insert_with(|| {
                            row.columns().iter().map(|c| c.name().to_string()).collect()
                        })
                        .clone();
                    let values = (0..row.len())
                        .map(|idx| row.get(idx).map(Value::from).unwrap_or(Value::Null))
                        .collect();
                    current.push(Row::new(columns, values));
                }
                SimpleQueryMessage::CommandComplete(count) => {
                    row_count = count;
                    last_rows = std::mem::take(&mut current);
                    last_names = names.take();
                }
                _ => {}
            }
        }

        let columns = last_names
            .map(|names| {
                names
                    .iter()
                    .enumerate()
                    .map(|(ordinal, name)| ColumnMeta {
                        name: name.clone(),
                        data_type: "text".to_string(),
                        ordinal,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(QueryResult {
            columns,
            rows: last_rows,
            row_count,
            execution_time_ms: elapsed_ms(start),
        })
    }
}

async fn with_timeout<T, F>(config: &ConnectionConfig, connect: F) -> Result<T>
where
    F: std::future::Future<Output = std::result::Result<T, tokio_postgres::Error>>,
{
    match tokio::time::timeout(config.connect_timeout, connect).await {
        Ok(result) => result.map_err(|e| {
            let error = map_postgres_error(&e);
            tracing::warn!(endpoint = %config.endpoint(), error = %error, "failed to connect to PostgreSQL");
            error
        }),
        Err(_) => Err(PgnestError::connection(
            ConnectionErrorKind::TimedOut,
            format!(
                "connecting to {} timed out after {:?}",
                config.endpoint(),
                config.connect_timeout
            ),
        )),
    }
}

fn spawn_connection_task<S, T>(
    connection: tokio_postgres::Connection<S, T>,
    closed: Arc<AtomicBool>,
    on_error: Option<ErrorListener>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let result = connection.await;
        closed.store(true, Ordering::SeqCst);

        if let Err(e) = result {
            let error = map_postgres_error(&e);
            tracing::error!(error = %error, "PostgreSQL connection error");
            if let Some(listener) = on_error {
                listener(&error);
            }
        }
    });
}

fn elapsed_ms(start: Instant) -> u64 {
    duration_ms(start.elapsed())
}

/// Whole milliseconds, saturating at `u64::MAX`
fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The server refuses multi-statement strings in a prepared statement
/// with a syntax error naming "multiple commands"
fn is_multi_statement_rejection(error: &tokio_postgres::Error) -> bool {
    error.as_db_error().is_some_and(|db| {
        *db.code() == SqlState::SYNTAX_ERROR && db.message().contains("multiple commands")
    })
}

#[async_trait]
impl Connection for PostgresConnection {
    fn driver_name(&self) -> &str {
        "postgres"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start = Instant::now();
        let guard = self.client.lock().await;
        let Some(client) = guard.as_ref() else {
            return Err(PgnestError::connection(
                ConnectionErrorKind::Closed,
                "connection has been closed",
            ));
        };

        let result = Self::run_prepared(client, sql, params, start).await?;

        tracing::debug!(
            row_count = result.row_count,
            execution_time_ms = result.execution_time_ms,
            "query executed successfully"
        );
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        let client = self.client.lock().await.take();
        self.closed.store(true, Ordering::SeqCst);
        if client.is_some() {
            tracing::debug!(database = %self.database, "closing PostgreSQL connection");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
            || self
                .client
                .try_lock()
                .map(|client| client.as_ref().is_none_or(Client::is_closed))
                .unwrap_or(false)
    }
}
