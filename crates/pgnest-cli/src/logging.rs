//! Tracing setup for the `pgnest` binary.
//!
//! Console output goes to stderr so query results on stdout stay parseable.
//! Unless disabled, a daily-rolling JSON log is kept under the platform data
//! directory as well.

use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, fmt::format::FmtSpan, layer::SubscriberExt, registry::LookupSpan,
    util::SubscriberInitExt,
};

const LOG_FILE_PREFIX: &str = "pgnest.log";

const QUIET_FILTER: &str = "warn,pgnest_cli=info,pgnest_connection=info";
const VERBOSE_FILTER: &str =
    "info,pgnest_cli=debug,pgnest_connection=debug,pgnest_driver_postgres=debug";

static FILE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub verbose: bool,
    /// `None` turns the JSON file log off
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            log_dir: Some(log_directory()),
        }
    }

    pub fn without_file(mut self) -> Self {
        self.log_dir = None;
        self
    }

    /// `RUST_LOG` wins over the verbosity flag
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if self.verbose {
                VERBOSE_FILTER
            } else {
                QUIET_FILTER
            })
        })
    }
}

pub fn init(config: LoggingConfig) -> anyhow::Result<()> {
    let mut layers = vec![console_layer(&config)];
    if let Some(dir) = &config.log_dir {
        layers.push(file_layer(&config, dir)?);
    }

    tracing_subscriber::registry().with(layers).try_init()?;

    tracing::debug!(
        verbose = config.verbose,
        log_dir = ?config.log_dir,
        "logging initialized"
    );
    Ok(())
}

fn console_layer<S>(config: &LoggingConfig) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.verbose)
        .with_file(config.verbose)
        .with_line_number(config.verbose)
        .pretty()
        .with_filter(config.filter())
        .boxed()
}

fn file_layer<S>(config: &LoggingConfig, dir: &Path) -> anyhow::Result<BoxedLayer<S>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    let _ = FILE_GUARD.set(guard);

    Ok(tracing_subscriber::fmt::layer()
        .json()
        .with_writer(writer)
        .with_ansi(false)
        .with_thread_ids(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_filter(config.filter())
        .boxed())
}

pub fn log_directory() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pgnest")
        .join("logs")
}
