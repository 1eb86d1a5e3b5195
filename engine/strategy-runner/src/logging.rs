//! Logging and tracing setup

use crate::config::LoggingConfig;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Keeps the file writer flushing; drop it only at process exit
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Initialize logging and tracing.
///
/// `RUST_LOG` wins over the configured level. With `out` (or `config.file`) set, logs
/// go to that file through a non-blocking writer instead of stdout.
pub fn initialize_logging(config: &LoggingConfig, out: Option<&Path>) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("Invalid log level: {}", config.level))?;

    let target = out.or(config.file.as_deref());
    let (fmt_layer, guard) = match target {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| anyhow!("Log path has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (format_layer(&config.format, writer, false), Some(guard))
        }
        None => (format_layer(&config.format, std::io::stdout, true), None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(LoggingGuard { _file: guard })
}

fn format_layer<S, W>(format: &str, writer: W, ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        "json" => fmt::layer()
            .json()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        "compact" => fmt::layer()
            .compact()
            .with_writer(writer)
            .with_target(false)
            .with_ansi(ansi)
            .boxed(),
        _ => fmt::layer()
            .pretty()
            .with_writer(writer)
            .with_target(false)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(ansi)
            .boxed(),
    }
}
