//! Usage: Process-wide tracing setup (stderr + optional daily-rolling file).

use crate::infra::settings::LoggingSettings;
use crate::shared::error::{AppError, AppResult, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Keeps the background file writer alive; drop it only at process exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

fn build_filter(settings: &LoggingSettings) -> AppResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(settings.filter.trim()).map_err(|e| {
        AppError::of(
            ErrorKind::Config,
            format!("invalid log filter {:?}: {e}", settings.filter),
        )
        .with_source(e)
    })
}

/// Installs the global subscriber. Later calls are no-ops once one succeeded; a failed
/// call leaves the next one free to retry.
pub fn init(settings: &LoggingSettings) -> AppResult<LoggingGuard> {
    init_once(&LOGGING_INITIALIZED, settings)
}

fn init_once(initialized: &AtomicBool, settings: &LoggingSettings) -> AppResult<LoggingGuard> {
    if initialized.load(Ordering::SeqCst) {
        return Ok(LoggingGuard { _file_guard: None });
    }
    let filter = build_filter(settings)?;

    let (file_layer, file_guard) = match settings.directory.as_ref() {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                AppError::of(
                    ErrorKind::Config,
                    format!("failed to create log dir {}: {e}", dir.display()),
                )
                .with_source(e)
            })?;
            let appender = tracing_appender::rolling::daily(dir, settings.file_prefix.trim());
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    // Bridge `log` records from dependencies; ignore if another logger already exists.
    let _ = tracing_log::LogTracer::init();

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer);
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        tracing::debug!("global tracing subscriber already set: {err}");
    }
    initialized.store(true, Ordering::SeqCst);

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
