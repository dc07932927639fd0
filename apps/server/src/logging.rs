//! Logging initialization for catalog binaries
//!
//! Supports JSON or human-readable output, optional rotating file output and
//! `RUST_LOG` overrides.

use std::fs;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Keeps the non-blocking file writer flushing. Hold it for the lifetime of the process.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the global subscriber from configuration.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let subscriber = tracing_subscriber::registry().with(build_env_filter(config));

    let file_guard = if config.json {
        let console_layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stdout);

        if config.file_enabled {
            let (file_appender, guard) = create_file_appender(config)?;
            let file_layer = fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(file_appender);
            subscriber.with(console_layer).with(file_layer).try_init()?;
            Some(guard)
        } else {
            subscriber.with(console_layer).try_init()?;
            None
        }
    } else {
        let console_layer = fmt::layer()
            .with_target(true)
            .with_writer(std::io::stdout);

        if config.file_enabled {
            let (file_appender, guard) = create_file_appender(config)?;
            let file_layer = fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .with_writer(file_appender);
            subscriber.with(console_layer).with(file_layer).try_init()?;
            Some(guard)
        } else {
            subscriber.with(console_layer).try_init()?;
            None
        }
    };

    tracing::info!(
        service_name = %config.service_name,
        environment = %config.deployment_environment,
        json = config.json,
        file_enabled = config.file_enabled,
        "Logging initialized"
    );

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(config)))
}

fn default_directives(config: &LoggingConfig) -> String {
    // sqlx logs every statement at info
    format!(
        "fhir_catalog={level},ferrum_catalog={level},sqlx=warn",
        level = config.level
    )
}

fn create_file_appender(config: &LoggingConfig) -> anyhow::Result<(NonBlocking, WorkerGuard)> {
    fs::create_dir_all(&config.file_directory)?;

    let directory = &config.file_directory;
    let prefix = &config.file_prefix;
    let file_appender = match config.file_rotation.as_str() {
        "hourly" => tracing_appender::rolling::hourly(directory, prefix),
        "minutely" => tracing_appender::rolling::minutely(directory, prefix),
        "never" => tracing_appender::rolling::never(directory, format!("{}.log", prefix)),
        _ => tracing_appender::rolling::daily(directory, prefix),
    };

    Ok(tracing_appender::non_blocking(file_appender))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_apply_configured_level_to_catalog_crates() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(
            default_directives(&config),
            "fhir_catalog=debug,ferrum_catalog=debug,sqlx=warn"
        );
    }

    #[test]
    fn file_appender_creates_missing_directory() {
        let dir =
            std::env::temp_dir().join(format!("fhir-catalog-logs-{}", uuid::Uuid::new_v4()));
        let config = LoggingConfig {
            file_directory: dir.to_string_lossy().into_owned(),
            file_rotation: "never".to_string(),
            ..LoggingConfig::default()
        };

        let (_writer, _guard) = create_file_appender(&config).unwrap();
        assert!(dir.is_dir());
        let _ = fs::remove_dir_all(dir);
    }
}
