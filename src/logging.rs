//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to the console and to a
//! JSON log file, so orchestration runs can be followed across worker processes.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let pid = process::id();

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(build_filter(&log_level));

        let log_dir = PathBuf::from("log");
        let file_output = fs::create_dir_all(&log_dir).map(|_| {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
            let log_filename = format!("{environment}.{pid}.{timestamp}.log");
            let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
            let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
            (log_dir.join(log_filename), file_writer, guard)
        });

        match file_output {
            Ok((log_path, file_writer, guard)) => {
                let file_layer = fmt::layer()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_level(true)
                    .with_ansi(false)
                    .json()
                    .with_filter(build_filter(&log_level));

                if tracing_subscriber::registry()
                    .with(console_layer)
                    .with(file_layer)
                    .try_init()
                    .is_err()
                {
                    tracing::debug!("Global tracing subscriber already initialized");
                }

                tracing::info!(
                    pid = pid,
                    environment = %environment,
                    log_file = %log_path.display(),
                    "🔧 STRUCTURED LOGGING: Initialized with file output"
                );

                // The writer flushes for the life of the process
                std::mem::forget(guard);
            }
            Err(e) => {
                if tracing_subscriber::registry()
                    .with(console_layer)
                    .try_init()
                    .is_err()
                {
                    tracing::debug!("Global tracing subscriber already initialized");
                }

                tracing::warn!(
                    pid = pid,
                    environment = %environment,
                    error = %e,
                    "🔧 STRUCTURED LOGGING: Log directory unavailable, console output only"
                );
            }
        }
    });
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("STAGESYNC_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for orchestration run operations
pub fn log_orchestration_operation(
    operation: &str,
    run_id: Option<&str>,
    stage: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        run_id = run_id,
        stage = stage,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📋 ORCHESTRATION_OPERATION"
    );
}

/// Log structured data for job operations
pub fn log_job_operation(
    operation: &str,
    job_type: &str,
    job_id: Option<&str>,
    attempt: Option<u32>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_type = %job_type,
        job_id = job_id,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 JOB_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
