use std::path::Path;
use std::sync::OnceLock;

use rolling_file::{BasicRollingFileAppender, RollingConditionBasic};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::core::config::AppPaths;

const MIB: u64 = 1024 * 1024;

static LOG_GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// One size-rotated log file.
#[derive(Debug, Clone, Copy)]
pub struct RotationPolicy {
    pub file_name: &'static str,
    pub max_bytes: u64,
    pub backups: usize,
}

pub const DEBUG_LOG: RotationPolicy = RotationPolicy {
    file_name: "debug.log",
    max_bytes: 10 * MIB,
    backups: 5,
};

pub const ERROR_LOG: RotationPolicy = RotationPolicy {
    file_name: "errors.log",
    max_bytes: 5 * MIB,
    backups: 3,
};

pub const API_LOG: RotationPolicy = RotationPolicy {
    file_name: "api_requests.log",
    max_bytes: 10 * MIB,
    backups: 5,
};

fn rotating_writer(
    log_dir: &Path,
    policy: RotationPolicy,
    guards: &mut Vec<WorkerGuard>,
) -> std::io::Result<NonBlocking> {
    let appender = BasicRollingFileAppender::new(
        log_dir.join(policy.file_name),
        RollingConditionBasic::new().max_size(policy.max_bytes),
        policy.backups,
    )?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    guards.push(guard);
    Ok(writer)
}

/// Installs stdout plus the three rotating log files under `paths.log_dir`.
///
/// `default_level` seeds the base filter when `RUST_LOG` is unset.
pub fn init(paths: &AppPaths, default_level: &str) -> anyhow::Result<()> {
    let log_dir = &paths.log_dir;
    std::fs::create_dir_all(log_dir)?;

    let mut guards = Vec::with_capacity(3);
    let debug_writer = rotating_writer(log_dir, DEBUG_LOG, &mut guards)?;
    let error_writer = rotating_writer(log_dir, ERROR_LOG, &mut guards)?;
    let api_writer = rotating_writer(log_dir, API_LOG, &mut guards)?;
    let _ = LOG_GUARDS.set(guards);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "{default_level},hyper=info,h2=info,reqwest=info,sqlx=warn"
        ))
    });

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(LevelFilter::INFO);
    let debug_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(debug_writer)
        .with_filter(LevelFilter::DEBUG);
    let error_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(error_writer)
        .with_filter(LevelFilter::ERROR);
    let api_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(api_writer)
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(debug_layer)
        .with(error_layer)
        .with(api_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_policies_match_documented_limits() {
        assert_eq!(DEBUG_LOG.max_bytes, 10 * 1024 * 1024);
        assert_eq!(DEBUG_LOG.backups, 5);
        assert_eq!(ERROR_LOG.max_bytes, 5 * 1024 * 1024);
        assert_eq!(ERROR_LOG.backups, 3);
        assert_eq!(API_LOG.file_name, "api_requests.log");
        assert_eq!(API_LOG.backups, 5);
    }

    #[test]
    fn rotating_writer_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut guards = Vec::new();

        let writer = rotating_writer(dir.path(), ERROR_LOG, &mut guards);

        assert!(writer.is_ok());
        assert_eq!(guards.len(), 1);
        assert!(dir.path().join("errors.log").exists());
    }
}
