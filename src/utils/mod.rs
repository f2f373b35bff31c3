//! Utility modules

pub mod target_parser;

use std::time::Duration;

/// Logging utilities
pub struct Logger;

impl Logger {
    /// Initialize logger with specified level
    pub fn init(level: log::LevelFilter) {
        env_logger::Builder::from_default_env()
            .filter_level(level)
            .format_timestamp_secs()
            .init();
    }

    /// Map a configured level name, falling back to `warn`
    pub fn level_from_str(level: &str) -> log::LevelFilter {
        level.parse().unwrap_or(log::LevelFilter::Warn)
    }

    /// Log investigation start
    pub fn log_investigation_start(token: &str, target: &str) {
        log::info!("Analyzing {} (classified as {})", token, target);
    }

    /// Log investigation completion
    pub fn log_investigation_complete(
        target: &str,
        duration: Duration,
        succeeded: usize,
        total: usize,
    ) {
        log::info!(
            "Investigation of {} completed in {:.2}s - {}/{} probes succeeded",
            target,
            duration.as_secs_f64(),
            succeeded,
            total
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_str() {
        assert_eq!(Logger::level_from_str("debug"), log::LevelFilter::Debug);
        assert_eq!(Logger::level_from_str("TRACE"), log::LevelFilter::Trace);
        assert_eq!(Logger::level_from_str("loud"), log::LevelFilter::Warn);
    }
}
