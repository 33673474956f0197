//! Logging setup and operation timing.

use std::time::Instant;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Operation timer for measuring and logging execution duration.
///
/// ```rust,ignore
/// use swf_daemon::logging::OpTimer;
///
/// let timer = OpTimer::new("sweeper", "pass");
/// let applied = service.sweep_timeouts();
/// timer.finish_with_count(applied);
/// ```
#[derive(Debug)]
pub struct OpTimer {
    /// Component being timed (e.g., "sweeper", "bootstrap").
    component: &'static str,
    /// Operation being performed (e.g., "pass", "seed").
    operation: &'static str,
    start: Instant,
}

impl OpTimer {
    #[must_use]
    pub fn new(component: &'static str, operation: &'static str) -> Self {
        tracing::trace!(component, operation, "Operation started");
        Self {
            component,
            operation,
            start: Instant::now(),
        }
    }

    /// Log completion with a count of affected items. Passes that touched
    /// nothing are logged at trace level only.
    pub fn finish_with_count(self, count: usize) {
        let duration_ms = self.start.elapsed().as_millis();
        if count == 0 {
            tracing::trace!(
                component = self.component,
                operation = self.operation,
                duration_ms,
                "Operation completed"
            );
        } else {
            tracing::info!(
                component = self.component,
                operation = self.operation,
                duration_ms,
                count,
                "Operation completed"
            );
        }
    }

    /// Finishes the timer with result-aware logging.
    pub fn finish_with_result<T, E: std::fmt::Display>(self, result: Result<&T, &E>) {
        let duration_ms = self.start.elapsed().as_millis();

        match result {
            Ok(_) => {
                tracing::info!(
                    component = self.component,
                    operation = self.operation,
                    duration_ms,
                    "Operation completed successfully"
                );
            }
            Err(e) => {
                tracing::error!(
                    component = self.component,
                    operation = self.operation,
                    duration_ms,
                    error = %e,
                    "Operation failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_timer_creation() {
        let timer = OpTimer::new("sweeper", "pass");
        assert_eq!(timer.component, "sweeper");
        assert_eq!(timer.operation, "pass");
    }

    #[test]
    fn test_op_timer_finish_with_result_err() {
        let timer = OpTimer::new("bootstrap", "seed");
        let result: Result<(), String> = Err("duplicate domain".to_string());
        timer.finish_with_result(result.as_ref());
    }
}
