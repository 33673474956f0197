//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for a [`WorkflowService`](crate::service::WorkflowService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Long-poll timeout when the caller does not supply one (default: 60s).
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    /// Largest history page handed out at once (default: 1000 events).
    #[serde(default = "default_max_page_size")]
    pub max_history_page_size: usize,

    /// Interval between timeout sweeps run by a host process (default: 1000ms).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,
}

fn default_poll_timeout() -> u64 {
    60
}

fn default_max_page_size() -> usize {
    1000
}

fn default_sweep_interval() -> u64 {
    1000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: default_poll_timeout(),
            max_history_page_size: default_max_page_size(),
            sweep_interval_ms: default_sweep_interval(),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Clamp a requested page size to the configured maximum (0 means maximum).
    #[must_use]
    pub fn page_size(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(size) if size > 0 => size.min(self.max_history_page_size),
            _ => self.max_history_page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.poll_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_page_size_clamped() {
        let config = EngineConfig {
            max_history_page_size: 100,
            ..Default::default()
        };
        assert_eq!(config.page_size(None), 100);
        assert_eq!(config.page_size(Some(0)), 100);
        assert_eq!(config.page_size(Some(10)), 10);
        assert_eq!(config.page_size(Some(500)), 100);
    }
}
