//! Startup validation of the daemon configuration.
//!
//! All problems are collected and reported together so a broken config file
//! can be fixed in one pass.

use std::collections::HashSet;

use swf_engine::defaults::NO_TIMEOUT;

use super::error::{ConfigResult, ConfigurationError};
use super::seeds::{BootstrapConfig, DomainSeed};
use super::AppConfig;

#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration.
    pub fn validate(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();
        Self::validate_engine(config, &mut errors);
        Self::validate_bootstrap(&config.bootstrap, &mut errors);
        ConfigurationError::collect(errors)
    }

    fn validate_engine(config: &AppConfig, errors: &mut Vec<ConfigurationError>) {
        let engine = &config.engine;
        let positive = [
            ("engine.poll_timeout_secs", engine.poll_timeout_secs),
            ("engine.sweep_interval_ms", engine.sweep_interval_ms),
            ("engine.max_history_page_size", engine.max_history_page_size as u64),
        ];
        for (setting, value) in positive {
            if value == 0 {
                errors.push(ConfigurationError::invalid(
                    setting,
                    "must be greater than 0",
                    format!("Set {} to a positive value", env_var(setting)),
                ));
            }
        }
    }

    fn validate_bootstrap(bootstrap: &BootstrapConfig, errors: &mut Vec<ConfigurationError>) {
        let mut names = HashSet::new();
        for domain in &bootstrap.domains {
            if domain.name.trim().is_empty() {
                errors.push(ConfigurationError::invalid(
                    "bootstrap.domains.name",
                    "domain name is empty",
                    "Give every bootstrap domain a name",
                ));
            } else if !names.insert(domain.name.as_str()) {
                errors.push(ConfigurationError::duplicate("domain", &domain.name));
            }
            Self::validate_domain(domain, errors);
        }
    }

    fn validate_domain(domain: &DomainSeed, errors: &mut Vec<ConfigurationError>) {
        let retention = domain.retention_period_days.trim();
        if retention != NO_TIMEOUT && !matches!(retention.parse::<u32>(), Ok(0..=90)) {
            errors.push(ConfigurationError::invalid(
                format!("bootstrap.domains.{}.retention_period_days", domain.name),
                format!("{retention:?} is not a number of days between 0 and 90"),
                "Use a value such as \"30\", or \"NONE\"",
            ));
        }

        let mut workflow_keys = HashSet::new();
        for seed in &domain.workflow_types {
            if !workflow_keys.insert(seed.key()) {
                errors.push(ConfigurationError::duplicate("workflow type", seed.key().to_string()));
            }
            for (field, value) in seed.timeouts() {
                check_timeout(&domain.name, &seed.name, field, value, errors);
            }
        }

        let mut activity_keys = HashSet::new();
        for seed in &domain.activity_types {
            if !activity_keys.insert(seed.key()) {
                errors.push(ConfigurationError::duplicate("activity type", seed.key().to_string()));
            }
            for (field, value) in seed.timeouts() {
                check_timeout(&domain.name, &seed.name, field, value, errors);
            }
        }
    }
}

/// Timeouts are whole seconds or `NONE`.
fn check_timeout(
    domain: &str,
    type_name: &str,
    field: &str,
    value: Option<&str>,
    errors: &mut Vec<ConfigurationError>,
) {
    let Some(value) = value else {
        return;
    };
    let value = value.trim();
    if value.eq_ignore_ascii_case(NO_TIMEOUT) || value.parse::<u64>().is_ok() {
        return;
    }
    errors.push(ConfigurationError::invalid(
        format!("bootstrap.domains.{domain}.{type_name}.{field}"),
        format!("{value:?} is not a timeout"),
        "Use a number of seconds such as \"300\", or \"NONE\"",
    ));
}

fn env_var(setting: &str) -> String {
    format!("SWF__{}", setting.replace('.', "__").to_uppercase())
}
