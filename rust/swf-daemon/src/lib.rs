//! Host process for the `swf-engine` workflow service.
//!
//! The daemon owns one [`WorkflowService`](swf_engine::WorkflowService)
//! backed by the system clock. At startup it loads [`config::AppConfig`],
//! installs logging, registers the configured domains and types
//! ([`bootstrap`]) and then runs the timeout [`sweeper`] until shut down.

pub mod bootstrap;
pub mod config;
pub mod logging;
pub mod sweeper;

use std::sync::Arc;

use swf_engine::clock::SystemClock;
use swf_engine::service::WorkflowService;

/// Build the service for a loaded configuration and seed it.
pub fn build_service(config: &config::AppConfig) -> anyhow::Result<Arc<WorkflowService>> {
    let service = Arc::new(WorkflowService::new(config.engine.clone(), Arc::new(SystemClock)));
    bootstrap::seed_service(&service, &config.bootstrap)?;
    Ok(service)
}
