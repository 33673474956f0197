//! Register configured domains and types with a service.
//!
//! Seeding is idempotent: names that are already registered are left as
//! they are, so the same configuration can be applied more than once.

use anyhow::Context;
use swf_engine::error::SwfError;
use swf_engine::service::WorkflowService;

use crate::config::BootstrapConfig;
use crate::logging::OpTimer;

/// What a seeding pass registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub domains: usize,
    pub workflow_types: usize,
    pub activity_types: usize,
    /// Entries skipped because they were already registered.
    pub existing: usize,
}

/// Register every domain and type in `bootstrap`.
pub fn seed_service(service: &WorkflowService, bootstrap: &BootstrapConfig) -> anyhow::Result<SeedReport> {
    let timer = OpTimer::new("bootstrap", "seed");
    let result = seed(service, bootstrap);
    timer.finish_with_result(result.as_ref());
    result
}

fn seed(service: &WorkflowService, bootstrap: &BootstrapConfig) -> anyhow::Result<SeedReport> {
    let mut report = SeedReport::default();

    for domain in &bootstrap.domains {
        match service.register_domain(
            &domain.name,
            &domain.retention_period_days,
            domain.description.clone(),
        ) {
            Ok(()) => report.domains += 1,
            Err(SwfError::DomainAlreadyExists(_)) => report.existing += 1,
            Err(e) => return Err(e).with_context(|| format!("Failed to register domain {}", domain.name)),
        }

        for seed in &domain.workflow_types {
            let registered = service.register_workflow_type(
                &domain.name,
                seed.key(),
                seed.defaults(),
                seed.description.clone(),
            );
            if tally(registered, &mut report.workflow_types, &mut report.existing)
                .with_context(|| format!("Failed to register workflow type {} in {}", seed.key(), domain.name))?
            {
                tracing::debug!(domain = %domain.name, workflow_type = %seed.key(), "Seeded workflow type");
            }
        }

        for seed in &domain.activity_types {
            let registered = service.register_activity_type(
                &domain.name,
                seed.key(),
                seed.defaults(),
                seed.description.clone(),
            );
            if tally(registered, &mut report.activity_types, &mut report.existing)
                .with_context(|| format!("Failed to register activity type {} in {}", seed.key(), domain.name))?
            {
                tracing::debug!(domain = %domain.name, activity_type = %seed.key(), "Seeded activity type");
            }
        }
    }

    tracing::info!(
        domains = report.domains,
        workflow_types = report.workflow_types,
        activity_types = report.activity_types,
        existing = report.existing,
        "Bootstrap complete"
    );
    Ok(report)
}

/// Count a type registration. Returns whether it was newly registered.
fn tally(result: Result<(), SwfError>, registered: &mut usize, existing: &mut usize) -> Result<bool, SwfError> {
    match result {
        Ok(()) => {
            *registered += 1;
            Ok(true)
        }
        Err(SwfError::TypeAlreadyExists { .. }) => {
            *existing += 1;
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
