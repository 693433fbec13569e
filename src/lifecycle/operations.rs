use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::wait::{Condition, Convergence, Lifecycle};
use super::LifecycleError;
use crate::merge::merge;
use crate::resource::{
    InServiceStrategy, LoadBalancer, PortRule, Resource, RuleSelector, Service, Stack,
};

const ACTIVE: &str = "active";
const INACTIVE: &str = "inactive";
const REMOVED: &str = "removed";

/// How long to wait after a write, and whether to undo it on timeout.
/// No timeout means fire-and-forget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WaitOptions {
    pub timeout: Option<u64>,
    pub rollback: bool,
}

impl WaitOptions {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn timeout(seconds: u64) -> Self {
        Self {
            timeout: Some(seconds),
            rollback: false,
        }
    }

    pub fn with_rollback(mut self, rollback: bool) -> Self {
        self.rollback = rollback;
        self
    }
}

fn rejected(operation: &'static str, resource: &Resource) -> LifecycleError {
    LifecycleError::Rejected {
        operation,
        name: resource.display_name().to_string(),
    }
}

impl Lifecycle {
    async fn converge(
        &self,
        operation: &'static str,
        resource: Resource,
        target: &str,
        timeout: Option<u64>,
    ) -> Result<Resource, LifecycleError> {
        let Some(timeout) = timeout else {
            return Ok(resource);
        };
        match self
            .wait_for(&resource, &Condition::state(target), timeout)
            .await?
        {
            Convergence::Converged(settled) => Ok(settled),
            Convergence::TimedOut { .. } => Err(LifecycleError::TimedOut {
                operation,
                name: resource.display_name().to_string(),
                timeout,
            }),
        }
    }

    /// Create a service in `stack` from the default template overlaid with
    /// `params`. On timeout with rollback requested the new service is
    /// removed again.
    pub async fn create_service(
        &self,
        stack: &Stack,
        params: &Value,
        options: WaitOptions,
    ) -> Result<Service, LifecycleError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("service")
            .to_string();
        let api = stack
            .services_api()
            .ok_or_else(|| LifecycleError::MissingLink {
                kind: stack.resource().kind().to_string(),
                name: stack.resource().display_name().to_string(),
                link: "services",
            })?;

        let payload = stack.service_payload(params);
        let created = api
            .create(&payload)
            .await?
            .and_then(|value| Resource::from_value(&api, value))
            .ok_or_else(|| LifecycleError::Rejected {
                operation: "create",
                name: name.clone(),
            })?;
        info!("Created service '{}' ({})", name, created.id());

        let Some(timeout) = options.timeout else {
            return Ok(Service::from_resource(created));
        };

        match self
            .wait_for(&created, &Condition::state(ACTIVE), timeout)
            .await?
        {
            Convergence::Converged(settled) => Ok(Service::from_resource(settled)),
            Convergence::TimedOut { last } if options.rollback => {
                let target = last.unwrap_or(created);
                warn!("Removing service '{}' after failed create", name);
                if let Err(e) = self.remove(&target, Some(timeout)).await {
                    error!("Cleanup of service '{}' failed: {}", name, e);
                }
                Err(LifecycleError::RolledBack {
                    operation: "create",
                    name,
                    timeout,
                })
            }
            Convergence::TimedOut { .. } => Err(LifecycleError::TimedOut {
                operation: "create",
                name,
                timeout,
            }),
        }
    }

    /// Remove `resource` and wait for `state=removed`. An object that
    /// disappears before reaching that state is `Vanished`.
    pub async fn remove(
        &self,
        resource: &Resource,
        timeout: Option<u64>,
    ) -> Result<Resource, LifecycleError> {
        let removed = resource
            .delete()
            .await?
            .ok_or_else(|| rejected("remove", resource))?;
        self.converge("remove", removed, REMOVED, timeout).await
    }

    pub async fn update(
        &self,
        resource: &Resource,
        overlay: &Value,
        timeout: Option<u64>,
    ) -> Result<Resource, LifecycleError> {
        let updated = resource
            .update(overlay)
            .await?
            .ok_or_else(|| rejected("update", resource))?;
        self.converge("update", updated, ACTIVE, timeout).await
    }

    pub async fn restart(
        &self,
        resource: &Resource,
        timeout: Option<u64>,
    ) -> Result<Resource, LifecycleError> {
        let restarted = resource
            .restart()
            .await?
            .ok_or_else(|| rejected("restart", resource))?;
        self.converge("restart", restarted, ACTIVE, timeout).await
    }

    pub async fn activate(
        &self,
        resource: &Resource,
        timeout: Option<u64>,
    ) -> Result<Resource, LifecycleError> {
        let activated = resource
            .activate()
            .await?
            .ok_or_else(|| rejected("activate", resource))?;
        self.converge("activate", activated, ACTIVE, timeout).await
    }

    pub async fn deactivate(
        &self,
        resource: &Resource,
        timeout: Option<u64>,
    ) -> Result<Resource, LifecycleError> {
        let deactivated = resource
            .deactivate()
            .await?
            .ok_or_else(|| rejected("deactivate", resource))?;
        self.converge("deactivate", deactivated, INACTIVE, timeout)
            .await
    }

    /// Rolling upgrade. The strategy's launch configuration is merged onto
    /// the service's current one so fields it leaves out are kept.
    ///
    /// On timeout with rollback requested, the upgrade is rolled back and
    /// waited for, and the operation still fails.
    pub async fn upgrade(
        &self,
        resource: &Resource,
        mut strategy: InServiceStrategy,
        options: WaitOptions,
    ) -> Result<Resource, LifecycleError> {
        let current = resource
            .attr("launchConfig")
            .cloned()
            .unwrap_or_else(|| json!({}));
        strategy.launch_config = merge(&current, &strategy.launch_config);

        let upgraded = resource
            .upgrade(&strategy.to_value())
            .await?
            .ok_or_else(|| rejected("upgrade", resource))?;

        let Some(timeout) = options.timeout else {
            return Ok(upgraded);
        };

        match self
            .wait_for(&upgraded, &Condition::state(ACTIVE), timeout)
            .await?
        {
            Convergence::Converged(settled) => Ok(settled),
            Convergence::TimedOut { last } if options.rollback => {
                // the latest snapshot carries the freshest action links
                let target = last.unwrap_or(upgraded);
                let name = target.display_name().to_string();
                warn!("Rolling back upgrade of '{}'", name);

                match target.rollback().await? {
                    Some(rolling_back) => {
                        let outcome = self
                            .wait_for(&rolling_back, &Condition::state(ACTIVE), timeout)
                            .await?;
                        if !outcome.is_converged() {
                            error!("Rollback of '{}' did not finish within {}s", name, timeout);
                        }
                    }
                    None => error!("Server rejected rollback of '{}'", name),
                }

                Err(LifecycleError::RolledBack {
                    operation: "upgrade",
                    name,
                    timeout,
                })
            }
            Convergence::TimedOut { .. } => Err(LifecycleError::TimedOut {
                operation: "upgrade",
                name: upgraded.display_name().to_string(),
                timeout,
            }),
        }
    }

    /// Add or replace a port rule (and its backend section) on `lb`.
    pub async fn update_port_rule(
        &self,
        lb: &LoadBalancer,
        rule: PortRule,
        custom_lines: &[String],
        timeout: Option<u64>,
    ) -> Result<Resource, LifecycleError> {
        let payload = lb.port_rule_update(rule, custom_lines)?;
        self.update(lb.resource(), &payload, timeout).await
    }

    /// Drop the port rules `selector` matches from `lb`.
    pub async fn remove_port_rule(
        &self,
        lb: &LoadBalancer,
        selector: &RuleSelector,
        timeout: Option<u64>,
    ) -> Result<Resource, LifecycleError> {
        let payload = lb.port_rule_removal(selector)?;
        self.update(lb.resource(), &payload, timeout).await
    }
}
