//! Convergence polling
//!
//! One probe per poll interval (one second by default), no backoff. The loop
//! ends when every attribute of the condition matches, when the object
//! disappears (fatal), or when the deadline runs out (not fatal here).

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{info, warn};

use super::LifecycleError;
use crate::resource::Resource;

/// Attribute name to expected value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition(BTreeMap<String, Value>);

impl Condition {
    pub fn state(state: &str) -> Self {
        Self::default().with("state", state)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| resource.attr(key).unwrap_or(&Value::Null) == expected)
    }

    /// `key=value` pairs as currently reported by `resource`.
    pub fn describe_current(&self, resource: &Resource) -> String {
        self.0
            .keys()
            .map(|key| format!("{}={}", key, show(resource.attr(key).unwrap_or(&Value::Null))))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn describe_expected(&self) -> String {
        self.0
            .iter()
            .map(|(key, value)| format!("{}={}", key, show(value)))
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn show(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Terminal state of a wait that did not fail outright.
#[derive(Debug)]
pub enum Convergence {
    /// The reloaded snapshot that satisfied the condition.
    Converged(Resource),
    /// Deadline exhausted; `last` is the most recent snapshot seen, if any.
    TimedOut { last: Option<Resource> },
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged(_))
    }
}

/// Issues waits; owns the poll cadence.
#[derive(Debug, Clone)]
pub struct Lifecycle {
    poll_interval: Duration,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Poll `resource` up to `timeout` times until `condition` holds.
    pub async fn wait_for(
        &self,
        resource: &Resource,
        condition: &Condition,
        timeout: u64,
    ) -> Result<Convergence, LifecycleError> {
        if timeout == 0 {
            return Err(LifecycleError::InvalidTimeout);
        }

        let mut last = None;
        for _ in 0..timeout {
            sleep(self.poll_interval).await;

            let reloaded = match resource.reload().await? {
                Some(r) => r,
                None => {
                    return Err(LifecycleError::Vanished {
                        kind: resource.kind().to_string(),
                        name: resource.display_name().to_string(),
                    })
                }
            };

            info!(
                "Current: [{}], Expected: [{}]",
                condition.describe_current(&reloaded),
                condition.describe_expected()
            );

            if condition.matches(&reloaded) {
                return Ok(Convergence::Converged(reloaded));
            }
            last = Some(reloaded);
        }

        warn!(
            "TIMEOUT ({}s): {} '{}' is at [{}], expected [{}]",
            timeout,
            resource.kind(),
            resource.display_name(),
            last.as_ref()
                .map(|r| condition.describe_current(r))
                .unwrap_or_default(),
            condition.describe_expected()
        );
        Ok(Convergence::TimedOut { last })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;
    use crate::resource::ResourceApi;
    use reqwest::Method;
    use serde_json::json;
    use std::sync::Arc;

    const SELF_URL: &str = "http://rancher.local/v2-beta/services/1s3";

    fn snapshot(state: &str) -> Value {
        json!({
            "id": "1s3",
            "type": "service",
            "name": "api",
            "state": state,
            "links": {"self": SELF_URL}
        })
    }

    fn fixture(mock: &Arc<MockTransport>) -> Resource {
        let api = ResourceApi::new(mock.clone(), "http://rancher.local/v2-beta/services");
        Resource::from_value(&api, snapshot("updating")).unwrap()
    }

    fn fast() -> Lifecycle {
        Lifecycle::new().with_poll_interval(Duration::ZERO)
    }

    #[test]
    fn test_condition_matching_and_description() {
        let mock = Arc::new(MockTransport::new());
        let res = fixture(&mock);

        let cond = Condition::state("active");
        assert!(!cond.matches(&res));
        assert_eq!(cond.describe_current(&res), "state=updating");
        assert_eq!(cond.describe_expected(), "state=active");

        assert!(Condition::state("updating").with("name", "api").matches(&res));
    }

    #[tokio::test]
    async fn test_converges_after_two_updating_ticks() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(Method::GET, SELF_URL, snapshot("updating"))
            .ok(Method::GET, SELF_URL, snapshot("updating"))
            .ok(Method::GET, SELF_URL, snapshot("active"));

        let outcome = fast()
            .wait_for(&fixture(&mock), &Condition::state("active"), 5)
            .await
            .unwrap();

        match outcome {
            Convergence::Converged(res) => assert_eq!(res.state(), Some("active")),
            other => panic!("expected convergence, got {:?}", other),
        }
        // three probes, one per simulated second
        assert_eq!(mock.count(&Method::GET, SELF_URL), 3);
    }

    #[tokio::test]
    async fn test_times_out_with_last_snapshot() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(Method::GET, SELF_URL, snapshot("updating"));

        let outcome = fast()
            .wait_for(&fixture(&mock), &Condition::state("active"), 3)
            .await
            .unwrap();

        match outcome {
            Convergence::TimedOut { last } => {
                assert_eq!(last.unwrap().state(), Some("updating"))
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(mock.count(&Method::GET, SELF_URL), 3);
    }

    #[tokio::test]
    async fn test_vanished_resource_is_fatal() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::GET, SELF_URL, 404, Value::Null);

        let err = fast()
            .wait_for(&fixture(&mock), &Condition::state("active"), 10)
            .await
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Vanished { .. }));
        assert_eq!(mock.count(&Method::GET, SELF_URL), 1);
    }

    #[tokio::test]
    async fn test_zero_timeout_rejected() {
        let mock = Arc::new(MockTransport::new());
        let err = fast()
            .wait_for(&fixture(&mock), &Condition::state("active"), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTimeout));
        assert!(mock.calls().is_empty());
    }
}
