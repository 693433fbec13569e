use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use tracing::warn;

use super::loadbalancer::LoadBalancer;
use super::Resource;

/// `type` reported by the API for load balancer services.
pub const LOAD_BALANCER_TYPE: &str = "loadBalancerService";

/// Label always applied unless overridden.
pub const PULL_IMAGE_LABEL: &str = "io.rancher.container.pull_image";

const LABEL_ALIASES: &[(&str, &str)] = &[
    ("pull_image", PULL_IMAGE_LABEL),
    ("host_label", "io.rancher.scheduler.affinity:host_label"),
];

/// A service, specialised by its server-reported `type`.
#[derive(Debug, Clone)]
pub enum Service {
    Generic(Resource),
    LoadBalancer(LoadBalancer),
}

impl Service {
    pub fn from_resource(resource: Resource) -> Self {
        if resource.kind() == LOAD_BALANCER_TYPE {
            Service::LoadBalancer(LoadBalancer::new(resource))
        } else {
            Service::Generic(resource)
        }
    }

    pub fn resource(&self) -> &Resource {
        match self {
            Service::Generic(resource) => resource,
            Service::LoadBalancer(lb) => lb.resource(),
        }
    }

    pub fn as_load_balancer(&self) -> Option<&LoadBalancer> {
        match self {
            Service::LoadBalancer(lb) => Some(lb),
            Service::Generic(_) => None,
        }
    }
}

/// Launch configuration fields settable from the command line.
/// Empty fields are left out of the payload so the server keeps its values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LaunchConfigPatch {
    pub image: Option<String>,
    pub data_volumes: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub environment: BTreeMap<String, String>,
}

impl LaunchConfigPatch {
    pub fn to_value(&self) -> Value {
        let mut config = Map::new();
        if let Some(image) = &self.image {
            config.insert("image".to_string(), json!(image));
        }
        if !self.data_volumes.is_empty() {
            config.insert("dataVolumes".to_string(), json!(self.data_volumes));
        }
        if !self.labels.is_empty() {
            config.insert("labels".to_string(), json!(self.labels));
        }
        if !self.environment.is_empty() {
            config.insert("environment".to_string(), json!(self.environment));
        }
        Value::Object(config)
    }
}

/// Payload of a rolling upgrade.
#[derive(Debug, Clone, PartialEq)]
pub struct InServiceStrategy {
    pub batch_size: u32,
    pub interval_millis: u64,
    pub start_first: bool,
    pub launch_config: Value,
}

impl InServiceStrategy {
    pub fn to_value(&self) -> Value {
        json!({
            "batchSize": self.batch_size,
            "intervalMillis": self.interval_millis,
            "startFirst": self.start_first,
            "launchConfig": self.launch_config,
        })
    }
}

/// Service labels from `key=value` pairs.
///
/// Keys are the short aliases `pull_image` and `host_label`; anything else is
/// ignored. The always-pull label is present unless overridden.
pub fn service_labels(pairs: &[(String, String)]) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::from([(PULL_IMAGE_LABEL.to_string(), "always".to_string())]);
    for (key, value) in pairs {
        match LABEL_ALIASES.iter().find(|(alias, _)| alias == key) {
            Some((_, full)) => {
                labels.insert(full.to_string(), value.clone());
            }
            None => warn!("Ignoring unsupported label '{}'", key),
        }
    }
    labels
}
