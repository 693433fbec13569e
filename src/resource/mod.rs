//! Remote objects and the collections that hold them

pub mod accessor;
pub mod entity;
pub mod loadbalancer;
pub mod scope;
pub mod service;
pub mod template;

pub use accessor::{Filter, ResourceApi};
pub use entity::{Action, Resource};
pub use loadbalancer::{
    validate_hostname, validate_path, BackendConfig, LbConfig, LoadBalancer, PortRule, RuleError,
    RuleSelector,
};
pub use scope::{Cluster, Project, Stack};
pub use service::{service_labels, InServiceStrategy, LaunchConfigPatch, Service};
