//! Scoping resources: clusters hold projects, projects hold stacks, stacks
//! group services.

use serde_json::{json, Value};
use tracing::debug;

use super::accessor::{Filter, ResourceApi};
use super::service::Service;
use super::{template, Resource};
use crate::client::TransportError;
use crate::merge::merge;

fn wrap_all(api: &ResourceApi, items: Vec<Value>) -> Vec<Resource> {
    items
        .into_iter()
        .filter_map(|item| Resource::from_value(api, item))
        .collect()
}

/// Accessor for the collection behind `link`, if the resource advertises it.
fn linked_api(resource: &Resource, link: &str) -> Option<ResourceApi> {
    let api = resource.linked(link);
    if api.is_none() {
        debug!(
            "{} '{}' has no '{}' link",
            resource.kind(),
            resource.display_name(),
            link
        );
    }
    api
}

#[derive(Debug, Clone)]
pub struct Cluster(Resource);

impl Cluster {
    pub fn new(resource: Resource) -> Self {
        Self(resource)
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    /// `<self>/projects`
    fn projects_api(&self) -> ResourceApi {
        let self_url = match self.0.link("self") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("{}/{}", self.0.api().url(), self.0.id()),
        };
        self.0.api().at(format!("{}/projects", self_url))
    }

    pub async fn projects(&self, filter: &Filter) -> Result<Vec<Project>, TransportError> {
        let api = self.projects_api();
        let items = api.list(filter).await?;
        Ok(wrap_all(&api, items).into_iter().map(Project).collect())
    }

    pub async fn project(&self, filter: &Filter) -> Result<Option<Project>, TransportError> {
        Ok(self.projects(filter).await?.into_iter().next())
    }
}

#[derive(Debug, Clone)]
pub struct Project(Resource);

impl Project {
    pub fn new(resource: Resource) -> Self {
        Self(resource)
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    pub async fn stacks(&self, filter: &Filter) -> Result<Vec<Stack>, TransportError> {
        let Some(api) = linked_api(&self.0, "stacks") else {
            return Ok(Vec::new());
        };
        let items = api.list(filter).await?;
        Ok(wrap_all(&api, items).into_iter().map(Stack).collect())
    }

    pub async fn stack(&self, filter: &Filter) -> Result<Option<Stack>, TransportError> {
        Ok(self.stacks(filter).await?.into_iter().next())
    }

    /// Services owned by this project (`accountId == project id`).
    pub async fn services(&self, filter: &Filter) -> Result<Vec<Service>, TransportError> {
        let Some(api) = linked_api(&self.0, "services") else {
            return Ok(Vec::new());
        };
        let items = api.list(filter).await?;
        Ok(wrap_all(&api, items)
            .into_iter()
            .filter(|service| service.attr_str("accountId") == Some(self.0.id()))
            .map(Service::from_resource)
            .collect())
    }

    pub async fn service(&self, filter: &Filter) -> Result<Option<Service>, TransportError> {
        Ok(self.services(filter).await?.into_iter().next())
    }

    /// Create a stack from the default template overlaid with `fields`.
    pub async fn add_stack(&self, fields: &Value) -> Result<Option<Stack>, TransportError> {
        let Some(api) = linked_api(&self.0, "stacks") else {
            return Ok(None);
        };
        let payload = merge(&template::stack(), fields);
        Ok(api
            .create(&payload)
            .await?
            .and_then(|created| Resource::from_value(&api, created))
            .map(Stack))
    }
}

#[derive(Debug, Clone)]
pub struct Stack(Resource);

impl Stack {
    pub fn new(resource: Resource) -> Self {
        Self(resource)
    }

    pub fn resource(&self) -> &Resource {
        &self.0
    }

    fn service_ids(&self) -> Vec<&str> {
        self.0
            .attr("serviceIds")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub fn services_api(&self) -> Option<ResourceApi> {
        linked_api(&self.0, "services")
    }

    /// Services that are members of this stack (listed in `serviceIds`).
    pub async fn services(&self, filter: &Filter) -> Result<Vec<Service>, TransportError> {
        let Some(api) = self.services_api() else {
            return Ok(Vec::new());
        };
        let members = self.service_ids();
        let items = api.list(filter).await?;
        Ok(wrap_all(&api, items)
            .into_iter()
            .filter(|service| members.contains(&service.id()))
            .map(Service::from_resource)
            .collect())
    }

    pub async fn service(&self, filter: &Filter) -> Result<Option<Service>, TransportError> {
        Ok(self.services(filter).await?.into_iter().next())
    }

    /// Create payload for a service in this stack: the default template
    /// overlaid with `params`, bound to this stack and its project.
    pub fn service_payload(&self, params: &Value) -> Value {
        let mut payload = merge(&template::service(), params);
        payload["launchConfig"]["accountId"] = self
            .0
            .attr("accountId")
            .cloned()
            .unwrap_or(Value::Null);
        payload["stackId"] = json!(self.0.id());
        payload
    }
}
