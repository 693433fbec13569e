//! Entry point to the top-level collections of one Rancher endpoint

use std::sync::Arc;

use super::{Credentials, HttpTransport, Transport, TransportError};
use crate::resource::{Cluster, Filter, Project, Resource, ResourceApi, Service, Stack};

/// Root handle, built once per process from the resolved connection settings.
#[derive(Clone)]
pub struct RancherApi {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl std::fmt::Debug for RancherApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RancherApi")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl RancherApi {
    /// `url` and `api_version` combine into `<url>/<api_version>`.
    pub fn new(transport: Arc<dyn Transport>, url: &str, api_version: &str) -> Self {
        Self {
            transport,
            base_url: format!(
                "{}/{}",
                url.trim_end_matches('/'),
                api_version.trim_matches('/')
            ),
        }
    }

    /// Client over HTTP with basic auth.
    pub fn connect(url: &str, api_version: &str, credentials: Credentials) -> Self {
        Self::new(Arc::new(HttpTransport::new(credentials)), url, api_version)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn collection(&self, name: &str) -> ResourceApi {
        ResourceApi::new(
            self.transport.clone(),
            format!("{}/{}", self.base_url, name),
        )
    }

    async fn fetch(&self, name: &str, filter: &Filter) -> Result<Vec<Resource>, TransportError> {
        let api = self.collection(name);
        Ok(api
            .list(filter)
            .await?
            .into_iter()
            .filter_map(|item| Resource::from_value(&api, item))
            .collect())
    }

    pub async fn clusters(&self, filter: &Filter) -> Result<Vec<Cluster>, TransportError> {
        Ok(self
            .fetch("clusters", filter)
            .await?
            .into_iter()
            .map(Cluster::new)
            .collect())
    }

    pub async fn cluster(&self, filter: &Filter) -> Result<Option<Cluster>, TransportError> {
        Ok(self.clusters(filter).await?.into_iter().next())
    }

    pub async fn projects(&self, filter: &Filter) -> Result<Vec<Project>, TransportError> {
        Ok(self
            .fetch("projects", filter)
            .await?
            .into_iter()
            .map(Project::new)
            .collect())
    }

    pub async fn project(&self, filter: &Filter) -> Result<Option<Project>, TransportError> {
        Ok(self.projects(filter).await?.into_iter().next())
    }

    pub async fn stacks(&self, filter: &Filter) -> Result<Vec<Stack>, TransportError> {
        Ok(self
            .fetch("stacks", filter)
            .await?
            .into_iter()
            .map(Stack::new)
            .collect())
    }

    pub async fn stack(&self, filter: &Filter) -> Result<Option<Stack>, TransportError> {
        Ok(self.stacks(filter).await?.into_iter().next())
    }

    pub async fn services(&self, filter: &Filter) -> Result<Vec<Service>, TransportError> {
        Ok(self
            .fetch("services", filter)
            .await?
            .into_iter()
            .map(Service::from_resource)
            .collect())
    }

    pub async fn service(&self, filter: &Filter) -> Result<Option<Service>, TransportError> {
        Ok(self.services(filter).await?.into_iter().next())
    }
}
