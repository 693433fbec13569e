//! In-memory snapshot of one remote object
//!
//! A `Resource` never changes after construction. Every write or reload hands
//! back a new `Resource` built from the server's response.

use std::collections::BTreeMap;

use reqwest::Method;
use serde_json::{json, Map, Value};

use super::accessor::{Filter, ResourceApi};
use crate::client::TransportError;

/// Named state transitions a resource may advertise under `actions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Activate,
    Deactivate,
    Pause,
    Restart,
    Rollback,
    Upgrade,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Activate => "activate",
            Action::Deactivate => "deactivate",
            Action::Pause => "pause",
            Action::Restart => "restart",
            Action::Rollback => "rollback",
            Action::Upgrade => "upgrade",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Resource {
    id: String,
    kind: String,
    name: Option<String>,
    state: Option<String>,
    links: BTreeMap<String, String>,
    actions: BTreeMap<String, String>,
    attributes: Map<String, Value>,
    api: ResourceApi,
}

fn url_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|url| (k.clone(), url.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

impl Resource {
    /// Build a resource from a server object.
    ///
    /// The resource's own collection is `links.self` minus `/<id>` when that
    /// link is present, otherwise the collection of `api`. Returns `None` for
    /// anything that is not an object carrying an `id`.
    pub fn from_value(api: &ResourceApi, value: Value) -> Option<Self> {
        let attributes = match value {
            Value::Object(map) => map,
            _ => return None,
        };
        let id = match attributes.get("id")? {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let text = |key: &str| attributes.get(key).and_then(Value::as_str).map(String::from);
        let kind = text("type").unwrap_or_default();
        let name = text("name");
        let state = text("state");

        let links = url_map(attributes.get("links"));
        let actions = url_map(attributes.get("actions"));

        let suffix = format!("/{}", id);
        let api = match links.get("self").and_then(|s| s.strip_suffix(&suffix)) {
            Some(collection) => api.at(collection),
            None => api.clone(),
        };

        Some(Self {
            id,
            kind,
            name,
            state,
            links,
            actions,
            attributes,
            api,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if known, id otherwise; for log lines.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn link(&self, name: &str) -> Option<&str> {
        self.links.get(name).map(String::as_str)
    }

    pub fn action_url(&self, action: Action) -> Option<&str> {
        self.actions.get(action.as_str()).map(String::as_str)
    }

    /// Any attribute of the last snapshot; `None` when the server omitted it.
    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.attributes.clone())
    }

    pub fn api(&self) -> &ResourceApi {
        &self.api
    }

    /// Accessor for the collection behind one of this resource's links.
    pub fn linked(&self, name: &str) -> Option<ResourceApi> {
        self.link(name).map(|url| self.api.at(url))
    }

    fn wrap(&self, value: Option<Value>) -> Option<Self> {
        value.and_then(|v| Self::from_value(&self.api, v))
    }

    /// Fetch the current state; `None` if the object no longer exists.
    pub async fn reload(&self) -> Result<Option<Self>, TransportError> {
        let value = match self.link("self") {
            Some(url) => self.api.send(Method::GET, url, None).await?,
            None => {
                self.api
                    .get_one(&Filter::by_id(&self.id))
                    .await?
            }
        };
        Ok(self.wrap(value))
    }

    /// Remove the object on the server. A success without a body yields the
    /// current snapshot.
    pub async fn delete(&self) -> Result<Option<Self>, TransportError> {
        let value = match self.link("remove") {
            Some(url) => self.api.send(Method::DELETE, url, None).await?,
            None => self.api.remove(&self.id).await?,
        };
        match value {
            Some(Value::Null) => Ok(Some(self.clone())),
            other => Ok(self.wrap(other)),
        }
    }

    pub async fn update(&self, overlay: &Value) -> Result<Option<Self>, TransportError> {
        let value = match self.link("update") {
            Some(url) => self.api.send(Method::PUT, url, Some(overlay)).await?,
            None => self.api.update(&self.id, overlay).await?,
        };
        Ok(self.wrap(value))
    }

    async fn transition(
        &self,
        action: Action,
        body: Option<&Value>,
    ) -> Result<Option<Self>, TransportError> {
        let value = match self.action_url(action) {
            Some(url) => self.api.send(Method::POST, url, body).await?,
            None => self.api.action(&self.id, action.as_str(), body).await?,
        };
        Ok(self.wrap(value))
    }

    pub async fn activate(&self) -> Result<Option<Self>, TransportError> {
        self.transition(Action::Activate, None).await
    }

    pub async fn deactivate(&self) -> Result<Option<Self>, TransportError> {
        self.transition(Action::Deactivate, None).await
    }

    pub async fn pause(&self) -> Result<Option<Self>, TransportError> {
        self.transition(Action::Pause, None).await
    }

    pub async fn restart(&self) -> Result<Option<Self>, TransportError> {
        self.transition(Action::Restart, None).await
    }

    pub async fn rollback(&self) -> Result<Option<Self>, TransportError> {
        self.transition(Action::Rollback, None).await
    }

    pub async fn upgrade(&self, strategy: &Value) -> Result<Option<Self>, TransportError> {
        let body = json!({ "inServiceStrategy": strategy });
        self.transition(Action::Upgrade, Some(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;
    use std::sync::Arc;

    const BASE: &str = "http://rancher.local/v2-beta";

    fn fallback_api(mock: &Arc<MockTransport>) -> ResourceApi {
        ResourceApi::new(mock.clone(), format!("{}/services", BASE))
    }

    fn service(links: Value, actions: Value) -> Value {
        json!({
            "id": "1s7",
            "type": "service",
            "name": "web",
            "state": "active",
            "launchConfig": {"imageUuid": "docker:nginx:1.25"},
            "links": links,
            "actions": actions,
        })
    }

    #[test]
    fn test_from_value_typed_and_extra_fields() {
        let mock = Arc::new(MockTransport::new());
        let res = Resource::from_value(&fallback_api(&mock), service(json!({}), json!({}))).unwrap();

        assert_eq!(res.id(), "1s7");
        assert_eq!(res.kind(), "service");
        assert_eq!(res.name(), Some("web"));
        assert_eq!(res.state(), Some("active"));
        assert_eq!(res.attr("launchConfig").unwrap()["imageUuid"], "docker:nginx:1.25");
        assert!(res.attr("scale").is_none());
    }

    #[test]
    fn test_from_value_rejects_non_objects() {
        let mock = Arc::new(MockTransport::new());
        let api = fallback_api(&mock);
        assert!(Resource::from_value(&api, json!([1, 2])).is_none());
        assert!(Resource::from_value(&api, json!({"name": "no-id"})).is_none());
    }

    #[test]
    fn test_collection_derived_from_self_link() {
        let mock = Arc::new(MockTransport::new());
        let value = service(
            json!({"self": "http://rancher.local/v2-beta/projects/1a5/services/1s7"}),
            json!({}),
        );
        let res = Resource::from_value(&fallback_api(&mock), value).unwrap();
        assert_eq!(
            res.api().url(),
            "http://rancher.local/v2-beta/projects/1a5/services"
        );
    }

    #[tokio::test]
    async fn test_advertised_action_takes_precedence() {
        let mock = Arc::new(MockTransport::new());
        let advertised = "http://rancher.local/v2-beta/projects/1a5/services/1s7/?action=restart";
        mock.ok(Method::POST, advertised, service(json!({}), json!({})));

        let res = Resource::from_value(
            &fallback_api(&mock),
            service(json!({}), json!({ "restart": advertised })),
        )
        .unwrap();

        let restarted = res.restart().await.unwrap();
        assert!(restarted.is_some());
        assert_eq!(mock.calls()[0].url, advertised);
    }

    #[tokio::test]
    async fn test_falls_back_to_derived_urls() {
        let mock = Arc::new(MockTransport::new());
        let member = format!("{}/services/1s7", BASE);
        mock.ok(Method::GET, &member, service(json!({}), json!({})));
        mock.ok(Method::PUT, &member, service(json!({}), json!({})));
        mock.on(Method::POST, &format!("{}?action=pause", member), 409, Value::Null);

        let res = Resource::from_value(&fallback_api(&mock), service(json!({}), json!({}))).unwrap();

        assert!(res.reload().await.unwrap().is_some());
        assert!(res.update(&json!({"scale": 2})).await.unwrap().is_some());
        // server rejected the transition
        assert!(res.pause().await.unwrap().is_none());

        let calls = mock.calls();
        assert_eq!(calls[0].method, Method::GET);
        assert_eq!(calls[1].body, Some(json!({"scale": 2})));
        assert_eq!(calls[2].url, format!("{}?action=pause", member));
    }

    #[tokio::test]
    async fn test_reload_of_vanished_object() {
        let mock = Arc::new(MockTransport::new());
        let self_url = format!("{}/services/1s7", BASE);
        mock.on(Method::GET, &self_url, 404, Value::Null);

        let res = Resource::from_value(
            &fallback_api(&mock),
            service(json!({ "self": self_url }), json!({})),
        )
        .unwrap();
        assert!(res.reload().await.unwrap().is_none());
    }
}
