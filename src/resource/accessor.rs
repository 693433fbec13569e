//! Generic operations against one REST collection endpoint
//!
//! Every call is a single network round trip. A non-success status turns into
//! `Ok(None)` (or an empty list); only connection-level failures are errors.
//! Nothing here retries.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use reqwest::{Method, Url};
use serde_json::{json, Value};

use crate::client::{Transport, TransportError};

/// Attribute name to expected value. A `null` value matches an absent
/// attribute and is never sent to the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter(BTreeMap<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().eq("id", id.into())
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self::new().eq("name", name.into())
    }

    pub fn eq(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn id(&self) -> Option<&str> {
        self.0.get("id").and_then(Value::as_str)
    }

    /// Client-side re-check: every filter key must equal the object's value.
    pub fn matches(&self, object: &Value) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| object.get(key).unwrap_or(&Value::Null) == expected)
    }

    fn query_pairs(&self) -> impl Iterator<Item = (&str, String)> {
        self.0
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.as_str(), query_value(v)))
    }
}

fn query_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Accessor for a single collection, e.g. `<base>/v2-beta/services`.
#[derive(Clone)]
pub struct ResourceApi {
    transport: Arc<dyn Transport>,
    url: String,
}

impl fmt::Debug for ResourceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceApi").field("url", &self.url).finish()
    }
}

impl ResourceApi {
    pub fn new(transport: Arc<dyn Transport>, url: impl Into<String>) -> Self {
        Self {
            transport,
            url: url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Accessor for another collection sharing this one's transport.
    pub fn at(&self, url: impl Into<String>) -> Self {
        Self::new(self.transport.clone(), url)
    }

    fn member_url(&self, id: &str) -> String {
        format!("{}/{}", self.url, id)
    }

    fn action_url(&self, id: &str, action: &str) -> String {
        format!("{}/{}?action={}", self.url, id, action)
    }

    /// Issue a request against an absolute URL and keep the body on success.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, TransportError> {
        let response = self.transport.request(method, url, body).await?;
        Ok(response.into_success())
    }

    /// All objects matching `filter`, re-filtered client-side.
    pub async fn list(&self, filter: &Filter) -> Result<Vec<Value>, TransportError> {
        let data = match filter.id() {
            Some(id) => self
                .send(Method::GET, &self.member_url(id), None)
                .await?
                .map(|obj| vec![obj])
                .unwrap_or_default(),
            None => {
                let url = self.encode(filter)?;
                match self.send(Method::GET, &url, None).await? {
                    Some(Value::Object(mut body)) => match body.remove("data") {
                        Some(Value::Array(items)) => items,
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                }
            }
        };

        Ok(data.into_iter().filter(|obj| filter.matches(obj)).collect())
    }

    pub async fn get_one(&self, filter: &Filter) -> Result<Option<Value>, TransportError> {
        Ok(self.list(filter).await?.into_iter().next())
    }

    pub async fn create(&self, template: &Value) -> Result<Option<Value>, TransportError> {
        self.send(Method::POST, &self.url, Some(template)).await
    }

    pub async fn remove(&self, id: &str) -> Result<Option<Value>, TransportError> {
        self.send(Method::DELETE, &self.member_url(id), None).await
    }

    pub async fn update(&self, id: &str, overlay: &Value) -> Result<Option<Value>, TransportError> {
        self.send(Method::PUT, &self.member_url(id), Some(overlay))
            .await
    }

    /// POST `<collection>/<id>?action=<name>`.
    pub async fn action(
        &self,
        id: &str,
        action: &str,
        body: Option<&Value>,
    ) -> Result<Option<Value>, TransportError> {
        self.send(Method::POST, &self.action_url(id, action), body)
            .await
    }

    pub async fn activate(&self, id: &str) -> Result<Option<Value>, TransportError> {
        self.action(id, "activate", None).await
    }

    pub async fn deactivate(&self, id: &str) -> Result<Option<Value>, TransportError> {
        self.action(id, "deactivate", None).await
    }

    pub async fn pause(&self, id: &str) -> Result<Option<Value>, TransportError> {
        self.action(id, "pause", None).await
    }

    pub async fn restart(&self, id: &str) -> Result<Option<Value>, TransportError> {
        self.action(id, "restart", None).await
    }

    pub async fn rollback(&self, id: &str) -> Result<Option<Value>, TransportError> {
        self.action(id, "rollback", None).await
    }

    /// `strategy` is sent as `{"inServiceStrategy": strategy}`.
    pub async fn upgrade(&self, id: &str, strategy: &Value) -> Result<Option<Value>, TransportError> {
        let body = json!({ "inServiceStrategy": strategy });
        self.action(id, "upgrade", Some(&body)).await
    }

    fn encode(&self, filter: &Filter) -> Result<String, TransportError> {
        if filter.is_empty() {
            return Ok(self.url.clone());
        }
        let mut url = Url::parse(&self.url).map_err(|e| TransportError::InvalidUrl {
            url: self.url.clone(),
            reason: e.to_string(),
        })?;
        url.query_pairs_mut().extend_pairs(filter.query_pairs());
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;

    const SERVICES: &str = "http://rancher.local/v2-beta/services";

    fn api(mock: &Arc<MockTransport>) -> ResourceApi {
        ResourceApi::new(mock.clone(), SERVICES)
    }

    #[test]
    fn test_filter_matches() {
        let obj = json!({"name": "web", "state": "active"});
        assert!(Filter::by_name("web").matches(&obj));
        assert!(!Filter::by_name("db").matches(&obj));
        // null filter values stand for "absent"
        assert!(Filter::new().eq("stackId", Value::Null).matches(&obj));
        assert!(!Filter::new().eq("stackId", "1st5").matches(&obj));
    }

    #[tokio::test]
    async fn test_list_refilters_client_side() {
        let mock = Arc::new(MockTransport::new());
        // Server ignores the name filter and returns everything
        mock.ok(
            Method::GET,
            &format!("{}?name=web", SERVICES),
            json!({"data": [{"id": "1s1", "name": "web"}, {"id": "1s2", "name": "db"}]}),
        );

        let found = api(&mock).list(&Filter::by_name("web")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], "1s1");
    }

    #[tokio::test]
    async fn test_list_by_id_hits_member_url() {
        let mock = Arc::new(MockTransport::new());
        mock.ok(
            Method::GET,
            &format!("{}/1s1", SERVICES),
            json!({"id": "1s1", "name": "web"}),
        );

        let found = api(&mock).get_one(&Filter::by_id("1s1")).await.unwrap();
        assert_eq!(found.unwrap()["name"], "web");
        assert_eq!(mock.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_non_success_is_absence() {
        let mock = Arc::new(MockTransport::new());
        mock.on(Method::POST, SERVICES, 422, json!({"code": "NotUnique"}));

        let created = api(&mock).create(&json!({"name": "web"})).await.unwrap();
        assert!(created.is_none());

        let listed = api(&mock).list(&Filter::new()).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_conventional_action_urls() {
        let mock = Arc::new(MockTransport::new());
        let restart_url = format!("{}/1s1?action=restart", SERVICES);
        let upgrade_url = format!("{}/1s1?action=upgrade", SERVICES);
        mock.ok(Method::POST, &restart_url, json!({"id": "1s1"}));
        mock.ok(Method::POST, &upgrade_url, json!({"id": "1s1"}));

        let api = api(&mock);
        assert!(api.restart("1s1").await.unwrap().is_some());
        assert!(api
            .upgrade("1s1", &json!({"batchSize": 1}))
            .await
            .unwrap()
            .is_some());

        let calls = mock.calls();
        assert_eq!(calls[1].url, upgrade_url);
        assert_eq!(
            calls[1].body,
            Some(json!({"inServiceStrategy": {"batchSize": 1}}))
        );
    }
}
