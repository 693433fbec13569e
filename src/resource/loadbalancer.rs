//! Port rules and the derived haproxy backend text of a load balancer
//!
//! Rules are unique per `(sourcePort, serviceId, targetPort, protocol)` and
//! kept sorted by `(hostname, path)` descending so that the proxy evaluates
//! later-sorting hostnames and longer paths first. Every rule names a backend
//! section in `lbConfig.config`; editing a rule rewrites that section.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::Resource;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error(
        "Invalid hostname '{0}'. Hostname should either be a full domain like \
         sub.mydomain.com or a wildcard domain like *.mydomain.com, without \
         prefixes like 'http://' or paths like '/a/index'"
    )]
    InvalidHostname(String),

    #[error("Invalid path '{0}': must start with '/'")]
    InvalidPath(String),

    #[error("Malformed lbConfig: {0}")]
    MalformedConfig(#[from] serde_json::Error),
}

// ============================================================================
// Port rules
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortRule {
    #[serde(default)]
    pub hostname: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub service_id: Option<String>,
    #[serde(default)]
    pub source_port: Option<u16>,
    #[serde(default)]
    pub target_port: Option<u16>,
    #[serde(default)]
    pub backend_name: Option<String>,
    /// Fields this client does not interpret, passed back untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PortRule {
    /// Whether both rules route the same source port to the same target.
    pub fn same_target(&self, other: &PortRule) -> bool {
        self.source_port == other.source_port
            && self.service_id == other.service_id
            && self.target_port == other.target_port
            && self.protocol == other.protocol
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        validate_hostname(self.hostname.as_deref().unwrap_or(""))?;
        validate_path(self.path.as_deref().unwrap_or(""))
    }

    /// `<sourcePort>_<serviceName>_<targetPort>_<protocol>`
    pub fn backend_name_for(service_name: &str, source_port: u16, target_port: u16, protocol: &str) -> String {
        format!("{}_{}_{}_{}", source_port, service_name, target_port, protocol)
    }
}

/// Identifies rules to drop: equal hostname, path, source and target port.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSelector {
    pub hostname: String,
    pub path: String,
    pub source_port: u16,
    pub target_port: u16,
}

impl RuleSelector {
    pub fn matches(&self, rule: &PortRule) -> bool {
        rule.hostname.as_deref() == Some(self.hostname.as_str())
            && rule.path.as_deref() == Some(self.path.as_str())
            && rule.source_port == Some(self.source_port)
            && rule.target_port == Some(self.target_port)
    }

    pub fn validate(&self) -> Result<(), RuleError> {
        validate_hostname(&self.hostname)?;
        validate_path(&self.path)
    }
}

pub fn validate_hostname(hostname: &str) -> Result<(), RuleError> {
    if hostname.trim().is_empty() || hostname.contains(':') || hostname.contains('/') {
        return Err(RuleError::InvalidHostname(hostname.to_string()));
    }
    Ok(())
}

pub fn validate_path(path: &str) -> Result<(), RuleError> {
    if !path.starts_with('/') {
        return Err(RuleError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// Stable sort, `(hostname, path)` descending.
pub fn sort_rules(rules: &mut [PortRule]) {
    rules.sort_by(|a, b| (&b.hostname, &b.path).cmp(&(&a.hostname, &a.path)));
}

// ============================================================================
// lbConfig
// ============================================================================

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<PortRule>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<PortRule>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LbConfig {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub port_rules: Vec<PortRule>,
    #[serde(default)]
    pub config: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Evict any rule with the same target, put `rule` first, re-sort, and
/// rewrite the rule's backend section from `custom_lines`.
pub fn upsert_rule(mut config: LbConfig, rule: PortRule, custom_lines: &[String]) -> LbConfig {
    config.port_rules.retain(|existing| !existing.same_target(&rule));
    let backend = rule.backend_name.clone();
    config.port_rules.insert(0, rule);
    sort_rules(&mut config.port_rules);

    if let Some(name) = backend {
        let mut backends = BackendConfig::parse(config.config.as_deref().unwrap_or(""));
        backends.set(&name, custom_lines);
        config.config = Some(backends.render());
    }
    config
}

/// Drop every rule the selector matches. Backend text is left alone.
pub fn remove_rule(mut config: LbConfig, selector: &RuleSelector) -> LbConfig {
    config.port_rules.retain(|rule| !selector.matches(rule));
    config
}

// ============================================================================
// Backend config text
// ============================================================================

fn backend_header() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"^backend\s+(.+?)\s*$").expect("valid backend header pattern"))
}

/// `backend <name>` sections of an haproxy snippet, in document order.
///
/// Text before the first header belongs to no section and is dropped. A name
/// appears at most once and sections with blank bodies are not kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendConfig {
    sections: Vec<(String, String)>,
}

impl BackendConfig {
    pub fn parse(text: &str) -> Self {
        let mut raw: Vec<(String, Vec<&str>)> = Vec::new();

        for line in text.lines() {
            if let Some(caps) = backend_header().captures(line) {
                raw.push((caps[1].to_string(), Vec::new()));
            } else if let Some((_, body)) = raw.last_mut() {
                body.push(line);
            }
        }

        let mut parsed = Self::default();
        for (name, body) in raw {
            parsed.insert(name, body.join("\n").trim_matches('\n').to_string());
        }
        parsed.drop_empty();
        parsed
    }

    fn insert(&mut self, name: String, body: String) {
        match self.sections.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, current)) => *current = body,
            None => self.sections.push((name, body)),
        }
    }

    fn drop_empty(&mut self) {
        self.sections.retain(|(_, body)| !body.trim().is_empty());
    }

    /// Replace the body of `name` with `lines`. No lines removes the section.
    pub fn set(&mut self, name: &str, lines: &[String]) {
        self.insert(name.to_string(), format!("{}\n", lines.join("\n")));
        self.drop_empty();
    }

    pub fn section(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, body)| body.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sections.iter().map(|(name, _)| name.as_str())
    }

    pub fn render(&self) -> String {
        self.sections
            .iter()
            .map(|(name, body)| format!("backend {}\n{}", name, body))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// Load balancer service
// ============================================================================

#[derive(Debug, Clone)]
pub struct LoadBalancer {
    resource: Resource,
}

impl LoadBalancer {
    pub(crate) fn new(resource: Resource) -> Self {
        Self { resource }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn lb_config(&self) -> Result<LbConfig, RuleError> {
        match self.resource.attr("lbConfig") {
            None | Some(Value::Null) => Ok(LbConfig::default()),
            Some(value) => Ok(serde_json::from_value(value.clone())?),
        }
    }

    /// Update payload adding (or replacing) `rule` and its backend section.
    pub fn port_rule_update(&self, rule: PortRule, custom_lines: &[String]) -> Result<Value, RuleError> {
        rule.validate()?;
        let config = upsert_rule(self.lb_config()?, rule, custom_lines);
        lb_payload(config)
    }

    /// Update payload without the rules matched by `selector`.
    pub fn port_rule_removal(&self, selector: &RuleSelector) -> Result<Value, RuleError> {
        selector.validate()?;
        let config = remove_rule(self.lb_config()?, selector);
        lb_payload(config)
    }
}

fn lb_payload(config: LbConfig) -> Result<Value, RuleError> {
    let mut payload = Map::new();
    payload.insert("lbConfig".to_string(), serde_json::to_value(config)?);
    Ok(Value::Object(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rule(host: &str, path: &str, source: u16, service: &str, target: u16) -> PortRule {
        PortRule {
            hostname: Some(host.to_string()),
            path: Some(path.to_string()),
            priority: Some(1),
            protocol: Some("http".to_string()),
            service_id: Some(service.to_string()),
            source_port: Some(source),
            target_port: Some(target),
            backend_name: Some(PortRule::backend_name_for(service, source, target, "http")),
            extra: Map::new(),
        }
    }

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_hostname_validation() {
        assert!(validate_hostname("*.a.com").is_ok());
        assert!(validate_hostname("sub.mydomain.com").is_ok());
        assert!(matches!(
            validate_hostname("http://a.com"),
            Err(RuleError::InvalidHostname(_))
        ));
        assert!(validate_hostname("a.com:80").is_err());
        assert!(validate_hostname("   ").is_err());
    }

    #[test]
    fn test_path_validation() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/api/v1").is_ok());
        assert!(matches!(validate_path("api"), Err(RuleError::InvalidPath(_))));
    }

    #[test]
    fn test_upsert_keeps_one_rule_per_target() {
        let mut first = rule("a.example.com", "/", 80, "s1", 8080);
        first.priority = Some(1);
        let mut second = first.clone();
        second.priority = Some(7);

        let config = upsert_rule(LbConfig::default(), first, &[]);
        let config = upsert_rule(config, second, &[]);

        assert_eq!(config.port_rules.len(), 1);
        assert_eq!(config.port_rules[0].priority, Some(7));
    }

    #[test]
    fn test_rules_sorted_descending() {
        let config = upsert_rule(LbConfig::default(), rule("a.example.com", "/y", 80, "s1", 8080), &[]);
        let config = upsert_rule(config, rule("b.example.com", "/x", 80, "s2", 8080), &[]);
        let config = upsert_rule(config, rule("b.example.com", "/y", 81, "s3", 8080), &[]);

        let order: Vec<_> = config
            .port_rules
            .iter()
            .map(|r| (r.hostname.clone().unwrap(), r.path.clone().unwrap()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("b.example.com".to_string(), "/y".to_string()),
                ("b.example.com".to_string(), "/x".to_string()),
                ("a.example.com".to_string(), "/y".to_string()),
            ]
        );
    }

    #[test]
    fn test_backend_section_replaced() {
        let mut r = rule("a.example.com", "/", 80, "s1", 8080);
        r.backend_name = Some("b1".to_string());

        let config = upsert_rule(LbConfig::default(), r.clone(), &lines(&["reqrep ^old old"]));
        let config = upsert_rule(config, r, &lines(&["http-request set-header X-A 1", "timeout server 30s"]));

        let text = config.config.unwrap();
        assert_eq!(text.matches("backend b1").count(), 1);
        let parsed = BackendConfig::parse(&text);
        assert_eq!(
            parsed.section("b1"),
            Some("http-request set-header X-A 1\ntimeout server 30s")
        );
        assert!(!text.contains("reqrep"));
    }

    #[test]
    fn test_empty_custom_config_drops_section() {
        let existing = "backend 80_web_8080_http\nreqrep a b\nbackend other\ntimeout client 5s\n";
        let config = LbConfig {
            config: Some(existing.to_string()),
            ..LbConfig::default()
        };

        let config = upsert_rule(config, rule("a.com", "/", 80, "web", 8080), &[]);
        let parsed = BackendConfig::parse(config.config.as_deref().unwrap());
        assert_eq!(parsed.names().collect::<Vec<_>>(), vec!["other"]);
    }

    #[test]
    fn test_parse_keeps_order_and_drops_leading_text() {
        let text = "global tune\nbackend one\nl1\n\nbackend empty\n   \nbackend two\nl2\n";
        let parsed = BackendConfig::parse(text);
        assert_eq!(parsed.names().collect::<Vec<_>>(), vec!["one", "two"]);
        assert_eq!(parsed.render(), "backend one\nl1\nbackend two\nl2");
    }

    #[test]
    fn test_upsert_drops_text_before_first_backend() {
        let existing = "something\nrubbish\nbackend 80_web_8080_http\nold line\n\nbackend other\nhttp_rewrite x";
        let config = LbConfig {
            config: Some(existing.to_string()),
            ..LbConfig::default()
        };

        let config = upsert_rule(config, rule("a.com", "/", 80, "web", 8080), &lines(&["new line"]));
        let text = config.config.unwrap();
        assert!(!text.contains("something"));
        assert!(!text.contains("rubbish"));
        assert!(text.starts_with("backend 80_web_8080_http\nnew line"));
        assert!(text.contains("backend other\nhttp_rewrite x"));
    }

    #[test]
    fn test_remove_rule_leaves_backend_text() {
        let keep = rule("b.com", "/", 80, "s2", 8080);
        let config = upsert_rule(LbConfig::default(), rule("a.com", "/api", 80, "s1", 8080), &lines(&["x"]));
        let config = upsert_rule(config, keep.clone(), &[]);
        let before = config.config.clone();

        let selector = RuleSelector {
            hostname: "a.com".to_string(),
            path: "/api".to_string(),
            source_port: 80,
            target_port: 8080,
        };
        let config = remove_rule(config, &selector);
        assert_eq!(config.port_rules, vec![keep]);
        assert_eq!(config.config, before);
    }

    #[test]
    fn test_lb_config_round_trips_unknown_fields() {
        let raw = json!({
            "type": "lbConfig",
            "certificateIds": [],
            "config": null,
            "portRules": [{
                "type": "portRule",
                "hostname": null,
                "path": "",
                "sourcePort": 443,
                "targetPort": 80,
                "serviceId": "1s9",
                "protocol": "https"
            }]
        });
        let parsed: LbConfig = serde_json::from_value(raw).unwrap();
        assert_eq!(parsed.extra["type"], "lbConfig");
        assert_eq!(parsed.port_rules[0].extra["type"], "portRule");

        let back = serde_json::to_value(&parsed).unwrap();
        assert_eq!(back["certificateIds"], json!([]));
        assert_eq!(back["portRules"][0]["sourcePort"], 443);
    }

    #[test]
    fn test_null_port_rules_is_empty() {
        let parsed: LbConfig = serde_json::from_value(json!({"portRules": null})).unwrap();
        assert!(parsed.port_rules.is_empty());
    }
}
