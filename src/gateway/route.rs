use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::config::AppConfig;
use crate::error::{ConfigError, GatewayError};

/// Static mapping from an inbound path prefix to a downstream target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRule {
    pub inbound_prefix: String,
    pub requires_auth: bool,
    pub target_base_url: String,
    pub outbound_prefix: String,
    /// Overrides the gateway-wide forwarding timeout for this route
    pub timeout: Option<Duration>,
}

impl RouteRule {
    pub fn new(
        inbound_prefix: impl Into<String>,
        requires_auth: bool,
        target_base_url: impl Into<String>,
        outbound_prefix: impl Into<String>,
    ) -> Self {
        Self {
            inbound_prefix: inbound_prefix.into(),
            requires_auth,
            target_base_url: target_base_url.into(),
            outbound_prefix: outbound_prefix.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Literal, segment-aligned prefix test: `/api/plans` matches `/api/plans`
    /// and `/api/plans/1` but not `/api/plansx`.
    pub fn matches(&self, path: &str) -> bool {
        strip_route_prefix(path, &self.inbound_prefix).is_some()
    }

    /// Full downstream URL for an inbound path (with optional query)
    pub fn target_url(&self, path_and_query: &str) -> Result<String, GatewayError> {
        let translated = translate(path_and_query, self)?;
        Ok(format!("{}{}", self.target_base_url.trim_end_matches('/'), translated))
    }
}

fn strip_route_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Whether any path segment is `.` or `..`, literally or percent-encoded.
///
/// Matching runs on the raw path while the outbound URL parser resolves dot
/// segments, so such a path could match one rule and land under another.
pub fn has_dot_segments(path: &str) -> bool {
    path.split('/').any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}

/// Rewrite `inbound_prefix` at the start of the path to `outbound_prefix`.
///
/// The remainder of the path and the query string are preserved verbatim.
/// An empty outbound prefix strips the inbound prefix entirely.
pub fn translate(path_and_query: &str, rule: &RouteRule) -> Result<String, GatewayError> {
    let (path, query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    let remainder = strip_route_prefix(path, &rule.inbound_prefix).ok_or_else(|| GatewayError::RouteMismatch {
        prefix: rule.inbound_prefix.clone(),
        path: path.to_string(),
    })?;

    let mut target = format!("{}{}", rule.outbound_prefix.trim_end_matches('/'), remainder);
    if !target.starts_with('/') {
        target.insert(0, '/');
    }

    if let Some(query) = query {
        target.push('?');
        target.push_str(query);
    }

    Ok(target)
}

/// Immutable route table, built once at startup and shared read-only
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
}

impl RouteTable {
    pub fn new(rules: Vec<RouteRule>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !rule.inbound_prefix.starts_with('/') {
                return Err(ConfigError::InvalidPrefix(rule.inbound_prefix.clone()));
            }
            if !rule.outbound_prefix.is_empty() && !rule.outbound_prefix.starts_with('/') {
                return Err(ConfigError::InvalidPrefix(rule.outbound_prefix.clone()));
            }
            if !seen.insert(rule.inbound_prefix.trim_end_matches('/').to_string()) {
                return Err(ConfigError::DuplicatePrefix(rule.inbound_prefix.clone()));
            }
            validate_base_url(&rule.inbound_prefix, &rule.target_base_url)?;
        }

        Ok(Self { rules })
    }

    /// Build the table from a routes file if configured, otherwise the built-in wiring
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        match &config.routes_file {
            Some(path) => Self::from_file(path),
            None => Self::new(default_routes(config)),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::RoutesFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let file: RoutesFile = serde_yaml::from_str(contents)?;

        let rules = file
            .routes
            .into_iter()
            .map(|entry| {
                let base_url = file.services.get(&entry.service).ok_or_else(|| ConfigError::UnknownService {
                    prefix: entry.inbound_prefix.clone(),
                    service: entry.service.clone(),
                })?;

                let mut rule = RouteRule::new(
                    entry.inbound_prefix,
                    entry.requires_auth,
                    base_url.clone(),
                    entry.outbound_prefix,
                );
                rule.timeout = entry.timeout_ms.map(Duration::from_millis);
                Ok(rule)
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;

        Self::new(rules)
    }

    /// Longest matching prefix wins
    pub fn find(&self, path: &str) -> Option<&RouteRule> {
        self.rules
            .iter()
            .filter(|rule| rule.matches(path))
            .max_by_key(|rule| rule.inbound_prefix.trim_end_matches('/').len())
    }

    pub fn rules(&self) -> &[RouteRule] {
        &self.rules
    }

    pub fn prefixes(&self) -> Vec<String> {
        self.rules.iter().map(|rule| rule.inbound_prefix.clone()).collect()
    }
}

fn validate_base_url(prefix: &str, base_url: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidServiceUrl {
        service: prefix.to_string(),
        url: base_url.to_string(),
    };

    let url = Url::parse(base_url).map_err(|_| invalid())?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(()),
        _ => Err(invalid()),
    }
}

/// Built-in wiring: public register/login, everything else authenticated
pub fn default_routes(config: &AppConfig) -> Vec<RouteRule> {
    let auth = &config.services.auth_service_url;
    let todo = &config.services.todo_service_url;

    vec![
        RouteRule::new("/api/auth/register", false, auth.clone(), "/auth/register"),
        RouteRule::new("/api/auth/login", false, auth.clone(), "/auth/login"),
        RouteRule::new("/api/auth", true, auth.clone(), "/auth"),
        RouteRule::new("/api/plans", true, todo.clone(), "/plans"),
        RouteRule::new("/api/tasks", true, todo.clone(), "/tasks"),
    ]
}

#[derive(Debug, Deserialize)]
struct RoutesFile {
    services: BTreeMap<String, String>,
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    inbound_prefix: String,
    #[serde(default = "default_requires_auth")]
    requires_auth: bool,
    service: String,
    #[serde(default)]
    outbound_prefix: String,
    timeout_ms: Option<u64>,
}

fn default_requires_auth() -> bool {
    true
}
