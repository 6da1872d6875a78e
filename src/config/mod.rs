use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::error::ConfigError;

/// Development-only signing secret, used when `JWT_SECRET` is unset outside production
const DEVELOPMENT_JWT_SECRET: &str = "secret123";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub proxy: ProxyConfig,
    pub security: SecurityConfig,
    pub services: ServiceUrls,
    pub routes_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub enable_request_logging: bool,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub timeout_ms: u64,
    pub propagate_identity: bool,
    pub verbose_errors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: Option<String>,
    pub jwt_algorithm: jsonwebtoken::Algorithm,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUrls {
    pub auth_service_url: String,
    pub todo_service_url: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source (the process environment in production)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        let config = match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_overrides(&lookup)?;

        config.validate()?;
        Ok(config)
    }

    fn with_overrides<F>(mut self, lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Server overrides
        if let Some(v) = lookup("GATEWAY_PORT").or_else(|| lookup("PORT")) {
            self.server.port = parse_setting("PORT", &v)?;
        }
        if let Some(v) = lookup("API_ENABLE_REQUEST_LOGGING") {
            self.server.enable_request_logging = v.parse().unwrap_or(self.server.enable_request_logging);
        }
        if let Some(v) = lookup("API_MAX_REQUEST_SIZE_BYTES") {
            self.server.max_request_size_bytes = parse_setting("API_MAX_REQUEST_SIZE_BYTES", &v)?;
        }

        // Proxy overrides
        if let Some(v) = lookup("GATEWAY_TIMEOUT_MS") {
            self.proxy.timeout_ms = parse_setting("GATEWAY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("GATEWAY_PROPAGATE_IDENTITY") {
            self.proxy.propagate_identity = v.parse().unwrap_or(self.proxy.propagate_identity);
        }
        if let Some(v) = lookup("GATEWAY_VERBOSE_ERRORS") {
            self.proxy.verbose_errors = v.parse().unwrap_or(self.proxy.verbose_errors);
        }

        // Security overrides
        if let Some(v) = lookup("JWT_SECRET") {
            self.security.jwt_secret = Some(v);
        }
        if let Some(v) = lookup("JWT_ALGORITHM") {
            self.security.jwt_algorithm = parse_algorithm(&v)?;
        }
        if let Some(v) = lookup("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Some(v) = lookup("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // Downstream services
        if let Some(v) = lookup("AUTH_SERVICE_URL") {
            self.services.auth_service_url = v;
        }
        if let Some(v) = lookup("TODO_SERVICE_URL") {
            self.services.todo_service_url = v;
        }
        if let Some(v) = lookup("GATEWAY_ROUTES_FILE") {
            self.routes_file = Some(PathBuf::from(v));
        }

        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GATEWAY_TIMEOUT_MS".to_string(),
                reason: "timeout must be greater than zero".to_string(),
            });
        }
        if self.environment != Environment::Development && self.security.jwt_secret.is_none() {
            return Err(ConfigError::Missing("JWT_SECRET"));
        }
        if self.is_production() && self.security.jwt_secret.as_deref() == Some(DEVELOPMENT_JWT_SECRET) {
            return Err(ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                reason: "the development secret is not allowed in production".to_string(),
            });
        }
        Ok(())
    }

    /// Secret used to verify bearer tokens
    pub fn jwt_secret(&self) -> &str {
        match &self.security.jwt_secret {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEVELOPMENT_JWT_SECRET
            }
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                port: 8082,
                enable_request_logging: true,
                max_request_size_bytes: 10 * 1024 * 1024, // 10MB
            },
            proxy: ProxyConfig {
                timeout_ms: 10_000,
                propagate_identity: true,
                verbose_errors: true,
            },
            security: SecurityConfig {
                jwt_secret: None,
                jwt_algorithm: jsonwebtoken::Algorithm::HS256,
                enable_cors: true,
                cors_origins: Vec::new(),
            },
            services: ServiceUrls {
                auth_service_url: "http://localhost:5001".to_string(),
                todo_service_url: "http://localhost:5002".to_string(),
            },
            routes_file: None,
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                port: 8082,
                enable_request_logging: true,
                max_request_size_bytes: 5 * 1024 * 1024, // 5MB
            },
            proxy: ProxyConfig {
                timeout_ms: 10_000,
                propagate_identity: true,
                verbose_errors: false,
            },
            security: SecurityConfig {
                jwt_secret: None,
                jwt_algorithm: jsonwebtoken::Algorithm::HS256,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
            services: ServiceUrls {
                auth_service_url: "http://auth-service:5001".to_string(),
                todo_service_url: "http://todo-service:5002".to_string(),
            },
            routes_file: None,
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                port: 8082,
                enable_request_logging: false,
                max_request_size_bytes: 2 * 1024 * 1024, // 2MB
            },
            proxy: ProxyConfig {
                timeout_ms: 10_000,
                propagate_identity: true,
                verbose_errors: false,
            },
            security: SecurityConfig {
                jwt_secret: None,
                jwt_algorithm: jsonwebtoken::Algorithm::HS256,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
            services: ServiceUrls {
                auth_service_url: "http://auth-service:5001".to_string(),
                todo_service_url: "http://todo-service:5002".to_string(),
            },
            routes_file: None,
        }
    }
}

fn parse_setting<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

// Only HMAC algorithms: the gateway verifies with a shared secret
fn parse_algorithm(value: &str) -> Result<jsonwebtoken::Algorithm, ConfigError> {
    match value.trim().to_ascii_uppercase().as_str() {
        "HS256" => Ok(jsonwebtoken::Algorithm::HS256),
        "HS384" => Ok(jsonwebtoken::Algorithm::HS384),
        "HS512" => Ok(jsonwebtoken::Algorithm::HS512),
        other => Err(ConfigError::InvalidValue {
            key: "JWT_ALGORITHM".to_string(),
            reason: format!("unsupported algorithm '{}'", other),
        }),
    }
}
