//! Configuration schema definitions.
//!
//! [`MetaConfig`] is the middleware's own configuration and uses the
//! camelCase field names of the declarative plugin format. [`AppConfig`]
//! wraps it with the settings of the hosting proxy and is read from TOML.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Default trigger query parameter name.
pub const DEFAULT_QUERY_PARAM: &str = "include";

/// Default trigger query parameter value.
pub const DEFAULT_QUERY_VALUE: &str = "meta";

/// Metadata merged into a triggered response when none is configured.
pub fn default_meta_data() -> Map<String, Value> {
    let mut meta = Map::new();
    meta.insert("meta".to_string(), json!({ "route_name": "v2-translate" }));
    meta
}

/// Conditional metadata injection settings.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetaConfig {
    /// Query parameter that carries the trigger.
    pub query_param: String,

    /// Value the trigger parameter must equal exactly.
    pub query_value: String,

    /// Top-level keys written into the response object.
    pub meta_data: Map<String, Value>,
}

impl Default for MetaConfig {
    fn default() -> Self {
        Self {
            query_param: DEFAULT_QUERY_PARAM.to_string(),
            query_value: DEFAULT_QUERY_VALUE.to_string(),
            meta_data: default_meta_data(),
        }
    }
}

impl MetaConfig {
    /// Replace every empty field with its default.
    pub fn normalized(mut self) -> Self {
        if self.query_param.is_empty() {
            self.query_param = DEFAULT_QUERY_PARAM.to_string();
        }
        if self.query_value.is_empty() {
            self.query_value = DEFAULT_QUERY_VALUE.to_string();
        }
        if self.meta_data.is_empty() {
            self.meta_data = default_meta_data();
        }
        self
    }
}

/// Root configuration for the hosting proxy.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Upstream that produces the original responses.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Conditional metadata middleware instance.
    pub middleware: MiddlewareConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Upstream configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:3000").
    pub address: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:3000".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// A named middleware instance and its settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Instance name, used in logs and metric labels.
    pub name: String,

    pub config: MetaConfig,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            name: "conditional-meta".to_string(),
            config: MetaConfig::default(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_config_defaults() {
        let config = MetaConfig::default();
        assert_eq!(config.query_param, "include");
        assert_eq!(config.query_value, "meta");
        assert_eq!(
            config.meta_data.get("meta"),
            Some(&json!({ "route_name": "v2-translate" }))
        );
    }

    #[test]
    fn test_normalized_fills_empty_fields() {
        let config = MetaConfig {
            query_param: String::new(),
            query_value: String::new(),
            meta_data: Map::new(),
        }
        .normalized();
        assert_eq!(config, MetaConfig::default());

        let custom = MetaConfig {
            query_param: "custom".into(),
            query_value: String::new(),
            meta_data: Map::new(),
        }
        .normalized();
        assert_eq!(custom.query_param, "custom");
        assert_eq!(custom.query_value, "meta");
    }

    #[test]
    fn test_meta_config_from_json_uses_camel_case() {
        let config: MetaConfig = serde_json::from_value(json!({
            "queryParam": "custom",
            "queryValue": "data",
            "metaData": { "custom": { "test": "value" } }
        }))
        .unwrap();

        assert_eq!(config.query_param, "custom");
        assert_eq!(config.query_value, "data");
        assert_eq!(config.meta_data.get("custom"), Some(&json!({ "test": "value" })));
    }

    #[test]
    fn test_meta_config_missing_fields_default() {
        let config: MetaConfig = serde_json::from_value(json!({ "queryValue": "x" })).unwrap();
        assert_eq!(config.query_param, "include");
        assert_eq!(config.query_value, "x");
        assert_eq!(config.meta_data, default_meta_data());
    }

    #[test]
    fn test_app_config_from_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [upstream]
            address = "127.0.0.1:4000"

            [middleware]
            name = "translate-meta"

            [middleware.config]
            queryParam = "with"

            [middleware.config.metaData.meta]
            route_name = "v3-translate"
            version = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.upstream.address, "127.0.0.1:4000");
        assert_eq!(config.timeouts.request_secs, 30);
        assert_eq!(config.middleware.name, "translate-meta");
        assert_eq!(config.middleware.config.query_param, "with");
        assert_eq!(config.middleware.config.query_value, "meta");
        assert_eq!(
            config.middleware.config.meta_data.get("meta"),
            Some(&json!({ "route_name": "v3-translate", "version": 3 }))
        );
    }
}
