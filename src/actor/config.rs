//! Actor configuration: the part of an actor's state that survives hot
//! reconfiguration and is what `changeConfiguration` compares against
//! (spec §4.4.4).

// Layer 1: Standard library imports
use std::collections::HashMap;

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Layer 3: Internal module imports
use super::state::{ActorMode, OnCrash};

/// One TCP/process endpoint a remote or clustered actor may target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEndpoint {
    pub host: String,
    pub port: u16,
}

/// How a clustered actor's children are addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClusterTarget {
    /// An explicit, literal list of endpoints.
    Endpoints(Vec<HostEndpoint>),
    /// The name of a cluster list the Actor System was given out-of-band
    /// (spec §4.5.3: "or `cluster` references a named list").
    Named(String),
}

/// Which balancing strategy a clustered actor uses (spec §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BalancerKind {
    RoundRobin,
    Random,
    /// The name of a strategy registered with the Actor System
    /// implementing `forward`/`clusterChanged` (spec §4.6: "Custom").
    Custom(String),
}

impl Default for BalancerKind {
    fn default() -> Self {
        BalancerKind::RoundRobin
    }
}

/// Persistent actor configuration (spec §3: the `config` attribute).
///
/// Two configs are "equal modulo `customParameters`" (spec §4.4.4 step 1)
/// when every field except `custom_parameters` compares equal; see
/// [`ActorConfig::equal_modulo_custom_parameters`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorConfig {
    #[serde(default = "default_mode")]
    pub mode: ActorMode,

    #[serde(rename = "clusterSize", default)]
    pub cluster_size: Option<usize>,

    #[serde(rename = "customParameters", default)]
    pub custom_parameters: HashMap<String, Value>,

    #[serde(rename = "onCrash", default)]
    pub on_crash: OnCrash,

    #[serde(rename = "dropMessagesOnOverload", default)]
    pub drop_messages_on_overload: bool,

    #[serde(default)]
    pub balancer: BalancerKind,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub cluster: Option<ClusterTarget>,

    #[serde(rename = "pingTimeoutMs", default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

fn default_mode() -> ActorMode {
    ActorMode::InMemory
}

/// Default liveness ping timeout: 15s (spec §5: "pingTimeout, default 15 s").
pub fn default_ping_timeout_ms() -> u64 {
    15_000
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            cluster_size: None,
            custom_parameters: HashMap::new(),
            on_crash: OnCrash::default(),
            drop_messages_on_overload: false,
            balancer: BalancerKind::default(),
            host: None,
            port: None,
            cluster: None,
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

impl ActorConfig {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn forked() -> Self {
        Self {
            mode: ActorMode::Forked,
            ..Self::default()
        }
    }

    pub fn remote(host: impl Into<String>, port: u16) -> Self {
        Self {
            mode: ActorMode::Remote,
            host: Some(host.into()),
            port: Some(port),
            ..Self::default()
        }
    }

    pub fn threaded() -> Self {
        Self {
            mode: ActorMode::Threaded,
            ..Self::default()
        }
    }

    pub fn with_cluster_size(mut self, size: usize) -> Self {
        self.cluster_size = Some(size);
        self
    }

    pub fn with_on_crash(mut self, on_crash: OnCrash) -> Self {
        self.on_crash = on_crash;
        self
    }

    pub fn with_custom_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.custom_parameters.insert(key.into(), value);
        self
    }

    /// Whether this config describes a clustered (multi-child, balanced)
    /// actor rather than a single endpoint.
    pub fn is_clustered(&self) -> bool {
        matches!(self.cluster_size, Some(n) if n > 1) || self.cluster.is_some()
    }

    /// spec §4.4.4 step 1: "If `newCfg` equals the current config modulo
    /// `customParameters`, no-op."
    pub fn equal_modulo_custom_parameters(&self, other: &ActorConfig) -> bool {
        self.mode == other.mode
            && self.cluster_size == other.cluster_size
            && self.on_crash == other.on_crash
            && self.drop_messages_on_overload == other.drop_messages_on_overload
            && self.balancer == other.balancer
            && self.host == other.host
            && self.port == other.port
            && self.cluster == other.cluster
            && self.ping_timeout_ms == other.ping_timeout_ms
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_in_memory() {
        let cfg = ActorConfig::default();
        assert_eq!(cfg.mode, ActorMode::InMemory);
        assert_eq!(cfg.ping_timeout_ms, 15_000);
    }

    #[test]
    fn equal_modulo_custom_parameters_ignores_only_that_field() {
        let a = ActorConfig::default().with_custom_parameter("x", Value::from(1));
        let b = ActorConfig::default().with_custom_parameter("x", Value::from(2));
        assert!(a.equal_modulo_custom_parameters(&b));

        let c = ActorConfig::forked();
        assert!(!a.equal_modulo_custom_parameters(&c));
    }

    #[test]
    fn cluster_size_above_one_is_clustered() {
        let cfg = ActorConfig::default().with_cluster_size(3);
        assert!(cfg.is_clustered());
        assert!(!ActorConfig::default().is_clustered());
    }

    #[test]
    fn deserializes_unknown_keys_are_ignored_by_serde_default() {
        let json = serde_json::json!({
            "mode": "forked",
            "clusterSize": 4,
            "somethingUnrelated": true
        });
        let cfg: ActorConfig = serde_json::from_value(json).unwrap();
        assert_eq!(cfg.mode, ActorMode::Forked);
        assert_eq!(cfg.cluster_size, Some(4));
    }
}
