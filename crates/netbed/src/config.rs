//! Testbed configuration.
//!
//! Everything the original workflow hardcoded (image references, container
//! names, port set, credentials, application list, template paths, readiness
//! budget) lives here as an explicit structure with documented defaults.
//! A TOML file can override any subset; CLI flags override on top of that.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {} failed: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {} failed: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Full testbed configuration, one sub-section per managed component.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TestbedConfig {
    pub controller: ControllerConfig,
    pub emulator: EmulatorConfig,
    pub topology: TopologyConfig,
    /// When true, containers started during an aborted run are stopped and
    /// removed in reverse creation order. Off by default: cleanup is an
    /// operator responsibility unless explicitly requested.
    pub cleanup_on_failure: bool,
}

/// SDN controller container + management API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Pullable image reference (registry path, optional `:tag`).
    pub image: String,
    pub container_name: String,
    /// TCP ports exposed by the container and bound 1:1 to the host.
    pub ports: Vec<u16>,
    /// Management API base URL as reachable from this process (host side of
    /// the port bindings, not the container address).
    pub api_url: String,
    pub username: String,
    pub password: String,
    /// Applications to activate, in order. Activation is fail-fast: the
    /// first rejection aborts the whole workflow.
    pub apps: Vec<String>,
    /// When the controller is attached to several networks, prefer the
    /// attachment on this network for address discovery.
    pub preferred_network: Option<String>,
    /// Total budget for the readiness poll before giving up.
    pub readiness_timeout_secs: u64,
    /// Initial readiness poll interval; doubles per attempt, capped at 5s.
    pub poll_interval_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            image: "registry.hub.docker.com/onosproject/onos".into(),
            container_name: "onos".into(),
            ports: vec![8181, 8101, 5005, 830],
            api_url: "http://127.0.0.1:8181/onos/v1".into(),
            username: "onos".into(),
            password: "rocks".into(),
            apps: vec![
                "org.onosproject.fwd".into(),
                "org.onosproject.openflow".into(),
            ],
            preferred_network: None,
            readiness_timeout_secs: 60,
            poll_interval_ms: 500,
        }
    }
}

/// Network emulator container settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub image: String,
    pub container_name: String,
    /// Host directory bind-mounted into the emulator. The rendered topology
    /// script is written here so the exec step can see it.
    pub share_dir: PathBuf,
    /// Mount target inside the emulator container.
    pub container_share_dir: PathBuf,
    /// Command executed inside the emulator once the script is in place.
    pub exec_cmd: Vec<String>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            image: "registry.hub.docker.com/iwaseyusuke/mininet".into(),
            container_name: "mininet".into(),
            share_dir: PathBuf::from("./mininet"),
            container_share_dir: PathBuf::from("/tmp"),
            exec_cmd: vec!["/bin/bash".into(), "create_tree_topo.sh".into()],
        }
    }
}

/// Topology template settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Placeholder-bearing template, read-only input.
    pub template: PathBuf,
    /// File name of the rendered script, written into the share dir.
    pub script_name: String,
    /// Token replaced verbatim by the discovered controller address.
    pub placeholder: String,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            template: PathBuf::from("topo_templates/create_tree_topo_template.sh"),
            script_name: "create_tree_topo.sh".into(),
            placeholder: "onos_ip".into(),
        }
    }
}

impl TestbedConfig {
    /// Host-side path the rendered topology script is written to.
    pub fn rendered_script_path(&self) -> PathBuf {
        self.emulator.share_dir.join(&self.topology.script_name)
    }
}

/// Load a config file, falling back to defaults for absent keys.
pub fn load(path: &Path) -> Result<TestbedConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_stock_testbed() {
        let cfg = TestbedConfig::default();
        assert_eq!(cfg.controller.container_name, "onos");
        assert_eq!(cfg.controller.ports, vec![8181, 8101, 5005, 830]);
        assert_eq!(cfg.controller.apps.len(), 2);
        assert_eq!(cfg.controller.apps[0], "org.onosproject.fwd");
        assert_eq!(cfg.emulator.container_name, "mininet");
        assert_eq!(cfg.emulator.container_share_dir, PathBuf::from("/tmp"));
        assert_eq!(cfg.topology.placeholder, "onos_ip");
        assert!(!cfg.cleanup_on_failure);
        assert_eq!(
            cfg.rendered_script_path(),
            PathBuf::from("./mininet/create_tree_topo.sh")
        );
    }

    #[test]
    fn partial_toml_overrides_keep_other_defaults() {
        let cfg: TestbedConfig = toml::from_str(
            r#"
            cleanup_on_failure = true

            [controller]
            image = "onosproject/onos:2.7.0"
            apps = ["org.onosproject.openflow"]

            [emulator]
            share_dir = "/srv/mininet"
            "#,
        )
        .unwrap();

        assert!(cfg.cleanup_on_failure);
        assert_eq!(cfg.controller.image, "onosproject/onos:2.7.0");
        assert_eq!(cfg.controller.apps, vec!["org.onosproject.openflow"]);
        // untouched keys keep their defaults
        assert_eq!(cfg.controller.username, "onos");
        assert_eq!(cfg.controller.readiness_timeout_secs, 60);
        assert_eq!(cfg.emulator.share_dir, PathBuf::from("/srv/mininet"));
        assert_eq!(cfg.emulator.image, "registry.hub.docker.com/iwaseyusuke/mininet");
    }
}
