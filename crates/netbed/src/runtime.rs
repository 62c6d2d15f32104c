//! Thin capability over the container runtime (Docker Engine API).
//!
//! The orchestrator only ever talks to the [`ContainerRuntime`] trait; the
//! [`DockerRuntime`] implementation maps each call 1:1 onto bollard. No call
//! retries internally — retry policy, where it exists, belongs to the
//! orchestrator.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;

use crate::error::ProvisionError;

// ── Data model ──────────────────────────────────────────────────────

/// A pullable image reference: registry path plus optional tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub repository: String,
    pub tag: Option<String>,
}

impl ImageRef {
    /// Parse `repo[:tag]`. The tag separator is only recognized after the
    /// last path segment, so registry ports (`host:5000/img`) stay intact.
    pub fn parse(s: &str) -> Self {
        let last_segment = s.rsplit('/').next().unwrap_or(s);
        match last_segment.split_once(':') {
            Some((_, tag)) => {
                let repo_len = s.len() - tag.len() - 1;
                Self {
                    repository: s[..repo_len].to_string(),
                    tag: Some(tag.to_string()),
                }
            }
            None => Self {
                repository: s.to_string(),
                tag: None,
            },
        }
    }

    /// Tag to pull; an untagged reference means `latest`, never "all tags".
    pub fn pull_tag(&self) -> &str {
        self.tag.as_deref().unwrap_or("latest")
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{}:{}", self.repository, tag),
            None => write!(f, "{}", self.repository),
        }
    }
}

/// A host-path → container-path bind mount.
#[derive(Debug, Clone)]
pub struct BindMount {
    pub host: PathBuf,
    pub container: PathBuf,
}

/// Declarative description of a managed container. Built once at workflow
/// start, never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub image: ImageRef,
    /// TCP ports exposed by the container and bound to the same host port.
    pub exposed_tcp_ports: Vec<u16>,
    pub privileged: bool,
    pub tty: bool,
    pub binds: Vec<BindMount>,
}

/// Runtime-assigned identifier for a started container, plus the logical
/// name it was created under (used for diagnostics).
#[derive(Debug, Clone)]
pub struct ContainerHandle {
    pub id: String,
    pub name: String,
}

/// One network a container is attached to, with its assigned address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkAttachment {
    pub network: String,
    pub address: String,
}

/// Options for a one-shot command inside a running container.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    pub privileged: bool,
    pub tty: bool,
    pub working_dir: Option<String>,
}

/// Captured combined stdout+stderr of an exec.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub bytes: Vec<u8>,
}

impl ExecOutput {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

// ── Trait ───────────────────────────────────────────────────────────

/// Container runtime operations consumed by the orchestrator.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Pull an image. Idempotent: pulling an already-present image succeeds.
    async fn pull_image(&self, image: &ImageRef) -> Result<(), ProvisionError>;

    /// Create a container under a logical name and start it.
    async fn create_and_start(
        &self,
        spec: &ContainerSpec,
        name: &str,
    ) -> Result<ContainerHandle, ProvisionError>;

    /// Current network attachments of a running container.
    async fn inspect_networks(
        &self,
        handle: &ContainerHandle,
    ) -> Result<Vec<NetworkAttachment>, ProvisionError>;

    /// Run a command synchronously inside a running container, capturing
    /// its combined output stream.
    async fn exec(
        &self,
        handle: &ContainerHandle,
        cmd: &[String],
        opts: &ExecOptions,
    ) -> Result<ExecOutput, ProvisionError>;

    /// Best-effort teardown, used only by the optional rollback path.
    async fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<(), ProvisionError>;
}

// ── Docker implementation ───────────────────────────────────────────

/// [`ContainerRuntime`] backed by the local Docker daemon.
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect to the local daemon and verify it responds.
    ///
    /// Daemon reachability is settled here: a failed connect or ping is
    /// `RuntimeUnavailable`; later per-call failures carry their own
    /// variants.
    pub async fn connect() -> Result<Self, ProvisionError> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            ProvisionError::RuntimeUnavailable {
                reason: e.to_string(),
            }
        })?;
        docker
            .ping()
            .await
            .map_err(|e| ProvisionError::RuntimeUnavailable {
                reason: e.to_string(),
            })?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn pull_image(&self, image: &ImageRef) -> Result<(), ProvisionError> {
        tracing::info!(image = %image, "pulling image");
        let options = CreateImageOptions::<String> {
            from_image: image.repository.clone(),
            tag: image.pull_tag().to_string(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(options), None, None);
        while let Some(item) = progress.next().await {
            item.map_err(|e| ProvisionError::ImagePullFailed {
                image: image.to_string(),
                reason: e.to_string(),
            })?;
        }
        tracing::debug!(image = %image, "image present");
        Ok(())
    }

    async fn create_and_start(
        &self,
        spec: &ContainerSpec,
        name: &str,
    ) -> Result<ContainerHandle, ProvisionError> {
        let (exposed_ports, port_bindings) = tcp_port_maps(&spec.exposed_tcp_ports);
        let binds: Vec<String> = spec
            .binds
            .iter()
            .map(|b| format!("{}:{}", b.host.display(), b.container.display()))
            .collect();

        let config = Config::<String> {
            image: Some(spec.image.to_string()),
            tty: Some(spec.tty),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(HostConfig {
                privileged: Some(spec.privileged),
                port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
                binds: (!binds.is_empty()).then_some(binds),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| ProvisionError::ContainerCreateFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ProvisionError::ContainerStartFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!(container = %name, id = %created.id, "container started");
        Ok(ContainerHandle {
            id: created.id,
            name: name.to_string(),
        })
    }

    async fn inspect_networks(
        &self,
        handle: &ContainerHandle,
    ) -> Result<Vec<NetworkAttachment>, ProvisionError> {
        let inspect = self
            .docker
            .inspect_container(&handle.id, None)
            .await
            .map_err(|e| ProvisionError::ContainerInspectFailed {
                name: handle.name.clone(),
                reason: e.to_string(),
            })?;

        let networks = inspect
            .network_settings
            .and_then(|s| s.networks)
            .unwrap_or_default();

        Ok(networks
            .into_iter()
            .map(|(network, endpoint)| NetworkAttachment {
                network,
                address: endpoint.ip_address.unwrap_or_default(),
            })
            .collect())
    }

    async fn exec(
        &self,
        handle: &ContainerHandle,
        cmd: &[String],
        opts: &ExecOptions,
    ) -> Result<ExecOutput, ProvisionError> {
        let exec = self
            .docker
            .create_exec(
                &handle.id,
                CreateExecOptions::<String> {
                    cmd: Some(cmd.to_vec()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    tty: Some(opts.tty),
                    privileged: Some(opts.privileged),
                    working_dir: opts.working_dir.clone(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ProvisionError::ExecCreateFailed {
                name: handle.name.clone(),
                reason: e.to_string(),
            })?;

        let attached = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| ProvisionError::ExecAttachFailed {
                name: handle.name.clone(),
                reason: e.to_string(),
            })?;

        let mut bytes = Vec::new();
        match attached {
            StartExecResults::Attached { mut output, .. } => {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(log) => bytes.extend_from_slice(&log.into_bytes()),
                        Err(e) => {
                            // Partial output is still useful; stop reading.
                            tracing::debug!(container = %handle.name, error = %e,
                                "exec output stream ended early");
                            break;
                        }
                    }
                }
            }
            StartExecResults::Detached => {
                return Err(ProvisionError::ExecAttachFailed {
                    name: handle.name.clone(),
                    reason: "exec started detached, no output stream".into(),
                });
            }
        }
        Ok(ExecOutput { bytes })
    }

    async fn stop_and_remove(&self, handle: &ContainerHandle) -> Result<(), ProvisionError> {
        self.docker
            .stop_container(&handle.id, Some(StopContainerOptions { t: 10 }))
            .await
            .ok();
        self.docker
            .remove_container(
                &handle.id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| ProvisionError::ContainerRemoveFailed {
                name: handle.name.clone(),
                reason: e.to_string(),
            })?;
        tracing::info!(container = %handle.name, "container removed");
        Ok(())
    }
}

/// Build bollard's exposed-ports and port-bindings maps for TCP ports bound
/// 1:1 to the host.
fn tcp_port_maps(
    ports: &[u16],
) -> (
    HashMap<String, HashMap<(), ()>>,
    HashMap<String, Option<Vec<PortBinding>>>,
) {
    let mut exposed = HashMap::new();
    let mut bindings = HashMap::new();
    for port in ports {
        let key = format!("{port}/tcp");
        exposed.insert(key.clone(), HashMap::new());
        bindings.insert(
            key,
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(port.to_string()),
            }]),
        );
    }
    (exposed, bindings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_ref_parses_plain_repository() {
        let r = ImageRef::parse("registry.hub.docker.com/onosproject/onos");
        assert_eq!(r.repository, "registry.hub.docker.com/onosproject/onos");
        assert_eq!(r.tag, None);
        assert_eq!(r.pull_tag(), "latest");
        assert_eq!(r.to_string(), "registry.hub.docker.com/onosproject/onos");
    }

    #[test]
    fn image_ref_parses_tag() {
        let r = ImageRef::parse("onosproject/onos:2.7.0");
        assert_eq!(r.repository, "onosproject/onos");
        assert_eq!(r.tag.as_deref(), Some("2.7.0"));
        assert_eq!(r.to_string(), "onosproject/onos:2.7.0");
    }

    #[test]
    fn image_ref_keeps_registry_port() {
        let r = ImageRef::parse("localhost:5000/mininet");
        assert_eq!(r.repository, "localhost:5000/mininet");
        assert_eq!(r.tag, None);

        let r = ImageRef::parse("localhost:5000/mininet:edge");
        assert_eq!(r.repository, "localhost:5000/mininet");
        assert_eq!(r.tag.as_deref(), Some("edge"));
    }

    #[test]
    fn tcp_port_maps_bind_one_to_one() {
        let (exposed, bindings) = tcp_port_maps(&[8181, 830]);
        assert!(exposed.contains_key("8181/tcp"));
        assert!(exposed.contains_key("830/tcp"));
        let b = bindings["8181/tcp"].as_ref().unwrap();
        assert_eq!(b[0].host_port.as_deref(), Some("8181"));
        assert_eq!(b[0].host_ip, None);
    }
}
