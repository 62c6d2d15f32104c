//! Provisioning orchestrator.
//!
//! Drives the whole testbed bring-up as a single linear workflow:
//!
//! ```text
//! Init → ImagesPulled → ControllerRunning → EmulatorRunning
//!      → ControllerReady → AppsActivated → AddressDiscovered
//!      → TopologyRendered → Done
//! ```
//!
//! Every failure is fatal and moves the workflow to `Aborted`; there is no
//! retry and no partial-success path. The only parallelism is the two
//! independent image pulls, which are joined before any container is
//! created. Started containers are tracked on a stack and, when
//! `cleanup_on_failure` is set, unwound best-effort in reverse order on
//! abort.

use std::time::{Duration, Instant};

use crate::config::TestbedConfig;
use crate::controller::ControllerApi;
use crate::error::ProvisionError;
use crate::runtime::{
    BindMount, ContainerHandle, ContainerRuntime, ContainerSpec, ExecOptions, ImageRef,
    NetworkAttachment,
};
use crate::topology;

/// Cap for the doubling readiness poll interval.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Workflow position. Terminal states are `Done` and `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    Init,
    ImagesPulled,
    ControllerRunning,
    EmulatorRunning,
    ControllerReady,
    AppsActivated,
    AddressDiscovered,
    TopologyRendered,
    Done,
    Aborted,
}

/// What a successful run produced.
#[derive(Debug, Clone)]
pub struct ProvisionOutcome {
    /// Controller container address substituted into the topology script.
    pub controller_address: String,
    /// Captured combined output of the script run inside the emulator.
    pub script_output: String,
}

/// Sequences runtime, controller-API and templating calls into one
/// deterministic provisioning run.
pub struct Provisioner {
    runtime: Box<dyn ContainerRuntime>,
    controller: Box<dyn ControllerApi>,
    config: TestbedConfig,
    state: ProvisionState,
    /// Containers started so far, in creation order. Unwound in reverse on
    /// abort when cleanup is enabled.
    acquired: Vec<ContainerHandle>,
}

impl Provisioner {
    pub fn new(
        runtime: Box<dyn ContainerRuntime>,
        controller: Box<dyn ControllerApi>,
        config: TestbedConfig,
    ) -> Self {
        Self {
            runtime,
            controller,
            config,
            state: ProvisionState::Init,
            acquired: Vec::new(),
        }
    }

    pub fn state(&self) -> ProvisionState {
        self.state
    }

    /// Run the workflow to completion. Single-shot: a `Provisioner` is not
    /// reusable after `run` returns.
    pub async fn run(&mut self) -> Result<ProvisionOutcome, ProvisionError> {
        match self.drive().await {
            Ok(outcome) => {
                self.transition(ProvisionState::Done);
                Ok(outcome)
            }
            Err(err) => {
                self.transition(ProvisionState::Aborted);
                if self.config.cleanup_on_failure {
                    self.unwind().await;
                }
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<ProvisionOutcome, ProvisionError> {
        let controller_image = ImageRef::parse(&self.config.controller.image);
        let emulator_image = ImageRef::parse(&self.config.emulator.image);

        // The pulls are order-independent; either failure aborts before any
        // container exists.
        tokio::try_join!(
            self.runtime.pull_image(&controller_image),
            self.runtime.pull_image(&emulator_image),
        )?;
        self.transition(ProvisionState::ImagesPulled);

        let controller_spec = ContainerSpec {
            image: controller_image,
            exposed_tcp_ports: self.config.controller.ports.clone(),
            privileged: false,
            tty: false,
            binds: Vec::new(),
        };
        let controller_name = self.config.controller.container_name.clone();
        let controller = self
            .runtime
            .create_and_start(&controller_spec, &controller_name)
            .await?;
        self.acquired.push(controller.clone());
        self.transition(ProvisionState::ControllerRunning);

        let emulator_spec = ContainerSpec {
            image: emulator_image,
            exposed_tcp_ports: Vec::new(),
            privileged: true,
            tty: true,
            binds: vec![BindMount {
                host: self.config.emulator.share_dir.clone(),
                container: self.config.emulator.container_share_dir.clone(),
            }],
        };
        let emulator_name = self.config.emulator.container_name.clone();
        let emulator = self
            .runtime
            .create_and_start(&emulator_spec, &emulator_name)
            .await?;
        self.acquired.push(emulator.clone());
        self.transition(ProvisionState::EmulatorRunning);

        self.wait_for_controller().await?;
        self.transition(ProvisionState::ControllerReady);

        for app in &self.config.controller.apps {
            let status = self.controller.activate(app).await?;
            if status != 200 {
                return Err(ProvisionError::ActivationRejected {
                    app: app.clone(),
                    status,
                });
            }
            tracing::info!(app = %app, "application activated");
        }
        self.transition(ProvisionState::AppsActivated);

        let attachments = self.runtime.inspect_networks(&controller).await?;
        let address = select_address(
            self.config.controller.preferred_network.as_deref(),
            &attachments,
        )
        .ok_or_else(|| ProvisionError::NoNetworkAddress {
            name: controller.name.clone(),
        })?;
        tracing::info!(container = %controller.name, address = %address, "controller address discovered");
        self.transition(ProvisionState::AddressDiscovered);

        let script = self.config.rendered_script_path();
        topology::render(
            &self.config.topology.template,
            &script,
            &self.config.topology.placeholder,
            &address,
        )?;
        self.transition(ProvisionState::TopologyRendered);

        let opts = ExecOptions {
            privileged: true,
            tty: true,
            working_dir: Some(self.config.emulator.container_share_dir.display().to_string()),
        };
        let output = self
            .runtime
            .exec(&emulator, &self.config.emulator.exec_cmd, &opts)
            .await?;

        Ok(ProvisionOutcome {
            controller_address: address,
            script_output: output.text(),
        })
    }

    /// Bounded readiness poll with doubling interval. Replaces the fixed
    /// settling sleep the original workflow used: the controller counts as
    /// ready once its application listing answers 200.
    async fn wait_for_controller(&self) -> Result<(), ProvisionError> {
        let budget = Duration::from_secs(self.config.controller.readiness_timeout_secs);
        let mut interval = Duration::from_millis(self.config.controller.poll_interval_ms.max(1));
        let started = Instant::now();

        loop {
            if self.controller.probe_ready().await {
                tracing::info!(waited = ?started.elapsed(), "controller management API ready");
                return Ok(());
            }
            if started.elapsed() >= budget {
                return Err(ProvisionError::ControllerNotReady {
                    waited: started.elapsed(),
                });
            }
            tracing::debug!(retry_in = ?interval, "controller not ready yet");
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(MAX_POLL_INTERVAL);
        }
    }

    /// Best-effort rollback: stop and remove acquired containers in reverse
    /// creation order. Failures are logged and skipped.
    async fn unwind(&mut self) {
        while let Some(handle) = self.acquired.pop() {
            tracing::warn!(container = %handle.name, "rolling back container");
            if let Err(err) = self.runtime.stop_and_remove(&handle).await {
                tracing::warn!(container = %handle.name, error = %err,
                    "rollback failed, container left behind");
            }
        }
    }

    fn transition(&mut self, next: ProvisionState) {
        tracing::debug!(from = ?self.state, to = ?next, "workflow transition");
        self.state = next;
    }
}

/// Pick the controller address out of its network attachments.
///
/// A configured preferred network wins. Otherwise the lexicographically
/// first network with a non-empty address is chosen, which keeps the pick
/// deterministic when the runtime reports several attachments.
fn select_address(preferred: Option<&str>, attachments: &[NetworkAttachment]) -> Option<String> {
    if let Some(name) = preferred {
        match attachments
            .iter()
            .find(|a| a.network == name && !a.address.is_empty())
        {
            Some(a) => return Some(a.address.clone()),
            None => {
                tracing::warn!(network = name, "preferred network not attached, falling back");
            }
        }
    }

    let mut candidates: Vec<&NetworkAttachment> = attachments
        .iter()
        .filter(|a| !a.address.is_empty())
        .collect();
    candidates.sort_by(|a, b| a.network.cmp(&b.network));
    if candidates.len() > 1 {
        tracing::warn!(
            count = candidates.len(),
            chosen = %candidates[0].network,
            "multiple network attachments, picking first by network name"
        );
    }
    candidates.first().map(|a| a.address.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(network: &str, address: &str) -> NetworkAttachment {
        NetworkAttachment {
            network: network.into(),
            address: address.into(),
        }
    }

    #[test]
    fn single_attachment_is_selected() {
        let atts = vec![attachment("bridge", "172.17.0.2")];
        assert_eq!(select_address(None, &atts).as_deref(), Some("172.17.0.2"));
    }

    #[test]
    fn empty_addresses_never_selected() {
        assert_eq!(select_address(None, &[]), None);
        let atts = vec![attachment("bridge", "")];
        assert_eq!(select_address(None, &atts), None);
    }

    #[test]
    fn preferred_network_wins() {
        let atts = vec![
            attachment("bridge", "172.17.0.2"),
            attachment("testbed", "10.9.0.4"),
        ];
        assert_eq!(
            select_address(Some("testbed"), &atts).as_deref(),
            Some("10.9.0.4")
        );
    }

    #[test]
    fn missing_preferred_network_falls_back_deterministically() {
        let atts = vec![
            attachment("zebra", "10.1.1.1"),
            attachment("alpha", "10.2.2.2"),
        ];
        // "alpha" sorts first regardless of enumeration order
        assert_eq!(
            select_address(Some("gone"), &atts).as_deref(),
            Some("10.2.2.2")
        );
        assert_eq!(select_address(None, &atts).as_deref(), Some("10.2.2.2"));
    }

    #[test]
    fn preferred_network_with_empty_address_is_skipped() {
        let atts = vec![
            attachment("testbed", ""),
            attachment("bridge", "172.17.0.2"),
        ];
        assert_eq!(
            select_address(Some("testbed"), &atts).as_deref(),
            Some("172.17.0.2")
        );
    }
}
