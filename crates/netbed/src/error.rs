//! Error taxonomy for the provisioning workflow.
//!
//! Every error is fatal: the orchestrator fails fast at the first one and
//! returns it to the binary boundary, which logs a single diagnostic and
//! exits non-zero. Each variant carries the context needed to tell which
//! step failed (image, container name, application name, or file path).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The container daemon could not be reached at all.
    #[error("container runtime unavailable: {reason}")]
    RuntimeUnavailable { reason: String },

    /// The daemon was reachable but the registry pull failed.
    #[error("pulling image {image} failed: {reason}")]
    ImagePullFailed { image: String, reason: String },

    #[error("creating container {name} failed: {reason}")]
    ContainerCreateFailed { name: String, reason: String },

    #[error("starting container {name} failed: {reason}")]
    ContainerStartFailed { name: String, reason: String },

    #[error("inspecting container {name} failed: {reason}")]
    ContainerInspectFailed { name: String, reason: String },

    /// Inspect succeeded but no attachment carried a usable address.
    #[error("container {name} has no usable network address")]
    NoNetworkAddress { name: String },

    /// Rollback-only: a started container could not be stopped/removed.
    #[error("removing container {name} failed: {reason}")]
    ContainerRemoveFailed { name: String, reason: String },

    #[error("creating exec in container {name} failed: {reason}")]
    ExecCreateFailed { name: String, reason: String },

    #[error("attaching to exec in container {name} failed: {reason}")]
    ExecAttachFailed { name: String, reason: String },

    /// The HTTP exchange for an activation call could not complete.
    #[error("activation request for {app} failed: {reason}")]
    RequestFailed { app: String, reason: String },

    /// The controller answered the activation call with a non-200 status.
    #[error("activating {app} rejected with HTTP {status}")]
    ActivationRejected { app: String, status: u16 },

    /// The readiness probe never returned 200 within the configured budget.
    #[error("controller management API not ready after {waited:.1?}")]
    ControllerNotReady { waited: Duration },

    #[error("reading topology template {} failed: {source}", path.display())]
    TemplateReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("writing rendered topology script {} failed: {source}", path.display())]
    TemplateWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_their_context() {
        let e = ProvisionError::ImagePullFailed {
            image: "registry.hub.docker.com/onosproject/onos".into(),
            reason: "manifest unknown".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("onosproject/onos"));
        assert!(msg.contains("manifest unknown"));

        let e = ProvisionError::ActivationRejected {
            app: "org.onosproject.fwd".into(),
            status: 401,
        };
        let msg = e.to_string();
        assert!(msg.contains("org.onosproject.fwd"));
        assert!(msg.contains("401"));

        let e = ProvisionError::NoNetworkAddress {
            name: "onos".into(),
        };
        assert!(e.to_string().contains("onos"));
    }

    #[test]
    fn template_errors_name_the_path() {
        let e = ProvisionError::TemplateReadFailed {
            path: PathBuf::from("/tmp/topo_template.sh"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(e.to_string().contains("/tmp/topo_template.sh"));
    }
}
