//! Netbed — two-node network-emulation testbed provisioning.
//!
//! Brings up a containerized SDN controller (ONOS) and a containerized
//! network emulator (Mininet), activates the controller applications over
//! its management REST API, discovers the controller's container address,
//! renders a topology script from a template with that address, and runs
//! the script inside the emulator.
//!
//! - [`runtime`]: thin capability over the Docker Engine API
//! - [`controller`]: management-API activation + readiness probe
//! - [`topology`]: placeholder-token template rendering
//! - [`provision`]: the workflow state machine tying the above together
//! - [`config`]: explicit configuration with documented defaults
//! - [`error`]: the fatal-only error taxonomy
//!
//! The library never terminates the process; every failure propagates as a
//! [`error::ProvisionError`] to the binary, which decides exit behavior.

pub mod config;
pub mod controller;
pub mod error;
pub mod provision;
pub mod runtime;
pub mod topology;

pub use config::TestbedConfig;
pub use error::ProvisionError;
pub use provision::{ProvisionOutcome, ProvisionState, Provisioner};
