//! Controller management API client.
//!
//! Two operations against the controller's REST API, both with HTTP Basic
//! auth:
//!
//! - **activate**: `POST {base}/applications/{app}/active`, returning the
//!   observed status code. The activator performs no retries and no
//!   interpretation; mapping a non-200 to a workflow abort is the
//!   orchestrator's call.
//! - **readiness probe**: `GET {base}/applications`, ready iff 200. Used by
//!   the orchestrator's bounded poll; transport errors mean "not ready yet".

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::config::ControllerConfig;
use crate::error::ProvisionError;

/// Controller management operations consumed by the orchestrator.
#[async_trait]
pub trait ControllerApi: Send + Sync {
    /// Activate a named application; returns the HTTP status code observed.
    /// Fails only when the HTTP exchange itself could not complete.
    async fn activate(&self, app: &str) -> Result<u16, ProvisionError>;

    /// Whether the management API currently answers its application listing
    /// with 200.
    async fn probe_ready(&self) -> bool;
}

/// [`ControllerApi`] over plain HTTP with Basic auth.
pub struct HttpController {
    agent: ureq::Agent,
    base_url: String,
    authorization: String,
}

impl HttpController {
    pub fn new(cfg: &ControllerConfig) -> Self {
        let config = ureq::Agent::config_builder()
            // We want the numeric code even for 4xx/5xx answers.
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(10)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            base_url: cfg.api_url.trim_end_matches('/').to_string(),
            authorization: basic_auth(&cfg.username, &cfg.password),
        }
    }
}

#[async_trait]
impl ControllerApi for HttpController {
    async fn activate(&self, app: &str) -> Result<u16, ProvisionError> {
        let agent = self.agent.clone();
        let url = activation_url(&self.base_url, app);
        let authorization = self.authorization.clone();
        let app_name = app.to_string();

        // ureq is blocking; keep it off the async executor.
        let status = tokio::task::spawn_blocking(move || {
            agent
                .post(&url)
                .header("Authorization", &authorization)
                .send_empty()
                .map(|resp| resp.status().as_u16())
                .map_err(|e| ProvisionError::RequestFailed {
                    app: app_name,
                    reason: e.to_string(),
                })
        })
        .await
        .map_err(|e| ProvisionError::RequestFailed {
            app: app.to_string(),
            reason: format!("activation task panicked: {e}"),
        })??;

        tracing::debug!(app = %app, status, "activation call answered");
        Ok(status)
    }

    async fn probe_ready(&self) -> bool {
        let agent = self.agent.clone();
        let url = format!("{}/applications", self.base_url);
        let authorization = self.authorization.clone();

        let result = tokio::task::spawn_blocking(move || {
            agent
                .get(&url)
                .header("Authorization", &authorization)
                .call()
                .map(|resp| resp.status().as_u16())
        })
        .await;

        matches!(result, Ok(Ok(200)))
    }
}

fn activation_url(base_url: &str, app: &str) -> String {
    format!("{base_url}/applications/{app}/active")
}

fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{username}:{password}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activation_url_matches_the_onos_rest_shape() {
        assert_eq!(
            activation_url("http://127.0.0.1:8181/onos/v1", "org.onosproject.fwd"),
            "http://127.0.0.1:8181/onos/v1/applications/org.onosproject.fwd/active"
        );
    }

    #[test]
    fn basic_auth_encodes_credential_pair() {
        // echo -n onos:rocks | base64
        assert_eq!(basic_auth("onos", "rocks"), "Basic b25vczpyb2Nrcw==");
    }

    #[test]
    fn trailing_slash_in_api_url_is_tolerated() {
        let cfg = ControllerConfig {
            api_url: "http://127.0.0.1:8181/onos/v1/".into(),
            ..ControllerConfig::default()
        };
        let client = HttpController::new(&cfg);
        assert_eq!(client.base_url, "http://127.0.0.1:8181/onos/v1");
    }
}
