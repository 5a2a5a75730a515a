//! JSON-over-HTTP provider.
//!
//! Observations are retried on transient gaps (missing rows, throttling,
//! upstream hiccups). Actions are never retried; each one is followed by a
//! settling delay because the remote side applies changes asynchronously.
use super::{Action, ProviderError, RetryPolicy, StateProvider};
use crate::model::{CrewMember, Facility, FacilityCategory, FacilityObservation};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::thread;
use std::time::Duration;
use ureq::Agent;

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    /// Pause after every action before anything is observed again.
    pub settle_delay: Duration,
    pub retry: RetryPolicy,
}

impl HttpProviderConfig {
    pub fn new(base_url: &str) -> Self {
        HttpProviderConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            timeout: Duration::from_secs(30),
            settle_delay: Duration::from_millis(300),
            retry: RetryPolicy::default(),
        }
    }
}

/// Response body of `POST /actions`.
#[derive(Debug, Deserialize)]
struct ActionResponse {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
}

pub struct HttpProvider {
    agent: Agent,
    config: HttpProviderConfig,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Self {
        let agent_config = Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .http_status_as_error(false)
            .build();
        HttpProvider {
            agent: Agent::new_with_config(agent_config),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ProviderError> {
        let url = self.url(path);
        self.config.retry.run(path, || {
            let mut request = self.agent.get(&url);
            for (key, value) in query {
                request = request.query(*key, *value);
            }
            if let Some(token) = self.config.token.as_deref() {
                request = request.header("Authorization", format!("Bearer {token}"));
            }
            let mut response = request
                .call()
                .map_err(|err| ProviderError::Transport(err.to_string()))?;
            let status = response.status().as_u16();
            classify_status(status, &url)?;
            let text = response
                .body_mut()
                .read_to_string()
                .map_err(|err| ProviderError::Transport(err.to_string()))?;
            if text.trim().is_empty() {
                return Err(ProviderError::Transient(format!("{url}: empty body")));
            }
            serde_json::from_str(&text).map_err(|err| ProviderError::Decode(format!("{url}: {err}")))
        })
    }
}

/// Map an HTTP status onto the provider error taxonomy.
fn classify_status(status: u16, url: &str) -> Result<(), ProviderError> {
    match status {
        200..=299 => Ok(()),
        404 => Err(ProviderError::Transient(format!("{url}: not rendered yet"))),
        410 => Err(ProviderError::NotFound(url.to_string())),
        429 | 500..=599 => Err(ProviderError::Transient(format!("{url}: status {status}"))),
        _ => Err(ProviderError::Transport(format!("{url}: status {status}"))),
    }
}

impl StateProvider for HttpProvider {
    fn list_facilities(
        &mut self,
        location_id: &str,
        category: FacilityCategory,
    ) -> Result<Vec<Facility>, ProviderError> {
        self.get_json(
            &format!("locations/{location_id}/facilities"),
            &[("category", category.as_str())],
        )
    }

    fn observe_facility(
        &mut self,
        facility_id: &str,
    ) -> Result<FacilityObservation, ProviderError> {
        self.get_json(&format!("facilities/{facility_id}"), &[])
    }

    fn observe_crew(&mut self, facility_id: &str) -> Result<Vec<CrewMember>, ProviderError> {
        self.get_json(&format!("facilities/{facility_id}/crew"), &[])
    }

    fn perform(&mut self, action: &Action) -> Result<(), ProviderError> {
        let url = self.url("actions");
        let mut request = self.agent.post(&url);
        if let Some(token) = self.config.token.as_deref() {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let mut response = request
            .send_json(action)
            .map_err(|err| ProviderError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body: Option<ActionResponse> = response.body_mut().read_json().ok();
        let outcome = match (status, body) {
            (200..=299, Some(ActionResponse { ok: true, .. })) => Ok(()),
            (200..=299, None) => Ok(()),
            (_, Some(ActionResponse { reason, .. })) => Err(ProviderError::Rejected {
                action: action.to_string(),
                reason: reason.unwrap_or_else(|| format!("status {status}")),
            }),
            (_, None) => Err(ProviderError::Rejected {
                action: action.to_string(),
                reason: format!("status {status}"),
            }),
        };
        tracing::debug!(action = %action, status, ok = outcome.is_ok(), "action sent");
        if !self.config.settle_delay.is_zero() {
            thread::sleep(self.config.settle_delay);
        }
        outcome
    }
}
