//! Home-automation controller REST client.
//!
//! One client per call; never shared across calls. All requests carry
//! bearer-token auth and a 10 s ceiling so a wedged controller cannot
//! stall the dialogue forever.

use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HaClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl HaClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// POST to `/services/<domain>/<service>` with a JSON body.
    ///
    /// Non-success statuses surface as [`Error::ControllerStatus`]
    /// with the body text, so the assistant can read the failure back
    /// to the caller.
    pub async fn call_service(
        &self,
        domain: &str,
        service: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/services/{domain}/{service}", self.base_url);
        debug!(%url, %body, "invoking controller service");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            warn!(%url, status = status.as_u16(), "controller rejected service call");
            return Err(Error::ControllerStatus {
                status: status.as_u16(),
                body: text,
            });
        }

        // The controller answers with arbitrary JSON; tolerate empty
        // or non-JSON bodies.
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::Null))
    }

    /// GET `/states/<entity_id>`.
    pub async fn get_state(&self, entity_id: &str) -> Result<serde_json::Value> {
        let url = format!("{}/states/{entity_id}", self.base_url);
        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(Error::ControllerStatus {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text).unwrap_or(serde_json::Value::Null))
    }
}
