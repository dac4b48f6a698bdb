use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("vendor request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("vendor returned status {status} for {operation}")]
    Status { operation: &'static str, status: u16 },
}

/// Text or a pre-rendered audio URL for the vendor to play into the call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpeakPayload {
    pub text: Option<String>,
    pub audio_url: Option<String>,
}

/// Call-control capabilities of the telephony vendor. Handlers depend on
/// this trait, never on the vendor's REST surface directly.
#[async_trait]
pub trait TelephonyAdapter: Send + Sync {
    async fn start(&self, call_id: &str) -> Result<(), TelephonyError>;
    async fn speak(&self, call_id: &str, payload: SpeakPayload) -> Result<(), TelephonyError>;
    async fn escalate(&self, call_id: &str, hotline_number: &str) -> Result<(), TelephonyError>;
    async fn end(&self, call_id: &str) -> Result<(), TelephonyError>;
}

/// Succeeds silently on every capability. Used whenever no vendor REST
/// endpoint is configured.
#[derive(Default)]
pub struct NoopTelephonyAdapter;

#[async_trait]
impl TelephonyAdapter for NoopTelephonyAdapter {
    async fn start(&self, _call_id: &str) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn speak(&self, _call_id: &str, _payload: SpeakPayload) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn escalate(&self, _call_id: &str, _hotline: &str) -> Result<(), TelephonyError> {
        Ok(())
    }

    async fn end(&self, _call_id: &str) -> Result<(), TelephonyError> {
        Ok(())
    }
}

/// Adapter against the vendor's call-control REST API. With no base URL
/// configured every capability degrades to a logged no-op, so a partially
/// configured deployment never breaks live calls.
pub struct HttpTelephonyAdapter {
    client: Client,
    base_url: Option<String>,
    api_key: Option<SecretString>,
}

impl HttpTelephonyAdapter {
    pub fn new(base_url: Option<String>, api_key: Option<SecretString>) -> Self {
        Self { client: Client::new(), base_url, api_key }
    }

    async fn post(
        &self,
        operation: &'static str,
        call_id: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<(), TelephonyError> {
        let Some(base_url) = &self.base_url else {
            debug!(
                event_name = "telephony.vendor.skipped",
                call_id,
                operation,
                "no vendor base url configured; call-control request skipped"
            );
            return Ok(());
        };

        let url = format!("{}/calls/{call_id}/{path}", base_url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TelephonyError::Status { operation, status: status.as_u16() });
        }

        debug!(event_name = "telephony.vendor.ok", call_id, operation, "vendor call-control ok");
        Ok(())
    }
}

#[async_trait]
impl TelephonyAdapter for HttpTelephonyAdapter {
    async fn start(&self, _call_id: &str) -> Result<(), TelephonyError> {
        // The vendor originates calls and notifies us via webhook; there is
        // no REST call to make here.
        Ok(())
    }

    async fn speak(&self, call_id: &str, payload: SpeakPayload) -> Result<(), TelephonyError> {
        self.post(
            "speak",
            call_id,
            "speak",
            json!({ "text": payload.text, "audioUrl": payload.audio_url }),
        )
        .await
    }

    async fn escalate(&self, call_id: &str, hotline_number: &str) -> Result<(), TelephonyError> {
        self.post("escalate", call_id, "bridge", json!({ "number": hotline_number })).await
    }

    async fn end(&self, call_id: &str) -> Result<(), TelephonyError> {
        self.post("end", call_id, "end", json!({})).await
    }
}
