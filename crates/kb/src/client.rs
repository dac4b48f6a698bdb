use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use saathi_core::Language;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Header the KB service inspects to suppress results server-side when the
/// session is in crisis. Defense-in-depth: the orchestrator's policy already
/// refuses to contact the KB for crisis sessions.
pub const CRISIS_HEADER: &str = "X-CRISIS";

#[derive(Debug, Error)]
pub enum KbClientError {
    #[error("kb request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("kb returned status {0}")]
    Status(u16),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KbSearchRequest {
    pub query: String,
    pub lang: Language,
    /// Desired passage count; the KB contract caps this at 4.
    pub k: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KbSource {
    #[serde(default)]
    pub work: String,
    #[serde(default)]
    pub book: String,
    #[serde(default)]
    pub chapter: String,
    #[serde(default)]
    pub verse_range: String,
    #[serde(default)]
    pub edition: String,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KbPassage {
    pub passage: String,
    #[serde(default)]
    pub source: KbSource,
    #[serde(default)]
    pub language: Option<Language>,
    #[serde(default)]
    pub sensitive_tags: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct KbSearchResponse {
    #[serde(default)]
    pub passages: Vec<KbPassage>,
}

/// Retrieval collaborator. Callers treat ANY error as zero passages; a KB
/// outage must never be observable from inside a call.
#[async_trait]
pub trait KbClient: Send + Sync {
    async fn search(
        &self,
        request: &KbSearchRequest,
        crisis: bool,
    ) -> Result<KbSearchResponse, KbClientError>;
}

/// Always answers with an empty passage list.
#[derive(Default)]
pub struct NoopKbClient;

#[async_trait]
impl KbClient for NoopKbClient {
    async fn search(
        &self,
        _request: &KbSearchRequest,
        _crisis: bool,
    ) -> Result<KbSearchResponse, KbClientError> {
        Ok(KbSearchResponse::default())
    }
}

/// HTTP client for the KB search service. Every request carries a bounded
/// timeout; a slow KB is treated exactly like an unreachable one.
pub struct HttpKbClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpKbClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self { client: Client::new(), url: url.into(), timeout }
    }
}

#[async_trait]
impl KbClient for HttpKbClient {
    async fn search(
        &self,
        request: &KbSearchRequest,
        crisis: bool,
    ) -> Result<KbSearchResponse, KbClientError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header(CRISIS_HEADER, if crisis { "1" } else { "0" })
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(KbClientError::Status(status.as_u16()));
        }

        let parsed = response.json::<KbSearchResponse>().await?;
        debug!(
            event_name = "kb.search.ok",
            query = %request.query,
            lang = %request.lang,
            passages = parsed.passages.len(),
            "kb search returned"
        );
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use saathi_core::Language;

    use super::{KbClient, KbSearchRequest, KbSearchResponse, NoopKbClient};

    #[test]
    fn response_decodes_the_kb_wire_shape() {
        let raw = r#"{
            "passages": [
                {
                    "passage": "Sometimes we feel torn between duty and compassion.",
                    "source": {"work": "general", "book": "", "chapter": "", "verse_range": "", "edition": ""},
                    "language": "en",
                    "sensitive_tags": []
                }
            ]
        }"#;

        let decoded: KbSearchResponse = serde_json::from_str(raw).expect("decode");
        assert_eq!(decoded.passages.len(), 1);
        assert_eq!(decoded.passages[0].language, Some(Language::En));
        assert_eq!(decoded.passages[0].source.work, "general");
    }

    #[test]
    fn missing_passages_field_decodes_to_empty() {
        let decoded: KbSearchResponse = serde_json::from_str("{}").expect("decode");
        assert!(decoded.passages.is_empty());
    }

    #[test]
    fn request_serializes_with_contract_field_names() {
        let request = KbSearchRequest {
            query: "duty vs compassion".to_owned(),
            lang: Language::Auto,
            k: 4,
        };

        let encoded = serde_json::to_value(&request).expect("encode");
        assert_eq!(encoded["query"], "duty vs compassion");
        assert_eq!(encoded["lang"], "auto");
        assert_eq!(encoded["k"], 4);
    }

    #[tokio::test]
    async fn noop_client_returns_zero_passages() {
        let client = NoopKbClient;
        let request =
            KbSearchRequest { query: "anything".to_owned(), lang: Language::En, k: 2 };

        let response = client.search(&request, false).await.expect("noop search");
        assert!(response.passages.is_empty());
    }
}
