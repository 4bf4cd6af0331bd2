use crate::{HealthProbe, ProviderError};
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;

#[derive(Clone)]
pub struct AiTaggerConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// Health probe for the external AI tagging server. The server exposes its
/// OpenAPI docs page, which answers as soon as the service is up.
#[derive(Clone)]
pub struct AiTaggerClient {
    client: Client,
    cfg: AiTaggerConfig,
}

impl AiTaggerClient {
    pub fn new(cfg: AiTaggerConfig) -> Self {
        Self {
            client: Client::new(),
            cfg,
        }
    }

    fn docs_url(&self) -> String {
        format!("{}/docs", self.cfg.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl HealthProbe for AiTaggerClient {
    async fn check(&self) -> Result<(), ProviderError> {
        let resp = self
            .client
            .get(self.docs_url())
            .timeout(self.cfg.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.bytes().await.unwrap_or(Bytes::from_static(b""));
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Ok(())
    }
}
