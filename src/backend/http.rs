use super::{DispatchError, SummaryBackend, SummaryKind, SummaryResponse, TriggerRequest};
use crate::config::BackendConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Instant;
use tracing::debug;

/// Calls the hosted summary functions over HTTPS with a static bearer key.
pub struct HttpBackend {
    client: Client,
    base: String,
    api_key: String,
    rfp_function: String,
    prospect_function: String,
    client_need_function: String,
}

impl HttpBackend {
    pub fn new(cfg: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .context("failed to build HTTP client")?;

        let base = format!(
            "{}/{}",
            cfg.base_url.trim_end_matches('/'),
            cfg.functions_path.trim_matches('/')
        );

        Ok(Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            rfp_function: cfg.rfp_function.clone(),
            prospect_function: cfg.prospect_function.clone(),
            client_need_function: cfg.client_need_function.clone(),
        })
    }

    /// Full URL of the function serving `kind`.
    pub fn endpoint_url(&self, kind: SummaryKind) -> String {
        let function = match kind {
            SummaryKind::Rfp => &self.rfp_function,
            SummaryKind::Prospect => &self.prospect_function,
            SummaryKind::ClientNeed => &self.client_need_function,
        };
        format!("{}/{}", self.base, function)
    }
}

#[async_trait::async_trait]
impl SummaryBackend for HttpBackend {
    async fn trigger(
        &self,
        kind: SummaryKind,
        request: TriggerRequest,
    ) -> Result<SummaryResponse, DispatchError> {
        let url = self.endpoint_url(kind);
        let start = Instant::now();

        let mut builder = self.client.post(&url).json(&request);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }
        let resp = builder.send().await?;

        let status = resp.status();
        let body = resp.text().await?;
        debug!(endpoint = %kind, %url, status = status.as_u16(), elapsed_ms = start.elapsed().as_millis() as u64, "summary function responded");

        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        serde_json::from_str(&body).map_err(|e| DispatchError::Decode(e.to_string()))
    }
}

fn truncate(body: &str, max: usize) -> String {
    match body.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_urls_join_cleanly() {
        let cfg = BackendConfig {
            base_url: "https://project.example.co/".to_string(),
            functions_path: "/functions/v1/".to_string(),
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new(&cfg).unwrap();

        assert_eq!(
            backend.endpoint_url(SummaryKind::Rfp),
            "https://project.example.co/functions/v1/send-daily-rfp-summary"
        );
        assert_eq!(
            backend.endpoint_url(SummaryKind::ClientNeed),
            "https://project.example.co/functions/v1/send-daily-client-need-summary"
        );
    }

    #[test]
    fn test_empty_functions_path() {
        let cfg = BackendConfig {
            base_url: "http://localhost:9000".to_string(),
            functions_path: String::new(),
            ..BackendConfig::default()
        };
        let backend = HttpBackend::new(&cfg).unwrap();
        assert_eq!(
            backend.endpoint_url(SummaryKind::Prospect),
            "http://localhost:9000/send-daily-prospect-summary"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
