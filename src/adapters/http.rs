use crate::config::toml_config::TrackerConfig;
use crate::domain::ports::{HttpMethod, HttpReply, HttpRequest, Transport};
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// 以 reqwest 實作的追蹤系統傳輸層；每次執行各自建立
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
    email: String,
    api_token: String,
}

impl ReqwestTransport {
    pub fn new(config: &TrackerConfig) -> Result<Self> {
        Url::parse(&config.base_url).map_err(|e| SyncError::InvalidConfigValueError {
            field: "tracker.base_url".to_string(),
            value: config.base_url.clone(),
            reason: format!("Invalid URL format: {}", e),
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            email: config.email.clone(),
            api_token: config.api_token.clone(),
        })
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpReply> {
        let url = self.url_for(&request.path);

        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&url),
            HttpMethod::Post => self.client.post(&url),
        }
        .basic_auth(&self.email, Some(&self.api_token))
        .header("Accept", "application/json");

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;

        tracing::debug!("📡 {} {} -> {}", request.method.as_str(), request.path, status);
        Ok(HttpReply { status, body })
    }
}

fn classify(error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::Timeout {
            message: error.to_string(),
        }
    } else {
        SyncError::ApiError(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> TrackerConfig {
        TrackerConfig {
            base_url: base_url.to_string(),
            email: "pm@acme.io".to_string(),
            api_token: "token".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_url_join() {
        let transport = ReqwestTransport::new(&config("https://acme.atlassian.net/")).unwrap();
        assert_eq!(
            transport.url_for("/rest/api/3/issue"),
            "https://acme.atlassian.net/rest/api/3/issue"
        );
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(matches!(
            ReqwestTransport::new(&config("not a url")),
            Err(SyncError::InvalidConfigValueError { .. })
        ));
    }
}
