use crate::domain::model::ApiResponse;
use crate::domain::ports::ApiGateway;
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use url::Url;

pub const API_KEY_HEADER: &str = "X-API-Key";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

const UNKNOWN_USER: &str = "Unknown";

/// 追蹤器後端 REST API 用戶端
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Result<Self> {
        // 結尾沒有斜線時 Url::join 會取代最後一段路徑
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).map_err(|e| ProvisionError::InvalidConfigValueError {
                field: "api.base_url".to_string(),
                value: base_url.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client: Client::new(),
            base_url,
            api_key: api_key.into(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ProvisionError::ConfigError {
                message: format!("Invalid API path '{}': {}", path, e),
            })
    }

    /// 傳輸錯誤與 5xx 以指數退避重試
    async fn execute<F>(&self, build: F) -> Result<ApiResponse>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let result = build()
                .header(API_KEY_HEADER, &self.api_key)
                .timeout(self.timeout)
                .send()
                .await;

            let retriable = match &result {
                Ok(response) => response.status().is_server_error(),
                Err(_) => true,
            };

            if retriable && attempt < self.retry_attempts {
                let delay = self.retry_delay * 2u32.pow(attempt);
                match &result {
                    Ok(response) => tracing::warn!(
                        "🔄 API responded {}, retrying in {:?} ({}/{})",
                        response.status(),
                        delay,
                        attempt + 1,
                        self.retry_attempts
                    ),
                    Err(e) => tracing::warn!(
                        "🔄 API request failed: {}, retrying in {:?} ({}/{})",
                        e,
                        delay,
                        attempt + 1,
                        self.retry_attempts
                    ),
                }
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let response = result?;
            let status_code = response.status().as_u16();
            let text = response.text().await?;
            tracing::debug!("API response status: {}", status_code);
            return Ok(ApiResponse::new(status_code, parse_body(&text)));
        }
    }

    /// 查詢目前 API key 所屬的使用者名稱
    pub async fn whoami(&self) -> Result<String> {
        let response = self.get("whoami").await?;
        if !response.is_success() {
            tracing::warn!("⚠️ whoami responded with status {}", response.status_code);
            return Ok(UNKNOWN_USER.to_string());
        }

        let name = response
            .body
            .as_ref()
            .and_then(|body| body.get("name"))
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(UNKNOWN_USER);
        Ok(name.to_string())
    }
}

/// 空白或 `null` 視為沒有內容；不是 JSON 的內容保留為字串
fn parse_body(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Null) => None,
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(trimmed.to_string())),
    }
}

#[async_trait]
impl ApiGateway for ApiClient {
    async fn get(&self, path: &str) -> Result<ApiResponse> {
        let url = self.endpoint(path)?;
        tracing::debug!("Making API request to: GET {}", url);
        self.execute(|| self.client.get(url.clone())).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        let url = self.endpoint(path)?;
        tracing::debug!("Making API request to: POST {}", url);
        self.execute(|| self.client.post(url.clone()).json(body)).await
    }
}
