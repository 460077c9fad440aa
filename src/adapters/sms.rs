use crate::core::inbox::InboundHub;
use crate::domain::model::InboundSms;
use crate::domain::ports::SmsTransport;
use crate::utils::error::{ProvisionError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use url::Url;

#[derive(Debug, Serialize)]
struct OutboundSms<'a> {
    to: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a str>,
}

/// 透過 HTTP 簡訊閘道發送
#[derive(Debug, Clone)]
pub struct HttpSmsGateway {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    sender: Option<String>,
    timeout: Duration,
}

impl HttpSmsGateway {
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| ProvisionError::InvalidConfigValueError {
            field: "sms.gateway_url".to_string(),
            value: endpoint.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client: Client::new(),
            endpoint,
            token: token.filter(|t| !t.trim().is_empty()),
            sender: None,
            timeout: Duration::from_secs(10),
        })
    }

    pub fn with_sender(mut self, sender: Option<String>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl SmsTransport for HttpSmsGateway {
    async fn send(&self, phone_number: &str, text: &str) -> Result<()> {
        let token = self.token.as_deref().ok_or_else(|| ProvisionError::PermissionDenied {
            message: "no SMS gateway token configured".to_string(),
        })?;

        let payload = OutboundSms {
            to: phone_number,
            text,
            from: self.sender.as_deref(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(token)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ProvisionError::SmsTransportError {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::SmsTransportError {
                message: format!("gateway responded with status {}", status.as_u16()),
            });
        }

        tracing::debug!("📤 SMS accepted by gateway for {}", phone_number);
        Ok(())
    }

    fn check_permission(&self) -> Result<()> {
        match self.token {
            Some(_) => Ok(()),
            None => Err(ProvisionError::PermissionDenied {
                message: "no SMS gateway token configured".to_string(),
            }),
        }
    }
}

/// 逐行讀取 `<address> <body>` 格式的收訊並發佈到 hub，回傳發佈的則數
pub async fn pump_lines<R>(reader: R, hub: &InboundHub) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut published = 0usize;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match InboundSms::parse_line(&line) {
            Some(sms) => {
                tracing::debug!("📥 Inbound SMS from {}", sms.originating_address);
                hub.publish(sms);
                published += 1;
            }
            None => tracing::warn!("⚠️ Ignoring malformed inbound line: {}", line),
        }
    }

    Ok(published)
}
