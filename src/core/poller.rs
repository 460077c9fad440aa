use crate::domain::model::TrackerStatus;
use crate::domain::ports::ApiGateway;
use crate::utils::error::{ProvisionError, Result};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 以固定間隔查詢後端，直到追蹤器回報已連線
pub struct ConnectivityPoller {
    api: Arc<dyn ApiGateway>,
    interval: Duration,
}

impl ConnectivityPoller {
    pub fn new(api: Arc<dyn ApiGateway>) -> Self {
        Self {
            api,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// 不自行設逾時，由呼叫端包上 `tokio::time::timeout`
    pub async fn wait_until_connected(&self, tracker_id: &str) -> Result<()> {
        let path = format!("trackers/{}", tracker_id);
        let mut polls = 0u32;

        loop {
            polls += 1;
            let response = self.api.get(&path).await.map_err(|e| {
                ProvisionError::ConnectivityError {
                    message: e.to_string(),
                }
            })?;

            let body = match response.status_code {
                200 => response.body,
                403 | 404 => None,
                status => {
                    return Err(ProvisionError::ConnectivityError {
                        message: format!("unexpected status {} while polling tracker", status),
                    });
                }
            };

            // 查不到追蹤器代表它屬於其他使用者
            let Some(body) = body else {
                return Err(ProvisionError::ConnectivityConflict);
            };

            let status: TrackerStatus =
                serde_json::from_value(body).map_err(|e| ProvisionError::ConnectivityError {
                    message: format!("malformed tracker status: {}", e),
                })?;

            if let Some(id) = status.id.as_deref().filter(|id| *id != tracker_id) {
                return Err(ProvisionError::ConnectivityError {
                    message: format!("backend returned status for tracker {}", id),
                });
            }

            if status.connected {
                tracing::info!("🛰️ Tracker {} connected after {} polls", tracker_id, polls);
                return Ok(());
            }

            tracing::debug!("Tracker {} not connected yet (poll {})", tracker_id, polls);
            tokio::time::sleep(self.interval).await;
        }
    }
}
