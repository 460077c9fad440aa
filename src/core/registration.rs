use crate::domain::model::{RegistrationOutcome, TrackerDetails};
use crate::domain::ports::ApiGateway;
use crate::utils::error::{ProvisionError, Result};
use std::time::Duration;

pub const TRACKERS_PATH: &str = "trackers";
pub const DEFAULT_REGISTRATION_TIMEOUT: Duration = Duration::from_secs(2);

/// 後端狀態碼對應的註冊結果
///
/// | status | outcome          | 後續               |
/// |--------|------------------|--------------------|
/// | 200/201| Created          | 繼續等待簡訊佈建   |
/// | 409    | DuplicateOwn     | 警告後繼續         |
/// | 403    | DuplicateForeign | 失敗               |
/// | 其他   | Rejected(status) | 失敗               |
pub fn classify_status(status: u16) -> RegistrationOutcome {
    match status {
        200 | 201 => RegistrationOutcome::Created,
        409 => RegistrationOutcome::DuplicateOwn,
        403 => RegistrationOutcome::DuplicateForeign,
        other => RegistrationOutcome::Rejected(other),
    }
}

pub fn verdict(outcome: RegistrationOutcome) -> Result<RegistrationOutcome> {
    match outcome {
        RegistrationOutcome::Created | RegistrationOutcome::DuplicateOwn => Ok(outcome),
        RegistrationOutcome::DuplicateForeign => Err(ProvisionError::RegistrationForbidden),
        RegistrationOutcome::Rejected(status) => {
            Err(ProvisionError::RegistrationRejected { status })
        }
    }
}

/// 送出 POST trackers。只有逾時與傳輸錯誤以 `Err` 回傳
pub async fn register(
    api: &dyn ApiGateway,
    details: &TrackerDetails,
    limit: Duration,
) -> Result<RegistrationOutcome> {
    let body = serde_json::to_value(details)?;

    match tokio::time::timeout(limit, api.post(TRACKERS_PATH, &body)).await {
        Err(_) => Err(ProvisionError::RegistrationTimeout { timeout: limit }),
        // 閘道自己的請求逾時也算逾時，可重試
        Ok(Err(ProvisionError::ApiError(e))) if e.is_timeout() => {
            tracing::warn!("⏱️ Registration request timed out in the API client: {}", e);
            Err(ProvisionError::RegistrationTimeout { timeout: limit })
        }
        Ok(Err(e)) => Err(ProvisionError::RegistrationTransportError {
            message: e.to_string(),
        }),
        Ok(Ok(response)) => {
            tracing::debug!("Registration responded with status {}", response.status_code);
            Ok(classify_status(response.status_code))
        }
    }
}
