use crate::domain::model::ApiResponse;
use crate::utils::error::Result;
use async_trait::async_trait;

/// 已驗證身分的後端呼叫能力。`Err` 代表完全沒有取得 HTTP 回應
#[async_trait]
pub trait ApiGateway: Send + Sync {
    async fn get(&self, path: &str) -> Result<ApiResponse>;
    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<ApiResponse>;
}

/// 發送單則簡訊，不負責重試
#[async_trait]
pub trait SmsTransport: Send + Sync {
    async fn send(&self, phone_number: &str, text: &str) -> Result<()>;

    /// 尚未取得發送權限時回傳 `PermissionDenied`
    fn check_permission(&self) -> Result<()> {
        Ok(())
    }
}
