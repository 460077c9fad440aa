use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 待佈建的追蹤器資料，建立後不可變
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerDetails {
    id: String,
    name: String,
    phone_number: String,
    model: String,
    enabled: bool,
}

impl TrackerDetails {
    pub fn new(id: &str, name: &str, phone_number: &str, model: &str) -> Result<Self> {
        let id = id.trim();
        let name = name.trim();
        let phone_number = validation::normalize_phone_number(phone_number);

        validation::validate_model_name(model)?;
        validation::validate_phone_number(&phone_number)?;
        validation::validate_tracker_id(id)?;
        validation::validate_tracker_name(name)?;

        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            phone_number,
            model: model.to_string(),
            enabled: true,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// 某個型號的初始化指令與對應的成功關鍵字，依索引一一對應
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSet {
    init_commands: Vec<String>,
    success_keywords: Vec<String>,
}

impl CommandSet {
    pub fn new(init_commands: Vec<String>, success_keywords: Vec<String>) -> Result<Self> {
        if init_commands.is_empty() || success_keywords.is_empty() {
            return Err(ProvisionError::InvalidCommandSet {
                reason: "command and keyword lists must not be empty".to_string(),
            });
        }
        if init_commands.len() != success_keywords.len() {
            return Err(ProvisionError::InvalidCommandSet {
                reason: format!(
                    "{} commands but {} success keywords",
                    init_commands.len(),
                    success_keywords.len()
                ),
            });
        }
        if success_keywords.iter().any(|k| k.is_empty()) {
            return Err(ProvisionError::InvalidCommandSet {
                reason: "success keywords must not be empty".to_string(),
            });
        }
        if init_commands.iter().any(|c| c.is_empty()) {
            return Err(ProvisionError::InvalidCommandSet {
                reason: "commands must not be empty".to_string(),
            });
        }

        Ok(Self {
            init_commands,
            success_keywords,
        })
    }

    /// 解析後端以 ';' 分隔的格式，例如 "APN,internet#;SERVER,1,host,5013#"
    pub fn from_delimited(init_commands: &str, success_keywords: &str) -> Result<Self> {
        Self::new(
            split_delimited(init_commands),
            split_delimited(success_keywords),
        )
    }

    pub fn init_commands(&self) -> &[String] {
        &self.init_commands
    }

    pub fn success_keywords(&self) -> &[String] {
        &self.success_keywords
    }

    pub fn len(&self) -> usize {
        self.init_commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.init_commands.is_empty()
    }
}

fn split_delimited(raw: &str) -> Vec<String> {
    let mut parts: Vec<String> = raw.split(';').map(str::to_string).collect();
    // 結尾的空段落忽略，中間的空段落交由 CommandSet::new 拒絕
    while parts.last().is_some_and(|p| p.is_empty()) {
        parts.pop();
    }
    parts
}

/// 後端 /models 回傳的單筆型號資料
#[derive(Debug, Clone, Deserialize)]
pub struct ModelRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Init_commands")]
    pub init_commands: String,
    #[serde(rename = "Success_keywords")]
    pub success_keywords: String,
}

/// 收到的簡訊
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSms {
    pub originating_address: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

impl InboundSms {
    pub fn new(originating_address: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            originating_address: originating_address.into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    /// 解析 "<address> <body>" 格式的一行文字
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let (address, body) = line.split_once(char::is_whitespace)?;
        let body = body.trim();
        if address.is_empty() || body.is_empty() {
            return None;
        }
        Some(Self::new(address, body))
    }

    /// 以後綴比對號碼，容許國碼與分隔符號的差異
    pub fn is_from(&self, phone_number: &str) -> bool {
        let target = digits(phone_number);
        !target.is_empty() && digits(&self.originating_address).ends_with(&target)
    }
}

fn digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// 通用 API 回應
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status_code: u16,
    pub body: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn new(status_code: u16, body: Option<serde_json::Value>) -> Self {
        Self { status_code, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// 後端 /trackers/{id} 回應中輪詢需要的欄位
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerStatus {
    #[serde(rename = "Id")]
    pub id: Option<String>,
    #[serde(rename = "Connected")]
    pub connected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Created,
    DuplicateOwn,
    DuplicateForeign,
    Rejected(u16),
}

impl RegistrationOutcome {
    pub fn describe(&self) -> String {
        match self {
            RegistrationOutcome::Created => {
                "Tracker has been successfully registered on the API".to_string()
            }
            RegistrationOutcome::DuplicateOwn => {
                "You already have a tracker registered with the same id or name".to_string()
            }
            RegistrationOutcome::DuplicateForeign => {
                "Tracker with the same id or name is already registered with another user"
                    .to_string()
            }
            RegistrationOutcome::Rejected(status) => {
                format!("Registration rejected with status {}", status)
            }
        }
    }
}

/// 佈建成功時的摘要
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub tracker_id: String,
    pub registration: RegistrationOutcome,
    pub commands_sent: usize,
    pub acknowledged: usize,
    pub connectivity_confirmed: bool,
    pub elapsed: Duration,
}
