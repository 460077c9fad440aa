#[cfg(feature = "cli")]
pub mod cli;

use crate::adapters::{ApiClient, HttpSmsGateway};
use crate::core::catalog::CommandCatalog;
use crate::core::orchestrator::{AbandonPolicy, ProvisionSettings};
use crate::domain::model::CommandSet;
use crate::utils::error::{ProvisionError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static regex"));

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    pub api: ApiConfig,
    pub sms: SmsConfig,
    pub timeouts: Option<TimeoutsConfig>,
    pub policy: Option<PolicyConfig>,
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub models: Vec<LocalModel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub request_timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub token: Option<String>,
    pub sender: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    pub registration_seconds: Option<u64>,
    pub sms_seconds: Option<u64>,
    pub connectivity_seconds: Option<u64>,
    pub poll_interval_seconds: Option<u64>,
    pub send_pacing_seconds: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub wait_for_ack: Option<bool>,
    pub abandon: Option<AbandonPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub format: Option<String>, // "compact" or "json"
    pub verbose: Option<bool>,
}

/// 本地覆寫的型號指令
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalModel {
    pub name: String,
    pub init_commands: Vec<String>,
    pub success_keywords: Vec<String>,
}

impl ProvisionerConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(ProvisionError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| ProvisionError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 未設定的環境變數維持 `${VAR}` 原樣，視同沒有 token
    pub fn sms_token(&self) -> Option<String> {
        self.sms
            .token
            .as_deref()
            .filter(|token| !token.trim().is_empty() && !ENV_VAR_RE.is_match(token))
            .map(str::to_string)
    }

    pub fn json_logging(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.format.as_deref())
            .map(|format| format.eq_ignore_ascii_case("json"))
            .unwrap_or(false)
    }

    pub fn verbose_logging(&self) -> bool {
        self.logging
            .as_ref()
            .and_then(|l| l.verbose)
            .unwrap_or(false)
    }

    /// 轉成協調者使用的設定，沒填的欄位用預設值
    pub fn to_settings(&self) -> ProvisionSettings {
        let defaults = ProvisionSettings::default();
        let timeouts = self.timeouts.clone().unwrap_or_default();
        let policy = self.policy.clone().unwrap_or_default();
        let seconds = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_secs).unwrap_or(fallback)
        };

        ProvisionSettings {
            registration_timeout: seconds(
                timeouts.registration_seconds,
                defaults.registration_timeout,
            ),
            sms_timeout: seconds(timeouts.sms_seconds, defaults.sms_timeout),
            connectivity_timeout: seconds(
                timeouts.connectivity_seconds,
                defaults.connectivity_timeout,
            ),
            poll_interval: seconds(timeouts.poll_interval_seconds, defaults.poll_interval),
            send_pacing: seconds(timeouts.send_pacing_seconds, defaults.send_pacing),
            wait_for_ack: policy.wait_for_ack.unwrap_or(defaults.wait_for_ack),
            abandon_policy: policy.abandon.unwrap_or(defaults.abandon_policy),
        }
    }

    pub fn local_catalog(&self) -> Result<CommandCatalog> {
        let mut catalog = CommandCatalog::new();
        for model in &self.models {
            let commands =
                CommandSet::new(model.init_commands.clone(), model.success_keywords.clone())
                    .map_err(|e| ProvisionError::InvalidConfigValueError {
                        field: format!("models.{}", model.name),
                        value: model.init_commands.join(";"),
                        reason: e.to_string(),
                    })?;
            catalog.insert(model.name.clone(), commands);
        }
        Ok(catalog)
    }

    pub fn api_client(&self) -> Result<ApiClient> {
        let mut client = ApiClient::new(&self.api.base_url, self.api.api_key.clone())?;
        if let Some(timeout) = self.api.request_timeout_seconds {
            client = client.with_timeout(Duration::from_secs(timeout));
        }
        if self.api.retry_attempts.is_some() || self.api.retry_delay_seconds.is_some() {
            client = client.with_retry(
                self.api
                    .retry_attempts
                    .unwrap_or(crate::adapters::http::DEFAULT_RETRY_ATTEMPTS),
                self.api
                    .retry_delay_seconds
                    .map(Duration::from_secs)
                    .unwrap_or(crate::adapters::http::DEFAULT_RETRY_DELAY),
            );
        }
        Ok(client)
    }

    pub fn sms_gateway(&self) -> Result<HttpSmsGateway> {
        Ok(HttpSmsGateway::new(&self.sms.gateway_url, self.sms_token())?
            .with_sender(self.sms.sender.clone()))
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_url("api.base_url", &self.api.base_url)?;
        validation::validate_non_empty_string("api.api_key", &self.api.api_key)?;
        if ENV_VAR_RE.is_match(&self.api.api_key) {
            return Err(ProvisionError::MissingConfigError {
                field: "api.api_key".to_string(),
            });
        }
        if let Some(timeout) = self.api.request_timeout_seconds {
            validation::validate_positive_number("api.request_timeout_seconds", timeout, 1)?;
        }

        validation::validate_url("sms.gateway_url", &self.sms.gateway_url)?;

        if let Some(timeouts) = &self.timeouts {
            let fields = [
                ("timeouts.registration_seconds", timeouts.registration_seconds),
                ("timeouts.sms_seconds", timeouts.sms_seconds),
                ("timeouts.connectivity_seconds", timeouts.connectivity_seconds),
                ("timeouts.poll_interval_seconds", timeouts.poll_interval_seconds),
            ];
            for (field, value) in fields {
                if let Some(value) = value {
                    validation::validate_positive_number(field, value, 1)?;
                }
            }
        }

        if let Some(format) = self.logging.as_ref().and_then(|l| l.format.as_deref()) {
            let valid_formats = ["compact", "json"];
            if !valid_formats.contains(&format.to_ascii_lowercase().as_str()) {
                return Err(ProvisionError::InvalidConfigValueError {
                    field: "logging.format".to_string(),
                    value: format.to_string(),
                    reason: format!(
                        "Unsupported format. Valid formats: {}",
                        valid_formats.join(", ")
                    ),
                });
            }
        }

        self.local_catalog()?;
        Ok(())
    }
}

impl Validate for ProvisionerConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

/// 替換環境變數 (例如 ${TRACKER_API_KEY})
fn substitute_env_vars(content: &str) -> String {
    ENV_VAR_RE
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MINIMAL: &str = r#"
[api]
base_url = "https://api.example.com/v1"
api_key = "secret"

[sms]
gateway_url = "https://sms.example.com/send"
token = "sms-token"
"#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = ProvisionerConfig::from_toml_str(MINIMAL).unwrap();
        assert!(config.validate().is_ok());

        let settings = config.to_settings();
        assert_eq!(settings.registration_timeout, Duration::from_secs(2));
        assert_eq!(settings.sms_timeout, Duration::from_secs(360));
        assert_eq!(settings.connectivity_timeout, Duration::from_secs(60));
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.send_pacing, Duration::from_secs(2));
        assert!(settings.wait_for_ack);
        assert_eq!(settings.abandon_policy, AbandonPolicy::LetRun);
        assert!(!config.json_logging());
    }

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[api]
base_url = "https://api.example.com"
api_key = "secret"
retry_attempts = 0

[sms]
gateway_url = "https://sms.example.com/send"
token = "sms-token"
sender = "Fleet"

[timeouts]
sms_seconds = 120
send_pacing_seconds = 3

[policy]
wait_for_ack = false
abandon = "cancel"

[logging]
format = "json"

[[models]]
name = "D21L"
init_commands = ["APN,internet#", "SERVER,1,host,5013#"]
success_keywords = ["APN OK", "SERVER OK"]
"#;

        let config = ProvisionerConfig::from_toml_str(toml_content).unwrap();
        assert!(config.validate().is_ok());

        let settings = config.to_settings();
        assert_eq!(settings.sms_timeout, Duration::from_secs(120));
        assert_eq!(settings.send_pacing, Duration::from_secs(3));
        assert!(!settings.wait_for_ack);
        assert_eq!(settings.abandon_policy, AbandonPolicy::Cancel);
        assert!(config.json_logging());

        let catalog = config.local_catalog().unwrap();
        assert_eq!(catalog.lookup("D21L").unwrap().len(), 2);
    }

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("TRACKER_PROVISIONER_TEST_KEY", "from-env");

        let toml_content = MINIMAL.replace("\"secret\"", "\"${TRACKER_PROVISIONER_TEST_KEY}\"");
        let config = ProvisionerConfig::from_toml_str(&toml_content).unwrap();
        assert_eq!(config.api.api_key, "from-env");

        std::env::remove_var("TRACKER_PROVISIONER_TEST_KEY");
    }

    #[test]
    fn test_unresolved_variables() {
        let toml_content = MINIMAL
            .replace("\"secret\"", "\"${TRACKER_PROVISIONER_UNSET_KEY}\"")
            .replace("\"sms-token\"", "\"${TRACKER_PROVISIONER_UNSET_TOKEN}\"");
        let config = ProvisionerConfig::from_toml_str(&toml_content).unwrap();

        assert!(config.sms_token().is_none());
        assert!(matches!(
            config.validate(),
            Err(ProvisionError::MissingConfigError { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        let invalid_url = MINIMAL.replace("https://api.example.com/v1", "invalid-url");
        let config = ProvisionerConfig::from_toml_str(&invalid_url).unwrap();
        assert!(config.validate().is_err());

        let mismatched = format!(
            "{}\n[[models]]\nname = \"X\"\ninit_commands = [\"A\", \"B\"]\nsuccess_keywords = [\"a\"]\n",
            MINIMAL
        );
        let config = ProvisionerConfig::from_toml_str(&mismatched).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ProvisionError::InvalidConfigValueError { .. })
        ));

        let zero_timeout = format!("{}\n[timeouts]\nsms_seconds = 0\n", MINIMAL);
        let config = ProvisionerConfig::from_toml_str(&zero_timeout).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = ProvisionerConfig::from_file(temp_file.path()).unwrap();
        assert_eq!(config.api.base_url, "https://api.example.com/v1");
        assert_eq!(config.sms_token().as_deref(), Some("sms-token"));
    }
}
