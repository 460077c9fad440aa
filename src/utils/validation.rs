use crate::utils::error::{ProvisionError, Result};
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static LOCAL_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{8}$").expect("static regex"));
static DANISH_PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+45[0-9]{8}$").expect("static regex"));
static PHONE_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\d+]").expect("static regex"));

pub const TRACKER_NAME_MAX_CHARS: usize = 32;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(ProvisionError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: url_str.to_string(),
                reason: format!("Unsupported URL scheme: {}", scheme),
            }),
        },
        Err(e) => Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: url_str.to_string(),
            reason: format!("Invalid URL format: {}", e),
        }),
    }
}

pub fn validate_positive_number(field_name: &str, value: u64, min_value: u64) -> Result<()> {
    if value < min_value {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(ProvisionError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: "Value cannot be empty or whitespace-only".to_string(),
        });
    }
    Ok(())
}

fn invalid(field: &str, value: &str, reason: &str) -> ProvisionError {
    ProvisionError::ValidationError {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// 追蹤器 ID：12 位通用 ID 或 15 位 IMEI
pub fn validate_tracker_id(id: &str) -> Result<()> {
    let all_digits = !id.is_empty() && id.chars().all(|c| c.is_ascii_digit());
    if !all_digits || !(id.len() == 12 || id.len() == 15) {
        return Err(invalid(
            "id",
            id,
            "ID must be a general ID of 12 digits or a IMEI of 15 digits",
        ));
    }
    Ok(())
}

pub fn validate_tracker_name(name: &str) -> Result<()> {
    let length = name.chars().count();
    if length < 1 || length > TRACKER_NAME_MAX_CHARS {
        return Err(invalid("name", name, "The name must be 1-32 characters"));
    }
    Ok(())
}

/// 移除數字與 '+' 以外的所有字元
pub fn normalize_phone_number(raw: &str) -> String {
    PHONE_NOISE.replace_all(raw, "").into_owned()
}

pub fn validate_phone_number(phone_number: &str) -> Result<()> {
    if LOCAL_PHONE.is_match(phone_number) || DANISH_PHONE.is_match(phone_number) {
        Ok(())
    } else {
        Err(invalid(
            "phone number",
            phone_number,
            "expected 8 digits, optionally prefixed with +45",
        ))
    }
}

/// 下拉選單的佔位項目以 '-' 開頭
pub fn validate_model_name(model: &str) -> Result<()> {
    if model.trim().is_empty() || model.starts_with('-') {
        return Err(invalid("model", model, "Invalid model selected"));
    }
    Ok(())
}
