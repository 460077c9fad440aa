use crate::domain::model::{CommandSet, ModelRecord};
use crate::domain::ports::ApiGateway;
use crate::utils::error::{ProvisionError, Result};
use std::collections::BTreeMap;

/// 型號名稱到初始化指令集的對照表
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
    models: BTreeMap<String, CommandSet>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: impl Into<String>, commands: CommandSet) {
        self.models.insert(model.into(), commands);
    }

    pub fn with_model(mut self, model: impl Into<String>, commands: CommandSet) -> Self {
        self.insert(model, commands);
        self
    }

    /// 從後端型號清單建立，格式錯誤的型號略過
    pub fn from_records(records: Vec<ModelRecord>) -> Self {
        let mut catalog = Self::new();
        for record in records {
            match CommandSet::from_delimited(&record.init_commands, &record.success_keywords) {
                Ok(commands) => catalog.insert(record.name, commands),
                Err(e) => {
                    tracing::warn!("⚠️ Skipping model '{}': {}", record.name, e);
                }
            }
        }
        catalog
    }

    /// 查詢 GET models
    pub async fn fetch(api: &dyn ApiGateway) -> Result<Self> {
        let response = api.get("models").await?;
        if !response.is_success() {
            return Err(ProvisionError::ConfigError {
                message: format!("Failed to fetch models (status {})", response.status_code),
            });
        }

        let records: Vec<ModelRecord> = match response.body {
            Some(body) => serde_json::from_value(body)?,
            None => Vec::new(),
        };
        let catalog = Self::from_records(records);
        tracing::info!("📋 Loaded {} tracker models", catalog.len());
        Ok(catalog)
    }

    /// 以另一份目錄覆蓋同名型號
    pub fn merge(&mut self, other: CommandCatalog) {
        self.models.extend(other.models);
    }

    pub fn lookup(&self, model: &str) -> Result<&CommandSet> {
        self.models
            .get(model)
            .filter(|commands| !commands.is_empty())
            .ok_or_else(|| ProvisionError::NoCommandsForModel {
                model: model.to_string(),
            })
    }

    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
