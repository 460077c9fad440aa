pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use crate::config::cli::{CliArgs, Command};

pub use crate::adapters::{ApiClient, HttpSmsGateway};
pub use crate::config::ProvisionerConfig;
pub use crate::core::{
    AbandonPolicy, CommandCatalog, InboundHub, ProgressEvent, ProvisionHandle, ProvisionSettings,
    Provisioner, ProvisioningResult,
};
pub use crate::domain::model::{CommandSet, InboundSms, ProvisionReport, TrackerDetails};
pub use crate::utils::error::{ProvisionError, ProvisionFailure, Result, Stage};
