pub mod catalog;
pub mod inbox;
pub mod matcher;
pub mod orchestrator;
pub mod poller;
pub mod registration;
pub mod session;

#[cfg(test)]
mod test_support;

pub use crate::domain::model::{CommandSet, InboundSms, ProvisionReport, TrackerDetails};
pub use crate::domain::ports::{ApiGateway, SmsTransport};
pub use crate::utils::error::Result;
pub use catalog::CommandCatalog;
pub use inbox::{InboundHub, Subscription};
pub use orchestrator::{
    AbandonPolicy, ProgressEvent, ProvisionHandle, ProvisionSettings, Provisioner,
    ProvisioningResult,
};
