// Adapters layer: concrete implementations of the domain ports (backend API, SMS gateway, inbound feed)

pub mod http;
pub mod sms;

pub use http::ApiClient;
pub use sms::{pump_lines, HttpSmsGateway};
