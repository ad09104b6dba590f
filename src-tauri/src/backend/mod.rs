//! Backend Management Module
//!
//! Runs the OCR backend as a supervised subprocess and proxies requests to it.

pub mod config;
pub mod gateway;
pub mod health;
pub mod process;
pub mod supervisor;

pub use config::{BackendEndpoint, BackendSettings};
pub use gateway::{ForwardedResponse, Payload, RequestGateway, RequestOptions};
pub use health::ReadinessProbe;
pub use process::{BackendEvent, BackendHandle};
pub use supervisor::ProcessSupervisor;
