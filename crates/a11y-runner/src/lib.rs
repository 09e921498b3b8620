//! Session orchestration: discovery, the page x tool scan matrix, adjudication
//! and finalization, plus the service facade the CLI drives.

pub mod config;
pub mod discovery;
pub mod orchestrator;
pub mod plan;
pub mod service;

pub use config::*;
pub use discovery::*;
pub use orchestrator::*;
pub use plan::*;
pub use service::*;
