// Comm module - tool invocations over UDP

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod types;

pub use config::CommConfig;
pub use server::Comm;
#[allow(unused_imports)]
pub use types::{ToolRequest, ToolResponse};
