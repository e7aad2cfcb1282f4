use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::oneshot;

/// Message types for the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MsgType {
    /// Client → daemon: tool invocation
    Request = 0x01,
    /// Daemon → client: request received
    RequestAck = 0x02,
    /// Daemon → client: tool output
    Response = 0x03,
}

impl MsgType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::RequestAck),
            0x03 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Request payload from client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Tool name, e.g. `execute_command`
    pub tool: String,
    /// Tool input as JSON text
    #[serde(default)]
    pub arguments: String,
}

/// Response payload from the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Serialized tool output (JSON) or a transport error message
    pub content: String,
    /// Whether this is an error response
    pub is_error: bool,
}

/// Invocation sent from Comm to the dispatch loop
#[derive(Debug)]
pub struct ToolRequest {
    pub tool: String,
    pub arguments: String,
    /// Channel to send response back to Comm
    pub reply: oneshot::Sender<ToolResponse>,
    /// Client source address
    pub source_addr: SocketAddr,
}

/// Response sent from the dispatch loop to Comm
#[derive(Debug)]
pub struct ToolResponse {
    pub content: String,
    pub is_error: bool,
}

impl ToolResponse {
    pub fn new(content: String) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(content: String) -> Self {
        Self {
            content,
            is_error: true,
        }
    }
}
