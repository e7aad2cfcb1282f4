// Bridges Comm requests to the executor

use crate::comm::{ToolRequest, ToolResponse};
use crate::executor::Executor;
use std::sync::Arc;
use tracing::{debug, error};

/// Run one tool invocation and hand its JSON output back to Comm.
///
/// The JSON is kept within `content_limit` bytes by clipping captured
/// output, so the caller always receives a parseable result.
pub async fn dispatch(executor: Arc<Executor>, req: ToolRequest, content_limit: usize) {
    let output = executor.call(&req.tool, &req.arguments).await;
    let is_error = output.is_error();

    let response = match output.to_json_within(content_limit) {
        Ok(json) => {
            debug!(bytes = json.len(), limit = content_limit, "Tool output encoded");
            if is_error {
                ToolResponse::error(json)
            } else {
                ToolResponse::new(json)
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to serialize tool output");
            ToolResponse::error(format!("Failed to serialize tool output: {}", e))
        }
    };

    if req.reply.send(response).is_err() {
        debug!("Requester went away before the response was ready");
    }
}
