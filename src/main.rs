mod comm;
mod dispatch;
mod executor;

use comm::{Comm, CommConfig};
use dispatch::dispatch;
use executor::{Executor, ExecutorConfig};
use std::sync::Arc;
use tokio::signal;
use tracing::{Instrument, Level, error, info, info_span, warn};
use tracing_subscriber::fmt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_max_level(Level::DEBUG)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting sandexec daemon...");

    let executor_config = ExecutorConfig::from_env();
    let executor = Arc::new(Executor::new(executor_config));
    let exec_config = executor.config();
    info!(
        enabled = exec_config.enabled,
        working_directory = %exec_config.default_working_directory.display(),
        tools = executor.tool_definitions().len(),
        "Executor initialized"
    );
    for issue in exec_config.issues() {
        warn!(issue = %issue, "Execution configuration problem");
    }

    let comm_config = CommConfig::from_env().covering_runs_of(exec_config.longest_run());
    let content_limit = comm_config.max_content_bytes();
    info!(
        response_timeout_secs = comm_config.response_timeout_secs,
        content_limit,
        "Comm configured"
    );

    let (comm, mut request_rx) = Comm::new(comm_config).await?;
    info!(addr = %comm.local_addr()?, "Comm initialized");

    let comm_handle = tokio::spawn(async move {
        if let Err(e) = comm.run().await {
            error!(error = %e, "Comm server error");
        }
    });

    info!("Entering dispatch loop...");

    loop {
        tokio::select! {
            Some(req) = request_rx.recv() => {
                let executor = Arc::clone(&executor);
                let span = info_span!("request", tool = %req.tool, client = %req.source_addr);
                tokio::spawn(dispatch(executor, req, content_limit).instrument(span));
            }
            _ = async {
                signal::ctrl_c().await.ok();
            } => {
                info!("Received shutdown signal");
                break;
            }
        }
    }

    info!("Shutting down...");
    comm_handle.abort();

    info!("Goodbye!");
    Ok(())
}
