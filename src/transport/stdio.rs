//! Stdio transport for the MCP server.
//!
//! JSON-RPC on stdin/stdout. Logging must stay on stderr while this runs.

use crate::db::ConnectionRegistry;
use crate::error::{DbError, DbResult};
use crate::mcp::GatewayService;
use crate::transport::{Transport, close_connections, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use tracing::{info, warn};

pub struct StdioTransport {
    registry: ConnectionRegistry,
}

impl StdioTransport {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let service = GatewayService::new(self.registry.clone());
        let running_service = service
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {e}")))?;

        let shutdown_requested = tokio::select! {
            result = running_service.waiting() => {
                match result {
                    Ok(_quit_reason) => info!("Stdio transport completed normally"),
                    Err(e) => {
                        warn!(error = %e, "Stdio transport error");
                        close_connections(&self.registry).await;
                        return Err(DbError::internal(format!("Stdio transport error: {e}")));
                    }
                }
                false
            }
            _ = wait_for_signal() => {
                info!("Shutdown signal received (send again to force exit)");
                true
            }
        };

        if shutdown_requested {
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        close_connections(&self.registry).await;

        if shutdown_requested {
            // A blocked stdin read cannot be cancelled from select!
            info!("Exiting process");
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
