//! db-gateway entry point.
//!
//! Loads preconfigured connections, then serves the MCP tools over stdio or HTTP.

use clap::Parser;
use db_gateway::config::{Config, TransportMode, supported_schemes};
use db_gateway::db::{ConnectionRegistry, DatabaseAdapterFactory};
use db_gateway::transport::{HttpTransport, StdioTransport, Transport};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Output goes to stderr; stdout belongs to stdio MCP.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .init();
    }
}

/// Register every configured connection. Invalid or unreachable ones are logged and skipped
/// so that one bad entry does not keep the server from starting.
async fn load_connections(config: &Config, registry: &ConnectionRegistry) -> Result<(), String> {
    let configs = config.connection_configs()?;
    info!(count = configs.len(), "Connecting to preconfigured databases");

    for conn in configs {
        let name = conn.name.clone();
        let validation = DatabaseAdapterFactory::validate_config(&conn);
        if !validation.valid {
            warn!(connection = %name, errors = ?validation.errors, "Skipping invalid connection");
            continue;
        }
        info!(connection = %name, backend = %conn.kind(), endpoint = %conn.endpoint(), "Adding connection");
        if let Err(e) = registry.add_connection(&name, conn).await {
            warn!(connection = %name, error = %e, "Skipping connection");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        transport = %config.transport,
        "Starting db-gateway v{}",
        env!("CARGO_PKG_VERSION")
    );

    let registry = ConnectionRegistry::new();
    load_connections(&config, &registry).await?;
    if registry.is_empty().await {
        info!(
            schemes = ?supported_schemes(),
            "No connections configured; add them at runtime with add_connection"
        );
    }

    let result = match config.transport {
        TransportMode::Stdio => StdioTransport::new(registry).run().await,
        TransportMode::Http => {
            info!(
                addr = %config.http_bind_addr(),
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                registry,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
