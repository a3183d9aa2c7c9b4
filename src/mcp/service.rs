//! MCP service implementation using rmcp.
//!
//! [`GatewayService`] exposes every gateway tool through rmcp's router macros. Handlers
//! are constructed per call; all of them share the one [`ConnectionRegistry`].

use crate::db::ConnectionRegistry;
use crate::tools::connection::{
    AddConnectionInput, AddConnectionOutput, ConnectionNameInput, ConnectionToolHandler,
    CurrentConnectionOutput, DefaultConfigInput, DefaultConfigOutput, ListConnectionsOutput,
    RemoveConnectionOutput, SupportedTypesOutput, ValidateAllOutput,
};
use crate::tools::query::{
    ExecuteBatchInput, ExecuteBatchOutput, ExecuteQueryInput, ExecuteQueryOutput,
    QueryToolHandler,
};
use crate::tools::schema::{
    ConnectionInput, DatabaseStatsOutput, GetTableInfoInput, GetTableInfoOutput, GetTablesOutput,
    SchemaToolHandler, ValidateConnectionOutput,
};
use crate::tools::transaction::{TransactionOutput, TransactionToolHandler};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

#[derive(Clone)]
pub struct GatewayService {
    registry: ConnectionRegistry,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl GatewayService {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            tool_router: Self::tool_router(),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    fn queries(&self) -> QueryToolHandler {
        QueryToolHandler::new(self.registry.clone())
    }

    fn schema(&self) -> SchemaToolHandler {
        SchemaToolHandler::new(self.registry.clone())
    }

    fn transactions(&self) -> TransactionToolHandler {
        TransactionToolHandler::new(self.registry.clone())
    }

    fn connections(&self) -> ConnectionToolHandler {
        ConnectionToolHandler::new(self.registry.clone())
    }
}

#[tool_router]
impl GatewayService {
    #[tool(
        description = "Execute a query on a connection.\nSQL backends take SQL with positional params (a JSON array). Cassandra takes CQL. Redis takes a command line such as `HGETALL user:1`.\nMongoDB and DynamoDB take a structured `command` object with `collection` and `operation`.\nOmit `connection` to use the current connection. Inside an open transaction the query joins it."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Result<Json<ExecuteQueryOutput>, McpError> {
        self.queries()
            .execute_query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Execute several queries or commands inside one transaction.\nThe first failure rolls back and is returned as the error.\n`atomic: false` in the output means the backend cannot undo writes, so a failed batch may be partially applied."
    )]
    async fn execute_batch(
        &self,
        Parameters(input): Parameters<ExecuteBatchInput>,
    ) -> Result<Json<ExecuteBatchOutput>, McpError> {
        self.queries()
            .execute_batch(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List tables on a connection.\nCollections for MongoDB, key prefixes for Redis, tables across user keyspaces for Cassandra."
    )]
    async fn get_tables(
        &self,
        Parameters(input): Parameters<ConnectionInput>,
    ) -> Result<Json<GetTablesOutput>, McpError> {
        self.schema()
            .get_tables(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Describe one table: columns, indexes, constraints and row count where available.\nReturns found: false when the table does not exist.\nSchemaless backends report columns sampled from stored data."
    )]
    async fn get_table_info(
        &self,
        Parameters(input): Parameters<GetTableInfoInput>,
    ) -> Result<Json<GetTableInfoOutput>, McpError> {
        self.schema()
            .get_table_info(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Get table, view and index counts plus storage size for a connection.")]
    async fn get_database_stats(
        &self,
        Parameters(input): Parameters<ConnectionInput>,
    ) -> Result<Json<DatabaseStatsOutput>, McpError> {
        self.schema()
            .get_database_stats(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Check that a connection is alive with a lightweight round trip.")]
    async fn validate_connection(
        &self,
        Parameters(input): Parameters<ConnectionInput>,
    ) -> Result<Json<ValidateConnectionOutput>, McpError> {
        self.schema()
            .validate_connection(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Begin a transaction on a connection.\nOnly one transaction per connection. `support: emulated` means writes apply immediately and rollback cannot undo them."
    )]
    async fn begin_transaction(
        &self,
        Parameters(input): Parameters<ConnectionInput>,
    ) -> Result<Json<TransactionOutput>, McpError> {
        self.transactions()
            .begin_transaction(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Commit the open transaction on a connection.")]
    async fn commit_transaction(
        &self,
        Parameters(input): Parameters<ConnectionInput>,
    ) -> Result<Json<TransactionOutput>, McpError> {
        self.transactions()
            .commit_transaction(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Roll back the open transaction on a connection.")]
    async fn rollback_transaction(
        &self,
        Parameters(input): Parameters<ConnectionInput>,
    ) -> Result<Json<TransactionOutput>, McpError> {
        self.transactions()
            .rollback_transaction(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Register and connect a new database.\nGive either a `url` (the scheme selects the backend) or a `config` object tagged by `type`.\nThe configuration is validated first and every problem is reported at once."
    )]
    async fn add_connection(
        &self,
        Parameters(input): Parameters<AddConnectionInput>,
    ) -> Result<Json<AddConnectionOutput>, McpError> {
        self.connections()
            .add_connection(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Disconnect and remove a connection.\nIf it was current, the first remaining connection becomes current."
    )]
    async fn remove_connection(
        &self,
        Parameters(input): Parameters<ConnectionNameInput>,
    ) -> Result<Json<RemoveConnectionOutput>, McpError> {
        self.connections()
            .remove_connection(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "List registered connections with their backend type and status.")]
    async fn list_connections(&self) -> Json<ListConnectionsOutput> {
        Json(self.connections().list_connections().await)
    }

    #[tool(description = "Make a connection the default for tool calls that omit `connection`.")]
    async fn switch_connection(
        &self,
        Parameters(input): Parameters<ConnectionNameInput>,
    ) -> Result<Json<CurrentConnectionOutput>, McpError> {
        self.connections()
            .switch_connection(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Show which connection is current.")]
    async fn get_current_connection(&self) -> Json<CurrentConnectionOutput> {
        Json(self.connections().get_current_connection().await)
    }

    #[tool(description = "Probe every registered connection concurrently.")]
    async fn validate_all_connections(&self) -> Json<ValidateAllOutput> {
        Json(self.connections().validate_all_connections().await)
    }

    #[tool(description = "List the supported backend types with their default ports.")]
    async fn supported_types(&self) -> Json<SupportedTypesOutput> {
        Json(self.connections().supported_types())
    }

    #[tool(
        description = "Get a template configuration for a backend type, pointing at a local default install.\nEdit it and pass it to add_connection as `config`."
    )]
    async fn default_config(
        &self,
        Parameters(input): Parameters<DefaultConfigInput>,
    ) -> Json<DefaultConfigOutput> {
        Json(self.connections().default_config(input))
    }
}

#[tool_handler]
impl ServerHandler for GatewayService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "db-gateway".to_owned(),
                title: Some("DB Gateway".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "One tool surface over PostgreSQL, MySQL, SQLite, Redis, MongoDB, Cassandra, \
                SQL Server and DynamoDB.\n\
                \n\
                ## Workflow\n\
                1. Call `list_connections`. If it is empty, use `supported_types` and \
                `default_config`, then `add_connection`\n\
                2. Tools take an optional `connection`; omitted, the current connection is used\n\
                3. `switch_connection` changes the current connection\n\
                \n\
                ## Queries\n\
                - SQL backends: `query` with `?`/`$1`/`@P1` placeholders and `params` as an array\n\
                - Cassandra: CQL in `query`\n\
                - Redis: a command line in `query`, e.g. `GET session:42`\n\
                - MongoDB/DynamoDB: a `command` object, e.g. \
                {\"collection\": \"users\", \"operation\": \"find\", \"filter\": {}}\n\
                \n\
                ## Transactions\n\
                Redis, Cassandra, SQL Server and DynamoDB transactions are emulated: \
                writes apply immediately and rollback does not undo them."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_info() {
        let service = GatewayService::new(ConnectionRegistry::new());
        let info = service.get_info();
        assert_eq!(info.server_info.name, "db-gateway");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_every_tool_is_routed() {
        let service = GatewayService::new(ConnectionRegistry::new());
        let names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        for expected in [
            "execute_query",
            "execute_batch",
            "get_tables",
            "get_table_info",
            "get_database_stats",
            "validate_connection",
            "begin_transaction",
            "commit_transaction",
            "rollback_transaction",
            "add_connection",
            "remove_connection",
            "list_connections",
            "switch_connection",
            "get_current_connection",
            "validate_all_connections",
            "supported_types",
            "default_config",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing tool {expected}");
        }
    }
}
