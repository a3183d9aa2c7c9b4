//! DynamoDB adapter over the AWS SDK.
//!
//! Items are exchanged as plain JSON: strings map to `S`, numbers to `N`, arrays to `L`
//! and objects to `M`. Binary attributes come back base64-encoded.

use super::connection_failed;
use crate::db::adapter::{DatabaseAdapter, NativeHandle, TransactionSupport, TxState, with_timeout};
use crate::db::types::encode_binary;
use crate::error::{DbError, DbResult};
use crate::models::{
    BackendOptions, ColumnInfo, Command, CommandAction, ConnectionConfig, ConstraintInfo,
    ConstraintKind, DatabaseKind, DatabaseStats, IndexInfo, QueryInput, QueryResult, TableInfo,
    TableType, format_size,
};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::{Credentials, Region};
use aws_sdk_dynamodb::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::types::{
    AttributeValue, KeySchemaElement, KeyType, ReturnValue, TableDescription,
};
use serde_json::{Map, Value as JsonValue, json};
use std::collections::HashMap;
use tracing::{debug, info, warn};

const BACKEND: &str = "DynamoDB";
const DEFAULT_REGION: &str = "us-east-1";

type Item = HashMap<String, AttributeValue>;

fn sdk_error<E, R>(err: SdkError<E, R>) -> DbError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => {
            connection_failed(DatabaseKind::DynamoDb, DisplayErrorContext(&err))
        }
        _ => {
            let code = err.code().map(String::from);
            let message = err
                .message()
                .map(String::from)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            let suggestion = match code.as_deref() {
                Some("ResourceNotFoundException") => "Check the table name and region",
                Some("ConditionalCheckFailedException") => "The condition expression evaluated to false",
                Some("ValidationException") => "Check the key attributes and expression syntax",
                Some("UnrecognizedClientException" | "InvalidSignatureException") => {
                    "Verify the AWS credentials"
                }
                _ => "Check the command fields and table definition",
            };
            DbError::backend_with_code(BACKEND, message, code, suggestion)
        }
    }
}

/// Plain JSON to an attribute value.
pub fn json_to_attribute(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null(true),
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => AttributeValue::N(n.to_string()),
        JsonValue::String(s) => AttributeValue::S(s.clone()),
        JsonValue::Array(items) => AttributeValue::L(items.iter().map(json_to_attribute).collect()),
        JsonValue::Object(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), json_to_attribute(v)))
                .collect(),
        ),
    }
}

/// DynamoDB numbers carry up to 38 digits; ones a JSON number cannot hold exactly stay strings.
fn number_to_json(n: &str) -> JsonValue {
    if let Ok(i) = n.parse::<i64>() {
        return json!(i);
    }
    if let Ok(u) = n.parse::<u64>() {
        return json!(u);
    }
    match n.parse::<f64>() {
        Ok(f) if f.to_string() == n => serde_json::Number::from_f64(f)
            .map_or_else(|| JsonValue::String(n.to_string()), JsonValue::Number),
        _ => JsonValue::String(n.to_string()),
    }
}

pub fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::S(s) => JsonValue::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::B(blob) => encode_binary(blob.as_ref()),
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Null(_) => JsonValue::Null,
        AttributeValue::L(items) => JsonValue::Array(items.iter().map(attribute_to_json).collect()),
        AttributeValue::M(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), attribute_to_json(v)))
                .collect(),
        ),
        AttributeValue::Ss(values) => json!(values),
        AttributeValue::Ns(values) => JsonValue::Array(values.iter().map(|n| number_to_json(n)).collect()),
        AttributeValue::Bs(values) => {
            JsonValue::Array(values.iter().map(|b| encode_binary(b.as_ref())).collect())
        }
        other => JsonValue::String(format!("{other:?}")),
    }
}

fn item_to_row(item: &Item) -> Map<String, JsonValue> {
    let mut keys: Vec<&String> = item.keys().collect();
    keys.sort();
    keys.into_iter()
        .map(|k| (k.clone(), attribute_to_json(&item[k])))
        .collect()
}

/// A JSON object as an item or key. Anything else is rejected.
fn to_item(value: &JsonValue, what: &str) -> DbResult<Item> {
    match json_to_attribute(value) {
        AttributeValue::M(map) => Ok(map),
        _ => Err(DbError::invalid_input(format!("{what} must be an object"))),
    }
}

fn optional_values(value: Option<&JsonValue>) -> DbResult<Option<Item>> {
    value.map(|v| to_item(v, "expressionAttributeValues")).transpose()
}

fn items_result(items: &[Item], count: i32) -> QueryResult {
    let mut result = QueryResult::inferred(items.iter().map(item_to_row).collect());
    result.row_count = count.max(0) as u64;
    result
}

fn attributes_result(attributes: Option<&Item>) -> QueryResult {
    let rows: Vec<_> = attributes.map(item_to_row).into_iter().collect();
    let mut result = QueryResult::inferred(rows);
    result.row_count = 1;
    result
}

fn key_columns(schema: &[KeySchemaElement]) -> Vec<String> {
    // HASH before RANGE
    let mut keys: Vec<&KeySchemaElement> = schema.iter().collect();
    keys.sort_by_key(|k| !matches!(k.key_type(), KeyType::Hash));
    keys.into_iter().map(|k| k.attribute_name().to_string()).collect()
}

fn describe(table: &TableDescription) -> TableInfo {
    let name = table.table_name().unwrap_or_default();
    let keys = key_columns(table.key_schema());

    let attribute_type = |attr: &str| -> String {
        table
            .attribute_definitions()
            .iter()
            .find(|d| d.attribute_name() == attr)
            .map(|d| match d.attribute_type().as_str() {
                "S" => "string",
                "N" => "number",
                "B" => "binary",
                other => other,
            })
            .unwrap_or("unknown")
            .to_string()
    };

    let mut columns: Vec<ColumnInfo> = keys
        .iter()
        .map(|k| ColumnInfo::new(k.as_str(), attribute_type(k), false).with_primary_key(true))
        .collect();
    for definition in table.attribute_definitions() {
        let attr = definition.attribute_name();
        if !keys.iter().any(|k| k == attr) {
            columns.push(ColumnInfo::new(attr, attribute_type(attr), true));
        }
    }

    let mut indexes: Vec<IndexInfo> = table
        .global_secondary_indexes()
        .iter()
        .map(|gsi| {
            IndexInfo::new(gsi.index_name().unwrap_or_default(), key_columns(gsi.key_schema()))
                .with_type("global")
        })
        .collect();
    indexes.extend(table.local_secondary_indexes().iter().map(|lsi| {
        IndexInfo::new(lsi.index_name().unwrap_or_default(), key_columns(lsi.key_schema()))
            .with_type("local")
    }));

    let mut info = TableInfo::new(name, TableType::Table)
        .with_columns(columns)
        .with_indexes(indexes)
        .with_constraints(vec![ConstraintInfo::new(
            format!("{name}_pkey"),
            ConstraintKind::PrimaryKey,
            keys,
        )]);
    if let Some(count) = table.item_count() {
        info = info.with_row_count(count.max(0) as u64);
    }
    info
}

pub struct DynamoDbAdapter {
    config: ConnectionConfig,
    client: NativeHandle<Client>,
    tx: TxState,
}

impl DynamoDbAdapter {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: NativeHandle::new(DatabaseKind::DynamoDb),
            tx: TxState::default(),
        }
    }

    fn options(&self) -> crate::models::DynamoDbOptions {
        match &self.config.options {
            BackendOptions::DynamoDb(opts) => opts.clone(),
            _ => Default::default(),
        }
    }

    async fn build_client(&self) -> Client {
        let opts = self.options();
        let region = opts.region.clone().unwrap_or_else(|| DEFAULT_REGION.to_string());
        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));
        if let (Some(key), Some(secret)) = (&opts.access_key_id, &opts.secret_access_key) {
            loader = loader.credentials_provider(Credentials::new(
                key.clone(),
                secret.clone(),
                opts.session_token.clone(),
                None,
                "db-gateway",
            ));
        }
        if let Some(endpoint) = &opts.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        Client::new(&loader.load().await)
    }

    async fn run_command(&self, command: &Command) -> DbResult<QueryResult> {
        let client = self.client.get()?;
        let table = command.collection.as_str();
        debug!(table, operation = command.action.name(), "Running DynamoDB command");

        match &command.action {
            CommandAction::GetItem { key } => {
                let output = client
                    .get_item()
                    .table_name(table)
                    .set_key(Some(to_item(key, "key")?))
                    .send()
                    .await
                    .map_err(sdk_error)?;
                let items: Vec<Item> = output.item().cloned().into_iter().collect();
                Ok(items_result(&items, items.len() as i32))
            }
            CommandAction::PutItem {
                item,
                condition_expression,
                expression_attribute_names,
                expression_attribute_values,
            } => {
                client
                    .put_item()
                    .table_name(table)
                    .set_item(Some(to_item(item, "item")?))
                    .set_condition_expression(condition_expression.clone())
                    .set_expression_attribute_names(expression_attribute_names.clone())
                    .set_expression_attribute_values(optional_values(expression_attribute_values.as_ref())?)
                    .send()
                    .await
                    .map_err(sdk_error)?;
                Ok(QueryResult::affected(1))
            }
            CommandAction::UpdateItem {
                key,
                update_expression,
                condition_expression,
                expression_attribute_names,
                expression_attribute_values,
            } => {
                let output = client
                    .update_item()
                    .table_name(table)
                    .set_key(Some(to_item(key, "key")?))
                    .update_expression(update_expression)
                    .set_condition_expression(condition_expression.clone())
                    .set_expression_attribute_names(expression_attribute_names.clone())
                    .set_expression_attribute_values(optional_values(expression_attribute_values.as_ref())?)
                    .return_values(ReturnValue::AllNew)
                    .send()
                    .await
                    .map_err(sdk_error)?;
                Ok(attributes_result(output.attributes()))
            }
            CommandAction::DeleteItem {
                key,
                condition_expression,
                expression_attribute_names,
                expression_attribute_values,
            } => {
                let output = client
                    .delete_item()
                    .table_name(table)
                    .set_key(Some(to_item(key, "key")?))
                    .set_condition_expression(condition_expression.clone())
                    .set_expression_attribute_names(expression_attribute_names.clone())
                    .set_expression_attribute_values(optional_values(expression_attribute_values.as_ref())?)
                    .return_values(ReturnValue::AllOld)
                    .send()
                    .await
                    .map_err(sdk_error)?;
                let mut result = attributes_result(output.attributes());
                // deleting a missing key is not an error, but nothing was affected
                if output.attributes().is_none() {
                    result.row_count = 0;
                }
                Ok(result)
            }
            CommandAction::Query {
                key_condition_expression,
                filter_expression,
                expression_attribute_names,
                expression_attribute_values,
                index_name,
                limit,
                scan_index_forward,
            } => {
                let output = client
                    .query()
                    .table_name(table)
                    .key_condition_expression(key_condition_expression)
                    .set_filter_expression(filter_expression.clone())
                    .set_expression_attribute_names(expression_attribute_names.clone())
                    .set_expression_attribute_values(optional_values(expression_attribute_values.as_ref())?)
                    .set_index_name(index_name.clone())
                    .set_limit(*limit)
                    .set_scan_index_forward(*scan_index_forward)
                    .send()
                    .await
                    .map_err(sdk_error)?;
                Ok(items_result(output.items(), output.count()))
            }
            CommandAction::Scan {
                filter_expression,
                expression_attribute_names,
                expression_attribute_values,
                index_name,
                limit,
            } => {
                let output = client
                    .scan()
                    .table_name(table)
                    .set_filter_expression(filter_expression.clone())
                    .set_expression_attribute_names(expression_attribute_names.clone())
                    .set_expression_attribute_values(optional_values(expression_attribute_values.as_ref())?)
                    .set_index_name(index_name.clone())
                    .set_limit(*limit)
                    .send()
                    .await
                    .map_err(sdk_error)?;
                Ok(items_result(output.items(), output.count()))
            }
            other => Err(DbError::invalid_input(format!(
                "{BACKEND} does not support the '{}' operation",
                other.name()
            ))),
        }
    }

    async fn table_names(&self, client: &Client) -> DbResult<Vec<String>> {
        let mut names = Vec::new();
        let mut start: Option<String> = None;
        loop {
            let output = client
                .list_tables()
                .set_exclusive_start_table_name(start.take())
                .send()
                .await
                .map_err(sdk_error)?;
            names.extend(output.table_names().iter().cloned());
            match output.last_evaluated_table_name() {
                Some(last) => start = Some(last.to_string()),
                None => break,
            }
        }
        Ok(names)
    }

    async fn describe_table(&self, client: &Client, name: &str) -> DbResult<Option<TableDescription>> {
        match client.describe_table().table_name(name).send().await {
            Ok(output) => Ok(output.table().cloned()),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception())
                {
                    return Ok(None);
                }
                Err(sdk_error(err))
            }
        }
    }
}

#[async_trait]
impl DatabaseAdapter for DynamoDbAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::DynamoDb
    }

    fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn transaction_support(&self) -> TransactionSupport {
        TransactionSupport::Emulated
    }

    async fn connect(&self) -> DbResult<()> {
        let client = self.build_client().await;

        // The SDK never dials on construction; one cheap call surfaces bad endpoints and credentials.
        let limit = self.config.pool.acquire_timeout_or_default();
        with_timeout("DynamoDB connect", limit, async {
            client
                .list_tables()
                .limit(1)
                .send()
                .await
                .map(|_| ())
                .map_err(|e| connection_failed(DatabaseKind::DynamoDb, DisplayErrorContext(&e)))
        })
        .await?;

        self.client.set(client);
        info!(connection = %self.config.name, endpoint = %self.config.endpoint(), "Connected to DynamoDB");
        Ok(())
    }

    async fn disconnect(&self) -> DbResult<()> {
        self.tx.reset();
        if self.client.take().is_some() {
            debug!(connection = %self.config.name, "Dropped DynamoDB client");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    async fn execute_query(&self, input: &QueryInput) -> DbResult<QueryResult> {
        self.client.get()?;
        let command = input.to_command(BACKEND)?;
        let limit = self.config.pool.request_timeout_or_default();
        with_timeout("DynamoDB command", limit, self.run_command(&command)).await
    }

    async fn get_tables(&self) -> DbResult<Vec<TableInfo>> {
        let client = self.client.get()?;
        let names = self.table_names(&client).await?;
        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            match self.describe_table(&client, &name).await {
                Ok(Some(table)) => tables.push(describe(&table)),
                Ok(None) => {}
                Err(e) => {
                    warn!(table = %name, error = %e, "Failed to describe table");
                    tables.push(TableInfo::new(name, TableType::Table));
                }
            }
        }
        Ok(tables)
    }

    async fn get_table_info(&self, name: &str, _schema: Option<&str>) -> DbResult<Option<TableInfo>> {
        let client = self.client.get()?;
        Ok(self.describe_table(&client, name).await?.as_ref().map(describe))
    }

    async fn get_database_stats(&self) -> DbResult<DatabaseStats> {
        let client = self.client.get()?;
        let names = self.table_names(&client).await?;

        let mut indexes = 0u64;
        let mut bytes = 0u64;
        for name in &names {
            if let Some(table) = self.describe_table(&client, name).await? {
                indexes += (table.global_secondary_indexes().len() + table.local_secondary_indexes().len()) as u64;
                bytes += table.table_size_bytes().unwrap_or(0).max(0) as u64;
            }
        }
        Ok(DatabaseStats::new(names.len() as u64, 0, indexes, format_size(bytes)))
    }

    async fn validate_connection(&self) -> bool {
        let Ok(client) = self.client.get() else {
            return false;
        };
        let limit = self.config.pool.acquire_timeout_or_default();
        with_timeout("DynamoDB probe", limit, async {
            client.list_tables().limit(1).send().await.map_err(sdk_error)
        })
        .await
        .is_ok()
    }

    async fn begin_transaction(&self) -> DbResult<()> {
        self.client.get()?;
        self.tx.begin()
    }

    async fn commit_transaction(&self) -> DbResult<()> {
        self.tx.end()
    }

    async fn rollback_transaction(&self) -> DbResult<()> {
        self.tx.end()?;
        warn!(connection = %self.config.name, "DynamoDB rollback is a no-op; earlier writes remain applied");
        Ok(())
    }

    fn is_in_transaction(&self) -> bool {
        self.tx.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_dynamodb::types::ScalarAttributeType;
    use aws_sdk_dynamodb::types::{AttributeDefinition, GlobalSecondaryIndexDescription};

    #[test]
    fn test_json_attribute_mapping() {
        let value = json!({ "id": 7, "name": "Ada", "tags": ["a", "b"], "ratio": 0.5, "gone": null });
        let AttributeValue::M(map) = json_to_attribute(&value) else {
            panic!("expected a map");
        };
        assert_eq!(map["id"], AttributeValue::N("7".into()));
        assert_eq!(map["name"], AttributeValue::S("Ada".into()));
        assert_eq!(map["gone"], AttributeValue::Null(true));

        let row = item_to_row(&map);
        assert_eq!(JsonValue::Object(row), value);
    }

    #[test]
    fn test_wide_numbers_keep_their_digits() {
        assert_eq!(number_to_json("42"), json!(42));
        assert_eq!(number_to_json("-3.25"), json!(-3.25));
        assert_eq!(number_to_json("18446744073709551615"), json!(u64::MAX));
        assert_eq!(
            number_to_json("123456789012345678901234567890"),
            json!("123456789012345678901234567890")
        );
        assert_eq!(
            number_to_json("0.12345678901234567890123"),
            json!("0.12345678901234567890123")
        );
    }

    #[test]
    fn test_set_attributes_to_json() {
        assert_eq!(
            attribute_to_json(&AttributeValue::Ns(vec!["1".into(), "2.5".into()])),
            json!([1, 2.5])
        );
        assert_eq!(
            attribute_to_json(&AttributeValue::Ss(vec!["x".into()])),
            json!(["x"])
        );
    }

    #[test]
    fn test_to_item_rejects_non_objects() {
        assert!(to_item(&json!([1]), "key").is_err());
        assert!(to_item(&json!({ "pk": "a" }), "key").is_ok());
    }

    #[test]
    fn test_describe_table() {
        let table = TableDescription::builder()
            .table_name("orders")
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("sk")
                    .key_type(KeyType::Range)
                    .build()
                    .unwrap(),
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("pk")
                    .key_type(KeyType::Hash)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("pk")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("sk")
                    .attribute_type(ScalarAttributeType::N)
                    .build()
                    .unwrap(),
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("status")
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .unwrap(),
            )
            .global_secondary_indexes(
                GlobalSecondaryIndexDescription::builder()
                    .index_name("by_status")
                    .key_schema(
                        KeySchemaElement::builder()
                            .attribute_name("status")
                            .key_type(KeyType::Hash)
                            .build()
                            .unwrap(),
                    )
                    .build(),
            )
            .item_count(12)
            .build();

        let info = describe(&table);
        assert_eq!(info.name, "orders");
        assert_eq!(info.column_names(), vec!["pk", "sk", "status"]);
        assert!(info.columns[0].is_primary_key);
        assert_eq!(info.columns[1].data_type, "number");
        assert!(!info.columns[2].is_primary_key);
        assert_eq!(info.indexes[0].name, "by_status");
        assert_eq!(info.constraints[0].columns, vec!["pk", "sk"]);
        assert_eq!(info.row_count, Some(12));
    }

    #[tokio::test]
    async fn test_not_connected_before_connect() {
        let adapter = DynamoDbAdapter::new(ConnectionConfig::empty(DatabaseKind::DynamoDb));
        let input = QueryInput::command(Command::new(
            "orders",
            CommandAction::GetItem { key: json!({ "pk": "a" }) },
        ));
        let err = adapter.execute_query(&input).await.unwrap_err();
        assert!(matches!(err, DbError::NotConnected { .. }));
    }
}
