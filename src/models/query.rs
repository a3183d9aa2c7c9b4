//! Query-related data models.
//!
//! A [`QueryInput`] is either native query text with positional parameters, or a structured
//! [`Command`] for backends whose query model is not textual (MongoDB, DynamoDB).

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;
use std::collections::HashMap;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    String(String),
    /// Objects and arrays
    Json(JsonValue),
}

impl QueryParam {
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            JsonValue::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }

    /// Render the parameter as a plain string argument (used for command-style protocols).
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }
}

/// Convert a raw JSON `params` argument into positional parameters.
///
/// Parameters must be an ordered sequence; anything other than an array (or absent/null)
/// is rejected.
pub fn params_from_json(params: Option<JsonValue>) -> DbResult<Vec<QueryParam>> {
    match params {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(values)) => Ok(values.into_iter().map(QueryParam::from_json).collect()),
        Some(other) => Err(DbError::invalid_input(format!(
            "Parameters must be an array, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Structured command for document and managed NoSQL backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    /// Target collection or table
    #[serde(alias = "table", alias = "tableName", alias = "TableName")]
    pub collection: String,
    #[serde(flatten)]
    pub action: CommandAction,
}

impl Command {
    pub fn new(collection: impl Into<String>, action: CommandAction) -> Self {
        Self {
            collection: collection.into(),
            action,
        }
    }
}

/// Operation verb plus its operation-specific fields, tagged by `"operation"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum CommandAction {
    // Document store verbs
    #[serde(rename_all = "camelCase")]
    Find {
        #[serde(default)]
        filter: Option<JsonValue>,
        #[serde(default)]
        projection: Option<JsonValue>,
        #[serde(default)]
        sort: Option<JsonValue>,
        #[serde(default)]
        limit: Option<i64>,
        #[serde(default)]
        skip: Option<u64>,
    },
    #[serde(rename_all = "camelCase")]
    FindOne {
        #[serde(default)]
        filter: Option<JsonValue>,
        #[serde(default)]
        projection: Option<JsonValue>,
    },
    InsertOne {
        document: JsonValue,
    },
    InsertMany {
        documents: Vec<JsonValue>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateOne {
        filter: JsonValue,
        update: JsonValue,
        #[serde(default)]
        upsert: bool,
    },
    #[serde(rename_all = "camelCase")]
    UpdateMany {
        filter: JsonValue,
        update: JsonValue,
        #[serde(default)]
        upsert: bool,
    },
    DeleteOne {
        filter: JsonValue,
    },
    DeleteMany {
        filter: JsonValue,
    },
    Aggregate {
        pipeline: Vec<JsonValue>,
    },
    CountDocuments {
        #[serde(default)]
        filter: Option<JsonValue>,
    },
    Distinct {
        field: String,
        #[serde(default)]
        filter: Option<JsonValue>,
    },

    // Managed NoSQL verbs
    GetItem {
        key: JsonValue,
    },
    #[serde(rename_all = "camelCase")]
    PutItem {
        item: JsonValue,
        #[serde(default)]
        condition_expression: Option<String>,
        #[serde(default)]
        expression_attribute_names: Option<HashMap<String, String>>,
        #[serde(default)]
        expression_attribute_values: Option<JsonValue>,
    },
    #[serde(rename_all = "camelCase")]
    UpdateItem {
        key: JsonValue,
        update_expression: String,
        #[serde(default)]
        condition_expression: Option<String>,
        #[serde(default)]
        expression_attribute_names: Option<HashMap<String, String>>,
        #[serde(default)]
        expression_attribute_values: Option<JsonValue>,
    },
    #[serde(rename_all = "camelCase")]
    DeleteItem {
        key: JsonValue,
        #[serde(default)]
        condition_expression: Option<String>,
        #[serde(default)]
        expression_attribute_names: Option<HashMap<String, String>>,
        #[serde(default)]
        expression_attribute_values: Option<JsonValue>,
    },
    #[serde(rename_all = "camelCase")]
    Query {
        key_condition_expression: String,
        #[serde(default)]
        filter_expression: Option<String>,
        #[serde(default)]
        expression_attribute_names: Option<HashMap<String, String>>,
        #[serde(default)]
        expression_attribute_values: Option<JsonValue>,
        #[serde(default)]
        index_name: Option<String>,
        #[serde(default)]
        limit: Option<i32>,
        #[serde(default)]
        scan_index_forward: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    Scan {
        #[serde(default)]
        filter_expression: Option<String>,
        #[serde(default)]
        expression_attribute_names: Option<HashMap<String, String>>,
        #[serde(default)]
        expression_attribute_values: Option<JsonValue>,
        #[serde(default)]
        index_name: Option<String>,
        #[serde(default)]
        limit: Option<i32>,
    },
}

impl CommandAction {
    /// Verb name as it appears in the `operation` field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Find { .. } => "find",
            Self::FindOne { .. } => "findOne",
            Self::InsertOne { .. } => "insertOne",
            Self::InsertMany { .. } => "insertMany",
            Self::UpdateOne { .. } => "updateOne",
            Self::UpdateMany { .. } => "updateMany",
            Self::DeleteOne { .. } => "deleteOne",
            Self::DeleteMany { .. } => "deleteMany",
            Self::Aggregate { .. } => "aggregate",
            Self::CountDocuments { .. } => "countDocuments",
            Self::Distinct { .. } => "distinct",
            Self::GetItem { .. } => "getItem",
            Self::PutItem { .. } => "putItem",
            Self::UpdateItem { .. } => "updateItem",
            Self::DeleteItem { .. } => "deleteItem",
            Self::Query { .. } => "query",
            Self::Scan { .. } => "scan",
        }
    }
}

/// One query or command handed to an adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    Native {
        query: String,
        params: Vec<QueryParam>,
    },
    Command(Command),
}

impl QueryInput {
    /// Native query text without parameters.
    pub fn native(query: impl Into<String>) -> Self {
        Self::Native {
            query: query.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(query: impl Into<String>, params: Vec<QueryParam>) -> Self {
        Self::Native {
            query: query.into(),
            params,
        }
    }

    pub fn command(command: Command) -> Self {
        Self::Command(command)
    }

    /// Borrow the native text and params, rejecting structured commands.
    pub fn as_native(&self, backend: &str) -> DbResult<(&str, &[QueryParam])> {
        match self {
            Self::Native { query, params } => Ok((query.as_str(), params.as_slice())),
            Self::Command(cmd) => Err(DbError::invalid_input(format!(
                "{backend} expects a query string, got a '{}' command",
                cmd.action.name()
            ))),
        }
    }

    /// Resolve a structured command, parsing native text as a JSON-encoded command.
    pub fn to_command(&self, backend: &str) -> DbResult<Cow<'_, Command>> {
        match self {
            Self::Command(cmd) => Ok(Cow::Borrowed(cmd)),
            Self::Native { query, .. } => serde_json::from_str::<Command>(query)
                .map(Cow::Owned)
                .map_err(|e| {
                    DbError::invalid_input(format!(
                        "{backend} expects a JSON command object with 'collection' and 'operation' fields: {e}"
                    ))
                }),
        }
    }
}

impl From<Command> for QueryInput {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

/// Descriptor for one result field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldInfo {
    pub name: String,
    /// Declared type, or inferred JSON type for schemaless backends
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<JsonValue>,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: None,
            default_value: None,
        }
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}

/// Normalized result of one query or command.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QueryResult {
    pub rows: Vec<Map<String, JsonValue>>,
    /// Rows returned, or rows affected for writes
    pub row_count: u64,
    pub fields: Vec<FieldInfo>,
}

impl QueryResult {
    /// Result for a statement that returned rows.
    pub fn from_rows(rows: Vec<Map<String, JsonValue>>, fields: Vec<FieldInfo>) -> Self {
        Self {
            row_count: rows.len() as u64,
            rows,
            fields,
        }
    }

    /// Result for rows without declared metadata; field descriptors are inferred.
    pub fn inferred(rows: Vec<Map<String, JsonValue>>) -> Self {
        let fields = infer_fields(&rows);
        Self::from_rows(rows, fields)
    }

    /// Result for a write that returned no rows.
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows: Vec::new(),
            row_count: rows_affected,
            fields: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.row_count == 0
    }
}

/// Outcome of `execute_batch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BatchOutcome {
    pub results: Vec<QueryResult>,
    /// False when the backend only emulates transactions, so a failed batch was not undone
    pub atomic: bool,
}

/// Infer field descriptors from the keys of JSON rows, in first-seen order.
pub fn infer_fields(rows: &[Map<String, JsonValue>]) -> Vec<FieldInfo> {
    let mut fields: Vec<FieldInfo> = Vec::new();
    for row in rows {
        for (key, value) in row {
            match fields.iter_mut().find(|f| &f.name == key) {
                Some(field) => {
                    if value.is_null() {
                        field.nullable = Some(true);
                    } else if field.data_type == "null" {
                        field.data_type = json_type_name(value).to_string();
                    }
                }
                None => {
                    fields.push(FieldInfo::new(key.clone(), json_type_name(value)).with_nullable(value.is_null()));
                }
            }
        }
    }
    fields
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => "integer",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
