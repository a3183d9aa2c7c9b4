//! Schema descriptors produced by introspection.
//!
//! Relational backends fill these from their catalogs. Schemaless backends populate a
//! best-effort subset discovered from sampled data or key layout.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Descriptor for one table, view or collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table_type: TableType,
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub constraints: Vec<ConstraintInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            schema: None,
            table_type,
            columns: Vec::new(),
            indexes: Vec::new(),
            constraints: Vec::new(),
            row_count: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_columns(mut self, columns: Vec<ColumnInfo>) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_indexes(mut self, indexes: Vec<IndexInfo>) -> Self {
        self.indexes = indexes;
        self
    }

    pub fn with_constraints(mut self, constraints: Vec<ConstraintInfo>) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn with_row_count(mut self, row_count: u64) -> Self {
        self.row_count = Some(row_count);
        self
    }

    /// Mark primary/foreign key columns from the collected constraints.
    pub fn apply_key_flags(mut self) -> Self {
        for constraint in &self.constraints {
            for column in self
                .columns
                .iter_mut()
                .filter(|c| constraint.columns.contains(&c.name))
            {
                match constraint.kind {
                    ConstraintKind::PrimaryKey => column.is_primary_key = true,
                    ConstraintKind::ForeignKey => column.is_foreign_key = true,
                    _ => {}
                }
            }
        }
        self
    }

    /// Get the fully qualified table name.
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Type of table object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
    MaterializedView,
}

impl TableType {
    /// Parse table type from a catalog string; unknown values are tables.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "view" => Self::View,
            "materialized view" | "matview" | "materialized_view" => Self::MaterializedView,
            _ => Self::Table,
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
            Self::MaterializedView => write!(f, "materialized_view"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<i64>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
            is_foreign_key: false,
            max_length: None,
            precision: None,
            scale: None,
        }
    }

    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the default value from a catalog string, typed by the column's data type.
    pub fn with_default_str(mut self, default_str: &str) -> Self {
        self.default_value = Some(parse_default_value(default_str, &self.data_type));
        self
    }

    pub fn with_length(mut self, max_length: Option<i64>) -> Self {
        self.max_length = max_length;
        self
    }

    pub fn with_precision(mut self, precision: Option<i64>, scale: Option<i64>) -> Self {
        self.precision = precision;
        self.scale = scale;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    /// BTREE, HASH, GIN, GSI, LSI, etc.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_type: Option<String>,
}

impl IndexInfo {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
            index_type: None,
        }
    }

    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    pub fn with_type(mut self, index_type: impl Into<String>) -> Self {
        self.index_type = Some(index_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

impl ConstraintKind {
    /// Parse an information_schema `CONSTRAINT_TYPE` value.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PRIMARY KEY" => Some(Self::PrimaryKey),
            "FOREIGN KEY" => Some(Self::ForeignKey),
            "UNIQUE" => Some(Self::Unique),
            "CHECK" => Some(Self::Check),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConstraintInfo {
    pub name: String,
    pub kind: ConstraintKind,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub referenced_columns: Vec<String>,
}

impl ConstraintInfo {
    pub fn new(name: impl Into<String>, kind: ConstraintKind, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            columns,
            referenced_table: None,
            referenced_columns: Vec::new(),
        }
    }

    pub fn with_reference(mut self, table: impl Into<String>, columns: Vec<String>) -> Self {
        self.referenced_table = Some(table.into());
        self.referenced_columns = columns;
        self
    }
}

/// Fold `(constraint, kind, column, referenced table, referenced column)` catalog rows into
/// constraint descriptors, preserving first-seen order.
pub fn group_constraints<I>(rows: I) -> Vec<ConstraintInfo>
where
    I: IntoIterator<Item = (String, ConstraintKind, String, Option<String>, Option<String>)>,
{
    let mut constraints: Vec<ConstraintInfo> = Vec::new();
    for (name, kind, column, ref_table, ref_column) in rows {
        let idx = match constraints.iter().position(|c| c.name == name) {
            Some(idx) => idx,
            None => {
                constraints.push(ConstraintInfo::new(name, kind, Vec::new()));
                constraints.len() - 1
            }
        };
        let constraint = &mut constraints[idx];
        if !constraint.columns.contains(&column) {
            constraint.columns.push(column);
        }
        if let Some(table) = ref_table {
            constraint.referenced_table = Some(table);
        }
        if let Some(ref_column) = ref_column {
            if !constraint.referenced_columns.contains(&ref_column) {
                constraint.referenced_columns.push(ref_column);
            }
        }
    }
    constraints
}

/// Aggregate statistics for one database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseStats {
    pub table_count: u64,
    pub view_count: u64,
    pub index_count: u64,
    /// Human-readable; units differ by backend
    pub size: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_count: Option<u64>,
}

impl DatabaseStats {
    pub fn new(table_count: u64, view_count: u64, index_count: u64, size: impl Into<String>) -> Self {
        Self {
            table_count,
            view_count,
            index_count,
            size: size.into(),
            connection_count: None,
        }
    }

    pub fn with_connections(mut self, count: u64) -> Self {
        self.connection_count = Some(count);
        self
    }
}

/// Format a byte count as a human-readable size string.
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::DECIMAL)
}

/// Parse a default value string into the appropriate JSON type based on column data type.
///
/// - Integer types → JSON Number
/// - Float types → JSON Number
/// - Boolean types → JSON Boolean
/// - JSON/JSONB types → Parsed JSON value
/// - Everything else (decimal, strings, expressions) → JSON String
pub fn parse_default_value(default_str: &str, data_type: &str) -> serde_json::Value {
    let dt_lower = data_type.to_lowercase();

    if dt_lower.contains("int") || dt_lower.contains("serial") {
        if let Ok(n) = default_str.parse::<i64>() {
            return serde_json::Value::Number(n.into());
        }
    }

    if dt_lower.contains("float") || dt_lower.contains("double") || dt_lower == "real" {
        if let Some(num) = default_str
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return serde_json::Value::Number(num);
        }
    }

    if dt_lower.contains("bool") || dt_lower == "bit" {
        match default_str.trim_matches(['(', ')']).to_lowercase().as_str() {
            "true" | "1" | "t" => return serde_json::Value::Bool(true),
            "false" | "0" | "f" => return serde_json::Value::Bool(false),
            _ => {}
        }
    }

    if dt_lower == "json" || dt_lower == "jsonb" {
        if let Ok(parsed) = serde_json::from_str(default_str) {
            return parsed;
        }
    }

    serde_json::Value::String(default_str.to_string())
}
