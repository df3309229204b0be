use serde::{Deserialize, Serialize};

use crate::catalog::SchemaCatalog;
use crate::errors::InvalidSchemaReference;

/// The `query_database` tool payload: which columns to read from which
/// table, filtered by AND-joined conditions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryDescriptor {
    pub table_name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub order_by: Option<SortDirection>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub column: String,
    pub operator: String,
    pub value: ConditionValue,
}

/// Scalar comparison value or a reference to another whitelisted column.
///
/// Untagged: a JSON object with `column_name` is a column reference,
/// anything else is a scalar. Variant order matters for deserialization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    ColumnRef { column_name: String },
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// A positional SQL parameter produced by compilation. Column references
/// are interpolated into the SQL text and never appear here.
#[derive(Clone, Debug, PartialEq)]
pub enum ScalarValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<ScalarValue>,
}

/// Compiles descriptors into parameterized SQL. Pure: validation and text
/// assembly only, no database access.
///
/// Every identifier is checked against the catalog before any SQL text is
/// assembled, so a rejected descriptor never produces a query string.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryBuilder {
    catalog: SchemaCatalog,
}

impl QueryBuilder {
    pub fn new(catalog: SchemaCatalog) -> Self {
        Self { catalog }
    }

    pub fn compile(&self, descriptor: &QueryDescriptor) -> Result<CompiledQuery, InvalidSchemaReference> {
        self.validate(descriptor)?;

        let select_clause = descriptor.columns.join(", ");
        let mut sql = format!("SELECT {select_clause} FROM {}", descriptor.table_name);

        let mut clauses: Vec<String> = Vec::new();
        let mut params: Vec<ScalarValue> = Vec::new();
        for condition in &descriptor.conditions {
            match &condition.value {
                ConditionValue::ColumnRef { column_name } => {
                    clauses.push(format!(
                        "{} {} {column_name}",
                        condition.column, condition.operator
                    ));
                }
                ConditionValue::Text(text) => {
                    clauses.push(placeholder_clause(condition));
                    params.push(ScalarValue::Text(text.clone()));
                }
                ConditionValue::Number(number) => {
                    clauses.push(placeholder_clause(condition));
                    params.push(number_param(number));
                }
                ConditionValue::Bool(flag) => {
                    clauses.push(placeholder_clause(condition));
                    params.push(ScalarValue::Bool(*flag));
                }
            }
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if let Some(direction) = descriptor.order_by {
            if let Some(first_column) = descriptor.columns.first() {
                sql.push_str(&format!(" ORDER BY {first_column} {}", direction.as_sql()));
            }
        }

        Ok(CompiledQuery { sql, params })
    }

    fn validate(&self, descriptor: &QueryDescriptor) -> Result<(), InvalidSchemaReference> {
        if !self.catalog.is_table(&descriptor.table_name) {
            return Err(InvalidSchemaReference::UnknownTable(descriptor.table_name.clone()));
        }

        for column in &descriptor.columns {
            if !self.catalog.is_column(column) {
                return Err(InvalidSchemaReference::UnknownColumn(column.clone()));
            }
        }

        for condition in &descriptor.conditions {
            if !self.catalog.is_column(&condition.column) {
                return Err(InvalidSchemaReference::UnknownColumn(condition.column.clone()));
            }
            if !self.catalog.is_operator(&condition.operator) {
                return Err(InvalidSchemaReference::UnknownOperator(condition.operator.clone()));
            }
            if let ConditionValue::ColumnRef { column_name } = &condition.value {
                if !self.catalog.is_column(column_name) {
                    return Err(InvalidSchemaReference::UnknownColumn(column_name.clone()));
                }
            }
        }

        Ok(())
    }
}

fn placeholder_clause(condition: &Condition) -> String {
    format!("{} {} ?", condition.column, condition.operator)
}

fn number_param(number: &serde_json::Number) -> ScalarValue {
    match number.as_i64() {
        Some(integer) => ScalarValue::Integer(integer),
        None => ScalarValue::Float(number.as_f64().unwrap_or_default()),
    }
}
