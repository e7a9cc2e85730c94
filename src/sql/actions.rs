use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::{split_statements, DataSource, QueryResult};
use crate::actions::TestAction;
use crate::context::TestContext;
use crate::error::{CitrusError, CitrusResult};
use crate::validation::matcher;

/// Control value for SQL `NULL`
const NULL_VALUE: &str = "NULL";

/// Statements given inline plus an optional script file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SqlStatements {
    /// Name of the data source, may be omitted when only one is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_source: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
    /// Path of a SQL script file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
}

impl SqlStatements {
    fn data_source(&self, context: &TestContext) -> CitrusResult<Arc<DataSource>> {
        let name = match &self.data_source {
            Some(name) => Some(context.replace_dynamic_content(name)?),
            None => None,
        };
        context.references().resolve_optional_name::<DataSource>(name.as_deref())
    }

    fn resolve(&self, context: &TestContext) -> CitrusResult<Vec<String>> {
        let mut statements = Vec::new();
        if let Some(resource) = &self.resource {
            let path = context.replace_dynamic_content(resource)?;
            let script = std::fs::read_to_string(&path)
                .map_err(|e| CitrusError::runtime(format!("Failed to read SQL script '{}': {}", path, e)))?;
            statements.extend(split_statements(&script));
        }
        statements.extend(self.statements.iter().cloned());

        let statements = statements
            .iter()
            .map(|statement| context.replace_dynamic_content(statement.trim().trim_end_matches(';')))
            .collect::<CitrusResult<Vec<_>>>()?;
        if statements.is_empty() {
            return Err(CitrusError::config_invalid("sql", "no SQL statements given"));
        }
        Ok(statements)
    }
}

/// Executes update statements
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteSqlAction {
    #[serde(flatten)]
    pub sql: SqlStatements,
    #[serde(default)]
    pub transaction: bool,
    #[serde(default)]
    pub ignore_errors: bool,
}

#[async_trait]
impl TestAction for ExecuteSqlAction {
    fn name(&self) -> &str {
        "sql"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let data_source = self.sql.data_source(context)?;
        let statements = self.sql.resolve(context)?;
        info!(data_source = %data_source.name(), count = statements.len(), "Executing SQL statements");

        let executed = data_source
            .execute(statements, self.transaction, self.ignore_errors)
            .await?;
        info!("SQL statements execution successful ({} statements)", executed);
        Ok(())
    }
}

/// Expected values of a result column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ColumnValidation {
    pub column: String,
    /// Expected value per row; `NULL` expects a null value
    pub values: Vec<String>,
}

/// Column value of the first row to store in a variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ColumnExtract {
    pub column: String,
    pub variable: String,
}

/// Runs queries, validates the result columns and extracts values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SqlQueryAction {
    #[serde(flatten)]
    pub sql: SqlStatements,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate: Vec<ColumnValidation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extract: Vec<ColumnExtract>,
}

impl SqlQueryAction {
    fn validate_column(&self, result: &QueryResult, validation: &ColumnValidation, context: &TestContext) -> CitrusResult<()> {
        let column = context.replace_dynamic_content(&validation.column)?;
        let values = result.column(&column).ok_or_else(|| {
            CitrusError::validation(format!(
                "Could not find column '{}' in SQL result set, available columns: {}",
                column,
                result.columns.join(", ")
            ))
        })?;

        if values.len() != validation.values.len() {
            return Err(CitrusError::validation(format!(
                "Validation failed for column: '{}' expected rows count: {} but was {}",
                column,
                validation.values.len(),
                values.len()
            )));
        }

        for (received, control) in values.iter().zip(&validation.values) {
            match received {
                None if control.trim() == NULL_VALUE => {}
                None => {
                    return Err(CitrusError::validation(format!(
                        "Values not equal for column '{}', expected '{}' but was 'NULL'",
                        column, control
                    )))
                }
                Some(received) => matcher::validate_value(&column, received, control, context)?,
            }
        }
        debug!(column = %column, "Validating database value: OK");
        Ok(())
    }
}

#[async_trait]
impl TestAction for SqlQueryAction {
    fn name(&self) -> &str {
        "sql-query"
    }

    async fn execute(&self, context: &TestContext) -> CitrusResult<()> {
        let data_source = self.sql.data_source(context)?;

        let mut result = QueryResult::default();
        for statement in self.sql.resolve(context)? {
            info!(data_source = %data_source.name(), statement = %statement, "Executing SQL query");
            let rows = data_source.query(statement).await?;
            merge(&mut result, rows);
        }
        debug!(columns = ?result.columns, rows = result.rows.len(), "SQL query result");

        for validation in &self.validate {
            self.validate_column(&result, validation, context)?;
        }

        for extract in &self.extract {
            let value = result
                .column(&extract.column)
                .and_then(|values| values.into_iter().next())
                .ok_or_else(|| {
                    CitrusError::runtime(format!(
                        "Failed to extract column '{}' from empty SQL result set",
                        extract.column
                    ))
                })?
                .unwrap_or_else(|| NULL_VALUE.to_string());
            info!("Setting variable: {} to value: {}", extract.variable, value);
            context.set_variable(&extract.variable, value)?;
        }

        info!("SQL query validation successful: All values OK");
        Ok(())
    }
}

/// Add the columns of another query; rows are joined by position
fn merge(result: &mut QueryResult, other: QueryResult) {
    if result.columns.is_empty() {
        *result = other;
        return;
    }

    let rows = result.rows.len().max(other.rows.len());
    result.rows.resize(rows, vec![None; result.columns.len()]);
    let width = other.columns.len();
    for (index, row) in result.rows.iter_mut().enumerate() {
        match other.rows.get(index) {
            Some(values) => row.extend(values.iter().cloned()),
            None => row.extend(std::iter::repeat(None).take(width)),
        }
    }
    result.columns.extend(other.columns);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::DataSourceConfig;

    async fn setup() -> TestContext {
        let context = TestContext::new();
        let data_source = DataSource::open(DataSourceConfig::new("orderDb", ":memory:")).unwrap();
        context.references().bind("orderDb", Arc::new(data_source));
        context.set_variable("item", "tea").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("schema.sql");
        std::fs::write(
            &script,
            "-- orders\nCREATE TABLE orders (id INTEGER, item TEXT, note TEXT);\nINSERT INTO orders VALUES (1, 'coffee', NULL);\n",
        )
        .unwrap();

        ExecuteSqlAction {
            sql: SqlStatements {
                data_source: None,
                statements: vec!["INSERT INTO orders VALUES (2, '${item}', 'fast')".to_string()],
                resource: Some(script.display().to_string()),
            },
            transaction: true,
            ignore_errors: false,
        }
        .execute(&context)
        .await
        .unwrap();
        context
    }

    #[tokio::test]
    async fn test_query_validation_and_extract() {
        let context = setup().await;
        let action: SqlQueryAction = serde_yaml::from_str(
            r#"
dataSource: orderDb
statements:
  - SELECT id, item, note FROM orders ORDER BY id
validate:
  - column: ITEM
    values: ["coffee", "@startsWith('t')@"]
  - column: note
    values: ["NULL", "fast"]
extract:
  - column: item
    variable: firstItem
"#,
        )
        .unwrap();
        action.execute(&context).await.unwrap();
        assert_eq!(context.get_variable("firstItem").unwrap(), "coffee");
    }

    #[tokio::test]
    async fn test_query_validation_failure() {
        let context = setup().await;
        let action = SqlQueryAction {
            sql: SqlStatements {
                data_source: Some("orderDb".to_string()),
                statements: vec!["SELECT item FROM orders WHERE id = 1".to_string()],
                resource: None,
            },
            validate: vec![ColumnValidation {
                column: "item".to_string(),
                values: vec!["tea".to_string()],
            }],
            extract: vec![],
        };
        assert!(matches!(action.execute(&context).await, Err(CitrusError::Validation(_))));
    }

    #[test]
    fn test_merge_results() {
        let mut result = QueryResult::default();
        merge(
            &mut result,
            QueryResult {
                columns: vec!["A".to_string()],
                rows: vec![vec![Some("1".to_string())], vec![Some("2".to_string())]],
            },
        );
        merge(
            &mut result,
            QueryResult {
                columns: vec!["B".to_string()],
                rows: vec![vec![Some("x".to_string())]],
            },
        );
        assert_eq!(result.column("b"), Some(vec![Some("x".to_string()), None]));
    }
}
