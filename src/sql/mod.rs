//! SQL data sources backed by SQLite.

pub mod actions;

use base64::Engine;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{CitrusError, CitrusResult};

pub use actions::{ColumnExtract, ColumnValidation, ExecuteSqlAction, SqlQueryAction};

const IN_MEMORY_URL: &str = ":memory:";

/// Configuration of a named data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    pub name: String,
    /// Database file path or `:memory:`
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    IN_MEMORY_URL.to_string()
}

impl DataSourceConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Rows of a query; column names are upper case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl QueryResult {
    /// Values of a column, the name is matched case-insensitively
    pub fn column(&self, name: &str) -> Option<Vec<Option<String>>> {
        let index = self
            .columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))?;
        Some(self.rows.iter().map(|row| row.get(index).cloned().flatten()).collect())
    }

    /// Column name to values of all rows
    pub fn to_column_map(&self) -> BTreeMap<String, Vec<Option<String>>> {
        self.columns
            .iter()
            .filter_map(|column| self.column(column).map(|values| (column.clone(), values)))
            .collect()
    }
}

/// A SQLite database shared by the SQL actions of all tests.
///
/// `rusqlite::Connection` is not `Sync`, so all access goes through a mutex
/// on a blocking thread.
pub struct DataSource {
    config: DataSourceConfig,
    connection: Arc<Mutex<Connection>>,
}

impl DataSource {
    pub fn open(config: DataSourceConfig) -> CitrusResult<Self> {
        let connection = if config.url == IN_MEMORY_URL {
            Connection::open_in_memory()
        } else {
            Connection::open(&config.url)
        }
        .map_err(|e| CitrusError::runtime(format!("Failed to open data source '{}': {}", config.name, e)))?;

        info!(data_source = %config.name, url = %config.url, "Data source opened");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    async fn with_connection<T, F>(&self, operation: F) -> CitrusResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> CitrusResult<T> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| CitrusError::runtime("Data source connection lock poisoned"))?;
            operation(&mut guard)
        })
        .await
        .map_err(|e| CitrusError::runtime(format!("SQL task failed: {}", e)))?
    }

    /// Run statements, optionally in one transaction. With `ignore_errors`
    /// failing statements are logged and skipped.
    pub async fn execute(&self, statements: Vec<String>, transaction: bool, ignore_errors: bool) -> CitrusResult<usize> {
        let name = self.config.name.clone();
        self.with_connection(move |connection| {
            let run = |connection: &Connection| -> CitrusResult<usize> {
                let mut executed = 0;
                for statement in &statements {
                    debug!(data_source = %name, statement = %statement, "Executing SQL statement");
                    match connection.execute(statement, []) {
                        Ok(rows) => {
                            debug!(rows, "SQL statement executed");
                            executed += 1;
                        }
                        Err(e) if ignore_errors => {
                            warn!(statement = %statement, error = %e, "Ignoring error while executing SQL statement");
                        }
                        Err(e) => {
                            return Err(CitrusError::runtime(format!(
                                "Failed to execute SQL statement '{}': {}",
                                statement, e
                            )))
                        }
                    }
                }
                Ok(executed)
            };

            if transaction {
                let tx = connection.transaction()?;
                match run(&*tx) {
                    Ok(executed) => {
                        tx.commit()?;
                        Ok(executed)
                    }
                    Err(e) => {
                        warn!(data_source = %name, "Rolling back SQL transaction");
                        tx.rollback()?;
                        Err(e)
                    }
                }
            } else {
                run(connection)
            }
        })
        .await
    }

    /// Run a query and collect all rows as text
    pub async fn query(&self, statement: String) -> CitrusResult<QueryResult> {
        self.with_connection(move |connection| {
            debug!(statement = %statement, "Executing SQL query");
            let mut prepared = connection.prepare(&statement).map_err(|e| {
                CitrusError::runtime(format!("Failed to prepare SQL query '{}': {}", statement, e))
            })?;

            let columns: Vec<String> = prepared
                .column_names()
                .into_iter()
                .map(|name| name.to_ascii_uppercase())
                .collect();
            let column_count = columns.len();

            let mut rows = Vec::new();
            let mut cursor = prepared.query([])?;
            while let Some(row) = cursor.next()? {
                let mut values = Vec::with_capacity(column_count);
                for index in 0..column_count {
                    values.push(value_to_text(row.get_ref(index)?));
                }
                rows.push(values);
            }

            Ok(QueryResult { columns, rows })
        })
        .await
    }
}

fn value_to_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(number) => Some(number.to_string()),
        ValueRef::Real(number) => Some(number.to_string()),
        ValueRef::Text(text) => Some(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(bytes) => Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
    }
}

/// Split a SQL script into statements; a statement ends with `;` at the end
/// of a line and lines starting with `--` are comments
pub fn split_statements(script: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in script.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }

        if !current.is_empty() {
            current.push(' ');
        }
        match trimmed.strip_suffix(';') {
            Some(statement) => {
                current.push_str(statement.trim_end());
                statements.push(std::mem::take(&mut current));
            }
            None => current.push_str(trimmed),
        }
    }

    if !current.trim().is_empty() {
        statements.push(current);
    }
    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements() {
        let script = "-- schema\nCREATE TABLE orders (\n  id INTEGER,\n  name TEXT\n);\n\nINSERT INTO orders VALUES (1, 'a;b');\nDELETE FROM orders";
        assert_eq!(
            split_statements(script),
            vec![
                "CREATE TABLE orders ( id INTEGER, name TEXT )",
                "INSERT INTO orders VALUES (1, 'a;b')",
                "DELETE FROM orders",
            ]
        );
    }

    #[tokio::test]
    async fn test_execute_and_query() {
        let data_source = DataSource::open(DataSourceConfig::new("db", ":memory:")).unwrap();
        data_source
            .execute(
                vec![
                    "CREATE TABLE orders (id INTEGER, name TEXT, note TEXT)".to_string(),
                    "INSERT INTO orders VALUES (1, 'coffee', NULL)".to_string(),
                ],
                false,
                false,
            )
            .await
            .unwrap();

        let result = data_source.query("SELECT * FROM orders".to_string()).await.unwrap();
        assert_eq!(result.columns, vec!["ID", "NAME", "NOTE"]);
        assert_eq!(result.column("name"), Some(vec![Some("coffee".to_string())]));
        assert_eq!(result.column("note"), Some(vec![None]));
    }

    #[tokio::test]
    async fn test_transaction_rollback() {
        let data_source = DataSource::open(DataSourceConfig::new("db", ":memory:")).unwrap();
        data_source
            .execute(vec!["CREATE TABLE t (id INTEGER)".to_string()], false, false)
            .await
            .unwrap();

        let result = data_source
            .execute(
                vec!["INSERT INTO t VALUES (1)".to_string(), "INSERT INTO missing VALUES (2)".to_string()],
                true,
                false,
            )
            .await;
        assert!(result.is_err());

        let rows = data_source.query("SELECT COUNT(*) AS total FROM t".to_string()).await.unwrap();
        assert_eq!(rows.column("TOTAL"), Some(vec![Some("0".to_string())]));

        let executed = data_source
            .execute(vec!["INSERT INTO missing VALUES (2)".to_string()], false, true)
            .await
            .unwrap();
        assert_eq!(executed, 0);
    }
}
