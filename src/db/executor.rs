use arrow::json::writer::JsonArray;
use arrow::json::WriterBuilder;
use arrow::record_batch::RecordBatch;
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::{schema, DbError, DbPool};

/// One result row, keyed by column name in select-list order.
pub type Row = Map<String, Value>;

/// Uniform shape returned for every executed statement.
///
/// A failed execution carries only `success` and `error`; a successful one
/// always has `row_count == data.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<Row>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryExecutionResult {
    pub fn rows(data: Vec<Row>, execution_time: u64) -> Self {
        let columns = data
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();

        Self {
            success: true,
            row_count: Some(data.len()),
            columns: Some(columns),
            data: Some(data),
            execution_time: Some(execution_time),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Unknown database error".to_string();
        }

        Self {
            success: false,
            data: None,
            columns: None,
            row_count: None,
            execution_time: None,
            error: Some(message),
        }
    }
}

const ROW_PRODUCING: [&str; 13] = [
    "SELECT", "WITH", "VALUES", "SHOW", "DESCRIBE", "PRAGMA", "EXPLAIN", "TABLE", "FROM",
    "SUMMARIZE", "PIVOT", "UNPIVOT", "CALL",
];

/// Whether the statement's leading keyword yields a result set.
pub fn returns_rows(sql: &str) -> bool {
    let mut rest = sql.trim_start();
    loop {
        if let Some(stripped) = rest.strip_prefix("--") {
            rest = stripped.split_once('\n').map(|(_, tail)| tail).unwrap_or("").trim_start();
        } else if let Some(stripped) = rest.strip_prefix("/*") {
            rest = stripped.split_once("*/").map(|(_, tail)| tail).unwrap_or("").trim_start();
        } else if let Some(stripped) = rest.strip_prefix('(') {
            rest = stripped.trim_start();
        } else {
            break;
        }
    }

    let keyword: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_uppercase();
    ROW_PRODUCING.contains(&keyword.as_str())
}

/// Runs raw SQL against the shared DuckDB pool.
///
/// The statement is executed as given; callers are responsible for whatever
/// reaches this point.
#[derive(Clone)]
pub struct QueryExecutor {
    pool: DbPool,
}

impl QueryExecutor {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn execute(&self, sql: &str) -> QueryExecutionResult {
        info!("Executing SQL query: {}", sql);

        let pool = self.pool.clone();
        let sql = sql.to_string();
        let task = tokio::task::spawn_blocking(move || -> Result<(Vec<Row>, u64), DbError> {
            let conn = pool.get()?;
            let start_time = Instant::now();
            let rows = run_statement(&conn, &sql)?;
            Ok((rows, start_time.elapsed().as_millis() as u64))
        });

        let outcome = match task.await {
            Ok(result) => result,
            Err(join_err) => Err(DbError::Join(join_err)),
        };

        match outcome {
            Ok((rows, execution_time)) => {
                info!(
                    "Query executed successfully. Row count: {}, Execution time: {}ms",
                    rows.len(),
                    execution_time
                );
                QueryExecutionResult::rows(rows, execution_time)
            }
            Err(e) => {
                warn!("Query failed: {}", e);
                QueryExecutionResult::failure(e.to_string())
            }
        }
    }

    /// Current table definitions, as fed to the translator.
    pub async fn describe_schema(&self) -> Result<String, DbError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<String, DbError> {
            let conn = pool.get()?;
            Ok(schema::describe_schema(&conn)?)
        })
        .await?
    }
}

fn run_statement(conn: &Connection, sql: &str) -> Result<Vec<Row>, DbError> {
    if !returns_rows(sql) {
        debug!("Statement does not produce rows, executing as batch");
        conn.execute_batch(sql)?;
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(sql)?;
    let batches: Vec<RecordBatch> = stmt.query_arrow([])?.collect();
    batches_to_rows(&batches)
}

/// Converts Arrow batches to JSON objects, keeping nulls as explicit keys.
pub fn batches_to_rows(batches: &[RecordBatch]) -> Result<Vec<Row>, DbError> {
    if batches.iter().all(|batch| batch.num_rows() == 0) {
        return Ok(Vec::new());
    }

    let mut writer = WriterBuilder::new()
        .with_explicit_nulls(true)
        .build::<_, JsonArray>(Vec::new());
    let refs: Vec<&RecordBatch> = batches.iter().collect();
    writer.write_batches(&refs)?;
    writer.finish()?;

    let buffer = writer.into_inner();
    Ok(serde_json::from_slice(&buffer)?)
}
