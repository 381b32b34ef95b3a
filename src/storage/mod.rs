//! Persistence for query history and saved visualizations.
//!
//! Two interchangeable backends implement [`Storage`]: an in-process map
//! ([`memory::MemStorage`]) and tables in the DuckDB database
//! ([`duckdb_store::DuckDbStorage`]). Updates are last-write-wins.

pub mod duckdb_store;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Engine(#[from] duckdb::Error),
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRecord {
    pub id: String,
    pub natural_language: String,
    pub sql_query: String,
    pub title: Option<String>,
    pub results: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub is_saved: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuery {
    pub natural_language: String,
    #[serde(default)]
    pub sql_query: String,
    pub title: Option<String>,
}

/// Partial update; absent fields are left untouched. `title` and `results`
/// distinguish an explicit `null` (clear) from a missing key.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryUpdate {
    pub natural_language: Option<String>,
    pub sql_query: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub title: Option<Option<String>>,
    #[serde(deserialize_with = "nullable")]
    pub results: Option<Option<Value>>,
    pub is_saved: Option<bool>,
}

// Only called when the key is present, so `null` becomes `Some(None)`.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl QueryUpdate {
    pub fn apply(self, record: &mut QueryRecord) {
        if let Some(natural_language) = self.natural_language {
            record.natural_language = natural_language;
        }
        if let Some(sql_query) = self.sql_query {
            record.sql_query = sql_query;
        }
        if let Some(title) = self.title {
            record.title = title;
        }
        if let Some(results) = self.results {
            record.results = results;
        }
        if let Some(is_saved) = self.is_saved {
            record.is_saved = is_saved;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "bar" => Some(ChartType::Bar),
            "line" => Some(ChartType::Line),
            "pie" => Some(ChartType::Pie),
            "scatter" => Some(ChartType::Scatter),
            _ => None,
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    pub id: String,
    pub query_id: String,
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub shareable_id: String,
    pub created_at: DateTime<Utc>,
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    400
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVisualization {
    pub query_id: String,
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl NewVisualization {
    /// Checks what deserialization alone cannot.
    pub fn validate(&self) -> Result<(), String> {
        if self.query_id.trim().is_empty() {
            return Err("queryId is required".to_string());
        }
        if self.width == 0 || self.height == 0 {
            return Err("width and height must be positive".to_string());
        }
        Ok(())
    }
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn new_shareable_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

// Microsecond precision, which both backends store losslessly.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn build_query(new: NewQuery) -> QueryRecord {
    QueryRecord {
        id: new_id(),
        natural_language: new.natural_language,
        sql_query: new.sql_query,
        title: new.title,
        results: None,
        created_at: now(),
        is_saved: false,
    }
}

pub(crate) fn build_visualization(new: NewVisualization) -> Visualization {
    Visualization {
        id: new_id(),
        query_id: new.query_id,
        chart_type: new.chart_type,
        x_axis: new.x_axis,
        y_axis: new.y_axis,
        title: new.title,
        width: new.width,
        height: new.height,
        shareable_id: new_shareable_id(),
        created_at: now(),
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn create_query(&self, query: NewQuery) -> Result<QueryRecord, StorageError>;
    async fn get_query(&self, id: &str) -> Result<Option<QueryRecord>, StorageError>;
    /// Newest first.
    async fn list_queries(&self) -> Result<Vec<QueryRecord>, StorageError>;
    async fn update_query(
        &self,
        id: &str,
        update: QueryUpdate,
    ) -> Result<Option<QueryRecord>, StorageError>;
    async fn delete_query(&self, id: &str) -> Result<bool, StorageError>;
    /// Newest first.
    async fn saved_queries(&self) -> Result<Vec<QueryRecord>, StorageError>;

    async fn create_visualization(
        &self,
        viz: NewVisualization,
    ) -> Result<Visualization, StorageError>;
    async fn get_visualization(&self, id: &str) -> Result<Option<Visualization>, StorageError>;
    async fn visualizations_for_query(
        &self,
        query_id: &str,
    ) -> Result<Vec<Visualization>, StorageError>;
    async fn visualization_by_shareable_id(
        &self,
        shareable_id: &str,
    ) -> Result<Option<Visualization>, StorageError>;
    async fn delete_visualization(&self, id: &str) -> Result<bool, StorageError>;
}

/// Deletes every query that is not saved, one concurrent delete per record.
///
/// There is no rollback: if some deletes fail the others still happen, and
/// the first failure observed is returned.
pub async fn clear_history(storage: Arc<dyn Storage>) -> Result<usize, StorageError> {
    let queries = storage.list_queries().await?;

    let mut deletes = JoinSet::new();
    for query in queries.into_iter().filter(|q| !q.is_saved) {
        let storage = Arc::clone(&storage);
        deletes.spawn(async move { storage.delete_query(&query.id).await });
    }

    let mut deleted = 0;
    let mut first_error = None;
    while let Some(joined) = deletes.join_next().await {
        match joined {
            Ok(Ok(true)) => deleted += 1,
            Ok(Ok(false)) => {}
            Ok(Err(e)) => {
                error!("Failed to delete query during history clear: {}", e);
                first_error.get_or_insert(e);
            }
            Err(join_err) => {
                error!("History clear task failed: {}", join_err);
                first_error.get_or_insert(StorageError::Join(join_err));
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    info!("Cleared {} queries from history", deleted);
    Ok(deleted)
}
