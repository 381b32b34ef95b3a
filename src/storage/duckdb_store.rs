use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duckdb::{params, Connection, OptionalExt, Row};
use tracing::{debug, info};

use super::{
    build_query, build_visualization, ChartType, NewQuery, NewVisualization, QueryRecord,
    QueryUpdate, Storage, StorageError, Visualization,
};
use crate::db::DbPool;

const CREATE_APP_TABLES: &str = r#"
CREATE SCHEMA IF NOT EXISTS app;

CREATE TABLE IF NOT EXISTS app.queries (
    id VARCHAR PRIMARY KEY,
    natural_language VARCHAR NOT NULL,
    sql_query VARCHAR NOT NULL,
    title VARCHAR,
    results VARCHAR,
    created_at VARCHAR NOT NULL,
    is_saved BOOLEAN NOT NULL DEFAULT false
);

CREATE TABLE IF NOT EXISTS app.visualizations (
    id VARCHAR PRIMARY KEY,
    query_id VARCHAR NOT NULL,
    chart_type VARCHAR NOT NULL,
    x_axis VARCHAR NOT NULL,
    y_axis VARCHAR NOT NULL,
    title VARCHAR NOT NULL,
    width BIGINT NOT NULL,
    height BIGINT NOT NULL,
    shareable_id VARCHAR NOT NULL UNIQUE,
    created_at VARCHAR NOT NULL
);
"#;

const QUERY_COLUMNS: &str =
    "id, natural_language, sql_query, title, results, created_at, is_saved";
const VIZ_COLUMNS: &str =
    "id, query_id, chart_type, x_axis, y_axis, title, width, height, shareable_id, created_at";

/// Stores records in the `app` schema of the shared DuckDB database, out of
/// sight of schema introspection.
pub struct DuckDbStorage {
    pool: DbPool,
}

// Columns as read from DuckDB before validation.
struct QueryRow {
    id: String,
    natural_language: String,
    sql_query: String,
    title: Option<String>,
    results: Option<String>,
    created_at: String,
    is_saved: bool,
}

struct VizRow {
    id: String,
    query_id: String,
    chart_type: String,
    x_axis: String,
    y_axis: String,
    title: String,
    width: i64,
    height: i64,
    shareable_id: String,
    created_at: String,
}

impl DuckDbStorage {
    pub fn new(pool: DbPool) -> Result<Self, StorageError> {
        let conn = pool.get()?;
        conn.execute_batch(CREATE_APP_TABLES)?;
        info!("DuckDB storage tables ready");
        Ok(Self { pool })
    }

    /// Runs `f` on a pooled connection off the async runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt(format!("bad timestamp '{}': {}", value, e)))
}

fn read_query_row(row: &Row<'_>) -> duckdb::Result<QueryRow> {
    Ok(QueryRow {
        id: row.get(0)?,
        natural_language: row.get(1)?,
        sql_query: row.get(2)?,
        title: row.get(3)?,
        results: row.get(4)?,
        created_at: row.get(5)?,
        is_saved: row.get(6)?,
    })
}

impl TryFrom<QueryRow> for QueryRecord {
    type Error = StorageError;

    fn try_from(row: QueryRow) -> Result<Self, Self::Error> {
        let results = row
            .results
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(QueryRecord {
            created_at: parse_timestamp(&row.created_at)?,
            id: row.id,
            natural_language: row.natural_language,
            sql_query: row.sql_query,
            title: row.title,
            results,
            is_saved: row.is_saved,
        })
    }
}

fn read_viz_row(row: &Row<'_>) -> duckdb::Result<VizRow> {
    Ok(VizRow {
        id: row.get(0)?,
        query_id: row.get(1)?,
        chart_type: row.get(2)?,
        x_axis: row.get(3)?,
        y_axis: row.get(4)?,
        title: row.get(5)?,
        width: row.get(6)?,
        height: row.get(7)?,
        shareable_id: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl TryFrom<VizRow> for Visualization {
    type Error = StorageError;

    fn try_from(row: VizRow) -> Result<Self, Self::Error> {
        let chart_type = ChartType::parse(&row.chart_type)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown chart type '{}'", row.chart_type)))?;
        let dimension = |value: i64| {
            u32::try_from(value)
                .map_err(|_| StorageError::Corrupt(format!("bad dimension {}", value)))
        };

        Ok(Visualization {
            chart_type,
            width: dimension(row.width)?,
            height: dimension(row.height)?,
            created_at: parse_timestamp(&row.created_at)?,
            id: row.id,
            query_id: row.query_id,
            x_axis: row.x_axis,
            y_axis: row.y_axis,
            title: row.title,
            shareable_id: row.shareable_id,
        })
    }
}

fn load_query(conn: &Connection, id: &str) -> Result<Option<QueryRecord>, StorageError> {
    conn.query_row(
        &format!("SELECT {} FROM app.queries WHERE id = ?", QUERY_COLUMNS),
        [id],
        read_query_row,
    )
    .optional()?
    .map(QueryRecord::try_from)
    .transpose()
}

fn load_queries(conn: &Connection, saved_only: bool) -> Result<Vec<QueryRecord>, StorageError> {
    let filter = if saved_only { "WHERE is_saved" } else { "" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM app.queries {} ORDER BY created_at DESC",
        QUERY_COLUMNS, filter
    ))?;
    let rows = stmt
        .query_map([], read_query_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(QueryRecord::try_from).collect()
}

fn load_visualizations(
    conn: &Connection,
    column: &str,
    value: &str,
) -> Result<Vec<Visualization>, StorageError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM app.visualizations WHERE {} = ? ORDER BY created_at",
        VIZ_COLUMNS, column
    ))?;
    let rows = stmt
        .query_map([value], read_viz_row)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(Visualization::try_from).collect()
}

#[async_trait]
impl Storage for DuckDbStorage {
    async fn create_query(&self, query: NewQuery) -> Result<QueryRecord, StorageError> {
        let record = build_query(query);
        let row = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!("INSERT INTO app.queries ({}) VALUES (?, ?, ?, ?, ?, ?, ?)", QUERY_COLUMNS),
                params![
                    row.id,
                    row.natural_language,
                    row.sql_query,
                    row.title,
                    Option::<String>::None,
                    timestamp(&row.created_at),
                    row.is_saved
                ],
            )?;
            Ok(())
        })
        .await?;
        debug!("Created query {}", record.id);
        Ok(record)
    }

    async fn get_query(&self, id: &str) -> Result<Option<QueryRecord>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| load_query(conn, &id)).await
    }

    async fn list_queries(&self) -> Result<Vec<QueryRecord>, StorageError> {
        self.with_conn(|conn| load_queries(conn, false)).await
    }

    async fn update_query(
        &self,
        id: &str,
        update: QueryUpdate,
    ) -> Result<Option<QueryRecord>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let Some(mut record) = load_query(conn, &id)? else {
                return Ok(None);
            };
            update.apply(&mut record);

            let results = record.results.as_ref().map(serde_json::to_string).transpose()?;
            conn.execute(
                "UPDATE app.queries
                 SET natural_language = ?, sql_query = ?, title = ?, results = ?, is_saved = ?
                 WHERE id = ?",
                params![
                    record.natural_language,
                    record.sql_query,
                    record.title,
                    results,
                    record.is_saved,
                    record.id
                ],
            )?;
            Ok(Some(record))
        })
        .await
    }

    async fn delete_query(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM app.queries WHERE id = ?", [&id])? > 0)
        })
        .await
    }

    async fn saved_queries(&self) -> Result<Vec<QueryRecord>, StorageError> {
        self.with_conn(|conn| load_queries(conn, true)).await
    }

    async fn create_visualization(
        &self,
        viz: NewVisualization,
    ) -> Result<Visualization, StorageError> {
        let record = build_visualization(viz);
        let row = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO app.visualizations ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    VIZ_COLUMNS
                ),
                params![
                    row.id,
                    row.query_id,
                    row.chart_type.as_str(),
                    row.x_axis,
                    row.y_axis,
                    row.title,
                    i64::from(row.width),
                    i64::from(row.height),
                    row.shareable_id,
                    timestamp(&row.created_at)
                ],
            )?;
            Ok(())
        })
        .await?;
        debug!("Created visualization {} ({})", record.id, record.shareable_id);
        Ok(record)
    }

    async fn get_visualization(&self, id: &str) -> Result<Option<Visualization>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| Ok(load_visualizations(conn, "id", &id)?.into_iter().next()))
            .await
    }

    async fn visualizations_for_query(
        &self,
        query_id: &str,
    ) -> Result<Vec<Visualization>, StorageError> {
        let query_id = query_id.to_string();
        self.with_conn(move |conn| load_visualizations(conn, "query_id", &query_id))
            .await
    }

    async fn visualization_by_shareable_id(
        &self,
        shareable_id: &str,
    ) -> Result<Option<Visualization>, StorageError> {
        let shareable_id = shareable_id.to_string();
        self.with_conn(move |conn| {
            Ok(load_visualizations(conn, "shareable_id", &shareable_id)?
                .into_iter()
                .next())
        })
        .await
    }

    async fn delete_visualization(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            Ok(conn.execute("DELETE FROM app.visualizations WHERE id = ?", [&id])? > 0)
        })
        .await
    }
}
