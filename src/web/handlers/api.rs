use axum::{
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::db::executor::{QueryExecutionResult, Row};
use crate::export::{attachment_header, ExportFormat};
use crate::llm::models::{OptimizationResult, TranslateRequest, TranslationResult};
use crate::storage::{
    clear_history, NewQuery, NewVisualization, QueryRecord, QueryUpdate, Visualization,
};
use crate::web::error::{ApiError, ApiJson};
use crate::web::state::AppState;

// Request types. Fields are optional so a missing value gets the route's own
// message rather than a generic extractor rejection.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslatePayload {
    pub natural_language: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutePayload {
    pub sql_query: Option<String>,
    pub natural_language: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SqlPayload {
    pub sql_query: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExportPayload {
    pub data: Option<Value>,
    pub filename: Option<String>,
}

// Response types

#[derive(Debug, Serialize)]
pub struct ExplainResponse {
    pub explanation: String,
}

#[derive(Debug, Serialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub deleted: usize,
}

#[derive(Debug, Serialize)]
pub struct SharedVisualization {
    pub visualization: Visualization,
    pub query: Option<QueryRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStatus {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub connection_string: String,
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub schema: String,
}

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}

// Translation and execution

pub async fn translate(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<TranslatePayload>,
) -> Result<Json<TranslationResult>, ApiError> {
    let natural_language = required(
        payload.natural_language,
        "Natural language query is required",
    )?;
    info!("Translating natural language query: {}", natural_language);

    let schema = match state.executor.describe_schema().await {
        Ok(schema) => Some(schema),
        Err(e) => {
            warn!("Schema introspection failed, translating without it: {}", e);
            None
        }
    };

    let request = TranslateRequest {
        natural_language,
        schema,
        context: payload.context,
    };
    Ok(Json(state.translator.translate(&request).await))
}

pub async fn execute(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<ExecutePayload>,
) -> Result<Json<QueryExecutionResult>, ApiError> {
    let sql_query = required(payload.sql_query, "SQL query is required")?;
    let result = state.executor.execute(&sql_query).await;

    let natural_language = payload
        .natural_language
        .filter(|nl| !nl.trim().is_empty());
    if let (true, Some(natural_language)) = (result.success, natural_language) {
        let record = state
            .storage
            .create_query(NewQuery {
                natural_language,
                sql_query,
                title: payload.title,
            })
            .await?;

        let results = serde_json::to_value(result.data.as_deref().unwrap_or_default())
            .map_err(|e| ApiError::internal(e.to_string()))?;
        state
            .storage
            .update_query(
                &record.id,
                QueryUpdate {
                    results: Some(Some(results)),
                    ..Default::default()
                },
            )
            .await?;
        info!("Recorded query {} in history", record.id);
    }

    Ok(Json(result))
}

pub async fn explain(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<SqlPayload>,
) -> Result<Json<ExplainResponse>, ApiError> {
    let sql_query = required(payload.sql_query, "SQL query is required")?;

    let explanation = state.llm_manager.explain_sql(&sql_query).await.map_err(|e| {
        error!("Explain failed: {}", e);
        ApiError::internal(format!("Failed to explain SQL query: {}", e))
    })?;

    Ok(Json(ExplainResponse { explanation }))
}

pub async fn optimize(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<SqlPayload>,
) -> Result<Json<OptimizationResult>, ApiError> {
    let sql_query = required(payload.sql_query, "SQL query is required")?;

    let optimization = state.llm_manager.optimize_sql(&sql_query).await.map_err(|e| {
        error!("Optimize failed: {}", e);
        ApiError::internal(format!("Failed to optimize SQL query: {}", e))
    })?;

    Ok(Json(optimization))
}

// Query history

pub async fn list_queries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<QueryRecord>>, ApiError> {
    Ok(Json(state.storage.list_queries().await?))
}

pub async fn saved_queries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<QueryRecord>>, ApiError> {
    Ok(Json(state.storage.saved_queries().await?))
}

pub async fn clear_queries(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ClearHistoryResponse>, ApiError> {
    let deleted = clear_history(Arc::clone(&state.storage)).await?;
    Ok(Json(ClearHistoryResponse {
        success: true,
        deleted,
    }))
}

pub async fn get_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<QueryRecord>, ApiError> {
    state
        .storage
        .get_query(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Query not found"))
}

pub async fn update_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<QueryUpdate>,
) -> Result<Json<QueryRecord>, ApiError> {
    state
        .storage
        .update_query(&id, update)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Query not found"))
}

pub async fn delete_query(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.storage.delete_query(&id).await? {
        return Err(ApiError::not_found("Query not found"));
    }
    Ok(Json(json!({ "success": true })))
}

// Visualizations

pub async fn create_visualization(
    State(state): State<Arc<AppState>>,
    ApiJson(payload): ApiJson<Value>,
) -> Result<Json<Visualization>, ApiError> {
    let new: NewVisualization =
        serde_json::from_value(payload).map_err(|e| ApiError::bad_request(e.to_string()))?;
    new.validate().map_err(ApiError::bad_request)?;

    let visualization = state.storage.create_visualization(new).await?;
    info!(
        "Created visualization {} for query {}",
        visualization.id, visualization.query_id
    );
    Ok(Json(visualization))
}

pub async fn get_visualization(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Visualization>, ApiError> {
    state
        .storage
        .get_visualization(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Visualization not found"))
}

pub async fn delete_visualization(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    if !state.storage.delete_visualization(&id).await? {
        return Err(ApiError::not_found("Visualization not found"));
    }
    Ok(Json(json!({ "success": true })))
}

pub async fn visualizations_for_query(
    State(state): State<Arc<AppState>>,
    Path(query_id): Path<String>,
) -> Result<Json<Vec<Visualization>>, ApiError> {
    Ok(Json(state.storage.visualizations_for_query(&query_id).await?))
}

/// Looks up a shared visualization and the query behind it, if still present.
pub async fn load_shared(
    state: &AppState,
    shareable_id: &str,
) -> Result<SharedVisualization, ApiError> {
    let visualization = state
        .storage
        .visualization_by_shareable_id(shareable_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Shared visualization not found"))?;
    let query = state.storage.get_query(&visualization.query_id).await?;

    Ok(SharedVisualization {
        visualization,
        query,
    })
}

pub async fn shared_visualization(
    State(state): State<Arc<AppState>>,
    Path(shareable_id): Path<String>,
) -> Result<Json<SharedVisualization>, ApiError> {
    Ok(Json(load_shared(&state, &shareable_id).await?))
}

// Database

pub async fn database_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DatabaseStatus>, ApiError> {
    let pool = state.db_pool.clone();
    let is_active = tokio::task::spawn_blocking(move || pool.get().is_ok())
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(DatabaseStatus {
        id: "duckdb-main".to_string(),
        name: "DuckDB Database".to_string(),
        kind: "duckdb".to_string(),
        connection_string: state.config.database.connection_string.clone(),
        is_active,
    }))
}

pub async fn get_schema(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SchemaResponse>, ApiError> {
    let schema = state
        .executor
        .describe_schema()
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(SchemaResponse { schema }))
}

// Export

fn export_rows(data: Option<Value>) -> Result<Vec<Row>, ApiError> {
    let invalid = || ApiError::bad_request("Data array is required");
    match data {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                _ => Err(invalid()),
            })
            .collect(),
        _ => Err(invalid()),
    }
}

pub async fn export_data(
    Path(format): Path<String>,
    ApiJson(payload): ApiJson<ExportPayload>,
) -> Result<Response, ApiError> {
    let rows = export_rows(payload.data)?;
    let format: ExportFormat = format.parse()?;

    let body = format.render(&rows)?;
    let disposition = HeaderValue::from_str(&attachment_header(
        payload.filename.as_deref(),
        format,
    ))
    .map_err(|e| ApiError::bad_request(format!("Invalid filename: {}", e)))?;

    info!("Exporting {} rows as {}", rows.len(), format.extension());
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(format.content_type())),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response())
}
