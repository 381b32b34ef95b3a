// HTTP surface: JSON API under /api plus the public share page.
// Handlers stay thin; translation, execution and persistence live in their
// own modules and are reached through AppState.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod templates;

use axum::{http::header, Router};
use socket2::{Domain, Socket, Type};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::WebConfig;
use state::AppState;

/// Builds the full router; `run_server` only adds the listener.
pub fn build_router(state: Arc<AppState>, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .merge(routes::ui_routes())
        .merge(routes::api_routes());

    if enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(vec![header::CONTENT_TYPE]),
        );
    }

    app.layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn bind(addr: SocketAddr) -> std::io::Result<tokio::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;
    tokio::net::TcpListener::from_std(socket.into())
}

pub async fn run_server(
    config: WebConfig,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let app = build_router(state, config.enable_cors);

    let listener = bind(addr)?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::test_pool;
    use crate::llm::test_support::ScriptedModel;
    use crate::llm::LlmManager;
    use crate::storage::memory::MemStorage;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app_with(model: ScriptedModel) -> Router {
        let state = AppState::new(
            AppConfig::default(),
            test_pool(),
            LlmManager::with_model(Box::new(model)),
            Arc::new(MemStorage::new()),
        )
        .unwrap();
        build_router(Arc::new(state), true)
    }

    fn app() -> Router {
        app_with(ScriptedModel::failing("model unavailable"))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = send_raw(app, method, uri, body).await;
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn send_raw(
        app: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn translate_requires_natural_language() {
        let app = app();
        let (status, body) = send(&app, "POST", "/api/translate", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Natural language query is required");
    }

    #[tokio::test]
    async fn unreadable_bodies_are_400_with_error_json() {
        let app = app();

        let request = Request::builder()
            .method("POST")
            .uri("/api/execute")
            .header("content-type", "application/json")
            .body(Body::from("{\"sqlQuery\": "))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));

        let (status, body) = send(&app, "POST", "/api/execute", Some(json!({ "sqlQuery": 5 }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let (status, body) = send(
            &app,
            "PATCH",
            "/api/queries/anything",
            Some(json!({ "isSaved": "yes" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());

        let request = Request::builder()
            .method("POST")
            .uri("/api/translate")
            .body(Body::from(json!({ "naturalLanguage": "sales" }).to_string()))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn translate_falls_back_when_model_fails() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/translate",
            Some(json!({ "naturalLanguage": "show me sales by region" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["sqlQuery"].as_str().unwrap().contains("GROUP BY region"));
        assert_eq!(body["confidence"], 0.7);
    }

    #[tokio::test]
    async fn translate_uses_model_and_live_schema() {
        let model = ScriptedModel::replying(
            r#"{"sqlQuery": "SELECT COUNT(*) FROM products", "explanation": "Counts products", "confidence": 0.9}"#,
        );
        let app = app_with(model);
        let (status, body) = send(
            &app,
            "POST",
            "/api/translate",
            Some(json!({ "naturalLanguage": "how many products?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sqlQuery"], "SELECT COUNT(*) FROM products");
        assert_eq!(body["confidence"], 0.9);
    }

    #[tokio::test]
    async fn execute_records_history_with_results() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/execute",
            Some(json!({
                "sqlQuery": "SELECT region, SUM(sales_amount) AS total_sales FROM sales_data GROUP BY region ORDER BY total_sales DESC",
                "naturalLanguage": "sales by region"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["rowCount"], 4);
        assert_eq!(body["columns"], json!(["region", "total_sales"]));

        let (_, history) = send(&app, "GET", "/api/queries", None).await;
        let history = history.as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["naturalLanguage"], "sales by region");
        assert_eq!(history[0]["results"].as_array().unwrap().len(), 4);
        assert_eq!(history[0]["isSaved"], false);
    }

    #[tokio::test]
    async fn failed_execution_is_200_and_not_recorded() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/execute",
            Some(json!({ "sqlQuery": "SELECT * FROM no_such_table", "naturalLanguage": "oops" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        assert!(body.get("data").is_none());

        let (_, history) = send(&app, "GET", "/api/queries", None).await;
        assert!(history.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn execute_requires_sql() {
        let app = app();
        let (status, body) = send(&app, "POST", "/api/execute", Some(json!({ "sqlQuery": "  " }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "SQL query is required");
    }

    #[tokio::test]
    async fn explain_errors_are_500_with_prefix() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/explain",
            Some(json!({ "sqlQuery": "SELECT 1" })),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("Failed to explain SQL query:"));
    }

    #[tokio::test]
    async fn optimize_returns_model_suggestions() {
        let app = app_with(ScriptedModel::replying(
            r#"{"optimizedQuery": "SELECT id FROM products", "improvements": ["Select only needed columns"]}"#,
        ));
        let (status, body) = send(
            &app,
            "POST",
            "/api/optimize",
            Some(json!({ "sqlQuery": "SELECT * FROM products" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["optimizedQuery"], "SELECT id FROM products");
        assert_eq!(body["improvements"][0], "Select only needed columns");
    }

    #[tokio::test]
    async fn query_crud_and_not_found() {
        let app = app();
        send(
            &app,
            "POST",
            "/api/execute",
            Some(json!({ "sqlQuery": "SELECT 1 AS one", "naturalLanguage": "one" })),
        )
        .await;
        let (_, history) = send(&app, "GET", "/api/queries", None).await;
        let id = history[0]["id"].as_str().unwrap().to_string();

        let (status, updated) = send(
            &app,
            "PATCH",
            &format!("/api/queries/{}", id),
            Some(json!({ "isSaved": true, "title": "One" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["isSaved"], true);

        let (_, saved) = send(&app, "GET", "/api/queries/saved", None).await;
        assert_eq!(saved.as_array().unwrap().len(), 1);

        let (status, deleted) = send(&app, "DELETE", &format!("/api/queries/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(deleted, json!({ "success": true }));

        let (status, body) = send(&app, "GET", &format!("/api/queries/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Query not found");

        let (status, _) = send(&app, "DELETE", &format!("/api/queries/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clearing_history_keeps_saved_queries() {
        let app = app();
        for question in ["first", "second"] {
            send(
                &app,
                "POST",
                "/api/execute",
                Some(json!({ "sqlQuery": "SELECT 1 AS one", "naturalLanguage": question })),
            )
            .await;
        }
        let (_, history) = send(&app, "GET", "/api/queries", None).await;
        let keep = history[0]["id"].as_str().unwrap().to_string();
        send(
            &app,
            "PATCH",
            &format!("/api/queries/{}", keep),
            Some(json!({ "isSaved": true })),
        )
        .await;

        let (status, body) = send(&app, "DELETE", "/api/queries", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "deleted": 1 }));

        let (_, history) = send(&app, "GET", "/api/queries", None).await;
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["id"], keep.as_str());
    }

    #[tokio::test]
    async fn visualization_sharing_flow() {
        let app = app();
        send(
            &app,
            "POST",
            "/api/execute",
            Some(json!({
                "sqlQuery": "SELECT region, SUM(sales_amount) AS total_sales FROM sales_data GROUP BY region",
                "naturalLanguage": "sales by region"
            })),
        )
        .await;
        let (_, history) = send(&app, "GET", "/api/queries", None).await;
        let query_id = history[0]["id"].as_str().unwrap().to_string();

        let (status, viz) = send(
            &app,
            "POST",
            "/api/visualizations",
            Some(json!({
                "queryId": query_id,
                "chartType": "bar",
                "xAxis": "region",
                "yAxis": "total_sales",
                "title": "Sales by region"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(viz["width"], 800);
        assert_eq!(viz["height"], 400);
        let shareable_id = viz["shareableId"].as_str().unwrap().to_string();

        let (status, shared) =
            send(&app, "GET", &format!("/api/share/{}", shareable_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(shared["visualization"]["id"], viz["id"]);
        assert_eq!(shared["query"]["id"], query_id.as_str());

        let (status, page) =
            send_raw(&app, "GET", &format!("/share/{}", shareable_id), None).await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(page).unwrap();
        assert!(page.contains("Sales by region"));
        assert!(page.contains("<th>region</th>"));

        let (_, for_query) = send(
            &app,
            "GET",
            &format!("/api/visualizations/query/{}", query_id),
            None,
        )
        .await;
        assert_eq!(for_query.as_array().unwrap().len(), 1);

        // Deleting the query leaves the share resolvable with a null query.
        send(&app, "DELETE", &format!("/api/queries/{}", query_id), None).await;
        let (status, shared) =
            send(&app, "GET", &format!("/api/share/{}", shareable_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(shared["query"].is_null());
    }

    #[tokio::test]
    async fn visualization_validation_and_not_found() {
        let app = app();
        let (status, _) = send(
            &app,
            "POST",
            "/api/visualizations",
            Some(json!({ "queryId": "q", "chartType": "donut", "xAxis": "a", "yAxis": "b", "title": "t" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(&app, "GET", "/api/visualizations/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Visualization not found");

        let (status, body) = send(&app, "GET", "/api/share/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Shared visualization not found");
    }

    #[tokio::test]
    async fn database_status_reports_duckdb() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/database/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "duckdb");
        assert_eq!(body["connectionString"], ":memory:");
        assert_eq!(body["isActive"], true);
    }

    #[tokio::test]
    async fn schema_lists_sample_tables() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/schema", None).await;
        assert_eq!(status, StatusCode::OK);
        let schema = body["schema"].as_str().unwrap();
        assert!(schema.contains("CREATE TABLE sales_data"));
        assert!(!schema.contains("queries"));
    }

    #[tokio::test]
    async fn export_csv_sets_download_headers() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/export/csv")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({ "data": [{"region": "Asia", "total": 3}], "filename": "report" }).to_string(),
            ))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/csv");
        assert_eq!(
            response.headers()["content-disposition"],
            "attachment; filename=\"report.csv\""
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"region,total\nAsia,3\n");
    }

    #[tokio::test]
    async fn export_rejects_bad_input() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/export/xlsx",
            Some(json!({ "data": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Unsupported export format");

        let (status, body) = send(
            &app,
            "POST",
            "/api/export/json",
            Some(json!({ "data": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Data array is required");
    }
}
