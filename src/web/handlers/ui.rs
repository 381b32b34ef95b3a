use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use minijinja::context;
use serde_json::Value;
use std::sync::Arc;

use super::api::load_shared;
use crate::web::state::AppState;
use crate::web::templates::{render_template, SHARE_TEMPLATE};

// Public page for a shared visualization
pub async fn share_page(
    State(state): State<Arc<AppState>>,
    Path(shareable_id): Path<String>,
) -> Response {
    let shared = match load_shared(&state, &shareable_id).await {
        Ok(shared) => shared,
        Err(e) => return e.into_response(),
    };

    let rows = shared
        .query
        .as_ref()
        .and_then(|q| q.results.clone())
        .unwrap_or(Value::Array(Vec::new()));
    let columns: Vec<String> = rows
        .get(0)
        .and_then(Value::as_object)
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default();

    let html = render_template(
        &state.template_env,
        SHARE_TEMPLATE,
        context! {
            visualization => &shared.visualization,
            query => &shared.query,
            columns => columns,
            rows => rows,
        },
    );

    (StatusCode::OK, Html(html)).into_response()
}
