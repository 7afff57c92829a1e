use axum::{
    extract::{Query, State},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::{controller::AppState, domain::ComputationType};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/supervision/computation/results", delete(delete_results))
        .route("/supervision/computation/results/count", get(count_results))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisionQuery {
    #[serde(rename = "type")]
    pub computation: ComputationType,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: usize,
}

pub async fn count_results(
    State(st): State<AppState>,
    Query(q): Query<SupervisionQuery>,
) -> impl IntoResponse {
    Json(CountResponse {
        count: st.orchestrator.count_results(q.computation),
    })
}

pub async fn delete_results(
    State(st): State<AppState>,
    Query(q): Query<SupervisionQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let count = st
        .orchestrator
        .delete_all_results(q.computation, q.dry_run)
        .await?;
    Ok(Json(CountResponse { count }))
}
