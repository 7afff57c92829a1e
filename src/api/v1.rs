use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};

use crate::controller::AppState;

use super::{bus, computations, notifications, studies, supervision};

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(studies::routes())
        .merge(computations::routes())
        .merge(supervision::routes())
        .merge(bus::routes())
        .merge(notifications::routes())
        .route("/healthz", get(healthz))
        .with_state(state)
}

pub async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}
