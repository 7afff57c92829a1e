use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use super::error::ApiError;
use crate::{consumer::BusMessage, controller::AppState};

/// Bridge for brokers (or test harnesses) delivering engine events over HTTP
pub fn routes() -> Router<AppState> {
    Router::new().route("/bus/:destination", post(publish))
}

pub async fn publish(
    State(st): State<AppState>,
    Path(destination): Path<String>,
    Json(message): Json<BusMessage>,
) -> Result<impl IntoResponse, ApiError> {
    st.hub.publish(&destination, message).await?;
    Ok(StatusCode::ACCEPTED)
}
