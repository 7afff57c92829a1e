use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::error::ApiError;
use crate::{
    auth::ActingUser,
    controller::AppState,
    domain::{ComputationType, NodeContext, NodeId, RootNetworkId, StudyId},
    engine::ResultQuery,
};

const NODE_PATH: &str = "/studies/:study_id/root-networks/:root_network_id/nodes/:node_id/:computation";

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(&format!("{NODE_PATH}/run"), post(run_computation))
        .route(&format!("{NODE_PATH}/stop"), put(stop_computation))
        .route(&format!("{NODE_PATH}/status"), get(computation_status))
        .route(&format!("{NODE_PATH}/result"), get(computation_result))
        .route(
            "/studies/:study_id/:computation/parameters",
            get(get_parameters).post(set_parameters),
        )
}

fn computation_type(segment: &str) -> Result<ComputationType, ApiError> {
    ComputationType::from_path_segment(segment)
        .ok_or_else(|| ApiError::NotFound(format!("unknown computation {}", segment)))
}

type NodePath = Path<(StudyId, RootNetworkId, NodeId, String)>;

fn node_target(path: NodePath) -> Result<(NodeContext, ComputationType), ApiError> {
    let Path((study_id, root_network_id, node_id, segment)) = path;
    Ok((
        NodeContext::new(study_id, node_id, root_network_id),
        computation_type(&segment)?,
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub result_uuid: Uuid,
}

/// Body, when present, holds the engine parameters for this run only
pub async fn run_computation(
    State(st): State<AppState>,
    path: NodePath,
    ActingUser(user): ActingUser,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, computation) = node_target(path)?;
    let parameters = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        Some(
            serde_json::from_slice::<Value>(&body)
                .map_err(|e| ApiError::BadRequest(format!("invalid parameters: {}", e)))?,
        )
    };
    let result_uuid = st.orchestrator.run(ctx, computation, &user, parameters).await?;
    Ok(Json(RunResponse { result_uuid }))
}

pub async fn stop_computation(
    State(st): State<AppState>,
    path: NodePath,
    ActingUser(user): ActingUser,
) -> Result<impl IntoResponse, ApiError> {
    let (ctx, computation) = node_target(path)?;
    st.orchestrator.stop(ctx, computation, &user).await?;
    Ok(StatusCode::OK)
}

pub async fn computation_status(
    State(st): State<AppState>,
    path: NodePath,
) -> Result<Response, ApiError> {
    let (ctx, computation) = node_target(path)?;
    Ok(match st.orchestrator.status(ctx, computation).await? {
        Some(status) => Json(status).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

/// Query parameters are forwarded verbatim to the engine
pub async fn computation_result(
    State(st): State<AppState>,
    path: NodePath,
    Query(query): Query<ResultQuery>,
) -> Result<Response, ApiError> {
    let (ctx, computation) = node_target(path)?;
    Ok(match st.orchestrator.result(ctx, computation, &query).await? {
        Some(result) => Json(result).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn get_parameters(
    State(st): State<AppState>,
    Path((study_id, segment)): Path<(StudyId, String)>,
) -> Result<Response, ApiError> {
    let computation = computation_type(&segment)?;
    Ok(match st.orchestrator.parameters(study_id, computation)? {
        Some(parameters) => Json(parameters).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

pub async fn set_parameters(
    State(st): State<AppState>,
    Path((study_id, segment)): Path<(StudyId, String)>,
    user: Option<ActingUser>,
    Json(parameters): Json<Value>,
) -> Result<impl IntoResponse, ApiError> {
    let computation = computation_type(&segment)?;
    st.orchestrator.set_parameters(
        study_id,
        computation,
        parameters,
        user.as_ref().map(|u| u.0.as_str()),
    )?;
    Ok(StatusCode::OK)
}
