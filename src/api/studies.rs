use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::ApiError;
use crate::{
    auth::ActingUser,
    controller::{AppState, ModificationChange, NewRootNetwork},
    domain::{BuildStatus, InsertMode, NodeContext, NodeId, NodeSpec, RootNetworkId, StudyId},
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/studies", post(create_study))
        .route("/studies/:study_id/tree", get(get_tree))
        .route(
            "/studies/:study_id/root-networks",
            get(list_root_networks).post(add_root_network),
        )
        .route(
            "/studies/:study_id/root-networks/:root_network_id",
            delete(remove_root_network),
        )
        .route(
            "/studies/:study_id/tree/nodes/:node_id",
            post(insert_node).delete(delete_node),
        )
        .route("/studies/:study_id/tree/nodes/:node_id/move", post(move_node))
        .route("/studies/:study_id/tree/nodes/:node_id/stash", post(stash_node))
        .route("/studies/:study_id/tree/nodes/:node_id/restore", post(restore_node))
        .route("/studies/:study_id/nodes/modifications", post(modifications_changed))
        .route(
            "/studies/:study_id/root-networks/:root_network_id/nodes/:node_id/build",
            post(build_node),
        )
        .route(
            "/studies/:study_id/root-networks/:root_network_id/nodes/:node_id/build/stop",
            put(stop_build),
        )
        .route(
            "/studies/:study_id/root-networks/:root_network_id/nodes/:node_id/build-status",
            get(build_status),
        )
}

fn parse_mode(mode: Option<&str>) -> Result<InsertMode, ApiError> {
    mode.map(str::parse::<InsertMode>)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(ApiError::BadRequest)
}

pub async fn create_study(
    State(st): State<AppState>,
    Json(req): Json<NewRootNetwork>,
) -> Result<impl IntoResponse, ApiError> {
    let created = st.studies.create_study(req)?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_tree(
    State(st): State<AppState>,
    Path(study_id): Path<StudyId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(st.studies.tree(study_id)?))
}

pub async fn list_root_networks(
    State(st): State<AppState>,
    Path(study_id): Path<StudyId>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(st.studies.root_networks(study_id)?))
}

pub async fn add_root_network(
    State(st): State<AppState>,
    Path(study_id): Path<StudyId>,
    Json(req): Json<NewRootNetwork>,
) -> Result<impl IntoResponse, ApiError> {
    let root_network = st.studies.add_root_network(study_id, req)?;
    Ok((StatusCode::CREATED, Json(root_network)))
}

pub async fn remove_root_network(
    State(st): State<AppState>,
    Path((study_id, root_network_id)): Path<(StudyId, RootNetworkId)>,
) -> Result<impl IntoResponse, ApiError> {
    st.studies.remove_root_network(study_id, root_network_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct InsertQuery {
    pub mode: Option<String>,
}

pub async fn insert_node(
    State(st): State<AppState>,
    Path((study_id, reference)): Path<(StudyId, NodeId)>,
    Query(q): Query<InsertQuery>,
    user: Option<ActingUser>,
    Json(spec): Json<NodeSpec>,
) -> Result<impl IntoResponse, ApiError> {
    spec.validate()?;
    let mode = parse_mode(q.mode.as_deref())?;
    let node = st.studies.insert_node(
        study_id,
        reference,
        mode,
        spec,
        user.as_ref().map(|u| u.0.as_str()),
    )?;
    Ok((StatusCode::CREATED, Json(node)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteQuery {
    #[serde(default)]
    pub delete_children: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodesResponse {
    pub node_uuids: Vec<NodeId>,
}

pub async fn delete_node(
    State(st): State<AppState>,
    Path((study_id, node_id)): Path<(StudyId, NodeId)>,
    Query(q): Query<DeleteQuery>,
    user: Option<ActingUser>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = st.studies.delete_node(
        study_id,
        node_id,
        q.delete_children,
        user.as_ref().map(|u| u.0.as_str()),
    )?;
    Ok(Json(NodesResponse { node_uuids: removed }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveQuery {
    pub reference_node_uuid: NodeId,
    pub mode: Option<String>,
    #[serde(default)]
    pub subtree: bool,
}

pub async fn move_node(
    State(st): State<AppState>,
    Path((study_id, node_id)): Path<(StudyId, NodeId)>,
    Query(q): Query<MoveQuery>,
    user: Option<ActingUser>,
) -> Result<impl IntoResponse, ApiError> {
    let mode = parse_mode(q.mode.as_deref())?;
    st.studies.move_node(
        study_id,
        node_id,
        q.reference_node_uuid,
        mode,
        q.subtree,
        user.as_ref().map(|u| u.0.as_str()),
    )?;
    Ok(StatusCode::OK)
}

pub async fn stash_node(
    State(st): State<AppState>,
    Path((study_id, node_id)): Path<(StudyId, NodeId)>,
    user: Option<ActingUser>,
) -> Result<impl IntoResponse, ApiError> {
    let stashed = st
        .studies
        .stash(study_id, node_id, user.as_ref().map(|u| u.0.as_str()))?;
    Ok(Json(NodesResponse { node_uuids: stashed }))
}

pub async fn restore_node(
    State(st): State<AppState>,
    Path((study_id, node_id)): Path<(StudyId, NodeId)>,
    user: Option<ActingUser>,
) -> Result<impl IntoResponse, ApiError> {
    let restored = st
        .studies
        .restore(study_id, node_id, user.as_ref().map(|u| u.0.as_str()))?;
    Ok(Json(NodesResponse { node_uuids: restored }))
}

pub async fn modifications_changed(
    State(st): State<AppState>,
    Path(study_id): Path<StudyId>,
    Json(change): Json<ModificationChange>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = st.studies.modifications_changed(study_id, &change)?;
    Ok(Json(serde_json::json!({
        "invalidatedNodes": summary.invalidated_nodes,
        "clearedResults": summary.cleared_results,
    })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatusResponse {
    pub node_uuid: NodeId,
    pub root_network_uuid: RootNetworkId,
    pub build_status: BuildStatus,
}

fn build_response(ctx: NodeContext, build_status: BuildStatus) -> Json<BuildStatusResponse> {
    Json(BuildStatusResponse {
        node_uuid: ctx.node_id,
        root_network_uuid: ctx.root_network_id,
        build_status,
    })
}

pub async fn build_node(
    State(st): State<AppState>,
    Path((study_id, root_network_id, node_id)): Path<(StudyId, RootNetworkId, NodeId)>,
    ActingUser(user): ActingUser,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = NodeContext::new(study_id, node_id, root_network_id);
    let status = st.studies.build(ctx, &user).await?;
    Ok(build_response(ctx, status))
}

pub async fn stop_build(
    State(st): State<AppState>,
    Path((study_id, root_network_id, node_id)): Path<(StudyId, RootNetworkId, NodeId)>,
    ActingUser(user): ActingUser,
) -> Result<impl IntoResponse, ApiError> {
    st.studies
        .stop_build(NodeContext::new(study_id, node_id, root_network_id), &user)
        .await?;
    Ok(StatusCode::OK)
}

pub async fn build_status(
    State(st): State<AppState>,
    Path((study_id, root_network_id, node_id)): Path<(StudyId, RootNetworkId, NodeId)>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = NodeContext::new(study_id, node_id, root_network_id);
    let status = st.studies.build_status(ctx)?;
    Ok(build_response(ctx, status))
}
