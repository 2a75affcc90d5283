//! Share link endpoints

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use super::dto::{
    AnalysisEnvelope, ShareLinkResponse, SharedAnalysisResponse, SuccessResponse,
    UpdateShareRequest,
};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::service::ShareService;

/// Owner routes for `/api/analyses/:id/share`
pub fn share_router() -> Router<AppState> {
    Router::new().route(
        "/analyses/:id/share",
        get(get_share)
            .post(create_share)
            .patch(update_share)
            .delete(delete_share),
    )
}

/// Public route, no session required
pub fn shared_router() -> Router<AppState> {
    Router::new().route("/shared/:token", get(get_shared))
}

/// POST /api/analyses/:id/share
async fn create_share(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ShareLinkResponse>, AppError> {
    let link = ShareService::new(state.db.clone())
        .create(&user.id, &id)
        .await?;
    Ok(Json(ShareLinkResponse::from(Some(link))))
}

/// GET /api/analyses/:id/share
async fn get_share(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ShareLinkResponse>, AppError> {
    let link = ShareService::new(state.db.clone()).get(&user.id, &id).await?;
    Ok(Json(ShareLinkResponse::from(link)))
}

/// PATCH /api/analyses/:id/share
async fn update_share(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateShareRequest>,
) -> Result<Json<ShareLinkResponse>, AppError> {
    let link = ShareService::new(state.db.clone())
        .set_visibility(&user.id, &id, req.is_public)
        .await?;
    Ok(Json(ShareLinkResponse::from(Some(link))))
}

/// DELETE /api/analyses/:id/share
async fn delete_share(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    ShareService::new(state.db.clone())
        .delete(&user.id, &id)
        .await?;
    Ok(Json(SuccessResponse::ok()))
}

/// GET /api/shared/:token
async fn get_shared(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<AnalysisEnvelope<SharedAnalysisResponse>>, AppError> {
    let shared = ShareService::new(state.db.clone()).resolve(&token).await?;
    Ok(Json(AnalysisEnvelope {
        analysis: SharedAnalysisResponse::from(shared),
    }))
}
