//! Admin handlers for coupons and bulk user removal.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use catwatch_core::{Coupon, CouponId, CouponParams, UserId};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::jobs::Job;
use crate::state::AppState;

/// Largest page `GET /admin/coupons` returns.
const MAX_PAGE: usize = 100;

/// Pagination for coupon listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Page size (default 50, max 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Rows to skip.
    #[serde(default)]
    pub offset: usize,
}

const fn default_limit() -> usize {
    50
}

/// Coupon ids to delete.
#[derive(Debug, Deserialize)]
pub struct BulkDeleteCouponsRequest {
    /// Coupon ids.
    pub ids: Vec<CouponId>,
}

/// User ids to delete.
#[derive(Debug, Deserialize)]
pub struct BulkDeleteUsersRequest {
    /// User ids.
    pub ids: Vec<UserId>,
}

/// Response for queued bulk actions.
#[derive(Debug, Serialize)]
pub struct QueuedResponse {
    /// Number of ids handed to the job.
    pub queued: usize,
}

/// Create a coupon on the gateway, then locally.
pub async fn create_coupon(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(params): Json<CouponParams>,
) -> Result<(StatusCode, Json<Coupon>), ApiError> {
    let coupon = state.coupons.create(params).await?;
    tracing::info!(admin_id = %admin.admin_id, code = %coupon.code, "Coupon created by admin");
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// List coupons, newest first.
pub async fn list_coupons(
    State(state): State<Arc<AppState>>,
    _admin: AdminAuth,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Coupon>>, ApiError> {
    let coupons = state
        .coupons
        .list(query.limit.min(MAX_PAGE), query.offset)
        .await?;
    Ok(Json(coupons))
}

/// Queue deletion of coupons.
pub async fn bulk_delete_coupons(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<BulkDeleteCouponsRequest>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let queued = body.ids.len();
    state.jobs.submit(Job::DeleteCoupons(body.ids))?;
    tracing::info!(admin_id = %admin.admin_id, queued, "Coupon deletion queued");
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued })))
}

/// Queue cancellation and deletion of users.
pub async fn bulk_delete_users(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<BulkDeleteUsersRequest>,
) -> Result<(StatusCode, Json<QueuedResponse>), ApiError> {
    let queued = body.ids.len();
    state.jobs.submit(Job::DeleteUsers(body.ids))?;
    tracing::info!(admin_id = %admin.admin_id, queued, "User deletion queued");
    Ok((StatusCode::ACCEPTED, Json(QueuedResponse { queued })))
}
