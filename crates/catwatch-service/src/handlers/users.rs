//! User registration and settings handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use catwatch_core::{CreditCard, Subscription, User};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Load the authenticated user's record.
pub(crate) async fn current_user(state: &AppState, auth: &AuthUser) -> Result<User, ApiError> {
    state
        .store
        .get_user(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Account not found, register first".into()))
}

/// Register request.
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    /// E-mail sent to the gateway when subscribing.
    pub email: String,
    /// Optional display name.
    #[serde(default)]
    pub name: Option<String>,
}

/// The settings page data: account, subscription and card on file.
#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    /// The account.
    pub user: User,
    /// Active subscription, if any.
    pub subscription: Option<Subscription>,
    /// Card on file, if any.
    pub credit_card: Option<CreditCard>,
}

/// Register the authenticated user.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let email = body.email.trim().to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::Unprocessable("A valid e-mail address is required".into()));
    }
    if state.store.get_user(&auth.user_id).await?.is_some() {
        return Err(ApiError::Conflict("Account already exists".into()));
    }

    let mut user = User::new(auth.user_id, email);
    user.name = body.name;
    state.store.put_user(&user).await?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Get the current user's settings.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<SettingsResponse>, ApiError> {
    let user = current_user(&state, &auth).await?;
    let subscription = state.store.get_subscription(&user.id).await?;
    let credit_card = state.store.get_credit_card(&user.id).await?;

    Ok(Json(SettingsResponse {
        user,
        subscription,
        credit_card,
    }))
}
