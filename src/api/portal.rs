use std::sync::Arc;

use rocket::State;
use rocket::http::CookieJar;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

use crate::auth::ClientSession;
use crate::db::{find_client_by_xors_user_id, get_client, update_client_phone};
use crate::env::Settings;
use crate::error::AppError;
use crate::identity::{IdentityError, IdentityProvider};
use crate::validation::non_blank;

use super::SuccessResponse;
use super::clients::{ClientResponse, load_client_detail};

#[derive(Deserialize)]
pub struct LoginRequest {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionUser {
    pub id: String,
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub user: SessionUser,
}

#[post("/auth/login", data = "<request>")]
pub async fn api_login(
    request: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    db: &State<Pool<Sqlite>>,
    identity: &State<Arc<dyn IdentityProvider>>,
    settings: &State<Settings>,
) -> Result<Json<LoginResponse>, AppError> {
    let password = request.password.as_deref().filter(|p| !p.is_empty());
    let (Some(email), Some(password)) = (non_blank(&request.email), password) else {
        return Err(AppError::Validation(
            "Email and password are required".to_string(),
        ));
    };
    let email = email.to_lowercase();

    let account = match identity.authenticate(&email, password).await {
        Ok(account) => account,
        Err(IdentityError::Rejected { .. }) => {
            return Err(AppError::Authentication(
                "Invalid email or password".to_string(),
            ));
        }
        Err(err) => return Err(err.into()),
    };

    let Some(client) = find_client_by_xors_user_id(db, &account.id).await? else {
        warn!(xors_user_id = %account.id, "Valid credentials without a client record");
        return Err(AppError::Authorization(
            "You are not registered as a client. Please contact your coach.".to_string(),
        ));
    };

    ClientSession::from(&client)
        .store(cookies, settings.cookie_secure)
        .map_err(|e| AppError::Internal(format!("Failed to encode session: {}", e)))?;

    info!(client_id = %client.id, "Client logged in");

    Ok(Json(LoginResponse {
        success: true,
        user: SessionUser {
            id: client.id,
            name: client.name,
            email: client.email,
        },
    }))
}

#[post("/auth/logout")]
pub fn api_logout(cookies: &CookieJar<'_>) -> Json<SuccessResponse> {
    ClientSession::clear(cookies);
    Json(SuccessResponse::ok())
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MeResponse {
    pub user: ClientResponse,
}

#[get("/auth/me")]
pub async fn api_me(
    session: ClientSession,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<MeResponse>, AppError> {
    let user = load_client_detail(db, &session.client_id).await?;
    Ok(Json(MeResponse { user }))
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    phone: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ProfileFields {
    pub phone: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct UpdateProfileResponse {
    pub success: bool,
    pub user: ProfileFields,
}

#[put("/auth/update-profile", data = "<request>")]
pub async fn api_update_profile(
    session: ClientSession,
    request: Json<UpdateProfileRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<UpdateProfileResponse>, AppError> {
    let client = update_client_phone(db, &session.client_id, non_blank(&request.phone)).await?;

    Ok(Json(UpdateProfileResponse {
        success: true,
        user: ProfileFields {
            phone: client.phone,
        },
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    current_password: Option<String>,
    new_password: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ChangePasswordResponse {
    pub success: bool,
    pub message: String,
}

#[put("/auth/change-password", data = "<request>")]
pub async fn api_change_password(
    session: ClientSession,
    request: Json<ChangePasswordRequest>,
    db: &State<Pool<Sqlite>>,
    identity: &State<Arc<dyn IdentityProvider>>,
) -> Result<Json<ChangePasswordResponse>, AppError> {
    let (Some(current_password), Some(new_password)) = (
        request.current_password.as_deref().filter(|p| !p.is_empty()),
        request.new_password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        return Err(AppError::Validation(
            "Current password and new password are required".to_string(),
        ));
    };

    let client = get_client(db, &session.client_id).await?;
    let Some(api_key) = client.xors_api_key.as_deref() else {
        return Err(AppError::Internal(
            "Client has no identity provider key on record".to_string(),
        ));
    };

    identity
        .change_password(api_key, Some(current_password), new_password)
        .await?;

    info!(client_id = %client.id, "Client changed password");

    Ok(Json(ChangePasswordResponse {
        success: true,
        message: "Password updated successfully".to_string(),
    }))
}
