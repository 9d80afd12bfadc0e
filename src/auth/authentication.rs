use rocket::Request;
use rocket::http::Status;
use rocket::request::{FromRequest, Outcome};
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use sqlx::SqlitePool;
use tracing::Instrument;

use crate::database::legacy::{find_admin_by_api_key, find_user_by_api_key};
use crate::models::{AdminUser, LegacyUser};
use crate::validation::ErrorResponse;

/// Reads `X-API-Key`, falling back to `Authorization: Bearer <key>`.
pub fn api_key_from_request(request: &Request<'_>) -> Option<String> {
    let headers = request.headers();

    headers
        .get_one("x-api-key")
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| {
            headers
                .get_one("authorization")
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|k| !k.is_empty())
        })
        .map(String::from)
}

/// Whoever presented a valid API key: the coach or a legacy customer.
#[derive(Debug, Clone)]
pub enum ApiCaller {
    Admin(AdminUser),
    Customer(LegacyUser),
}

impl ApiCaller {
    pub fn role(&self) -> &'static str {
        match self {
            ApiCaller::Admin(_) => "admin",
            ApiCaller::Customer(_) => "customer",
        }
    }
}

/// Resolves a key against both key tables, admins first.
pub async fn resolve_api_key(
    pool: &SqlitePool,
    api_key: &str,
) -> Result<Option<ApiCaller>, crate::error::AppError> {
    if let Some(admin) = find_admin_by_api_key(pool, api_key).await? {
        return Ok(Some(ApiCaller::Admin(admin)));
    }

    Ok(find_user_by_api_key(pool, api_key)
        .await?
        .map(ApiCaller::Customer))
}

async fn authenticate_api_key(request: &Request<'_>) -> Outcome<ApiCaller, ()> {
    let Some(api_key) = api_key_from_request(request) else {
        return Outcome::Error((Status::Unauthorized, ()));
    };

    let db = match request.rocket().state::<SqlitePool>() {
        Some(pool) => pool,
        _ => {
            tracing::error!("Database pool not found in managed state");
            return Outcome::Error((Status::InternalServerError, ()));
        }
    };

    match resolve_api_key(db, &api_key).await {
        Ok(Some(caller)) => {
            tracing::info!(role = caller.role(), "Caller authenticated via API key");
            Outcome::Success(caller)
        }
        Ok(None) => {
            tracing::warn!("Unknown API key");
            Outcome::Error((Status::Unauthorized, ()))
        }
        Err(err) => {
            tracing::error!(error = ?err, "Failed to look up API key");
            Outcome::Error((Status::InternalServerError, ()))
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ApiCaller {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        authenticate_api_key(request)
            .instrument(tracing::info_span!("api_key_guard"))
            .await
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.guard::<ApiCaller>().await {
            Outcome::Success(ApiCaller::Admin(admin)) => Outcome::Success(admin),
            Outcome::Success(ApiCaller::Customer(user)) => {
                tracing::warn!(user_id = user.id, "Customer key used on an admin endpoint");
                Outcome::Error((Status::Forbidden, ()))
            }
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for LegacyUser {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        match request.guard::<ApiCaller>().await {
            Outcome::Success(ApiCaller::Customer(user)) => Outcome::Success(user),
            Outcome::Success(ApiCaller::Admin(_)) => Outcome::Error((Status::Unauthorized, ())),
            Outcome::Error(e) => Outcome::Error(e),
            Outcome::Forward(status) => Outcome::Forward(status),
        }
    }
}

fn json_error(status: Status, message: &str) -> Custom<Json<ErrorResponse>> {
    Custom(status, Json(ErrorResponse::new(message)))
}

#[catch(400)]
pub fn bad_request_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    json_error(Status::BadRequest, "Malformed request")
}

#[catch(401)]
pub fn unauthorized_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    tracing::warn!("Unauthorized access attempt");
    json_error(Status::Unauthorized, "Not authenticated")
}

#[catch(403)]
pub fn forbidden_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    tracing::warn!("Forbidden access attempt");
    json_error(Status::Forbidden, "Forbidden")
}

#[catch(404)]
pub fn not_found_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    json_error(Status::NotFound, "Not found")
}

#[catch(422)]
pub fn unprocessable_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    json_error(Status::BadRequest, "Invalid request body")
}

#[catch(500)]
pub fn internal_error_api(_req: &Request) -> Custom<Json<ErrorResponse>> {
    json_error(Status::InternalServerError, "Internal server error")
}
