//! Endpoints over the API-key customer tables that predate the client portal.

use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use tracing::info;
use validator::Validate;

use crate::auth::{ApiCaller, resolve_api_key};
use crate::database::legacy::{
    create_customer, find_application, get_customer_summary, get_or_create_application, get_user,
    list_customers, rotate_admin_api_key, set_session_count,
};
use crate::error::AppError;
use crate::ledger::CounterAdjustment;
use crate::models::{AdminUser, CustomerSummary, LegacyUser, UserApplication};
use crate::validation::{JsonValidateExt, non_blank};

fn parse_user_id(id: &str) -> Result<i64, AppError> {
    id.parse::<i64>()
        .map_err(|_| AppError::Validation("Invalid user ID".to_string()))
}

#[derive(Deserialize, Validate)]
pub struct RegisterCustomerRequest {
    name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    email: Option<String>,
    phone: Option<String>,
}

impl RegisterCustomerRequest {
    fn required(&self) -> Result<(&str, &str), AppError> {
        match (non_blank(&self.name), non_blank(&self.email)) {
            (Some(name), Some(email)) => Ok((name, email)),
            _ => Err(AppError::Validation(
                "Name and email are required".to_string(),
            )),
        }
    }
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RegisterCustomerResponse {
    pub user: LegacyUser,
    pub api_key: String,
    pub application: UserApplication,
    pub message: String,
}

#[post("/customers", data = "<request>")]
pub async fn api_register_customer(
    request: Json<RegisterCustomerRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<RegisterCustomerResponse>>, AppError> {
    let validated = request.validate_json()?;
    let (name, email) = validated.required()?;

    let (user, application) =
        create_customer(db, name, &email.to_lowercase(), non_blank(&validated.phone)).await?;

    info!(user_id = user.id, "Customer registered");

    Ok(Custom(
        Status::Created,
        Json(RegisterCustomerResponse {
            api_key: user.api_key.clone(),
            user,
            application,
            message: "Customer created successfully. Store the API key securely.".to_string(),
        }),
    ))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CustomersEnvelope {
    pub customers: Vec<CustomerSummary>,
}

#[get("/customers")]
pub async fn api_list_customers(
    _caller: ApiCaller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CustomersEnvelope>, AppError> {
    let customers = list_customers(db).await?;
    Ok(Json(CustomersEnvelope { customers }))
}

#[derive(Serialize, Debug)]
pub struct CustomerDetailResponse {
    pub user: LegacyUser,
    pub application: Option<UserApplication>,
}

#[get("/customers/<id>")]
pub async fn api_get_customer(
    id: &str,
    _caller: ApiCaller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<CustomerDetailResponse>, AppError> {
    let user = get_user(db, parse_user_id(id)?).await?;
    let application = find_application(db, user.id).await?;

    Ok(Json(CustomerDetailResponse { user, application }))
}

#[derive(Deserialize)]
pub struct AdjustSessionsRequest {
    action: Option<String>,
    count: Option<Value>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdjustSessionsResponse {
    pub success: bool,
    pub application: UserApplication,
    pub previous_count: i64,
    pub new_count: i64,
}

#[patch("/customers/<id>/sessions", data = "<request>")]
pub async fn api_adjust_customer_sessions(
    id: &str,
    request: Json<AdjustSessionsRequest>,
    caller: ApiCaller,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AdjustSessionsResponse>, AppError> {
    let user = get_user(db, parse_user_id(id)?).await?;
    let application = get_or_create_application(db, user.id).await?;

    let adjustment = CounterAdjustment::parse(request.action.as_deref(), request.count.as_ref())?;
    let previous_count = application.session_count;
    let new_count = adjustment.apply(previous_count);

    let application = set_session_count(db, application.id, new_count).await?;

    info!(
        user_id = user.id,
        role = caller.role(),
        previous_count,
        new_count = application.session_count,
        "Customer session count adjusted"
    );

    Ok(Json(AdjustSessionsResponse {
        success: true,
        previous_count,
        new_count: application.session_count,
        application,
    }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLoginRequest {
    api_key: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct AdminLoginResponse {
    pub success: bool,
    pub role: String,
}

#[post("/admin/login", data = "<request>")]
pub async fn api_admin_login(
    request: Json<AdminLoginRequest>,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<AdminLoginResponse>, AppError> {
    let Some(api_key) = non_blank(&request.api_key) else {
        return Err(AppError::Validation("API key is required".to_string()));
    };

    match resolve_api_key(db, api_key).await? {
        Some(caller) => Ok(Json(AdminLoginResponse {
            success: true,
            role: caller.role().to_string(),
        })),
        None => Err(AppError::Authentication("Invalid API key".to_string())),
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct OwnCustomerResponse {
    pub customer: CustomerSummary,
    pub customers: Vec<CustomerSummary>,
}

/// A customer key sees only its own record.
#[get("/admin/customers")]
pub async fn api_own_customer(
    user: LegacyUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<OwnCustomerResponse>, AppError> {
    let Some(customer) = get_customer_summary(db, user.id).await? else {
        return Err(AppError::NotFound("Customer not found".to_string()));
    };

    Ok(Json(OwnCustomerResponse {
        customers: vec![customer.clone()],
        customer,
    }))
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AdminCreateCustomerResponse {
    pub customer: CustomerSummary,
    pub api_key: String,
}

#[post("/admin/customers", data = "<request>")]
pub async fn api_admin_create_customer(
    request: Json<RegisterCustomerRequest>,
    caller: ApiCaller,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<AdminCreateCustomerResponse>>, AppError> {
    let validated = request.validate_json()?;
    let (name, email) = validated.required()?;

    let (user, _) =
        create_customer(db, name, &email.to_lowercase(), non_blank(&validated.phone)).await?;
    let customer = get_customer_summary(db, user.id)
        .await?
        .ok_or_else(|| AppError::Internal("Customer missing after insert".to_string()))?;

    info!(user_id = user.id, role = caller.role(), "Customer created from admin panel");

    Ok(Custom(
        Status::Created,
        Json(AdminCreateCustomerResponse {
            customer,
            api_key: user.api_key,
        }),
    ))
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RotateKeyResponse {
    pub success: bool,
    pub api_key: String,
    pub message: String,
}

#[post("/admin/api-key")]
pub async fn api_rotate_admin_key(
    admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<RotateKeyResponse>, AppError> {
    let api_key = rotate_admin_api_key(db, admin.id).await?;

    info!(admin_id = admin.id, "Admin API key rotated");

    Ok(Json(RotateKeyResponse {
        success: true,
        api_key,
        message: "API key regenerated. The previous key no longer works.".to_string(),
    }))
}
