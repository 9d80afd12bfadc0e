//! Queries over the earlier users / user_applications / admin_users tables.

use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument, warn};

use crate::error::AppError;
use crate::identity::generate_api_key;
use crate::models::{
    AdminUser, CustomerSummary, DbAdminUser, DbCustomerSummary, DbLegacyUser, DbUserApplication,
    LegacyUser, UserApplication,
};

const CUSTOMER_SUMMARY_QUERY: &str = "SELECT u.id, u.name, u.email, u.phone, u.created_at, u.updated_at,
            a.session_count, a.id AS application_id
     FROM users u
     LEFT JOIN user_applications a ON a.user_id = u.id";

#[instrument(skip(pool))]
pub async fn find_user_by_email(
    pool: &Pool<Sqlite>,
    email: &str,
) -> Result<Option<LegacyUser>, AppError> {
    info!("Looking up legacy user by email");
    let row = sqlx::query_as::<_, DbLegacyUser>(
        "SELECT id, name, email, phone, api_key, created_at, updated_at FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(LegacyUser::from))
}

#[instrument(skip(pool))]
pub async fn get_user(pool: &Pool<Sqlite>, id: i64) -> Result<LegacyUser, AppError> {
    info!("Fetching legacy user by ID");
    let row = sqlx::query_as::<_, DbLegacyUser>(
        "SELECT id, name, email, phone, api_key, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(user) => Ok(LegacyUser::from(user)),
        _ => Err(AppError::NotFound("User not found".to_string())),
    }
}

#[instrument(skip(pool, api_key))]
pub async fn find_user_by_api_key(
    pool: &Pool<Sqlite>,
    api_key: &str,
) -> Result<Option<LegacyUser>, AppError> {
    let row = sqlx::query_as::<_, DbLegacyUser>(
        "SELECT id, name, email, phone, api_key, created_at, updated_at FROM users WHERE api_key = ?",
    )
    .bind(api_key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(LegacyUser::from))
}

/// Inserts a user and its application row in one transaction.
/// The email must not already be registered.
#[instrument(skip(pool, phone))]
pub async fn create_customer(
    pool: &Pool<Sqlite>,
    name: &str,
    email: &str,
    phone: Option<&str>,
) -> Result<(LegacyUser, UserApplication), AppError> {
    info!("Creating legacy customer");

    if find_user_by_email(pool, email).await?.is_some() {
        return Err(AppError::Conflict(
            "User with this email already exists".to_string(),
        ));
    }

    let api_key = generate_api_key();
    let now = Utc::now().naive_utc();

    let mut tx = pool.begin().await?;

    let user_id = sqlx::query(
        "INSERT INTO users (name, email, phone, api_key, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(email)
    .bind(phone)
    .bind(&api_key)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    sqlx::query(
        "INSERT INTO user_applications (user_id, session_count, created_at, updated_at)
         VALUES (?, 0, ?, ?)",
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    let user = get_user(pool, user_id).await?;
    let application = get_or_create_application(pool, user_id).await?;

    Ok((user, application))
}

#[instrument(skip(pool))]
pub async fn list_customers(pool: &Pool<Sqlite>) -> Result<Vec<CustomerSummary>, AppError> {
    info!("Listing legacy customers");
    let rows = sqlx::query_as::<_, DbCustomerSummary>(&format!(
        "{} ORDER BY u.id",
        CUSTOMER_SUMMARY_QUERY
    ))
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(CustomerSummary::from).collect())
}

#[instrument(skip(pool))]
pub async fn get_customer_summary(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<CustomerSummary>, AppError> {
    let row = sqlx::query_as::<_, DbCustomerSummary>(&format!(
        "{} WHERE u.id = ? LIMIT 1",
        CUSTOMER_SUMMARY_QUERY
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(CustomerSummary::from))
}

#[instrument(skip(pool))]
pub async fn find_application(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<Option<UserApplication>, AppError> {
    let row = sqlx::query_as::<_, DbUserApplication>(
        "SELECT id, user_id, session_count, created_at, updated_at
         FROM user_applications WHERE user_id = ? ORDER BY id LIMIT 1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(UserApplication::from))
}

#[instrument(skip(pool))]
pub async fn get_or_create_application(
    pool: &Pool<Sqlite>,
    user_id: i64,
) -> Result<UserApplication, AppError> {
    if let Some(application) = find_application(pool, user_id).await? {
        return Ok(application);
    }

    info!("Creating missing application row");
    let now = Utc::now().naive_utc();
    sqlx::query(
        "INSERT INTO user_applications (user_id, session_count, created_at, updated_at)
         VALUES (?, 0, ?, ?)",
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    find_application(pool, user_id)
        .await?
        .ok_or_else(|| AppError::Internal("Application row missing after insert".to_string()))
}

#[instrument(skip(pool))]
pub async fn set_session_count(
    pool: &Pool<Sqlite>,
    application_id: i64,
    session_count: i64,
) -> Result<UserApplication, AppError> {
    info!("Updating legacy session count");
    let now = Utc::now().naive_utc();

    sqlx::query("UPDATE user_applications SET session_count = ?, updated_at = ? WHERE id = ?")
        .bind(session_count.max(0))
        .bind(now)
        .bind(application_id)
        .execute(pool)
        .await?;

    let row = sqlx::query_as::<_, DbUserApplication>(
        "SELECT id, user_id, session_count, created_at, updated_at
         FROM user_applications WHERE id = ?",
    )
    .bind(application_id)
    .fetch_optional(pool)
    .await?;

    row.map(UserApplication::from)
        .ok_or_else(|| AppError::NotFound("Application not found".to_string()))
}

#[instrument(skip(pool, api_key))]
pub async fn find_admin_by_api_key(
    pool: &Pool<Sqlite>,
    api_key: &str,
) -> Result<Option<AdminUser>, AppError> {
    let row = sqlx::query_as::<_, DbAdminUser>(
        "SELECT id, name, email, api_key, created_at FROM admin_users WHERE api_key = ?",
    )
    .bind(api_key)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(AdminUser::from))
}

#[instrument(skip(pool))]
pub async fn find_admin_by_name(
    pool: &Pool<Sqlite>,
    name: &str,
) -> Result<Option<AdminUser>, AppError> {
    let row = sqlx::query_as::<_, DbAdminUser>(
        "SELECT id, name, email, api_key, created_at FROM admin_users WHERE name = ? LIMIT 1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(AdminUser::from))
}

/// Seeds the coach's admin account. Returns the new key only when the account was created.
#[instrument(skip(pool))]
pub async fn ensure_admin_user(
    pool: &Pool<Sqlite>,
    name: &str,
    email: &str,
) -> Result<Option<String>, AppError> {
    if find_admin_by_name(pool, name).await?.is_some() {
        info!("Admin user already exists");
        return Ok(None);
    }

    let api_key = generate_api_key();
    sqlx::query("INSERT INTO admin_users (name, email, api_key) VALUES (?, ?, ?)")
        .bind(name)
        .bind(email)
        .bind(&api_key)
        .execute(pool)
        .await?;

    warn!(admin = %name, "Created admin user; store the API key printed at startup");
    Ok(Some(api_key))
}

#[instrument(skip(pool))]
pub async fn rotate_admin_api_key(pool: &Pool<Sqlite>, admin_id: i64) -> Result<String, AppError> {
    info!("Rotating admin API key");
    let api_key = generate_api_key();

    let result = sqlx::query("UPDATE admin_users SET api_key = ? WHERE id = ?")
        .bind(&api_key)
        .bind(admin_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Admin user not found".to_string()));
    }

    Ok(api_key)
}
