#[macro_use]
extern crate rocket;

mod api;
mod auth;
mod database;
mod db;
mod env;
mod error;
mod identity;
mod ledger;
mod models;
mod telemetry;
mod validation;
#[cfg(test)]
mod test;

use std::str::FromStr;
use std::sync::Arc;

use api::clients::{
    api_create_client, api_create_exercise, api_create_note, api_delete_client,
    api_delete_exercise, api_delete_note, api_get_client, api_get_exercises, api_list_clients,
    api_update_client, api_update_sessions,
};
use api::legacy::{
    api_adjust_customer_sessions, api_admin_create_customer, api_admin_login, api_get_customer,
    api_list_customers, api_own_customer, api_register_customer, api_rotate_admin_key,
};
use api::portal::{
    api_change_password, api_login, api_logout, api_me, api_update_profile,
};
use auth::{
    bad_request_api, forbidden_api, internal_error_api, not_found_api, unauthorized_api,
    unprocessable_api,
};
use database::apply_schema;
use database::legacy::ensure_admin_user;
use env::{Settings, load_environment};
use error::AppError;
use identity::{IdentityError, IdentityProvider, XorsClient};
use rocket::{Build, Rocket};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use telemetry::TelemetryFairing;
use telemetry::init_tracing;
use thiserror::Error;

use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Application error: {0}")]
    App(#[from] AppError),
    #[error("Identity client error: {0}")]
    Identity(#[from] IdentityError),
}

#[launch]
async fn rocket() -> _ {
    if let Err(e) = load_environment() {
        eprintln!("Failed to load environment files: {}", e);
    }

    init_tracing();

    match prepare(Settings::from_env()).await {
        Ok(rocket) => rocket,
        Err(e) => {
            error!("Startup failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Opens the database, applies the schema, seeds the coach's admin key and
/// builds the identity client.
async fn prepare(settings: Settings) -> Result<Rocket<Build>, Error> {
    let options = SqliteConnectOptions::from_str(&settings.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new().connect_with(options).await?;

    info!("Applying database schema...");
    apply_schema(&pool).await?;

    if let Some(api_key) = ensure_admin_user(&pool, &settings.coach_name, &settings.coach_email).await? {
        warn!(admin = %settings.coach_name, api_key = %api_key, "Admin API key issued");
    }

    let identity: Arc<dyn IdentityProvider> = Arc::new(XorsClient::new(
        &settings.xors_api_url,
        &settings.xors_source,
        settings.xors_timeout,
    )?);

    Ok(init_rocket(pool, identity, settings).await)
}

pub async fn init_rocket(
    pool: SqlitePool,
    identity: Arc<dyn IdentityProvider>,
    settings: Settings,
) -> Rocket<Build> {
    info!("Starting coach portal");

    rocket::build()
        .manage(pool)
        .manage(identity)
        .manage(settings)
        .mount(
            "/api",
            routes![
                api_list_clients,
                api_create_client,
                api_get_client,
                api_update_client,
                api_delete_client,
                api_update_sessions,
                api_create_note,
                api_delete_note,
                api_get_exercises,
                api_create_exercise,
                api_delete_exercise,
                api_login,
                api_logout,
                api_me,
                api_update_profile,
                api_change_password,
                api_register_customer,
                api_list_customers,
                api_get_customer,
                api_adjust_customer_sessions,
                api_admin_login,
                api_own_customer,
                api_admin_create_customer,
                api_rotate_admin_key,
            ],
        )
        .register(
            "/api",
            catchers![
                bad_request_api,
                unauthorized_api,
                forbidden_api,
                not_found_api,
                unprocessable_api,
                internal_error_api,
            ],
        )
        .mount("/api", routes![api::api_health])
        .attach(TelemetryFairing)
}
