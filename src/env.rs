use std::path::Path;
use std::time::Duration;

use tracing::{info, warn};

const DEFAULT_DATABASE_URL: &str = "sqlite://coach.db?mode=rwc";
const DEFAULT_XORS_API_URL: &str = "https://api.xors.app";
const DEFAULT_XORS_SOURCE: &str = "coachpalmer.org";
const DEFAULT_XORS_TIMEOUT_SECS: u64 = 15;
const DEFAULT_COACH_NAME: &str = "Palmer";
const DEFAULT_COACH_EMAIL: &str = "palmer@admin.local";

pub fn is_production() -> bool {
    dotenvy::var("ROCKET_PROFILE").unwrap_or("development".to_string()) == "production"
}

pub fn load_environment() -> Result<(), Box<dyn std::error::Error>> {
    let env_files = if is_production() {
        vec!["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        vec!["config/common.env", "config/dev.env", ".secrets.env"]
    };

    for env_file in env_files {
        load_env_file(env_file)?;
    }

    Ok(())
}

fn load_env_file(path: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !Path::new(path).exists() {
        warn!("Warning: Environment file {} not found, skipping", path);
        return Ok(());
    }

    dotenvy::from_filename_override(path)?;
    info!("Loaded environment from: {}", path);
    Ok(())
}

/// Application settings read from the process environment.
/// Rocket's own settings (address, port, `secret_key`) stay in its figment.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub xors_api_url: String,
    pub xors_source: String,
    pub xors_timeout: Duration,
    pub coach_name: String,
    pub coach_email: String,
    pub cookie_secure: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        let var_or = |key: &str, default: &str| {
            dotenvy::var(key)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let xors_timeout = dotenvy::var("XORS_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_XORS_TIMEOUT_SECS);

        let cookie_secure = match dotenvy::var("COOKIE_SECURE") {
            Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            Err(_) => is_production(),
        };

        Self {
            database_url: var_or("DATABASE_URL", DEFAULT_DATABASE_URL),
            xors_api_url: var_or("XORS_API_URL", DEFAULT_XORS_API_URL),
            xors_source: var_or("XORS_SOURCE", DEFAULT_XORS_SOURCE),
            xors_timeout: Duration::from_secs(xors_timeout),
            coach_name: var_or("COACH_NAME", DEFAULT_COACH_NAME),
            coach_email: var_or("COACH_EMAIL", DEFAULT_COACH_EMAIL),
            cookie_secure,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            xors_api_url: DEFAULT_XORS_API_URL.to_string(),
            xors_source: DEFAULT_XORS_SOURCE.to_string(),
            xors_timeout: Duration::from_secs(DEFAULT_XORS_TIMEOUT_SECS),
            coach_name: DEFAULT_COACH_NAME.to_string(),
            coach_email: DEFAULT_COACH_EMAIL.to_string(),
            cookie_secure: false,
        }
    }
}
