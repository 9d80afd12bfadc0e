use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::ledger::SessionCounters;

fn to_utc(dt: Option<NaiveDateTime>) -> DateTime<Utc> {
    dt.map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .unwrap_or_else(Utc::now)
}

fn to_decimal(value: Option<String>) -> Option<Decimal> {
    value.and_then(|v| Decimal::from_str(&v).ok())
}

/// Weights are stored as text with two decimal places.
pub fn decimal_to_db(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.round_dp(2).to_string())
}

#[derive(Debug, Clone, Serialize)]
pub struct Client {
    pub id: String,
    pub xors_user_id: String,
    pub xors_api_key: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub sessions_remaining: i64,
    pub total_sessions: i64,
    pub goals: Option<String>,
    pub current_weight: Option<Decimal>,
    pub target_weight: Option<Decimal>,
    pub last_session_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    pub fn counters(&self) -> SessionCounters {
        SessionCounters {
            sessions_remaining: self.sessions_remaining,
            total_sessions: self.total_sessions,
            last_session_date: self.last_session_date,
        }
    }
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbClient {
    pub id: Option<String>,
    pub xors_user_id: Option<String>,
    pub xors_api_key: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub sessions_remaining: Option<i64>,
    pub total_sessions: Option<i64>,
    pub goals: Option<String>,
    pub current_weight: Option<String>,
    pub target_weight: Option<String>,
    pub last_session_date: Option<NaiveDate>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbClient> for Client {
    fn from(db: DbClient) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            xors_user_id: db.xors_user_id.unwrap_or_default(),
            xors_api_key: db.xors_api_key,
            name: db.name.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            phone: db.phone,
            sessions_remaining: db.sessions_remaining.unwrap_or_default(),
            total_sessions: db.total_sessions.unwrap_or_default(),
            goals: db.goals,
            current_weight: to_decimal(db.current_weight),
            target_weight: to_decimal(db.target_weight),
            last_session_date: db.last_session_date,
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

/// Fields for a new client row. Counters are clamped by the insert.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub xors_user_id: String,
    pub xors_api_key: Option<String>,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub sessions_remaining: i64,
    pub goals: Option<String>,
    pub current_weight: Option<Decimal>,
    pub target_weight: Option<Decimal>,
}

/// Coach edits to a client. `None` leaves a column alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ClientChanges {
    pub phone: Option<Option<String>>,
    pub goals: Option<Option<String>>,
    pub current_weight: Option<Option<Decimal>>,
    pub target_weight: Option<Option<Decimal>>,
    pub sessions_remaining: Option<i64>,
    pub total_sessions: Option<i64>,
    pub last_session_date: Option<Option<NaiveDate>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Note {
    pub id: String,
    pub client_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbNote {
    pub id: Option<String>,
    pub client_id: Option<String>,
    pub content: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbNote> for Note {
    fn from(db: DbNote) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            client_id: db.client_id.unwrap_or_default(),
            content: db.content.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExerciseLog {
    pub id: String,
    pub client_id: String,
    pub exercise: String,
    pub weight: Decimal,
    pub reps: i64,
    pub sets: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbExerciseLog {
    pub id: Option<String>,
    pub client_id: Option<String>,
    pub exercise: Option<String>,
    pub weight: Option<String>,
    pub reps: Option<i64>,
    pub sets: Option<i64>,
    pub notes: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbExerciseLog> for ExerciseLog {
    fn from(db: DbExerciseLog) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            client_id: db.client_id.unwrap_or_default(),
            exercise: db.exercise.unwrap_or_default(),
            weight: to_decimal(db.weight).unwrap_or_default(),
            reps: db.reps.unwrap_or_default(),
            sets: db.sets.unwrap_or(1),
            notes: db.notes,
            created_at: to_utc(db.created_at),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewExerciseLog {
    pub exercise: String,
    pub weight: Decimal,
    pub reps: i64,
    pub sets: i64,
    pub notes: Option<String>,
}

// Legacy schema: users with an API key and a one-to-one session counter row.

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbLegacyUser {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub api_key: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbLegacyUser> for LegacyUser {
    fn from(db: DbLegacyUser) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            phone: db.phone,
            api_key: db.api_key.unwrap_or_default(),
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserApplication {
    pub id: i64,
    pub user_id: i64,
    pub session_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbUserApplication {
    pub id: Option<i64>,
    pub user_id: Option<i64>,
    pub session_count: Option<i64>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<DbUserApplication> for UserApplication {
    fn from(db: DbUserApplication) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            user_id: db.user_id.unwrap_or_default(),
            session_count: db.session_count.unwrap_or_default(),
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
        }
    }
}

/// A legacy user joined with its application row, if any.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub session_count: Option<i64>,
    pub application_id: Option<i64>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbCustomerSummary {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
    pub session_count: Option<i64>,
    pub application_id: Option<i64>,
}

impl From<DbCustomerSummary> for CustomerSummary {
    fn from(db: DbCustomerSummary) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            phone: db.phone,
            created_at: to_utc(db.created_at),
            updated_at: to_utc(db.updated_at),
            session_count: db.session_count,
            application_id: db.application_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AdminUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Clone, Default)]
pub struct DbAdminUser {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub api_key: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

impl From<DbAdminUser> for AdminUser {
    fn from(db: DbAdminUser) -> Self {
        Self {
            id: db.id.unwrap_or_default(),
            name: db.name.unwrap_or_default(),
            email: db.email.unwrap_or_default(),
            api_key: db.api_key.unwrap_or_default(),
            created_at: to_utc(db.created_at),
        }
    }
}
