use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rocket::State;
use rocket::http::Status;
use rocket::response::status::Custom;
use rocket::serde::json::Json;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};
use validator::Validate;

use crate::db::{
    create_client, create_exercise_log, create_note, delete_client, delete_exercise_log,
    delete_note, get_client, get_exercise_logs_for_client, get_notes_for_client, list_clients,
    store_session_counters, update_client,
};
use crate::error::AppError;
use crate::identity::{IdentityProvider, generate_client_password};
use crate::ledger::SessionAction;
use crate::models::{AdminUser, Client, ClientChanges, ExerciseLog, NewClient, NewExerciseLog, Note};
use crate::validation::{JsonValidateExt, deserialize_some, non_blank};

use super::SuccessResponse;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct NoteResponse {
    pub id: String,
    pub date: NaiveDate,
    pub content: String,
    pub created_at: String,
}

impl From<Note> for NoteResponse {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            date: note.created_at.date_naive(),
            content: note.content,
            created_at: note.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseResponse {
    pub id: String,
    pub exercise: String,
    pub weight: Decimal,
    pub reps: i64,
    pub sets: i64,
    pub notes: Option<String>,
    pub date: NaiveDate,
    pub created_at: String,
}

impl From<ExerciseLog> for ExerciseResponse {
    fn from(log: ExerciseLog) -> Self {
        Self {
            id: log.id,
            exercise: log.exercise,
            weight: log.weight,
            reps: log.reps,
            sets: log.sets,
            notes: log.notes,
            date: log.created_at.date_naive(),
            created_at: log.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ClientResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub sessions_remaining: i64,
    pub total_sessions: i64,
    pub goals: Option<String>,
    pub current_weight: Option<Decimal>,
    pub target_weight: Option<Decimal>,
    pub last_session_date: Option<NaiveDate>,
    pub created_at: String,
    pub updated_at: String,
    pub xors_user_id: String,
    pub notes: Vec<NoteResponse>,
    pub exercises: Vec<ExerciseResponse>,
}

impl ClientResponse {
    pub fn new(client: Client, notes: Vec<Note>, exercises: Vec<ExerciseLog>) -> Self {
        Self {
            id: client.id,
            name: client.name,
            email: client.email,
            phone: client.phone,
            sessions_remaining: client.sessions_remaining,
            total_sessions: client.total_sessions,
            goals: client.goals,
            current_weight: client.current_weight,
            target_weight: client.target_weight,
            last_session_date: client.last_session_date,
            created_at: client.created_at.to_rfc3339(),
            updated_at: client.updated_at.to_rfc3339(),
            xors_user_id: client.xors_user_id,
            notes: notes.into_iter().map(NoteResponse::from).collect(),
            exercises: exercises.into_iter().map(ExerciseResponse::from).collect(),
        }
    }
}

/// Loads a client with its notes and exercise logs.
pub async fn load_client_detail(pool: &Pool<Sqlite>, id: &str) -> Result<ClientResponse, AppError> {
    let client = get_client(pool, id).await?;
    let notes = get_notes_for_client(pool, &client.id).await?;
    let exercises = get_exercise_logs_for_client(pool, &client.id).await?;

    Ok(ClientResponse::new(client, notes, exercises))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ClientEnvelope {
    pub client: ClientResponse,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ClientsEnvelope {
    pub clients: Vec<ClientResponse>,
}

#[get("/clients")]
pub async fn api_list_clients(
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ClientsEnvelope>, AppError> {
    let clients = list_clients(db).await?;

    let mut responses = Vec::with_capacity(clients.len());
    for client in clients {
        let notes = get_notes_for_client(db, &client.id).await?;
        let exercises = get_exercise_logs_for_client(db, &client.id).await?;
        responses.push(ClientResponse::new(client, notes, exercises));
    }

    Ok(Json(ClientsEnvelope { clients: responses }))
}

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    name: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    email: Option<String>,
    phone: Option<String>,
    sessions_remaining: Option<i64>,
    goals: Option<String>,
    current_weight: Option<Decimal>,
    target_weight: Option<Decimal>,
}

/// Shown to the coach once, to pass on to the client.
#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub api_key: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct CreateClientResponse {
    pub client: ClientResponse,
    pub credentials: Credentials,
}

#[post("/clients", data = "<request>")]
pub async fn api_create_client(
    request: Json<CreateClientRequest>,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
    identity: &State<Arc<dyn IdentityProvider>>,
) -> Result<Custom<Json<CreateClientResponse>>, AppError> {
    let validated = request.validate_json()?;

    let (Some(name), Some(email)) = (non_blank(&validated.name), non_blank(&validated.email))
    else {
        return Err(AppError::Validation(
            "Name and email are required".to_string(),
        ));
    };
    let email = email.to_lowercase();

    let password = generate_client_password();
    let account = identity.create_account(&email, &password).await?;

    let new_client = NewClient {
        xors_user_id: account.id.clone(),
        xors_api_key: Some(account.key.clone()),
        name: name.to_string(),
        email: email.clone(),
        phone: non_blank(&validated.phone).map(String::from),
        sessions_remaining: validated.sessions_remaining.unwrap_or(0),
        goals: non_blank(&validated.goals).map(String::from),
        current_weight: validated.current_weight,
        target_weight: validated.target_weight,
    };

    let client = match create_client(db, &new_client).await {
        Ok(client) => client,
        Err(err) => {
            warn!(
                xors_user_id = %account.id,
                "Identity account exists without a local client; reconcile by hand"
            );
            return Err(err);
        }
    };

    info!(client_id = %client.id, "Client provisioned");

    Ok(Custom(
        Status::Created,
        Json(CreateClientResponse {
            client: ClientResponse::new(client, Vec::new(), Vec::new()),
            credentials: Credentials {
                email,
                password,
                api_key: account.key,
            },
        }),
    ))
}

#[get("/clients/<id>")]
pub async fn api_get_client(
    id: &str,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ClientEnvelope>, AppError> {
    let client = load_client_detail(db, id).await?;
    Ok(Json(ClientEnvelope { client }))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClientRequest {
    #[serde(default, deserialize_with = "deserialize_some")]
    phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    goals: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    current_weight: Option<Option<Decimal>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    target_weight: Option<Option<Decimal>>,
    sessions_remaining: Option<i64>,
    total_sessions: Option<i64>,
    #[serde(default, deserialize_with = "deserialize_some")]
    last_session_date: Option<Option<NaiveDate>>,
}

impl From<UpdateClientRequest> for ClientChanges {
    fn from(request: UpdateClientRequest) -> Self {
        Self {
            phone: request.phone,
            goals: request.goals,
            current_weight: request.current_weight,
            target_weight: request.target_weight,
            sessions_remaining: request.sessions_remaining,
            total_sessions: request.total_sessions,
            last_session_date: request.last_session_date,
        }
    }
}

#[put("/clients/<id>", data = "<request>")]
pub async fn api_update_client(
    id: &str,
    request: Json<UpdateClientRequest>,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ClientEnvelope>, AppError> {
    let changes = ClientChanges::from(request.into_inner());
    update_client(db, id, &changes).await?;

    let client = load_client_detail(db, id).await?;
    Ok(Json(ClientEnvelope { client }))
}

#[delete("/clients/<id>")]
pub async fn api_delete_client(
    id: &str,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SuccessResponse>, AppError> {
    delete_client(db, id).await?;
    Ok(Json(SuccessResponse::ok()))
}

#[derive(Deserialize)]
pub struct SessionUpdateRequest {
    action: Option<String>,
    count: Option<Value>,
}

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SessionCountersResponse {
    pub id: String,
    pub sessions_remaining: i64,
    pub total_sessions: i64,
    pub last_session_date: Option<NaiveDate>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionCountersEnvelope {
    pub client: SessionCountersResponse,
}

#[put("/clients/<id>/sessions", data = "<request>")]
pub async fn api_update_sessions(
    id: &str,
    request: Json<SessionUpdateRequest>,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SessionCountersEnvelope>, AppError> {
    let client = get_client(db, id).await?;
    let action = SessionAction::parse(request.action.as_deref(), request.count.as_ref())?;

    let counters = client.counters().apply(action, Utc::now().date_naive());
    let updated = store_session_counters(db, &client.id, counters).await?;

    info!(
        client_id = %updated.id,
        action = ?action,
        sessions_remaining = updated.sessions_remaining,
        total_sessions = updated.total_sessions,
        "Session credits updated"
    );

    Ok(Json(SessionCountersEnvelope {
        client: SessionCountersResponse {
            id: updated.id,
            sessions_remaining: updated.sessions_remaining,
            total_sessions: updated.total_sessions,
            last_session_date: updated.last_session_date,
        },
    }))
}

#[derive(Deserialize)]
pub struct CreateNoteRequest {
    content: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct NoteEnvelope {
    pub note: NoteResponse,
}

#[post("/clients/<id>/notes", data = "<request>")]
pub async fn api_create_note(
    id: &str,
    request: Json<CreateNoteRequest>,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<NoteEnvelope>>, AppError> {
    let Some(content) = non_blank(&request.content) else {
        return Err(AppError::Validation(
            "Note content is required".to_string(),
        ));
    };

    let client = get_client(db, id).await?;
    let note = create_note(db, &client.id, content).await?;

    Ok(Custom(
        Status::Created,
        Json(NoteEnvelope {
            note: NoteResponse::from(note),
        }),
    ))
}

#[delete("/clients/<id>/notes/<note_id>")]
pub async fn api_delete_note(
    id: &str,
    note_id: &str,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SuccessResponse>, AppError> {
    delete_note(db, id, note_id).await?;
    Ok(Json(SuccessResponse::ok()))
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ExercisesEnvelope {
    pub exercises: Vec<ExerciseResponse>,
}

#[get("/clients/<id>/exercises")]
pub async fn api_get_exercises(
    id: &str,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<ExercisesEnvelope>, AppError> {
    let client = get_client(db, id).await?;
    let logs = get_exercise_logs_for_client(db, &client.id).await?;

    Ok(Json(ExercisesEnvelope {
        exercises: logs.into_iter().map(ExerciseResponse::from).collect(),
    }))
}

const MAX_EXERCISE_NAME: usize = 100;

#[derive(Deserialize, Validate)]
pub struct CreateExerciseRequest {
    exercise: Option<String>,
    weight: Option<Decimal>,
    #[validate(range(min = 1, message = "Reps must be at least 1"))]
    reps: Option<i64>,
    #[validate(range(min = 1, message = "Sets must be at least 1"))]
    sets: Option<i64>,
    notes: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ExerciseEnvelope {
    pub exercise: ExerciseResponse,
}

#[post("/clients/<id>/exercises", data = "<request>")]
pub async fn api_create_exercise(
    id: &str,
    request: Json<CreateExerciseRequest>,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Custom<Json<ExerciseEnvelope>>, AppError> {
    let validated = request.validate_json()?;

    let (Some(exercise), Some(weight), Some(reps)) =
        (non_blank(&validated.exercise), validated.weight, validated.reps)
    else {
        return Err(AppError::Validation(
            "Exercise, weight, and reps are required".to_string(),
        ));
    };

    if exercise.chars().count() > MAX_EXERCISE_NAME {
        return Err(AppError::Validation(format!(
            "Exercise name must be at most {} characters",
            MAX_EXERCISE_NAME
        )));
    }

    if weight.is_sign_negative() {
        return Err(AppError::Validation(
            "Weight must not be negative".to_string(),
        ));
    }

    let client = get_client(db, id).await?;
    let log = create_exercise_log(
        db,
        &client.id,
        &NewExerciseLog {
            exercise: exercise.to_string(),
            weight,
            reps,
            sets: validated.sets.unwrap_or(1),
            notes: non_blank(&validated.notes).map(String::from),
        },
    )
    .await?;

    Ok(Custom(
        Status::Created,
        Json(ExerciseEnvelope {
            exercise: ExerciseResponse::from(log),
        }),
    ))
}

#[delete("/clients/<id>/exercises/<exercise_id>")]
pub async fn api_delete_exercise(
    id: &str,
    exercise_id: &str,
    _admin: AdminUser,
    db: &State<Pool<Sqlite>>,
) -> Result<Json<SuccessResponse>, AppError> {
    delete_exercise_log(db, id, exercise_id).await?;
    Ok(Json(SuccessResponse::ok()))
}
