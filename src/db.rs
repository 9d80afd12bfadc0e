use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::AppError;
use crate::ledger::SessionCounters;
use crate::models::{
    Client, ClientChanges, DbClient, DbExerciseLog, DbNote, ExerciseLog, NewClient,
    NewExerciseLog, Note, decimal_to_db,
};

const CLIENT_COLUMNS: &str = "id, xors_user_id, xors_api_key, name, email, phone, \
     sessions_remaining, total_sessions, goals, current_weight, target_weight, \
     last_session_date, created_at, updated_at";

#[instrument(skip(pool, client), fields(xors_user_id = %client.xors_user_id))]
pub async fn create_client(pool: &Pool<Sqlite>, client: &NewClient) -> Result<Client, AppError> {
    info!("Creating client");
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();
    let sessions = client.sessions_remaining.max(0);

    sqlx::query(
        "INSERT INTO clients
         (id, xors_user_id, xors_api_key, name, email, phone, sessions_remaining,
          total_sessions, goals, current_weight, target_weight, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(&client.xors_user_id)
    .bind(&client.xors_api_key)
    .bind(&client.name)
    .bind(client.email.to_lowercase())
    .bind(&client.phone)
    .bind(sessions)
    .bind(sessions)
    .bind(&client.goals)
    .bind(decimal_to_db(client.current_weight))
    .bind(decimal_to_db(client.target_weight))
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_client(pool, &id).await
}

#[instrument(skip(pool))]
pub async fn get_client(pool: &Pool<Sqlite>, id: &str) -> Result<Client, AppError> {
    info!("Fetching client by ID");
    let row = sqlx::query_as::<_, DbClient>(&format!(
        "SELECT {} FROM clients WHERE id = ?",
        CLIENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(client) => Ok(Client::from(client)),
        _ => Err(AppError::NotFound("Client not found".to_string())),
    }
}

#[instrument(skip(pool))]
pub async fn find_client_by_xors_user_id(
    pool: &Pool<Sqlite>,
    xors_user_id: &str,
) -> Result<Option<Client>, AppError> {
    info!("Looking up client by identity provider user ID");
    let row = sqlx::query_as::<_, DbClient>(&format!(
        "SELECT {} FROM clients WHERE xors_user_id = ?",
        CLIENT_COLUMNS
    ))
    .bind(xors_user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(Client::from))
}

#[instrument(skip(pool))]
pub async fn list_clients(pool: &Pool<Sqlite>) -> Result<Vec<Client>, AppError> {
    info!("Listing clients");
    let rows = sqlx::query_as::<_, DbClient>(&format!(
        "SELECT {} FROM clients ORDER BY created_at DESC, rowid DESC",
        CLIENT_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    // No error thrown if there are no clients
    Ok(rows.into_iter().map(Client::from).collect())
}

#[instrument(skip(pool, changes))]
pub async fn update_client(
    pool: &Pool<Sqlite>,
    id: &str,
    changes: &ClientChanges,
) -> Result<Client, AppError> {
    info!("Updating client");
    let current = get_client(pool, id).await?;

    let phone = changes.phone.clone().unwrap_or(current.phone);
    let goals = changes.goals.clone().unwrap_or(current.goals);
    let current_weight = changes.current_weight.unwrap_or(current.current_weight);
    let target_weight = changes.target_weight.unwrap_or(current.target_weight);
    let sessions_remaining = changes
        .sessions_remaining
        .unwrap_or(current.sessions_remaining)
        .max(0);
    let total_sessions = changes
        .total_sessions
        .unwrap_or(current.total_sessions)
        .max(0);
    let last_session_date = changes
        .last_session_date
        .unwrap_or(current.last_session_date);
    let now = Utc::now().naive_utc();

    sqlx::query(
        "UPDATE clients
         SET phone = ?, goals = ?, current_weight = ?, target_weight = ?,
             sessions_remaining = ?, total_sessions = ?, last_session_date = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(phone)
    .bind(goals)
    .bind(decimal_to_db(current_weight))
    .bind(decimal_to_db(target_weight))
    .bind(sessions_remaining)
    .bind(total_sessions)
    .bind(last_session_date)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    get_client(pool, id).await
}

#[instrument(skip(pool, phone))]
pub async fn update_client_phone(
    pool: &Pool<Sqlite>,
    id: &str,
    phone: Option<&str>,
) -> Result<Client, AppError> {
    info!("Updating client phone");
    let now = Utc::now().naive_utc();

    let result = sqlx::query("UPDATE clients SET phone = ?, updated_at = ? WHERE id = ?")
        .bind(phone)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Client not found".to_string()));
    }

    get_client(pool, id).await
}

#[instrument(skip(pool))]
pub async fn store_session_counters(
    pool: &Pool<Sqlite>,
    id: &str,
    counters: SessionCounters,
) -> Result<Client, AppError> {
    info!(
        sessions_remaining = counters.sessions_remaining,
        total_sessions = counters.total_sessions,
        "Storing session counters"
    );
    let now = Utc::now().naive_utc();

    let result = sqlx::query(
        "UPDATE clients
         SET sessions_remaining = ?, total_sessions = ?, last_session_date = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(counters.sessions_remaining.max(0))
    .bind(counters.total_sessions.max(0))
    .bind(counters.last_session_date)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Client not found".to_string()));
    }

    get_client(pool, id).await
}

/// Notes and exercise logs go with the client through `ON DELETE CASCADE`.
#[instrument(skip(pool))]
pub async fn delete_client(pool: &Pool<Sqlite>, id: &str) -> Result<(), AppError> {
    info!("Deleting client");
    let result = sqlx::query("DELETE FROM clients WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Client not found".to_string()));
    }

    Ok(())
}

#[instrument(skip(pool, content))]
pub async fn create_note(
    pool: &Pool<Sqlite>,
    client_id: &str,
    content: &str,
) -> Result<Note, AppError> {
    info!("Adding note to client");
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query("INSERT INTO client_notes (id, client_id, content, created_at) VALUES (?, ?, ?, ?)")
        .bind(&id)
        .bind(client_id)
        .bind(content)
        .bind(now)
        .execute(pool)
        .await?;

    let row = sqlx::query_as::<_, DbNote>(
        "SELECT id, client_id, content, created_at FROM client_notes WHERE id = ?",
    )
    .bind(&id)
    .fetch_one(pool)
    .await?;

    Ok(Note::from(row))
}

#[instrument(skip(pool))]
pub async fn get_notes_for_client(
    pool: &Pool<Sqlite>,
    client_id: &str,
) -> Result<Vec<Note>, AppError> {
    info!("Getting client notes");
    let rows = sqlx::query_as::<_, DbNote>(
        "SELECT id, client_id, content, created_at FROM client_notes
         WHERE client_id = ?
         ORDER BY created_at DESC, rowid DESC",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(Note::from).collect())
}

#[instrument(skip(pool))]
pub async fn delete_note(
    pool: &Pool<Sqlite>,
    client_id: &str,
    note_id: &str,
) -> Result<(), AppError> {
    info!("Deleting client note");
    let result = sqlx::query("DELETE FROM client_notes WHERE id = ? AND client_id = ?")
        .bind(note_id)
        .bind(client_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Note not found".to_string()));
    }

    Ok(())
}

#[instrument(skip(pool, log), fields(exercise = %log.exercise))]
pub async fn create_exercise_log(
    pool: &Pool<Sqlite>,
    client_id: &str,
    log: &NewExerciseLog,
) -> Result<ExerciseLog, AppError> {
    info!("Adding exercise log");
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().naive_utc();

    sqlx::query(
        "INSERT INTO exercise_logs (id, client_id, exercise, weight, reps, sets, notes, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(client_id)
    .bind(log.exercise.trim())
    .bind(decimal_to_db(Some(log.weight)))
    .bind(log.reps)
    .bind(log.sets)
    .bind(&log.notes)
    .bind(now)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, DbExerciseLog>(
        "SELECT id, client_id, exercise, weight, reps, sets, notes, created_at
         FROM exercise_logs WHERE id = ?",
    )
    .bind(&id)
    .fetch_one(pool)
    .await?;

    Ok(ExerciseLog::from(row))
}

#[instrument(skip(pool))]
pub async fn get_exercise_logs_for_client(
    pool: &Pool<Sqlite>,
    client_id: &str,
) -> Result<Vec<ExerciseLog>, AppError> {
    info!("Getting exercise logs");
    let rows = sqlx::query_as::<_, DbExerciseLog>(
        "SELECT id, client_id, exercise, weight, reps, sets, notes, created_at
         FROM exercise_logs
         WHERE client_id = ?
         ORDER BY created_at DESC, rowid DESC",
    )
    .bind(client_id)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(ExerciseLog::from).collect())
}

#[instrument(skip(pool))]
pub async fn delete_exercise_log(
    pool: &Pool<Sqlite>,
    client_id: &str,
    exercise_id: &str,
) -> Result<(), AppError> {
    info!("Deleting exercise log");
    let result = sqlx::query("DELETE FROM exercise_logs WHERE id = ? AND client_id = ?")
        .bind(exercise_id)
        .bind(client_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Exercise log not found".to_string()));
    }

    Ok(())
}
