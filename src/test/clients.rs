#[cfg(test)]
mod tests {
    use crate::api::clients::{
        ClientEnvelope, ClientsEnvelope, CreateClientResponse, ExerciseEnvelope,
        ExercisesEnvelope, NoteEnvelope, SessionCountersEnvelope,
    };
    use crate::test::test_utils::{
        TestDbBuilder, admin_key, api_key, create_standard_test_db, setup_test_client,
    };
    use crate::validation::ErrorResponse;
    use chrono::Utc;
    use rocket::http::{ContentType, Header, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use rust_decimal::Decimal;
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};
    use std::str::FromStr;

    async fn read_json<T: DeserializeOwned>(response: LocalResponse<'_>) -> T {
        let body = response.into_string().await.unwrap();
        serde_json::from_str(&body).unwrap()
    }

    async fn update_sessions<'c>(
        client: &'c Client,
        key: Header<'static>,
        id: &str,
        body: Value,
    ) -> LocalResponse<'c> {
        client
            .put(format!("/api/clients/{}/sessions", id))
            .header(ContentType::JSON)
            .header(key)
            .body(body.to_string())
            .dispatch()
            .await
    }

    #[rocket::async_test]
    async fn test_client_endpoints_require_admin_key() {
        let test_db = create_standard_test_db().await;
        let customer_key = test_db.customer_key("carol@example.com").unwrap();
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/api/clients").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
        let error: ErrorResponse = read_json(response).await;
        assert!(!error.error.is_empty());

        let response = client
            .get("/api/clients")
            .header(api_key("not-a-real-key"))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Unauthorized);

        let response = client
            .get("/api/clients")
            .header(api_key(&customer_key))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
    }

    #[rocket::async_test]
    async fn test_create_client_provisions_identity_account() {
        let test_db = TestDbBuilder::new().admin().build().await.unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post("/api/clients")
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(
                json!({
                    "name": "Eve Newclient",
                    "email": "Eve@Example.com",
                    "phone": "555-0199",
                    "sessionsRemaining": 8,
                    "goals": "Deadlift bodyweight",
                    "currentWeight": 70.5
                })
                .to_string(),
            )
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Created);
        let created: CreateClientResponse = read_json(response).await;

        assert_eq!(created.client.email, "eve@example.com");
        assert_eq!(created.client.sessions_remaining, 8);
        assert_eq!(created.client.total_sessions, 8);
        assert_eq!(
            created.client.current_weight,
            Some(Decimal::from_str("70.5").unwrap())
        );
        assert!(created.client.notes.is_empty());

        let password = &created.credentials.password;
        assert_eq!(password.len(), 13);
        assert!(password.ends_with('!'));
        assert_eq!(created.credentials.email, "eve@example.com");
        // The fake provider numbers its keys in creation order.
        assert_eq!(created.credentials.api_key, "xors-key-1");
        assert_eq!(
            test_db.identity.password_of("eve@example.com").as_deref(),
            Some(password.as_str())
        );

        let response = client
            .get("/api/clients")
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        let list: ClientsEnvelope = read_json(response).await;
        assert_eq!(list.clients.len(), 1);
        assert_eq!(list.clients[0].id, created.client.id);
    }

    #[rocket::async_test]
    async fn test_create_client_validates_input() {
        let test_db = TestDbBuilder::new().admin().build().await.unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        for body in [
            json!({ "name": "No Email" }),
            json!({ "email": "noname@example.com" }),
            json!({ "name": "  ", "email": "blank@example.com" }),
            json!({ "name": "Bad Email", "email": "not-an-email" }),
        ] {
            let response = client
                .post("/api/clients")
                .header(ContentType::JSON)
                .header(admin_key(&test_db))
                .body(body.to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), Status::BadRequest, "body: {}", body);
        }

        assert_eq!(test_db.count_rows("clients").await, 0);
        assert!(!test_db.identity.has_account("noname@example.com"));
    }

    #[rocket::async_test]
    async fn test_provider_rejection_leaves_no_client() {
        let test_db = TestDbBuilder::new()
            .admin()
            .orphan_account("taken@example.com")
            .build()
            .await
            .unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post("/api/clients")
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "name": "Taken", "email": "taken@example.com" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Conflict);
        let error: ErrorResponse = read_json(response).await;
        assert_eq!(error.error, "User already exists");
        assert_eq!(test_db.count_rows("clients").await, 0);
    }

    #[rocket::async_test]
    async fn test_provider_outage_is_service_unavailable() {
        let test_db = TestDbBuilder::new().admin().build().await.unwrap();
        test_db.identity.set_unreachable(true);
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post("/api/clients")
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "name": "Frank", "email": "frank@example.com" }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::ServiceUnavailable);
        assert_eq!(test_db.count_rows("clients").await, 0);
    }

    #[rocket::async_test]
    async fn test_get_update_and_delete_client() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.client_id("alice@example.com").unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .put(format!("/api/clients/{}", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(
                json!({
                    "goals": "Lose 5kg",
                    "targetWeight": 65,
                    "lastSessionDate": "2024-02-01"
                })
                .to_string(),
            )
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        let updated: ClientEnvelope = read_json(response).await;
        assert_eq!(updated.client.goals.as_deref(), Some("Lose 5kg"));
        assert_eq!(updated.client.target_weight, Some(Decimal::from(65)));
        assert_eq!(
            updated.client.last_session_date.map(|d| d.to_string()).as_deref(),
            Some("2024-02-01")
        );
        assert_eq!(updated.client.sessions_remaining, 10);

        let response = client
            .put(format!("/api/clients/{}", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "goals": null }).to_string())
            .dispatch()
            .await;
        let cleared: ClientEnvelope = read_json(response).await;
        assert_eq!(cleared.client.goals, None);
        assert_eq!(cleared.client.target_weight, Some(Decimal::from(65)));

        let response = client
            .delete(format!("/api/clients/{}", alice))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .get(format!("/api/clients/{}", alice))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
        let error: ErrorResponse = read_json(response).await;
        assert_eq!(error.error, "Client not found");
    }

    #[rocket::async_test]
    async fn test_unknown_client_is_not_found() {
        let test_db = create_standard_test_db().await;
        let (client, test_db) = setup_test_client(test_db).await;

        for response in [
            client
                .get("/api/clients/no-such-client")
                .header(admin_key(&test_db))
                .dispatch()
                .await,
            client
                .delete("/api/clients/no-such-client")
                .header(admin_key(&test_db))
                .dispatch()
                .await,
            update_sessions(
                &client,
                admin_key(&test_db),
                "no-such-client",
                json!({ "action": "increment" }),
            )
            .await,
        ] {
            assert_eq!(response.status(), Status::NotFound);
        }
    }

    #[rocket::async_test]
    async fn test_decrementing_past_zero() {
        let test_db = TestDbBuilder::new()
            .admin()
            .client("Gina", "gina@example.com", 2)
            .build()
            .await
            .unwrap();
        let gina = test_db.client_id("gina@example.com").unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let mut last = None;
        for _ in 0..3 {
            let response = update_sessions(
                &client,
                admin_key(&test_db),
                &gina,
                json!({ "action": "decrement" }),
            )
            .await;
            assert_eq!(response.status(), Status::Ok);
            last = Some(read_json::<SessionCountersEnvelope>(response).await);
        }

        let last = last.unwrap();
        assert_eq!(last.client.id, gina);
        assert_eq!(last.client.sessions_remaining, 0);
        assert_eq!(last.client.total_sessions, 2);
        assert_eq!(last.client.last_session_date, Some(Utc::now().date_naive()));
    }

    #[rocket::async_test]
    async fn test_increment_at_largest_count_saturates() {
        let test_db = create_standard_test_db().await;
        let bob = test_db.client_id("bob@example.com").unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = update_sessions(
            &client,
            admin_key(&test_db),
            &bob,
            json!({ "action": "reset", "count": i64::MAX }),
        )
        .await;
        assert_eq!(response.status(), Status::Ok);

        let response =
            update_sessions(&client, admin_key(&test_db), &bob, json!({ "action": "increment" }))
                .await;
        assert_eq!(response.status(), Status::Ok);
        let body: SessionCountersEnvelope = read_json(response).await;
        assert_eq!(body.client.sessions_remaining, i64::MAX);
        assert_eq!(body.client.total_sessions, i64::MAX);
    }

    #[rocket::async_test]
    async fn test_session_actions_over_http() {
        let test_db = create_standard_test_db().await;
        let bob = test_db.client_id("bob@example.com").unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response =
            update_sessions(&client, admin_key(&test_db), &bob, json!({ "action": "increment" }))
                .await;
        let body: SessionCountersEnvelope = read_json(response).await;
        assert_eq!(body.client.sessions_remaining, 1);
        assert_eq!(body.client.total_sessions, 1);

        let response = update_sessions(
            &client,
            admin_key(&test_db),
            &bob,
            json!({ "action": "reset", "count": 12 }),
        )
        .await;
        let body: SessionCountersEnvelope = read_json(response).await;
        assert_eq!(body.client.sessions_remaining, 12);
        assert_eq!(body.client.total_sessions, 12);

        let response = update_sessions(
            &client,
            admin_key(&test_db),
            &bob,
            json!({ "action": "set", "count": 5 }),
        )
        .await;
        let body: SessionCountersEnvelope = read_json(response).await;
        assert_eq!(body.client.sessions_remaining, 5);
        assert_eq!(body.client.total_sessions, 12);

        for bad in [
            json!({ "action": "set" }),
            json!({ "action": "reset", "count": "ten" }),
            json!({ "action": "refund" }),
            json!({}),
        ] {
            let response = update_sessions(&client, admin_key(&test_db), &bob, bad.clone()).await;
            assert_eq!(response.status(), Status::BadRequest, "body: {}", bad);
        }

        let response = client
            .get(format!("/api/clients/{}", bob))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        let unchanged: ClientEnvelope = read_json(response).await;
        assert_eq!(unchanged.client.sessions_remaining, 5);
        assert_eq!(unchanged.client.total_sessions, 12);
    }

    #[rocket::async_test]
    async fn test_notes_round_trip() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.client_id("alice@example.com").unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post(format!("/api/clients/{}/notes", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "content": "Left shoulder tight" }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let created: NoteEnvelope = read_json(response).await;
        assert_eq!(created.note.content, "Left shoulder tight");
        assert_eq!(created.note.date, Utc::now().date_naive());

        let response = client
            .post(format!("/api/clients/{}/notes", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "content": "   " }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .get(format!("/api/clients/{}", alice))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        let detail: ClientEnvelope = read_json(response).await;
        assert_eq!(detail.client.notes.len(), 1);

        let path = format!("/api/clients/{}/notes/{}", alice, created.note.id);
        let response = client.delete(&path).header(admin_key(&test_db)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let response = client.delete(&path).header(admin_key(&test_db)).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_exercise_logs() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.client_id("alice@example.com").unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post(format!("/api/clients/{}/exercises", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "exercise": "Bench Press", "weight": 62.5, "reps": 8 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let created: ExerciseEnvelope = read_json(response).await;
        assert_eq!(created.exercise.sets, 1);
        assert_eq!(created.exercise.weight, Decimal::from_str("62.5").unwrap());

        let response = client
            .post(format!("/api/clients/{}/exercises", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "exercise": "Squat", "reps": 5 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let padded = format!("  {}  ", "d".repeat(100));
        let response = client
            .post(format!("/api/clients/{}/exercises", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "exercise": padded, "weight": 100, "reps": 1 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let deadlift: ExerciseEnvelope = read_json(response).await;
        assert_eq!(deadlift.exercise.exercise, "d".repeat(100));

        let response = client
            .post(format!("/api/clients/{}/exercises", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "exercise": "d".repeat(101), "weight": 100, "reps": 1 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::BadRequest);

        let response = client
            .get(format!("/api/clients/{}/exercises", alice))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        let logs: ExercisesEnvelope = read_json(response).await;
        assert_eq!(logs.exercises.len(), 2);
        assert!(logs.exercises.iter().any(|log| log.exercise == "Bench Press"));

        let response = client
            .delete(format!(
                "/api/clients/{}/exercises/{}",
                alice, created.exercise.id
            ))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        let response = client
            .delete(format!("/api/clients/{}/exercises/missing", alice))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);

        let response = client
            .post("/api/clients/missing/exercises")
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "exercise": "Row", "weight": 40, "reps": 10 }).to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_new_package_then_three_sessions() {
        let test_db = TestDbBuilder::new().admin().build().await.unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        let response = client
            .post("/api/clients")
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(
                json!({ "name": "Hank", "email": "hank@example.com", "sessionsRemaining": 10 })
                    .to_string(),
            )
            .dispatch()
            .await;
        let created: CreateClientResponse = read_json(response).await;
        assert_eq!(created.client.total_sessions, 10);

        for _ in 0..3 {
            let response = update_sessions(
                &client,
                admin_key(&test_db),
                &created.client.id,
                json!({ "action": "decrement" }),
            )
            .await;
            assert_eq!(response.status(), Status::Ok);
        }

        let response = client
            .get(format!("/api/clients/{}", created.client.id))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        let detail: ClientEnvelope = read_json(response).await;
        assert_eq!(detail.client.sessions_remaining, 7);
        assert_eq!(detail.client.total_sessions, 10);
        assert_eq!(detail.client.last_session_date, Some(Utc::now().date_naive()));
    }

    #[rocket::async_test]
    async fn test_delete_client_leaves_no_orphans() {
        let test_db = create_standard_test_db().await;
        let alice = test_db.client_id("alice@example.com").unwrap();
        let (client, test_db) = setup_test_client(test_db).await;

        client
            .post(format!("/api/clients/{}/notes", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "content": "Warm-up first" }).to_string())
            .dispatch()
            .await;
        client
            .post(format!("/api/clients/{}/exercises", alice))
            .header(ContentType::JSON)
            .header(admin_key(&test_db))
            .body(json!({ "exercise": "Deadlift", "weight": 120, "reps": 3, "sets": 5 }).to_string())
            .dispatch()
            .await;
        assert_eq!(test_db.count_rows("client_notes").await, 1);
        assert_eq!(test_db.count_rows("exercise_logs").await, 1);

        let response = client
            .delete(format!("/api/clients/{}", alice))
            .header(admin_key(&test_db))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);

        assert_eq!(test_db.count_rows("client_notes").await, 0);
        assert_eq!(test_db.count_rows("exercise_logs").await, 0);
        assert_eq!(test_db.count_rows("clients").await, 1);
    }

    #[rocket::async_test]
    async fn test_health() {
        let test_db = TestDbBuilder::new().build().await.unwrap();
        let (client, _) = setup_test_client(test_db).await;

        let response = client.get("/api/health").dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(response.into_string().await.unwrap(), "OK");
    }
}
