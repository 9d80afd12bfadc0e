#[cfg(test)]
pub mod test_db {
    use crate::database::apply_schema;
    use crate::database::legacy::{create_customer, ensure_admin_user};
    use crate::db::create_client;
    use crate::error::AppError;
    use crate::identity::IdentityProvider;
    use crate::models::NewClient;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::{Pool, Sqlite};
    use std::collections::HashMap;
    use std::sync::{Arc, Once};
    use tracing::log::LevelFilter;

    use super::fake_identity::FakeIdentityProvider;

    static INIT: Once = Once::new();
    pub static STANDARD_PASSWORD: &str = "password123";
    pub static ADMIN_NAME: &str = "Palmer";

    #[derive(Default)]
    pub struct TestDbBuilder {
        clients: Vec<TestClient>,
        customers: Vec<TestCustomer>,
        orphan_accounts: Vec<String>,
        with_admin: bool,
    }

    pub struct TestClient {
        pub name: String,
        pub email: String,
        pub sessions_remaining: i64,
    }

    pub struct TestCustomer {
        pub name: String,
        pub email: String,
    }

    impl TestDbBuilder {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn admin(mut self) -> Self {
            self.with_admin = true;
            self
        }

        /// A portal client with an identity account using the standard password.
        pub fn client(mut self, name: &str, email: &str, sessions_remaining: i64) -> Self {
            self.clients.push(TestClient {
                name: name.to_string(),
                email: email.to_string(),
                sessions_remaining,
            });
            self
        }

        /// An identity account with no local client behind it.
        pub fn orphan_account(mut self, email: &str) -> Self {
            self.orphan_accounts.push(email.to_string());
            self
        }

        pub fn customer(mut self, name: &str, email: &str) -> Self {
            self.customers.push(TestCustomer {
                name: name.to_string(),
                email: email.to_string(),
            });
            self
        }

        pub async fn build(self) -> Result<TestDb, AppError> {
            INIT.call_once(|| {
                let _ = env_logger::builder()
                    .filter_level(LevelFilter::Debug)
                    .is_test(true)
                    .try_init();
            });

            // Every connection to `sqlite::memory:` is its own database.
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await?;

            apply_schema(&pool).await?;

            let identity = Arc::new(FakeIdentityProvider::default());

            let admin_key = if self.with_admin {
                ensure_admin_user(&pool, ADMIN_NAME, "palmer@admin.local").await?
            } else {
                None
            };

            let mut client_id_map: HashMap<String, String> = HashMap::new();
            for client in &self.clients {
                let account = identity
                    .create_account(&client.email, STANDARD_PASSWORD)
                    .await
                    .map_err(AppError::from)?;

                let created = create_client(
                    &pool,
                    &NewClient {
                        xors_user_id: account.id,
                        xors_api_key: Some(account.key),
                        name: client.name.clone(),
                        email: client.email.clone(),
                        sessions_remaining: client.sessions_remaining,
                        ..NewClient::default()
                    },
                )
                .await?;

                client_id_map.insert(client.email.clone(), created.id);
            }

            for email in &self.orphan_accounts {
                identity
                    .create_account(email, STANDARD_PASSWORD)
                    .await
                    .map_err(AppError::from)?;
            }

            let mut customer_map: HashMap<String, (i64, String)> = HashMap::new();
            for customer in &self.customers {
                let (user, _) = create_customer(&pool, &customer.name, &customer.email, None).await?;
                customer_map.insert(customer.email.clone(), (user.id, user.api_key));
            }

            Ok(TestDb {
                pool,
                identity,
                admin_key,
                client_id_map,
                customer_map,
            })
        }
    }

    pub struct TestDb {
        pub pool: Pool<Sqlite>,
        pub identity: Arc<FakeIdentityProvider>,
        pub admin_key: Option<String>,
        pub client_id_map: HashMap<String, String>,
        pub customer_map: HashMap<String, (i64, String)>,
    }

    impl TestDb {
        pub fn client_id(&self, email: &str) -> Option<String> {
            self.client_id_map.get(email).cloned()
        }

        pub fn customer_id(&self, email: &str) -> Option<i64> {
            self.customer_map.get(email).map(|(id, _)| *id)
        }

        pub fn customer_key(&self, email: &str) -> Option<String> {
            self.customer_map.get(email).map(|(_, key)| key.clone())
        }

        pub async fn count_rows(&self, table: &str) -> i64 {
            sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&self.pool)
                .await
                .unwrap()
        }
    }
}

#[cfg(test)]
pub mod fake_identity {
    use crate::identity::{IdentityAccount, IdentityError, IdentityProvider};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeAccount {
        account: IdentityAccount,
        password: String,
    }

    /// In-memory stand-in for the XORS API.
    #[derive(Default)]
    pub struct FakeIdentityProvider {
        accounts: Mutex<HashMap<String, FakeAccount>>,
        unreachable: AtomicBool,
    }

    impl FakeIdentityProvider {
        /// Makes every call fail as if the network were down.
        pub fn set_unreachable(&self, unreachable: bool) {
            self.unreachable.store(unreachable, Ordering::SeqCst);
        }

        pub fn has_account(&self, email: &str) -> bool {
            self.accounts.lock().unwrap().contains_key(email)
        }

        pub fn password_of(&self, email: &str) -> Option<String> {
            self.accounts
                .lock()
                .unwrap()
                .get(email)
                .map(|a| a.password.clone())
        }

        fn check_reachable(&self) -> Result<(), IdentityError> {
            if self.unreachable.load(Ordering::SeqCst) {
                return Err(IdentityError::Transport("connection refused".to_string()));
            }
            Ok(())
        }
    }

    #[rocket::async_trait]
    impl IdentityProvider for FakeIdentityProvider {
        async fn create_account(
            &self,
            email: &str,
            password: &str,
        ) -> Result<IdentityAccount, IdentityError> {
            self.check_reachable()?;
            let mut accounts = self.accounts.lock().unwrap();

            if accounts.contains_key(email) {
                return Err(IdentityError::Rejected {
                    status: 409,
                    message: "User already exists".to_string(),
                });
            }

            let n = accounts.len() + 1;
            let account = IdentityAccount {
                id: format!("xors-user-{}", n),
                email: email.to_string(),
                key: format!("xors-key-{}", n),
                level: Some("viewer".to_string()),
                verified: Some(0),
            };

            accounts.insert(
                email.to_string(),
                FakeAccount {
                    account: account.clone(),
                    password: password.to_string(),
                },
            );

            Ok(account)
        }

        async fn authenticate(
            &self,
            email: &str,
            password: &str,
        ) -> Result<IdentityAccount, IdentityError> {
            self.check_reachable()?;
            let accounts = self.accounts.lock().unwrap();

            match accounts.get(email) {
                Some(stored) if stored.password == password => Ok(stored.account.clone()),
                _ => Err(IdentityError::Rejected {
                    status: 401,
                    message: "Invalid credentials".to_string(),
                }),
            }
        }

        async fn change_password(
            &self,
            api_key: &str,
            current_password: Option<&str>,
            new_password: &str,
        ) -> Result<(), IdentityError> {
            self.check_reachable()?;
            let mut accounts = self.accounts.lock().unwrap();

            let Some(stored) = accounts.values_mut().find(|a| a.account.key == api_key) else {
                return Err(IdentityError::Rejected {
                    status: 401,
                    message: "Invalid API key".to_string(),
                });
            };

            if current_password != Some(stored.password.as_str()) {
                return Err(IdentityError::Rejected {
                    status: 400,
                    message: "Current password is incorrect".to_string(),
                });
            }

            stored.password = new_password.to_string();
            Ok(())
        }
    }
}

#[cfg(test)]
pub mod test_utils {
    use crate::env::Settings;
    use crate::identity::IdentityProvider;
    use crate::init_rocket;
    use rocket::http::{ContentType, Cookie, Header, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::json;
    use std::sync::Arc;

    pub use super::fake_identity::FakeIdentityProvider;
    pub use super::test_db::{STANDARD_PASSWORD, TestDb, TestDbBuilder};

    pub async fn create_standard_test_db() -> TestDb {
        TestDbBuilder::new()
            .admin()
            .client("Alice Client", "alice@example.com", 10)
            .client("Bob Client", "bob@example.com", 0)
            .customer("Carol Customer", "carol@example.com")
            .build()
            .await
            .expect("Failed to create test database")
    }

    pub async fn setup_test_client(test_db: TestDb) -> (Client, TestDb) {
        setup_test_client_with_settings(test_db, Settings::default()).await
    }

    pub async fn setup_test_client_with_settings(
        test_db: TestDb,
        settings: Settings,
    ) -> (Client, TestDb) {
        let identity: Arc<dyn IdentityProvider> = test_db.identity.clone();
        let rocket = init_rocket(test_db.pool.clone(), identity, settings).await;

        let client = Client::tracked(rocket)
            .await
            .expect("valid rocket instance");

        (client, test_db)
    }

    pub fn api_key(key: &str) -> Header<'static> {
        Header::new("X-API-Key", key.to_string())
    }

    pub fn admin_key(test_db: &TestDb) -> Header<'static> {
        api_key(test_db.admin_key.as_deref().expect("test db built without admin"))
    }

    /// Logs a client in; the tracked client keeps the session cookie.
    pub async fn login_test_client(client: &Client, email: &str) -> Option<Cookie<'static>> {
        let response = client
            .post("/api/auth/login")
            .header(ContentType::JSON)
            .body(json!({ "email": email, "password": STANDARD_PASSWORD }).to_string())
            .dispatch()
            .await;

        assert_eq!(response.status(), Status::Ok);
        response.cookies().get_private("coach_session")
    }
}
