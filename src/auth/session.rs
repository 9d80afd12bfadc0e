use rocket::Request;
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::request::{FromRequest, Outcome};
use serde::{Deserialize, Serialize};

use crate::models::Client;

pub const SESSION_COOKIE: &str = "coach_session";
pub const SESSION_DAYS: i64 = 7;

/// Claims carried by a logged-in client's cookie.
///
/// The cookie is a Rocket private cookie, so its contents are encrypted and
/// authenticated with the server's `secret_key`; a modified cookie fails to
/// decrypt and the request is treated as anonymous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSession {
    pub client_id: String,
    pub xors_user_id: String,
    pub email: String,
    pub name: String,
}

impl From<&Client> for ClientSession {
    fn from(client: &Client) -> Self {
        Self {
            client_id: client.id.clone(),
            xors_user_id: client.xors_user_id.clone(),
            email: client.email.clone(),
            name: client.name.clone(),
        }
    }
}

impl ClientSession {
    pub fn store(&self, cookies: &CookieJar<'_>, secure: bool) -> Result<(), serde_json::Error> {
        let value = serde_json::to_string(self)?;

        cookies.add_private(
            Cookie::build((SESSION_COOKIE, value))
                .http_only(true)
                .secure(secure)
                .same_site(SameSite::Lax)
                .path("/")
                .max_age(rocket::time::Duration::days(SESSION_DAYS)),
        );

        Ok(())
    }

    pub fn clear(cookies: &CookieJar<'_>) {
        cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/"));
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for ClientSession {
    type Error = ();

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let auth_span = tracing::info_span!("client_session_guard");
        let _guard = auth_span.enter();

        let Some(cookie) = request.cookies().get_private(SESSION_COOKIE) else {
            tracing::debug!("No session cookie on request");
            return Outcome::Error((Status::Unauthorized, ()));
        };

        match serde_json::from_str::<ClientSession>(cookie.value()) {
            Ok(session) => {
                tracing::info!(client_id = %session.client_id, "Client authenticated via session cookie");
                Outcome::Success(session)
            }
            Err(err) => {
                tracing::warn!(error = %err, "Undecodable session cookie");
                Outcome::Error((Status::Unauthorized, ()))
            }
        }
    }
}
