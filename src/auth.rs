//! Password authentication against a GoTrue-style auth API.
//!
//! The client keeps the current session in a `watch` channel. Subscribers
//! see every sign-in and sign-out; an attached [`PostgrestClient`] gets the
//! session token as its bearer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::PostgrestClient;
use crate::config::ClientConfig;
use crate::error::{RowlensError, RowlensResult};

/// An authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A signed-in session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: Option<User>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    fn stamp_expiry(mut self) -> Self {
        if self.expires_at.is_none() {
            self.expires_at = self
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        }
        self
    }
}

/// Result of a sign-up. `session` is absent when the project requires
/// email confirmation first.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUp {
    pub user: Option<User>,
    pub session: Option<Session>,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl AuthErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

/// Auth API client.
pub struct AuthClient {
    http: reqwest::Client,
    auth_url: String,
    api_key: String,
    session: watch::Sender<Option<Session>>,
    rest: Option<PostgrestClient>,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("auth_url", &self.auth_url)
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    pub fn new(config: &ClientConfig) -> RowlensResult<Self> {
        let url = config
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| RowlensError::Config("auth requires a project URL".to_string()))?;
        let api_key = config
            .anon_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RowlensError::Config("auth requires an anon key".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let auth_url = format!(
            "{}{}",
            url.trim_end_matches('/'),
            config.auth_path.trim_end_matches('/')
        );
        info!(%auth_url, "created auth client");

        let (session, _) = watch::channel(None);
        Ok(Self {
            http,
            auth_url,
            api_key,
            session,
            rest: None,
        })
    }

    /// Keep `client`'s bearer in step with the session.
    pub fn with_rest_client(mut self, client: PostgrestClient) -> Self {
        client.set_access_token(self.current_session().map(|s| s.access_token));
        self.rest = Some(client);
        self
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> RowlensResult<Session> {
        let session: Session = self
            .send(
                Method::POST,
                "/token?grant_type=password",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await?;
        let session = session.stamp_expiry();
        debug!(email, "signed in");
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// Register a user. `metadata` is stored as the user's metadata.
    pub async fn sign_up_with_password(
        &self,
        email: &str,
        password: &str,
        metadata: Option<Value>,
    ) -> RowlensResult<SignUp> {
        let mut body = json!({ "email": email, "password": password });
        if let Some(data) = metadata {
            body["data"] = data;
        }
        let response: Value = self.send(Method::POST, "/signup", None, Some(body)).await?;

        // With confirmation off the response is a session, otherwise a bare user.
        let outcome = if response.get("access_token").is_some() {
            let session = serde_json::from_value::<Session>(response)?.stamp_expiry();
            SignUp {
                user: session.user.clone(),
                session: Some(session),
            }
        } else {
            SignUp {
                user: Some(serde_json::from_value(response)?),
                session: None,
            }
        };

        if let Some(session) = &outcome.session {
            self.publish(Some(session.clone()));
        }
        Ok(outcome)
    }

    /// Exchange the current session's refresh token for a new session.
    pub async fn refresh_session(&self) -> RowlensResult<Session> {
        let refresh_token = self
            .current_session()
            .and_then(|s| s.refresh_token)
            .ok_or_else(|| RowlensError::Auth("no refresh token in the current session".to_string()))?;
        let session: Session = self
            .send(
                Method::POST,
                "/token?grant_type=refresh_token",
                None,
                Some(json!({ "refresh_token": refresh_token })),
            )
            .await?;
        let session = session.stamp_expiry();
        debug!("refreshed session");
        self.publish(Some(session.clone()));
        Ok(session)
    }

    /// Adopt a session obtained earlier, refreshing it first when it has
    /// expired and carries a refresh token.
    pub async fn restore_session(&self, session: Session) -> RowlensResult<Session> {
        let stale = session.is_expired() && session.refresh_token.is_some();
        self.publish(Some(session.clone()));
        if stale {
            return self.refresh_session().await;
        }
        Ok(session)
    }

    /// End the session. The local session is cleared even when the server
    /// call fails.
    pub async fn sign_out(&self) -> RowlensResult<()> {
        let token = self.current_session().map(|s| s.access_token);
        let result = match token.as_deref() {
            Some(token) => self
                .send_empty(Method::POST, "/logout", Some(token))
                .await,
            None => Ok(()),
        };
        self.publish(None);
        result
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    /// Fetch the user behind the current session, or `None` when signed out.
    pub async fn current_user(&self) -> RowlensResult<Option<User>> {
        let Some(session) = self.current_session() else {
            return Ok(None);
        };
        let user = self
            .send(Method::GET, "/user", Some(&session.access_token), None)
            .await?;
        Ok(Some(user))
    }

    /// Watch session changes.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }

    fn publish(&self, session: Option<Session>) {
        if let Some(rest) = &self.rest {
            rest.set_access_token(session.as_ref().map(|s| s.access_token.clone()));
        }
        self.session.send_replace(session);
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.auth_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(token.unwrap_or(self.api_key.as_str()))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> RowlensResult<T> {
        let mut request = self.request(method, path, token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(auth_error(status, &text));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn send_empty(&self, method: Method, path: &str, token: Option<&str>) -> RowlensResult<()> {
        let response = self.request(method, path, token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await?;
        Err(auth_error(status, &text))
    }
}

fn auth_error(status: StatusCode, body: &str) -> RowlensError {
    let message = serde_json::from_str::<AuthErrorBody>(body)
        .ok()
        .and_then(AuthErrorBody::into_message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("authentication failed")
                .to_string()
        });
    RowlensError::Auth(message)
}
