use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::watch;

use super::{AuthGateway, DataGateway, GatewayError, Session, User, keyring};
use crate::config::AppConfig;
use crate::core::task::{NewTask, Task, TaskId, TaskPatch};

const TASKS_TABLE: &str = "tasks";

/// Shape of a GoTrue token grant.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: User,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .or_else(|| self.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Client for a hosted Supabase project: GoTrue for auth, PostgREST for the
/// `tasks` table. Row ownership is enforced server-side by RLS; the client
/// only adds the `user_id` filter.
pub struct SupabaseClient {
    base_url: String,
    anon_key: String,
    http: Client,
    session: watch::Sender<Option<Session>>,
    persist_session: bool,
    restore_attempted: AtomicBool,
}

impl SupabaseClient {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, GatewayError> {
        if base_url.trim().is_empty() || anon_key.trim().is_empty() {
            return Err(GatewayError::NotConfigured);
        }
        let http = Client::builder().build()?;
        let (session, _) = watch::channel(None);
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            anon_key: anon_key.trim().to_string(),
            http,
            session,
            persist_session: false,
            restore_attempted: AtomicBool::new(false),
        })
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(&config.supabase_url, &config.supabase_anon_key)?
            .with_session_persistence(config.persist_session))
    }

    /// Keep the refresh token in the system keyring so later runs start signed in.
    pub fn with_session_persistence(mut self, persist: bool) -> Self {
        self.persist_session = persist;
        self
    }

    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url, path)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, TASKS_TABLE)
    }

    fn with_api_key(&self, req: RequestBuilder) -> RequestBuilder {
        req.header("apikey", &self.anon_key)
    }

    /// A table request carrying the caller's access token.
    async fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder, GatewayError> {
        let session = self.active_session().await?.ok_or(GatewayError::NoSession)?;
        Ok(self
            .with_api_key(req)
            .bearer_auth(&session.access_token))
    }

    /// The in-memory session, refreshed when expired or restored from the
    /// keyring on first use.
    async fn active_session(&self) -> Result<Option<Session>, GatewayError> {
        let current = self.session.borrow().clone();
        match current {
            Some(session) if !session.is_expired(Utc::now()) => Ok(Some(session)),
            Some(session) => {
                log::debug!("Access token expired, refreshing");
                self.refresh(&session.refresh_token).await.map(Some)
            }
            None => self.restore().await,
        }
    }

    async fn restore(&self) -> Result<Option<Session>, GatewayError> {
        if !self.persist_session || self.restore_attempted.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        let token = match keyring::load_refresh_token(&self.base_url).await {
            Ok(Some(token)) => token,
            Ok(None) => return Ok(None),
            Err(e) => {
                log::warn!("Could not read persisted session: {}", e);
                return Ok(None);
            }
        };

        match self.refresh(&token).await {
            Ok(session) => {
                log::info!("Restored session for {}", session.user.id);
                Ok(Some(session))
            }
            Err(GatewayError::InvalidCredentials) | Err(GatewayError::Status { .. }) => {
                log::info!("Persisted session is no longer valid, discarding it");
                if let Err(e) = keyring::delete_refresh_token(&self.base_url).await {
                    log::warn!("Failed to clear persisted session: {}", e);
                }
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> Result<Session, GatewayError> {
        self.token_grant(
            "refresh_token",
            serde_json::json!({ "refresh_token": refresh_token }),
        )
        .await
    }

    async fn token_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, GatewayError> {
        let resp = self
            .with_api_key(self.http.post(self.auth_url("token")))
            .query(&[("grant_type", grant_type)])
            .json(&body)
            .send()
            .await?;
        let grant: TokenResponse = check(resp).await?.json().await?;
        let session = grant.into_session();
        self.adopt(session.clone()).await;
        Ok(session)
    }

    /// Make `session` current, notify subscribers and persist it.
    async fn adopt(&self, session: Session) {
        let refresh_token = session.refresh_token.clone();
        self.session.send_replace(Some(session));
        if self.persist_session {
            if let Err(e) = keyring::store_refresh_token(&self.base_url, &refresh_token).await {
                log::warn!("Failed to persist session: {}", e);
            }
        }
    }
}

/// Turn non-success responses into errors, recognising rejected credentials.
async fn check(resp: Response) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    if is_credential_error(status, &body) {
        return Err(GatewayError::InvalidCredentials);
    }
    Err(GatewayError::Status {
        status: status.as_u16(),
        body,
    })
}

fn is_credential_error(status: StatusCode, body: &str) -> bool {
    status == StatusCode::BAD_REQUEST
        && (body.contains("Invalid login credentials")
            || body.contains("invalid_credentials")
            || body.contains("invalid_grant"))
}

fn eq_filter(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl AuthGateway for SupabaseClient {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, GatewayError> {
        log::info!("Signing in {}", email);
        self.token_grant(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, GatewayError> {
        log::info!("Signing up {}", email);
        let resp = self
            .with_api_key(self.http.post(self.auth_url("signup")))
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;
        let body: serde_json::Value = check(resp).await?.json().await?;

        // With email confirmation enabled GoTrue answers with the bare user.
        if body.get("access_token").is_none() {
            log::info!("Sign-up for {} awaits email confirmation", email);
            return Ok(None);
        }
        let grant: TokenResponse =
            serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let session = grant.into_session();
        self.adopt(session.clone()).await;
        Ok(Some(session))
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        // A fresh process only holds the session in the keyring.
        let current = match self.active_session().await {
            Ok(current) => current,
            Err(e) => {
                log::warn!("Could not resume session for remote sign-out: {}", e);
                None
            }
        };
        if let Some(session) = current {
            let result = self
                .with_api_key(self.http.post(self.auth_url("logout")))
                .bearer_auth(&session.access_token)
                .send()
                .await;
            match result {
                Ok(resp) => {
                    if let Err(e) = check(resp).await {
                        log::warn!("Remote sign-out failed, clearing local session anyway: {}", e);
                    }
                }
                Err(e) => log::warn!("Remote sign-out failed, clearing local session anyway: {}", e),
            }
        }

        self.session.send_replace(None);
        if self.persist_session {
            keyring::delete_refresh_token(&self.base_url).await?;
        }
        log::info!("Signed out");
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.session.subscribe()
    }
}

#[async_trait]
impl DataGateway for SupabaseClient {
    async fn current_user(&self) -> Result<Option<User>, GatewayError> {
        Ok(self.active_session().await?.map(|s| s.user))
    }

    async fn select_tasks(&self, user_id: &str) -> Result<Vec<Task>, GatewayError> {
        let req = self
            .authorized(self.http.get(self.table_url()))
            .await?
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq_filter(user_id)),
                ("order", "created_at.desc".to_string()),
            ]);
        let tasks: Vec<Task> = check(req.send().await?).await?.json().await?;
        log::debug!("Fetched {} tasks for {}", tasks.len(), user_id);
        Ok(tasks)
    }

    async fn insert_task(&self, task: &NewTask) -> Result<Task, GatewayError> {
        let req = self
            .authorized(self.http.post(self.table_url()))
            .await?
            .header("Prefer", "return=representation")
            .json(&[task]);
        let mut rows: Vec<Task> = check(req.send().await?).await?.json().await?;
        if rows.is_empty() {
            return Err(GatewayError::Decode("insert returned no rows".into()));
        }
        Ok(rows.swap_remove(0))
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), GatewayError> {
        let req = self
            .authorized(self.http.patch(self.table_url()))
            .await?
            .query(&[("id", eq_filter(id.as_str()))])
            .json(patch);
        check(req.send().await?).await?;
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), GatewayError> {
        let req = self
            .authorized(self.http.delete(self.table_url()))
            .await?
            .query(&[("id", eq_filter(id.as_str()))]);
        check(req.send().await?).await?;
        Ok(())
    }
}
