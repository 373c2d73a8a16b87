pub mod keyring;
pub mod supabase;
pub mod translate;

#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::core::task::{NewTask, Task, TaskId, TaskPatch};
use crate::localize::Language;

/// Access tokens are refreshed this many seconds before they expire.
const EXPIRY_MARGIN_SECS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("no active session")]
    NoSession,
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("keyring: {0}")]
    Keyring(String),
    #[error("backend URL and anon key are not configured")]
    NotConfigured,
}

/// An authenticated account as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub user_metadata: serde_json::Value,
}

impl User {
    /// `full_name` from the profile metadata, else the local part of the
    /// email address, else "User".
    pub fn display_name(&self) -> String {
        if let Some(name) = self.user_metadata.get("full_name").and_then(|v| v.as_str()) {
            if !name.trim().is_empty() {
                return name.to_string();
            }
        }
        self.email
            .as_deref()
            .and_then(|e| e.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("User")
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix timestamp (seconds) after which the access token is rejected.
    pub expires_at: Option<i64>,
    pub user: User,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| now.timestamp() + EXPIRY_MARGIN_SECS >= at)
    }
}

/// Session lookup and the `tasks` table, scoped by the signed-in user.
#[async_trait]
pub trait DataGateway: Send + Sync {
    /// The signed-in user, restoring a persisted session if needed.
    async fn current_user(&self) -> Result<Option<User>, GatewayError>;

    /// All tasks owned by `user_id`, newest first.
    async fn select_tasks(&self, user_id: &str) -> Result<Vec<Task>, GatewayError>;

    /// Insert one task and return the stored record with server-assigned fields.
    async fn insert_task(&self, task: &NewTask) -> Result<Task, GatewayError>;

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), GatewayError>;

    async fn delete_task(&self, id: &TaskId) -> Result<(), GatewayError>;
}

#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, GatewayError>;

    /// Returns no session when the backend requires email confirmation first.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Option<Session>, GatewayError>;

    async fn sign_out(&self) -> Result<(), GatewayError>;

    fn current_session(&self) -> Option<Session>;

    /// Session-change notifications; the value is `None` while signed out.
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

/// Best-effort machine translation of short user-entered strings.
#[async_trait]
pub trait TranslationGateway: Send + Sync {
    async fn translate(&self, text: &str, target: Language) -> Result<String, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn user(email: Option<&str>, metadata: serde_json::Value) -> User {
        User {
            id: "u1".into(),
            email: email.map(String::from),
            role: Some("authenticated".into()),
            user_metadata: metadata,
        }
    }

    #[test]
    fn display_name_prefers_full_name() {
        let u = user(Some("asha@example.com"), serde_json::json!({ "full_name": "Asha Rao" }));
        assert_eq!(u.display_name(), "Asha Rao");
    }

    #[test]
    fn display_name_falls_back_to_email_then_default() {
        let u = user(Some("asha@example.com"), serde_json::Value::Null);
        assert_eq!(u.display_name(), "asha");
        let u = user(None, serde_json::json!({}));
        assert_eq!(u.display_name(), "User");
    }

    #[test]
    fn session_expiry_has_margin() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let mut session = Session {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Some(now.timestamp() + 3600),
            user: user(None, serde_json::Value::Null),
        };
        assert!(!session.is_expired(now));
        session.expires_at = Some(now.timestamp() + 10);
        assert!(session.is_expired(now));
        session.expires_at = None;
        assert!(!session.is_expired(now));
    }
}
