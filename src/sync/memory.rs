//! In-memory gateway doubles for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use super::{DataGateway, GatewayError, TranslationGateway, User};
use crate::core::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus};
use crate::localize::Language;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Select(String),
    Insert(NewTask),
    Update(TaskId, TaskPatch),
    Delete(TaskId),
}

#[derive(Default)]
struct MemoryState {
    user: Option<User>,
    rows: Vec<Task>,
    inserted: i64,
    failing: bool,
    calls: Vec<Call>,
    delays: VecDeque<Duration>,
}

/// A `tasks` table held in memory. Mutating calls are recorded so tests can
/// count what actually reached the backend.
pub(crate) struct MemoryGateway {
    state: Mutex<MemoryState>,
}

pub(crate) fn test_user(id: &str) -> User {
    User {
        id: id.to_string(),
        email: Some(format!("{}@example.com", id)),
        role: Some("authenticated".into()),
        user_metadata: serde_json::Value::Null,
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap()
}

/// A stored row owned by `user_id`, created `minutes` after the test epoch.
pub(crate) fn row(user_id: &str, title: &str, status: TaskStatus, minutes: i64) -> Task {
    let at = epoch() + chrono::Duration::minutes(minutes);
    Task {
        id: TaskId::new(uuid::Uuid::new_v4().to_string()),
        user_id: user_id.to_string(),
        title: title.to_string(),
        notes: None,
        status,
        created_at: at,
        updated_at: at,
    }
}

impl MemoryGateway {
    pub(crate) fn signed_in(user_id: &str) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                user: Some(test_user(user_id)),
                ..MemoryState::default()
            }),
        }
    }

    pub(crate) fn signed_out() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    pub(crate) fn with_rows(self, rows: Vec<Task>) -> Self {
        self.state.lock().unwrap().rows = rows;
        self
    }

    /// Every following call fails with a 503 until `recover` is called.
    pub(crate) fn fail(&self) {
        self.state.lock().unwrap().failing = true;
    }

    pub(crate) fn recover(&self) {
        self.state.lock().unwrap().failing = false;
    }

    /// Hold the next update calls for the given durations, in order.
    pub(crate) fn delay_updates(&self, delays: &[Duration]) {
        self.state.lock().unwrap().delays.extend(delays.iter().copied());
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn updates(&self) -> Vec<(TaskId, TaskPatch)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Update(id, patch) => Some((id, patch)),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn rows(&self) -> Vec<Task> {
        self.state.lock().unwrap().rows.clone()
    }

    fn check(&self, call: Call) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        if state.failing {
            return Err(GatewayError::Status {
                status: 503,
                body: "unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DataGateway for MemoryGateway {
    async fn current_user(&self) -> Result<Option<User>, GatewayError> {
        Ok(self.state.lock().unwrap().user.clone())
    }

    async fn select_tasks(&self, user_id: &str) -> Result<Vec<Task>, GatewayError> {
        self.check(Call::Select(user_id.to_string()))?;
        let mut rows: Vec<Task> = self
            .state
            .lock()
            .unwrap()
            .rows
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert_task(&self, task: &NewTask) -> Result<Task, GatewayError> {
        self.check(Call::Insert(task.clone()))?;
        let mut state = self.state.lock().unwrap();
        state.inserted += 1;
        let at = epoch() + chrono::Duration::days(1) + chrono::Duration::minutes(state.inserted);
        let stored = Task {
            id: TaskId::new(uuid::Uuid::new_v4().to_string()),
            user_id: task.user_id.clone(),
            title: task.title.clone(),
            notes: task.notes.clone(),
            status: task.status,
            created_at: at,
            updated_at: at,
        };
        state.rows.push(stored.clone());
        Ok(stored)
    }

    async fn update_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<(), GatewayError> {
        let delay = self.state.lock().unwrap().delays.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check(Call::Update(id.clone(), patch.clone()))?;
        let mut state = self.state.lock().unwrap();
        if let Some(row) = state.rows.iter_mut().find(|t| &t.id == id) {
            row.apply(patch);
        }
        Ok(())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), GatewayError> {
        self.check(Call::Delete(id.clone()))?;
        self.state.lock().unwrap().rows.retain(|t| &t.id != id);
        Ok(())
    }
}

/// Answers from a fixed phrase table; unknown phrases fail.
pub(crate) struct ScriptedTranslator {
    phrases: HashMap<(String, Language), String>,
    delays: Mutex<HashMap<String, Duration>>,
    always_fail: bool,
    calls: AtomicUsize,
}

impl ScriptedTranslator {
    pub(crate) fn new() -> Self {
        Self {
            phrases: HashMap::new(),
            delays: Mutex::new(HashMap::new()),
            always_fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::new()
        }
    }

    /// Translate `text` to `translated` when Hindi is requested.
    pub(crate) fn with(self, text: &str, translated: &str) -> Self {
        self.with_lang(text, Language::Hi, translated)
    }

    pub(crate) fn with_lang(mut self, text: &str, target: Language, translated: &str) -> Self {
        self.phrases
            .insert((text.to_string(), target), translated.to_string());
        self
    }

    /// Answers for `text` arrive only after `delay`.
    pub(crate) fn slow(self, text: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(text.to_string(), delay);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TranslationGateway for ScriptedTranslator {
    async fn translate(&self, text: &str, target: Language) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().get(text).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_fail {
            return Err(GatewayError::Status {
                status: 429,
                body: "rate limited".into(),
            });
        }
        self.phrases
            .get(&(text.to_string(), target))
            .cloned()
            .ok_or_else(|| GatewayError::Decode(format!("no phrase for {:?}", text)))
    }
}
