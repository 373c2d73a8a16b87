use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::task::{NewTask, Task, TaskId, TaskPatch, TaskStatus, normalize_notes, title_is_valid};
use crate::sync::{DataGateway, GatewayError, Session};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user not logged in")]
    Unauthenticated,
    #[error("task title must not be empty")]
    EmptyTitle,
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

impl StoreError {
    /// Localized text for showing the error inline.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthenticated | Self::Gateway(GatewayError::NoSession) => {
                crate::fl!("not-logged-in")
            }
            Self::EmptyTitle => crate::fl!("title-required"),
            Self::Gateway(GatewayError::InvalidCredentials) => crate::fl!("invalid-login"),
            Self::Gateway(e) => format!("{}: {}", crate::fl!("something-went-wrong"), e),
        }
    }
}

/// What views render: the mirrored tasks and whether the initial load is
/// still outstanding.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    pub tasks: Vec<Task>,
    pub loading: bool,
}

/// The signed-in user's tasks, mirrored from the data gateway.
///
/// The mirror changes only after the gateway confirms a write. Writes to the
/// same task are applied in the order they were issued; writes to different
/// tasks are independent.
pub struct TaskStore<G> {
    gateway: Arc<G>,
    state: watch::Sender<StoreSnapshot>,
    entity_locks: Mutex<HashMap<TaskId, Arc<tokio::sync::Mutex<()>>>>,
}

impl<G: DataGateway> TaskStore<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        let (state, _) = watch::channel(StoreSnapshot {
            tasks: Vec::new(),
            loading: true,
        });
        Self {
            gateway,
            state,
            entity_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Change notifications for re-rendering.
    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.state.subscribe()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.borrow().tasks.clone()
    }

    pub fn get(&self, id: &TaskId) -> Option<Task> {
        self.state.borrow().tasks.iter().find(|t| &t.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.borrow().tasks.is_empty()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Replace the mirror with the signed-in user's tasks, newest first.
    ///
    /// Never fails: with no session the mirror is emptied, and gateway
    /// errors are logged and leave an empty, usable list.
    pub async fn fetch_all(&self) {
        self.state.send_modify(|s| s.loading = true);

        let tasks = match self.load().await {
            Ok(tasks) => tasks,
            Err(e) => {
                log::error!("Error fetching tasks: {}", e);
                Vec::new()
            }
        };

        self.state.send_modify(|s| {
            s.tasks = tasks;
            s.loading = false;
        });
    }

    async fn load(&self) -> Result<Vec<Task>, GatewayError> {
        let Some(user) = self.gateway.current_user().await? else {
            log::debug!("No session, task list stays empty");
            return Ok(Vec::new());
        };

        let mut tasks = self.gateway.select_tasks(&user.id).await?;
        let fetched = tasks.len();
        tasks.retain(|t| t.user_id == user.id);
        if tasks.len() != fetched {
            log::warn!(
                "Dropped {} rows not owned by {}",
                fetched - tasks.len(),
                user.id
            );
        }
        log::info!("Loaded {} tasks", tasks.len());
        Ok(tasks)
    }

    /// Create a task for the signed-in user. New tasks start in progress and
    /// are placed at the front of the mirror.
    pub async fn add(&self, title: &str, notes: Option<String>) -> Result<Task, StoreError> {
        if !title_is_valid(title) {
            return Err(StoreError::EmptyTitle);
        }
        let user = self
            .gateway
            .current_user()
            .await?
            .ok_or(StoreError::Unauthenticated)?;

        let new_task = NewTask {
            user_id: user.id,
            title: title.to_string(),
            notes: normalize_notes(notes),
            status: TaskStatus::InProgress,
        };
        let stored = self.gateway.insert_task(&new_task).await?;
        log::info!("Added task {}", stored.id);

        self.state.send_modify(|s| s.tasks.insert(0, stored.clone()));
        Ok(stored)
    }

    /// Submit `patch` for task `id` and merge it into the mirror in place.
    pub async fn update(&self, id: &TaskId, patch: TaskPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }
        if patch.title.as_deref().is_some_and(|t| !title_is_valid(t)) {
            return Err(StoreError::EmptyTitle);
        }

        let lock = self.entity_lock(id);
        let result = {
            let _turn = lock.lock().await;
            let result = self.gateway.update_task(id, &patch).await;
            if result.is_ok() {
                self.state.send_modify(|s| {
                    if let Some(task) = s.tasks.iter_mut().find(|t| &t.id == id) {
                        task.apply(&patch);
                    }
                });
            }
            result
        };
        self.release_entity_lock(id, lock);

        result?;
        log::debug!("Updated task {}", id);
        Ok(())
    }

    /// Delete task `id` and drop it from the mirror. Ids not in the mirror
    /// leave it untouched.
    pub async fn delete(&self, id: &TaskId) -> Result<(), StoreError> {
        let lock = self.entity_lock(id);
        let result = {
            let _turn = lock.lock().await;
            let result = self.gateway.delete_task(id).await;
            if result.is_ok() {
                self.state.send_modify(|s| s.tasks.retain(|t| &t.id != id));
            }
            result
        };
        self.release_entity_lock(id, lock);

        result?;
        log::info!("Deleted task {}", id);
        Ok(())
    }

    /// Forget every task, e.g. after sign-out.
    pub fn clear(&self) {
        self.state.send_modify(|s| {
            s.tasks.clear();
            s.loading = false;
        });
    }

    fn entity_lock(&self, id: &TaskId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .entity_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(id.clone()).or_default())
    }

    fn release_entity_lock(&self, id: &TaskId, lock: Arc<tokio::sync::Mutex<()>>) {
        drop(lock);
        let mut locks = self
            .entity_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Only the map's own handle left: nobody is waiting on this task.
        if locks.get(id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(id);
        }
    }
}

/// Reload the store whenever the session changes: fetch on sign-in, clear on
/// sign-out.
pub fn follow_session<G>(
    store: Arc<TaskStore<G>>,
    mut sessions: watch::Receiver<Option<Session>>,
) -> JoinHandle<()>
where
    G: DataGateway + 'static,
{
    tokio::spawn(async move {
        while sessions.changed().await.is_ok() {
            let signed_in = sessions.borrow_and_update().is_some();
            if signed_in {
                store.fetch_all().await;
            } else {
                store.clear();
            }
        }
    })
}
