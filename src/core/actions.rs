use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::debounce::{ACTION_THROTTLE, Debouncer, EDIT_DEBOUNCE, SEARCH_DEBOUNCE, Throttle};
use super::store::TaskStore;
use super::task::{Task, TaskId, TaskPatch, TaskStatus, normalize_notes, title_is_valid};
use crate::config::AppConfig;
use crate::fl;
use crate::sync::DataGateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    /// Nothing changed, e.g. completing a done task.
    Info,
    Error,
}

/// A transient message for the user, e.g. a toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

/// Timing for user-triggered writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacing {
    pub edit_debounce: Duration,
    pub search_debounce: Duration,
    pub action_throttle: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            edit_debounce: EDIT_DEBOUNCE,
            search_debounce: SEARCH_DEBOUNCE,
            action_throttle: ACTION_THROTTLE,
        }
    }
}

impl Pacing {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            edit_debounce: config.edit_debounce(),
            search_debounce: config.search_debounce(),
            action_throttle: config.action_throttle(),
        }
    }
}

/// The controls of one task card. Results are reported as notices.
pub struct TaskActions<G> {
    id: TaskId,
    store: Arc<TaskStore<G>>,
    notices: mpsc::UnboundedSender<Notice>,
    editor: Debouncer,
    status_throttle: Throttle,
    delete_throttle: Throttle,
}

impl<G: DataGateway + 'static> TaskActions<G> {
    pub fn new(
        store: Arc<TaskStore<G>>,
        id: TaskId,
        pacing: Pacing,
        notices: mpsc::UnboundedSender<Notice>,
    ) -> Self {
        Self {
            id,
            store,
            notices,
            editor: Debouncer::new(pacing.edit_debounce),
            status_throttle: Throttle::new(pacing.action_throttle),
            delete_throttle: Throttle::new(pacing.action_throttle),
        }
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    /// Save new text once typing pauses. Only the last edit of a burst is
    /// submitted.
    pub fn edit(&self, title: &str, notes: Option<String>) -> JoinHandle<bool> {
        let store = Arc::clone(&self.store);
        let notices = self.notices.clone();
        let id = self.id.clone();
        let title = title.to_string();

        self.editor.call(async move {
            if !title_is_valid(&title) {
                notify(&notices, Notice::error(fl!("title-required")));
                return;
            }
            let patch = TaskPatch::text(title, normalize_notes(notes));
            let notice = match store.update(&id, patch).await {
                Ok(()) => Notice::success(fl!("task-updated")),
                Err(e) => {
                    log::error!("Failed to update task {}: {}", id, e);
                    Notice::error(e.user_message())
                }
            };
            notify(&notices, notice);
        })
    }

    /// Move the task to done. Only an info notice if it already is.
    pub fn mark_completed(&self) -> Option<JoinHandle<()>> {
        self.change_status(TaskStatus::Done, fl!("task-completed"))
    }

    /// Move a done task back to in progress. Only an info notice otherwise.
    pub fn mark_in_progress(&self) -> Option<JoinHandle<()>> {
        self.change_status(TaskStatus::InProgress, fl!("task-reopened"))
    }

    fn change_status(&self, target: TaskStatus, success: String) -> Option<JoinHandle<()>> {
        let Some(task) = self.store.get(&self.id) else {
            notify(
                &self.notices,
                Notice::error(fl!("task-not-found", id = self.id.to_string())),
            );
            return None;
        };
        let applies = match target {
            TaskStatus::Done => !task.status.is_done(),
            _ => task.status.is_done(),
        };
        if !applies {
            log::debug!("Task {} is already {}", self.id, task.status.as_str());
            let unchanged = match target {
                TaskStatus::Done => fl!("task-already-done"),
                _ => fl!("task-not-done"),
            };
            notify(&self.notices, Notice::info(unchanged));
            return None;
        }

        let store = Arc::clone(&self.store);
        let notices = self.notices.clone();
        let id = self.id.clone();
        self.status_throttle.call(async move {
            let notice = match store.update(&id, TaskPatch::status(target)).await {
                Ok(()) => Notice::success(success),
                Err(e) => {
                    log::error!("Failed to set task {} to {}: {}", id, target.as_str(), e);
                    Notice::error(e.user_message())
                }
            };
            notify(&notices, notice);
        })
    }

    pub fn delete(&self) -> Option<JoinHandle<()>> {
        let store = Arc::clone(&self.store);
        let notices = self.notices.clone();
        let id = self.id.clone();
        self.delete_throttle.call(async move {
            let notice = match store.delete(&id).await {
                Ok(()) => Notice::success(fl!("task-deleted")),
                Err(e) => {
                    log::error!("Failed to delete task {}: {}", id, e);
                    Notice::error(e.user_message())
                }
            };
            notify(&notices, notice);
        })
    }
}

/// The add-task form.
pub struct TaskForm<G> {
    store: Arc<TaskStore<G>>,
}

impl<G: DataGateway> TaskForm<G> {
    pub fn new(store: Arc<TaskStore<G>>) -> Self {
        Self { store }
    }

    /// Validate and add. The error side is the message to show under the form.
    pub async fn submit(&self, title: &str, notes: Option<String>) -> Result<(Task, Notice), Notice> {
        if !title_is_valid(title) {
            return Err(Notice::error(fl!("title-required")));
        }
        match self.store.add(title.trim(), notes).await {
            Ok(task) => Ok((task, Notice::success(fl!("task-added")))),
            Err(e) => {
                log::error!("Failed to add task: {}", e);
                Err(Notice::error(e.user_message()))
            }
        }
    }
}

fn notify(notices: &mpsc::UnboundedSender<Notice>, notice: Notice) {
    if notices.send(notice).is_err() {
        log::debug!("Notice dropped, nobody is listening");
    }
}
