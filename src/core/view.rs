use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::debounce::Debouncer;
use super::store::TaskStore;
use super::task::{Task, TaskStatus};
use crate::sync::DataGateway;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    InProgress,
    Done,
}

impl StatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "all" => Some(Self::All),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Newest,
    Oldest,
    NameAsc,
    NameDesc,
}

impl SortKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "newest" => Some(Self::Newest),
            "oldest" => Some(Self::Oldest),
            "name_asc" => Some(Self::NameAsc),
            "name_desc" => Some(Self::NameDesc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub text: String,
    pub filter: StatusFilter,
    pub sort: SortKey,
}

/// The two lists shown on the tasks page. Todo tasks appear in neither.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Buckets {
    pub in_progress: Vec<Task>,
    pub done: Vec<Task>,
}

impl Buckets {
    pub fn is_empty(&self) -> bool {
        self.in_progress.is_empty() && self.done.is_empty()
    }

    pub fn len(&self) -> usize {
        self.in_progress.len() + self.done.len()
    }
}

/// Split, filter, search and sort `tasks` for display. The search text is
/// matched as typed, surrounding spaces included.
pub fn compute_buckets(tasks: &[Task], query: &Query) -> Buckets {
    let needle = query.text.to_lowercase();
    let pick = |status: TaskStatus| -> Vec<Task> {
        let mut picked: Vec<Task> = tasks
            .iter()
            .filter(|t| t.status == status && t.matches(&needle))
            .cloned()
            .collect();
        sort_tasks(&mut picked, query.sort);
        picked
    };

    Buckets {
        in_progress: if query.filter == StatusFilter::Done {
            Vec::new()
        } else {
            pick(TaskStatus::InProgress)
        },
        done: if query.filter == StatusFilter::InProgress {
            Vec::new()
        } else {
            pick(TaskStatus::Done)
        },
    }
}

/// Stable sort; ties keep their incoming order.
fn sort_tasks(tasks: &mut [Task], sort: SortKey) {
    match sort {
        SortKey::Newest => tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortKey::Oldest => tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        SortKey::NameAsc => tasks.sort_by_cached_key(|t| t.title.to_lowercase()),
        SortKey::NameDesc => {
            tasks.sort_by(|a, b| b.title.to_lowercase().cmp(&a.title.to_lowercase()))
        }
    }
}

/// A live tasks page: holds the query and republishes buckets whenever the
/// query or the store changes. Query edits are debounced.
pub struct SearchView<G> {
    store: Arc<TaskStore<G>>,
    query: Arc<Mutex<Query>>,
    buckets: watch::Sender<Buckets>,
    debouncer: Debouncer,
    listener: JoinHandle<()>,
}

impl<G: DataGateway + 'static> SearchView<G> {
    pub fn new(store: Arc<TaskStore<G>>, debounce: Duration) -> Self {
        let query = Arc::new(Mutex::new(Query::default()));
        let (buckets, _) = watch::channel(compute_buckets(&store.tasks(), &Query::default()));

        let listener = {
            let mut changes = store.subscribe();
            let query = Arc::clone(&query);
            let buckets = buckets.clone();
            tokio::spawn(async move {
                while changes.changed().await.is_ok() {
                    let tasks = changes.borrow_and_update().tasks.clone();
                    let query = query.lock().unwrap_or_else(PoisonError::into_inner).clone();
                    buckets.send_replace(compute_buckets(&tasks, &query));
                }
            })
        };

        Self {
            store,
            query,
            buckets,
            debouncer: Debouncer::new(debounce),
            listener,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Buckets> {
        self.buckets.subscribe()
    }

    pub fn buckets(&self) -> Buckets {
        self.buckets.borrow().clone()
    }

    pub fn query(&self) -> Query {
        self.query.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_text(&self, text: &str) -> JoinHandle<bool> {
        let text = text.to_string();
        self.modify(move |q| q.text = text)
    }

    pub fn set_filter(&self, filter: StatusFilter) -> JoinHandle<bool> {
        self.modify(move |q| q.filter = filter)
    }

    pub fn set_sort(&self, sort: SortKey) -> JoinHandle<bool> {
        self.modify(move |q| q.sort = sort)
    }

    /// Apply `change` now and schedule the recompute; only the last change of
    /// a burst is rendered.
    fn modify(&self, change: impl FnOnce(&mut Query)) -> JoinHandle<bool> {
        {
            let mut query = self.query.lock().unwrap_or_else(PoisonError::into_inner);
            change(&mut *query);
        }

        let store = Arc::clone(&self.store);
        let query = Arc::clone(&self.query);
        let buckets = self.buckets.clone();
        self.debouncer.call(async move {
            let query = query.lock().unwrap_or_else(PoisonError::into_inner).clone();
            log::debug!(
                "Recomputing view: {:?} {} {}",
                query.text,
                query.filter.as_str(),
                query.sort.as_str()
            );
            buckets.send_replace(compute_buckets(&store.tasks(), &query));
        })
    }
}

impl<G> Drop for SearchView<G> {
    fn drop(&mut self) {
        self.listener.abort();
    }
}
