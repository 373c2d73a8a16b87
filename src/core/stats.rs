use super::task::{Task, TaskStatus};

/// Number of tasks listed under "recent" on the dashboard.
pub const RECENT_LIMIT: usize = 5;

/// Per-status counts over the signed-in user's tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub total: usize,
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
}

impl TaskStats {
    pub fn from_tasks(tasks: &[Task]) -> Self {
        tasks.iter().fold(Self::default(), |mut stats, task| {
            stats.total += 1;
            match task.status {
                TaskStatus::Todo => stats.todo += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Done => stats.done += 1,
            }
            stats
        })
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        match status {
            TaskStatus::Todo => self.todo,
            TaskStatus::InProgress => self.in_progress,
            TaskStatus::Done => self.done,
        }
    }

    /// Share of done tasks, rounded to a whole percent. 0 with no tasks.
    pub fn completion_percent(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.done as f64 / self.total as f64) * 100.0).round() as u32
    }

    /// `(status, count)` bars for the analytics chart.
    pub fn status_chart(&self) -> Vec<(TaskStatus, usize)> {
        TaskStatus::ALL.into_iter().map(|s| (s, self.count(s))).collect()
    }
}

/// The `n` most recently created tasks, newest first.
pub fn recent_tasks(tasks: &[Task], n: usize) -> Vec<&Task> {
    let mut recent: Vec<&Task> = tasks.iter().collect();
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    recent.truncate(n);
    recent
}
