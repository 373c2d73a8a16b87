use chrono::{Datelike, Months, NaiveDate, Utc};

use super::task::{Task, TaskStatus};

/// Weeks shown per month; enough for any month starting on a Sunday.
pub const GRID_WEEKS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthCalendarState {
    /// First day of the displayed month.
    pub displayed_month: NaiveDate,
    /// Currently selected day (shows the day's task list).
    pub selected_day: Option<NaiveDate>,
}

impl Default for MonthCalendarState {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

impl MonthCalendarState {
    /// Show the month containing `today` with `today` selected.
    pub fn new(today: NaiveDate) -> Self {
        Self {
            displayed_month: first_of_month(today),
            selected_day: Some(today),
        }
    }

    pub fn prev_month(&mut self) {
        self.displayed_month = self
            .displayed_month
            .checked_sub_months(Months::new(1))
            .unwrap_or(self.displayed_month);
        self.selected_day = None;
    }

    pub fn next_month(&mut self) {
        self.displayed_month = self
            .displayed_month
            .checked_add_months(Months::new(1))
            .unwrap_or(self.displayed_month);
        self.selected_day = None;
    }

    /// Select `date`, or clear the selection if it was already selected.
    pub fn select_day(&mut self, date: NaiveDate) {
        if self.selected_day == Some(date) {
            self.selected_day = None;
        } else {
            self.selected_day = Some(date);
        }
    }
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// One cell of the month grid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub in_month: bool,
    /// Statuses present among the day's tasks, in `TaskStatus::ALL` order.
    pub statuses: Vec<TaskStatus>,
    pub count: usize,
}

/// Tasks created on `date` (UTC), in store order.
pub fn tasks_on(tasks: &[Task], date: NaiveDate) -> Vec<&Task> {
    tasks.iter().filter(|t| t.created_on() == date).collect()
}

/// Six Monday-first weeks covering the displayed month.
pub fn month_grid(state: &MonthCalendarState, tasks: &[Task]) -> Vec<Vec<CalendarDay>> {
    let first = state.displayed_month;
    let offset = first.weekday().num_days_from_monday() as i64;
    let grid_start = first - chrono::Duration::days(offset);

    (0..GRID_WEEKS as i64)
        .map(|week| {
            (0..7)
                .map(|day| {
                    let date = grid_start + chrono::Duration::days(week * 7 + day);
                    let on_day = tasks_on(tasks, date);
                    let statuses = TaskStatus::ALL
                        .into_iter()
                        .filter(|s| on_day.iter().any(|t| t.status == *s))
                        .collect();
                    CalendarDay {
                        date,
                        in_month: date.month() == first.month() && date.year() == first.year(),
                        statuses,
                        count: on_day.len(),
                    }
                })
                .collect()
        })
        .collect()
}
