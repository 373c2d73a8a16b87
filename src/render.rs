use chrono::{Datelike, NaiveDate};

use taskmate::core::calendar::{CalendarDay, MonthCalendarState};
use taskmate::core::stats::TaskStats;
use taskmate::core::task::{Task, TaskStatus};
use taskmate::fl;
use taskmate::sync::User;

/// Characters of the id shown in listings; enough to pick a task by prefix.
pub const SHORT_ID_LEN: usize = 8;

const CHART_WIDTH: usize = 40;

pub fn short_id(task: &Task) -> &str {
    let id = task.id.as_str();
    id.char_indices()
        .nth(SHORT_ID_LEN)
        .map_or(id, |(end, _)| &id[..end])
}

fn marker(status: TaskStatus) -> char {
    match status {
        TaskStatus::Todo => '·',
        TaskStatus::InProgress => '○',
        TaskStatus::Done => '●',
    }
}

/// Title and notes of a task in the display language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayText {
    pub title: String,
    pub notes: Option<String>,
}

/// One task as a listing entry, showing `shown` in place of the stored text.
pub fn task_entry(task: &Task, shown: &DisplayText) -> String {
    let mut out = format!(
        "{} {:<width$} {}  [{}]",
        marker(task.status),
        short_id(task),
        shown.title,
        task.status.label(),
        width = SHORT_ID_LEN
    );
    if let Some(notes) = shown.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        for line in notes.lines() {
            out.push_str("\n    ");
            out.push_str(line);
        }
    }
    out.push_str(&format!(
        "\n    {}: {}  {}: {}",
        fl!("created"),
        task.created_at.format("%Y-%m-%d %H:%M"),
        fl!("updated"),
        task.updated_at.format("%Y-%m-%d %H:%M")
    ));
    out
}

/// A titled section of tasks, or the empty message.
pub fn task_section(heading: &str, tasks: &[Task], shown: &[DisplayText]) -> String {
    let mut out = format!("{} ({})\n", heading, tasks.len());
    if tasks.is_empty() {
        out.push_str(&format!("  {}\n", fl!("no-tasks")));
        return out;
    }
    for (task, shown) in tasks.iter().zip(shown) {
        out.push_str(&task_entry(task, shown));
        out.push('\n');
    }
    out
}

fn calendar_cell(day: &CalendarDay, selected: Option<NaiveDate>, today: NaiveDate) -> String {
    if !day.in_month {
        return " ".repeat(6);
    }
    let pointer = if selected == Some(day.date) {
        '>'
    } else if day.date == today {
        '*'
    } else {
        ' '
    };
    let markers: String = day.statuses.iter().copied().map(marker).collect();
    format!("{}{:>2}{:<3}", pointer, day.date.day(), markers)
}

/// The month grid. Weeks outside the month are left out.
pub fn calendar(state: &MonthCalendarState, grid: &[Vec<CalendarDay>], today: NaiveDate) -> String {
    let mut out = format!("{}\n", state.displayed_month.format("%B %Y"));
    let labels = fl!("weekdays-short");
    for label in labels.split_whitespace() {
        out.push_str(&format!(" {:>2}   ", label));
    }
    out.push('\n');

    for week in grid {
        if !week.iter().any(|d| d.in_month) {
            continue;
        }
        let line: String = week
            .iter()
            .map(|day| calendar_cell(day, state.selected_day, today))
            .collect();
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// The task list under the calendar for the selected day.
pub fn day_tasks(date: NaiveDate, tasks: &[&Task], titles: &[String]) -> String {
    let mut out = format!("{}\n", fl!("tasks-on", date = date.format("%Y-%m-%d").to_string()));
    if tasks.is_empty() {
        out.push_str(&format!("  {}\n", fl!("no-tasks-on-day")));
        return out;
    }
    for (task, title) in tasks.iter().zip(titles) {
        out.push_str(&format!("  {} {}\n", marker(task.status), title));
    }
    out
}

pub fn dashboard(stats: &TaskStats, recent: &[&Task], titles: &[String]) -> String {
    let mut out = format!("{}: {}\n", fl!("dashboard-total"), stats.total);
    for status in TaskStatus::ALL {
        out.push_str(&format!("{}: {}\n", status.label(), stats.count(status)));
    }
    out.push_str(&fl!(
        "dashboard-completion",
        percent = stats.completion_percent().to_string()
    ));
    out.push_str("\n\n");

    out.push_str(&format!("{}\n", fl!("recent-tasks")));
    if recent.is_empty() {
        out.push_str(&format!("  {}\n", fl!("no-recent-tasks")));
    }
    for (task, title) in recent.iter().zip(titles) {
        out.push_str(&format!(
            "  {} {}  {}\n",
            marker(task.status),
            title,
            task.created_at.format("%Y-%m-%d")
        ));
    }
    out
}

/// Horizontal bar chart of tasks per status.
pub fn analytics(stats: &TaskStats) -> String {
    let chart = stats.status_chart();
    let labels: Vec<String> = chart.iter().map(|(status, _)| status.label()).collect();
    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let max = chart.iter().map(|(_, count)| *count).max().unwrap_or(0);

    let mut out = format!("{}\n", fl!("analytics-title"));
    for ((_, count), label) in chart.iter().zip(&labels) {
        let bar = if max == 0 { 0 } else { count * CHART_WIDTH / max };
        let padding = label_width - label.chars().count();
        out.push_str(&format!(
            "{}{} | {} {}\n",
            label,
            " ".repeat(padding),
            "█".repeat(bar),
            count
        ));
    }
    out
}

pub fn profile(user: &User) -> String {
    let role = match user.role.as_deref() {
        Some("authenticated") => fl!("authenticated"),
        Some(role) if !role.is_empty() => role.to_string(),
        _ => fl!("standard-user"),
    };
    format!(
        "{}: {}\n{}: {}\n{}: {}\n{}: {}\n",
        fl!("profile-name"),
        user.display_name(),
        fl!("profile-email"),
        user.email.as_deref().unwrap_or("-"),
        fl!("profile-user-id"),
        user.id,
        fl!("profile-role"),
        role
    )
}
