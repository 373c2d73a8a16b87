mod cli;
mod render;

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::Parser;
use tokio::sync::mpsc;

use taskmate::config::AppConfig;
use taskmate::core::actions::{Notice, Pacing, TaskActions, TaskForm};
use taskmate::core::calendar::{MonthCalendarState, month_grid, tasks_on};
use taskmate::core::stats::{RECENT_LIMIT, TaskStats, recent_tasks};
use taskmate::core::store::TaskStore;
use taskmate::core::task::Task;
use taskmate::core::view::{Query, compute_buckets};
use taskmate::fl;
use taskmate::localize::{self, Language};
use taskmate::sync::supabase::SupabaseClient;
use taskmate::sync::translate::{GoogleTranslate, translate_all};
use taskmate::sync::{AuthGateway, DataGateway, GatewayError, User};

use cli::{Cli, CliError, Command};

type Store = TaskStore<SupabaseClient>;

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

/// Log to the systemd user journal (`journalctl --user -t taskmate -f`).
/// Our own targets at info, or debug when enabled; everything else at warn.
fn init_logging(debug: bool) {
    struct FilteredJournal {
        inner: systemd_journal_logger::JournalLog,
    }

    impl log::Log for FilteredJournal {
        fn enabled(&self, metadata: &log::Metadata) -> bool {
            if metadata.target().starts_with("taskmate") {
                let max = if taskmate::debug_logging() {
                    log::LevelFilter::Debug
                } else {
                    log::LevelFilter::Info
                };
                metadata.level() <= max
            } else {
                metadata.level() <= log::LevelFilter::Warn
            }
        }
        fn log(&self, record: &log::Record) {
            if self.enabled(record.metadata()) {
                self.inner.log(record);
            }
        }
        fn flush(&self) {
            self.inner.flush();
        }
    }

    taskmate::set_debug_logging(debug);

    let journal = match systemd_journal_logger::JournalLog::new() {
        Ok(journal) => journal.with_syslog_identifier("taskmate".to_string()),
        // No journal socket (containers, non-systemd hosts): run without logging.
        Err(_) => return,
    };
    if log::set_boxed_logger(Box::new(FilteredJournal { inner: journal })).is_ok() {
        // Global max must be Debug so our debug logs can pass when toggled.
        log::set_max_level(log::LevelFilter::Debug);
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();

    // Before loading so a broken config file is reported.
    init_logging(cli.debug);

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut file_config = AppConfig::load_or_default(&config_path);
    // Environment overrides apply to this run only and are never saved.
    let mut config = file_config.clone();
    config.apply_env(|key| std::env::var(key).ok());

    taskmate::set_debug_logging(config.debug_logging || cli.debug);
    localize::select_language(config.language);

    match cli.command {
        Command::Lang { language } => {
            set_language(&mut file_config, &config_path, language.map(Language::from))?;
        }
        Command::Login { email, password } => {
            let client = connect(&config)?;
            let password = password_or_stdin(password)?;
            let session = client
                .sign_in(&email, &password)
                .await
                .map_err(auth_error)?;
            println!("{}", fl!("signed-in", name = session.user.display_name()));
        }
        Command::Signup { email, password } => {
            let client = connect(&config)?;
            let password = password_or_stdin(password)?;
            match client.sign_up(&email, &password).await.map_err(auth_error)? {
                Some(_) => println!("{}", fl!("signed-up")),
                None => println!("{}", fl!("signup-confirm")),
            }
        }
        Command::Logout => {
            connect(&config)?.sign_out().await?;
            println!("{}", fl!("signed-out"));
        }
        Command::Whoami => {
            let client = connect(&config)?;
            let user = require_user(&client).await?;
            print!("{}", render::profile(&user));
        }
        Command::List {
            search,
            status,
            sort,
        } => {
            let store = load_store(&config).await?;
            let query = Query {
                text: search.unwrap_or_default(),
                filter: status.into(),
                sort: sort.into(),
            };
            let buckets = compute_buckets(&store.tasks(), &query);
            let translator = translator(&config);

            let shown = display_texts(translator.as_ref(), &buckets.in_progress, config.language).await;
            print!(
                "{}",
                render::task_section(&fl!("tasks-heading"), &buckets.in_progress, &shown)
            );
            println!();
            let shown = display_texts(translator.as_ref(), &buckets.done, config.language).await;
            print!(
                "{}",
                render::task_section(&fl!("completed-tasks"), &buckets.done, &shown)
            );
        }
        Command::Add { title, notes } => {
            let store = Arc::new(load_store(&config).await?);
            let (task, notice) = TaskForm::new(store)
                .submit(&title, notes)
                .await
                .map_err(|n| CliError::Message(n.message))?;
            println!("{} ({})", notice.message, render::short_id(&task));
        }
        Command::Edit { id, title, notes } => {
            let store = Arc::new(load_store(&config).await?);
            let task = resolve_task(&store, &id)?;
            let title = title.unwrap_or_else(|| task.title.clone());
            let notes = notes.or_else(|| task.notes.clone());

            let (actions, mut notices) = task_actions(&store, &task, &config);
            actions.edit(&title, notes).await?;
            report(&mut notices)?;
        }
        Command::Done { id } => {
            let store = Arc::new(load_store(&config).await?);
            let task = resolve_task(&store, &id)?;
            let (actions, mut notices) = task_actions(&store, &task, &config);
            if let Some(handle) = actions.mark_completed() {
                handle.await?;
            }
            report(&mut notices)?;
        }
        Command::Reopen { id } => {
            let store = Arc::new(load_store(&config).await?);
            let task = resolve_task(&store, &id)?;
            let (actions, mut notices) = task_actions(&store, &task, &config);
            if let Some(handle) = actions.mark_in_progress() {
                handle.await?;
            }
            report(&mut notices)?;
        }
        Command::Delete { id } => {
            let store = Arc::new(load_store(&config).await?);
            let task = resolve_task(&store, &id)?;
            let (actions, mut notices) = task_actions(&store, &task, &config);
            if let Some(handle) = actions.delete() {
                handle.await?;
            }
            report(&mut notices)?;
        }
        Command::Calendar { month, day } => {
            let store = load_store(&config).await?;
            let today = Utc::now().date_naive();
            let day = day.map(|d| parse_date(&d, "day")).transpose()?;

            let mut state = MonthCalendarState::new(day.unwrap_or(today));
            if let Some(month) = month {
                state.displayed_month = parse_date(&format!("{}-01", month), "month")?;
                state.selected_day = day;
            }

            let tasks = store.tasks();
            let grid = month_grid(&state, &tasks);
            print!("{}", render::calendar(&state, &grid, today));

            if let Some(selected) = state.selected_day {
                let on_day = tasks_on(&tasks, selected);
                let titles =
                    display_titles(translator(&config).as_ref(), on_day.iter().copied(), config.language)
                        .await;
                println!();
                print!("{}", render::day_tasks(selected, &on_day, &titles));
            }
        }
        Command::Dashboard => {
            let store = load_store(&config).await?;
            let tasks = store.tasks();
            let stats = TaskStats::from_tasks(&tasks);
            let recent = recent_tasks(&tasks, RECENT_LIMIT);
            let titles =
                display_titles(translator(&config).as_ref(), recent.iter().copied(), config.language)
                    .await;
            print!("{}", render::dashboard(&stats, &recent, &titles));
        }
        Command::Analytics => {
            let store = load_store(&config).await?;
            print!("{}", render::analytics(&TaskStats::from_tasks(&store.tasks())));
        }
    }

    Ok(())
}

fn connect(config: &AppConfig) -> Result<Arc<SupabaseClient>, CliError> {
    Ok(Arc::new(SupabaseClient::from_config(config)?))
}

fn auth_error(e: GatewayError) -> CliError {
    match e {
        GatewayError::InvalidCredentials => CliError::Message(fl!("invalid-login")),
        e => CliError::Gateway(e),
    }
}

fn password_or_stdin(password: Option<String>) -> Result<String, CliError> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn require_user(client: &SupabaseClient) -> Result<User, CliError> {
    client
        .current_user()
        .await?
        .ok_or_else(|| CliError::Message(fl!("not-logged-in")))
}

/// A store holding the signed-in user's tasks.
async fn load_store(config: &AppConfig) -> Result<Store, CliError> {
    let client = connect(config)?;
    let user = require_user(&client).await?;
    log::debug!("Loading tasks for {}", user.id);

    let store = TaskStore::new(client);
    store.fetch_all().await;
    Ok(store)
}

fn translator(config: &AppConfig) -> Option<GoogleTranslate> {
    match GoogleTranslate::new(&config.translate_url) {
        Ok(translator) => Some(translator),
        Err(e) => {
            log::warn!("Translation unavailable: {}", e);
            None
        }
    }
}

/// Titles and notes of `tasks` in the display language. Blank notes stay
/// empty and are never sent for translation.
async fn display_texts(
    translator: Option<&GoogleTranslate>,
    tasks: &[Task],
    language: Language,
) -> Vec<render::DisplayText> {
    let titles = display_titles(translator, tasks, language).await;
    let notes: Vec<String> = tasks
        .iter()
        .map(|t| t.notes.clone().unwrap_or_default())
        .collect();
    let notes = match translator {
        Some(translator) => translate_all(translator, &notes, language).await,
        None => notes,
    };
    titles
        .into_iter()
        .zip(notes)
        .map(|(title, notes)| render::DisplayText {
            title,
            notes: Some(notes).filter(|n| !n.trim().is_empty()),
        })
        .collect()
}

/// Task titles in the display language, falling back to the stored text.
async fn display_titles<'a>(
    translator: Option<&GoogleTranslate>,
    tasks: impl IntoIterator<Item = &'a Task>,
    language: Language,
) -> Vec<String> {
    let texts: Vec<String> = tasks.into_iter().map(|t| t.title.clone()).collect();
    match translator {
        Some(translator) => translate_all(translator, &texts, language).await,
        None => texts,
    }
}

/// Find a task by full id or unique id prefix.
fn resolve_task(store: &Store, id: &str) -> Result<Task, CliError> {
    let tasks = store.tasks();
    if let Some(task) = tasks.iter().find(|t| t.id.as_str() == id) {
        return Ok(task.clone());
    }
    let mut matches = tasks.iter().filter(|t| t.id.as_str().starts_with(id));
    match (matches.next(), matches.next()) {
        (Some(task), None) if !id.is_empty() => Ok(task.clone()),
        _ => Err(CliError::Message(fl!("task-not-found", id = id.to_string()))),
    }
}

fn task_actions(
    store: &Arc<Store>,
    task: &Task,
    config: &AppConfig,
) -> (TaskActions<SupabaseClient>, mpsc::UnboundedReceiver<Notice>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let actions = TaskActions::new(
        Arc::clone(store),
        task.id.clone(),
        Pacing::from_config(config),
        tx,
    );
    (actions, rx)
}

/// Print success notices; the first error becomes the command's failure.
fn report(notices: &mut mpsc::UnboundedReceiver<Notice>) -> Result<(), CliError> {
    while let Ok(notice) = notices.try_recv() {
        if notice.is_error() {
            return Err(CliError::Message(notice.message));
        }
        println!("{}", notice.message);
    }
    Ok(())
}

fn parse_date(value: &str, what: &'static str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| CliError::InvalidInput {
        what,
        value: value.to_string(),
    })
}

fn set_language(
    config: &mut AppConfig,
    path: &Path,
    language: Option<Language>,
) -> Result<(), CliError> {
    let Some(language) = language else {
        println!("{} ({})", config.language.code(), config.language.native_name());
        return Ok(());
    };

    config.language = language;
    config.save_to(path)?;
    localize::select_language(language);
    log::info!("Display language set to {}", language);
    println!("{}", fl!("language-changed"));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn whoami_without_a_session_reports_not_logged_in() {
        let config = AppConfig {
            supabase_url: "https://x.supabase.co".into(),
            supabase_anon_key: "anon".into(),
            persist_session: false,
            ..AppConfig::default()
        };
        let client = connect(&config).unwrap();
        match require_user(&client).await {
            Err(CliError::Message(message)) => assert_eq!(message, fl!("not-logged-in")),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn connect_needs_a_backend() {
        assert!(matches!(
            connect(&AppConfig::default()),
            Err(CliError::Gateway(GatewayError::NotConfigured))
        ));
    }
}
