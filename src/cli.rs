use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use taskmate::config::ConfigError;
use taskmate::core::view::{SortKey, StatusFilter};
use taskmate::localize::Language;
use taskmate::sync::GatewayError;

#[derive(Parser, Debug)]
#[command(name = "taskmate", version, about = "Personal task manager backed by Supabase")]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file to use")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Log debug messages to the journal")]
    pub debug: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in with email and password.
    Login {
        email: String,
        #[arg(long, help = "Read from stdin when omitted")]
        password: Option<String>,
    },
    /// Create an account.
    Signup {
        email: String,
        #[arg(long, help = "Read from stdin when omitted")]
        password: Option<String>,
    },
    Logout,
    /// Show the signed-in profile.
    Whoami,
    /// List in-progress and completed tasks.
    List {
        #[arg(long, short)]
        search: Option<String>,
        #[arg(long, value_enum, default_value_t = FilterArg::All)]
        status: FilterArg,
        #[arg(long, value_enum, default_value_t = SortArg::Newest)]
        sort: SortArg,
    },
    Add {
        title: String,
        #[arg(long, short)]
        notes: Option<String>,
    },
    Edit {
        id: String,
        #[arg(long, short)]
        title: Option<String>,
        #[arg(long, short, help = "Pass an empty string to clear")]
        notes: Option<String>,
    },
    /// Mark a task completed.
    Done { id: String },
    /// Move a completed task back to in progress.
    Reopen { id: String },
    Delete { id: String },
    /// Month view of tasks by creation day.
    Calendar {
        #[arg(long, value_name = "YYYY-MM")]
        month: Option<String>,
        #[arg(long, value_name = "YYYY-MM-DD")]
        day: Option<String>,
    },
    Dashboard,
    Analytics,
    /// Show or change the display language.
    Lang {
        #[arg(value_enum)]
        language: Option<LanguageArg>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterArg {
    All,
    InProgress,
    Done,
}

impl From<FilterArg> for StatusFilter {
    fn from(value: FilterArg) -> Self {
        match value {
            FilterArg::All => StatusFilter::All,
            FilterArg::InProgress => StatusFilter::InProgress,
            FilterArg::Done => StatusFilter::Done,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortArg {
    Newest,
    Oldest,
    NameAsc,
    NameDesc,
}

impl From<SortArg> for SortKey {
    fn from(value: SortArg) -> Self {
        match value {
            SortArg::Newest => SortKey::Newest,
            SortArg::Oldest => SortKey::Oldest,
            SortArg::NameAsc => SortKey::NameAsc,
            SortArg::NameDesc => SortKey::NameDesc,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LanguageArg {
    En,
    Hi,
}

impl From<LanguageArg> for Language {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::En => Language::En,
            LanguageArg::Hi => Language::Hi,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Already localized for display.
    #[error("{0}")]
    Message(String),
    #[error("invalid {what}: {value}")]
    InvalidInput { what: &'static str, value: String },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
