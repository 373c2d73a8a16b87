use i18n_embed::fluent::{FluentLanguageLoader, fluent_language_loader};
use i18n_embed::unic_langid::LanguageIdentifier;
use i18n_embed::{DefaultLocalizer, LanguageLoader, Localizer};
use once_cell::sync::Lazy;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};

#[derive(RustEmbed)]
#[folder = "i18n/"]
struct Localizations;

pub static LANGUAGE_LOADER: Lazy<FluentLanguageLoader> = Lazy::new(|| {
    let loader: FluentLanguageLoader = fluent_language_loader!();
    if let Err(e) = loader.load_fallback_language(&Localizations) {
        log::error!("Failed to load fallback language: {}", e);
    }
    loader
});

/// Look up a UI string in the active language.
#[macro_export]
macro_rules! fl {
    ($message_id:literal) => {{
        i18n_embed_fl::fl!($crate::localize::LANGUAGE_LOADER, $message_id)
    }};

    ($message_id:literal, $($args:expr),*) => {{
        i18n_embed_fl::fl!($crate::localize::LANGUAGE_LOADER, $message_id, $($args), *)
    }};
}

/// The two display languages the UI ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Hi,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Hi => "hi",
        }
    }

    /// Parse a language tag, ignoring region subtags (`hi-IN` -> `Hi`).
    pub fn from_code(s: &str) -> Option<Self> {
        let lang = s.trim().split(['-', '_']).next().unwrap_or("");
        match lang.to_ascii_lowercase().as_str() {
            "en" => Some(Self::En),
            "hi" => Some(Self::Hi),
            _ => None,
        }
    }

    /// The other member of the pair; used as the assumed source language
    /// when translating into `self`.
    pub fn opposite(self) -> Self {
        match self {
            Self::En => Self::Hi,
            Self::Hi => Self::En,
        }
    }

    pub fn native_name(self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Hi => "हिंदी",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

pub fn localizer() -> Box<dyn Localizer> {
    Box::from(DefaultLocalizer::new(&*LANGUAGE_LOADER, &Localizations))
}

/// Switch the UI catalog to `language`. Failures keep the previous catalog.
pub fn select_language(language: Language) {
    let id: LanguageIdentifier = match language.code().parse() {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Invalid language identifier {}: {}", language, e);
            return;
        }
    };
    if let Err(e) = localizer().select(&[id]) {
        log::warn!("Failed to load {} catalog: {}", language, e);
    }
}

/// The language the UI catalog currently renders in.
pub fn current_language() -> Language {
    Language::from_code(&LANGUAGE_LOADER.current_language().to_string()).unwrap_or_default()
}
