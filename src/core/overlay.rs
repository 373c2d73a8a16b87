use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::localize::Language;
use crate::sync::TranslationGateway;
use crate::sync::translate::translate_or_original;

struct Inner {
    gateway: Arc<dyn TranslationGateway>,
    generation: AtomicU64,
    source: Mutex<String>,
    language: Mutex<Language>,
    display: watch::Sender<String>,
}

impl Inner {
    /// Start a translation of the current source. The result is applied only
    /// if no newer request was started in the meantime and the overlay is
    /// still alive.
    fn request(self: &Arc<Self>) -> JoinHandle<()> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let source = self.source.lock().unwrap_or_else(PoisonError::into_inner).clone();
        let language = *self.language.lock().unwrap_or_else(PoisonError::into_inner);

        if source.trim().is_empty() {
            self.publish(ticket, source);
            return tokio::spawn(async {});
        }

        let gateway = Arc::clone(&self.gateway);
        let overlay = Arc::downgrade(self);
        tokio::spawn(async move {
            let shown = translate_or_original(gateway.as_ref(), &source, language).await;
            let Some(overlay) = overlay.upgrade() else {
                return;
            };
            if !overlay.publish(ticket, shown) {
                log::debug!("Discarding stale translation of {:?}", source);
            }
        })
    }

    /// Show `text` if `ticket` is still the newest request. The check runs
    /// under the display lock so a newer publish cannot slip in between.
    fn publish(&self, ticket: u64, text: String) -> bool {
        self.display.send_if_modified(|shown| {
            if self.generation.load(Ordering::SeqCst) != ticket {
                return false;
            }
            *shown = text;
            true
        })
    }
}

/// User-entered text shown in the current display language.
///
/// Translations are fetched in the background and never touch the stored
/// task. Until a result arrives the previous display is kept; a failed or
/// empty translation shows the original.
pub struct TranslatedText {
    inner: Arc<Inner>,
    listener: JoinHandle<()>,
}

impl TranslatedText {
    /// Overlay `text`, re-translating whenever `languages` changes.
    pub fn new(
        gateway: Arc<dyn TranslationGateway>,
        text: &str,
        mut languages: watch::Receiver<Language>,
    ) -> Self {
        let language = *languages.borrow_and_update();
        let (display, _) = watch::channel(text.to_string());
        let inner = Arc::new(Inner {
            gateway,
            generation: AtomicU64::new(0),
            source: Mutex::new(text.to_string()),
            language: Mutex::new(language),
            display,
        });
        inner.request();

        let listener = tokio::spawn(language_listener(Arc::downgrade(&inner), languages));

        Self { inner, listener }
    }

    /// Replace the source text and translate it.
    pub fn set_text(&self, text: &str) -> JoinHandle<()> {
        *self
            .inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = text.to_string();
        self.inner.request()
    }

    /// What is currently displayed.
    pub fn text(&self) -> String {
        self.inner.display.borrow().clone()
    }

    pub fn source(&self) -> String {
        self.inner
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.inner.display.subscribe()
    }
}

impl Drop for TranslatedText {
    fn drop(&mut self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.listener.abort();
    }
}

async fn language_listener(overlay: Weak<Inner>, mut languages: watch::Receiver<Language>) {
    while languages.changed().await.is_ok() {
        let language = *languages.borrow_and_update();
        let Some(overlay) = overlay.upgrade() else {
            return;
        };
        *overlay
            .language
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = language;
        overlay.request();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::memory::ScriptedTranslator;
    use std::time::Duration;

    fn languages(initial: Language) -> (watch::Sender<Language>, watch::Receiver<Language>) {
        watch::channel(initial)
    }

    #[tokio::test]
    async fn failing_gateway_shows_original() {
        let (_tx, rx) = languages(Language::Hi);
        let overlay = TranslatedText::new(Arc::new(ScriptedTranslator::failing()), "", rx);
        overlay.set_text("Buy milk").await.unwrap();
        assert_eq!(overlay.text(), "Buy milk");
        assert_eq!(overlay.source(), "Buy milk");
    }

    #[tokio::test]
    async fn translates_on_creation() {
        let translator = Arc::new(ScriptedTranslator::new().with("Buy milk", "दूध खरीदें"));
        let (_tx, rx) = languages(Language::Hi);
        let overlay = TranslatedText::new(translator, "Buy milk", rx);
        let mut display = overlay.subscribe();
        display.wait_for(|s| s == "दूध खरीदें").await.unwrap();
    }

    #[tokio::test]
    async fn empty_text_skips_the_request() {
        let translator = Arc::new(ScriptedTranslator::new());
        let (_tx, rx) = languages(Language::Hi);
        let overlay = TranslatedText::new(translator.clone(), "", rx);
        overlay.set_text("  ").await.unwrap();
        assert_eq!(overlay.text(), "  ");
        assert_eq!(translator.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_results_are_discarded() {
        let translator = Arc::new(
            ScriptedTranslator::new()
                .with("slow", "धीमा")
                .slow("slow", Duration::from_millis(500))
                .with("fast", "तेज़"),
        );
        let (_tx, rx) = languages(Language::Hi);
        let overlay = TranslatedText::new(translator, "slow", rx);

        overlay.set_text("fast").await.unwrap();
        assert_eq!(overlay.text(), "तेज़");

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(overlay.text(), "तेज़");
    }

    #[tokio::test]
    async fn language_change_retranslates() {
        let translator = Arc::new(
            ScriptedTranslator::new()
                .with("Buy milk", "दूध खरीदें")
                .with_lang("Buy milk", Language::En, "Buy some milk"),
        );
        let (tx, rx) = languages(Language::Hi);
        let overlay = TranslatedText::new(translator.clone(), "Buy milk", rx);
        let mut display = overlay.subscribe();
        display.wait_for(|s| s == "दूध खरीदें").await.unwrap();

        tx.send_replace(Language::En);
        display.wait_for(|s| s == "Buy some milk").await.unwrap();
        assert_eq!(translator.calls(), 2);
        assert_eq!(overlay.source(), "Buy milk");
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_discards_outstanding_requests() {
        let translator = Arc::new(
            ScriptedTranslator::new()
                .with("Buy milk", "दूध खरीदें")
                .slow("Buy milk", Duration::from_millis(300)),
        );
        let (_tx, rx) = languages(Language::Hi);
        let overlay = TranslatedText::new(translator.clone(), "Buy milk", rx);
        let display = overlay.subscribe();
        tokio::task::yield_now().await;

        drop(overlay);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(*display.borrow(), "Buy milk");
        assert_eq!(translator.calls(), 1);
    }

    #[tokio::test]
    async fn publish_refuses_superseded_tickets() {
        let (display, _) = watch::channel("first".to_string());
        let inner = Inner {
            gateway: Arc::new(ScriptedTranslator::new()),
            generation: AtomicU64::new(1),
            source: Mutex::new("first".into()),
            language: Mutex::new(Language::Hi),
            display,
        };

        inner.generation.fetch_add(1, Ordering::SeqCst);
        assert!(!inner.publish(1, "stale".into()));
        assert_eq!(*inner.display.borrow(), "first");
        assert!(inner.publish(2, "current".into()));
        assert_eq!(*inner.display.borrow(), "current");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn late_translation_never_replaces_cleared_text() {
        let translator = Arc::new(
            ScriptedTranslator::new()
                .with("Buy milk", "दूध खरीदें")
                .slow("Buy milk", Duration::from_millis(50)),
        );
        let (_tx, rx) = languages(Language::Hi);
        let overlay = TranslatedText::new(translator, "Buy milk", rx);
        let pending = overlay.set_text("Buy milk");

        overlay.set_text("").await.unwrap();
        pending.await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(overlay.text(), "");
    }
}
