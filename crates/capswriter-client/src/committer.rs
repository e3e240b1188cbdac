//! OutputCommitter (C5): folds incoming Results into typing or clipboard
//! paste, picking the backend from the foreground window and deferring
//! output in remote-compat sessions until the final Result.

use std::collections::HashMap;

use capswriter_foundation::InjectionError;
use capswriter_injection::{detect_foreground_window, is_remote_compat, PasteInjector, TextInjector, TypingInjector};
use capswriter_protocol::commit::PartialCommitState;
use capswriter_protocol::config::ClientSettings;
use capswriter_protocol::RecognitionResult;

pub struct OutputCommitter {
    typing: TypingInjector,
    paste: PasteInjector,
    default_paste: bool,
    states: HashMap<String, PartialCommitState>,
    deferred: HashMap<String, String>,
}

impl OutputCommitter {
    pub fn new(settings: &ClientSettings) -> Result<Self, InjectionError> {
        Ok(Self {
            typing: TypingInjector::new(settings.injection.typing_char_interval_ms)?,
            paste: PasteInjector::new(settings.injection.clone())?,
            default_paste: settings.paste,
            states: HashMap::new(),
            deferred: HashMap::new(),
        })
    }

    /// `streaming` is true while the user is still holding the shortcut for
    /// this task_id (the ShortcutEngine has not yet emitted `Finish`).
    pub async fn handle_result(
        &mut self,
        result: RecognitionResult,
        streaming: bool,
    ) -> Result<(), InjectionError> {
        let state = self.states.entry(result.task_id.clone()).or_default();
        let increment = if result.is_final {
            state.finalize(&result.text)
        } else {
            state.accept(&result.text)
        };

        let window = detect_foreground_window();
        let remote_profile = is_remote_compat(&window).is_some();

        if remote_profile && streaming && !result.is_final {
            self.deferred
                .entry(result.task_id.clone())
                .or_default()
                .push_str(&increment);
            return Ok(());
        }

        let mut text = increment;
        if let Some(prefix) = self.deferred.remove(&result.task_id) {
            text = format!("{prefix}{text}");
        }

        if !text.is_empty() {
            let use_paste = remote_profile || self.default_paste;
            if use_paste {
                self.paste.inject(&text, remote_profile).await?;
            } else {
                self.typing.inject(&text, remote_profile).await?;
            }
        }

        if result.is_final {
            self.states.remove(&result.task_id);
            self.deferred.remove(&result.task_id);
        }
        Ok(())
    }
}
