//! Character-at-a-time typing backend. Each grapheme is sent as its own
//! key event with an inter-char delay, rather than enigo's batched `text()`
//! (which on some platforms round-trips through the IME and can reorder or
//! drop CJK input).

use std::time::Duration;

use async_trait::async_trait;
use capswriter_foundation::InjectionError;
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use unicode_segmentation::UnicodeSegmentation;

use crate::TextInjector;

pub struct TypingInjector {
    enigo: Enigo,
    char_interval: Duration,
}

impl TypingInjector {
    pub fn new(char_interval_ms: u64) -> Result<Self, InjectionError> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| InjectionError::Process(format!("enigo init failed: {e}")))?;
        Ok(Self {
            enigo,
            char_interval: Duration::from_millis(char_interval_ms),
        })
    }
}

#[async_trait]
impl TextInjector for TypingInjector {
    async fn inject(&mut self, text: &str, _remote_profile: bool) -> Result<(), InjectionError> {
        for grapheme in text.graphemes(true) {
            for ch in grapheme.chars() {
                self.enigo
                    .key(Key::Unicode(ch), Direction::Click)
                    .map_err(|e| InjectionError::Process(format!("key injection failed: {e}")))?;
            }
            if !self.char_interval.is_zero() {
                tokio::time::sleep(self.char_interval).await;
            }
        }
        Ok(())
    }
}
