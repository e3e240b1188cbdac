//! Text injection backends for the committed output of recognized speech:
//! character-at-a-time typing, clipboard paste with restore, and the
//! foreground-window detection used to pick between the two and to select
//! the "remote" paste profile.

pub mod foreground;
pub mod paste;
pub mod typing;

pub use foreground::{detect_foreground_window, is_remote_compat, WindowInfo};
pub use paste::PasteInjector;
pub use typing::TypingInjector;

use async_trait::async_trait;
use capswriter_foundation::InjectionError;

/// Backend-agnostic entry point the client's output committer drives once
/// it has decided typing vs. paste for a given increment of text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextInjector: Send + Sync {
    async fn inject(&mut self, text: &str, remote_profile: bool) -> Result<(), InjectionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_injector_reports_backend_failure_to_the_caller() {
        let mut mock = MockTextInjector::new();
        mock.expect_inject()
            .times(1)
            .returning(|_, _| Err(InjectionError::NoMethodAvailable));

        let result = mock.inject("hello", false).await;
        assert!(matches!(result, Err(InjectionError::NoMethodAvailable)));
    }
}
