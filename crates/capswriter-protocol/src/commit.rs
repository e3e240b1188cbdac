use std::collections::VecDeque;
use std::time::Instant;

/// Computes the longest common prefix of two strings on `char` boundaries
/// (never splits a multi-byte UTF-8 codepoint, which matters for CJK text).
pub fn longest_common_prefix(a: &str, b: &str) -> String {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

/// Per-task_id state in OutputCommitter. `committed` only ever grows by
/// appending characters; OutputCommitter never deletes characters already
/// committed, so this type exposes no operation that could shrink it.
#[derive(Debug, Clone, Default)]
pub struct PartialCommitState {
    prev_partial: String,
    committed: String,
}

impl PartialCommitState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn committed(&self) -> &str {
        &self.committed
    }

    /// Folds one incoming partial/final text into the state, returning the
    /// increment that should be committed to the output now (empty if the
    /// target regressed behind what's already committed).
    pub fn accept(&mut self, target: &str) -> String {
        if !target.starts_with(&self.committed) {
            tracing::warn!(
                committed = %self.committed,
                target = %target,
                "partial result regressed behind committed text, ignoring"
            );
            self.prev_partial = target.to_string();
            return String::new();
        }

        let stable = longest_common_prefix(&self.prev_partial, target);
        let increment = if stable.len() > self.committed.len() {
            stable[self.committed.len()..].to_string()
        } else {
            String::new()
        };

        self.committed.push_str(&increment);
        self.prev_partial = target.to_string();
        increment
    }

    /// Commits any remainder of `target` beyond what `accept` already
    /// folded in, for use on the terminal Result of a task.
    pub fn finalize(&mut self, target: &str) -> String {
        let mut increment = self.accept(target);
        if target.len() > self.committed.len() {
            let remainder = &target[self.committed.len()..];
            self.committed.push_str(remainder);
            increment.push_str(remainder);
        }
        increment
    }
}

/// Global, process-wide clipboard-restore bookkeeping for the paste output
/// path. The ring of recently-injected texts is consulted before any
/// baseline refresh so a mirrored/remote clipboard does not poison restore.
#[derive(Debug, Clone)]
pub struct ClipboardRestoreState {
    baseline: Option<String>,
    last_paste: Option<Instant>,
    recently_injected: VecDeque<String>,
}

const RECENTLY_INJECTED_CAPACITY: usize = 8;

impl Default for ClipboardRestoreState {
    fn default() -> Self {
        Self {
            baseline: None,
            last_paste: None,
            recently_injected: VecDeque::with_capacity(RECENTLY_INJECTED_CAPACITY),
        }
    }
}

impl ClipboardRestoreState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn baseline(&self) -> Option<&str> {
        self.baseline.as_deref()
    }

    /// Refreshes the baseline only if we're outside the coalescing window
    /// since the last paste, matching "lazy: only if the window is expired,
    /// otherwise reuse the prior baseline".
    pub fn maybe_refresh_baseline(&mut self, current_clipboard: &str, window_ms: u64) {
        let expired = match self.last_paste {
            None => true,
            Some(last) => last.elapsed().as_millis() as u64 >= window_ms,
        };
        if expired {
            self.baseline = Some(current_clipboard.to_string());
        }
    }

    pub fn record_paste(&mut self, text: &str) {
        self.last_paste = Some(Instant::now());
        if self.recently_injected.len() == RECENTLY_INJECTED_CAPACITY {
            self.recently_injected.pop_front();
        }
        self.recently_injected.push_back(text.to_string());
    }

    /// Whether `candidate` is safe to treat as "still ours" during guard
    /// polling: either the pre-session baseline or something we wrote.
    pub fn is_recognized(&self, candidate: &str) -> bool {
        self.baseline.as_deref() == Some(candidate)
            || self.recently_injected.iter().any(|t| t == candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_partial_commit_sequence() {
        let mut state = PartialCommitState::new();
        assert_eq!(state.accept("你"), "");
        assert_eq!(state.accept("你好"), "你");
        assert_eq!(state.accept("你好世"), "好");
        assert_eq!(state.finalize("你好世界"), "世界");
        assert_eq!(state.committed(), "你好世界");
    }

    #[test]
    fn regression_is_ignored_and_committed_stays_put() {
        let mut state = PartialCommitState::new();
        state.accept("hello");
        state.finalize("hello");
        assert_eq!(state.committed(), "hello");
        assert_eq!(state.accept("help"), "");
        assert_eq!(state.committed(), "hello");
    }

    #[test]
    fn recognized_clipboard_includes_baseline_and_injected_ring() {
        let mut state = ClipboardRestoreState::new();
        state.maybe_refresh_baseline("original", 1_000);
        state.record_paste("injected one");
        assert!(state.is_recognized("original"));
        assert!(state.is_recognized("injected one"));
        assert!(!state.is_recognized("something else"));
    }
}
