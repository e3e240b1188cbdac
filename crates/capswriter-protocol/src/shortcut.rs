use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShortcutKind {
    Keyboard,
    Mouse,
}

/// A configured shortcut. Combo keys are represented as a tuple of
/// normalized key names joined by `+`; left/right modifiers are aliased
/// (`ctrl_l` and `ctrl_r` both normalize to `ctrl`) by the engine, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shortcut {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: ShortcutKind,
    #[serde(default)]
    pub hold_mode: bool,
    #[serde(default)]
    pub suppress: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Shortcut {
    /// Splits a combo key string like `"ctrl+shift+r"` into its normalized
    /// members, in declared order.
    pub fn combo_members(&self) -> Vec<&str> {
        self.key.split('+').map(str::trim).collect()
    }
}

/// Per-shortcut session state. Named states mirror the `ShortcutTask state`
/// machine: `idle -> pressed -> recording -> (cancelled | finishing ->
/// final_sent -> idle)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShortcutState {
    Idle,
    Pending,
    Recording,
    Finishing,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combo_members_split_on_plus() {
        let shortcut = Shortcut {
            key: "ctrl+shift+r".into(),
            kind: ShortcutKind::Keyboard,
            hold_mode: true,
            suppress: false,
            enabled: true,
        };
        assert_eq!(shortcut.combo_members(), vec!["ctrl", "shift", "r"]);
    }
}
