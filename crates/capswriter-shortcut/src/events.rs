/// A raw key/mouse event as reported by the platform backend, already
/// normalized to a lowercase key name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    pub down: bool,
}

impl KeyEvent {
    pub fn down(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            down: true,
        }
    }

    pub fn up(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            down: false,
        }
    }
}

/// What a shortcut session did, reported to whoever wired up the
/// engine (SessionFramer/WSClient in the client binary).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Begin { shortcut_key: String },
    Finish { shortcut_key: String },
    Cancel { shortcut_key: String },
}
