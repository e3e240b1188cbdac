use std::time::Duration;
use thiserror::Error;

/// Top-level error composed at each binary's boundary from the per-domain
/// errors below. Mirrors §7's seven error kinds: most are handled (reconnect,
/// WARN-and-continue) before they ever reach this enum; what remains here is
/// what actually propagates to a caller.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Injection(#[from] InjectionError),

    #[error("shutdown requested")]
    ShutdownRequested,

    #[error("fatal error, cannot recover: {0}")]
    Fatal(String),

    #[error("transient error, will retry: {0}")]
    Transient(String),
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::Transient(format!("io error: {err}"))
    }
}

impl From<tokio::task::JoinError> for CoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        CoreError::Transient(format!("task join failed: {err}"))
    }
}

/// §4.1 AudioCapture failure modes.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("device not found: {name:?}")]
    DeviceNotFound { name: Option<String> },

    #[error("device disconnected")]
    DeviceDisconnected,

    #[error("format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("no audio data for {duration:?}")]
    NoDataTimeout { duration: Duration },

    #[error("cpal stream error: {0}")]
    Cpal(#[from] cpal::StreamError),

    #[error("build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("supported stream configs error: {0}")]
    SupportedStreamConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("fatal audio error: {0}")]
    Fatal(String),
}

/// Configuration loading/validation errors (§SPEC_FULL.md "Configuration").
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration parsing error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },
}

/// Wire/data-model errors surfaced by `capswriter-protocol`.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame decode error: {0}")]
    Decode(String),

    #[error("unexpected message for task {task_id}: {reason}")]
    UnexpectedMessage { task_id: String, reason: String },
}

/// §4.5 OutputCommitter / injection-backend errors.
#[derive(Error, Debug)]
pub enum InjectionError {
    #[error("no injection method available")]
    NoMethodAvailable,

    #[error("clipboard error: {0}")]
    Clipboard(String),

    #[error("process error: {0}")]
    Process(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// §4.1 device hot-swap notifications (AudioCapture → caller).
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    DeviceSwitched { from: Option<String>, to: String },
    DeviceSwitchFailed {
        attempted: String,
        fallback: Option<String>,
    },
    CurrentDeviceDisconnected { name: String },
}

/// §7 recovery policy, attached to the subset of `CoreError` variants the
/// caller should act on automatically rather than surface as fatal.
#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    Retry { max_attempts: u32, delay: Duration },
    Fallback { to: String },
    Ignore,
    Fatal,
}

impl CoreError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            CoreError::Audio(AudioError::DeviceDisconnected) => RecoveryStrategy::Retry {
                max_attempts: 5,
                delay: Duration::from_secs(2),
            },
            CoreError::Audio(AudioError::DeviceNotFound { .. }) => RecoveryStrategy::Fallback {
                to: "default".into(),
            },
            CoreError::Fatal(_) | CoreError::ShutdownRequested => RecoveryStrategy::Fatal,
            _ => RecoveryStrategy::Ignore,
        }
    }
}
