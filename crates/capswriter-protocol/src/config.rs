use serde::{Deserialize, Serialize};

use crate::shortcut::Shortcut;

/// `partial_input_enabled` is three-valued in the source config: `force`
/// means "stream partials even when the server hints against it".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartialInputMode {
    True,
    False,
    Force,
}

impl PartialInputMode {
    pub fn is_enabled(&self) -> bool {
        !matches!(self, PartialInputMode::False)
    }
}

impl Default for PartialInputMode {
    fn default() -> Self {
        PartialInputMode::True
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseTailConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub adaptive: bool,
    #[serde(default = "default_release_tail_ms")]
    pub ms: u64,
    #[serde(default = "default_release_tail_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_release_tail_silence_ms")]
    pub silence_ms: u64,
    #[serde(default = "default_release_tail_vad_threshold")]
    pub vad_threshold: f32,
}

impl Default for ReleaseTailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            adaptive: true,
            ms: default_release_tail_ms(),
            max_ms: default_release_tail_max_ms(),
            silence_ms: default_release_tail_silence_ms(),
            vad_threshold: default_release_tail_vad_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionConfig {
    #[serde(default = "default_partial_char_interval_ms")]
    pub typing_char_interval_ms: u64,
    #[serde(default)]
    pub pre_delay_ms: u64,
    #[serde(default = "default_remote_pre_delay_ms")]
    pub remote_pre_delay_ms: u64,
    #[serde(default = "default_restore_delay_ms")]
    pub restore_delay_ms: u64,
    #[serde(default = "default_restore_retry_count")]
    pub restore_retry_count: u32,
    #[serde(default = "default_restore_retry_interval_ms")]
    pub restore_retry_interval_ms: u64,
    #[serde(default = "default_restore_baseline_window_ms")]
    pub restore_baseline_window_ms: u64,
    #[serde(default = "default_restore_guard_window_ms")]
    pub restore_guard_window_ms: u64,
    #[serde(default = "default_guard_poll_interval_ms")]
    pub guard_poll_interval_ms: u64,
    #[serde(default = "default_remote_write_count")]
    pub remote_write_count: u32,
    #[serde(default = "default_remote_write_interval_ms")]
    pub remote_write_interval_ms: u64,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            typing_char_interval_ms: default_partial_char_interval_ms(),
            pre_delay_ms: 0,
            remote_pre_delay_ms: default_remote_pre_delay_ms(),
            restore_delay_ms: default_restore_delay_ms(),
            restore_retry_count: default_restore_retry_count(),
            restore_retry_interval_ms: default_restore_retry_interval_ms(),
            restore_baseline_window_ms: default_restore_baseline_window_ms(),
            restore_guard_window_ms: default_restore_guard_window_ms(),
            guard_poll_interval_ms: default_guard_poll_interval_ms(),
            remote_write_count: default_remote_write_count(),
            remote_write_interval_ms: default_remote_write_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub server_uri: String,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_paste")]
    pub paste: bool,
    #[serde(default = "default_true")]
    pub restore_clip: bool,
    #[serde(default = "default_threshold_secs")]
    pub threshold: f32,
    #[serde(default)]
    pub release_tail: ReleaseTailConfig,
    #[serde(default)]
    pub partial_input_enabled: PartialInputMode,
    #[serde(default = "default_partial_char_interval_ms")]
    pub partial_input_char_interval_ms: u64,
    #[serde(default = "default_partial_seg_duration")]
    pub partial_input_seg_duration: f32,
    #[serde(default = "default_partial_seg_overlap")]
    pub partial_input_seg_overlap: f32,
    #[serde(default = "default_mic_seg_duration")]
    pub mic_seg_duration: f32,
    #[serde(default = "default_mic_seg_overlap")]
    pub mic_seg_overlap: f32,
    #[serde(default = "default_true")]
    pub audio_device_auto_refresh: bool,
    #[serde(default = "default_device_poll_interval_secs")]
    pub audio_device_poll_interval_secs: f32,
    #[serde(default)]
    pub trash_punc: String,
    #[serde(default)]
    pub shortcuts: Vec<Shortcut>,
    #[serde(default)]
    pub injection: InjectionConfig,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_uri: "ws://127.0.0.1:6016".into(),
            secret: String::new(),
            paste: default_paste(),
            restore_clip: true,
            threshold: default_threshold_secs(),
            release_tail: ReleaseTailConfig::default(),
            partial_input_enabled: PartialInputMode::default(),
            partial_input_char_interval_ms: default_partial_char_interval_ms(),
            partial_input_seg_duration: default_partial_seg_duration(),
            partial_input_seg_overlap: default_partial_seg_overlap(),
            mic_seg_duration: default_mic_seg_duration(),
            mic_seg_overlap: default_mic_seg_overlap(),
            audio_device_auto_refresh: true,
            audio_device_poll_interval_secs: default_device_poll_interval_secs(),
            trash_punc: String::new(),
            shortcuts: Vec::new(),
            injection: InjectionConfig::default(),
        }
    }
}

impl ClientSettings {
    /// Normalizes `server_uri` accepting ws/wss/http/https/bare host:port,
    /// always returning a ws/wss URI, and clamps nonsensical values,
    /// logging a WARN for each field it had to adjust.
    pub fn validate(&mut self) {
        self.server_uri = normalize_server_uri(&self.server_uri);

        if self.threshold < 0.0 {
            tracing::warn!(value = self.threshold, "threshold < 0, clamping to 0");
            self.threshold = 0.0;
        }
        if self.release_tail.silence_ms == 0 && self.release_tail.enabled {
            tracing::warn!("release_tail.silence_ms is 0 with release tail enabled, clamping to 1");
            self.release_tail.silence_ms = 1;
        }
        if self.partial_input_seg_overlap >= self.partial_input_seg_duration {
            tracing::warn!(
                overlap = self.partial_input_seg_overlap,
                duration = self.partial_input_seg_duration,
                "partial_input_seg_overlap >= seg_duration, clamping overlap"
            );
            self.partial_input_seg_overlap = self.partial_input_seg_duration * 0.5;
        }
        if self.injection.restore_retry_count == 0 {
            tracing::warn!("injection.restore_retry_count is 0, clamping to 1");
            self.injection.restore_retry_count = 1;
        }
        if self.injection.remote_write_count == 0 {
            tracing::warn!("injection.remote_write_count is 0, clamping to 1");
            self.injection.remote_write_count = 1;
        }
    }
}

fn normalize_server_uri(uri: &str) -> String {
    if let Some(rest) = uri.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = uri.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if uri.starts_with("ws://") || uri.starts_with("wss://") {
        uri.to_string()
    } else {
        format!("ws://{uri}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    FunAsrNano,
    Sensevoice,
    Paraformer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpApiConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default = "default_http_addr")]
    pub addr: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_seg_duration")]
    pub seg_duration: f32,
    #[serde(default = "default_seg_overlap")]
    pub seg_overlap: f32,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            enable: false,
            addr: default_http_addr(),
            port: default_http_port(),
            seg_duration: default_seg_duration(),
            seg_overlap: default_seg_overlap(),
            timeout_secs: default_http_timeout_secs(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslateConfig {
    #[serde(default)]
    pub command_enable: bool,
    #[serde(default)]
    pub server_url: String,
    #[serde(default = "default_translate_source_lang")]
    pub source_lang: String,
    #[serde(default = "default_translate_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub api_token: String,
}

impl Default for TranslateConfig {
    fn default() -> Self {
        Self {
            command_enable: false,
            server_url: String::new(),
            source_lang: default_translate_source_lang(),
            timeout_ms: default_translate_timeout_ms(),
            api_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_server_addr")]
    pub addr: String,
    #[serde(default = "default_server_port")]
    pub port: u16,
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_model_type")]
    pub model_type: ModelType,
    #[serde(default = "default_queue_max_total")]
    pub queue_max_total: usize,
    #[serde(default = "default_queue_max_per_client")]
    pub queue_max_per_client: usize,
    #[serde(default)]
    pub http: HttpApiConfig,
    #[serde(default)]
    pub translate: TranslateConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
            port: default_server_port(),
            secret: String::new(),
            model_type: default_model_type(),
            queue_max_total: default_queue_max_total(),
            queue_max_per_client: default_queue_max_per_client(),
            http: HttpApiConfig::default(),
            translate: TranslateConfig::default(),
        }
    }
}

impl ServerSettings {
    pub fn validate(&mut self) {
        if self.queue_max_per_client == 0 {
            tracing::warn!("queue_max_per_client is 0, clamping to 1");
            self.queue_max_per_client = 1;
        }
        if self.queue_max_total < self.queue_max_per_client {
            tracing::warn!(
                queue_max_total = self.queue_max_total,
                queue_max_per_client = self.queue_max_per_client,
                "queue_max_total < queue_max_per_client, raising total to match"
            );
            self.queue_max_total = self.queue_max_per_client;
        }
        if self.http.timeout_secs < 5 {
            tracing::warn!(
                value = self.http.timeout_secs,
                "http.timeout_secs below the 5s floor, clamping"
            );
            self.http.timeout_secs = 5;
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_paste() -> bool {
    !cfg!(windows)
}
fn default_threshold_secs() -> f32 {
    0.3
}
fn default_release_tail_ms() -> u64 {
    350
}
fn default_release_tail_max_ms() -> u64 {
    1000
}
fn default_release_tail_silence_ms() -> u64 {
    180
}
fn default_release_tail_vad_threshold() -> f32 {
    0.02
}
fn default_partial_char_interval_ms() -> u64 {
    10
}
fn default_partial_seg_duration() -> f32 {
    6.0
}
fn default_partial_seg_overlap() -> f32 {
    1.0
}
fn default_mic_seg_duration() -> f32 {
    60.0
}
fn default_mic_seg_overlap() -> f32 {
    4.0
}
fn default_device_poll_interval_secs() -> f32 {
    1.5
}
fn default_server_addr() -> String {
    "0.0.0.0".into()
}
fn default_server_port() -> u16 {
    6016
}
fn default_model_type() -> ModelType {
    ModelType::Paraformer
}
fn default_queue_max_total() -> usize {
    200
}
fn default_queue_max_per_client() -> usize {
    20
}
fn default_http_addr() -> String {
    "0.0.0.0".into()
}
fn default_http_port() -> u16 {
    6017
}
fn default_seg_duration() -> f32 {
    60.0
}
fn default_seg_overlap() -> f32 {
    4.0
}
fn default_http_timeout_secs() -> u64 {
    30
}
fn default_max_upload_mb() -> u64 {
    200
}
fn default_translate_source_lang() -> String {
    "auto".into()
}
fn default_translate_timeout_ms() -> u64 {
    5000
}
fn default_remote_pre_delay_ms() -> u64 {
    50
}
fn default_restore_delay_ms() -> u64 {
    100
}
fn default_restore_retry_count() -> u32 {
    3
}
fn default_restore_retry_interval_ms() -> u64 {
    80
}
fn default_restore_baseline_window_ms() -> u64 {
    1500
}
fn default_restore_guard_window_ms() -> u64 {
    2800
}
fn default_guard_poll_interval_ms() -> u64 {
    250
}
fn default_remote_write_count() -> u32 {
    3
}
fn default_remote_write_interval_ms() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_uri_normalizes_http_and_bare_host() {
        assert_eq!(normalize_server_uri("http://h:1"), "ws://h:1");
        assert_eq!(normalize_server_uri("https://h:1"), "wss://h:1");
        assert_eq!(normalize_server_uri("h:1"), "ws://h:1");
        assert_eq!(normalize_server_uri("wss://h:1"), "wss://h:1");
    }

    #[test]
    fn validate_raises_queue_max_total_to_match_per_client() {
        let mut settings = ServerSettings {
            queue_max_total: 1,
            queue_max_per_client: 20,
            ..ServerSettings::default()
        };
        settings.validate();
        assert_eq!(settings.queue_max_total, 20);
    }

    #[test]
    fn validate_enforces_http_timeout_floor() {
        let mut settings = ServerSettings::default();
        settings.http.timeout_secs = 1;
        settings.validate();
        assert_eq!(settings.http.timeout_secs, 5);
    }

    #[test]
    fn validate_clamps_zeroed_injection_retry_counts() {
        let mut settings = ClientSettings::default();
        settings.injection.restore_retry_count = 0;
        settings.injection.remote_write_count = 0;
        settings.validate();
        assert_eq!(settings.injection.restore_retry_count, 1);
        assert_eq!(settings.injection.remote_write_count, 1);
    }
}
