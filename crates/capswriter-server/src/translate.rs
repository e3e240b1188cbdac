//! Translate-prefix intercept: if a final result's text opens with a
//! recognized translate command ("请翻译为...", "please translate to..."),
//! call the configured MTran-compatible backend and substitute its output.
//! Parsing is pure and synchronous; only the network call is async.

use std::sync::Arc;
use std::time::Duration;

use capswriter_protocol::config::TranslateConfig;
use capswriter_telemetry::ServerMetrics;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::OnceLock;

const CN_PREFIXES: [&str; 2] = ["请翻译为", "请翻译"];
const EN_PREFIXES: [&str; 2] = ["please translate to", "please translate"];
const LEADING_SEPARATORS: &str = " \t\r\n:：,，。.;；!?！？、…";
const BRACKET_OPEN: &str = "([{（【《<";
const BRACKET_CLOSE: &str = ")]}）】》>";

fn leading_punct_chars() -> &'static str {
    "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~，。！？；：、…·\u{201c}\u{201d}\u{2018}\u{2019}「」『』（）【】《》〈〉"
}

fn cn_aliases() -> &'static [(&'static str, &'static str)] {
    &[
        ("简体中文", "zh-CN"),
        ("繁体中文", "zh-TW"),
        ("印度尼西亚语", "id"),
        ("印尼语", "id"),
        ("阿拉伯语", "ar"),
        ("西班牙语", "es"),
        ("葡萄牙语", "pt"),
        ("意大利语", "it"),
        ("土耳其语", "tr"),
        ("朝鲜语", "ko"),
        ("越南语", "vi"),
        ("英语", "en"),
        ("英文", "en"),
        ("中文", "zh"),
        ("汉语", "zh"),
        ("日语", "ja"),
        ("日文", "ja"),
        ("西语", "es"),
        ("法语", "fr"),
        ("法文", "fr"),
        ("德语", "de"),
        ("德文", "de"),
        ("俄语", "ru"),
        ("俄文", "ru"),
        ("韩语", "ko"),
        ("葡语", "pt"),
        ("意语", "it"),
        ("印地语", "hi"),
        ("泰语", "th"),
        ("马来语", "ms"),
    ]
}

fn en_aliases() -> &'static [(&'static str, &'static str)] {
    &[
        ("simplified chinese", "zh-CN"),
        ("traditional chinese", "zh-TW"),
        ("english", "en"),
        ("chinese", "zh"),
        ("japanese", "ja"),
        ("spanish", "es"),
        ("french", "fr"),
        ("german", "de"),
        ("russian", "ru"),
        ("korean", "ko"),
        ("portuguese", "pt"),
        ("italian", "it"),
        ("arabic", "ar"),
        ("hindi", "hi"),
        ("thai", "th"),
        ("vietnamese", "vi"),
        ("turkish", "tr"),
        ("indonesian", "id"),
        ("malay", "ms"),
    ]
}

fn iso_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]{2,3}(?:[-_][A-Za-z]{2,4})?)(.*)$").unwrap())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslateCommand {
    pub target_lang: String,
    pub content: String,
    pub trigger: &'static str,
}

fn trim_leading_separators(text: &str) -> &str {
    text.trim_start_matches(|c| LEADING_SEPARATORS.contains(c))
}

fn strip_leading_punctuation(text: &str) -> String {
    let punct = leading_punct_chars();
    text.trim_start_matches(|c: char| c.is_whitespace() || punct.contains(c))
        .trim_start()
        .to_string()
}

fn strip_optional_brackets_prefix(text: &str) -> &str {
    let trimmed = text.trim_start();
    match trimmed.chars().next() {
        Some(c) if BRACKET_OPEN.contains(c) => trimmed[c.len_utf8()..].trim_start(),
        _ => trimmed,
    }
}

fn strip_optional_brackets_after_lang(text: &str) -> &str {
    let trimmed = text.trim_start();
    let rest = match trimmed.chars().next() {
        Some(c) if BRACKET_CLOSE.contains(c) => &trimmed[c.len_utf8()..],
        _ => trimmed,
    };
    trim_leading_separators(rest)
}

fn match_cn_alias(rest: &str) -> Option<(String, String)> {
    cn_aliases()
        .iter()
        .find(|(alias, _)| rest.starts_with(alias))
        .map(|(alias, lang)| {
            let tail = strip_optional_brackets_after_lang(&rest[alias.len()..]);
            (lang.to_string(), tail.to_string())
        })
}

fn match_en_alias(rest: &str) -> Option<(String, String)> {
    let lower = rest.to_lowercase();
    for (alias, lang) in en_aliases() {
        if !lower.starts_with(alias) {
            continue;
        }
        let tail = &rest[alias.len()..];
        if let Some(c) = tail.chars().next() {
            if c.is_alphanumeric() || c == '_' {
                continue;
            }
        }
        let tail = strip_optional_brackets_after_lang(tail);
        return Some((lang.to_string(), tail.to_string()));
    }
    None
}

fn match_iso_code(rest: &str) -> Option<(String, String)> {
    let caps = iso_code_re().captures(rest)?;
    let code = caps.get(1)?.as_str().replace('_', "-");
    let tail = caps.get(2)?.as_str();
    if let Some(c) = tail.chars().next() {
        if !c.is_whitespace() && !":：,，。;；!?！？、)]}）】》>".contains(c) {
            return None;
        }
    }
    Some((code, strip_optional_brackets_after_lang(tail).to_string()))
}

fn parse_target_and_content(rest: &str) -> (String, String) {
    let text = trim_leading_separators(rest);
    if text.is_empty() {
        return ("en".to_string(), String::new());
    }

    let bracket_stripped = strip_optional_brackets_prefix(text);
    for candidate in [text, bracket_stripped] {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        for matcher in [match_cn_alias, match_en_alias, match_iso_code] {
            if let Some((lang, content)) = matcher(candidate) {
                return (lang, content.trim().to_string());
            }
        }
    }

    ("en".to_string(), text.trim().to_string())
}

/// Matches only a command at the very start of the text, mirroring the
/// "only triggers when the prefix is at position 0" rule.
pub fn parse_translate_command(text: &str) -> Option<TranslateCommand> {
    let raw = text.trim();
    if raw.is_empty() {
        return None;
    }

    for prefix in CN_PREFIXES {
        if let Some(rest) = raw.strip_prefix(prefix) {
            let (target_lang, content) = parse_target_and_content(rest);
            return Some(TranslateCommand { target_lang, content, trigger: prefix });
        }
    }

    let lower = raw.to_lowercase();
    for prefix in EN_PREFIXES {
        if lower.starts_with(prefix) {
            let rest = &raw[prefix.len()..];
            let (target_lang, content) = parse_target_and_content(rest);
            return Some(TranslateCommand { target_lang, content, trigger: prefix });
        }
    }

    None
}

/// Calls the configured backend and, on a hit, substitutes `text` with the
/// translation. Returns the original text unchanged on any miss or failure
/// so a flaky translate backend never blocks dictation output.
pub async fn maybe_translate(text: &str, config: &TranslateConfig, metrics: &Arc<ServerMetrics>) -> String {
    if !config.command_enable {
        return text.to_string();
    }

    let Some(command) = parse_translate_command(text) else {
        return text.to_string();
    };
    if command.content.is_empty() {
        return text.to_string();
    }

    match translate_via_mtran(&command.content, &command.target_lang, config).await {
        Some(translated) => {
            tracing::info!(
                trigger = command.trigger,
                target = %command.target_lang,
                len = command.content.len(),
                "prefix translate hit"
            );
            metrics.record_translate(true);
            translated
        }
        None => {
            tracing::warn!("prefix translate failed, keeping original text");
            metrics.record_translate(false);
            text.to_string()
        }
    }
}

async fn translate_via_mtran(text: &str, target_lang: &str, config: &TranslateConfig) -> Option<String> {
    let base = config.server_url.trim().trim_end_matches('/');
    if base.is_empty() {
        return None;
    }

    let timeout = Duration::from_millis(config.timeout_ms.max(1));
    let source_lang = if config.source_lang.trim().is_empty() { "auto" } else { config.source_lang.trim() };
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;

    let mut request = client
        .post(format!("{base}/google/language/translate/v2"))
        .json(&json!({ "q": text, "target": target_lang, "source": source_lang, "format": "text" }));
    if !config.api_token.trim().is_empty() {
        request = request.bearer_auth(config.api_token.trim());
    }
    if let Some(value) = post_json(request).await {
        if let Some(translated) = value
            .get("data")
            .and_then(|d| d.get("translations"))
            .and_then(|t| t.get(0))
            .and_then(|t| t.get("translatedText"))
            .and_then(Value::as_str)
        {
            return Some(clean_or_raw(translated));
        }
    }

    let mut request = client
        .post(format!("{base}/translate"))
        .json(&json!({ "from": source_lang, "to": target_lang, "text": text, "html": false }));
    if !config.api_token.trim().is_empty() {
        request = request.bearer_auth(config.api_token.trim());
    }
    if let Some(value) = post_json(request).await {
        let translated = value
            .get("result")
            .or_else(|| value.get("translation"))
            .or_else(|| value.get("translatedText"))
            .and_then(Value::as_str);
        if let Some(translated) = translated {
            return Some(clean_or_raw(translated));
        }
    }

    None
}

fn clean_or_raw(translated: &str) -> String {
    let trimmed = translated.trim();
    let cleaned = strip_leading_punctuation(trimmed);
    if cleaned.is_empty() {
        trimmed.to_string()
    } else {
        cleaned
    }
}

async fn post_json(request: reqwest::RequestBuilder) -> Option<Value> {
    match request.send().await {
        Ok(response) => response.json::<Value>().await.ok(),
        Err(err) => {
            tracing::warn!(%err, "translate request failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cn_prefix_with_alias_language_splits_target_and_content() {
        let cmd = parse_translate_command("请翻译为英语你好世界").unwrap();
        assert_eq!(cmd.target_lang, "en");
        assert_eq!(cmd.content, "你好世界");
    }

    #[test]
    fn en_prefix_defaults_to_english_when_no_language_named() {
        let cmd = parse_translate_command("please translate bonjour le monde").unwrap();
        assert_eq!(cmd.target_lang, "en");
        assert_eq!(cmd.content, "bonjour le monde");
    }

    #[test]
    fn en_alias_requires_word_boundary() {
        let cmd = parse_translate_command("please translate to englishman says hi").unwrap();
        assert_eq!(cmd.target_lang, "en");
        assert_eq!(cmd.content, "englishman says hi");
    }

    #[test]
    fn iso_code_target_is_recognized() {
        let cmd = parse_translate_command("请翻译为zh-CN: hello there").unwrap();
        assert_eq!(cmd.target_lang, "zh-CN");
        assert_eq!(cmd.content, "hello there");
    }

    #[test]
    fn non_prefixed_text_does_not_match() {
        assert!(parse_translate_command("just a normal sentence").is_none());
    }

    #[test]
    fn prefix_must_be_at_the_very_start() {
        assert!(parse_translate_command("well, 请翻译为英语你好").is_none());
    }
}
