//! Foreground-window detection, used to pick typing vs. paste mode and the
//! "remote" paste profile for remote-control applications (WeChat, RustDesk,
//! scrcpy, RDP clients) where synthetic keystrokes are unreliable.

use std::process::Command;

/// Best-effort snapshot of the foreground window. Any field may be empty if
/// the platform-specific query failed or returned nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowInfo {
    pub title: String,
    pub class_name: String,
    pub process_name: String,
    pub app_name: String,
}

const REMOTE_COMPAT_KEYWORDS: &[&str] = &[
    "weixin",
    "wechat",
    "微信",
    "rustdesk",
    "scrcpy",
    "mstsc",
    "remote desktop",
    "rdp",
    "远程桌面",
];

/// Returns the matched keyword if any lowercased field of `info` contains a
/// remote-compat token, signalling that paste mode (and the "remote"
/// profile) should be forced regardless of the configured default.
pub fn is_remote_compat(info: &WindowInfo) -> Option<&'static str> {
    let fields = [
        info.title.to_lowercase(),
        info.class_name.to_lowercase(),
        info.process_name.to_lowercase(),
        info.app_name.to_lowercase(),
    ];
    REMOTE_COMPAT_KEYWORDS
        .iter()
        .find(|kw| fields.iter().any(|field| field.contains(*kw)))
        .copied()
}

/// Queries the active foreground window on the current platform. Returns
/// `WindowInfo::default()` (all fields empty, never a remote match) if the
/// platform query fails — injection then falls back to the configured
/// default output mode.
pub fn detect_foreground_window() -> WindowInfo {
    #[cfg(target_os = "windows")]
    {
        detect_windows()
    }
    #[cfg(target_os = "macos")]
    {
        detect_macos()
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        detect_linux()
    }
}

#[cfg(target_os = "macos")]
fn detect_macos() -> WindowInfo {
    let script = r#"
        tell application "System Events"
            set frontApp to name of first application process whose frontmost is true
        end tell
        return frontApp
    "#;
    let output = match Command::new("osascript").arg("-e").arg(script).output() {
        Ok(output) if output.status.success() => output,
        _ => return WindowInfo::default(),
    };
    let process_name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let app_name = guess_app_name("", "", &process_name);
    WindowInfo {
        title: String::new(),
        class_name: String::new(),
        process_name,
        app_name,
    }
}

#[cfg(all(unix, not(target_os = "macos")))]
fn detect_linux() -> WindowInfo {
    let output = match Command::new("wmctrl").args(["-G", "-a", ":ACTIVE:"]).output() {
        Ok(output) if output.status.success() => output,
        _ => return WindowInfo::default(),
    };
    let text = String::from_utf8_lossy(&output.stdout);
    let parts: Vec<&str> = text.split_whitespace().collect();
    if parts.len() < 6 {
        return WindowInfo::default();
    }
    let title = parts[5..].join(" ");
    let app_name = guess_app_name(&title, "", "");
    WindowInfo {
        title,
        class_name: String::new(),
        process_name: String::new(),
        app_name,
    }
}

#[cfg(target_os = "windows")]
fn detect_windows() -> WindowInfo {
    // A real implementation queries GetForegroundWindow/GetWindowText via
    // the win32 API; the window-detection surface is otherwise identical
    // across platforms so it is centralized behind this function.
    WindowInfo::default()
}

fn guess_app_name(title: &str, class_name: &str, process_name: &str) -> String {
    if !process_name.is_empty() {
        return process_name.trim_end_matches(".exe").to_lowercase();
    }
    if !class_name.is_empty() {
        let lower = class_name.to_lowercase();
        for (needle, label) in [
            ("chrome", "Chrome"),
            ("msedge", "Edge"),
            ("firefox", "Firefox"),
            ("vscode", "VSCode"),
            ("winword", "Word"),
        ] {
            if lower.contains(needle) {
                return label.to_string();
            }
        }
    }
    title.split_whitespace().next().unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wechat_title_is_flagged_remote_compat() {
        let info = WindowInfo {
            title: "WeChat".into(),
            ..WindowInfo::default()
        };
        assert_eq!(is_remote_compat(&info), Some("wechat"));
    }

    #[test]
    fn rustdesk_process_name_is_flagged() {
        let info = WindowInfo {
            process_name: "rustdesk.exe".into(),
            ..WindowInfo::default()
        };
        assert_eq!(is_remote_compat(&info), Some("rustdesk"));
    }

    #[test]
    fn ordinary_editor_is_not_flagged() {
        let info = WindowInfo {
            title: "main.rs - capswriter".into(),
            process_name: "code".into(),
            ..WindowInfo::default()
        };
        assert_eq!(is_remote_compat(&info), None);
    }

    #[test]
    fn guess_app_name_prefers_process_name_over_class_and_title() {
        assert_eq!(guess_app_name("Untitled", "Notepad", "notepad.exe"), "notepad");
        assert_eq!(guess_app_name("Untitled", "Chrome_WidgetWin_1", ""), "Chrome");
        assert_eq!(guess_app_name("Inbox - Mail", "", ""), "Inbox");
    }
}
