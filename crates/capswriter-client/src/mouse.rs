//! Global mouse-button source for `ShortcutKind::Mouse` entries. The
//! XDG `GlobalShortcuts` portal has no mouse trigger type, so mouse
//! combos are driven by a raw `rdev` listener on its own OS thread
//! instead, forwarding button press/release as synthetic `KeyEvent`s
//! the same way `hotkey::PortalHotkeySource` does for keyboard combos.

use std::collections::HashSet;
use std::thread::{self, JoinHandle};

use capswriter_protocol::shortcut::{Shortcut, ShortcutKind};
use capswriter_shortcut::KeyEvent;
use rdev::{listen, Button, Event, EventType};
use tokio::sync::mpsc::Sender;

fn button_name(button: Button) -> String {
    match button {
        Button::Left => "mouse_left".to_string(),
        Button::Right => "mouse_right".to_string(),
        Button::Middle => "mouse_middle".to_string(),
        Button::Unknown(code) => format!("mouse_{code}"),
    }
}

/// Spawns the listener thread (`rdev::listen` blocks its caller). A no-op
/// if no enabled shortcut actually references a mouse button, so the
/// listener never attaches when the user has no mouse shortcuts bound.
pub fn spawn(shortcuts: Vec<Shortcut>, key_tx: Sender<KeyEvent>) -> JoinHandle<()> {
    let tracked: HashSet<String> = shortcuts
        .iter()
        .filter(|s| s.enabled && s.kind == ShortcutKind::Mouse)
        .flat_map(|s| s.combo_members().into_iter().map(str::to_string))
        .collect();

    thread::Builder::new()
        .name("capswriter-mouse-listener".into())
        .spawn(move || {
            if tracked.is_empty() {
                tracing::debug!("no mouse shortcuts configured, mouse listener idle");
                return;
            }

            let callback = move |event: Event| {
                let (name, down) = match event.event_type {
                    EventType::ButtonPress(button) => (button_name(button), true),
                    EventType::ButtonRelease(button) => (button_name(button), false),
                    _ => return,
                };
                if !tracked.contains(&name) {
                    return;
                }
                let event = if down { KeyEvent::down(name) } else { KeyEvent::up(name) };
                let _ = key_tx.blocking_send(event);
            };

            if let Err(err) = listen(callback) {
                tracing::error!(?err, "mouse button listener failed to start");
            }
        })
        .expect("failed to spawn mouse listener thread")
}

#[cfg(test)]
mod tests {
    use super::button_name;
    use rdev::Button;

    #[test]
    fn known_buttons_map_to_stable_names() {
        assert_eq!(button_name(Button::Left), "mouse_left");
        assert_eq!(button_name(Button::Right), "mouse_right");
        assert_eq!(button_name(Button::Middle), "mouse_middle");
        assert_eq!(button_name(Button::Unknown(8)), "mouse_8");
    }
}
