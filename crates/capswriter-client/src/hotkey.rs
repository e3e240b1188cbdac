//! OS-level key source for keyboard shortcuts: binds one XDG
//! `GlobalShortcuts` portal shortcut per enabled `ShortcutKind::Keyboard`
//! entry in the user's configuration and forwards each Activated/
//! Deactivated signal as synthetic down/up `KeyEvent`s for that
//! shortcut's own combo members, so `ShortcutEngine`'s per-task
//! `ComboTracker` sees the same shape it would from a raw key listener.
//! Mouse shortcuts are not portal-backed (`GlobalShortcuts` has no mouse
//! trigger type) and are sourced separately by `crate::mouse`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use capswriter_protocol::shortcut::{Shortcut, ShortcutKind};
use capswriter_shortcut::KeyEvent;
use tokio::sync::mpsc::Sender;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};
use zbus::{Connection, Proxy};

pub struct PortalHotkeySource {
    connection: Arc<Connection>,
    portal: Proxy<'static>,
}

impl PortalHotkeySource {
    pub async fn connect() -> Result<Self, zbus::Error> {
        let connection = Connection::session().await?;
        let portal = Proxy::new(
            &connection,
            "org.freedesktop.portal.Desktop",
            "/org/freedesktop/portal/desktop",
            "org.freedesktop.portal.GlobalShortcuts",
        )
        .await?;
        Ok(Self { connection: Arc::new(connection), portal })
    }

    async fn wait_response(
        &self,
        request: &OwnedObjectPath,
        timeout: Duration,
    ) -> Result<HashMap<String, OwnedValue>, zbus::Error> {
        let req_proxy = Proxy::new(
            &*self.connection,
            "org.freedesktop.portal.Desktop",
            request.as_str(),
            "org.freedesktop.portal.Request",
        )
        .await?;
        let mut stream = req_proxy.receive_signal("Response").await?;
        let msg = tokio::time::timeout(timeout, futures::StreamExt::next(&mut stream))
            .await
            .map_err(|_| io_err("portal request timed out"))?
            .ok_or_else(|| io_err("portal request stream ended"))?;
        let (_status, results): (u32, HashMap<String, OwnedValue>) = msg
            .body()
            .map_err(|e| io_err(&format!("failed to decode portal Response: {e}")))?;
        Ok(results)
    }

    async fn create_session(&self) -> Result<OwnedObjectPath, zbus::Error> {
        let mut options: HashMap<String, Value> = HashMap::new();
        options.insert("handle_token".into(), Value::from("capswriter_session"));
        options.insert("session_handle_token".into(), Value::from("capswriter_handle"));

        let request: OwnedObjectPath = self.portal.call("CreateSession", &(options)).await?;
        let results = self.wait_response(&request, Duration::from_secs(10)).await?;
        let handle: String = results
            .get("session_handle")
            .cloned()
            .ok_or_else(|| io_err("missing session_handle in portal response"))?
            .try_into()
            .map_err(|e| io_err(&format!("invalid session_handle: {e}")))?;
        OwnedObjectPath::try_from(handle.as_str())
            .map_err(|e| io_err(&format!("invalid session_handle path: {e}")))
    }

    /// Registers one portal shortcut per entry in `bindings`, each with a
    /// `preferred_trigger` accelerator hint derived from its configured
    /// combo; the compositor's shortcut picker still has final say over
    /// the actual physical trigger.
    async fn bind(
        &self,
        session: &OwnedObjectPath,
        bindings: &[(String, Shortcut)],
    ) -> Result<(), zbus::Error> {
        let entries: Vec<(String, HashMap<String, Value>)> = bindings
            .iter()
            .map(|(id, shortcut)| {
                let mut opts: HashMap<String, Value> = HashMap::new();
                opts.insert(
                    "description".into(),
                    Value::from(format!("CapsWriter shortcut: {}", shortcut.key)),
                );
                opts.insert(
                    "preferred_trigger".into(),
                    Value::from(accelerator_for(shortcut)),
                );
                (id.clone(), opts)
            })
            .collect();

        let mut options: HashMap<String, Value> = HashMap::new();
        options.insert("handle_token".into(), Value::from("capswriter_bind"));

        let request: OwnedObjectPath = self
            .portal
            .call("BindShortcuts", &(session.clone(), entries, "", options))
            .await?;
        self.wait_response(&request, Duration::from_secs(15)).await?;
        Ok(())
    }

    /// Runs until the portal's signal streams end (session revoked,
    /// portal exits) or the task is aborted by its owner. `shortcuts` is
    /// the full configured set; only enabled keyboard entries are bound.
    pub async fn run(
        self,
        shortcuts: Vec<Shortcut>,
        key_tx: Sender<KeyEvent>,
    ) -> Result<(), zbus::Error> {
        let bindings: HashMap<String, Shortcut> = shortcuts
            .into_iter()
            .filter(|s| s.enabled && s.kind == ShortcutKind::Keyboard)
            .enumerate()
            .map(|(idx, shortcut)| (format!("capswriter_{idx}"), shortcut))
            .collect();

        if bindings.is_empty() {
            tracing::warn!("no enabled keyboard shortcuts configured; portal source idles");
        }

        let id_list: Vec<(String, Shortcut)> = bindings
            .iter()
            .map(|(id, shortcut)| (id.clone(), shortcut.clone()))
            .collect();

        let session = self.create_session().await?;
        self.bind(&session, &id_list).await?;

        let mut activated = self.portal.receive_signal("Activated").await?;
        let mut deactivated = self.portal.receive_signal("Deactivated").await?;

        tracing::info!("global shortcut portal bound, session {}", session.as_str());

        loop {
            tokio::select! {
                Some(msg) = futures::StreamExt::next(&mut activated) => {
                    if let Some(shortcut) = matching_shortcut(&msg, &session, &bindings) {
                        for member in shortcut.combo_members() {
                            let _ = key_tx.send(KeyEvent::down(member)).await;
                        }
                    }
                }
                Some(msg) = futures::StreamExt::next(&mut deactivated) => {
                    if let Some(shortcut) = matching_shortcut(&msg, &session, &bindings) {
                        for member in shortcut.combo_members() {
                            let _ = key_tx.send(KeyEvent::up(member)).await;
                        }
                    }
                }
                else => {
                    tracing::warn!("global shortcut signal streams ended");
                    return Ok(());
                }
            }
        }
    }
}

fn matching_shortcut<'a>(
    msg: &zbus::Message,
    session: &OwnedObjectPath,
    bindings: &'a HashMap<String, Shortcut>,
) -> Option<&'a Shortcut> {
    let (session_o, shortcut_id, ..) = msg
        .body::<(OwnedObjectPath, String, u64, HashMap<String, OwnedValue>)>()
        .ok()?;
    if session_o.as_str() != session.as_str() {
        return None;
    }
    bindings.get(&shortcut_id)
}

/// Converts a combo like `"ctrl+shift+r"` into an XDG accelerator hint
/// (`"<Control><Shift>R"`). Best-effort: the portal treats this as a
/// suggestion, not a binding contract.
fn accelerator_for(shortcut: &Shortcut) -> String {
    let mut prefix = String::new();
    let mut main_key = String::new();
    for member in shortcut.combo_members() {
        match member {
            "ctrl" | "ctrl_l" | "ctrl_r" => prefix.push_str("<Control>"),
            "shift" | "shift_l" | "shift_r" => prefix.push_str("<Shift>"),
            "alt" | "alt_l" | "alt_r" => prefix.push_str("<Alt>"),
            "cmd" | "cmd_l" | "cmd_r" | "super" | "super_l" | "super_r" | "win" => {
                prefix.push_str("<Super>")
            }
            other => main_key = other.to_uppercase(),
        }
    }
    prefix.push_str(&main_key);
    prefix
}

fn io_err(msg: &str) -> zbus::Error {
    zbus::Error::InputOutput(Arc::new(std::io::Error::new(std::io::ErrorKind::Other, msg.to_string())))
}

/// Spawns the portal source, retrying the connect/bind step once after a
/// short delay since the portal's D-Bus service can still be starting up
/// right after login. Logs and gives up silently if it never appears —
/// the engine just never receives a `down`, so the client runs without
/// a working keyboard shortcut instead of failing to start.
pub fn spawn(shortcuts: Vec<Shortcut>, key_tx: Sender<KeyEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        for attempt in 0..2 {
            match PortalHotkeySource::connect().await {
                Ok(source) => {
                    if let Err(err) = source.run(shortcuts.clone(), key_tx.clone()).await {
                        tracing::error!(%err, "global shortcut portal session ended");
                    }
                    return;
                }
                Err(err) => {
                    tracing::warn!(%err, attempt, "GlobalShortcuts portal unavailable");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
        tracing::error!("no global shortcut backend available; keyboard shortcuts are inactive");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shortcut(key: &str) -> Shortcut {
        Shortcut {
            key: key.into(),
            kind: ShortcutKind::Keyboard,
            hold_mode: true,
            suppress: true,
            enabled: true,
        }
    }

    #[test]
    fn accelerator_orders_modifiers_before_the_final_key() {
        assert_eq!(accelerator_for(&shortcut("ctrl+shift+r")), "<Control><Shift>R");
        assert_eq!(accelerator_for(&shortcut("caps_lock")), "CAPS_LOCK");
    }
}
