use std::sync::{Arc, Mutex};

use tauri::{AppHandle, Runtime};
use tauri_plugin_global_shortcut::{GlobalShortcutExt, Shortcut, ShortcutState};
use tracing::{debug, warn};

pub const DEFAULT_SHORTCUT: &str = "CommandOrControl+Shift+U";

#[derive(Debug, Default)]
struct BindingState {
    registered_shortcut: Option<String>,
}

/// Owns the process-wide registration of the controller's single global
/// shortcut. At most one combo is registered at any time; binding always
/// releases the previous registration first, so re-initialization (e.g. a
/// dev-mode reload) can never leave two handlers firing per key press.
#[derive(Debug, Clone)]
pub struct HotkeyBinding {
    state: Arc<Mutex<BindingState>>,
}

impl Default for HotkeyBinding {
    fn default() -> Self {
        Self::new()
    }
}

impl HotkeyBinding {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(BindingState::default())),
        }
    }

    pub fn registered_shortcut(&self) -> Option<String> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.registered_shortcut.clone())
    }

    /// Registers `combo`, releasing any prior registration owned by this
    /// binding first. `on_pressed` fires only for key-down edges; release
    /// edges are filtered here so callers never see them.
    pub fn bind<R, F>(&self, app: &AppHandle<R>, combo: &str, on_pressed: F) -> Result<(), String>
    where
        R: Runtime,
        F: Fn() + Send + Sync + 'static,
    {
        bind_with_registrar(
            &self.state,
            combo,
            |shortcut| {
                app.global_shortcut()
                    .unregister(shortcut)
                    .map_err(|error| error.to_string())
            },
            |shortcut| {
                app.global_shortcut()
                    .on_shortcut(shortcut, move |_app, _shortcut, event| {
                        if matches!(event.state, ShortcutState::Pressed) {
                            on_pressed();
                        }
                    })
                    .map_err(|error| error.to_string())
            },
        )
    }

    /// Idempotent: unbinding with nothing registered is a no-op.
    pub fn unbind<R: Runtime>(&self, app: &AppHandle<R>) {
        unbind_with_registrar(&self.state, |shortcut| {
            app.global_shortcut()
                .unregister(shortcut)
                .map_err(|error| error.to_string())
        });
    }
}

fn bind_with_registrar<FU, FR>(
    state: &Arc<Mutex<BindingState>>,
    combo: &str,
    mut unregister_shortcut: FU,
    register_shortcut: FR,
) -> Result<(), String>
where
    FU: FnMut(&str) -> Result<(), String>,
    FR: FnOnce(&str) -> Result<(), String>,
{
    validate_shortcut(combo)?;

    let previous_shortcut = {
        let mut state = state.lock().map_err(|_| lock_error())?;
        state.registered_shortcut.take()
    };

    // Release-before-register, even when the combo is unchanged: a stale
    // handler surviving re-initialization would fire twice per press.
    if let Some(previous) = previous_shortcut {
        if let Err(error) = unregister_shortcut(previous.as_str()) {
            warn!(shortcut = %previous, error = %error, "releasing previous hotkey registration failed");
        }
    }

    register_shortcut(combo)
        .map_err(|error| format!("Failed to register global hotkey `{combo}`: {error}"))?;

    let mut state = state.lock().map_err(|_| lock_error())?;
    state.registered_shortcut = Some(combo.to_string());
    debug!(shortcut = %combo, "global hotkey registered");
    Ok(())
}

fn unbind_with_registrar<FU>(state: &Arc<Mutex<BindingState>>, mut unregister_shortcut: FU)
where
    FU: FnMut(&str) -> Result<(), String>,
{
    let registered = {
        let mut state = match state.lock() {
            Ok(state) => state,
            Err(_) => return,
        };
        state.registered_shortcut.take()
    };

    if let Some(shortcut) = registered {
        if let Err(error) = unregister_shortcut(shortcut.as_str()) {
            warn!(shortcut = %shortcut, error = %error, "hotkey unregistration failed");
        }
    }
}

fn validate_shortcut(combo: &str) -> Result<(), String> {
    combo
        .parse::<Shortcut>()
        .map(|_| ())
        .map_err(|error| format!("Invalid hotkey `{combo}`: {error}"))
}

fn lock_error() -> String {
    "Hotkey binding state lock was poisoned".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(registered: Option<&str>) -> Arc<Mutex<BindingState>> {
        Arc::new(Mutex::new(BindingState {
            registered_shortcut: registered.map(ToString::to_string),
        }))
    }

    #[test]
    fn binding_registers_the_requested_combo() {
        let state = state_with(None);
        let mut unregistered = Vec::new();
        let mut registered = Vec::new();

        bind_with_registrar(
            &state,
            DEFAULT_SHORTCUT,
            |shortcut| {
                unregistered.push(shortcut.to_string());
                Ok(())
            },
            |shortcut| {
                registered.push(shortcut.to_string());
                Ok(())
            },
        )
        .expect("binding should succeed");

        assert!(unregistered.is_empty());
        assert_eq!(registered, vec![DEFAULT_SHORTCUT.to_string()]);
        assert_eq!(
            state.lock().unwrap().registered_shortcut.as_deref(),
            Some(DEFAULT_SHORTCUT)
        );
    }

    #[test]
    fn binding_releases_previous_registration_first() {
        let state = state_with(Some(DEFAULT_SHORTCUT));
        let calls = std::cell::RefCell::new(Vec::new());

        bind_with_registrar(
            &state,
            DEFAULT_SHORTCUT,
            |shortcut| {
                calls.borrow_mut().push(format!("unregister:{shortcut}"));
                Ok(())
            },
            |shortcut| {
                calls.borrow_mut().push(format!("register:{shortcut}"));
                Ok(())
            },
        )
        .expect("rebinding should succeed");

        assert_eq!(
            calls.into_inner(),
            vec![
                format!("unregister:{DEFAULT_SHORTCUT}"),
                format!("register:{DEFAULT_SHORTCUT}"),
            ]
        );
    }

    #[test]
    fn failed_registration_leaves_nothing_bound() {
        let state = state_with(None);

        let error = bind_with_registrar(
            &state,
            DEFAULT_SHORTCUT,
            |_| Ok(()),
            |_| Err("registration failed".to_string()),
        )
        .expect_err("binding should fail");

        assert!(error.contains("Failed to register global hotkey"));
        assert!(state.lock().unwrap().registered_shortcut.is_none());
    }

    #[test]
    fn invalid_combo_is_rejected_before_touching_the_registrar() {
        let state = state_with(None);
        let touched = std::cell::Cell::new(false);

        let error = bind_with_registrar(
            &state,
            "not-a-shortcut",
            |_| {
                touched.set(true);
                Ok(())
            },
            |_| {
                touched.set(true);
                Ok(())
            },
        )
        .expect_err("binding should fail");

        assert!(error.contains("Invalid hotkey"));
        assert!(!touched.get());
    }

    #[test]
    fn unbind_is_idempotent() {
        let state = state_with(Some(DEFAULT_SHORTCUT));
        let mut unregistered = Vec::new();

        unbind_with_registrar(&state, |shortcut| {
            unregistered.push(shortcut.to_string());
            Ok(())
        });
        unbind_with_registrar(&state, |shortcut| {
            unregistered.push(shortcut.to_string());
            Ok(())
        });

        assert_eq!(unregistered, vec![DEFAULT_SHORTCUT.to_string()]);
        assert!(state.lock().unwrap().registered_shortcut.is_none());
    }
}
