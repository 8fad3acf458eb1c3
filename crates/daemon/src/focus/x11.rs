//! X11 focus source.
//!
//! Resolves the focused application by querying `_NET_ACTIVE_WINDOW` on the
//! root window and reading the active window's `WM_CLASS`. The class name
//! (the second, capitalized component) is the stable identifier users put
//! in their mappings, e.g. `Alacritty` or `Google-chrome`.

use x11rb::connection::Connection;
use x11rb::protocol::xproto::{Atom, AtomEnum, ConnectionExt, Window};
use x11rb::rust_connection::RustConnection;

use super::{FocusSource, QueryError};

/// Focus source backed by a window manager speaking EWMH.
pub struct X11FocusSource {
    conn: RustConnection,
    root: Window,
    net_active_window: Atom,
}

impl X11FocusSource {
    /// Connects to the display named by `$DISPLAY`.
    pub fn connect() -> Result<Self, QueryError> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| QueryError::Disconnected(format!("cannot open display: {}", e)))?;
        let root = conn.setup().roots[screen_num].root;

        let net_active_window = conn
            .intern_atom(false, b"_NET_ACTIVE_WINDOW")
            .map_err(|e| QueryError::Disconnected(e.to_string()))?
            .reply()
            .map_err(|e| QueryError::Backend(e.to_string()))?
            .atom;

        Ok(Self {
            conn,
            root,
            net_active_window,
        })
    }

    fn active_window(&self) -> Result<Option<Window>, QueryError> {
        let reply = self
            .conn
            .get_property(
                false,
                self.root,
                self.net_active_window,
                AtomEnum::WINDOW,
                0,
                1,
            )
            .map_err(|e| QueryError::Disconnected(e.to_string()))?
            .reply()
            .map_err(|e| QueryError::Backend(e.to_string()))?;

        let window = reply.value32().and_then(|mut values| values.next());
        match window {
            None | Some(0) => Ok(None),
            Some(window) => Ok(Some(window)),
        }
    }

    fn window_class(&self, window: Window) -> Result<Option<String>, QueryError> {
        let reply = self
            .conn
            .get_property(
                false,
                window,
                AtomEnum::WM_CLASS,
                AtomEnum::STRING,
                0,
                1024,
            )
            .map_err(|e| QueryError::Disconnected(e.to_string()))?
            .reply()
            // The window can vanish between the two roundtrips; surfacing
            // that as a transient error makes the poller treat it as
            // "no change" instead of a switch to unknown.
            .map_err(|e| QueryError::Backend(e.to_string()))?;

        Ok(class_from_wm_class(&reply.value))
    }
}

impl FocusSource for X11FocusSource {
    fn query(&self) -> Result<Option<String>, QueryError> {
        match self.active_window()? {
            None => Ok(None),
            Some(window) => self.window_class(window),
        }
    }
}

/// Extracts the application class from a raw `WM_CLASS` property value.
///
/// The property holds two NUL-terminated strings, `instance\0class\0`.
/// The class is preferred; some minimal windows only set the instance.
fn class_from_wm_class(value: &[u8]) -> Option<String> {
    let mut parts = value.split(|&b| b == 0);
    let instance = parts.next().unwrap_or(&[]);
    let class = parts.next().unwrap_or(&[]);

    let name = if !class.is_empty() { class } else { instance };
    if name.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(name).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_from_wm_class() {
        assert_eq!(
            class_from_wm_class(b"alacritty\0Alacritty\0"),
            Some("Alacritty".to_string())
        );
    }

    #[test]
    fn test_class_falls_back_to_instance() {
        assert_eq!(
            class_from_wm_class(b"xterm\0\0"),
            Some("xterm".to_string())
        );
        assert_eq!(class_from_wm_class(b"xterm"), Some("xterm".to_string()));
    }

    #[test]
    fn test_empty_property_has_no_class() {
        assert_eq!(class_from_wm_class(b""), None);
        assert_eq!(class_from_wm_class(b"\0\0"), None);
    }

    #[test]
    fn test_non_utf8_class_is_lossy() {
        let class = class_from_wm_class(b"app\0caf\xe9\0").unwrap();
        assert!(class.starts_with("caf"));
    }
}
