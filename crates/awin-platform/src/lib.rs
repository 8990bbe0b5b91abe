//! Backend interface so `awin-core` stays OS-agnostic.
//!
//! One implementation per windowing substrate (Win32, X11, Wayland), picked
//! once at startup. Everything here runs on the event thread; only the
//! [`Waker`] crosses threads.

pub mod capability;
pub mod clock;
pub mod dialog;
pub mod error;
pub mod monitor;
#[cfg(unix)]
pub mod wake;
pub mod xkb;

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use awin_core::{Cursor, CursorSource, Point, PointF, WindowConfig, WindowId, WindowState};

pub use error::{PlatformError, Result};
pub use monitor::MonitorInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Win32,
    X11,
    Wayland,
}

/// Forces a blocked `wait_events` to return. Safe to call from any thread.
pub trait Waker: Send + Sync {
    fn wake(&self);
}

pub trait Backend {
    fn kind(&self) -> BackendKind;

    fn create_window(&mut self, config: &WindowConfig) -> Result<WindowId>;
    /// Releases every native resource of the window before returning.
    fn destroy_window(&mut self, id: WindowId) -> Result<()>;
    /// Copy of the canonical state as last confirmed by the translator.
    fn window_state(&self, id: WindowId) -> Option<WindowState>;

    /// Drains queued notifications without blocking.
    fn poll_events(&mut self);
    /// Blocks until a notification, a wake or the timeout. `None` waits
    /// indefinitely unless an internal deadline is pending.
    fn wait_events(&mut self, timeout: Option<Duration>);
    fn waker(&self) -> Arc<dyn Waker>;

    fn set_title(&mut self, id: WindowId, title: &str);
    fn set_size(&mut self, id: WindowId, size: Point);
    fn set_position(&mut self, id: WindowId, pos: Point);
    fn set_resize_limit(&mut self, id: WindowId, limit: Point);
    fn show(&mut self, id: WindowId);
    fn hide(&mut self, id: WindowId);
    fn focus(&mut self, id: WindowId);
    fn set_fullscreen(&mut self, id: WindowId, enabled: bool);
    fn minimize(&mut self, id: WindowId);
    fn maximize(&mut self, id: WindowId);
    fn restore(&mut self, id: WindowId);
    fn set_decorated(&mut self, id: WindowId, decorated: bool);
    /// Marks the window as wanting to close, as if the user asked.
    fn request_close(&mut self, id: WindowId);

    fn set_cursor_position(&mut self, id: WindowId, pos: PointF);
    fn create_cursor(&mut self, source: CursorSource) -> Result<Cursor>;
    fn destroy_cursor(&mut self, cursor: &Cursor);
    fn set_cursor(&mut self, id: WindowId, cursor: &Rc<Cursor>);
    fn set_cursor_hidden(&mut self, id: WindowId, hidden: bool);

    fn set_clipboard_string(&mut self, id: WindowId, text: &str);
    fn clipboard_string(&mut self, id: WindowId) -> String;

    fn monitors(&self) -> Vec<MonitorInfo>;

    fn window_monitor(&self, id: WindowId) -> Option<MonitorInfo> {
        let state = self.window_state(id)?;
        let center = state.position + state.dimensions / 2;
        let monitors = self.monitors();
        monitors
            .iter()
            .find(|m| m.rect().contains(center))
            .or_else(|| monitors.iter().find(|m| m.primary))
            .cloned()
    }

    /// Releases the connection. Called once, after every window is gone.
    fn shutdown(&mut self);
}
