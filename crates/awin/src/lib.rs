//! One window API over Win32, X11 and Wayland.
//!
//! [`init_platform`] picks a backend once; the returned [`Platform`] owns it
//! together with the listener registry the backends dispatch canonical
//! events through. Windows are addressed by [`WindowId`] and manipulated
//! through the short-lived [`Window`] handle.
//!
//! ```no_run
//! use std::rc::Rc;
//! use awin::{init_platform, Event, PlatformConfig, WindowConfig, WindowId};
//!
//! let mut platform = init_platform(&PlatformConfig::default())?;
//! platform
//!     .registry()
//!     .subscribe_all(Rc::new(|window: WindowId, event: &Event| println!("{window:?} {event:?}")));
//! let id = platform.create_window(&WindowConfig::new("Test Window", 640, 480))?;
//! while !platform.window(id).should_close() {
//!     platform.wait_events();
//! }
//! # Ok::<(), awin::PlatformError>(())
//! ```

use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use awin_platform::clock::{MonotonicClock, TimerCalibration};
use awin_platform::dialog::DialogProvider;
use tracing::{info, warn};

pub use awin_core::{
    Action, BackendPreference, Cursor, CursorImage, CursorShape, CursorSource, Event,
    EventDispatchRegistry, EventKind, Key, KeyState, Listener, ListenerHandle, Mods, MouseButton,
    PlatformConfig, Point, PointF, WindowConfig, WindowFlags, WindowId, WindowState,
};
pub use awin_platform::{dialog, Backend, BackendKind, MonitorInfo, PlatformError, Result, Waker};

/// Backends to try for [`BackendPreference::Auto`], in order. A Wayland
/// session prefers Wayland and keeps X11 (XWayland) as the fallback.
pub fn auto_backend_order(wayland_display: Option<&str>) -> [BackendKind; 2] {
    match wayland_display {
        Some(display) if !display.is_empty() => [BackendKind::Wayland, BackendKind::X11],
        _ => [BackendKind::X11, BackendKind::Wayland],
    }
}

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        fn open_backend(
            kind: BackendKind,
            _config: &PlatformConfig,
            registry: &Rc<EventDispatchRegistry>,
        ) -> Result<Box<dyn Backend>> {
            match kind {
                BackendKind::Win32 => {
                    Ok(Box::new(awin_win::Win32Backend::new(Rc::clone(registry))?))
                }
                _ => Err(PlatformError::Unsupported("only the Win32 backend exists on Windows")),
            }
        }

        fn native_dialogs() -> Box<dyn DialogProvider> {
            Box::new(awin_win::Win32Dialogs)
        }
    } else if #[cfg(unix)] {
        fn open_backend(
            kind: BackendKind,
            config: &PlatformConfig,
            registry: &Rc<EventDispatchRegistry>,
        ) -> Result<Box<dyn Backend>> {
            let registry = Rc::clone(registry);
            match kind {
                BackendKind::Wayland => {
                    Ok(Box::new(awin_wayland::WaylandBackend::new(config, registry)?))
                }
                BackendKind::X11 => Ok(Box::new(awin_x11::X11Backend::new(config, registry)?)),
                BackendKind::Win32 => {
                    Err(PlatformError::Unsupported("the Win32 backend only exists on Windows"))
                }
            }
        }

        fn native_dialogs() -> Box<dyn DialogProvider> {
            dialog::detect_dialogs()
        }
    } else {
        fn open_backend(
            _kind: BackendKind,
            _config: &PlatformConfig,
            _registry: &Rc<EventDispatchRegistry>,
        ) -> Result<Box<dyn Backend>> {
            Err(PlatformError::Unsupported("no windowing backend for this platform"))
        }

        fn native_dialogs() -> Box<dyn DialogProvider> {
            Box::new(dialog::NullDialogs)
        }
    }
}

/// Connects to the windowing system named by `config.backend`.
///
/// With [`BackendPreference::Auto`] the first backend of
/// [`auto_backend_order`] that connects wins; the error of the last attempt
/// is returned when none does.
pub fn init_platform(config: &PlatformConfig) -> Result<Platform> {
    let registry = Rc::new(EventDispatchRegistry::new());
    let backend = match config.backend {
        BackendPreference::Win32 => open_backend(BackendKind::Win32, config, &registry)?,
        BackendPreference::X11 => open_backend(BackendKind::X11, config, &registry)?,
        BackendPreference::Wayland => open_backend(BackendKind::Wayland, config, &registry)?,
        BackendPreference::Auto => {
            let order = if cfg!(windows) {
                vec![BackendKind::Win32]
            } else {
                auto_backend_order(std::env::var("WAYLAND_DISPLAY").ok().as_deref()).to_vec()
            };
            let mut last_err = PlatformError::Unsupported("no windowing backend for this platform");
            let mut opened = None;
            for kind in order {
                match open_backend(kind, config, &registry) {
                    Ok(backend) => {
                        opened = Some(backend);
                        break;
                    }
                    Err(err) => {
                        warn!(?kind, %err, "backend unavailable, trying the next one");
                        last_err = err;
                    }
                }
            }
            opened.ok_or(last_err)?
        }
    };
    info!(backend = ?backend.kind(), "platform initialised");
    Ok(Platform::with_backend(backend, registry, native_dialogs()))
}

/// The initialised windowing system. Lives on the event thread.
pub struct Platform {
    backend: Box<dyn Backend>,
    registry: Rc<EventDispatchRegistry>,
    clock: MonotonicClock,
    timer: TimerCalibration,
    dialogs: Box<dyn DialogProvider>,
    shut_down: bool,
}

impl Platform {
    /// Wraps an already connected backend. `registry` must be the registry
    /// the backend dispatches through.
    pub fn with_backend(
        backend: Box<dyn Backend>,
        registry: Rc<EventDispatchRegistry>,
        dialogs: Box<dyn DialogProvider>,
    ) -> Self {
        let clock = MonotonicClock::default();
        let timer = TimerCalibration::calibrate(&clock);
        Self {
            backend,
            registry,
            clock,
            timer,
            dialogs,
            shut_down: false,
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn registry(&self) -> &Rc<EventDispatchRegistry> {
        &self.registry
    }

    pub fn create_window(&mut self, config: &WindowConfig) -> Result<WindowId> {
        self.backend.create_window(config)
    }

    pub fn window(&mut self, id: WindowId) -> Window<'_> {
        Window { platform: self, id }
    }

    pub fn destroy_window(&mut self, id: WindowId) -> Result<()> {
        self.backend.destroy_window(id)
    }

    pub fn poll_events(&mut self) {
        self.backend.poll_events();
    }

    pub fn wait_events(&mut self) {
        self.backend.wait_events(None);
    }

    pub fn wait_events_timeout(&mut self, timeout: Duration) {
        self.backend.wait_events(Some(timeout));
    }

    /// Makes a blocked [`Self::wait_events`] return.
    pub fn push_empty_event(&self) {
        self.backend.waker().wake();
    }

    /// Handle for waking the event loop from another thread.
    pub fn waker(&self) -> Arc<dyn Waker> {
        self.backend.waker()
    }

    /// Seconds since initialisation or the last [`Self::set_time`].
    pub fn time(&self) -> f64 {
        self.timer.seconds(&self.clock)
    }

    pub fn set_time(&mut self, seconds: f64) {
        self.timer.set_seconds(&self.clock, seconds);
    }

    pub fn monitors(&self) -> Vec<MonitorInfo> {
        self.backend.monitors()
    }

    pub fn primary_monitor(&self) -> Option<MonitorInfo> {
        let monitors = self.backend.monitors();
        let primary = monitors.iter().position(|monitor| monitor.primary).unwrap_or(0);
        monitors.into_iter().nth(primary)
    }

    /// Windows only keep weak references; the cursor stays usable while the
    /// returned `Rc` lives.
    pub fn create_cursor(&mut self, source: CursorSource) -> Result<Rc<Cursor>> {
        self.backend.create_cursor(source).map(Rc::new)
    }

    pub fn destroy_cursor(&mut self, cursor: Rc<Cursor>) {
        self.backend.destroy_cursor(&cursor);
    }

    pub fn dialogs(&self) -> &dyn DialogProvider {
        self.dialogs.as_ref()
    }

    /// Destroys every window and disconnects. Also runs on drop.
    pub fn terminate(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if std::mem::replace(&mut self.shut_down, true) {
            return;
        }
        self.backend.shutdown();
    }
}

impl Drop for Platform {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// A window of a [`Platform`], borrowed for a sequence of calls.
///
/// Getters read the state last confirmed by the backend and return defaults
/// for a destroyed window.
pub struct Window<'a> {
    platform: &'a mut Platform,
    id: WindowId,
}

impl Window<'_> {
    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn state(&self) -> Option<WindowState> {
        self.platform.backend.window_state(self.id)
    }

    fn read<T: Default>(&self, f: impl FnOnce(&WindowState) -> T) -> T {
        self.state().map(|state| f(&state)).unwrap_or_default()
    }

    pub fn should_close(&self) -> bool {
        self.state().map_or(true, |state| state.ready_to_close)
    }

    pub fn title(&self) -> String {
        self.read(|state| state.title.clone())
    }

    pub fn size(&self) -> Point {
        self.read(|state| state.dimensions)
    }

    pub fn position(&self) -> Point {
        self.read(|state| state.position)
    }

    pub fn content_scale(&self) -> PointF {
        self.state().map_or(PointF::ONE, |state| state.content_scale)
    }

    pub fn cursor_pos(&self) -> PointF {
        self.read(|state| state.cursor_pos)
    }

    pub fn key(&self, key: Key) -> KeyState {
        self.state().map_or(KeyState::Release, |state| state.key_state(key))
    }

    pub fn flags(&self) -> WindowFlags {
        self.read(|state| state.flags)
    }

    pub fn is_focused(&self) -> bool {
        self.read(|state| state.focused)
    }

    pub fn is_hovered(&self) -> bool {
        self.read(|state| state.hovered)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.read(|state| state.is_fullscreen())
    }

    pub fn is_maximized(&self) -> bool {
        self.read(|state| state.is_maximized())
    }

    pub fn is_minimized(&self) -> bool {
        self.read(|state| state.is_minimized())
    }

    pub fn is_visible(&self) -> bool {
        self.state().is_some_and(|state| !state.is_hidden())
    }

    pub fn set_title(&mut self, title: &str) {
        self.platform.backend.set_title(self.id, title);
    }

    pub fn set_size(&mut self, width: i32, height: i32) {
        self.platform.backend.set_size(self.id, Point::new(width, height));
    }

    pub fn set_position(&mut self, x: i32, y: i32) {
        self.platform.backend.set_position(self.id, Point::new(x, y));
    }

    pub fn set_resize_limit(&mut self, width: i32, height: i32) {
        self.platform.backend.set_resize_limit(self.id, Point::new(width, height));
    }

    pub fn show(&mut self) {
        self.platform.backend.show(self.id);
    }

    pub fn hide(&mut self) {
        self.platform.backend.hide(self.id);
    }

    pub fn focus(&mut self) {
        self.platform.backend.focus(self.id);
    }

    pub fn enable_fullscreen(&mut self) {
        self.platform.backend.set_fullscreen(self.id, true);
    }

    pub fn disable_fullscreen(&mut self) {
        self.platform.backend.set_fullscreen(self.id, false);
    }

    pub fn minimize(&mut self) {
        self.platform.backend.minimize(self.id);
    }

    pub fn maximize(&mut self) {
        self.platform.backend.maximize(self.id);
    }

    pub fn restore(&mut self) {
        self.platform.backend.restore(self.id);
    }

    pub fn set_decorated(&mut self, decorated: bool) {
        self.platform.backend.set_decorated(self.id, decorated);
    }

    /// Flags the window as if the user had asked to close it.
    pub fn set_should_close(&mut self) {
        self.platform.backend.request_close(self.id);
    }

    pub fn set_cursor_position(&mut self, x: f32, y: f32) {
        self.platform.backend.set_cursor_position(self.id, PointF::new(x, y));
    }

    pub fn set_cursor(&mut self, cursor: &Rc<Cursor>) {
        self.platform.backend.set_cursor(self.id, cursor);
    }

    pub fn set_cursor_hidden(&mut self, hidden: bool) {
        self.platform.backend.set_cursor_hidden(self.id, hidden);
    }

    pub fn set_clipboard_string(&mut self, text: &str) {
        self.platform.backend.set_clipboard_string(self.id, text);
    }

    pub fn clipboard_string(&mut self) -> String {
        self.platform.backend.clipboard_string(self.id)
    }

    pub fn monitor(&self) -> Option<MonitorInfo> {
        self.platform.backend.window_monitor(self.id)
    }

    pub fn destroy(self) -> Result<()> {
        self.platform.backend.destroy_window(self.id)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use approx::assert_relative_eq;
    use awin_platform::dialog::NullDialogs;

    use super::*;

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl Waker for CountingWaker {
        fn wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Applies requests immediately, the way a cooperative window manager
    /// would confirm them.
    struct FakeBackend {
        registry: Rc<EventDispatchRegistry>,
        windows: HashMap<WindowId, WindowState>,
        next_id: u64,
        waker: Arc<CountingWaker>,
        clipboard: String,
        shutdowns: Rc<Cell<u32>>,
    }

    impl FakeBackend {
        fn new(registry: Rc<EventDispatchRegistry>, shutdowns: Rc<Cell<u32>>) -> Self {
            Self {
                registry,
                windows: HashMap::new(),
                next_id: 1,
                waker: Arc::new(CountingWaker::default()),
                clipboard: String::new(),
                shutdowns,
            }
        }
    }

    impl Backend for FakeBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::X11
        }

        fn create_window(&mut self, config: &WindowConfig) -> Result<WindowId> {
            let id = WindowId(self.next_id);
            self.next_id += 1;
            let mut state = WindowState::new(id, config);
            state.notify_visible(!config.hidden);
            self.windows.insert(id, state);
            Ok(id)
        }

        fn destroy_window(&mut self, id: WindowId) -> Result<()> {
            self.windows
                .remove(&id)
                .map(|_| ())
                .ok_or(PlatformError::UnknownWindow(id.0))
        }

        fn window_state(&self, id: WindowId) -> Option<WindowState> {
            self.windows.get(&id).cloned()
        }

        fn poll_events(&mut self) {}

        fn wait_events(&mut self, _timeout: Option<Duration>) {}

        fn waker(&self) -> Arc<dyn Waker> {
            self.waker.clone()
        }

        fn set_title(&mut self, id: WindowId, title: &str) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.title = title.to_owned();
            }
        }

        fn set_size(&mut self, id: WindowId, size: Point) {
            if let Some(state) = self.windows.get_mut(&id) {
                let size = state.clamp_to_limit(size);
                state.notify_resize(&self.registry, size);
            }
        }

        fn set_position(&mut self, id: WindowId, pos: Point) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.notify_move(&self.registry, pos);
            }
        }

        fn set_resize_limit(&mut self, id: WindowId, limit: Point) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.resize_limit = limit;
            }
        }

        fn show(&mut self, id: WindowId) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.notify_visible(true);
            }
        }

        fn hide(&mut self, id: WindowId) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.notify_visible(false);
            }
        }

        fn focus(&mut self, _id: WindowId) {}

        fn set_fullscreen(&mut self, id: WindowId, enabled: bool) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.notify_fullscreen(enabled);
            }
        }

        fn minimize(&mut self, id: WindowId) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.notify_minimize(&self.registry, true);
            }
        }

        fn maximize(&mut self, id: WindowId) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.notify_maximize(&self.registry, true);
            }
        }

        fn restore(&mut self, id: WindowId) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.notify_minimize(&self.registry, false);
                state.notify_maximize(&self.registry, false);
            }
        }

        fn set_decorated(&mut self, id: WindowId, decorated: bool) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.flags.set(WindowFlags::DECORATED, decorated);
            }
        }

        fn request_close(&mut self, id: WindowId) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.notify_close_request();
            }
        }

        fn set_cursor_position(&mut self, id: WindowId, pos: PointF) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.cursor_pos = pos;
            }
        }

        fn create_cursor(&mut self, source: CursorSource) -> Result<Cursor> {
            Ok(Cursor::from_native(source, 42))
        }

        fn destroy_cursor(&mut self, _cursor: &Cursor) {}

        fn set_cursor(&mut self, id: WindowId, cursor: &Rc<Cursor>) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.cursor = Rc::downgrade(cursor);
            }
        }

        fn set_cursor_hidden(&mut self, id: WindowId, hidden: bool) {
            if let Some(state) = self.windows.get_mut(&id) {
                state.cursor_hidden = hidden;
            }
        }

        fn set_clipboard_string(&mut self, _id: WindowId, text: &str) {
            self.clipboard = text.to_owned();
        }

        fn clipboard_string(&mut self, _id: WindowId) -> String {
            self.clipboard.clone()
        }

        fn monitors(&self) -> Vec<MonitorInfo> {
            vec![
                MonitorInfo {
                    name: "left".into(),
                    size: Point::new(1920, 1080),
                    ..MonitorInfo::default()
                },
                MonitorInfo {
                    name: "right".into(),
                    position: Point::new(1920, 0),
                    size: Point::new(2560, 1440),
                    primary: true,
                    ..MonitorInfo::default()
                },
            ]
        }

        fn shutdown(&mut self) {
            self.shutdowns.set(self.shutdowns.get() + 1);
        }
    }

    struct Fixture {
        platform: Platform,
        events: Rc<RefCell<Vec<Event>>>,
        shutdowns: Rc<Cell<u32>>,
    }

    fn fixture() -> Fixture {
        let registry = Rc::new(EventDispatchRegistry::new());
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        registry.subscribe_all(Rc::new(move |_: WindowId, event: &Event| {
            sink.borrow_mut().push(*event);
        }));
        let shutdowns = Rc::new(Cell::new(0));
        let backend = FakeBackend::new(Rc::clone(&registry), Rc::clone(&shutdowns));
        Fixture {
            platform: Platform::with_backend(Box::new(backend), registry, Box::new(NullDialogs)),
            events,
            shutdowns,
        }
    }

    #[test]
    fn test_auto_order_prefers_wayland_sessions() {
        assert_eq!(auto_backend_order(Some("wayland-0")), [BackendKind::Wayland, BackendKind::X11]);
        assert_eq!(auto_backend_order(Some("")), [BackendKind::X11, BackendKind::Wayland]);
        assert_eq!(auto_backend_order(None), [BackendKind::X11, BackendKind::Wayland]);
    }

    #[test]
    fn test_resize_below_limit_is_clamped_once() {
        let mut f = fixture();
        let config = WindowConfig::new("Test Window", 640, 480).with_resize_limit(500, 400);
        let id = f.platform.create_window(&config).unwrap();

        let mut window = f.platform.window(id);
        window.set_size(300, 300);
        window.set_size(300, 300);
        assert_eq!(window.size(), Point::new(500, 400));
        assert_eq!(
            *f.events.borrow(),
            vec![Event::Resize {
                size: Point::new(500, 400)
            }]
        );
    }

    #[test]
    fn test_should_close_after_request() {
        let mut f = fixture();
        let id = f.platform.create_window(&WindowConfig::new("t", 100, 100)).unwrap();
        assert!(!f.platform.window(id).should_close());
        f.platform.window(id).set_should_close();
        assert!(f.platform.window(id).should_close());
    }

    #[test]
    fn test_destroyed_window_reads_defaults() {
        let mut f = fixture();
        let id = f.platform.create_window(&WindowConfig::new("t", 100, 100)).unwrap();
        f.platform.window(id).destroy().unwrap();
        let window = f.platform.window(id);
        assert!(window.should_close());
        assert_eq!(window.size(), Point::ZERO);
        assert_eq!(window.title(), "");
        assert!(!window.is_visible());
        assert!(f.platform.destroy_window(id).is_err());
    }

    #[test]
    fn test_fullscreen_toggle() {
        let mut f = fixture();
        let id = f.platform.create_window(&WindowConfig::new("t", 100, 100)).unwrap();
        let mut window = f.platform.window(id);
        window.enable_fullscreen();
        assert!(window.is_fullscreen());
        window.disable_fullscreen();
        assert!(!window.is_fullscreen());
    }

    #[test]
    fn test_clipboard_round_trip() {
        let mut f = fixture();
        let id = f.platform.create_window(&WindowConfig::new("t", 100, 100)).unwrap();
        let mut window = f.platform.window(id);
        window.set_clipboard_string("hello");
        assert_eq!(window.clipboard_string(), "hello");
    }

    #[test]
    fn test_cursor_is_weakly_held() {
        let mut f = fixture();
        let id = f.platform.create_window(&WindowConfig::new("t", 100, 100)).unwrap();
        let cursor = f
            .platform
            .create_cursor(CursorSource::Standard(CursorShape::Hand))
            .unwrap();
        f.platform.window(id).set_cursor(&cursor);
        let state = f.platform.window(id).state().unwrap();
        assert_eq!(state.cursor.upgrade().map(|c| c.handle()), Some(42));
        f.platform.destroy_cursor(cursor);
        assert!(state.cursor.upgrade().is_none());
    }

    #[test]
    fn test_push_empty_event_wakes_backend() {
        let registry = Rc::new(EventDispatchRegistry::new());
        let backend = FakeBackend::new(Rc::clone(&registry), Rc::new(Cell::new(0)));
        let waker = Arc::clone(&backend.waker);
        let platform = Platform::with_backend(Box::new(backend), registry, Box::new(NullDialogs));
        platform.push_empty_event();
        let remote = platform.waker();
        std::thread::spawn(move || remote.wake()).join().unwrap();
        assert_eq!(waker.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_set_time() {
        let mut f = fixture();
        f.platform.set_time(10.0);
        let now = f.platform.time();
        assert!(now >= 10.0);
        assert_relative_eq!(now, 10.0, epsilon = 0.5);
    }

    #[test]
    fn test_primary_monitor() {
        let f = fixture();
        assert_eq!(f.platform.monitors().len(), 2);
        assert_eq!(f.platform.primary_monitor().map(|m| m.name), Some("right".into()));
    }

    #[test]
    fn test_window_monitor_uses_the_centre() {
        let mut f = fixture();
        let mut config = WindowConfig::new("t", 400, 300);
        config.position = Some(Point::new(2000, 100));
        let id = f.platform.create_window(&config).unwrap();
        assert_eq!(f.platform.window(id).monitor().map(|m| m.name), Some("right".into()));
    }

    #[test]
    fn test_shutdown_runs_once() {
        let f = fixture();
        let shutdowns = Rc::clone(&f.shutdowns);
        f.platform.terminate();
        assert_eq!(shutdowns.get(), 1);
    }
}
