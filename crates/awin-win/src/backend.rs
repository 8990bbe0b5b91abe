use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use awin_core::{
    Cursor, CursorSource, EventDispatchRegistry, Point, PointF, WindowConfig, WindowFlags, WindowId,
    WindowState,
};
use awin_platform::{Backend, BackendKind, MonitorInfo, PlatformError, Result, Waker};
use tracing::{debug, info, warn};
use windows::core::HSTRING;
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, POINT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Threading::{GetCurrentThreadId, INFINITE};
use windows::Win32::UI::HiDpi::{
    GetDpiForWindow, SetProcessDpiAwarenessContext, DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{GetActiveWindow, SetFocus};
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::translate::{release_stuck_keys, Win32Window, WM_NULL};
use crate::window::{
    client_to_outer, create_window_hwnd, register_window_class, window_style, NativeHost,
    SavedFrame, WindowSlot, WINDOW_CLASS_NAME,
};
use crate::{clipboard, cursor, monitor};

struct ThreadWaker {
    thread_id: u32,
}

impl Waker for ThreadWaker {
    fn wake(&self) {
        let posted = unsafe { PostThreadMessageW(self.thread_id, WM_NULL, WPARAM(0), LPARAM(0)) };
        if let Err(err) = posted {
            warn!("failed to post the wake message: {err}");
        }
    }
}

pub struct Win32Backend {
    hinstance_value: isize,
    registry: Rc<EventDispatchRegistry>,
    windows: HashMap<WindowId, Box<WindowSlot>>,
    next_id: u64,
    arrow_value: isize,
    thread_id: u32,
    owned_cursors: HashSet<u64>,
}

impl Win32Backend {
    pub fn new(registry: Rc<EventDispatchRegistry>) -> Result<Self> {
        unsafe {
            let awareness = DPI_AWARENESS_CONTEXT_PER_MONITOR_AWARE_V2;
            if let Err(err) = SetProcessDpiAwarenessContext(awareness) {
                debug!("per-monitor DPI awareness not set: {err}");
            }
            let module =
                GetModuleHandleW(None).map_err(|err| PlatformError::NoDisplay(err.to_string()))?;
            let hinstance = HINSTANCE(module.0);
            register_window_class(hinstance)?;
            let arrow = LoadCursorW(None, IDC_ARROW).unwrap_or_default();
            info!("win32 backend ready");
            Ok(Self {
                hinstance_value: hinstance.0 as isize,
                registry,
                windows: HashMap::new(),
                next_id: 1,
                arrow_value: arrow.0 as isize,
                thread_id: GetCurrentThreadId(),
                owned_cursors: HashSet::new(),
            })
        }
    }

    fn slot(&self, id: WindowId) -> Option<&WindowSlot> {
        let slot = self.windows.get(&id).map(Box::as_ref);
        if slot.is_none() {
            warn!(window = ?id, "request for an unknown window");
        }
        slot
    }

    fn hwnd(&self, id: WindowId) -> Option<HWND> {
        self.slot(id).map(WindowSlot::hwnd)
    }

    fn set_client_rect(&self, hwnd: HWND, origin: Point, size: Point, flags: SET_WINDOW_POS_FLAGS) {
        let rect = unsafe { client_to_outer(hwnd, origin, size) };
        let result = unsafe {
            SetWindowPos(
                hwnd,
                HWND(std::ptr::null_mut()),
                rect.left,
                rect.top,
                rect.right - rect.left,
                rect.bottom - rect.top,
                flags | SWP_NOZORDER | SWP_NOACTIVATE,
            )
        };
        if let Err(err) = result {
            warn!("SetWindowPos failed: {err}");
        }
    }

    fn apply_style(&self, slot: &WindowSlot) {
        let flags = slot.window.borrow().state.flags;
        let hwnd = slot.hwnd();
        unsafe {
            let visible = GetWindowLongW(hwnd, GWL_STYLE) as u32 & WS_VISIBLE.0;
            SetWindowLongW(hwnd, GWL_STYLE, (window_style(flags).0 | visible) as i32);
            let _ = SetWindowPos(
                hwnd,
                HWND(std::ptr::null_mut()),
                0,
                0,
                0,
                0,
                SWP_FRAMECHANGED | SWP_NOMOVE | SWP_NOSIZE | SWP_NOZORDER | SWP_NOACTIVATE,
            );
        }
    }

    fn show_command(&self, id: WindowId, command: SHOW_WINDOW_CMD) {
        if let Some(hwnd) = self.hwnd(id) {
            unsafe {
                let _ = ShowWindow(hwnd, command);
            }
        }
    }

    fn dispatch_pending(&mut self) {
        let mut message = MSG::default();
        unsafe {
            let any = HWND(std::ptr::null_mut());
            while PeekMessageW(&mut message, any, 0, 0, PM_REMOVE).as_bool() {
                if message.message == WM_QUIT {
                    debug!("WM_QUIT received, closing every window");
                    for slot in self.windows.values() {
                        slot.window.borrow_mut().state.notify_close_request();
                    }
                    continue;
                }
                let _ = TranslateMessage(&message);
                DispatchMessageW(&message);
            }

            let active = GetActiveWindow();
            if let Some(slot) = self.windows.values().find(|slot| slot.hwnd() == active) {
                let host = NativeHost {
                    hwnd: active,
                    arrow_value: self.arrow_value,
                };
                release_stuck_keys(&host, &mut slot.window.borrow_mut().state, &slot.registry);
            }
        }
    }
}

impl Backend for Win32Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Win32
    }

    fn create_window(&mut self, config: &WindowConfig) -> Result<WindowId> {
        let id = WindowId(self.next_id);
        self.next_id += 1;
        let state = WindowState::new(id, config);
        let flags = state.flags;
        let size = state.dimensions;
        let slot = Box::new(WindowSlot {
            id,
            registry: Rc::clone(&self.registry),
            window: RefCell::new(Win32Window::new(state)),
            hwnd_value: Cell::new(0),
            arrow_value: self.arrow_value,
            saved_frame: Cell::new(None),
        });
        let hinstance = HINSTANCE(self.hinstance_value as *mut c_void);
        let hwnd = unsafe {
            create_window_hwnd(&slot, hinstance, &config.title, flags, config.position, size)?
        };

        {
            let mut window = slot.window.borrow_mut();
            let dpi = unsafe { GetDpiForWindow(hwnd) };
            if dpi > 0 {
                window.state.content_scale = PointF::splat(dpi as f32 / 96.0);
            }
            let mut origin = POINT::default();
            unsafe {
                let _ = ClientToScreen(hwnd, &mut origin);
            }
            window.state.position = Point::new(origin.x, origin.y);
        }
        self.windows.insert(id, slot);
        info!(window = ?id, title = %config.title, "window created");

        if !config.hidden {
            self.show(id);
        }
        if config.maximized {
            self.maximize(id);
        }
        if config.fullscreen {
            self.set_fullscreen(id, true);
        }
        Ok(id)
    }

    fn destroy_window(&mut self, id: WindowId) -> Result<()> {
        let slot = self.windows.get(&id).ok_or(PlatformError::UnknownWindow(id.0))?;
        let hwnd = slot.hwnd();
        unsafe {
            DestroyWindow(hwnd)
                .map_err(|err| PlatformError::Connection(format!("DestroyWindow: {err}")))?;
        }
        // WM_NCDESTROY has cleared GWLP_USERDATA, nothing points at the slot now
        self.windows.remove(&id);
        debug!(window = ?id, "window destroyed");
        Ok(())
    }

    fn window_state(&self, id: WindowId) -> Option<WindowState> {
        self.windows.get(&id).map(|slot| slot.window.borrow().state.clone())
    }

    fn poll_events(&mut self) {
        self.dispatch_pending();
    }

    fn wait_events(&mut self, timeout: Option<Duration>) {
        let millis = timeout.map_or(INFINITE, |t| t.as_millis().min(INFINITE as u128 - 1) as u32);
        unsafe {
            MsgWaitForMultipleObjects(None, false, millis, QS_ALLINPUT);
        }
        self.dispatch_pending();
    }

    fn waker(&self) -> Arc<dyn Waker> {
        Arc::new(ThreadWaker {
            thread_id: self.thread_id,
        })
    }

    fn set_title(&mut self, id: WindowId, title: &str) {
        let Some(slot) = self.slot(id) else { return };
        slot.window.borrow_mut().state.title = title.to_owned();
        if let Err(err) = unsafe { SetWindowTextW(slot.hwnd(), &HSTRING::from(title)) } {
            warn!("SetWindowTextW failed: {err}");
        }
    }

    fn set_size(&mut self, id: WindowId, size: Point) {
        let Some(slot) = self.slot(id) else { return };
        let (size, position) = {
            let window = slot.window.borrow();
            (window.state.clamp_to_limit(size), window.state.position)
        };
        self.set_client_rect(slot.hwnd(), position, size, SWP_NOMOVE);
    }

    fn set_position(&mut self, id: WindowId, pos: Point) {
        let Some(slot) = self.slot(id) else { return };
        let size = slot.window.borrow().state.dimensions;
        self.set_client_rect(slot.hwnd(), pos, size, SWP_NOSIZE);
    }

    fn set_resize_limit(&mut self, id: WindowId, limit: Point) {
        let Some(slot) = self.slot(id) else { return };
        let size = {
            let mut window = slot.window.borrow_mut();
            window.state.resize_limit = limit.max(Point::ZERO);
            window.state.dimensions
        };
        if size.cmplt(limit).any() {
            self.set_size(id, size);
        }
    }

    fn show(&mut self, id: WindowId) {
        self.show_command(id, SW_SHOWNORMAL);
        // ShowWindow is synchronous here
        if let Some(slot) = self.slot(id) {
            slot.window.borrow_mut().state.notify_visible(true);
        }
    }

    fn hide(&mut self, id: WindowId) {
        self.show_command(id, SW_HIDE);
        if let Some(slot) = self.slot(id) {
            slot.window.borrow_mut().state.notify_visible(false);
        }
    }

    fn focus(&mut self, id: WindowId) {
        let Some(hwnd) = self.hwnd(id) else { return };
        unsafe {
            let _ = BringWindowToTop(hwnd);
            let _ = SetForegroundWindow(hwnd);
            let _ = SetFocus(hwnd);
        }
    }

    fn set_fullscreen(&mut self, id: WindowId, enabled: bool) {
        let Some(slot) = self.slot(id) else { return };
        let hwnd = slot.hwnd();
        if slot.window.borrow().state.is_fullscreen() == enabled {
            return;
        }

        // Win32 applies this synchronously, so the flag flips at request time.
        if enabled {
            let mut rect = RECT::default();
            unsafe {
                let _ = GetWindowRect(hwnd, &mut rect);
            }
            let style = unsafe { GetWindowLongW(hwnd, GWL_STYLE) };
            slot.saved_frame.set(Some(SavedFrame { style, rect }));
            slot.window.borrow_mut().state.notify_fullscreen(true);

            let Some(target) = monitor::monitor_of(hwnd) else {
                warn!(window = ?id, "no monitor to go fullscreen on");
                return;
            };
            self.apply_style(slot);
            unsafe {
                let _ = SetWindowPos(
                    hwnd,
                    HWND_TOP,
                    target.position.x,
                    target.position.y,
                    target.size.x,
                    target.size.y,
                    SWP_FRAMECHANGED | SWP_NOOWNERZORDER | SWP_SHOWWINDOW,
                );
            }
        } else {
            slot.window.borrow_mut().state.notify_fullscreen(false);
            match slot.saved_frame.take() {
                Some(saved) => unsafe {
                    SetWindowLongW(hwnd, GWL_STYLE, saved.style);
                    let _ = SetWindowPos(
                        hwnd,
                        HWND(std::ptr::null_mut()),
                        saved.rect.left,
                        saved.rect.top,
                        saved.rect.right - saved.rect.left,
                        saved.rect.bottom - saved.rect.top,
                        SWP_FRAMECHANGED | SWP_NOZORDER | SWP_NOOWNERZORDER,
                    );
                },
                None => self.apply_style(slot),
            }
        }
    }

    fn minimize(&mut self, id: WindowId) {
        self.show_command(id, SW_MINIMIZE);
    }

    fn maximize(&mut self, id: WindowId) {
        self.show_command(id, SW_MAXIMIZE);
    }

    fn restore(&mut self, id: WindowId) {
        self.show_command(id, SW_RESTORE);
    }

    fn set_decorated(&mut self, id: WindowId, decorated: bool) {
        let Some(slot) = self.slot(id) else { return };
        slot.window.borrow_mut().state.flags.set(WindowFlags::DECORATED, decorated);
        if !slot.window.borrow().state.is_fullscreen() {
            self.apply_style(slot);
        }
    }

    fn request_close(&mut self, id: WindowId) {
        if let Some(slot) = self.slot(id) {
            slot.window.borrow_mut().state.notify_close_request();
        }
    }

    fn set_cursor_position(&mut self, id: WindowId, pos: PointF) {
        let Some(hwnd) = self.hwnd(id) else { return };
        let mut point = POINT {
            x: pos.x as i32,
            y: pos.y as i32,
        };
        unsafe {
            let _ = ClientToScreen(hwnd, &mut point);
            if let Err(err) = SetCursorPos(point.x, point.y) {
                warn!("SetCursorPos failed: {err}");
            }
        }
    }

    fn create_cursor(&mut self, source: CursorSource) -> Result<Cursor> {
        let handle = match &source {
            CursorSource::Standard(shape) => cursor::standard_cursor(*shape)?.0 as usize as u64,
            CursorSource::Image(image) => {
                let handle = cursor::image_cursor(image)?.0 as usize as u64;
                self.owned_cursors.insert(handle);
                handle
            }
        };
        Ok(Cursor::from_native(source, handle))
    }

    fn destroy_cursor(&mut self, cursor: &Cursor) {
        if self.owned_cursors.remove(&cursor.handle()) {
            cursor::destroy_image_cursor(cursor.handle());
        }
    }

    fn set_cursor(&mut self, id: WindowId, cursor: &Rc<Cursor>) {
        let Some(slot) = self.slot(id) else { return };
        let hovered = {
            let mut window = slot.window.borrow_mut();
            window.state.cursor = Rc::downgrade(cursor);
            window.state.hovered && !window.state.cursor_hidden
        };
        if hovered && cursor.valid() {
            unsafe {
                SetCursor(HCURSOR(cursor.handle() as usize as *mut c_void));
            }
        }
    }

    fn set_cursor_hidden(&mut self, id: WindowId, hidden: bool) {
        let Some(slot) = self.slot(id) else { return };
        let (hovered, current) = {
            let mut window = slot.window.borrow_mut();
            window.state.cursor_hidden = hidden;
            let current = window
                .state
                .cursor
                .upgrade()
                .map_or(self.arrow_value as u64, |c| c.handle());
            (window.state.hovered, current)
        };
        if hovered {
            let handle = if hidden { 0 } else { current };
            unsafe {
                SetCursor(HCURSOR(handle as usize as *mut c_void));
            }
        }
    }

    fn set_clipboard_string(&mut self, id: WindowId, text: &str) {
        if let Some(hwnd) = self.hwnd(id) {
            clipboard::set_text(hwnd, text);
        }
    }

    fn clipboard_string(&mut self, id: WindowId) -> String {
        self.hwnd(id).map(clipboard::get_text).unwrap_or_default()
    }

    fn monitors(&self) -> Vec<MonitorInfo> {
        monitor::enumerate_monitors()
    }

    fn window_monitor(&self, id: WindowId) -> Option<MonitorInfo> {
        self.hwnd(id).and_then(monitor::monitor_of)
    }

    fn shutdown(&mut self) {
        let ids: Vec<WindowId> = self.windows.keys().copied().collect();
        for id in ids {
            if let Err(err) = self.destroy_window(id) {
                warn!(window = ?id, "failed to destroy window on shutdown: {err}");
            }
        }
        for handle in self.owned_cursors.drain() {
            cursor::destroy_image_cursor(handle);
        }
        unsafe {
            let hinstance = HINSTANCE(self.hinstance_value as *mut c_void);
            if let Err(err) = UnregisterClassW(WINDOW_CLASS_NAME, hinstance) {
                debug!("UnregisterClassW failed: {err}");
            }
        }
        info!("win32 backend shut down");
    }
}
