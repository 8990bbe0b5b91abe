use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::mem::size_of;
use std::rc::Rc;

use awin_core::{EventDispatchRegistry, Point, WindowFlags, WindowId};
use tracing::{trace, warn};
use windows::core::{HSTRING, PCWSTR};
use windows::Win32::Foundation::{HINSTANCE, HWND, LPARAM, LRESULT, POINT, RECT, WPARAM};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetKeyState, MapVirtualKeyW, ReleaseCapture, SetCapture, TrackMouseEvent, MAPVK_VK_TO_VSC,
    TME_LEAVE, TRACKMOUSEEVENT,
};
use windows::Win32::UI::Input::{
    GetRawInputData, RegisterRawInputDevices, HRAWINPUT, RAWINPUT, RAWINPUTDEVICE,
    RAWINPUTDEVICE_FLAGS, RAWINPUTHEADER, RID_INPUT, RIM_TYPEMOUSE,
};
use windows::Win32::Graphics::Gdi::ScreenToClient;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::translate::{
    handle_message, CursorRequest, Message, RawMotion, Reply, Win32Host, Win32Window,
};
use awin_platform::{PlatformError, Result};

pub const WINDOW_CLASS_NAME: PCWSTR = windows::core::w!("AwinWindowClass");

/// Client rectangle and style saved while fullscreen.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SavedFrame {
    pub style: i32,
    pub rect: RECT,
}

/// Everything the window procedure reaches through `GWLP_USERDATA`.
/// Boxed so the address stays stable for the lifetime of the HWND.
pub(crate) struct WindowSlot {
    pub id: WindowId,
    pub registry: Rc<EventDispatchRegistry>,
    pub window: RefCell<Win32Window>,
    pub hwnd_value: Cell<isize>,
    pub arrow_value: isize,
    pub saved_frame: Cell<Option<SavedFrame>>,
}

impl WindowSlot {
    pub fn hwnd(&self) -> HWND {
        HWND(self.hwnd_value.get() as *mut c_void)
    }
}

pub(crate) unsafe fn register_window_class(hinstance: HINSTANCE) -> Result<()> {
    let window_class = WNDCLASSEXW {
        cbSize: size_of::<WNDCLASSEXW>() as u32,
        style: CS_HREDRAW | CS_VREDRAW | CS_OWNDC,
        lpfnWndProc: Some(window_proc),
        hInstance: hinstance,
        hIcon: LoadIconW(None, IDI_APPLICATION).unwrap_or_default(),
        hCursor: LoadCursorW(None, IDC_ARROW).unwrap_or_default(),
        lpszClassName: WINDOW_CLASS_NAME,
        ..Default::default()
    };
    if RegisterClassExW(&window_class) == 0 {
        return Err(PlatformError::WindowCreation(format!(
            "RegisterClassExW failed: {}",
            windows::core::Error::from_win32()
        )));
    }
    Ok(())
}

pub(crate) fn window_style(flags: WindowFlags) -> WINDOW_STYLE {
    let mut style = WS_CLIPSIBLINGS | WS_CLIPCHILDREN;
    if flags.contains(WindowFlags::FULLSCREEN) {
        style |= WS_POPUP;
    } else if flags.contains(WindowFlags::DECORATED) {
        style |= WS_OVERLAPPED | WS_CAPTION | WS_SYSMENU | WS_MINIMIZEBOX;
        if flags.contains(WindowFlags::RESIZABLE) {
            style |= WS_MAXIMIZEBOX | WS_THICKFRAME;
        }
    } else {
        // edges and caption come from the WM_NCHITTEST handler
        style |= WS_POPUP | WS_SYSMENU | WS_MINIMIZEBOX | WS_MAXIMIZEBOX;
    }
    style
}

/// Outer rectangle for a client rectangle under the window's current style.
pub(crate) unsafe fn client_to_outer(hwnd: HWND, origin: Point, size: Point) -> RECT {
    let mut rect = RECT {
        left: origin.x,
        top: origin.y,
        right: origin.x + size.x,
        bottom: origin.y + size.y,
    };
    let style = WINDOW_STYLE(GetWindowLongW(hwnd, GWL_STYLE) as u32);
    let ex_style = WINDOW_EX_STYLE(GetWindowLongW(hwnd, GWL_EXSTYLE) as u32);
    if let Err(err) = AdjustWindowRectEx(&mut rect, style, false, ex_style) {
        warn!("AdjustWindowRectEx failed: {err}");
    }
    rect
}

unsafe fn metrics_point(x: SYSTEM_METRICS_INDEX, y: SYSTEM_METRICS_INDEX) -> Point {
    Point::new(GetSystemMetrics(x), GetSystemMetrics(y))
}

pub(crate) unsafe fn create_window_hwnd(
    slot: &WindowSlot,
    hinstance: HINSTANCE,
    title: &str,
    flags: WindowFlags,
    position: Option<Point>,
    size: Point,
) -> Result<HWND> {
    let style = window_style(flags);
    let mut rect = RECT {
        left: 0,
        top: 0,
        right: size.x,
        bottom: size.y,
    };
    let _ = AdjustWindowRectEx(&mut rect, style, false, WS_EX_APPWINDOW);
    let (x, y) = match position {
        Some(pos) => (pos.x + rect.left, pos.y + rect.top),
        None => (CW_USEDEFAULT, CW_USEDEFAULT),
    };
    let hwnd = CreateWindowExW(
        WS_EX_APPWINDOW,
        WINDOW_CLASS_NAME,
        &HSTRING::from(title),
        style,
        x,
        y,
        rect.right - rect.left,
        rect.bottom - rect.top,
        None,
        None,
        hinstance,
        Some(slot as *const WindowSlot as *const c_void),
    )
    .map_err(|err| PlatformError::WindowCreation(err.to_string()))?;
    Ok(hwnd)
}

/// The pointer to the slot is stored during `WM_NCCREATE` and cleared on
/// `WM_NCDESTROY`; messages outside that window go to `DefWindowProcW`.
pub unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    if msg == WM_NCCREATE {
        let create = &*(lparam.0 as *const CREATESTRUCTW);
        let slot = create.lpCreateParams as *const WindowSlot;
        if !slot.is_null() {
            (*slot).hwnd_value.set(hwnd.0 as isize);
        }
        SetWindowLongPtrW(hwnd, GWLP_USERDATA, slot as isize);
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }
    if msg == WM_NCDESTROY {
        SetWindowLongPtrW(hwnd, GWLP_USERDATA, 0);
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }

    let slot_ptr = GetWindowLongPtrW(hwnd, GWLP_USERDATA) as *const WindowSlot;
    if slot_ptr.is_null() {
        return DefWindowProcW(hwnd, msg, wparam, lparam);
    }
    let slot = &*slot_ptr;

    let reply = match slot.window.try_borrow_mut() {
        Ok(mut window) => {
            let mut host = NativeHost {
                hwnd,
                arrow_value: slot.arrow_value,
            };
            let message = Message::new(msg, wparam.0, lparam.0, GetMessageTime() as u32);
            handle_message(&mut host, &mut window, &slot.registry, message)
        }
        Err(_) => {
            trace!(msg, window = ?slot.id, "message while window state is borrowed");
            Reply::Default
        }
    };
    match reply {
        Reply::Default => DefWindowProcW(hwnd, msg, wparam, lparam),
        Reply::Value(value) => LRESULT(value),
    }
}

pub(crate) struct NativeHost {
    pub hwnd: HWND,
    pub arrow_value: isize,
}

impl Win32Host for NativeHost {
    fn key_down(&self, vk: u16) -> bool {
        unsafe { GetKeyState(vk as i32) as u16 & 0x8000 != 0 }
    }

    fn key_toggled(&self, vk: u16) -> bool {
        unsafe { GetKeyState(vk as i32) & 1 != 0 }
    }

    fn peek_next_message(&self) -> Option<Message> {
        let mut next = MSG::default();
        unsafe {
            PeekMessageW(&mut next, HWND(std::ptr::null_mut()), 0, 0, PM_NOREMOVE)
                .as_bool()
                .then(|| Message::new(next.message, next.wParam.0, next.lParam.0, next.time))
        }
    }

    fn map_vk_to_scancode(&self, vk: u16) -> u32 {
        unsafe { MapVirtualKeyW(vk as u32, MAPVK_VK_TO_VSC) }
    }

    fn adjust_for_frame(&self, client: Point) -> Point {
        let rect = unsafe { client_to_outer(self.hwnd, Point::ZERO, client) };
        Point::new(rect.right - rect.left, rect.bottom - rect.top)
    }

    fn apply_min_track_size(&mut self, lparam: isize, size: Point) {
        let info = unsafe { &mut *(lparam as *mut MINMAXINFO) };
        info.ptMinTrackSize = POINT { x: size.x, y: size.y };
    }

    fn screen_to_client(&self, pos: Point) -> Point {
        let mut point = POINT { x: pos.x, y: pos.y };
        unsafe {
            let _ = ScreenToClient(self.hwnd, &mut point);
        }
        Point::new(point.x, point.y)
    }

    fn set_capture(&mut self, capture: bool) {
        unsafe {
            if capture {
                SetCapture(self.hwnd);
            } else if let Err(err) = ReleaseCapture() {
                trace!("ReleaseCapture failed: {err}");
            }
        }
    }

    fn track_mouse_leave(&mut self) {
        let mut tme = TRACKMOUSEEVENT {
            cbSize: size_of::<TRACKMOUSEEVENT>() as u32,
            dwFlags: TME_LEAVE,
            hwndTrack: self.hwnd,
            dwHoverTime: 0,
        };
        if let Err(err) = unsafe { TrackMouseEvent(&mut tme) } {
            warn!("TrackMouseEvent failed: {err}");
        }
    }

    fn register_raw_input(&mut self) {
        let device = RAWINPUTDEVICE {
            usUsagePage: 0x01,
            usUsage: 0x02,
            dwFlags: RAWINPUTDEVICE_FLAGS(0),
            hwndTarget: self.hwnd,
        };
        let device_size = size_of::<RAWINPUTDEVICE>() as u32;
        if let Err(err) = unsafe { RegisterRawInputDevices(&[device], device_size) } {
            warn!("raw mouse input unavailable: {err}");
        }
    }

    fn read_raw_motion(&mut self, lparam: isize) -> Option<RawMotion> {
        let handle = HRAWINPUT(lparam as *mut c_void);
        let header_size = size_of::<RAWINPUTHEADER>() as u32;
        let mut size = 0u32;
        unsafe {
            GetRawInputData(handle, RID_INPUT, None, &mut size, header_size);
            // u64 storage keeps RAWINPUT aligned
            let mut buffer = vec![0u64; (size as usize).div_ceil(8).max(1)];
            let read = GetRawInputData(
                handle,
                RID_INPUT,
                Some(buffer.as_mut_ptr() as *mut c_void),
                &mut size,
                header_size,
            );
            if read == u32::MAX || (read as usize) < size_of::<RAWINPUTHEADER>() {
                return None;
            }
            let raw = &*(buffer.as_ptr() as *const RAWINPUT);
            if raw.header.dwType != RIM_TYPEMOUSE.0 {
                return None;
            }
            let mouse = raw.data.mouse;
            let last = Point::new(mouse.lLastX, mouse.lLastY);
            if mouse.usFlags.0 & MOUSE_MOVE_ABSOLUTE_FLAG != 0 {
                let (origin, extent) = if mouse.usFlags.0 & MOUSE_VIRTUAL_DESKTOP_FLAG != 0 {
                    (
                        metrics_point(SM_XVIRTUALSCREEN, SM_YVIRTUALSCREEN),
                        metrics_point(SM_CXVIRTUALSCREEN, SM_CYVIRTUALSCREEN),
                    )
                } else {
                    (Point::ZERO, metrics_point(SM_CXSCREEN, SM_CYSCREEN))
                };

                let pos = origin + (last.as_vec2() / 65535.0 * extent.as_vec2()).as_ivec2();
                Some(RawMotion::Absolute(pos))
            } else {
                Some(RawMotion::Relative(last))
            }
        }
    }

    fn apply_cursor(&mut self, cursor: CursorRequest) {
        let handle = match cursor {
            CursorRequest::Hidden => HCURSOR(std::ptr::null_mut()),
            CursorRequest::Arrow => HCURSOR(self.arrow_value as *mut c_void),
            CursorRequest::Native(handle) => HCURSOR(handle as usize as *mut c_void),
        };
        unsafe {
            SetCursor(handle);
        }
    }

    fn apply_suggested_rect(&mut self, lparam: isize) {
        let rect = unsafe { *(lparam as *const RECT) };
        let result = unsafe {
            SetWindowPos(
                self.hwnd,
                HWND(std::ptr::null_mut()),
                rect.left,
                rect.top,
                rect.right - rect.left,
                rect.bottom - rect.top,
                SWP_NOACTIVATE | SWP_NOZORDER,
            )
        };
        if let Err(err) = result {
            warn!("failed to apply the DPI-suggested rect: {err}");
        }
    }
}

const MOUSE_MOVE_ABSOLUTE_FLAG: u16 = 0x01;
const MOUSE_VIRTUAL_DESKTOP_FLAG: u16 = 0x02;
