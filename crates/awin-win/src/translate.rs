//! Window-procedure translation.
//!
//! Decodes one window message at a time into canonical events. Everything
//! that has to ask Windows something goes through [`Win32Host`], which keeps
//! this module free of FFI and lets it run under a fake host in tests.

use awin_core::{
    hit_test, EventDispatchRegistry, HitRegion, Key, Mods, MouseButton, Point, PointF, WindowFlags,
    WindowState, BORDER_WIDTH, CAPTION_HEIGHT,
};
use tracing::trace;

use crate::keymap::scancode_to_key;

pub const WM_NULL: u32 = 0x0000;
pub const WM_MOVE: u32 = 0x0003;
pub const WM_SIZE: u32 = 0x0005;
pub const WM_SETFOCUS: u32 = 0x0007;
pub const WM_KILLFOCUS: u32 = 0x0008;
pub const WM_CLOSE: u32 = 0x0010;
pub const WM_SETCURSOR: u32 = 0x0020;
pub const WM_GETMINMAXINFO: u32 = 0x0024;
pub const WM_NCHITTEST: u32 = 0x0084;
pub const WM_INPUT: u32 = 0x00FF;
pub const WM_KEYDOWN: u32 = 0x0100;
pub const WM_KEYUP: u32 = 0x0101;
pub const WM_CHAR: u32 = 0x0102;
pub const WM_SYSKEYDOWN: u32 = 0x0104;
pub const WM_SYSKEYUP: u32 = 0x0105;
pub const WM_SYSCHAR: u32 = 0x0106;
pub const WM_UNICHAR: u32 = 0x0109;
pub const WM_MOUSEMOVE: u32 = 0x0200;
pub const WM_LBUTTONDOWN: u32 = 0x0201;
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_RBUTTONDOWN: u32 = 0x0204;
pub const WM_RBUTTONUP: u32 = 0x0205;
pub const WM_MBUTTONDOWN: u32 = 0x0207;
pub const WM_MBUTTONUP: u32 = 0x0208;
pub const WM_MOUSEWHEEL: u32 = 0x020A;
pub const WM_XBUTTONDOWN: u32 = 0x020B;
pub const WM_XBUTTONUP: u32 = 0x020C;
pub const WM_MOUSEHWHEEL: u32 = 0x020E;
pub const WM_MOUSELEAVE: u32 = 0x02A3;
pub const WM_DPICHANGED: u32 = 0x02E0;

pub const VK_SHIFT: u16 = 0x10;
pub const VK_CONTROL: u16 = 0x11;
pub const VK_MENU: u16 = 0x12;
pub const VK_CAPITAL: u16 = 0x14;
pub const VK_SNAPSHOT: u16 = 0x2C;
pub const VK_LWIN: u16 = 0x5B;
pub const VK_RWIN: u16 = 0x5C;
pub const VK_NUMLOCK: u16 = 0x90;
pub const VK_LSHIFT: u16 = 0xA0;
pub const VK_RSHIFT: u16 = 0xA1;
pub const VK_PROCESSKEY: u16 = 0xE5;

const KF_EXTENDED: u16 = 0x0100;
const KF_UP: u16 = 0x8000;
const SIZE_RESTORED: usize = 0;
const SIZE_MINIMIZED: usize = 1;
const SIZE_MAXIMIZED: usize = 2;
const UNICODE_NOCHAR: usize = 0xFFFF;
const WHEEL_DELTA: f32 = 120.0;
const XBUTTON1: u16 = 1;
const USER_DEFAULT_DPI: f32 = 96.0;

pub const HTCLIENT: isize = 1;
pub const HTCAPTION: isize = 2;
pub const HTLEFT: isize = 10;
pub const HTRIGHT: isize = 11;
pub const HTTOP: isize = 12;
pub const HTTOPLEFT: isize = 13;
pub const HTTOPRIGHT: isize = 14;
pub const HTBOTTOM: isize = 15;
pub const HTBOTTOMLEFT: isize = 16;
pub const HTBOTTOMRIGHT: isize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    pub msg: u32,
    pub wparam: usize,
    pub lparam: isize,
    /// `GetMessageTime` for the message.
    pub time: u32,
}

impl Message {
    pub fn new(msg: u32, wparam: usize, lparam: isize, time: u32) -> Self {
        Self { msg, wparam, lparam, time }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Forward to `DefWindowProcW`.
    Default,
    Value(isize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawMotion {
    Relative(Point),
    /// Remote desktop and tablets report absolute virtual-desktop positions.
    Absolute(Point),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorRequest {
    Hidden,
    Arrow,
    Native(u64),
}

/// What the translator needs from Windows while handling a message.
pub trait Win32Host {
    /// High bit of `GetKeyState`.
    fn key_down(&self, vk: u16) -> bool;
    /// Low bit of `GetKeyState`.
    fn key_toggled(&self, vk: u16) -> bool;
    /// Next queued message, left in the queue.
    fn peek_next_message(&self) -> Option<Message>;
    fn map_vk_to_scancode(&self, vk: u16) -> u32;
    /// Outer window size for a client size under the current style.
    fn adjust_for_frame(&self, client: Point) -> Point;
    /// Writes `ptMinTrackSize` of the `MINMAXINFO` behind `lparam`.
    fn apply_min_track_size(&mut self, lparam: isize, size: Point);
    fn screen_to_client(&self, pos: Point) -> Point;
    fn set_capture(&mut self, capture: bool);
    fn track_mouse_leave(&mut self);
    fn register_raw_input(&mut self);
    fn read_raw_motion(&mut self, lparam: isize) -> Option<RawMotion>;
    fn apply_cursor(&mut self, cursor: CursorRequest);
    /// Moves the window to the `RECT` suggested by `WM_DPICHANGED`.
    fn apply_suggested_rect(&mut self, lparam: isize);
}

/// Per-window bookkeeping that only the Win32 translator reads.
#[derive(Debug, Default, Clone)]
pub struct InputTracking {
    high_surrogate: u16,
    cursor_tracked: bool,
    last_raw: Option<Point>,
}

/// Canonical state plus the Win32 payload.
#[derive(Debug, Clone)]
pub struct Win32Window {
    pub state: WindowState,
    pub input: InputTracking,
}

impl Win32Window {
    pub fn new(state: WindowState) -> Self {
        Self {
            state,
            input: InputTracking::default(),
        }
    }
}

fn loword(value: usize) -> u16 {
    (value & 0xFFFF) as u16
}

fn hiword(value: usize) -> u16 {
    ((value >> 16) & 0xFFFF) as u16
}

fn signed_point(lparam: isize) -> Point {
    let value = lparam as usize;
    Point::new(loword(value) as i16 as i32, hiword(value) as i16 as i32)
}

fn is_key_message(msg: u32) -> bool {
    matches!(msg, WM_KEYDOWN | WM_SYSKEYDOWN | WM_KEYUP | WM_SYSKEYUP)
}

/// Modifier state read fresh from the OS.
pub fn key_mods(host: &dyn Win32Host) -> Mods {
    let mut mods = Mods::empty();
    mods.set(Mods::SHIFT, host.key_down(VK_SHIFT));
    mods.set(Mods::CONTROL, host.key_down(VK_CONTROL));
    mods.set(Mods::ALT, host.key_down(VK_MENU));
    mods.set(Mods::SUPER, host.key_down(VK_LWIN) || host.key_down(VK_RWIN));
    mods.set(Mods::CAPS_LOCK, host.key_toggled(VK_CAPITAL));
    mods.set(Mods::NUM_LOCK, host.key_toggled(VK_NUMLOCK));
    mods
}

pub fn hit_code(region: HitRegion) -> isize {
    match region {
        HitRegion::None => HTCLIENT,
        HitRegion::Caption => HTCAPTION,
        HitRegion::Top => HTTOP,
        HitRegion::Bottom => HTBOTTOM,
        HitRegion::Left => HTLEFT,
        HitRegion::Right => HTRIGHT,
        HitRegion::TopLeft => HTTOPLEFT,
        HitRegion::TopRight => HTTOPRIGHT,
        HitRegion::BottomLeft => HTBOTTOMLEFT,
        HitRegion::BottomRight => HTBOTTOMRIGHT,
    }
}

pub fn handle_message(
    host: &mut dyn Win32Host,
    window: &mut Win32Window,
    registry: &EventDispatchRegistry,
    message: Message,
) -> Reply {
    let Message { msg, wparam, lparam, .. } = message;
    let state = &mut window.state;
    match msg {
        WM_SETFOCUS => {
            state.notify_focus(registry, true, key_mods(host));
            host.register_raw_input();
            Reply::Value(0)
        }
        WM_KILLFOCUS => {
            state.notify_focus(registry, false, key_mods(host));
            Reply::Value(0)
        }
        WM_KEYDOWN | WM_SYSKEYDOWN | WM_KEYUP | WM_SYSKEYUP => {
            handle_key(host, state, registry, message);
            Reply::Default
        }
        WM_CHAR | WM_SYSCHAR => {
            let unit = wparam as u16;
            if (0xD800..=0xDBFF).contains(&unit) {
                window.input.high_surrogate = unit;
            } else {
                let high = std::mem::take(&mut window.input.high_surrogate);
                let codepoint = if (0xDC00..=0xDFFF).contains(&unit) {
                    (high != 0)
                        .then(|| 0x10000 + ((high as u32 - 0xD800) << 10) + (unit as u32 - 0xDC00))
                } else {
                    Some(unit as u32)
                };
                if let Some(codepoint) = codepoint {
                    state.notify_char(registry, codepoint);
                }
            }
            Reply::Value(0)
        }
        WM_UNICHAR => {
            if wparam == UNICODE_NOCHAR {
                // advertises WM_UNICHAR support
                return Reply::Value(1);
            }
            state.notify_char(registry, wparam as u32);
            Reply::Value(0)
        }
        WM_LBUTTONDOWN | WM_RBUTTONDOWN | WM_MBUTTONDOWN | WM_XBUTTONDOWN | WM_LBUTTONUP
        | WM_RBUTTONUP | WM_MBUTTONUP | WM_XBUTTONUP => {
            let button = match msg {
                WM_LBUTTONDOWN | WM_LBUTTONUP => MouseButton::Left,
                WM_RBUTTONDOWN | WM_RBUTTONUP => MouseButton::Right,
                WM_MBUTTONDOWN | WM_MBUTTONUP => MouseButton::Middle,
                _ if hiword(wparam) == XBUTTON1 => MouseButton::X1,
                _ => MouseButton::X2,
            };
            let pressed = matches!(
                msg,
                WM_LBUTTONDOWN | WM_RBUTTONDOWN | WM_MBUTTONDOWN | WM_XBUTTONDOWN
            );
            if pressed && !state.any_button_down() {
                host.set_capture(true);
            }
            state.notify_mouse_button(registry, button, pressed);
            if !pressed && !state.any_button_down() {
                host.set_capture(false);
            }
            if matches!(msg, WM_XBUTTONDOWN | WM_XBUTTONUP) {
                Reply::Value(1)
            } else {
                Reply::Value(0)
            }
        }
        WM_MOUSEMOVE => {
            if !window.input.cursor_tracked {
                host.track_mouse_leave();
                window.input.cursor_tracked = true;
                state.notify_cursor_enter(registry, true);
            }
            state.notify_cursor_pos(registry, signed_point(lparam).as_vec2());
            Reply::Value(0)
        }
        WM_MOUSELEAVE => {
            window.input.cursor_tracked = false;
            state.notify_cursor_enter(registry, false);
            Reply::Value(0)
        }
        WM_INPUT => {
            match host.read_raw_motion(lparam) {
                Some(RawMotion::Relative(delta)) => state.notify_raw_motion(registry, delta),
                Some(RawMotion::Absolute(pos)) => {
                    if let Some(last) = window.input.last_raw.replace(pos) {
                        state.notify_raw_motion(registry, pos - last);
                    }
                }
                None => {}
            }
            Reply::Default
        }
        WM_MOUSEWHEEL => {
            let v = hiword(wparam) as i16 as f32 / WHEEL_DELTA;
            state.notify_scroll(registry, 0.0, v);
            Reply::Value(0)
        }
        WM_MOUSEHWHEEL => {
            let h = -(hiword(wparam) as i16 as f32) / WHEEL_DELTA;
            state.notify_scroll(registry, h, 0.0);
            Reply::Value(0)
        }
        WM_SIZE => {
            let size = Point::new(loword(lparam as usize) as i32, hiword(lparam as usize) as i32);
            let minimized = wparam == SIZE_MINIMIZED;
            let maximized =
                wparam == SIZE_MAXIMIZED || (state.is_maximized() && wparam != SIZE_RESTORED);
            state.notify_minimize(registry, minimized);
            state.notify_maximize(registry, maximized);
            if !minimized {
                state.notify_resize(registry, size);
            }
            Reply::Value(0)
        }
        WM_MOVE => {
            state.notify_move(registry, signed_point(lparam));
            Reply::Value(0)
        }
        WM_GETMINMAXINFO => {
            if state.resize_limit == Point::ZERO || state.is_fullscreen() {
                return Reply::Default;
            }
            let outer = host.adjust_for_frame(state.resize_limit);
            host.apply_min_track_size(lparam, outer);
            Reply::Value(0)
        }
        WM_NCHITTEST => {
            if state.flags.contains(WindowFlags::DECORATED) || state.is_fullscreen() {
                return Reply::Default;
            }
            let pos = host.screen_to_client(signed_point(lparam));
            let border = if state.flags.contains(WindowFlags::RESIZABLE) && !state.is_maximized() {
                BORDER_WIDTH
            } else {
                0
            };
            let region = hit_test(pos, state.dimensions, border, CAPTION_HEIGHT);
            Reply::Value(hit_code(region))
        }
        WM_SETCURSOR => {
            if loword(lparam as usize) as isize != HTCLIENT {
                return Reply::Default;
            }
            let request = if state.cursor_hidden {
                CursorRequest::Hidden
            } else {
                state
                    .cursor
                    .upgrade()
                    .filter(|cursor| cursor.valid())
                    .map_or(CursorRequest::Arrow, |cursor| CursorRequest::Native(cursor.handle()))
            };
            host.apply_cursor(request);
            Reply::Value(1)
        }
        WM_DPICHANGED => {
            let dpi = PointF::new(loword(wparam) as f32, hiword(wparam) as f32);
            let scale = dpi / USER_DEFAULT_DPI;
            host.apply_suggested_rect(lparam);
            state.notify_dpi(registry, scale);
            Reply::Value(0)
        }
        WM_CLOSE => {
            state.notify_close_request();
            Reply::Value(0)
        }
        _ => Reply::Default,
    }
}

fn handle_key(
    host: &mut dyn Win32Host,
    state: &mut WindowState,
    registry: &EventDispatchRegistry,
    message: Message,
){
    let vk = message.wparam as u16;
    let flags = hiword(message.lparam as usize);
    let released = flags & KF_UP != 0;

    let mut scancode = (flags & (KF_EXTENDED | 0xFF)) as u32;
    if scancode == 0 {
        // synthetic messages carry no scancode
        scancode = host.map_vk_to_scancode(vk);
    }
    scancode = match scancode {
        // Alt+PrtSc
        0x054 => 0x137,
        // Ctrl+Pause
        0x146 => 0x045,
        // IME sets the extended bit on right shift
        0x136 => 0x036,
        other => other,
    };
    let mut key = scancode_to_key(scancode);

    if vk == VK_CONTROL {
        if flags & KF_EXTENDED != 0 {
            key = Key::RightControl;
        } else {
            // AltGr arrives as Left Ctrl then Right Alt with the same time;
            // only the Right Alt is reported.
            if let Some(next) = host.peek_next_message() {
                if is_key_message(next.msg)
                    && next.wparam as u16 == VK_MENU
                    && hiword(next.lparam as usize) & KF_EXTENDED != 0
                    && next.time == message.time
                {
                    trace!("dropping left control of an AltGr sequence");
                    return;
                }
            }
            key = Key::LeftControl;
        }
    } else if vk == VK_PROCESSKEY {
        return;
    }

    let mods = key_mods(host);
    if released && vk == VK_SHIFT {
        // one WM_KEYUP is all Windows sends when both shifts were held
        state.notify_key_release_forced(registry, Key::LeftShift, mods);
        state.notify_key_release_forced(registry, Key::RightShift, mods);
    } else if vk == VK_SNAPSHOT {
        // Print Screen only reports key-up
        state.notify_key(registry, key, true, mods);
        state.notify_key(registry, key, false, mods);
    } else {
        state.notify_key(registry, key, !released, mods);
    }
}

/// Releases modifier keys Windows forgot to report (shift when both were
/// held, the Windows keys when the shell ate the key-up).
pub fn release_stuck_keys(
    host: &dyn Win32Host,
    state: &mut WindowState,
    registry: &EventDispatchRegistry,
){
    const WATCHED: [(u16, Key); 4] = [
        (VK_LSHIFT, Key::LeftShift),
        (VK_RSHIFT, Key::RightShift),
        (VK_LWIN, Key::LeftSuper),
        (VK_RWIN, Key::RightSuper),
    ];
    let mods = key_mods(host);
    for (vk, key) in WATCHED {
        if !host.key_down(vk) && state.key_state(key) != awin_core::Action::Release {
            state.notify_key(registry, key, false, mods);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use awin_core::{Action, Event, EventKind, WindowConfig, WindowId};
    use std::cell::RefCell;
    use std::collections::{HashSet, VecDeque};
    use std::rc::Rc;

    const FRAME: Point = Point::new(16, 39);

    #[derive(Default)]
    struct FakeHost {
        down: HashSet<u16>,
        toggled: HashSet<u16>,
        queue: VecDeque<Message>,
        min_track: Option<Point>,
        captured: bool,
        tracking: bool,
        raw: VecDeque<RawMotion>,
        cursor: Option<CursorRequest>,
        origin: Point,
    }

    impl Win32Host for FakeHost {
        fn key_down(&self, vk: u16) -> bool {
            self.down.contains(&vk)
        }

        fn key_toggled(&self, vk: u16) -> bool {
            self.toggled.contains(&vk)
        }

        fn peek_next_message(&self) -> Option<Message> {
            self.queue.front().copied()
        }

        fn map_vk_to_scancode(&self, vk: u16) -> u32 {
            match vk {
                VK_SNAPSHOT => 0x137,
                _ => 0,
            }
        }

        fn adjust_for_frame(&self, client: Point) -> Point {
            client + FRAME
        }

        fn apply_min_track_size(&mut self, _lparam: isize, size: Point) {
            self.min_track = Some(size);
        }

        fn screen_to_client(&self, pos: Point) -> Point {
            pos - self.origin
        }

        fn set_capture(&mut self, capture: bool) {
            self.captured = capture;
        }

        fn track_mouse_leave(&mut self) {
            self.tracking = true;
        }

        fn register_raw_input(&mut self) {}

        fn read_raw_motion(&mut self, _lparam: isize) -> Option<RawMotion> {
            self.raw.pop_front()
        }

        fn apply_cursor(&mut self, cursor: CursorRequest) {
            self.cursor = Some(cursor);
        }

        fn apply_suggested_rect(&mut self, _lparam: isize) {}
    }

    struct Harness {
        host: FakeHost,
        window: Win32Window,
        registry: EventDispatchRegistry,
        log: Rc<RefCell<Vec<Event>>>,
    }

    impl Harness {
        fn new(config: WindowConfig) -> Self {
            let registry = EventDispatchRegistry::new();
            let log = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&log);
            registry.subscribe_all(Rc::new(move |_: WindowId, event: &Event| {
                sink.borrow_mut().push(*event);
            }));
            Self {
                host: FakeHost::default(),
                window: Win32Window::new(WindowState::new(WindowId(1), &config)),
                registry,
                log,
            }
        }

        fn send(&mut self, msg: u32, wparam: usize, lparam: isize) -> Reply {
            self.send_at(msg, wparam, lparam, 0)
        }

        fn send_at(&mut self, msg: u32, wparam: usize, lparam: isize, time: u32) -> Reply {
            handle_message(
                &mut self.host,
                &mut self.window,
                &self.registry,
                Message::new(msg, wparam, lparam, time),
            )
        }

        fn events(&self) -> Vec<Event> {
            self.log.borrow().clone()
        }
    }

    fn key_lparam(scancode: u16, up: bool) -> isize {
        let mut flags = scancode & 0x1FF;
        if up {
            flags |= KF_UP;
        }
        ((flags as usize) << 16) as isize
    }

    fn size_lparam(w: i32, h: i32) -> isize {
        ((h as usize) << 16 | (w as usize & 0xFFFF)) as isize
    }

    fn key_events(events: &[Event]) -> Vec<(Key, Action)> {
        events
            .iter()
            .filter_map(|e| match e {
                Event::KeyInput { key, action, .. } => Some((*key, *action)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_shift_up_releases_both_shifts() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_KEYDOWN, VK_SHIFT as usize, key_lparam(0x02A, false));
        h.send(WM_KEYDOWN, VK_SHIFT as usize, key_lparam(0x036, false));
        h.log.borrow_mut().clear();

        h.send(WM_KEYUP, VK_SHIFT as usize, key_lparam(0x02A, true));
        assert_eq!(
            key_events(&h.events()),
            vec![(Key::LeftShift, Action::Release), (Key::RightShift, Action::Release)]
        );
    }

    #[test]
    fn test_shift_up_with_one_shift_held_still_reports_two() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_KEYDOWN, VK_SHIFT as usize, key_lparam(0x02A, false));
        h.log.borrow_mut().clear();
        h.send(WM_KEYUP, VK_SHIFT as usize, key_lparam(0x02A, true));
        assert_eq!(key_events(&h.events()).len(), 2);
        assert_eq!(h.window.state.key_state(Key::RightShift), Action::Release);
    }

    #[test]
    fn test_altgr_drops_left_control() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.host
            .queue
            .push_back(Message::new(WM_KEYDOWN, VK_MENU as usize, key_lparam(0x138, false), 500));
        h.send_at(WM_KEYDOWN, VK_CONTROL as usize, key_lparam(0x01D, false), 500);
        assert!(h.events().is_empty());

        let next = h.host.queue.pop_front().unwrap();
        h.send_at(next.msg, next.wparam, next.lparam, next.time);
        assert_eq!(key_events(&h.events()), vec![(Key::RightAlt, Action::Press)]);
    }

    #[test]
    fn test_plain_left_control_is_reported() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.host
            .queue
            .push_back(Message::new(WM_KEYDOWN, VK_MENU as usize, key_lparam(0x138, false), 900));
        h.send_at(WM_KEYDOWN, VK_CONTROL as usize, key_lparam(0x01D, false), 500);
        assert_eq!(key_events(&h.events()), vec![(Key::LeftControl, Action::Press)]);
    }

    #[test]
    fn test_print_screen_synthesizes_press_and_release() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_KEYUP, VK_SNAPSHOT as usize, key_lparam(0, true));
        assert_eq!(
            key_events(&h.events()),
            vec![(Key::PrintScreen, Action::Press), (Key::PrintScreen, Action::Release)]
        );
    }

    #[test]
    fn test_autorepeat_keydown_reports_repeat() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.host.down.insert(VK_SHIFT);
        h.send(WM_KEYDOWN, 0x41, key_lparam(0x01E, false));
        h.send(WM_KEYDOWN, 0x41, key_lparam(0x01E, false));
        h.send(WM_KEYUP, 0x41, key_lparam(0x01E, true));
        h.send(WM_KEYUP, 0x41, key_lparam(0x01E, true));
        assert_eq!(
            key_events(&h.events()),
            vec![(Key::A, Action::Press), (Key::A, Action::Repeat), (Key::A, Action::Release)]
        );
        assert!(matches!(h.events()[0], Event::KeyInput { mods, .. } if mods == Mods::SHIFT));
    }

    #[test]
    fn test_size_dispatch_order() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_SIZE, SIZE_MAXIMIZED, size_lparam(1920, 1040));
        let kinds: Vec<EventKind> = h.events().iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::Maximize, EventKind::Resize]);

        h.log.borrow_mut().clear();
        h.send(WM_SIZE, SIZE_MINIMIZED, size_lparam(0, 0));
        assert_eq!(h.events(), vec![Event::Minimize { state: true }]);
        assert!(h.window.state.is_maximized());

        h.log.borrow_mut().clear();
        h.send(WM_SIZE, SIZE_RESTORED, size_lparam(640, 480));
        let kinds: Vec<EventKind> = h.events().iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::Minimize, EventKind::Maximize, EventKind::Resize]);
    }

    #[test]
    fn test_resize_limit_end_to_end() {
        let config = WindowConfig::new("Test Window", 640, 480).with_resize_limit(500, 400);
        let mut h = Harness::new(config);
        assert_eq!(h.window.state.dimensions, Point::new(640, 480));

        // The OS asks for the track limits, then clamps the 300x300 request.
        let requested = Point::new(300, 300) + FRAME;
        assert_eq!(h.send(WM_GETMINMAXINFO, 0, 0), Reply::Value(0));
        let min_track = h.host.min_track.unwrap();
        let confirmed = requested.max(min_track) - FRAME;
        h.send(WM_SIZE, SIZE_RESTORED, size_lparam(confirmed.x, confirmed.y));
        h.send(WM_SIZE, SIZE_RESTORED, size_lparam(confirmed.x, confirmed.y));

        assert_eq!(h.events(), vec![Event::Resize { size: Point::new(500, 400) }]);
        assert!(h.window.state.dimensions.cmpge(Point::new(500, 400)).all());
    }

    #[test]
    fn test_char_surrogate_pair() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_CHAR, 0xD83D, 0);
        h.send(WM_CHAR, 0xDE00, 0);
        h.send(WM_CHAR, 0x08, 0);
        assert_eq!(h.events(), vec![Event::CharInput { codepoint: 0x1F600 }]);
    }

    #[test]
    fn test_buttons_capture_and_release() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_LBUTTONDOWN, 0, 0);
        assert!(h.host.captured);
        assert_eq!(h.send(WM_XBUTTONDOWN, 1 << 16, 0), Reply::Value(1));
        h.send(WM_LBUTTONUP, 0, 0);
        assert!(h.host.captured);
        h.send(WM_XBUTTONUP, 1 << 16, 0);
        assert!(!h.host.captured);
        assert_eq!(
            h.events()[1],
            Event::MouseClick {
                button: MouseButton::X1,
                action: Action::Press
            }
        );
    }

    #[test]
    fn test_mouse_enter_move_leave() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_MOUSEMOVE, 0, size_lparam(10, 20));
        h.send(WM_MOUSEMOVE, 0, size_lparam(10, 20));
        h.send(WM_MOUSELEAVE, 0, 0);
        assert!(h.host.tracking);
        assert_eq!(
            h.events(),
            vec![
                Event::MouseEnter { entered: true },
                Event::MouseMoveAbs { pos: Point::new(10, 20) },
                Event::MouseEnter { entered: false },
            ]
        );
    }

    #[test]
    fn test_wheel_directions() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_MOUSEWHEEL, (120usize) << 16, 0);
        h.send(WM_MOUSEHWHEEL, (0xFF88usize) << 16, 0);
        assert_eq!(
            h.events(),
            vec![Event::Scroll { h: 0.0, v: 1.0 }, Event::Scroll { h: 1.0, v: 0.0 }]
        );
    }

    #[test]
    fn test_raw_motion_relative_and_absolute() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.host.raw.push_back(RawMotion::Relative(Point::new(3, -2)));
        h.host.raw.push_back(RawMotion::Absolute(Point::new(100, 100)));
        h.host.raw.push_back(RawMotion::Absolute(Point::new(104, 99)));
        for _ in 0..3 {
            assert_eq!(h.send(WM_INPUT, 0, 0), Reply::Default);
        }
        assert_eq!(
            h.events(),
            vec![
                Event::MouseMove { delta: Point::new(3, -2) },
                Event::MouseMove { delta: Point::new(4, -1) },
            ]
        );
    }

    #[test]
    fn test_hit_test_only_for_undecorated_windows() {
        let mut h = Harness::new(WindowConfig::new("t", 800, 600));
        assert_eq!(h.send(WM_NCHITTEST, 0, size_lparam(402, 4)), Reply::Default);

        let mut config = WindowConfig::new("t", 800, 600);
        config.decorated = false;
        let mut h = Harness::new(config);
        h.host.origin = Point::new(2, 2);
        assert_eq!(h.send(WM_NCHITTEST, 0, size_lparam(4, 4)), Reply::Value(HTTOPLEFT));
        assert_eq!(h.send(WM_NCHITTEST, 0, size_lparam(402, 4)), Reply::Value(HTCAPTION));
        assert_eq!(h.send(WM_NCHITTEST, 0, size_lparam(800, 302)), Reply::Value(HTRIGHT));
        assert_eq!(h.send(WM_NCHITTEST, 0, size_lparam(402, 302)), Reply::Value(HTCLIENT));
    }

    #[test]
    fn test_hidden_cursor_request() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.window.state.cursor_hidden = true;
        assert_eq!(h.send(WM_SETCURSOR, 0, HTCLIENT), Reply::Value(1));
        assert_eq!(h.host.cursor, Some(CursorRequest::Hidden));
        assert_eq!(h.send(WM_SETCURSOR, 0, HTCAPTION), Reply::Default);
    }

    #[test]
    fn test_dpi_changed() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_DPICHANGED, (144usize << 16) | 144, 0);
        assert_eq!(h.events(), vec![Event::DpiChanged { x: 1.5, y: 1.5 }]);
    }

    #[test]
    fn test_close_sets_flag_without_default_processing() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        assert_eq!(h.send(WM_CLOSE, 0, 0), Reply::Value(0));
        assert!(h.window.state.ready_to_close);
    }

    #[test]
    fn test_focus_loss_and_stuck_shift() {
        let mut h = Harness::new(WindowConfig::new("t", 640, 480));
        h.send(WM_SETFOCUS, 0, 0);
        h.send(WM_KEYDOWN, VK_LWIN as usize, key_lparam(0x15B, false));
        h.host.down.clear();
        release_stuck_keys(&h.host, &mut h.window.state, &h.registry);
        assert_eq!(h.window.state.key_state(Key::LeftSuper), Action::Release);

        h.send(WM_KEYDOWN, 0x41, key_lparam(0x01E, false));
        h.log.borrow_mut().clear();
        h.send(WM_KILLFOCUS, 0, 0);
        assert_eq!(h.events()[0], Event::Focus { focused: false });
        assert_eq!(key_events(&h.events()), vec![(Key::A, Action::Release)]);
    }
}
