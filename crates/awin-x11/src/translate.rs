//! X11 notifications to canonical events.
//!
//! The context decodes each `x11rb` event (and any properties it refers to)
//! into a [`Notification`]; everything from there on is protocol-free so it
//! runs under test without a server.

use awin_core::{EventDispatchRegistry, MouseButton, Point, PointF, WindowState};
use tracing::trace;

use crate::keyboard::{is_autorepeat_release, mods_from_state, KeyFilter, KeyStroke, KeyText};
use crate::keymap::KeyboardMap;
use crate::wm_state::{self, WmSnapshot};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Notification {
    /// `window` is the xid the event was reported on.
    Key {
        window: u32,
        keycode: u8,
        pressed: bool,
        time: u32,
        state: u16,
    },
    Button { button: u8, pressed: bool },
    Motion { pos: Point },
    Crossing { entered: bool, pos: Point },
    /// `grab` covers the NotifyGrab/NotifyUngrab modes, which are
    /// keyboard grabs rather than real focus changes.
    Focus { focused: bool, grab: bool, state: u16 },
    /// Client-area size and root-relative position.
    Configure { pos: Point, size: Point },
    WmState(WmSnapshot),
    Mapped(bool),
    RawMotion { delta: PointF },
    Close,
    Scale(f32),
}

impl Notification {
    fn stroke(&self) -> Option<KeyStroke> {
        match *self {
            Notification::Key {
                window,
                keycode,
                pressed,
                time,
                ..
            } => Some(KeyStroke {
                window,
                keycode,
                pressed,
                time,
            }),
            _ => None,
        }
    }
}

/// Per-window bookkeeping only the X11 translator reads.
#[derive(Default)]
pub struct X11Input {
    filter: KeyFilter,
    raw_residual: PointF,
}

/// Canonical state plus the X11 payload.
pub struct X11Window {
    pub state: WindowState,
    pub xid: u32,
    pub input: X11Input,
}

impl X11Window {
    pub fn new(state: WindowState, xid: u32) -> Self {
        Self {
            state,
            xid,
            input: X11Input::default(),
        }
    }
}

/// What the translator needs from the shared keyboard.
pub struct KeyboardInput<'a> {
    pub map: &'a KeyboardMap,
    pub text: &'a mut dyn KeyText,
    /// The server suppresses synthetic releases itself.
    pub detectable_autorepeat: bool,
}

fn scroll_for(button: u8) -> Option<(f32, f32)> {
    match button {
        4 => Some((0.0, 1.0)),
        5 => Some((0.0, -1.0)),
        6 => Some((1.0, 0.0)),
        7 => Some((-1.0, 0.0)),
        _ => None,
    }
}

fn mouse_button(button: u8) -> MouseButton {
    match button {
        1 => MouseButton::Left,
        2 => MouseButton::Middle,
        3 => MouseButton::Right,
        8 => MouseButton::X1,
        9 => MouseButton::X2,
        n => MouseButton::Other(n.saturating_sub(10)),
    }
}

/// `next` is the event queued behind this one, used to recognise autorepeat.
pub fn handle_notification(
    window: &mut X11Window,
    keyboard: &mut KeyboardInput<'_>,
    registry: &EventDispatchRegistry,
    notification: &Notification,
    next: Option<&Notification>,
) {
    let state = &mut window.state;
    match *notification {
        Notification::Key {
            window: xid,
            keycode,
            pressed,
            time,
            state: mask,
        } => {
            let key = keyboard.map.key(keycode);
            let mods = mods_from_state(mask);
            if pressed {
                if !window.input.filter.accept_press(keycode, time) {
                    trace!(keycode, time, "duplicate key press");
                    return;
                }
                state.notify_key(registry, key, true, mods);
                let sym = keyboard.map.lookup(keycode, mask);
                if let Some(codepoint) = keyboard.text.codepoint(sym) {
                    state.notify_char(registry, codepoint);
                }
            } else {
                let stroke = KeyStroke {
                    window: xid,
                    keycode,
                    pressed,
                    time,
                };
                let next = next.and_then(Notification::stroke);
                if !keyboard.detectable_autorepeat && is_autorepeat_release(stroke, next) {
                    return;
                }
                state.notify_key(registry, key, false, mods);
            }
        }
        Notification::Button { button, pressed } => match scroll_for(button) {
            Some((h, v)) => {
                if pressed {
                    state.notify_scroll(registry, h, v);
                }
            }
            None => state.notify_mouse_button(registry, mouse_button(button), pressed),
        },
        Notification::Motion { pos } => {
            state.notify_cursor_pos(registry, pos.as_vec2());
        }
        Notification::Crossing { entered, pos } => {
            state.notify_cursor_enter(registry, entered);
            if entered {
                state.notify_cursor_pos(registry, pos.as_vec2());
            }
        }
        Notification::Focus { focused, grab, state: mask } => {
            if !grab {
                state.notify_focus(registry, focused, mods_from_state(mask));
            }
        }
        Notification::Configure { pos, size } => {
            state.notify_resize(registry, size);
            state.notify_move(registry, pos);
        }
        Notification::WmState(snapshot) => wm_state::reconcile(state, registry, snapshot),
        Notification::Mapped(mapped) => state.notify_visible(mapped),
        Notification::RawMotion { delta } => {
            let total = window.input.raw_residual + delta;
            let whole = total.trunc();
            window.input.raw_residual = total - whole;
            if state.focused {
                state.notify_raw_motion(registry, whole.as_ivec2());
            }
        }
        Notification::Close => state.notify_close_request(),
        Notification::Scale(scale) => {
            state.notify_dpi(registry, PointF::splat(scale));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use approx::assert_relative_eq;
    use awin_core::{Action, Event, Key, Mods, WindowConfig, WindowId};

    use super::*;
    use crate::keyboard::{MASK_CONTROL, MASK_SHIFT};
    use crate::keymap::{keysym_to_codepoint, Keysym, NO_SYMBOL};

    struct Latin;

    impl KeyText for Latin {
        fn codepoint(&mut self, sym: Keysym) -> Option<u32> {
            keysym_to_codepoint(sym)
        }
    }

    struct Harness {
        map: KeyboardMap,
        text: Latin,
        detectable: bool,
        window: X11Window,
        registry: EventDispatchRegistry,
        log: Rc<RefCell<Vec<Event>>>,
    }

    impl Harness {
        fn new() -> Self {
            let mut syms = vec![NO_SYMBOL; 60 * 2];
            syms[(38 - 8) * 2] = 0x61;
            syms[(38 - 8) * 2 + 1] = 0x41;
            syms[(50 - 8) * 2] = 0xffe1;
            let registry = EventDispatchRegistry::new();
            let log = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&log);
            registry.subscribe_all(Rc::new(move |_: WindowId, event: &Event| {
                sink.borrow_mut().push(*event);
            }));
            let config = WindowConfig::new("Test Window", 640, 480);
            Self {
                map: KeyboardMap::new(8, 2, syms),
                text: Latin,
                detectable: false,
                window: X11Window::new(WindowState::new(WindowId(1), &config), XID),
                registry,
                log,
            }
        }

        fn feed(&mut self, notification: Notification, next: Option<Notification>) {
            let mut keyboard = KeyboardInput {
                map: &self.map,
                text: &mut self.text,
                detectable_autorepeat: self.detectable,
            };
            handle_notification(
                &mut self.window,
                &mut keyboard,
                &self.registry,
                &notification,
                next.as_ref(),
            );
        }

        fn events(&self) -> Vec<Event> {
            self.log.borrow().clone()
        }

        fn key_actions(&self) -> Vec<(Key, Action)> {
            self.events()
                .into_iter()
                .filter_map(|event| match event {
                    Event::KeyInput { key, action, .. } => Some((key, action)),
                    _ => None,
                })
                .collect()
        }
    }

    const XID: u32 = 0x20_0001;

    fn key_on(window: u32, keycode: u8, pressed: bool, time: u32) -> Notification {
        Notification::Key {
            window,
            keycode,
            pressed,
            time,
            state: 0,
        }
    }

    fn key(keycode: u8, pressed: bool, time: u32) -> Notification {
        key_on(XID, keycode, pressed, time)
    }

    #[test]
    fn test_press_emits_key_then_char() {
        let mut h = Harness::new();
        let press = Notification::Key {
            window: XID,
            keycode: 38,
            pressed: true,
            time: 10,
            state: MASK_SHIFT,
        };
        h.feed(press, None);
        assert_eq!(
            h.events(),
            vec![
                Event::KeyInput { key: Key::A, action: Action::Press, mods: Mods::SHIFT },
                Event::CharInput { codepoint: 'A' as u32 },
            ]
        );
    }

    #[test]
    fn test_duplicate_press_from_input_method_is_dropped() {
        let mut h = Harness::new();
        h.feed(key(38, true, 10), None);
        h.feed(key(38, true, 10), None);
        assert_eq!(h.key_actions(), vec![(Key::A, Action::Press)]);
        assert_eq!(h.events().len(), 2);
    }

    #[test]
    fn test_synthetic_autorepeat_collapses_to_repeat() {
        let mut h = Harness::new();
        h.feed(key(38, true, 10), None);
        h.feed(key(38, false, 500), Some(key(38, true, 500)));
        h.feed(key(38, true, 500), None);
        h.feed(key(38, false, 700), None);
        assert_eq!(
            h.key_actions(),
            vec![(Key::A, Action::Press), (Key::A, Action::Repeat), (Key::A, Action::Release)]
        );
    }

    #[test]
    fn test_release_before_press_on_other_window_is_kept() {
        let mut h = Harness::new();
        h.feed(key(38, true, 10), None);
        h.feed(key(38, false, 1000), Some(key_on(0x20_0002, 38, true, 1005)));
        assert_eq!(h.key_actions(), vec![(Key::A, Action::Press), (Key::A, Action::Release)]);
        assert_eq!(h.window.state.key_state(Key::A), Action::Release);
    }

    #[test]
    fn test_detectable_autorepeat_trusts_releases() {
        let mut h = Harness::new();
        h.detectable = true;
        h.feed(key(38, true, 10), None);
        h.feed(key(38, false, 500), Some(key(38, true, 500)));
        assert_eq!(h.key_actions(), vec![(Key::A, Action::Press), (Key::A, Action::Release)]);
    }

    #[test]
    fn test_double_release_reports_once() {
        let mut h = Harness::new();
        h.feed(key(50, true, 1), None);
        h.feed(key(50, false, 2), None);
        h.feed(key(50, false, 3), None);
        assert_eq!(
            h.key_actions(),
            vec![(Key::LeftShift, Action::Press), (Key::LeftShift, Action::Release)]
        );
    }

    #[test]
    fn test_buttons_and_wheel() {
        let mut h = Harness::new();
        h.feed(Notification::Button { button: 1, pressed: true }, None);
        h.feed(Notification::Button { button: 4, pressed: true }, None);
        h.feed(Notification::Button { button: 4, pressed: false }, None);
        h.feed(Notification::Button { button: 7, pressed: true }, None);
        h.feed(Notification::Button { button: 9, pressed: true }, None);
        h.feed(Notification::Button { button: 1, pressed: false }, None);
        assert_eq!(
            h.events(),
            vec![
                Event::MouseClick { button: MouseButton::Left, action: Action::Press },
                Event::Scroll { h: 0.0, v: 1.0 },
                Event::Scroll { h: -1.0, v: 0.0 },
                Event::MouseClick { button: MouseButton::X2, action: Action::Press },
                Event::MouseClick { button: MouseButton::Left, action: Action::Release },
            ]
        );
    }

    #[test]
    fn test_configure_is_debounced() {
        let mut h = Harness::new();
        let configure = Notification::Configure {
            pos: Point::new(10, 20),
            size: Point::new(800, 600),
        };
        h.feed(configure, None);
        h.feed(configure, None);
        assert_eq!(
            h.events(),
            vec![
                Event::Resize { size: Point::new(800, 600) },
                Event::Move { pos: Point::new(10, 20) },
            ]
        );
        assert_eq!(h.window.state.dimensions, Point::new(800, 600));
    }

    #[test]
    fn test_grab_focus_changes_are_ignored() {
        let mut h = Harness::new();
        h.feed(Notification::Focus { focused: true, grab: false, state: 0 }, None);
        h.feed(Notification::Focus { focused: false, grab: true, state: 0 }, None);
        assert!(h.window.state.focused);
        assert_eq!(h.events(), vec![Event::Focus { focused: true }]);
    }

    #[test]
    fn test_focus_loss_releases_held_keys() {
        let mut h = Harness::new();
        h.feed(Notification::Focus { focused: true, grab: false, state: 0 }, None);
        let press = Notification::Key {
            window: XID,
            keycode: 50,
            pressed: true,
            time: 5,
            state: MASK_CONTROL,
        };
        h.feed(press, None);
        h.feed(Notification::Focus { focused: false, grab: false, state: 0 }, None);
        assert_eq!(
            h.key_actions(),
            vec![(Key::LeftShift, Action::Press), (Key::LeftShift, Action::Release)]
        );
        assert!(!h.window.state.focused);
    }

    #[test]
    fn test_crossing_reports_enter_and_position() {
        let mut h = Harness::new();
        h.feed(Notification::Crossing { entered: true, pos: Point::new(3, 4) }, None);
        h.feed(Notification::Motion { pos: Point::new(5, 4) }, None);
        h.feed(Notification::Crossing { entered: false, pos: Point::new(-1, 4) }, None);
        assert_eq!(
            h.events(),
            vec![
                Event::MouseEnter { entered: true },
                Event::MouseMoveAbs { pos: Point::new(3, 4) },
                Event::MouseMoveAbs { pos: Point::new(5, 4) },
                Event::MouseEnter { entered: false },
            ]
        );
    }

    #[test]
    fn test_raw_motion_keeps_fractions() {
        let mut h = Harness::new();
        h.window.state.focused = true;
        h.feed(Notification::RawMotion { delta: PointF::new(0.6, -0.4) }, None);
        h.feed(Notification::RawMotion { delta: PointF::new(0.6, -0.8) }, None);
        assert_eq!(h.events(), vec![Event::MouseMove { delta: Point::new(1, -1) }]);
        assert_relative_eq!(h.window.input.raw_residual.x, 0.2, epsilon = 1e-5);
        assert_relative_eq!(h.window.input.raw_residual.y, -0.2, epsilon = 1e-5);
    }

    #[test]
    fn test_wm_state_and_close() {
        let mut h = Harness::new();
        let snapshot = WmSnapshot {
            fullscreen: true,
            maximized: false,
            minimized: false,
        };
        h.feed(Notification::WmState(snapshot), None);
        h.feed(Notification::Close, None);
        assert!(h.window.state.is_fullscreen());
        assert!(h.window.state.ready_to_close);
        assert!(h.events().is_empty());
    }

    #[test]
    fn test_scale_change() {
        let mut h = Harness::new();
        h.feed(Notification::Scale(1.5), None);
        h.feed(Notification::Scale(1.5), None);
        assert_eq!(h.events(), vec![Event::DpiChanged { x: 1.5, y: 1.5 }]);
    }
}
