//! Wayland listener callbacks to canonical events.
//!
//! Dispatch handlers resolve the target window and decode protocol enums
//! into a [`Notification`]; the translation below is protocol-free.

use awin_core::{EventDispatchRegistry, Key, Mods, MouseButton, Point, PointF, WindowState};

use crate::configure::{self, Configure};

pub const BTN_LEFT: u32 = 0x110;
pub const BTN_RIGHT: u32 = 0x111;
const BTN_MIDDLE: u32 = 0x112;
const BTN_SIDE: u32 = 0x113;
const BTN_EXTRA: u32 = 0x114;
const BTN_FORWARD: u32 = 0x115;

/// Axis units per wheel detent.
const AXIS_STEP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Notification {
    PointerEnter { pos: PointF },
    PointerLeave,
    PointerMotion { pos: PointF },
    Button { code: u32, pressed: bool },
    Axis { horizontal: bool, value: f64 },
    KeyboardEnter { mods: Mods },
    KeyboardLeave { mods: Mods },
    /// `codepoint` is the composed text of a press, if any.
    Key { key: Key, pressed: bool, mods: Mods, codepoint: Option<u32> },
    RelativeMotion { delta: PointF },
    Configure(Configure),
    Close,
    Scale(f32),
}

/// Per-window bookkeeping only the Wayland translator reads.
#[derive(Debug, Default)]
pub struct WaylandInput {
    raw_residual: PointF,
}

pub fn mouse_button(code: u32) -> MouseButton {
    match code {
        BTN_LEFT => MouseButton::Left,
        BTN_RIGHT => MouseButton::Right,
        BTN_MIDDLE => MouseButton::Middle,
        BTN_SIDE => MouseButton::X1,
        BTN_EXTRA => MouseButton::X2,
        n => MouseButton::Other(n.saturating_sub(BTN_FORWARD).min(u32::from(u8::MAX)) as u8),
    }
}

/// Returns the size the surface should now be drawn at after a configure.
pub fn handle_notification(
    state: &mut WindowState,
    input: &mut WaylandInput,
    registry: &EventDispatchRegistry,
    notification: &Notification,
) -> Option<Point> {
    match *notification {
        Notification::PointerEnter { pos } => {
            state.notify_cursor_enter(registry, true);
            state.notify_cursor_pos(registry, pos);
        }
        Notification::PointerLeave => state.notify_cursor_enter(registry, false),
        Notification::PointerMotion { pos } => state.notify_cursor_pos(registry, pos),
        Notification::Button { code, pressed } => {
            state.notify_mouse_button(registry, mouse_button(code), pressed)
        }
        Notification::Axis { horizontal, value } => {
            let steps = (-value / AXIS_STEP) as f32;
            if horizontal {
                state.notify_scroll(registry, steps, 0.0);
            } else {
                state.notify_scroll(registry, 0.0, steps);
            }
        }
        Notification::KeyboardEnter { mods } => state.notify_focus(registry, true, mods),
        Notification::KeyboardLeave { mods } => state.notify_focus(registry, false, mods),
        Notification::Key {
            key,
            pressed,
            mods,
            codepoint,
        } => {
            state.notify_key(registry, key, pressed, mods);
            if let (true, Some(codepoint)) = (pressed, codepoint) {
                state.notify_char(registry, codepoint);
            }
        }
        Notification::RelativeMotion { delta } => {
            let total = input.raw_residual + delta;
            let whole = total.trunc();
            input.raw_residual = total - whole;
            if state.focused {
                state.notify_raw_motion(registry, whole.as_ivec2());
            }
        }
        Notification::Configure(configure) => {
            return Some(configure::apply(state, registry, &configure));
        }
        Notification::Close => state.notify_close_request(),
        Notification::Scale(scale) => {
            state.notify_dpi(registry, PointF::splat(scale));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use approx::assert_relative_eq;
    use awin_core::{Action, Event, WindowConfig, WindowId};

    use super::*;
    use crate::configure::ToplevelStates;

    struct Harness {
        state: WindowState,
        input: WaylandInput,
        registry: EventDispatchRegistry,
        log: Rc<RefCell<Vec<Event>>>,
    }

    impl Harness {
        fn new() -> Self {
            let registry = EventDispatchRegistry::new();
            let log = Rc::new(RefCell::new(Vec::new()));
            let sink = Rc::clone(&log);
            registry.subscribe_all(Rc::new(move |_: WindowId, event: &Event| {
                sink.borrow_mut().push(*event);
            }));
            Self {
                state: WindowState::new(WindowId(7), &WindowConfig::new("Wayland", 800, 600)),
                input: WaylandInput::default(),
                registry,
                log,
            }
        }

        fn feed(&mut self, notification: Notification) -> Option<Point> {
            handle_notification(&mut self.state, &mut self.input, &self.registry, &notification)
        }

        fn take(&self) -> Vec<Event> {
            std::mem::take(&mut *self.log.borrow_mut())
        }
    }

    fn key(key: Key, pressed: bool, codepoint: Option<u32>) -> Notification {
        Notification::Key {
            key,
            pressed,
            mods: Mods::empty(),
            codepoint,
        }
    }

    #[test]
    fn test_press_dispatches_key_then_char() {
        let mut h = Harness::new();
        h.feed(key(Key::A, true, Some('a' as u32)));
        assert_eq!(
            h.take(),
            vec![
                Event::KeyInput {
                    key: Key::A,
                    action: Action::Press,
                    mods: Mods::empty()
                },
                Event::CharInput { codepoint: 'a' as u32 },
            ]
        );
    }

    #[test]
    fn test_repeated_press_reports_repeat_and_text() {
        let mut h = Harness::new();
        h.feed(key(Key::A, true, Some('a' as u32)));
        h.take();
        h.feed(key(Key::A, true, Some('a' as u32)));
        let events = h.take();
        assert!(matches!(
            events[0],
            Event::KeyInput {
                action: Action::Repeat,
                ..
            }
        ));
        assert_eq!(events[1], Event::CharInput { codepoint: 'a' as u32 });
    }

    #[test]
    fn test_release_has_no_text() {
        let mut h = Harness::new();
        h.feed(key(Key::A, true, None));
        h.take();
        h.feed(key(Key::A, false, Some('a' as u32)));
        assert_eq!(h.take().len(), 1);
    }

    #[test]
    fn test_keyboard_leave_releases_held_keys() {
        let mut h = Harness::new();
        h.feed(Notification::KeyboardEnter { mods: Mods::empty() });
        h.feed(key(Key::W, true, None));
        h.take();
        h.feed(Notification::KeyboardLeave { mods: Mods::empty() });
        let events = h.take();
        assert_eq!(events[0], Event::Focus { focused: false });
        assert!(events.contains(&Event::KeyInput {
            key: Key::W,
            action: Action::Release,
            mods: Mods::empty()
        }));
    }

    #[test]
    fn test_wheel_detent_is_one_step() {
        let mut h = Harness::new();
        h.feed(Notification::Axis {
            horizontal: false,
            value: 10.0,
        });
        h.feed(Notification::Axis {
            horizontal: true,
            value: -15.0,
        });
        let events = h.take();
        match events[..] {
            [Event::Scroll { h: h0, v: v0 }, Event::Scroll { h: h1, v: v1 }] => {
                assert_relative_eq!(h0, 0.0);
                assert_relative_eq!(v0, -1.0);
                assert_relative_eq!(h1, 1.5);
                assert_relative_eq!(v1, 0.0);
            }
            _ => panic!("unexpected events {events:?}"),
        }
    }

    #[test]
    fn test_button_codes() {
        assert_eq!(mouse_button(0x110), MouseButton::Left);
        assert_eq!(mouse_button(0x111), MouseButton::Right);
        assert_eq!(mouse_button(0x112), MouseButton::Middle);
        assert_eq!(mouse_button(0x113), MouseButton::X1);
        assert_eq!(mouse_button(0x114), MouseButton::X2);
        assert_eq!(mouse_button(0x116), MouseButton::Other(1));
    }

    #[test]
    fn test_enter_reports_position() {
        let mut h = Harness::new();
        h.feed(Notification::PointerEnter {
            pos: PointF::new(10.5, 20.0),
        });
        let events = h.take();
        assert_eq!(events[0], Event::MouseEnter { entered: true });
        assert_relative_eq!(h.state.cursor_pos.x, 10.5);
    }

    #[test]
    fn test_relative_motion_keeps_fractions() {
        let mut h = Harness::new();
        h.feed(Notification::KeyboardEnter { mods: Mods::empty() });
        h.take();
        h.feed(Notification::RelativeMotion {
            delta: PointF::new(0.6, -0.25),
        });
        h.feed(Notification::RelativeMotion {
            delta: PointF::new(0.6, -0.25),
        });
        // the first half-pixel step is held back
        assert_eq!(h.take(), vec![Event::MouseMove { delta: Point::new(1, 0) }]);
    }

    #[test]
    fn test_configure_returns_draw_size() {
        let mut h = Harness::new();
        let size = h.feed(Notification::Configure(Configure {
            size: Some(Point::new(1024, 768)),
            states: ToplevelStates::default(),
            initial: true,
        }));
        assert_eq!(size, Some(Point::new(1024, 768)));
        assert_eq!(h.take(), vec![Event::Resize { size: Point::new(1024, 768) }]);
        assert!(!h.state.is_hidden());
    }

    #[test]
    fn test_fractional_scale() {
        let mut h = Harness::new();
        h.feed(Notification::Scale(1.25));
        assert_eq!(h.take(), vec![Event::DpiChanged { x: 1.25, y: 1.25 }]);
        h.feed(Notification::Scale(1.25));
        assert!(h.take().is_empty());
    }

    #[test]
    fn test_close() {
        let mut h = Harness::new();
        h.feed(Notification::Close);
        assert!(h.state.ready_to_close);
        assert!(h.take().is_empty());
    }
}
