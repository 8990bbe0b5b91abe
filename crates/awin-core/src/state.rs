//! Canonical per-window state and the transitions every translator uses.
//!
//! Translators decode a native notification and then call the `notify_*`
//! methods below, in the order the sub-conditions were detected. Each method
//! updates the state first and dispatches only when the state changed, which
//! keeps the duplicate-suppression rules identical across backends.

use std::rc::Weak;

use tracing::debug;

use crate::config::WindowConfig;
use crate::cursor::Cursor;
use crate::event::{Event, WindowId};
use crate::flags::{Mods, WindowFlags};
use crate::geometry::{Point, PointF};
use crate::key::{Action, Key, KeyState, KeyStates, MouseButton};
use crate::registry::EventDispatchRegistry;

#[derive(Debug, Clone)]
pub struct WindowState {
    pub id: WindowId,
    pub title: String,
    /// Last confirmed client-area size.
    pub dimensions: Point,
    pub position: Point,
    pub flags: WindowFlags,
    pub focused: bool,
    pub hovered: bool,
    pub cursor_hidden: bool,
    pub ready_to_close: bool,
    pub resize_limit: Point,
    pub cursor_pos: PointF,
    pub content_scale: PointF,
    pub cursor: Weak<Cursor>,
    keys: KeyStates,
    buttons: [bool; MouseButton::TRACKED],
}

impl WindowState {
    pub fn new(id: WindowId, config: &WindowConfig) -> Self {
        Self {
            id,
            title: config.title.clone(),
            dimensions: config.clamped_size(),
            position: config.position.unwrap_or_default(),
            flags: config.initial_flags(),
            focused: false,
            hovered: false,
            cursor_hidden: false,
            ready_to_close: false,
            resize_limit: config.resize_limit,
            cursor_pos: PointF::ZERO,
            content_scale: PointF::ONE,
            cursor: Weak::new(),
            keys: KeyStates::default(),
            buttons: [false; MouseButton::TRACKED],
        }
    }

    pub fn key_state(&self, key: Key) -> KeyState {
        self.keys.get(key)
    }

    pub fn is_fullscreen(&self) -> bool {
        self.flags.contains(WindowFlags::FULLSCREEN)
    }

    pub fn is_maximized(&self) -> bool {
        self.flags.contains(WindowFlags::MAXIMIZED)
    }

    pub fn is_minimized(&self) -> bool {
        self.flags.contains(WindowFlags::MINIMIZED)
    }

    pub fn is_hidden(&self) -> bool {
        self.flags.contains(WindowFlags::HIDDEN)
    }

    /// Size after applying the minimum-size limit.
    pub fn clamp_to_limit(&self, size: Point) -> Point {
        size.max(self.resize_limit)
    }

    pub fn notify_key(
        &mut self,
        registry: &EventDispatchRegistry,
        key: Key,
        pressed: bool,
        mods: Mods,
    ) -> Option<Action> {
        let action = self.keys.transition(key, pressed)?;
        registry.dispatch(self.id, Event::KeyInput { key, action, mods });
        Some(action)
    }

    /// Reports a release even if the key is already recorded as released.
    /// Used when one native notification stands for several logical keys.
    pub fn notify_key_release_forced(
        &mut self,
        registry: &EventDispatchRegistry,
        key: Key,
        mods: Mods,
    ){
        self.keys.force_release(key);
        registry.dispatch(
            self.id,
            Event::KeyInput {
                key,
                action: Action::Release,
                mods,
            },
        );
    }

    pub fn notify_char(&self, registry: &EventDispatchRegistry, codepoint: u32) {
        if is_printable(codepoint) {
            registry.dispatch(self.id, Event::CharInput { codepoint });
        }
    }

    /// Losing focus releases every key and button still held, so nothing
    /// stays stuck while another window owns the keyboard.
    pub fn notify_focus(&mut self, registry: &EventDispatchRegistry, focused: bool, mods: Mods) {
        if self.focused == focused {
            return;
        }
        self.focused = focused;
        registry.dispatch(self.id, Event::Focus { focused });

        if !focused {
            let held: Vec<Key> = self.keys.pressed().collect();
            for key in held {
                self.notify_key(registry, key, false, mods);
            }
            for slot in 0..MouseButton::TRACKED {
                if self.buttons[slot] {
                    self.notify_mouse_button(registry, MouseButton::from_slot(slot), false);
                }
            }
        }
    }

    pub fn notify_mouse_button(
        &mut self,
        registry: &EventDispatchRegistry,
        button: MouseButton,
        pressed: bool,
    ){
        if let Some(slot) = button.slot() {
            if !pressed && !self.buttons[slot] {
                return;
            }
            self.buttons[slot] = pressed;
        }
        let action = if pressed { Action::Press } else { Action::Release };
        registry.dispatch(self.id, Event::MouseClick { button, action });
    }

    pub fn any_button_down(&self) -> bool {
        self.buttons.iter().any(|down| *down)
    }

    pub fn notify_cursor_enter(&mut self, registry: &EventDispatchRegistry, entered: bool) {
        if self.hovered == entered {
            return;
        }
        self.hovered = entered;
        registry.dispatch(self.id, Event::MouseEnter { entered });
    }

    pub fn notify_cursor_pos(&mut self, registry: &EventDispatchRegistry, pos: PointF) {
        if self.cursor_pos == pos {
            return;
        }
        self.cursor_pos = pos;
        registry.dispatch(self.id, Event::MouseMoveAbs { pos: pos.round().as_ivec2() });
    }

    pub fn notify_raw_motion(&self, registry: &EventDispatchRegistry, delta: Point) {
        if delta != Point::ZERO {
            registry.dispatch(self.id, Event::MouseMove { delta });
        }
    }

    pub fn notify_scroll(&self, registry: &EventDispatchRegistry, h: f32, v: f32) {
        if h != 0.0 || v != 0.0 {
            registry.dispatch(self.id, Event::Scroll { h, v });
        }
    }

    /// Records a confirmed size. Identical sizes are swallowed.
    pub fn notify_resize(&mut self, registry: &EventDispatchRegistry, size: Point) -> bool {
        if size == self.dimensions || size.x <= 0 || size.y <= 0 {
            return false;
        }
        debug!(window = ?self.id, from = ?self.dimensions, to = ?size, "confirmed resize");
        self.dimensions = size;
        registry.dispatch(self.id, Event::Resize { size });
        true
    }

    pub fn notify_move(&mut self, registry: &EventDispatchRegistry, pos: Point) -> bool {
        if pos == self.position {
            return false;
        }
        self.position = pos;
        registry.dispatch(self.id, Event::Move { pos });
        true
    }

    pub fn notify_minimize(&mut self, registry: &EventDispatchRegistry, state: bool) -> bool {
        if self.is_minimized() == state {
            return false;
        }
        self.flags.set(WindowFlags::MINIMIZED, state);
        registry.dispatch(self.id, Event::Minimize { state });
        true
    }

    pub fn notify_maximize(&mut self, registry: &EventDispatchRegistry, state: bool) -> bool {
        if self.is_maximized() == state {
            return false;
        }
        self.flags.set(WindowFlags::MAXIMIZED, state);
        registry.dispatch(self.id, Event::Maximize { state });
        true
    }

    pub fn notify_fullscreen(&mut self, state: bool) {
        if self.is_fullscreen() != state {
            debug!(window = ?self.id, state, "fullscreen confirmed");
            self.flags.set(WindowFlags::FULLSCREEN, state);
        }
    }

    pub fn notify_visible(&mut self, visible: bool) {
        self.flags.set(WindowFlags::HIDDEN, !visible);
    }

    pub fn notify_activated(&mut self, activated: bool) {
        self.flags.set(WindowFlags::ACTIVATED, activated);
    }

    pub fn notify_snapped(&mut self, snapped: bool) {
        self.flags.set(WindowFlags::SNAPPED, snapped);
    }

    pub fn notify_dpi(&mut self, registry: &EventDispatchRegistry, scale: PointF) -> bool {
        if scale == self.content_scale || scale.x <= 0.0 || scale.y <= 0.0 {
            return false;
        }
        self.content_scale = scale;
        registry.dispatch(self.id, Event::DpiChanged { x: scale.x, y: scale.y });
        true
    }

    pub fn notify_close_request(&mut self) {
        debug!(window = ?self.id, "close requested");
        self.ready_to_close = true;
    }
}

/// Control characters never reach `char_input`.
pub fn is_printable(codepoint: u32) -> bool {
    !(codepoint < 32 || (127..160).contains(&codepoint)) && char::from_u32(codepoint).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (EventDispatchRegistry, Rc<RefCell<Vec<Event>>>) {
        let registry = EventDispatchRegistry::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        registry.subscribe_all(Rc::new(move |_: WindowId, event: &Event| {
            sink.borrow_mut().push(*event);
        }));
        (registry, log)
    }

    fn window() -> WindowState {
        WindowState::new(WindowId(1), &WindowConfig::new("Test Window", 640, 480))
    }

    #[test]
    fn test_double_release_dispatches_once() {
        let (registry, log) = recorder();
        let mut state = window();
        state.notify_key(&registry, Key::K, true, Mods::empty());
        state.notify_key(&registry, Key::K, false, Mods::empty());
        state.notify_key(&registry, Key::K, false, Mods::empty());
        let releases = log
            .borrow()
            .iter()
            .filter(|e| matches!(e, Event::KeyInput { action: Action::Release, .. }))
            .count();
        assert_eq!(releases, 1);
    }

    #[test]
    fn test_press_while_pressed_reports_repeat() {
        let (registry, log) = recorder();
        let mut state = window();
        state.notify_key(&registry, Key::W, true, Mods::SHIFT);
        state.notify_key(&registry, Key::W, true, Mods::SHIFT);
        assert_eq!(
            log.borrow()[1],
            Event::KeyInput {
                key: Key::W,
                action: Action::Repeat,
                mods: Mods::SHIFT
            }
        );
    }

    #[test]
    fn test_identical_resize_is_debounced() {
        let (registry, log) = recorder();
        let mut state = window();
        assert!(state.notify_resize(&registry, Point::new(800, 600)));
        assert!(!state.notify_resize(&registry, Point::new(800, 600)));
        assert!(!state.notify_resize(&registry, Point::ZERO));
        assert_eq!(log.borrow().len(), 1);
        assert_eq!(state.dimensions, Point::new(800, 600));
    }

    #[test]
    fn test_focus_loss_releases_held_keys_and_buttons() {
        let (registry, log) = recorder();
        let mut state = window();
        state.notify_focus(&registry, true, Mods::empty());
        state.notify_key(&registry, Key::A, true, Mods::empty());
        state.notify_mouse_button(&registry, MouseButton::Left, true);
        log.borrow_mut().clear();

        state.notify_focus(&registry, false, Mods::empty());
        let kinds: Vec<EventKind> = log.borrow().iter().map(Event::kind).collect();
        assert_eq!(kinds, vec![EventKind::Focus, EventKind::KeyInput, EventKind::MouseClick]);
        assert_eq!(state.key_state(Key::A), Action::Release);
        assert!(!state.any_button_down());
    }

    #[test]
    fn test_duplicate_button_release_is_suppressed() {
        let (registry, log) = recorder();
        let mut state = window();
        state.notify_mouse_button(&registry, MouseButton::Right, false);
        assert!(log.borrow().is_empty());
        state.notify_mouse_button(&registry, MouseButton::Right, true);
        state.notify_mouse_button(&registry, MouseButton::Right, false);
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn test_minimize_and_maximize_only_fire_on_change() {
        let (registry, log) = recorder();
        let mut state = window();
        assert!(state.notify_minimize(&registry, true));
        assert!(!state.notify_minimize(&registry, true));
        assert!(state.notify_maximize(&registry, true));
        assert!(state.notify_minimize(&registry, false));
        assert_eq!(log.borrow().len(), 3);
        assert!(state.is_maximized());
        assert!(!state.is_minimized());
    }

    #[test]
    fn test_dpi_change_reports_scale() {
        let (registry, log) = recorder();
        let mut state = window();
        assert!(!state.notify_dpi(&registry, PointF::ONE));
        assert!(state.notify_dpi(&registry, PointF::new(1.5, 1.5)));
        assert_eq!(log.borrow()[0], Event::DpiChanged { x: 1.5, y: 1.5 });
    }

    #[test]
    fn test_control_characters_are_not_char_input() {
        assert!(!is_printable(8));
        assert!(!is_printable(127));
        assert!(!is_printable(0x9b));
        assert!(!is_printable(0xd800));
        assert!(is_printable('é' as u32));
        assert!(is_printable(0x1f600));
    }

    #[test]
    fn test_new_window_starts_hidden_and_clamped() {
        let config = WindowConfig::new("t", 300, 300).with_resize_limit(500, 400);
        let state = WindowState::new(WindowId(3), &config);
        assert!(state.is_hidden());
        assert_eq!(state.dimensions, Point::new(500, 400));
        assert_eq!(state.clamp_to_limit(Point::new(600, 100)), Point::new(600, 400));
    }
}
