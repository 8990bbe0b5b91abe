//! Logical keys, mouse buttons and the per-key press state machine.

use serde::{Deserialize, Serialize};

macro_rules! keys {
    ($($name:ident),* $(,)?) => {
        /// Layout-independent logical key, named after the US layout.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Key {
            $($name),*
        }

        impl Key {
            pub const ALL: &'static [Key] = &[$(Key::$name),*];
            pub const COUNT: usize = Self::ALL.len();
        }
    };
}

keys! {
    Unknown,
    Space, Apostrophe, Comma, Minus, Period, Slash,
    Num0, Num1, Num2, Num3, Num4, Num5, Num6, Num7, Num8, Num9,
    Semicolon, Equal,
    A, B, C, D, E, F, G, H, I, J, K, L, M,
    N, O, P, Q, R, S, T, U, V, W, X, Y, Z,
    LeftBracket, Backslash, RightBracket, GraveAccent, World1, World2,
    Escape, Enter, Tab, Backspace, Insert, Delete,
    Right, Left, Down, Up, PageUp, PageDown, Home, End,
    CapsLock, ScrollLock, NumLock, PrintScreen, Pause,
    F1, F2, F3, F4, F5, F6, F7, F8, F9, F10, F11, F12, F13,
    F14, F15, F16, F17, F18, F19, F20, F21, F22, F23, F24, F25,
    Kp0, Kp1, Kp2, Kp3, Kp4, Kp5, Kp6, Kp7, Kp8, Kp9,
    KpDecimal, KpDivide, KpMultiply, KpSubtract, KpAdd, KpEnter, KpEqual,
    LeftShift, LeftControl, LeftAlt, LeftSuper,
    RightShift, RightControl, RightAlt, RightSuper,
    Menu,
}

impl Key {
    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Key {
        Self::ALL.get(index).copied().unwrap_or(Key::Unknown)
    }

    pub fn is_modifier(self) -> bool {
        matches!(
            self,
            Key::LeftShift
                | Key::RightShift
                | Key::LeftControl
                | Key::RightControl
                | Key::LeftAlt
                | Key::RightAlt
                | Key::LeftSuper
                | Key::RightSuper
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Release,
    Press,
    Repeat,
}

/// Last known state of a key. `Repeat` is only ever reported, never stored.
pub type KeyState = Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
    Other(u8),
}

impl MouseButton {
    pub const TRACKED: usize = 8;

    pub(crate) fn slot(self) -> Option<usize> {
        match self {
            MouseButton::Left => Some(0),
            MouseButton::Right => Some(1),
            MouseButton::Middle => Some(2),
            MouseButton::X1 => Some(3),
            MouseButton::X2 => Some(4),
            MouseButton::Other(n) => {
                let slot = 5 + n as usize;
                (slot < Self::TRACKED).then_some(slot)
            }
        }
    }

    pub(crate) fn from_slot(slot: usize) -> MouseButton {
        match slot {
            0 => MouseButton::Left,
            1 => MouseButton::Right,
            2 => MouseButton::Middle,
            3 => MouseButton::X1,
            4 => MouseButton::X2,
            n => MouseButton::Other((n - 5) as u8),
        }
    }
}

/// Press state per logical key. Collapses "down while already down" into
/// `Repeat` and swallows "up while already up".
#[derive(Debug, Clone)]
pub struct KeyStates {
    states: [KeyState; Key::COUNT],
}

impl Default for KeyStates {
    fn default() -> Self {
        Self {
            states: [Action::Release; Key::COUNT],
        }
    }
}

impl KeyStates {
    pub fn get(&self, key: Key) -> KeyState {
        self.states[key.index()]
    }

    /// Returns the action to report, or `None` when the notification is a
    /// duplicate release. `Unknown` is never tracked.
    pub fn transition(&mut self, key: Key, pressed: bool) -> Option<Action> {
        if key == Key::Unknown {
            return Some(if pressed { Action::Press } else { Action::Release });
        }
        let slot = &mut self.states[key.index()];
        match (pressed, *slot) {
            (true, Action::Release) => {
                *slot = Action::Press;
                Some(Action::Press)
            }
            (true, _) => Some(Action::Repeat),
            (false, Action::Release) => None,
            (false, _) => {
                *slot = Action::Release;
                Some(Action::Release)
            }
        }
    }

    pub fn force_release(&mut self, key: Key) {
        self.states[key.index()] = Action::Release;
    }

    pub fn pressed(&self) -> impl Iterator<Item = Key> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| **state != Action::Release)
            .map(|(index, _)| Key::from_index(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_table_is_dense() {
        for (index, key) in Key::ALL.iter().enumerate() {
            assert_eq!(key.index(), index);
            assert_eq!(Key::from_index(index), *key);
        }
        assert_eq!(Key::from_index(Key::COUNT + 5), Key::Unknown);
    }

    #[test]
    fn test_second_press_collapses_into_repeat() {
        let mut keys = KeyStates::default();
        assert_eq!(keys.transition(Key::A, true), Some(Action::Press));
        assert_eq!(keys.transition(Key::A, true), Some(Action::Repeat));
        assert_eq!(keys.get(Key::A), Action::Press);
        assert_eq!(keys.transition(Key::A, false), Some(Action::Release));
    }

    #[test]
    fn test_release_while_released_is_suppressed() {
        let mut keys = KeyStates::default();
        assert_eq!(keys.transition(Key::Space, false), None);
        keys.transition(Key::Space, true);
        assert_eq!(keys.transition(Key::Space, false), Some(Action::Release));
        assert_eq!(keys.transition(Key::Space, false), None);
    }

    #[test]
    fn test_unknown_key_is_passed_through() {
        let mut keys = KeyStates::default();
        assert_eq!(keys.transition(Key::Unknown, false), Some(Action::Release));
        assert_eq!(keys.transition(Key::Unknown, true), Some(Action::Press));
        assert_eq!(keys.transition(Key::Unknown, true), Some(Action::Press));
        assert_eq!(keys.pressed().count(), 0);
    }

    #[test]
    fn test_mouse_button_slots_round_trip() {
        for slot in 0..MouseButton::TRACKED {
            assert_eq!(MouseButton::from_slot(slot).slot(), Some(slot));
        }
        assert_eq!(MouseButton::Other(40).slot(), None);
    }
}
