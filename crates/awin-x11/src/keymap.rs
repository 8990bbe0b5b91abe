//! Keysym to logical key, and the keycode table built from the server's
//! core keyboard mapping.

use awin_core::Key;

pub type Keysym = u32;

pub const NO_SYMBOL: Keysym = 0;

/// Keypad keysyms as found in the NumLock level of a keypad keycode.
fn keypad_key(sym: Keysym) -> Option<Key> {
    Some(match sym {
        0xffb0 => Key::Kp0,
        0xffb1 => Key::Kp1,
        0xffb2 => Key::Kp2,
        0xffb3 => Key::Kp3,
        0xffb4 => Key::Kp4,
        0xffb5 => Key::Kp5,
        0xffb6 => Key::Kp6,
        0xffb7 => Key::Kp7,
        0xffb8 => Key::Kp8,
        0xffb9 => Key::Kp9,
        0xffac | 0xffae => Key::KpDecimal,
        0xffbd => Key::KpEqual,
        0xff8d => Key::KpEnter,
        _ => return None,
    })
}

pub fn keysym_to_key(sym: Keysym) -> Key {
    match sym {
        0xff1b => Key::Escape,
        0xff09 => Key::Tab,
        0xffe1 => Key::LeftShift,
        0xffe2 => Key::RightShift,
        0xffe3 => Key::LeftControl,
        0xffe4 => Key::RightControl,
        0xffe7 | 0xffe9 => Key::LeftAlt,
        // Mode_switch, ISO_Level3_Shift, Meta_R, Alt_R
        0xff7e | 0xfe03 | 0xffe8 | 0xffea => Key::RightAlt,
        0xffeb => Key::LeftSuper,
        0xffec => Key::RightSuper,
        0xff67 => Key::Menu,
        0xff7f => Key::NumLock,
        0xffe5 => Key::CapsLock,
        0xff61 => Key::PrintScreen,
        0xff14 => Key::ScrollLock,
        0xff13 => Key::Pause,
        0xffff => Key::Delete,
        0xff08 => Key::Backspace,
        0xff0d => Key::Enter,
        0xff50 => Key::Home,
        0xff57 => Key::End,
        0xff55 => Key::PageUp,
        0xff56 => Key::PageDown,
        0xff63 => Key::Insert,
        0xff51 => Key::Left,
        0xff53 => Key::Right,
        0xff54 => Key::Down,
        0xff52 => Key::Up,
        0xffbe..=0xffd6 => Key::from_index(Key::F1.index() + (sym - 0xffbe) as usize),

        0xffaf => Key::KpDivide,
        0xffaa => Key::KpMultiply,
        0xffad => Key::KpSubtract,
        0xffab => Key::KpAdd,
        // keypad navigation level, used when NumLock is off
        0xff9e => Key::Kp0,
        0xff9c => Key::Kp1,
        0xff99 => Key::Kp2,
        0xff9b => Key::Kp3,
        0xff96 => Key::Kp4,
        0xff98 => Key::Kp6,
        0xff95 => Key::Kp7,
        0xff97 => Key::Kp8,
        0xff9a => Key::Kp9,
        0xff9f => Key::KpDecimal,
        0xffbd => Key::KpEqual,
        0xff8d => Key::KpEnter,

        0x61..=0x7a => Key::from_index(Key::A.index() + (sym - 0x61) as usize),
        0x41..=0x5a => Key::from_index(Key::A.index() + (sym - 0x41) as usize),
        0x30..=0x39 => Key::from_index(Key::Num0.index() + (sym - 0x30) as usize),
        0x20 => Key::Space,
        0x2d => Key::Minus,
        0x3d => Key::Equal,
        0x5b => Key::LeftBracket,
        0x5d => Key::RightBracket,
        0x5c => Key::Backslash,
        0x3b => Key::Semicolon,
        0x27 => Key::Apostrophe,
        0x60 => Key::GraveAccent,
        0x2c => Key::Comma,
        0x2e => Key::Period,
        0x2f => Key::Slash,
        0x3c => Key::World1,
        _ => Key::Unknown,
    }
}

/// Keysym to Unicode for the Latin-1, keypad and direct-Unicode ranges.
/// Anything else needs libxkbcommon.
pub fn keysym_to_codepoint(sym: Keysym) -> Option<u32> {
    match sym {
        0x20..=0x7e | 0xa0..=0xff => Some(sym),
        0x0100_0100..=0x0110_ffff => Some(sym - 0x0100_0000),
        0xff80 => Some(' ' as u32),
        0xffaa => Some('*' as u32),
        0xffab => Some('+' as u32),
        0xffac => Some(',' as u32),
        0xffad => Some('-' as u32),
        0xffae => Some('.' as u32),
        0xffaf => Some('/' as u32),
        0xffb0..=0xffb9 => Some('0' as u32 + (sym - 0xffb0)),
        0xffbd => Some('=' as u32),
        _ => None,
    }
}

/// Latin letters only; the core protocol leaves case to the client.
fn upper_case(sym: Keysym) -> Keysym {
    match sym {
        0x61..=0x7a => sym - 0x20,
        0xe0..=0xfe if sym != 0xf7 => sym - 0x20,
        _ => sym,
    }
}

fn is_lower_case(sym: Keysym) -> bool {
    upper_case(sym) != sym
}

fn is_keypad(sym: Keysym) -> bool {
    (0xff80..=0xffbd).contains(&sym)
}

/// Reply of `GetKeyboardMapping`, flattened, with the logical key of every
/// keycode resolved up front.
pub struct KeyboardMap {
    min_keycode: u8,
    per_keycode: usize,
    syms: Vec<Keysym>,
    keys: [Key; 256],
}

impl KeyboardMap {
    pub fn new(min_keycode: u8, per_keycode: u8, syms: Vec<Keysym>) -> Self {
        let per_keycode = per_keycode.max(1) as usize;
        let mut map = Self {
            min_keycode,
            per_keycode,
            syms,
            keys: [Key::Unknown; 256],
        };
        for keycode in 0..=255u8 {
            map.keys[keycode as usize] = map.resolve_key(keycode);
        }
        map
    }

    pub fn empty() -> Self {
        Self::new(8, 1, Vec::new())
    }

    fn level(&self, keycode: u8, level: usize) -> Keysym {
        if keycode < self.min_keycode || level >= self.per_keycode {
            return NO_SYMBOL;
        }
        let index = (keycode - self.min_keycode) as usize * self.per_keycode + level;
        self.syms.get(index).copied().unwrap_or(NO_SYMBOL)
    }

    fn resolve_key(&self, keycode: u8) -> Key {
        // keypad keycodes carry the digit in the second level
        if let Some(key) = keypad_key(self.level(keycode, 1)) {
            return key;
        }
        keysym_to_key(self.level(keycode, 0))
    }

    pub fn key(&self, keycode: u8) -> Key {
        self.keys[keycode as usize]
    }

    /// Keysym for a key press under the core-protocol level rules for the
    /// first group.
    pub fn lookup(&self, keycode: u8, state: u16) -> Keysym {
        let shift = state & crate::keyboard::MASK_SHIFT != 0;
        let lock = state & crate::keyboard::MASK_LOCK != 0;
        let num_lock = state & crate::keyboard::MASK_NUM_LOCK != 0;

        let base = self.level(keycode, 0);
        let shifted = match self.level(keycode, 1) {
            NO_SYMBOL => upper_case(base),
            sym => sym,
        };

        if num_lock && is_keypad(shifted) {
            return if shift { base } else { shifted };
        }
        match (shift, lock && is_lower_case(base)) {
            (false, false) => base,
            (true, false) | (false, true) => shifted,
            (true, true) => base,
        }
    }

    pub fn keycode_for(&self, key: Key) -> Option<u8> {
        self.keys.iter().position(|k| *k == key).map(|code| code as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyboard::{MASK_LOCK, MASK_NUM_LOCK, MASK_SHIFT};

    fn sample_map() -> KeyboardMap {
        // keycode 38 = a/A, 10 = 1/exclam, 90 = KP_Insert/KP_0, 50 = Shift_L
        let mut syms = vec![NO_SYMBOL; 100 * 2];
        let mut put = |code: usize, a: Keysym, b: Keysym| {
            syms[(code - 8) * 2] = a;
            syms[(code - 8) * 2 + 1] = b;
        };
        put(38, 0x61, 0x41);
        put(10, 0x31, 0x21);
        put(90, 0xff9e, 0xffb0);
        put(50, 0xffe1, NO_SYMBOL);
        KeyboardMap::new(8, 2, syms)
    }

    #[test]
    fn test_keysym_table() {
        assert_eq!(keysym_to_key(0x71), Key::Q);
        assert_eq!(keysym_to_key(0x51), Key::Q);
        assert_eq!(keysym_to_key(0x39), Key::Num9);
        assert_eq!(keysym_to_key(0xffbe), Key::F1);
        assert_eq!(keysym_to_key(0xffd6), Key::F25);
        assert_eq!(keysym_to_key(0xfe03), Key::RightAlt);
        assert_eq!(keysym_to_key(0x1234), Key::Unknown);
    }

    #[test]
    fn test_keypad_keycode_uses_numlock_level() {
        let map = sample_map();
        assert_eq!(map.key(90), Key::Kp0);
        assert_eq!(map.key(38), Key::A);
        assert_eq!(map.key(50), Key::LeftShift);
        assert_eq!(map.key(7), Key::Unknown);
        assert_eq!(map.keycode_for(Key::A), Some(38));
    }

    #[test]
    fn test_level_selection() {
        let map = sample_map();
        assert_eq!(map.lookup(38, 0), 0x61);
        assert_eq!(map.lookup(38, MASK_SHIFT), 0x41);
        assert_eq!(map.lookup(38, MASK_LOCK), 0x41);
        assert_eq!(map.lookup(38, MASK_LOCK | MASK_SHIFT), 0x61);
        assert_eq!(map.lookup(10, MASK_LOCK), 0x31);
        assert_eq!(map.lookup(90, 0), 0xff9e);
        assert_eq!(map.lookup(90, MASK_NUM_LOCK), 0xffb0);
    }

    #[test]
    fn test_codepoint_fallback() {
        assert_eq!(keysym_to_codepoint(0x41), Some('A' as u32));
        assert_eq!(keysym_to_codepoint(0xe9), Some(0xe9));
        assert_eq!(keysym_to_codepoint(0x0100_20ac), Some(0x20ac));
        assert_eq!(keysym_to_codepoint(0xffb5), Some('5' as u32));
        assert_eq!(keysym_to_codepoint(0xff0d), None);
    }
}
