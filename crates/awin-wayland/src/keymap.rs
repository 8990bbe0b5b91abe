//! Linux evdev scancodes (as delivered by `wl_keyboard.key`) to logical keys.

use awin_core::Key;

/// Offset between evdev codes and xkb keycodes.
pub const XKB_KEYCODE_OFFSET: u32 = 8;

pub fn scancode_to_key(scancode: u32) -> Key {
    use Key::*;
    match scancode {
        1 => Escape,
        2 => Num1,
        3 => Num2,
        4 => Num3,
        5 => Num4,
        6 => Num5,
        7 => Num6,
        8 => Num7,
        9 => Num8,
        10 => Num9,
        11 => Num0,
        12 => Minus,
        13 => Equal,
        14 => Backspace,
        15 => Tab,
        16 => Q,
        17 => W,
        18 => E,
        19 => R,
        20 => T,
        21 => Y,
        22 => U,
        23 => I,
        24 => O,
        25 => P,
        26 => LeftBracket,
        27 => RightBracket,
        28 => Enter,
        29 => LeftControl,
        30 => A,
        31 => S,
        32 => D,
        33 => F,
        34 => G,
        35 => H,
        36 => J,
        37 => K,
        38 => L,
        39 => Semicolon,
        40 => Apostrophe,
        41 => GraveAccent,
        42 => LeftShift,
        43 => Backslash,
        44 => Z,
        45 => X,
        46 => C,
        47 => V,
        48 => B,
        49 => N,
        50 => M,
        51 => Comma,
        52 => Period,
        53 => Slash,
        54 => RightShift,
        55 => KpMultiply,
        56 => LeftAlt,
        57 => Space,
        58 => CapsLock,
        59..=68 => Key::from_index(F1.index() + (scancode - 59) as usize),
        69 => NumLock,
        70 => ScrollLock,
        71 => Kp7,
        72 => Kp8,
        73 => Kp9,
        74 => KpSubtract,
        75 => Kp4,
        76 => Kp5,
        77 => Kp6,
        78 => KpAdd,
        79 => Kp1,
        80 => Kp2,
        81 => Kp3,
        82 => Kp0,
        83 => KpDecimal,
        86 => World2,
        87 => F11,
        88 => F12,
        96 => KpEnter,
        97 => RightControl,
        98 => KpDivide,
        99 => PrintScreen,
        100 => RightAlt,
        102 => Home,
        103 => Up,
        104 => PageUp,
        105 => Left,
        106 => Right,
        107 => End,
        108 => Down,
        109 => PageDown,
        110 => Insert,
        111 => Delete,
        117 => KpEqual,
        119 => Pause,
        125 => LeftSuper,
        126 => RightSuper,
        127 => Menu,
        183..=194 => Key::from_index(F13.index() + (scancode - 183) as usize),
        _ => Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_rows() {
        assert_eq!(scancode_to_key(16), Key::Q);
        assert_eq!(scancode_to_key(30), Key::A);
        assert_eq!(scancode_to_key(50), Key::M);
    }

    #[test]
    fn test_function_key_ranges() {
        assert_eq!(scancode_to_key(59), Key::F1);
        assert_eq!(scancode_to_key(68), Key::F10);
        assert_eq!(scancode_to_key(87), Key::F11);
        assert_eq!(scancode_to_key(183), Key::F13);
        assert_eq!(scancode_to_key(194), Key::F24);
    }

    #[test]
    fn test_unmapped_codes() {
        assert_eq!(scancode_to_key(0), Key::Unknown);
        assert_eq!(scancode_to_key(84), Key::Unknown);
        assert_eq!(scancode_to_key(600), Key::Unknown);
    }
}
