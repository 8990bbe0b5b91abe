//! Win32 scancode (with the extended bit as 0x100) to logical key.

use awin_core::Key;

const SCANCODES: &[(u16, Key)] = &[
    (0x00B, Key::Num0),
    (0x002, Key::Num1),
    (0x003, Key::Num2),
    (0x004, Key::Num3),
    (0x005, Key::Num4),
    (0x006, Key::Num5),
    (0x007, Key::Num6),
    (0x008, Key::Num7),
    (0x009, Key::Num8),
    (0x00A, Key::Num9),
    (0x01E, Key::A),
    (0x030, Key::B),
    (0x02E, Key::C),
    (0x020, Key::D),
    (0x012, Key::E),
    (0x021, Key::F),
    (0x022, Key::G),
    (0x023, Key::H),
    (0x017, Key::I),
    (0x024, Key::J),
    (0x025, Key::K),
    (0x026, Key::L),
    (0x032, Key::M),
    (0x031, Key::N),
    (0x018, Key::O),
    (0x019, Key::P),
    (0x010, Key::Q),
    (0x013, Key::R),
    (0x01F, Key::S),
    (0x014, Key::T),
    (0x016, Key::U),
    (0x02F, Key::V),
    (0x011, Key::W),
    (0x02D, Key::X),
    (0x015, Key::Y),
    (0x02C, Key::Z),
    (0x028, Key::Apostrophe),
    (0x02B, Key::Backslash),
    (0x033, Key::Comma),
    (0x00D, Key::Equal),
    (0x029, Key::GraveAccent),
    (0x01A, Key::LeftBracket),
    (0x00C, Key::Minus),
    (0x034, Key::Period),
    (0x01B, Key::RightBracket),
    (0x027, Key::Semicolon),
    (0x035, Key::Slash),
    (0x056, Key::World2),
    (0x00E, Key::Backspace),
    (0x153, Key::Delete),
    (0x14F, Key::End),
    (0x01C, Key::Enter),
    (0x001, Key::Escape),
    (0x147, Key::Home),
    (0x152, Key::Insert),
    (0x15D, Key::Menu),
    (0x151, Key::PageDown),
    (0x149, Key::PageUp),
    (0x045, Key::Pause),
    (0x039, Key::Space),
    (0x00F, Key::Tab),
    (0x03A, Key::CapsLock),
    (0x145, Key::NumLock),
    (0x046, Key::ScrollLock),
    (0x03B, Key::F1),
    (0x03C, Key::F2),
    (0x03D, Key::F3),
    (0x03E, Key::F4),
    (0x03F, Key::F5),
    (0x040, Key::F6),
    (0x041, Key::F7),
    (0x042, Key::F8),
    (0x043, Key::F9),
    (0x044, Key::F10),
    (0x057, Key::F11),
    (0x058, Key::F12),
    (0x064, Key::F13),
    (0x065, Key::F14),
    (0x066, Key::F15),
    (0x067, Key::F16),
    (0x068, Key::F17),
    (0x069, Key::F18),
    (0x06A, Key::F19),
    (0x06B, Key::F20),
    (0x06C, Key::F21),
    (0x06D, Key::F22),
    (0x06E, Key::F23),
    (0x076, Key::F24),
    (0x038, Key::LeftAlt),
    (0x01D, Key::LeftControl),
    (0x02A, Key::LeftShift),
    (0x15B, Key::LeftSuper),
    (0x137, Key::PrintScreen),
    (0x138, Key::RightAlt),
    (0x11D, Key::RightControl),
    (0x036, Key::RightShift),
    (0x15C, Key::RightSuper),
    (0x150, Key::Down),
    (0x14B, Key::Left),
    (0x14D, Key::Right),
    (0x148, Key::Up),
    (0x052, Key::Kp0),
    (0x04F, Key::Kp1),
    (0x050, Key::Kp2),
    (0x051, Key::Kp3),
    (0x04B, Key::Kp4),
    (0x04C, Key::Kp5),
    (0x04D, Key::Kp6),
    (0x047, Key::Kp7),
    (0x048, Key::Kp8),
    (0x049, Key::Kp9),
    (0x04E, Key::KpAdd),
    (0x053, Key::KpDecimal),
    (0x135, Key::KpDivide),
    (0x11C, Key::KpEnter),
    (0x059, Key::KpEqual),
    (0x037, Key::KpMultiply),
    (0x04A, Key::KpSubtract),
];

const fn build_keys() -> [Key; 512] {
    let mut table = [Key::Unknown; 512];
    let mut i = 0;
    while i < SCANCODES.len() {
        table[SCANCODES[i].0 as usize] = SCANCODES[i].1;
        i += 1;
    }
    table
}

const fn build_scancodes() -> [u16; Key::COUNT] {
    let mut table = [0u16; Key::COUNT];
    let mut i = 0;
    while i < SCANCODES.len() {
        table[SCANCODES[i].1.index()] = SCANCODES[i].0;
        i += 1;
    }
    table
}

static KEYS: [Key; 512] = build_keys();
static KEY_SCANCODES: [u16; Key::COUNT] = build_scancodes();

pub fn scancode_to_key(scancode: u32) -> Key {
    KEYS.get(scancode as usize).copied().unwrap_or(Key::Unknown)
}

pub fn key_to_scancode(key: Key) -> Option<u16> {
    match KEY_SCANCODES[key.index()] {
        0 => None,
        scancode => Some(scancode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_bit_distinguishes_keys() {
        assert_eq!(scancode_to_key(0x01C), Key::Enter);
        assert_eq!(scancode_to_key(0x11C), Key::KpEnter);
        assert_eq!(scancode_to_key(0x01D), Key::LeftControl);
        assert_eq!(scancode_to_key(0x11D), Key::RightControl);
    }

    #[test]
    fn test_unmapped_codes_are_unknown() {
        assert_eq!(scancode_to_key(0x000), Key::Unknown);
        assert_eq!(scancode_to_key(0x1FF), Key::Unknown);
        assert_eq!(scancode_to_key(9000), Key::Unknown);
    }

    #[test]
    fn test_reverse_lookup() {
        assert_eq!(key_to_scancode(Key::W), Some(0x011));
        assert_eq!(key_to_scancode(Key::Unknown), None);
        assert_eq!(key_to_scancode(Key::F25), None);
    }
}
