//! Key event hygiene: duplicate suppression, synthetic autorepeat detection
//! and modifier decoding from the core event state.

use awin_core::Mods;

use crate::keymap::Keysym;

pub const MASK_SHIFT: u16 = 1 << 0;
pub const MASK_LOCK: u16 = 1 << 1;
pub const MASK_CONTROL: u16 = 1 << 2;
pub const MASK_MOD1: u16 = 1 << 3;
pub const MASK_NUM_LOCK: u16 = 1 << 4;
pub const MASK_MOD4: u16 = 1 << 6;

/// A release followed this closely by a press of the same keycode is the
/// server's autorepeat, not the user.
pub const AUTOREPEAT_WINDOW_MS: u32 = 20;

pub fn mods_from_state(state: u16) -> Mods {
    let mut mods = Mods::empty();
    mods.set(Mods::SHIFT, state & MASK_SHIFT != 0);
    mods.set(Mods::CONTROL, state & MASK_CONTROL != 0);
    mods.set(Mods::ALT, state & MASK_MOD1 != 0);
    mods.set(Mods::SUPER, state & MASK_MOD4 != 0);
    mods.set(Mods::CAPS_LOCK, state & MASK_LOCK != 0);
    mods.set(Mods::NUM_LOCK, state & MASK_NUM_LOCK != 0);
    mods
}

/// Last accepted press time per keycode. Input method frameworks re-send
/// presses with the timestamp of the original; those are dropped.
pub struct KeyFilter {
    press_times: [u32; 256],
}

impl Default for KeyFilter {
    fn default() -> Self {
        Self { press_times: [0; 256] }
    }
}

impl KeyFilter {
    /// Server time is a wrapping 32-bit millisecond counter, so "newer"
    /// means a forward distance of less than half the range.
    pub fn accept_press(&mut self, keycode: u8, time: u32) -> bool {
        let last = self.press_times[keycode as usize];
        let diff = time.wrapping_sub(last);
        let accept = diff == time || (diff > 0 && diff < 1 << 31);
        if accept {
            self.press_times[keycode as usize] = time;
        }
        accept
    }
}

/// The parts of a key event the autorepeat check looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub window: u32,
    pub keycode: u8,
    pub pressed: bool,
    pub time: u32,
}

/// True when `release` is half of a server-generated repeat pair, judged by
/// the next queued event. The pair must share keycode and window.
pub fn is_autorepeat_release(release: KeyStroke, next: Option<KeyStroke>) -> bool {
    match next {
        Some(next)
            if !release.pressed
                && next.pressed
                && next.keycode == release.keycode
                && next.window == release.window =>
        {
            next.time.wrapping_sub(release.time) < AUTOREPEAT_WINDOW_MS
        }
        _ => false,
    }
}

/// Turns the keysym of a press into text. Implemented by the context on top
/// of libxkbcommon compose when it is available.
pub trait KeyText {
    fn codepoint(&mut self, sym: Keysym) -> Option<u32>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_press_is_accepted() {
        let mut filter = KeyFilter::default();
        assert!(filter.accept_press(38, 1000));
    }

    #[test]
    fn test_same_timestamp_is_a_duplicate() {
        let mut filter = KeyFilter::default();
        assert!(filter.accept_press(38, 1000));
        assert!(!filter.accept_press(38, 1000));
        assert!(filter.accept_press(38, 1001));
        // other keycodes are independent
        assert!(filter.accept_press(39, 1000));
    }

    #[test]
    fn test_older_timestamp_is_rejected() {
        let mut filter = KeyFilter::default();
        assert!(filter.accept_press(38, 5000));
        assert!(!filter.accept_press(38, 4000));
    }

    #[test]
    fn test_wrapped_timestamp_counts_as_newer() {
        let mut filter = KeyFilter::default();
        assert!(filter.accept_press(38, u32::MAX - 5));
        assert!(filter.accept_press(38, 10));
        assert!(!filter.accept_press(38, u32::MAX - 1));
    }

    fn stroke(window: u32, keycode: u8, pressed: bool, time: u32) -> KeyStroke {
        KeyStroke {
            window,
            keycode,
            pressed,
            time,
        }
    }

    #[test]
    fn test_autorepeat_pair_detection() {
        let release = stroke(1, 38, false, 500);
        let repeat = stroke(1, 38, true, 500);
        let late = stroke(1, 38, true, 600);
        let other = stroke(1, 39, true, 500);

        assert!(is_autorepeat_release(release, Some(repeat)));
        assert!(!is_autorepeat_release(release, Some(late)));
        assert!(!is_autorepeat_release(release, Some(other)));
        assert!(!is_autorepeat_release(release, None));
        assert!(!is_autorepeat_release(repeat, Some(repeat)));
    }

    #[test]
    fn test_press_on_another_window_is_not_a_repeat() {
        let release = stroke(1, 38, false, 1000);
        let press_elsewhere = stroke(2, 38, true, 1005);
        assert!(!is_autorepeat_release(release, Some(press_elsewhere)));
        assert!(is_autorepeat_release(release, Some(stroke(1, 38, true, 1005))));
    }

    #[test]
    fn test_autorepeat_across_wrap() {
        let release = stroke(9, 9, false, u32::MAX - 2);
        let press = stroke(9, 9, true, 3);
        assert!(is_autorepeat_release(release, Some(press)));
    }

    #[test]
    fn test_mods_from_state() {
        let mods = mods_from_state(MASK_SHIFT | MASK_MOD1 | MASK_NUM_LOCK);
        assert_eq!(mods, Mods::SHIFT | Mods::ALT | Mods::NUM_LOCK);
    }
}
