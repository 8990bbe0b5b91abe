//! Bitmask flag sets for window mode and keyboard modifiers.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Canonical window mode. `FULLSCREEN` and `MAXIMIZED` may overlap while a
    /// backend transition is in flight.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct WindowFlags: u32 {
        const RESIZABLE = 1 << 0;
        const DECORATED = 1 << 1;
        const FULLSCREEN = 1 << 2;
        const MINIMIZED = 1 << 3;
        const MAXIMIZED = 1 << 4;
        const HIDDEN = 1 << 5;
        const SNAPPED = 1 << 6;
        const ACTIVATED = 1 << 7;
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Mods: u8 {
        const SHIFT = 1 << 0;
        const CONTROL = 1 << 1;
        const ALT = 1 << 2;
        const SUPER = 1 << 3;
        const CAPS_LOCK = 1 << 4;
        const NUM_LOCK = 1 << 5;
    }
}
