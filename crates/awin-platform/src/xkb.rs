//! libxkbcommon, resolved at runtime.
//!
//! Wayland needs it to interpret the compositor keymap; X11 uses it for
//! keysym-to-unicode conversion and compose sequences.

use std::ffi::{c_char, c_int, c_void, CString};
use std::rc::Rc;

use awin_core::Mods;
use libloading::Library;
use tracing::warn;

use crate::capability::Capability;

pub type Keysym = u32;

const KEYMAP_FORMAT_TEXT_V1: c_int = 1;
const STATE_MODS_EFFECTIVE: c_int = 1 << 3;
const COMPOSE_FEED_ACCEPTED: c_int = 1;
const COMPOSE_NOTHING: c_int = 0;
const COMPOSE_COMPOSING: c_int = 1;
const COMPOSE_COMPOSED: c_int = 2;
const COMPOSE_CANCELLED: c_int = 3;
const MOD_INVALID: u32 = 0xffff_ffff;

type Raw = *mut c_void;

macro_rules! xkb_api {
    ($($field:ident: fn($($arg:ty),*) $(-> $ret:ty)? = $symbol:literal;)*) => {
        pub struct XkbCommon {
            $($field: unsafe extern "C" fn($($arg),*) $(-> $ret)?,)*
            _library: Library,
        }

        impl Capability for XkbCommon {
            const NAME: &'static str = "libxkbcommon";
            const CANDIDATES: &'static [&'static str] = &["libxkbcommon.so.0", "libxkbcommon.so"];

            unsafe fn resolve(library: Library) -> Result<Self, libloading::Error> {
                $(
                    let $field: unsafe extern "C" fn($($arg),*) $(-> $ret)? =
                        *library.get(concat!($symbol, "\0").as_bytes())?;
                )*
                Ok(Self {
                    $($field,)*
                    _library: library,
                })
            }
        }
    };
}

xkb_api! {
    context_new: fn(c_int) -> Raw = "xkb_context_new";
    context_unref: fn(Raw) = "xkb_context_unref";
    keymap_new_from_string: fn(Raw, *const c_char, c_int, c_int) -> Raw =
        "xkb_keymap_new_from_string";
    keymap_unref: fn(Raw) = "xkb_keymap_unref";
    keymap_key_repeats: fn(Raw, u32) -> c_int = "xkb_keymap_key_repeats";
    keymap_mod_get_index: fn(Raw, *const c_char) -> u32 = "xkb_keymap_mod_get_index";
    state_new: fn(Raw) -> Raw = "xkb_state_new";
    state_unref: fn(Raw) = "xkb_state_unref";
    state_update_mask: fn(Raw, u32, u32, u32, u32, u32, u32) -> c_int = "xkb_state_update_mask";
    state_key_get_one_sym: fn(Raw, u32) -> Keysym = "xkb_state_key_get_one_sym";
    state_mod_index_is_active: fn(Raw, u32, c_int) -> c_int = "xkb_state_mod_index_is_active";
    keysym_to_utf32: fn(Keysym) -> u32 = "xkb_keysym_to_utf32";
    compose_table_new_from_locale: fn(Raw, *const c_char, c_int) -> Raw =
        "xkb_compose_table_new_from_locale";
    compose_table_unref: fn(Raw) = "xkb_compose_table_unref";
    compose_state_new: fn(Raw, c_int) -> Raw = "xkb_compose_state_new";
    compose_state_unref: fn(Raw) = "xkb_compose_state_unref";
    compose_state_feed: fn(Raw, Keysym) -> c_int = "xkb_compose_state_feed";
    compose_state_get_status: fn(Raw) -> c_int = "xkb_compose_state_get_status";
    compose_state_get_one_sym: fn(Raw) -> Keysym = "xkb_compose_state_get_one_sym";
    compose_state_reset: fn(Raw) = "xkb_compose_state_reset";
}

impl XkbCommon {
    /// Unicode code point for a keysym, 0 when it has none.
    pub fn keysym_to_utf32(&self, sym: Keysym) -> u32 {
        unsafe { (self.keysym_to_utf32)(sym) }
    }
}

pub struct XkbContext {
    lib: Rc<XkbCommon>,
    raw: Raw,
}

impl XkbContext {
    pub fn new(lib: Rc<XkbCommon>) -> Option<Self> {
        let raw = unsafe { (lib.context_new)(0) };
        (!raw.is_null()).then_some(Self { lib, raw })
    }

    pub fn lib(&self) -> &Rc<XkbCommon> {
        &self.lib
    }

    pub fn keymap_from_string(&self, text: &str) -> Option<XkbKeymap> {
        let text = CString::new(text.trim_end_matches('\0')).ok()?;
        let raw = unsafe {
            (self.lib.keymap_new_from_string)(self.raw, text.as_ptr(), KEYMAP_FORMAT_TEXT_V1, 0)
        };
        if raw.is_null() {
            warn!("compositor keymap failed to compile");
            return None;
        }
        Some(XkbKeymap {
            lib: Rc::clone(&self.lib),
            raw,
        })
    }

    /// Compose table for the current locale, `None` when the locale has none.
    pub fn compose_state(&self) -> Option<XkbCompose> {
        let locale = ["LC_ALL", "LC_CTYPE", "LANG"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| "C".to_owned());
        let locale = CString::new(locale).ok()?;
        let table =
            unsafe { (self.lib.compose_table_new_from_locale)(self.raw, locale.as_ptr(), 0) };
        if table.is_null() {
            warn!("no compose table for the current locale");
            return None;
        }
        let state = unsafe { (self.lib.compose_state_new)(table, 0) };
        unsafe { (self.lib.compose_table_unref)(table) };
        (!state.is_null()).then(|| XkbCompose {
            lib: Rc::clone(&self.lib),
            raw: state,
        })
    }
}

impl Drop for XkbContext {
    fn drop(&mut self) {
        unsafe { (self.lib.context_unref)(self.raw) }
    }
}

/// Indices of the modifiers reported in `Mods`.
#[derive(Debug, Clone, Copy)]
pub struct ModIndices {
    shift: u32,
    control: u32,
    alt: u32,
    super_: u32,
    caps_lock: u32,
    num_lock: u32,
}

pub struct XkbKeymap {
    lib: Rc<XkbCommon>,
    raw: Raw,
}

impl XkbKeymap {
    pub fn key_repeats(&self, keycode: u32) -> bool {
        unsafe { (self.lib.keymap_key_repeats)(self.raw, keycode) != 0 }
    }

    fn mod_index(&self, name: &str) -> u32 {
        match CString::new(name) {
            Ok(name) => unsafe { (self.lib.keymap_mod_get_index)(self.raw, name.as_ptr()) },
            Err(_) => MOD_INVALID,
        }
    }

    pub fn mod_indices(&self) -> ModIndices {
        ModIndices {
            shift: self.mod_index("Shift"),
            control: self.mod_index("Control"),
            alt: self.mod_index("Mod1"),
            super_: self.mod_index("Mod4"),
            caps_lock: self.mod_index("Lock"),
            num_lock: self.mod_index("Mod2"),
        }
    }

    pub fn new_state(&self) -> Option<XkbState> {
        let raw = unsafe { (self.lib.state_new)(self.raw) };
        (!raw.is_null()).then(|| XkbState {
            lib: Rc::clone(&self.lib),
            raw,
        })
    }
}

impl Drop for XkbKeymap {
    fn drop(&mut self) {
        unsafe { (self.lib.keymap_unref)(self.raw) }
    }
}

pub struct XkbState {
    lib: Rc<XkbCommon>,
    raw: Raw,
}

impl XkbState {
    pub fn update_mask(&mut self, depressed: u32, latched: u32, locked: u32, group: u32) {
        unsafe { (self.lib.state_update_mask)(self.raw, depressed, latched, locked, 0, 0, group) };
    }

    /// Keysym for an xkb keycode (evdev code + 8).
    pub fn key_sym(&self, keycode: u32) -> Keysym {
        unsafe { (self.lib.state_key_get_one_sym)(self.raw, keycode) }
    }

    fn active(&self, index: u32) -> bool {
        index != MOD_INVALID
            && unsafe {
                (self.lib.state_mod_index_is_active)(self.raw, index, STATE_MODS_EFFECTIVE) == 1
            }
    }

    pub fn mods(&self, indices: &ModIndices) -> Mods {
        let mut mods = Mods::empty();
        mods.set(Mods::SHIFT, self.active(indices.shift));
        mods.set(Mods::CONTROL, self.active(indices.control));
        mods.set(Mods::ALT, self.active(indices.alt));
        mods.set(Mods::SUPER, self.active(indices.super_));
        mods.set(Mods::CAPS_LOCK, self.active(indices.caps_lock));
        mods.set(Mods::NUM_LOCK, self.active(indices.num_lock));
        mods
    }
}

impl Drop for XkbState {
    fn drop(&mut self) {
        unsafe { (self.lib.state_unref)(self.raw) }
    }
}

pub struct XkbCompose {
    lib: Rc<XkbCommon>,
    raw: Raw,
}

impl XkbCompose {
    /// Feeds a keysym through the compose machine. Returns the keysym to
    /// report, or `None` while a sequence is in progress or was cancelled.
    pub fn feed(&mut self, sym: Keysym) -> Option<Keysym> {
        if sym == 0 {
            return None;
        }
        if unsafe { (self.lib.compose_state_feed)(self.raw, sym) } != COMPOSE_FEED_ACCEPTED {
            return Some(sym);
        }
        match unsafe { (self.lib.compose_state_get_status)(self.raw) } {
            COMPOSE_COMPOSED => {
                let composed = unsafe { (self.lib.compose_state_get_one_sym)(self.raw) };
                unsafe { (self.lib.compose_state_reset)(self.raw) };
                Some(composed)
            }
            COMPOSE_COMPOSING | COMPOSE_CANCELLED => None,
            COMPOSE_NOTHING => Some(sym),
            _ => Some(sym),
        }
    }
}

impl Drop for XkbCompose {
    fn drop(&mut self) {
        unsafe { (self.lib.compose_state_unref)(self.raw) }
    }
}
