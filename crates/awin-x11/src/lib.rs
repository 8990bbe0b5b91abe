//! X11 backend on top of `x11rb`.
//!
//! The protocol-free parts (key tables, key de-duplication, selection
//! transfers, `_NET_WM_STATE` reconciliation and the event translator) are
//! plain state machines; `context` and `backend` wire them to the server.

mod atoms;
mod backend;
mod context;
mod cursor;
pub mod keyboard;
pub mod keymap;
mod monitor;
pub mod selection;
pub mod translate;
pub mod wm_state;

pub use backend::X11Backend;
