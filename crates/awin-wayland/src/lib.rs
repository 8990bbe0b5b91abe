//! Wayland backend on top of `wayland-client`.
//!
//! Windows are `xdg_toplevel`s with a solid shm background. Decorations come
//! from the compositor when `zxdg_decoration_manager_v1` is offered and are
//! drawn as sub-surfaces otherwise. Key repeat runs client-side off the
//! compositor's rate and delay; the event pump blocks on the display socket,
//! the wake pipe and the soonest repeat or cursor-animation deadline.

mod backend;
pub mod buffer;
pub mod configure;
mod cursor;
pub mod decor;
mod dispatch;
pub mod keymap;
pub mod offer;
pub mod repeat;
mod state;
pub mod translate;
mod window;

pub use backend::WaylandBackend;
