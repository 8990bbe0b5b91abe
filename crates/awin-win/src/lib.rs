//! Win32 backend.
//!
//! The translator and scancode table are plain Rust and build everywhere;
//! the native glue is only compiled on Windows.

pub mod keymap;
pub mod translate;

#[cfg(windows)]
mod backend;
#[cfg(windows)]
mod clipboard;
#[cfg(windows)]
mod cursor;
#[cfg(windows)]
pub mod dialog;
#[cfg(windows)]
mod monitor;
#[cfg(windows)]
mod window;

#[cfg(windows)]
pub use backend::Win32Backend;
#[cfg(windows)]
pub use dialog::Win32Dialogs;
