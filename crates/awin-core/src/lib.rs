//! awin core: backend-agnostic window state, canonical events and the shared
//! transitions every event translator funnels its notifications through.

pub mod config;
pub mod cursor;
pub mod deadline;
pub mod event;
pub mod flags;
pub mod geometry;
pub mod key;
pub mod registry;
pub mod state;

pub use config::{BackendPreference, ConfigError, PlatformConfig, WindowConfig};
pub use cursor::{Cursor, CursorImage, CursorShape, CursorSource};
pub use deadline::GlobalTimeout;
pub use event::{Event, EventKind, WindowId};
pub use flags::{Mods, WindowFlags};
pub use geometry::{Point, PointF, Rect};
pub use hit_test::{hit_test, HitRegion, BORDER_WIDTH, CAPTION_HEIGHT};
pub use key::{Action, Key, KeyState, MouseButton};
pub use registry::{EventDispatchRegistry, Listener, ListenerHandle};
pub use state::WindowState;
