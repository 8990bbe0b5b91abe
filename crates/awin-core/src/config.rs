//! Platform and window configuration, loadable from TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flags::WindowFlags;
use crate::geometry::Point;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    #[default]
    Auto,
    Win32,
    X11,
    Wayland,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub backend: BackendPreference,
    pub log_filter: Option<String>,
    pub app_id: String,
    pub cursor_theme: Option<String>,
    pub cursor_size: u32,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            log_filter: None,
            app_id: "awin".into(),
            cursor_theme: None,
            cursor_size: 24,
        }
    }
}

impl PlatformConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub size: Point,
    pub position: Option<Point>,
    /// Minimum client size; `(0, 0)` leaves the window unconstrained.
    pub resize_limit: Point,
    pub resizable: bool,
    pub decorated: bool,
    pub hidden: bool,
    pub fullscreen: bool,
    pub maximized: bool,
    /// Fill colour for backends that must attach a buffer before a surface
    /// is mapped. `None` leaves content entirely to the application.
    pub background: Option<[u8; 4]>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "awin".into(),
            size: Point::new(640, 480),
            position: None,
            resize_limit: Point::ZERO,
            resizable: true,
            decorated: true,
            hidden: false,
            fullscreen: false,
            maximized: false,
            background: Some([30, 30, 36, 255]),
        }
    }
}

impl WindowConfig {
    pub fn new(title: impl Into<String>, width: i32, height: i32) -> Self {
        Self {
            title: title.into(),
            size: Point::new(width, height),
            ..Self::default()
        }
    }

    pub fn with_resize_limit(mut self, width: i32, height: i32) -> Self {
        self.resize_limit = Point::new(width, height);
        self
    }

    /// Flags a freshly created window starts with. Fullscreen and maximized
    /// are requests that only become flags once a backend confirms them.
    pub fn initial_flags(&self) -> WindowFlags {
        let mut flags = WindowFlags::HIDDEN;
        flags.set(WindowFlags::RESIZABLE, self.resizable);
        flags.set(WindowFlags::DECORATED, self.decorated);
        flags
    }

    /// Requested size, never below the resize limit.
    pub fn clamped_size(&self) -> Point {
        self.size.max(self.resize_limit).max(Point::ONE)
    }
}

pub fn read_toml<T>(path: &Path) -> Result<T, ConfigError>
where
    T: for<'de> Deserialize<'de>,
{
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}
