use std::io::ErrorKind;
use std::path::Path;

use awin::{PlatformConfig, WindowConfig};
use awin_core::config::{read_toml, ConfigError};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub platform: PlatformConfig,
    #[serde(rename = "window")]
    pub windows: Vec<WindowConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            windows: vec![WindowConfig::new("Test Window", 640, 480).with_resize_limit(500, 400)],
        }
    }
}

impl AppConfig {
    /// A missing file yields the defaults; a broken one is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match read_toml::<AppConfig>(path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use awin::{BackendPreference, Point};

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load(Path::new("/nonexistent/awin.toml")).unwrap();
        assert_eq!(config.platform.backend, BackendPreference::Auto);
        assert_eq!(config.windows.len(), 1);
        assert_eq!(config.windows[0].resize_limit, Point::new(500, 400));
    }

    #[test]
    fn test_window_tables() {
        let config = AppConfig::from_toml_str(
            r#"
            [platform]
            backend = "wayland"
            log_filter = "awin=debug"

            [[window]]
            title = "one"
            size = [800, 600]

            [[window]]
            title = "two"
            decorated = false
            "#,
        )
        .unwrap();
        assert_eq!(config.platform.backend, BackendPreference::Wayland);
        assert_eq!(config.platform.log_filter.as_deref(), Some("awin=debug"));
        assert_eq!(config.windows.len(), 2);
        assert_eq!(config.windows[0].size, Point::new(800, 600));
        assert!(!config.windows[1].decorated);
        assert!(config.windows[1].resizable);
    }

    #[test]
    fn test_empty_window_list_is_kept() {
        let config = AppConfig::from_toml_str("window = []").unwrap();
        assert!(config.windows.is_empty());
    }
}
