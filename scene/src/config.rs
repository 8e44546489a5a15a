//! Configuration types for scene backends

use crate::error::SceneError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// First id handed out to local (non-replicated) entities
pub const DEFAULT_LOCAL_ID_BASE: u32 = 0x8000_0000;
/// Prefix of native component type names in their prefixed form
pub const DEFAULT_NATIVE_COMPONENT_PREFIX: &str = "EC_";
/// Prefix of markup component tags in their prefixed form
pub const DEFAULT_MARKUP_COMPONENT_PREFIX: &str = "xml3d:";

/// Settings shared by every backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Viewport size in pixels used to turn raycast coordinates into rays
    pub viewport_width: u32,
    pub viewport_height: u32,

    /// Vertical field of view in degrees for cameras that do not specify one
    pub default_vertical_fov: f32,

    /// First id assigned to local entities; replicated ids start at 1
    pub local_id_base: u32,

    /// Component name prefixes accepted and produced by each backend
    pub native_component_prefix: String,
    pub markup_component_prefix: String,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280,
            viewport_height: 720,
            default_vertical_fov: 45.0,
            local_id_base: DEFAULT_LOCAL_ID_BASE,
            native_component_prefix: DEFAULT_NATIVE_COMPONENT_PREFIX.to_string(),
            markup_component_prefix: DEFAULT_MARKUP_COMPONENT_PREFIX.to_string(),
        }
    }
}

impl SceneConfig {
    pub fn viewport(&self) -> (u32, u32) {
        (self.viewport_width, self.viewport_height)
    }

    /// Set the viewport size
    pub fn with_viewport(mut self, width: u32, height: u32) -> Self {
        debug!(width, height, "Configured viewport size");
        self.viewport_width = width;
        self.viewport_height = height;
        self
    }

    /// Load configuration from a JSON file; missing fields take defaults
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, SceneError> {
        let content = std::fs::read_to_string(&path)?;
        let config = serde_json::from_str(&content)?;
        info!("Loaded scene config from {:?}", path.as_ref());
        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), SceneError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        info!("Saved scene config to {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = SceneConfig::default();
        assert_eq!(config.viewport(), (1280, 720));
        assert_eq!(config.local_id_base, 0x8000_0000);
    }

    #[test]
    fn test_save_load_config() {
        let config = SceneConfig::default().with_viewport(640, 480);

        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        config.save_to(temp_file.path()).expect("Failed to save config");

        let loaded = SceneConfig::load_from(temp_file.path()).expect("Failed to load config");
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SceneConfig = serde_json::from_str(r#"{"viewport_width": 320}"#).unwrap();
        assert_eq!(config.viewport(), (320, 720));
        assert_eq!(config.default_vertical_fov, 45.0);
        assert_eq!(config.native_component_prefix, "EC_");
        assert_eq!(config.markup_component_prefix, "xml3d:");
    }

    #[test]
    fn test_invalid_json_is_error() {
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        std::fs::write(temp_file.path(), "{ invalid json }").expect("Failed to write file");
        assert!(matches!(
            SceneConfig::load_from(temp_file.path()),
            Err(SceneError::Json(_))
        ));
    }
}
