//! Editor settings management
//!
//! Persistent user preferences for the editor views and the default scene
//! template.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Main editor settings structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorSettings {
    /// Inspector presentation options
    #[serde(default)]
    pub inspector: InspectorSettings,

    /// Hierarchy presentation options
    #[serde(default)]
    pub hierarchy: HierarchySettings,

    /// Settings version for future migration support
    #[serde(default)]
    pub version: u32,
}

/// Inspector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InspectorSettings {
    /// Show the implicit per-entity component as its own section
    pub show_fixed_component: bool,
    /// Show component type names in their human-readable form
    pub human_readable_names: bool,
}

/// Hierarchy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchySettings {
    /// Include local (non-replicated) entities
    pub show_local_entities: bool,
    /// Include entities flagged temporary
    pub show_temporary_entities: bool,
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self {
            inspector: InspectorSettings::default(),
            hierarchy: HierarchySettings::default(),
            version: 1,
        }
    }
}

impl Default for InspectorSettings {
    fn default() -> Self {
        Self {
            show_fixed_component: true,
            human_readable_names: true,
        }
    }
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self {
            show_local_entities: true,
            show_temporary_entities: true,
        }
    }
}

impl EditorSettings {
    /// Get the default path for the settings file
    pub fn default_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("editor_settings.json")
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to(Self::default_path())
    }

    /// Load settings from the default location
    pub fn load() -> Result<Self, Box<dyn std::error::Error>> {
        Self::load_or_default(Self::default_path())
    }

    /// Load settings from `path`, using defaults if the file is missing or unreadable JSON
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let path = path.as_ref();
        if !path.exists() {
            info!("No settings file found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Self>(&content) {
            Ok(settings) => {
                info!("Loaded editor settings from {:?}", path);
                Ok(settings)
            }
            Err(e) => {
                warn!("Failed to parse settings file: {}. Using defaults.", e);
                Ok(Self::default())
            }
        }
    }

    /// Save settings to a specific path
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json)?;
        info!("Saved editor settings to {:?}", path.as_ref());
        Ok(())
    }

    /// Load settings from a specific path
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(&path)?;
        let settings = serde_json::from_str(&content)?;
        info!("Loaded editor settings from {:?}", path.as_ref());
        Ok(settings)
    }
}
