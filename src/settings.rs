//! Persistent build and traversal settings

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::bvh::{BuildOptions, TextureLimits};
use crate::util::{Error, Result};

/// Overrides `max_leaf_size` when set.
pub const ENV_MAX_LEAF_SIZE: &str = "MOLRAY_MAX_LEAF_SIZE";
/// Overrides `max_depth` when set.
pub const ENV_MAX_DEPTH: &str = "MOLRAY_MAX_DEPTH";

/// How CPU queries find their primitives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalMode {
    /// Walk the in-memory tree.
    #[default]
    Bvh,
    /// Walk the flattened records, decoding them like the GPU kernel.
    Flattened,
    /// Test every primitive.
    BruteForce,
}

/// Settings shared by the builder, the texture packer and the picker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Builder
    pub max_leaf_size: usize,
    pub max_depth: usize,

    // Texture packing
    pub max_texture_size: usize,
    pub preferred_row_width: usize,

    // Picking
    pub traversal: TraversalMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_leaf_size: 4,
            max_depth: 32,
            max_texture_size: 4096,
            preferred_row_width: 2048,
            traversal: TraversalMode::Bvh,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let settings: Self = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or bad
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "using default settings");
                Self::default()
            }
        }
    }

    /// Save settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject values no layout can satisfy
    pub fn validate(&self) -> Result<()> {
        if self.max_texture_size == 0 {
            return Err(Error::settings("max_texture_size must be non-zero"));
        }
        if self.preferred_row_width == 0 {
            return Err(Error::settings("preferred_row_width must be non-zero"));
        }
        Ok(())
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            max_leaf_size: self.max_leaf_size,
            max_depth: self.max_depth,
        }
    }

    pub fn texture_limits(&self) -> TextureLimits {
        TextureLimits {
            max_dim: self.max_texture_size,
            preferred_width: self.preferred_row_width,
        }
    }

    /// Apply `MOLRAY_*` environment overrides
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparsable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let targets = [
            (ENV_MAX_LEAF_SIZE, &mut self.max_leaf_size),
            (ENV_MAX_DEPTH, &mut self.max_depth),
        ];
        for (key, field) in targets {
            let Some(raw) = lookup(key) else { continue };
            match raw.trim().parse::<usize>() {
                Ok(value) => {
                    tracing::debug!(key, value, "settings override");
                    *field = value;
                }
                Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable override"),
            }
        }
    }
}
