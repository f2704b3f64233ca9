//! Configuration system
//!
//! TOML-backed settings with typed defaults. Settings files are optional;
//! `RenderSettings::default()` matches the engine's built-in constants.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),
}

/// Renderer settings
///
/// Bake dimensions must be at least 2 so the prefiltered map has a defined
/// roughness chain; the generator validates this at configure time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Directory containing the compiled SPIR-V shaders
    pub shader_dir: PathBuf,
    /// Base face resolution of the irradiance cubemap
    pub irradiance_dimension: u32,
    /// Base face resolution of the prefiltered environment cubemap
    pub prefiltered_dimension: u32,
    /// Importance samples per texel in the prefilter pass
    pub prefilter_sample_count: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders/cubemap"),
            irradiance_dimension: 64,
            prefiltered_dimension: 512,
            prefilter_sample_count: 32,
        }
    }
}

impl RenderSettings {
    /// Load settings from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save settings to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_match_engine_constants() {
        let settings = RenderSettings::default();
        assert_eq!(settings.irradiance_dimension, 64);
        assert_eq!(settings.prefiltered_dimension, 512);
        assert_eq!(settings.prefilter_sample_count, 32);
        assert_eq!(settings.shader_dir, PathBuf::from("shaders/cubemap"));
    }

    #[test]
    fn test_settings_toml_round_trip() {
        let settings = RenderSettings {
            shader_dir: PathBuf::from("assets/shaders"),
            irradiance_dimension: 32,
            prefiltered_dimension: 256,
            prefilter_sample_count: 64,
        };

        let toml_text = toml::to_string_pretty(&settings).unwrap();
        let parsed: RenderSettings = toml::from_str(&toml_text).unwrap();

        assert_eq!(parsed.shader_dir, settings.shader_dir);
        assert_eq!(parsed.irradiance_dimension, 32);
        assert_eq!(parsed.prefiltered_dimension, 256);
        assert_eq!(parsed.prefilter_sample_count, 64);
    }

    #[test]
    fn test_partial_toml_is_a_parse_error() {
        // Settings files are explicit; missing fields do not silently default.
        let result: Result<RenderSettings, _> = toml::from_str("irradiance_dimension = 64");
        assert!(result.is_err());
    }
}
