//! Configuration management for graphmap.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (GRAPHMAP_ prefix, `__` separator)
//! 2. Config file (graphmap.toml, or a caller-chosen prefix)
//! 3. Defaults

use serde::Deserialize;

use crate::entity::DEFAULT_FIELD_MAX_DEPTH;
use crate::traversal::DEFAULT_MAX_DEPTH;

/// Neo4j connection settings (`[neo4j]`).
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Neo4jSettings {
    #[serde(default = "default_uri")]
    pub uri: String,

    #[serde(default = "default_user")]
    pub user: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

/// Traversal bounds (`[mapping]`).
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct MappingSettings {
    /// Global depth ceiling for read cascades; negative = unbounded.
    #[serde(default = "default_max_depth")]
    pub max_depth: i32,

    /// Per-field ceiling applied to descriptors built without one.
    #[serde(default = "default_field_max_depth")]
    pub default_field_max_depth: i32,
}

/// Top-level settings.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub neo4j: Neo4jSettings,

    #[serde(default)]
    pub mapping: MappingSettings,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_max_depth() -> i32 {
    DEFAULT_MAX_DEPTH
}

fn default_field_max_depth() -> i32 {
    DEFAULT_FIELD_MAX_DEPTH
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: String::new(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            default_field_max_depth: default_field_max_depth(),
        }
    }
}

impl Settings {
    /// Load from `<file_prefix>.toml` (optional) and `GRAPHMAP__*` variables.
    pub fn load(file_prefix: &str) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("GRAPHMAP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        cfg.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.neo4j.uri, "bolt://localhost:7687");
        assert_eq!(settings.neo4j.user, "neo4j");
        assert_eq!(settings.neo4j.max_connections, 16);
        assert_eq!(settings.mapping.max_depth, 5);
        assert_eq!(settings.mapping.default_field_max_depth, 3);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let cfg = config::Config::builder()
            .add_source(config::File::from_str(
                "[mapping]\nmax_depth = 2\n[neo4j]\nuri = \"bolt://graph:7687\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let settings: Settings = cfg.try_deserialize().unwrap();
        assert_eq!(settings.mapping.max_depth, 2);
        assert_eq!(settings.mapping.default_field_max_depth, 3);
        assert_eq!(settings.neo4j.uri, "bolt://graph:7687");
        assert_eq!(settings.neo4j.fetch_size, 256);
    }
}
