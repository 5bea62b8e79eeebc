use crate::error::ConfigError;
use config::{Config, Environment, File};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

///
/// DatabaseLocation
///
/// Where the relational backend lives. `memory` is the default and keeps
/// every namespace inside one in-process SQLite database.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum DatabaseLocation {
    #[default]
    Memory,
    File(PathBuf),
}

impl<'de> Deserialize<'de> for DatabaseLocation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;

        if raw == ":memory:" || raw == "memory" {
            Ok(Self::Memory)
        } else {
            Ok(Self::File(PathBuf::from(raw)))
        }
    }
}

///
/// EngineConfig
///
/// Process-wide engine configuration, layered from an optional `entrydb`
/// config file and `ENTRYDB_*` environment variables. Currency fields with
/// no declared code fall back to `default_currency`.
///

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub database: DatabaseLocation,
    pub default_currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database: DatabaseLocation::Memory,
            default_currency: "USD".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load layered configuration: file (optional) then environment.
    pub fn load() -> Result<Self, ConfigError> {
        let source = Config::builder()
            .add_source(File::with_name("entrydb").required(false))
            .add_source(Environment::with_prefix("ENTRYDB"))
            .build()?;

        Ok(source.try_deserialize()?)
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::default()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_memory_usd() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.database, DatabaseLocation::Memory);
        assert_eq!(cfg.default_currency, "USD");
    }

    #[test]
    fn database_location_parses_memory_spellings() {
        let loc: DatabaseLocation = serde_json::from_value(serde_json::json!(":memory:")).unwrap();
        assert_eq!(loc, DatabaseLocation::Memory);

        let loc: DatabaseLocation = serde_json::from_value(serde_json::json!("memory")).unwrap();
        assert_eq!(loc, DatabaseLocation::Memory);

        let loc: DatabaseLocation =
            serde_json::from_value(serde_json::json!("/tmp/entrydb.sqlite")).unwrap();
        assert_eq!(loc, DatabaseLocation::File(PathBuf::from("/tmp/entrydb.sqlite")));
    }
}
