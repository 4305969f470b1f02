//! Compilation configuration.
//!
//! The embedding host hands `compile` a raw key/value multimap; keys may
//! repeat, and iteration order is the sorted key order of the map. The
//! map is validated into a [`Config`] before any source is read, so a
//! missing required option is reported without touching the filesystem.

use std::collections::BTreeMap;

use thiserror::Error;

/// The raw configuration multimap passed across the compile boundary.
pub type ConfigMap = BTreeMap<String, Vec<String>>;

/// Errors raised while resolving a [`ConfigMap`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// A required option has no value in the map.
    #[error("required config option '{0}' is missing")]
    MissingOption(&'static str),
}

/// Validated configuration for one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Output artifact paths, one per configured backend target.
    pub targets: Vec<String>,
}

impl Config {
    /// Validate a raw multimap into a configuration.
    pub fn resolve(map: &ConfigMap) -> Result<Self, ConfigError> {
        let targets: Vec<String> = map
            .get("targets")
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        if targets.is_empty() {
            return Err(ConfigError::MissingOption("targets"));
        }
        Ok(Self { targets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_targets_required() {
        let map = ConfigMap::new();
        assert!(matches!(
            Config::resolve(&map),
            Err(ConfigError::MissingOption("targets"))
        ));
    }

    #[test]
    fn test_repeated_values_accumulate() {
        let mut map = ConfigMap::new();
        map.insert(
            "targets".to_string(),
            vec!["a.qvm".to_string(), "b.qvm".to_string()],
        );
        let config = Config::resolve(&map).unwrap();
        assert_eq!(config.targets, ["a.qvm", "b.qvm"]);
    }

    #[test]
    fn test_empty_value_list_is_missing() {
        let mut map = ConfigMap::new();
        map.insert("targets".to_string(), vec![]);
        assert!(Config::resolve(&map).is_err());
    }
}
