use std::path::Path;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

/// Environment prefix for overrides, e.g. `MODKIT_PERMISSIONS_PLAN_CACHE_CAPACITY`.
pub const ENV_PREFIX: &str = "MODKIT_PERMISSIONS_";

/// Settings of the permission engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PermissionsConfig {
    /// Maximum number of `(route, permission)` resolution plans kept.
    pub plan_cache_capacity: usize,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            plan_cache_capacity: 1024,
        }
    }
}

impl PermissionsConfig {
    /// Provider chain seeded with the defaults.
    #[must_use]
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
    }

    /// Parses YAML, then applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns the figment error when the YAML is malformed, contains unknown
    /// keys or holds values of the wrong type.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, figment::Error> {
        Self::figment()
            .merge(Yaml::string(yaml))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
    }

    /// Reads a YAML file, then applies environment overrides.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Same as [`PermissionsConfig::from_yaml_str`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, figment::Error> {
        Self::figment()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml() {
        let yaml = "plan_cache_capacity: 64\n";
        let parsed: Result<PermissionsConfig, _> = serde_saphyr::from_str(yaml);
        let cfg = match parsed {
            Ok(cfg) => cfg,
            Err(e) => panic!("failed to parse config: {e}"),
        };
        assert_eq!(cfg.plan_cache_capacity, 64);
    }

    #[test]
    fn empty_yaml_uses_defaults() {
        let parsed: Result<PermissionsConfig, _> = serde_saphyr::from_str("{}");
        let cfg = match parsed {
            Ok(cfg) => cfg,
            Err(e) => panic!("failed to parse config: {e}"),
        };
        assert_eq!(cfg, PermissionsConfig::default());
    }

    #[test]
    fn rejects_unknown_fields() {
        let parsed: Result<PermissionsConfig, _> = serde_saphyr::from_str("plan_cache_size: 1\n");
        assert!(parsed.is_err());
    }

    #[test]
    fn figment_layers_yaml_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("permissions.yaml", "plan_cache_capacity: 8")?;
            assert_eq!(PermissionsConfig::load("permissions.yaml")?.plan_cache_capacity, 8);
            assert_eq!(PermissionsConfig::load("absent.yaml")?, PermissionsConfig::default());

            jail.set_env("MODKIT_PERMISSIONS_PLAN_CACHE_CAPACITY", "16");
            assert_eq!(PermissionsConfig::load("permissions.yaml")?.plan_cache_capacity, 16);
            Ok(())
        });
    }

    #[test]
    fn figment_reports_bad_values() {
        assert!(PermissionsConfig::from_yaml_str("plan_cache_capacity: lots").is_err());
    }
}
