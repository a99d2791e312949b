//! Injector configuration, loaded from TOML and overridden by environment variables.

use std::collections::HashMap;
use std::str::FromStr;
use std::{env, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const ENV_STAGE: &str = "BINDERY_STAGE";
pub const ENV_REQUIRE_EXPLICIT_BINDINGS: &str = "BINDERY_REQUIRE_EXPLICIT_BINDINGS";
pub const ENV_EAGER_SINGLETONS: &str = "BINDERY_EAGER_SINGLETONS";
pub const ENV_MAX_RESOLUTION_DEPTH: &str = "BINDERY_MAX_RESOLUTION_DEPTH";

const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 256;

/// Lifecycle stage the injector is created for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Tooling only inspects bindings; eager singletons are not initialised
    Tool,
    #[default]
    Development,
    /// Every singleton is initialised while the injector is built
    Production,
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tool" => Ok(Stage::Tool),
            "development" | "dev" => Ok(Stage::Development),
            "production" | "prod" => Ok(Stage::Production),
            _ => Err(ConfigError::InvalidValue {
                field: "stage".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

/// Injector configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InjectorConfig {
    pub stage: Stage,
    /// Disable just-in-time constructor bindings for unbound types
    pub require_explicit_bindings: bool,
    /// Initialise eager singletons while building (ignored in `Stage::Tool`)
    pub eager_singletons: bool,
    /// Upper bound on nested resolutions, guards provider cycles
    pub max_resolution_depth: usize,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            stage: Stage::Development,
            require_explicit_bindings: false,
            eager_singletons: true,
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
        }
    }
}

/// Partial configuration as it appears in a TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialInjectorConfig {
    pub stage: Option<Stage>,
    pub require_explicit_bindings: Option<bool>,
    pub eager_singletons: Option<bool>,
    pub max_resolution_depth: Option<usize>,
}

impl InjectorConfig {
    pub fn for_stage(stage: Stage) -> Self {
        Self {
            stage,
            ..Self::default()
        }
    }

    /// Parse a TOML document, without environment overrides
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let partial: PartialInjectorConfig = toml::from_str(content)
            .map_err(|e| ConfigError::TomlParse("<inline>".to_string(), e))?;
        Self::from_partial_and_env(Some(partial), &HashMap::new())
    }

    /// Load a TOML file and apply `BINDERY_*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = fs::read_to_string(path).map_err(|e| ConfigError::FileRead(display.clone(), e))?;
        let partial: PartialInjectorConfig =
            toml::from_str(&content).map_err(|e| ConfigError::TomlParse(display, e))?;
        Self::from_partial_and_env(Some(partial), &collect_env_vars())
    }

    /// Defaults plus `BINDERY_*` environment overrides
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_partial_and_env(None, &collect_env_vars())
    }

    /// Merge file values and environment values; the environment wins
    pub fn from_partial_and_env(
        partial: Option<PartialInjectorConfig>,
        env_map: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let partial = partial.unwrap_or_default();
        let defaults = Self::default();

        let stage = match env_map.get(ENV_STAGE) {
            Some(value) => value.parse()?,
            None => partial.stage.unwrap_or(defaults.stage),
        };
        let require_explicit_bindings = match env_map.get(ENV_REQUIRE_EXPLICIT_BINDINGS) {
            Some(value) => parse_bool(ENV_REQUIRE_EXPLICIT_BINDINGS, value)?,
            None => partial
                .require_explicit_bindings
                .unwrap_or(defaults.require_explicit_bindings),
        };
        let eager_singletons = match env_map.get(ENV_EAGER_SINGLETONS) {
            Some(value) => parse_bool(ENV_EAGER_SINGLETONS, value)?,
            None => partial.eager_singletons.unwrap_or(defaults.eager_singletons),
        };
        let max_resolution_depth = match env_map.get(ENV_MAX_RESOLUTION_DEPTH) {
            Some(value) => value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidValue {
                field: ENV_MAX_RESOLUTION_DEPTH.to_string(),
                value: value.clone(),
            })?,
            None => partial
                .max_resolution_depth
                .unwrap_or(defaults.max_resolution_depth),
        };
        if max_resolution_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_resolution_depth".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            stage,
            require_explicit_bindings,
            eager_singletons,
            max_resolution_depth,
        })
    }

    /// Whether eager singletons are created while the injector is built
    pub fn initializes_eagerly(&self) -> bool {
        self.eager_singletons && self.stage != Stage::Tool
    }
}

fn parse_bool(field: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }),
    }
}

fn collect_env_vars() -> HashMap<String, String> {
    [
        ENV_STAGE,
        ENV_REQUIRE_EXPLICIT_BINDINGS,
        ENV_EAGER_SINGLETONS,
        ENV_MAX_RESOLUTION_DEPTH,
    ]
    .iter()
    .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InjectorConfig::default();
        assert_eq!(config.stage, Stage::Development);
        assert!(!config.require_explicit_bindings);
        assert!(config.initializes_eagerly());
        assert!(!InjectorConfig::for_stage(Stage::Tool).initializes_eagerly());
    }

    #[test]
    fn test_from_toml_str() {
        let config = InjectorConfig::from_toml_str(
            r#"
            stage = "production"
            require_explicit_bindings = true
            "#,
        )
        .unwrap();
        assert_eq!(config.stage, Stage::Production);
        assert!(config.require_explicit_bindings);
        assert_eq!(config.max_resolution_depth, 256);
    }

    #[test]
    fn test_env_overrides_file() {
        let partial = PartialInjectorConfig {
            stage: Some(Stage::Production),
            eager_singletons: Some(true),
            ..Default::default()
        };
        let env_map = HashMap::from([
            (ENV_STAGE.to_string(), "tool".to_string()),
            (ENV_EAGER_SINGLETONS.to_string(), "off".to_string()),
        ]);

        let config = InjectorConfig::from_partial_and_env(Some(partial), &env_map).unwrap();
        assert_eq!(config.stage, Stage::Tool);
        assert!(!config.eager_singletons);
    }

    #[test]
    fn test_invalid_values() {
        let env_map = HashMap::from([(ENV_STAGE.to_string(), "staging".to_string())]);
        assert!(matches!(
            InjectorConfig::from_partial_and_env(None, &env_map),
            Err(ConfigError::InvalidValue { .. })
        ));

        assert!(InjectorConfig::from_toml_str("max_resolution_depth = 0").is_err());
        assert!(matches!(
            InjectorConfig::from_toml_str("stage = 3"),
            Err(ConfigError::TomlParse(..))
        ));
    }
}
