use jsonschema::{validator_for, Validator};
use once_cell::sync::Lazy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Conventional config file name looked up under the project root.
pub const CONFIG_FILE_NAME: &str = "mongen.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Roster tables, relative to the project root.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default = "DataConfig::default_mons")]
    pub mons: String,
    #[serde(default = "DataConfig::default_moves")]
    pub moves: String,
    #[serde(default = "DataConfig::default_abilities")]
    pub abilities: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            mons: Self::default_mons(),
            moves: Self::default_moves(),
            abilities: Self::default_abilities(),
        }
    }
}

impl DataConfig {
    fn default_mons() -> String {
        "drool/mons.csv".into()
    }

    fn default_moves() -> String {
        "drool/moves.csv".into()
    }

    fn default_abilities() -> String {
        "drool/abilities.csv".into()
    }
}

/// Contract language understood by the source analyzer.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    #[default]
    Solidity,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    #[serde(default)]
    pub language: SourceLanguage,
    /// Directory holding one sub-directory of module sources per mon.
    #[serde(default = "SourcesConfig::default_root")]
    pub root: String,
    #[serde(default = "SourcesConfig::default_extension")]
    pub extension: String,
    /// The same directory as `root`, as the generated script imports it.
    #[serde(default = "SourcesConfig::default_import_root")]
    pub import_root: String,
    /// Import prefix inside module sources that climbs out of the mon directory.
    #[serde(default = "SourcesConfig::default_parent_prefix")]
    pub parent_prefix: String,
    /// Replacement for `parent_prefix` in the generated script.
    #[serde(default = "SourcesConfig::default_canonical_root")]
    pub canonical_root: String,
    /// Import namespaces the generated script never re-imports.
    #[serde(default = "SourcesConfig::default_ignored_prefixes")]
    pub ignored_prefixes: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            language: SourceLanguage::default(),
            root: Self::default_root(),
            extension: Self::default_extension(),
            import_root: Self::default_import_root(),
            parent_prefix: Self::default_parent_prefix(),
            canonical_root: Self::default_canonical_root(),
            ignored_prefixes: Self::default_ignored_prefixes(),
        }
    }
}

impl SourcesConfig {
    fn default_root() -> String {
        "src/mons".into()
    }

    fn default_extension() -> String {
        "sol".into()
    }

    fn default_import_root() -> String {
        "../src/mons".into()
    }

    fn default_parent_prefix() -> String {
        "../../".into()
    }

    fn default_canonical_root() -> String {
        "../src/".into()
    }

    fn default_ignored_prefixes() -> Vec<String> {
        vec!["forge-std/".into()]
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(default = "OutputConfig::default_path")]
    pub path: String,
    #[serde(default = "OutputConfig::default_contract_name")]
    pub contract_name: String,
    /// Environment variable holding the registry address at broadcast time.
    #[serde(default = "OutputConfig::default_registry_env")]
    pub registry_env: String,
    /// Stamina used for mons whose table has no `Stamina` value.
    #[serde(default = "OutputConfig::default_stamina")]
    pub default_stamina: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: Self::default_path(),
            contract_name: Self::default_contract_name(),
            registry_env: Self::default_registry_env(),
            default_stamina: Self::default_stamina(),
        }
    }
}

impl OutputConfig {
    const DEFAULT_STAMINA: u32 = 5;

    fn default_path() -> String {
        "script/SetupMons.s.sol".into()
    }

    fn default_contract_name() -> String {
        "SetupMons".into()
    }

    fn default_registry_env() -> String {
        "DEFAULT_MON_REGISTRY".into()
    }

    const fn default_stamina() -> u32 {
        Self::DEFAULT_STAMINA
    }
}

impl Config {
    /// Resolve a config-relative path against the project root.
    pub fn resolve(root: &Path, relative: &str) -> PathBuf {
        let path = Path::new(relative);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

static CONFIG_SCHEMA: Lazy<Validator> = Lazy::new(|| {
    let schema = schemars::schema_for!(Config);
    let schema_value = serde_json::to_value(&schema).expect("schema value");
    validator_for(&schema_value).expect("valid schema")
});

/// Returns the JSON schema describing the configuration structure.
pub fn config_schema_json() -> serde_json::Value {
    let schema = schemars::schema_for!(Config);
    serde_json::to_value(&schema).expect("schema json")
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, path)
}

fn parse_config(content: &str, path: &Path) -> Result<Config, ConfigError> {
    let parse_err = |source: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    };
    let raw: toml::Table = toml::from_str(content).map_err(parse_err)?;
    let json_value = serde_json::to_value(&raw).map_err(|err| ConfigError::Invalid {
        path: path.to_path_buf(),
        issues: vec![err.to_string()],
    })?;
    let issues: Vec<_> = CONFIG_SCHEMA
        .iter_errors(&json_value)
        .map(|e| e.to_string())
        .collect();
    if !issues.is_empty() {
        return Err(ConfigError::Invalid {
            path: path.to_path_buf(),
            issues,
        });
    }
    toml::from_str(content).map_err(parse_err)
}

/// Load `path` when given, else `<root>/mongen.toml` when present, else defaults.
pub fn discover_config(root: &Path, path: Option<&Path>) -> Result<Config, ConfigError> {
    if let Some(path) = path {
        return load_config(path);
    }
    let candidate = root.join(CONFIG_FILE_NAME);
    if candidate.is_file() {
        load_config(&candidate)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = parse_config("", Path::new("mongen.toml")).expect("parse");
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.output.default_stamina, 5);
        assert_eq!(cfg.sources.ignored_prefixes, vec!["forge-std/".to_string()]);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = parse_config(
            "[output]\ncontract_name = \"SetupRoster\"\n[sources]\nroot = \"contracts/mons\"\n",
            Path::new("mongen.toml"),
        )
        .expect("parse");
        assert_eq!(cfg.output.contract_name, "SetupRoster");
        assert_eq!(cfg.output.path, "script/SetupMons.s.sol");
        assert_eq!(cfg.sources.root, "contracts/mons");
        assert_eq!(cfg.sources.extension, "sol");
    }

    #[test]
    fn schema_rejects_wrong_types() {
        let err = parse_config(
            "[output]\ndefault_stamina = \"lots\"\n",
            Path::new("mongen.toml"),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got {err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_config("[output]\ncontract = \"X\"\n", Path::new("mongen.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }), "got {err}");
    }

    #[test]
    fn discover_prefers_file_under_root() {
        let tmp = tempdir().unwrap();
        assert_eq!(
            discover_config(tmp.path(), None).unwrap(),
            Config::default()
        );
        std::fs::write(
            tmp.path().join(CONFIG_FILE_NAME),
            "[data]\nmons = \"tables/mons.csv\"\n",
        )
        .unwrap();
        let cfg = discover_config(tmp.path(), None).unwrap();
        assert_eq!(cfg.data.mons, "tables/mons.csv");
    }

    #[test]
    fn schema_json_lists_sections() {
        let schema = config_schema_json();
        let props = schema
            .get("properties")
            .and_then(|v| v.as_object())
            .expect("properties");
        assert!(props.contains_key("data"));
        assert!(props.contains_key("sources"));
        assert!(props.contains_key("output"));
    }
}
