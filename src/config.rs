use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::columns::{DEFAULT_SCHEMA_VERSION, SchemaMapping, mapping_for};
use crate::error::IngestError;

pub const CONFIG_FILE: &str = "bedocc.json";
pub const DATABASE_FILE: &str = "bed-occupancy.sqlite";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub summary_dir: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub mapping: &'static SchemaMapping,
    pub database: Utf8PathBuf,
    pub summary_dir: Option<Utf8PathBuf>,
}

impl ResolvedConfig {
    pub fn with_database(mut self, database: Option<&str>) -> Self {
        if let Some(database) = database.filter(|value| !value.trim().is_empty()) {
            self.database = Utf8PathBuf::from(database.trim());
        }
        self
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, IngestError> {
        match Self::load(path) {
            Ok(config) => Self::resolve_config(config),
            Err(IngestError::MissingConfig) => Self::resolve_config(Config::default()),
            Err(err) => Err(err),
        }
    }

    pub fn load(path: Option<&str>) -> Result<Config, IngestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(IngestError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| IngestError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| IngestError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, IngestError> {
        let mapping = mapping_for(
            config
                .schema_version
                .as_deref()
                .unwrap_or(DEFAULT_SCHEMA_VERSION),
        )?;

        let database = match config.database.filter(|value| !value.trim().is_empty()) {
            Some(database) => Utf8PathBuf::from(database.trim()),
            None => default_database_path(),
        };

        Ok(ResolvedConfig {
            mapping,
            database,
            summary_dir: config
                .summary_dir
                .filter(|value| !value.trim().is_empty())
                .map(|value| Utf8PathBuf::from(value.trim())),
        })
    }
}

pub fn default_database_path() -> Utf8PathBuf {
    ProjectDirs::from("uk", "nhs", "bedocc")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join(DATABASE_FILE)).ok())
        .unwrap_or_else(|| Utf8PathBuf::from(DATABASE_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_values_are_kept() {
        let config = Config {
            schema_version: Some("kh03-v1".to_string()),
            database: Some("data/beds.sqlite".to_string()),
            summary_dir: Some("runs".to_string()),
        };

        let resolved = ConfigLoader::resolve_config(config).unwrap();
        assert_eq!(resolved.mapping.version, "kh03-v1");
        assert_eq!(resolved.database, Utf8PathBuf::from("data/beds.sqlite"));
        assert_eq!(resolved.summary_dir, Some(Utf8PathBuf::from("runs")));
    }

    #[test]
    fn cli_database_overrides_file() {
        let config = Config {
            database: Some("file.sqlite".to_string()),
            ..Config::default()
        };
        let resolved = ConfigLoader::resolve_config(config)
            .unwrap()
            .with_database(Some("cli.sqlite"));
        assert_eq!(resolved.database, Utf8PathBuf::from("cli.sqlite"));
    }
}
