use crate::core::{FundError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable overriding the configured database.
pub const DATABASE_ENV: &str = "FUNDLEDGER_DATABASE";

pub const DEFAULT_DATABASE: &str = "fundledger.db";

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database-related configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
    /// SQL used to create an empty database instead of the bundled schema
    pub schema: Option<PathBuf>,
    pub foreign_keys: Option<bool>,
    /// File the SQL of every committed change is appended to
    pub dump: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// 0 (quiet) to 4 (debug)
    pub verbose: Option<u8>,
    pub file: Option<PathBuf>,
}

impl Config {
    /// Database to open: `FUNDLEDGER_DATABASE` when set, then the
    /// configured path, then `fundledger.db`.
    pub fn database_path(&self, env: Option<String>) -> PathBuf {
        env.filter(|value| !value.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.database.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE))
    }

    /// Schema text for new databases, read from the configured file.
    pub fn schema(&self) -> Result<Option<String>> {
        match &self.database.schema {
            Some(path) => Ok(Some(fs::read_to_string(path).map_err(|e| {
                FundError::Config(format!("Cannot read schema {}: {}", path.display(), e))
            })?)),
            None => Ok(None),
        }
    }
}

/// `<config dir>/fundledger/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fundledger").join("config.toml"))
}

/// Loads configuration from a TOML file at the given path.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| {
        FundError::Config(format!("Cannot read {}: {}", path.as_ref().display(), e))
    })?;
    Ok(toml::from_str(&content)?)
}

/// Loads `explicit`, which must exist, or else the default file when there
/// is one.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    match default_config_path() {
        Some(path) if path.is_file() => {
            debug!("Loading configuration from {}", path.display());
            load_config(path)
        }
        _ => Ok(Config::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE_CONFIG: &str = r#"
[database]
path = "/var/lib/funds.db"
foreign_keys = false
dump = "changes.sql"

[logging]
verbose = 3
file = "fundledger.log"
"#;

    #[test]
    fn test_load_config_from_str() {
        let config: Config = toml::from_str(SAMPLE_CONFIG).expect("Failed to parse sample config");
        assert_eq!(config.database.path, Some(PathBuf::from("/var/lib/funds.db")));
        assert_eq!(config.database.foreign_keys, Some(false));
        assert_eq!(config.database.schema, None);
        assert_eq!(config.logging.verbose, Some(3));
        assert_eq!(config.logging.file, Some(PathBuf::from("fundledger.log")));
    }

    #[test]
    fn test_database_path_precedence() {
        let config: Config = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.database_path(None), PathBuf::from("/var/lib/funds.db"));
        assert_eq!(config.database_path(Some("env.db".into())), PathBuf::from("env.db"));
        assert_eq!(Config::default().database_path(Some(String::new())), PathBuf::from(DEFAULT_DATABASE));
    }

    #[test]
    fn test_load_config_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[logging]\nverbose = 4\n").unwrap();
        let config = load(Some(file.path())).unwrap();
        assert_eq!(config.logging.verbose, Some(4));
        assert_eq!(config.database.path, None);

        file.write_all(b"[ui]\ntheme = \"dark\"\n").unwrap();
        assert!(matches!(load_config(file.path()), Err(FundError::Toml(_))));
        assert!(matches!(
            load(Some(Path::new("/nonexistent/fundledger.toml"))),
            Err(FundError::Config(_))
        ));
    }
}
