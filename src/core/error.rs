/// Fundledger Error Module
///
/// Application-level error type. Database failures keep their taxonomy kind
/// (see `core::db::DbError`) and are wrapped transparently so callers can
/// still match on the kind; everything else gets its own variant.
use crate::core::db::DbError;
use crate::scraper::ScraperError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FundError {
    /// Errors from the register layer and the SQLite driver
    #[error(transparent)]
    Database(#[from] DbError),

    /// Wrong arguments when building a record (arity, unknown field names)
    #[error("Type error: {0}")]
    Type(String),

    /// A record type cannot be attached under a name already in use
    #[error("Name conflict: {0}")]
    NameConflict(String),

    /// Lookup attempted on a record with no connector behind it
    #[error("Detached record: {0}")]
    Detached(String),

    /// Quote scraping failures
    #[error("Scraper error: {0}")]
    Scraper(#[from] ScraperError),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command line validation errors
    #[error("Command error: {0}")]
    Command(String),

    /// Malformed input lines
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl FundError {
    /// Database error kind carried by this error, if any.
    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            FundError::Database(e) => Some(e),
            _ => None,
        }
    }
}

/// Type alias for Result to use FundError as the error type.
pub type Result<T> = std::result::Result<T, FundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let db_err = FundError::Database(DbError::Integrity("UNIQUE constraint failed".into()));
        assert_eq!(db_err.to_string(), "Integrity error: UNIQUE constraint failed");

        let type_err = FundError::Type("missing field".to_string());
        assert!(type_err.to_string().contains("Type error"));

        let config_err = FundError::Config("Invalid config".to_string());
        assert!(config_err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let fund_err: FundError = io_err.into();
        match fund_err {
            FundError::Io(_) => {}
            _ => panic!("Expected IO error"),
        }

        let db_err: FundError = DbError::Transaction("no session".into()).into();
        assert_eq!(db_err.db_error().map(DbError::kind), Some("TransactionError"));

        let json_err: std::result::Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("{ invalid json }");
        match FundError::from(json_err.unwrap_err()) {
            FundError::Json(_) => {}
            _ => panic!("Expected JSON error"),
        }
    }
}
