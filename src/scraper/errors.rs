/// Scraper errors.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScraperError {
    /// The page could not be downloaded
    #[error("Connection failed: {0}")]
    Connection(String),

    /// `extract` without reparse on a scraper that already holds a page
    #[error("Already connected: disconnect first")]
    AlreadyConnected,

    /// The downloaded page is not what the plugin expects
    #[error("Parse error: {0}")]
    Parse(String),

    /// No plugin registered under the requested name
    #[error("Scraper not found: {0}")]
    NotFound(String),
}

impl ScraperError {
    /// `AlreadyConnected` is a kind of connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, ScraperError::Connection(_) | ScraperError::AlreadyConnected)
    }
}
