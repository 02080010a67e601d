/// Quote Scrapers
///
/// A scraper downloads a page with the net asset values of one fund and
/// parses it into `(date, nav)` pairs. The site-specific parts (URL layout,
/// request headers, page format) live in a `QuotePlugin`; downloading goes
/// through a `Fetch` implementation so it can be replaced in tests.
///
/// ```ignore
/// let plugins = PluginManager::http()?;
/// let mut scraper = plugins.scraper("vinea", "ES0000000001")?;
/// let latest = scraper.quotes()?.next();           // latest NAV
/// scraper.disconnect();
/// scraper.connect(None, Some(30))?;                // the last month
/// let month: Vec<_> = scraper.quotes()?.collect();
/// ```
pub mod errors;
pub mod plugins;

pub use errors::ScraperError;
pub use plugins::PluginManager;

use chrono::{Local, NaiveDate};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, error};

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Quotes parsed from a page, consumed in page order.
pub type Quotes = std::vec::IntoIter<(NaiveDate, f64)>;

/// Site-specific behaviour of a scraper.
pub trait QuotePlugin {
    fn name(&self) -> &'static str;

    fn headers(&self) -> Vec<(&'static str, &'static str)> {
        vec![("User-Agent", "Mozilla/5.0")]
    }

    /// URL with the quotes of `data` between `date - days` and `date`.
    /// Without `date` the latest quote is wanted; `today` resolves relative
    /// requests.
    fn make_url(&self, data: &str, date: Option<NaiveDate>, days: Option<i64>, today: NaiveDate) -> String;

    fn parse(&self, page: &str, content_type: &str) -> Result<Vec<(NaiveDate, f64)>, ScraperError>;
}

/// A downloaded page.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// MIME type without parameters
    pub content_type: String,
    pub body: String,
}

/// Blocking HTTP GET.
pub trait Fetch {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response, ScraperError>;
}

/// `Fetch` over a blocking reqwest client.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, ScraperError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ScraperError::Connection(format!("Cannot create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl Fetch for HttpFetcher {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<Response, ScraperError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request
            .send()
            .map_err(|e| ScraperError::Connection(format!("Unable to connect: {}", e)))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let body = response
            .text()
            .map_err(|e| ScraperError::Connection(format!("Cannot read response: {}", e)))?;

        Ok(Response {
            status,
            content_type,
            body,
        })
    }
}

/// A scraping session for one fund.
pub struct Scraper {
    plugin: Box<dyn QuotePlugin>,
    fetcher: Rc<dyn Fetch>,
    data: String,
    date: Option<NaiveDate>,
    days: Option<i64>,
    page: Option<Response>,
    quotes: Option<Quotes>,
}

impl Scraper {
    pub fn new(plugin: Box<dyn QuotePlugin>, fetcher: Rc<dyn Fetch>, data: &str) -> Self {
        Scraper {
            plugin,
            fetcher,
            data: data.to_string(),
            date: None,
            days: None,
            page: None,
            quotes: None,
        }
    }

    pub fn plugin(&self) -> &'static str {
        self.plugin.name()
    }

    /// What the plugin uses to locate the fund, usually its ISIN.
    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn connected(&self) -> bool {
        self.page.is_some()
    }

    /// Date requested by the last `connect`.
    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    /// Downloads the quotes between `date - days` and `date`. Without a
    /// date the latest quote is fetched.
    pub fn connect(&mut self, date: Option<NaiveDate>, days: Option<i64>) -> Result<(), ScraperError> {
        let url = self
            .plugin
            .make_url(&self.data, date, days, Local::now().date_naive());
        debug!("Connecting to {}", url);

        let response = self.fetcher.get(&url, &self.plugin.headers())?;
        if response.status != 200 {
            let msg = format!("Connection failed with HTTP status {}", response.status);
            error!("{}", msg);
            return Err(ScraperError::Connection(msg));
        }
        debug!(
            "Quotes for {} at {:?} [{} days]",
            self.data,
            date,
            days.unwrap_or(1)
        );
        self.page = Some(response);
        self.quotes = None;
        self.date = date;
        self.days = days;
        Ok(())
    }

    /// Parses the downloaded page, connecting first if needed. Reparsing a
    /// page already downloaded requires `reparse`.
    pub fn extract(&mut self, reparse: bool) -> Result<(), ScraperError> {
        if self.connected() && !reparse {
            error!("A page is already downloaded; disconnect first");
            return Err(ScraperError::AlreadyConnected);
        }
        if !self.connected() {
            self.connect(self.date, self.days)?;
        }
        let page = self
            .page
            .as_ref()
            .ok_or_else(|| ScraperError::Connection("No page downloaded".into()))?;
        match self.plugin.parse(&page.body, &page.content_type) {
            Ok(quotes) => {
                self.quotes = Some(quotes.into_iter());
                Ok(())
            }
            Err(e) => {
                error!("{}", e);
                Err(e)
            }
        }
    }

    /// Parsed quotes. When nothing was extracted yet the page is parsed
    /// now, downloading the latest quote if there is no page.
    pub fn quotes(&mut self) -> Result<&mut Quotes, ScraperError> {
        if self.quotes.is_none() {
            self.extract(true)?;
        }
        self.quotes
            .as_mut()
            .ok_or_else(|| ScraperError::Parse("No quotes extracted".into()))
    }

    /// Forgets the downloaded page and everything derived from it.
    pub fn disconnect(&mut self) {
        self.date = None;
        self.days = None;
        self.page = None;
        self.quotes = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{date, FakeFetcher};

    fn vinea(fetcher: &Rc<FakeFetcher>) -> Scraper {
        let plugins = PluginManager::with_builtin(fetcher.clone());
        plugins.scraper("vinea", "ES0000000001").unwrap()
    }

    #[test]
    fn test_quotes_connect_on_demand() {
        let fetcher = Rc::new(FakeFetcher::csv(
            "fecha;vl\n2024-03-01 00:00:00.0;10,5\n2024-02-29 00:00:00.0;10,25\n",
        ));
        let mut scraper = vinea(&fetcher);
        assert!(!scraper.connected());

        let first = scraper.quotes().unwrap().next();
        assert_eq!(first, Some((date(2024, 3, 1), 10.5)));
        assert!(scraper.connected());
        assert_eq!(fetcher.requests().len(), 1);

        let rest: Vec<_> = scraper.quotes().unwrap().collect();
        assert_eq!(rest, vec![(date(2024, 2, 29), 10.25)]);
    }

    #[test]
    fn test_extract_twice_needs_reparse() {
        let fetcher = Rc::new(FakeFetcher::csv("fecha;vl\n2024-03-01 00:00:00.0;1,0\n"));
        let mut scraper = vinea(&fetcher);
        scraper.connect(Some(date(2024, 3, 1)), None).unwrap();
        assert_eq!(scraper.date(), Some(date(2024, 3, 1)));
        assert_eq!(scraper.extract(false), Err(ScraperError::AlreadyConnected));
        scraper.extract(true).unwrap();
        assert_eq!(scraper.quotes().unwrap().count(), 1);

        scraper.disconnect();
        assert!(!scraper.connected());
        assert_eq!(scraper.date(), None);
        scraper.extract(false).unwrap();
        assert_eq!(fetcher.requests().len(), 2);
    }

    #[test]
    fn test_http_error_status() {
        let fetcher = Rc::new(FakeFetcher::new(Response {
            status: 503,
            content_type: "text/html".into(),
            body: String::new(),
        }));
        let mut scraper = vinea(&fetcher);
        let err = scraper.connect(None, None).unwrap_err();
        assert!(matches!(err, ScraperError::Connection(ref m) if m.contains("503")));
        assert!(err.is_connection_error());
        assert!(!scraper.connected());
    }

    #[test]
    fn test_wrong_content_type_is_parse_error() {
        let fetcher = Rc::new(FakeFetcher::new(Response {
            status: 200,
            content_type: "text/html".into(),
            body: "<html></html>".into(),
        }));
        let mut scraper = vinea(&fetcher);
        assert!(matches!(scraper.quotes(), Err(ScraperError::Parse(_))));
    }
}
