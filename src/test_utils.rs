/// # Test Utilities Module
///
/// Fixtures shared by unit and integration tests:
/// - `StoreFixture`: in-memory fund database with the bundled schema
/// - `FakeFetcher`: canned HTTP responses for the scrapers
/// - `date`: terse date construction
use crate::backend::queries;
use crate::backend::store::{self, StoreOptions, IN_MEMORY};
use crate::core::db::{Connector, Value};
use crate::core::FundError;
use crate::scraper::{Fetch, Response, ScraperError};
use chrono::NaiveDate;
use std::cell::RefCell;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid test date")
}

/// Isolated fund database
pub struct StoreFixture {
    pub db: Connector,
}

impl StoreFixture {
    /// Empty database with the bundled schema and every record attached.
    pub fn new() -> Self {
        let db = store::open(IN_MEMORY, StoreOptions::default()).expect("Failed to open test store");
        StoreFixture { db }
    }

    /// Two funds, the second inactive, and one account on each:
    ///
    /// | account | fund         | distributor |
    /// |---------|--------------|-------------|
    /// | ACC-1   | ES0000000001 | Bank One    |
    /// | ACC-2   | ES0000000002 | Bank Two    |
    pub fn with_samples() -> Self {
        let fixture = Self::new();
        fixture
            .db
            .transaction(|db| {
                queries::register_fund(db, &fund_row("ES0000000001", "Alpha Global", "Alpha", 3, true))?;
                queries::register_fund(db, &fund_row("ES0000000002", "Beta Income", "Beta", 5, false))?;
                queries::register_account(db, &["ACC-1".into(), "ES0000000001".into(), "Bank One".into()])?;
                queries::register_account(db, &["ACC-2".into(), "ES0000000002".into(), "Bank Two".into()])?;
                Ok::<_, FundError>(())
            })
            .expect("Failed to populate sample data");
        fixture
    }
}

impl Default for StoreFixture {
    fn default() -> Self {
        Self::new()
    }
}

fn fund_row(isin: &str, name: &str, alias: &str, risk: i64, active: bool) -> Vec<Value> {
    vec![
        isin.into(),
        name.into(),
        alias.into(),
        "Sample Asset Management".into(),
        "EUR".into(),
        risk.into(),
        "vinea".into(),
        Value::Null,
        active.into(),
    ]
}

/// `Fetch` answering every request with the same response.
pub struct FakeFetcher {
    response: Response,
    requests: RefCell<Vec<String>>,
}

impl FakeFetcher {
    pub fn new(response: Response) -> Self {
        FakeFetcher {
            response,
            requests: RefCell::new(Vec::new()),
        }
    }

    pub fn csv(body: &str) -> Self {
        Self::new(Response {
            status: 200,
            content_type: "text/csv".into(),
            body: body.into(),
        })
    }

    pub fn json(body: &str) -> Self {
        Self::new(Response {
            status: 200,
            content_type: "application/json".into(),
            body: body.into(),
        })
    }

    /// URLs requested so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
}

impl Fetch for FakeFetcher {
    fn get(&self, url: &str, _headers: &[(&str, &str)]) -> Result<Response, ScraperError> {
        self.requests.borrow_mut().push(url.to_string());
        Ok(self.response.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_fixture() {
        let fixture = StoreFixture::with_samples();
        let funds = fixture
            .db
            .transaction(|db| queries::get_funds(db, None, None).map(|rows| rows.count()))
            .unwrap();
        assert_eq!(funds, 2);
    }

    #[test]
    fn test_fake_fetcher_records_requests() {
        let fetcher = FakeFetcher::json("{}");
        let response = fetcher.get("https://example.org/a", &[]).unwrap();
        assert_eq!(response.content_type, "application/json");
        assert_eq!(fetcher.requests(), vec!["https://example.org/a".to_string()]);
    }
}
