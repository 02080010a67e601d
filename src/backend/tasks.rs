/// Quote extraction runs.
use super::model::{Fund, FundFilter, Quote, Subscription};
use crate::core::db::{Connector, Table, Value};
use crate::core::{FundError, Result};
use crate::scraper::PluginManager;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// Quotes are published in the evening; before this hour the latest one
/// expected is yesterday's.
const PUBLICATION_HOUR: u32 = 22;

/// Last business day a quote is expected for.
pub fn reference_day(now: NaiveDateTime, date: Option<NaiveDate>) -> NaiveDate {
    let day = date.unwrap_or_else(|| {
        if now.hour() < PUBLICATION_HOUR {
            now.date() - Duration::days(1)
        } else {
            now.date()
        }
    });
    let weekend = day.weekday().num_days_from_monday().saturating_sub(4);
    day - Duration::days(i64::from(weekend))
}

/// Outcome of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub stored: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Fetches the latest quote of every fund with a live subscription.
///
/// Inactive funds and funds already quoted on the reference day are
/// skipped. A fund whose scraper fails is reported and skipped.
pub fn extract_latest_quotes(
    db: &Connector,
    plugins: &PluginManager,
    date: Option<NaiveDate>,
    now: NaiveDateTime,
) -> Result<Extraction> {
    debug!("Extracting quotes from the web");
    let day = reference_day(now, date);

    let extraction = db.transaction(|db| {
        let quotes = db.entity::<Quote>()?;
        let subscriptions = db.entity::<Subscription>()?.all()?.collect::<Result<Vec<_>>>()?;
        let mut seen = HashSet::new();
        let mut extraction = Extraction::default();

        for subscription in &subscriptions {
            let fund = match subscription.account()? {
                Some(account) => account.fund()?,
                None => None,
            };
            let Some(fund) = fund else {
                warn!("{} has no known fund", subscription);
                continue;
            };
            if !seen.insert(fund.isin().to_string()) {
                continue;
            }
            if !fund.active() {
                info!("{} inactive, no quote fetched", fund.alias());
                extraction.skipped += 1;
                continue;
            }
            if Quote::on(&quotes, fund.isin(), day)?.is_some() {
                info!("{} already up to date", fund.alias());
                extraction.skipped += 1;
                continue;
            }

            let latest = plugins
                .scraper(fund.scraper().unwrap_or_default(), fund.scraper_data())
                .and_then(|mut scraper| {
                    scraper.connect(date, None)?;
                    Ok(scraper.quotes()?.next())
                });
            let (quoted, nav) = match latest {
                Ok(Some(quote)) => quote,
                Ok(None) | Err(_) => {
                    error!("Unable to get quotes of {}", fund.alias());
                    extraction.failed += 1;
                    continue;
                }
            };

            let mut quote = quotes.new([Value::from(fund.isin()), Value::Date(quoted), Value::Real(nav)])?;
            match quote.insert() {
                Ok(_) => extraction.stored += 1,
                Err(e) => {
                    warn!("{} already has the latest available quote ({})", fund.alias(), e);
                    extraction.skipped += 1;
                }
            }
        }
        Ok::<_, FundError>(extraction)
    })?;

    debug!("Extraction finished: {:?}", extraction);
    Ok(extraction)
}

/// Stores the quotes of `isin` between `date - days` and `date`, or the
/// single quote on `date` when `days` is None. Quotes already stored are
/// left alone. Returns how many were added.
pub fn load_quotes(
    db: &Connector,
    plugins: &PluginManager,
    isin: &str,
    date: NaiveDate,
    days: Option<i64>,
) -> Result<usize> {
    let fund = db
        .entity::<Fund>()?
        .get(FundFilter {
            isin: Some(isin.to_string()),
            active: None,
        })?
        .first()?
        .ok_or_else(|| FundError::Command(format!("{}: unknown fund", isin)))?;

    let mut scraper = plugins.scraper(fund.scraper().unwrap_or_default(), fund.scraper_data())?;
    scraper.connect(Some(date), days)?;
    let fetched: Vec<_> = scraper.quotes()?.collect();
    info!("Storing quotes of {}", fund.alias());

    let quotes = db.entity::<Quote>()?;
    let mut stored = 0;
    for (day, nav) in fetched {
        let mut quote = quotes.new([Value::from(fund.isin()), Value::Date(day), Value::Real(nav)])?;
        match quote.insert() {
            Ok(_) => stored += 1,
            Err(_) => warn!("'{}' [{}] already has the quote of {}", fund.alias(), fund.isin(), day),
        }
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::queries::subscribe;
    use crate::test_utils::{date, FakeFetcher, StoreFixture};
    use std::rc::Rc;

    fn at(day: NaiveDate, hour: u32) -> NaiveDateTime {
        day.and_hms_opt(hour, 0, 0).unwrap()
    }

    fn subscribe_both(db: &Connector) {
        db.transaction(|db| {
            for account in ["ACC-1", "ACC-2"] {
                subscribe(
                    db,
                    &[Value::Null, account.into(), date(2023, 5, 2).into(), 10.0.into(), 1000.0.into(), Value::Null],
                )?;
            }
            Ok::<_, FundError>(())
        })
        .unwrap();
    }

    #[test]
    fn test_reference_day() {
        // 2024-03-06 is a Wednesday
        assert_eq!(reference_day(at(date(2024, 3, 6), 10), None), date(2024, 3, 5));
        assert_eq!(reference_day(at(date(2024, 3, 6), 23), None), date(2024, 3, 6));
        // Sunday and Monday morning fall back to Friday
        assert_eq!(reference_day(at(date(2024, 3, 10), 23), None), date(2024, 3, 8));
        assert_eq!(reference_day(at(date(2024, 3, 11), 8), None), date(2024, 3, 8));
        assert_eq!(reference_day(at(date(2024, 3, 11), 8), Some(date(2024, 3, 9))), date(2024, 3, 8));
    }

    #[test]
    fn test_extract_latest_quotes() {
        let fixture = StoreFixture::with_samples();
        subscribe_both(&fixture.db);
        let fetcher = Rc::new(FakeFetcher::csv("fecha;vl\n2024-03-08 00:00:00.0;10,123456\n"));
        let plugins = PluginManager::with_builtin(fetcher.clone());
        let saturday = at(date(2024, 3, 9), 12);

        let first = extract_latest_quotes(&fixture.db, &plugins, None, saturday).unwrap();
        // ACC-2 holds the inactive fund
        assert_eq!(first, Extraction { stored: 1, skipped: 1, failed: 0 });
        assert_eq!(fetcher.requests().len(), 1);

        let stored = fixture
            .db
            .transaction(|db| Quote::on(&db.entity::<Quote>()?, "ES0000000001", date(2024, 3, 8)))
            .unwrap()
            .unwrap();
        assert_eq!(stored.nav(), Some(10.1235));

        let second = extract_latest_quotes(&fixture.db, &plugins, None, saturday).unwrap();
        assert_eq!(second, Extraction { stored: 0, skipped: 2, failed: 0 });
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_extract_reports_scraper_failures() {
        let fixture = StoreFixture::with_samples();
        subscribe_both(&fixture.db);
        let plugins = PluginManager::with_builtin(Rc::new(FakeFetcher::csv("fecha;vl\n")));

        let run = extract_latest_quotes(&fixture.db, &plugins, None, at(date(2024, 3, 6), 12)).unwrap();
        assert_eq!(run, Extraction { stored: 0, skipped: 1, failed: 1 });
    }

    #[test]
    fn test_load_quotes_skips_stored_days() {
        let fixture = StoreFixture::with_samples();
        let fetcher = Rc::new(FakeFetcher::csv(
            "fecha;vl\n2024-03-08 00:00:00.0;10,5\n2024-03-07 00:00:00.0;10,25\n",
        ));
        let plugins = PluginManager::with_builtin(fetcher.clone());
        let load = |db: &Connector| load_quotes(db, &plugins, "ES0000000001", date(2024, 3, 8), Some(7));

        assert_eq!(fixture.db.transaction(load).unwrap(), 2);
        assert_eq!(fixture.db.transaction(load).unwrap(), 0);
        assert!(fetcher.requests()[0].contains("fechaInicio=01032024&fechaFin=09032024&periodo=DIA"));

        let unknown = fixture
            .db
            .transaction(|db| load_quotes(db, &plugins, "XX0000000000", date(2024, 3, 8), None));
        assert!(matches!(unknown, Err(FundError::Command(_))));
    }
}
