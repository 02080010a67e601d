/// Quotes from in.investing.com, served as JSON.
use crate::scraper::{QuotePlugin, ScraperError};
use chrono::{DateTime, Duration, NaiveDate};
use serde::Deserialize;

const URL: &str = "https://in.investing.com/funds/";
const DEFAULT_DAYS: i64 = 7;

pub struct Investing;

#[derive(Deserialize)]
struct Page {
    body: Body,
}

#[derive(Deserialize)]
struct Body {
    content: Content,
}

#[derive(Deserialize)]
struct Content {
    #[serde(rename = "_list")]
    list: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct Nested {
    body: NestedBody,
}

#[derive(Deserialize)]
struct NestedBody {
    vars: Vars,
}

#[derive(Deserialize)]
struct Vars {
    data: Vec<Point>,
}

#[derive(Deserialize)]
struct Point {
    #[serde(rename = "rowDateRaw")]
    date: i64,
    #[serde(rename = "last_closeRaw")]
    close: serde_json::Value,
}

fn epoch(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|t| t.and_utc().timestamp())
        .unwrap_or_default()
}

impl QuotePlugin for Investing {
    fn name(&self) -> &'static str {
        "investing"
    }

    fn headers(&self) -> Vec<(&'static str, &'static str)> {
        vec![("res-scheme", "1"), ("User-Agent", "Mozilla/5.0")]
    }

    fn make_url(&self, data: &str, date: Option<NaiveDate>, days: Option<i64>, today: NaiveDate) -> String {
        let date = date.unwrap_or(today);
        let days = days.filter(|&d| d != 0).unwrap_or(DEFAULT_DAYS);
        format!(
            "{}{}?end_date={}&st_date={}",
            URL,
            data,
            epoch(date + Duration::days(1)),
            epoch(date - Duration::days(days))
        )
    }

    fn parse(&self, page: &str, content_type: &str) -> Result<Vec<(NaiveDate, f64)>, ScraperError> {
        if content_type != "application/json" {
            return Err(ScraperError::Parse(format!(
                "Expected 'application/json', got '{}'",
                content_type
            )));
        }

        let page: Page = serde_json::from_str(page)
            .map_err(|e| ScraperError::Parse(format!("Unexpected page layout: {}", e)))?;
        let list = page.body.content.list;
        let section = list
            .len()
            .checked_sub(2)
            .and_then(|i| list.get(i))
            .and_then(|s| s.get("nested"))
            .cloned()
            .ok_or_else(|| ScraperError::Parse("No quote section in page".into()))?;
        let nested: Nested = serde_json::from_value(section)
            .map_err(|e| ScraperError::Parse(format!("Unexpected quote section: {}", e)))?;

        nested
            .body
            .vars
            .data
            .into_iter()
            .map(|point| {
                let date = DateTime::from_timestamp(point.date, 0)
                    .map(|t| t.date_naive())
                    .ok_or_else(|| ScraperError::Parse(format!("Bad timestamp {}", point.date)))?;
                let close = match &point.close {
                    serde_json::Value::Number(n) => n.as_f64(),
                    serde_json::Value::String(s) => s.parse().ok(),
                    _ => None,
                }
                .ok_or_else(|| ScraperError::Parse(format!("Bad close value {}", point.close)))?;
                Ok((date, close))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;

    #[test]
    fn test_make_url() {
        let url = Investing.make_url("alpha-global", Some(date(2024, 1, 8)), None, date(2024, 3, 1));
        // 2024-01-09 and 2024-01-01 at midnight UTC
        assert_eq!(
            url,
            "https://in.investing.com/funds/alpha-global?end_date=1704758400&st_date=1704067200"
        );
    }

    #[test]
    fn test_parse() {
        let page = r#"{"body": {"content": {"_list": [
            {"header": {}},
            {"nested": {"body": {"vars": {"data": [
                {"rowDateRaw": 1704153600, "last_closeRaw": "101.25"},
                {"rowDateRaw": 1704067200, "last_closeRaw": 100.5}
            ]}}}},
            {"footer": {}}
        ]}}}"#;
        let quotes = Investing.parse(page, "application/json").unwrap();
        assert_eq!(quotes, vec![(date(2024, 1, 2), 101.25), (date(2024, 1, 1), 100.5)]);

        assert!(matches!(
            Investing.parse(r#"{"body": {"content": {"_list": []}}}"#, "application/json"),
            Err(ScraperError::Parse(_))
        ));
        assert!(Investing.parse(page, "text/csv").is_err());
    }
}
