/// Quotes from broker.vinea.es, served as CSV.
use crate::scraper::{QuotePlugin, ScraperError};
use chrono::{Duration, NaiveDate, NaiveDateTime};

const URL: &str = "https://broker.vinea.es/Broker2_2105/csv/ServiceCsv.action?\
                   service=historicoFondosLiquidativosCsv";

/// Window used when only the latest quote is wanted; a week always has one.
const DEFAULT_DAYS: i64 = 7;

pub struct Vinea;

impl QuotePlugin for Vinea {
    fn name(&self) -> &'static str {
        "vinea"
    }

    // date  days  result
    // -     -     latest quote
    // -     N     quotes of the last N days
    // D     -     quote on D, or the previous one
    // D     N     quotes between D-N and D
    fn make_url(&self, data: &str, date: Option<NaiveDate>, days: Option<i64>, today: NaiveDate) -> String {
        let days = days.filter(|&d| d != 0);
        let date = match (date, days) {
            (None, Some(_)) => Some(today),
            (date, _) => date,
        };
        let (period, days) = match days {
            Some(days) => ("DIA", days),
            None => ("v", DEFAULT_DAYS),
        };
        let (start, end) = match date {
            Some(date) => (
                (date - Duration::days(days)).format("%d%m%Y").to_string(),
                (date + Duration::days(1)).format("%d%m%Y").to_string(),
            ),
            None => (String::new(), String::new()),
        };
        format!(
            "{}&fechaInicio={}&fechaFin={}&periodo={}&isin={}",
            URL, start, end, period, data
        )
    }

    fn parse(&self, page: &str, content_type: &str) -> Result<Vec<(NaiveDate, f64)>, ScraperError> {
        if content_type != "text/csv" {
            return Err(ScraperError::Parse(format!(
                "Expected 'text/csv', got '{}'",
                content_type
            )));
        }

        page.lines()
            .skip(1)
            .filter(|line| !line.trim().is_empty())
            .map(parse_line)
            .collect()
    }
}

fn parse_line(line: &str) -> Result<(NaiveDate, f64), ScraperError> {
    let (date, nav) = line
        .trim()
        .split_once(';')
        .ok_or_else(|| ScraperError::Parse(format!("Malformed line: {}", line)))?;
    let date = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| ScraperError::Parse(format!("Bad date '{}': {}", date, e)))?
        .date();
    let nav = nav
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|e| ScraperError::Parse(format!("Bad value '{}': {}", nav, e)))?;
    Ok((date, nav))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;

    #[test]
    fn test_make_url() {
        let today = date(2024, 3, 10);
        let latest = Vinea.make_url("ES01", None, None, today);
        assert!(latest.ends_with("&fechaInicio=&fechaFin=&periodo=v&isin=ES01"));

        let last_month = Vinea.make_url("ES01", None, Some(30), today);
        assert!(last_month.contains("fechaInicio=09022024&fechaFin=11032024&periodo=DIA"));

        let on_day = Vinea.make_url("ES01", Some(date(2024, 1, 15)), None, today);
        assert!(on_day.contains("fechaInicio=08012024&fechaFin=16012024&periodo=v"));
    }

    #[test]
    fn test_parse() {
        let page = "fecha;vl\n2024-03-01 00:00:00.0;12,3456\n\n2024-02-29 00:00:00.0;12,1\n";
        let quotes = Vinea.parse(page, "text/csv").unwrap();
        assert_eq!(quotes, vec![(date(2024, 3, 1), 12.3456), (date(2024, 2, 29), 12.1)]);

        assert!(Vinea.parse("fecha;vl\nnot a line\n", "text/csv").is_err());
        assert!(Vinea.parse(page, "text/html").is_err());
    }
}
