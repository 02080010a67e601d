//! Input lines
//!
//! Records are fed to the program as `|`-separated lines on stdin. Each
//! field is converted to its most likely type, then the fields are placed
//! in the column order of the table the line is meant for.
use crate::core::db::{Value, DATE_FORMAT};
use crate::core::{FundError, Result};
use chrono::NaiveDate;

pub const SEPARATOR: char = '|';

/// What a line describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// `ISIN|NAME|ALIAS|MANAGER|SCRAPER|RISK[|ACTIVE[|CURRENCY[|SCRAPER_DATA]]]`
    Fund,
    /// `ID|ISIN|DISTRIBUTOR`
    Account,
    /// `ACCOUNT|DATE[|COST[|SHARES]]`
    Subscription,
    /// `ACCOUNT|DATE|SHARES[|REFUND[|COMMENT]]`
    Sale,
    /// `ACCOUNT|DATE|TARGET[|PURCHASE_DATE[|SHARES[|REFUND[|PURCHASE_SHARES[|COMMENT]]]]]`
    Transfer,
    /// `ISIN|DATE[|NAV]`
    Nav,
    /// `ISIN|FROM[|TO]`, parsed to `(ISIN, TO or FROM, days or NULL)`
    Quotes,
}

impl LineKind {
    pub fn name(self) -> &'static str {
        match self {
            LineKind::Fund => "fund",
            LineKind::Account => "account",
            LineKind::Subscription => "subscription",
            LineKind::Sale => "sale",
            LineKind::Transfer => "transfer",
            LineKind::Nav => "nav",
            LineKind::Quotes => "quotes",
        }
    }

    /// Accepted field counts.
    fn arity(self) -> (usize, usize) {
        match self {
            LineKind::Fund => (6, 9),
            LineKind::Account => (3, 3),
            LineKind::Subscription => (2, 4),
            LineKind::Sale => (3, 5),
            LineKind::Transfer => (3, 8),
            LineKind::Nav => (2, 3),
            LineKind::Quotes => (2, 3),
        }
    }
}

/// True for lines carrying no record.
pub fn is_skipped(line: &str) -> bool {
    line.starts_with('#') || line.trim().is_empty()
}

/// Converts a field to its most likely type: integer, real, boolean word,
/// ISO date or text. Blank fields are NULL.
pub fn convert(field: &str) -> Value {
    let field = field.trim();
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = field.parse::<i64>() {
        return Value::Integer(int);
    }
    if let Ok(real) = field.parse::<f64>() {
        return Value::Real(real);
    }
    match field.to_ascii_lowercase().as_str() {
        "y" | "yes" | "t" | "true" | "on" => return Value::Bool(true),
        "n" | "no" | "f" | "false" | "off" => return Value::Bool(false),
        _ => {}
    }
    match NaiveDate::parse_from_str(field, DATE_FORMAT) {
        Ok(date) => Value::Date(date),
        Err(_) => Value::Text(field.to_string()),
    }
}

/// Parses `line` into the row for `kind`.
pub fn parse_line(line: &str, kind: LineKind) -> Result<Vec<Value>> {
    let fields: Vec<Value> = line.trim_end_matches(['\r', '\n']).split(SEPARATOR).map(convert).collect();
    let (min, max) = kind.arity();
    if fields.len() < min || fields.len() > max {
        return Err(FundError::Parse(format!(
            "A {} line takes {} to {} fields, {} given",
            kind.name(),
            min,
            max,
            fields.len()
        )));
    }

    let mut fields = fields.into_iter();
    let mut next = || fields.next().unwrap_or(Value::Null);

    Ok(match kind {
        LineKind::Fund => {
            let [isin, name, alias, manager, scraper, risk] = [next(), next(), next(), next(), next(), next()];
            let active = or(next(), Value::Integer(0));
            let currency = or(next(), Value::from("EUR"));
            let scraper_data = next();
            vec![isin, name, alias, manager, currency, risk, scraper, scraper_data, active]
        }
        LineKind::Account => vec![next(), next(), next()],
        LineKind::Subscription => {
            let [account, date, cost, shares] = [next(), next(), next(), next()];
            vec![Value::Null, account, date, shares, cost, Value::Null]
        }
        LineKind::Sale => {
            let [account, date, shares, refund, comment] = [next(), next(), next(), next(), next()];
            vec![Value::Null, account, date, shares, refund, comment]
        }
        LineKind::Transfer => {
            let [account, date, target, purchase_date, shares, refund, purchase_shares, comment] =
                [next(), next(), next(), next(), next(), next(), next(), next()];
            vec![Value::Null, account, date, shares, refund, target, purchase_date, purchase_shares, comment]
        }
        LineKind::Nav => vec![next(), next(), next()],
        LineKind::Quotes => {
            let [fund, from, to] = [next(), next(), next()];
            quote_range(fund, from, to)?
        }
    })
}

fn or(value: Value, default: Value) -> Value {
    if value.is_null() {
        default
    } else {
        value
    }
}

fn quote_range(fund: Value, from: Value, to: Value) -> Result<Vec<Value>> {
    let Value::Date(from) = from else {
        return Err(FundError::Parse("Bad start date".into()));
    };
    let days = match to {
        Value::Null => None,
        Value::Date(to) => Some((to - from).num_days()),
        _ => return Err(FundError::Parse("Bad end date".into())),
    };
    if days.map_or(false, |days| days < 0) {
        return Err(FundError::Parse("End date before the start date".into()));
    }
    let end = days.map_or(from, |days| from + chrono::Duration::days(days));
    Ok(vec![fund, Value::Date(end), days.map_or(Value::Null, Value::Integer)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;

    #[test]
    fn test_convert() {
        assert_eq!(convert(" 42 "), Value::Integer(42));
        assert_eq!(convert("10.5"), Value::Real(10.5));
        assert_eq!(convert("yes"), Value::Bool(true));
        assert_eq!(convert("Off"), Value::Bool(false));
        assert_eq!(convert("2024-01-31"), Value::Date(date(2024, 1, 31)));
        assert_eq!(convert("2024-02-31"), Value::from("2024-02-31"));
        assert_eq!(convert("   "), Value::Null);
        assert_eq!(convert("ES0000000001"), Value::from("ES0000000001"));
    }

    #[test]
    fn test_fund_line_defaults() {
        let row = parse_line("ES01|Alpha Global|Alpha|Acme|vinea|4\n", LineKind::Fund).unwrap();
        assert_eq!(
            row,
            vec![
                Value::from("ES01"),
                Value::from("Alpha Global"),
                Value::from("Alpha"),
                Value::from("Acme"),
                Value::from("EUR"),
                Value::Integer(4),
                Value::from("vinea"),
                Value::Null,
                Value::Integer(0),
            ]
        );

        let row = parse_line("ES01|Alpha|||investing|4|1|USD|alpha-global", LineKind::Fund).unwrap();
        assert_eq!(row[2], Value::Null);
        assert_eq!(row[4], Value::from("USD"));
        assert_eq!(row[7], Value::from("alpha-global"));
        assert_eq!(row[8], Value::Integer(1));
    }

    #[test]
    fn test_reordered_kinds() {
        let row = parse_line("ACC-1|2024-01-02|1000", LineKind::Subscription).unwrap();
        assert_eq!(
            row,
            vec![Value::Null, "ACC-1".into(), date(2024, 1, 2).into(), Value::Null, Value::Integer(1000), Value::Null]
        );

        let row = parse_line("ACC-1|2024-02-01|ACC-2||4.5|450", LineKind::Transfer).unwrap();
        assert_eq!(row.len(), 9);
        assert_eq!(row[3], Value::Real(4.5));
        assert_eq!(row[4], Value::Integer(450));
        assert_eq!(row[5], Value::from("ACC-2"));
        assert_eq!(row[6], Value::Null);

        assert!(matches!(parse_line("ACC-1|ES01", LineKind::Account), Err(FundError::Parse(_))));
    }

    #[test]
    fn test_quote_ranges() {
        let row = parse_line("ES01|2024-01-01|2024-01-31", LineKind::Quotes).unwrap();
        assert_eq!(row, vec!["ES01".into(), date(2024, 1, 31).into(), Value::Integer(30)]);

        let row = parse_line("ES01|2024-01-01", LineKind::Quotes).unwrap();
        assert_eq!(row, vec!["ES01".into(), date(2024, 1, 1).into(), Value::Null]);

        assert!(parse_line("ES01|yesterday", LineKind::Quotes).is_err());
        assert!(parse_line("ES01|2024-01-01|soon", LineKind::Quotes).is_err());
        assert!(parse_line("ES01|2024-01-31|2024-01-01", LineKind::Quotes).is_err());
    }

    #[test]
    fn test_skipped_lines() {
        assert!(is_skipped("# comment"));
        assert!(is_skipped("  \n"));
        assert!(!is_skipped("ES01|2024-01-01"));
    }
}
