/// Domain Queries
///
/// One function per database operation. Each runs on its own cursor; the
/// caller provides the session. Inserts are captured by the statement log
/// and return the key the row ended up with; queries return a `RowStream`
/// whose rows follow the field order of the matching record type.
use crate::core::db::{Connector, DbError, RowStream, Value};
use crate::core::Result;
use chrono::NaiveDate;
use tracing::{debug, info};

/// WHERE clause under construction.
#[derive(Debug, Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    fn push(&mut self, clause: &str, param: impl Into<Value>) {
        self.clauses.push(clause.to_string());
        self.params.push(param.into());
    }

    fn push_bare(&mut self, clause: &str) {
        self.clauses.push(clause.to_string());
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

fn select(db: &Connector, sql: String, params: Vec<Value>) -> Result<RowStream> {
    debug!("Query: {} {:?}", sql, params);
    Ok(db.stream(|db| db.execute(&sql, &params))?)
}

/// Inserts `row` into `table` inside a log scope; returns the rowid.
fn insert(db: &Connector, table: &str, row: &[Value]) -> Result<Option<i64>> {
    let placeholders = vec!["?"; row.len()].join(", ");
    let sql = format!("INSERT INTO {} VALUES ({})", table, placeholders);
    db.with_cursor(|db| {
        db.logged(|db| db.execute(&sql, row))?;
        db.last_row_id()
    })
    .map_err(Into::into)
}

fn first(row: &[Value]) -> Value {
    row.first().cloned().unwrap_or(Value::Null)
}

/// Registers a fund row; returns its ISIN.
pub fn register_fund(db: &Connector, row: &[Value]) -> Result<Value> {
    insert(db, "fund", row)?;
    info!("Registered fund {}", first(row));
    Ok(first(row))
}

pub fn get_funds(db: &Connector, isin: Option<&str>, active: Option<bool>) -> Result<RowStream> {
    let mut cond = Conditions::default();
    if let Some(isin) = isin {
        cond.push("isin = ?", isin);
    }
    if let Some(active) = active {
        cond.push("active = ?", active);
    }
    select(db, format!("SELECT * FROM fund{}", cond.sql()), cond.params)
}

/// Registers a participation account; returns its number.
pub fn register_account(db: &Connector, row: &[Value]) -> Result<Value> {
    insert(db, "account", row)?;
    info!("Registered account {}", first(row));
    Ok(first(row))
}

pub fn get_accounts(db: &Connector, id: Option<&str>) -> Result<RowStream> {
    let mut cond = Conditions::default();
    if let Some(id) = id {
        cond.push("id = ?", id);
    }
    select(db, format!("SELECT * FROM account{}", cond.sql()), cond.params)
}

/// Rounds a NAV to the precision stored in the database.
pub fn round_nav(nav: f64) -> f64 {
    (nav * 10_000.0).round() / 10_000.0
}

/// Records a quote `(isin, date, nav)`; the NAV is rounded to four decimals.
pub fn record_quote(db: &Connector, row: &[Value]) -> Result<Value> {
    let mut row = row.to_vec();
    if let Some(nav) = row.get(2).and_then(Value::as_f64) {
        row[2] = Value::Real(round_nav(nav));
    }
    let rowid = insert(db, "quote", &row)?;
    debug!("Recorded quote {:?}", row);
    Ok(rowid.map_or(Value::Null, Value::Integer))
}

/// Quotes of a fund, newest first. `from == to` selects a single day;
/// `limit` 0 means no limit.
pub fn get_quotes(
    db: &Connector,
    isin: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: usize,
) -> Result<RowStream> {
    let mut cond = Conditions::default();
    cond.push("isin = ?", isin);
    match (from, to) {
        (Some(from), Some(to)) if from == to => cond.push("date = ?", from),
        (from, to) => {
            if let Some(from) = from {
                cond.push("date >= ?", from);
            }
            if let Some(to) = to {
                cond.push("date <= ?", to);
            }
        }
    }
    let mut sql = format!("SELECT * FROM quote{} ORDER BY date DESC", cond.sql());
    if limit > 0 {
        sql.push_str(&format!(" LIMIT {}", limit));
    }
    select(db, sql, cond.params)
}

/// The `n` latest quotes of every fund as `(isin, date, nav, rank)` rows,
/// rank 1 being the newest.
pub fn latest_quotes(db: &Connector, n: usize) -> Result<RowStream> {
    let sql = "SELECT isin, date, nav, recency FROM (
                   SELECT isin, date, nav,
                          ROW_NUMBER() OVER (PARTITION BY isin ORDER BY date DESC) AS recency
                   FROM quote)
               WHERE recency <= ? ORDER BY isin, recency"
        .to_string();
    select(db, sql, vec![Value::Integer(n as i64)])
}

/// Records a subscription; returns its generated id.
pub fn subscribe(db: &Connector, row: &[Value]) -> Result<Value> {
    let rowid = insert(db, "subscription", row)?;
    let account = row.get(1).cloned().unwrap_or(Value::Null);
    info!("Registered subscription {:?} on account {}", rowid, account);
    Ok(rowid.map_or(Value::Null, Value::Integer))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriptionQuery<'a> {
    pub id: Option<i64>,
    pub account: Option<&'a str>,
    /// Some(true): shares left; Some(false): fully sold
    pub live: Option<bool>,
    /// Some(true): fresh money; Some(false): funded by a transfer
    pub new_money: Option<bool>,
}

/// An `id` takes precedence over every other criterion.
pub fn get_subscriptions(db: &Connector, query: &SubscriptionQuery<'_>) -> Result<RowStream> {
    let mut cond = Conditions::default();
    if let Some(id) = query.id {
        cond.push("id = ?", id);
    } else {
        if let Some(account) = query.account {
            cond.push("account_id = ?", account);
        }
        match query.live {
            Some(true) => cond.push_bare("(shares IS NULL OR shares > 0)"),
            Some(false) => cond.push_bare("shares = 0"),
            None => {}
        }
        match query.new_money {
            Some(true) => cond.push_bare("origin IS NULL"),
            Some(false) => cond.push_bare("origin IS NOT NULL"),
            None => {}
        }
    }
    select(db, format!("SELECT * FROM subscription{}", cond.sql()), cond.params)
}

/// Highest sale order number, 0 when nothing was sold yet.
pub fn last_order(db: &Connector) -> Result<i64> {
    db.with_cursor(|db| {
        db.execute(r#"SELECT MAX("order") FROM sale"#, &[])?;
        Ok::<_, DbError>(
            db.fetch_one()?
                .and_then(|row| row.first().and_then(Value::as_i64))
                .unwrap_or(0),
        )
    })
    .map_err(Into::into)
}

/// Records a sale; returns its order number.
pub fn sell(db: &Connector, row: &[Value]) -> Result<Value> {
    let rowid = insert(db, "sale", row)?;
    let order = match first(row) {
        Value::Null => rowid.map_or(Value::Null, Value::Integer),
        order => order,
    };
    info!("Registered sale {}", order);
    Ok(order)
}

/// An `order` takes precedence over every other criterion. `refunded`
/// Some(true) keeps sales whose money left the portfolio, Some(false)
/// those reinvested through a transfer.
pub fn get_sales(
    db: &Connector,
    order: Option<i64>,
    account: Option<&str>,
    refunded: Option<bool>,
) -> Result<RowStream> {
    let mut cond = Conditions::default();
    if let Some(order) = order {
        cond.push(r#""order" = ?"#, order);
    } else {
        if let Some(account) = account {
            cond.push("account_id = ?", account);
        }
        match refunded {
            Some(true) => cond.push_bare(
                r#""order" NOT IN (SELECT origin FROM subscription WHERE origin IS NOT NULL)"#,
            ),
            Some(false) => cond.push_bare(r#""order" IN (SELECT origin FROM subscription)"#),
            None => {}
        }
    }
    select(db, format!("SELECT * FROM sale{}", cond.sql()), cond.params)
}

/// Records a transfer `(order, source, sale_date, sale_shares, amount,
/// target, purchase_date, purchase_shares, comment)` as a sale on the
/// source account and a subscription on the target account funded by it.
/// Returns the order number.
pub fn transfer(db: &Connector, row: &[Value]) -> Result<Value> {
    let [order, source, sale_date, sale_shares, amount, target, purchase_date, purchase_shares, comment] =
        <[Value; 9]>::try_from(row.to_vec()).map_err(|row| {
            DbError::Programming(format!("A transfer has 9 fields, {} given", row.len()))
        })?;

    let purchase_date = match purchase_date {
        Value::Null => sale_date.clone(),
        date => date,
    };
    db.logged(|db| {
        let order = sell(db, &[order, source, sale_date, sale_shares, amount.clone(), comment])?;
        insert(
            db,
            "subscription",
            &[Value::Null, target, purchase_date, purchase_shares, amount, order.clone()],
        )?;
        info!("Registered transfer {}", order);
        Ok(order)
    })
}

pub fn get_transfers(
    db: &Connector,
    order: Option<i64>,
    source: Option<&str>,
    target: Option<&str>,
) -> Result<RowStream> {
    let mut cond = Conditions::default();
    if let Some(order) = order {
        cond.push(r#""order" = ?"#, order);
    } else {
        if let Some(source) = source {
            cond.push("source_id = ?", source);
        }
        if let Some(target) = target {
            cond.push("target_id = ?", target);
        }
    }
    select(db, format!("SELECT * FROM transfer{}", cond.sql()), cond.params)
}

/// Holdings built from the movements dated within `period`, valued at the
/// last quote not after its end. Open bounds read as unbounded.
const PORTFOLIO_HISTORY: &str = r#"
WITH period(initial, final) AS (SELECT ?, ?),
held AS (
    SELECT a.id AS account_id,
           a.isin,
           a.distributor,
           (SELECT TOTAL(b.cost) FROM subscription b, period p
             WHERE b.account_id = a.id
               AND b.date >= COALESCE(p.initial, b.date)
               AND b.date <= COALESCE(p.final, b.date)) AS capital,
           (SELECT TOTAL(b.shares) FROM subscription b, period p
             WHERE b.account_id = a.id
               AND b.date >= COALESCE(p.initial, b.date)
               AND b.date <= COALESCE(p.final, b.date))
             - (SELECT TOTAL(s.shares) FROM sale s, period p
                 WHERE s.account_id = a.id
                   AND s.date >= COALESCE(p.initial, s.date)
                   AND s.date <= COALESCE(p.final, s.date)) AS shares
    FROM account a
), latest AS (
    SELECT q.isin, MAX(q.date) AS date FROM quote q, period p
    WHERE q.date <= COALESCE(p.final, q.date)
    GROUP BY q.isin
), portfolio_history AS (
    SELECT h.isin,
           h.account_id,
           h.distributor,
           h.capital,
           l.date,
           q.nav,
           h.shares,
           h.shares * q.nav              AS valuation,
           h.shares * q.nav - h.capital  AS gain
    FROM held h
         LEFT JOIN latest l ON l.isin = h.isin
         LEFT JOIN quote q ON q.isin = l.isin AND q.date = l.date
)
SELECT * FROM portfolio_history"#;

#[derive(Debug, Clone, Default)]
pub struct PortfolioQuery<'a> {
    pub fund: Option<&'a str>,
    pub distributor: Option<&'a str>,
    pub live: Option<bool>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Current holdings, or those of a period when either bound is set.
pub fn get_portfolio(db: &Connector, query: &PortfolioQuery<'_>) -> Result<RowStream> {
    let mut cond = Conditions::default();
    let source = if query.from.is_none() && query.to.is_none() {
        "SELECT * FROM portfolio"
    } else {
        cond.params.push(query.from.map_or(Value::Null, Value::Date));
        cond.params.push(query.to.map_or(Value::Null, Value::Date));
        PORTFOLIO_HISTORY
    };
    if let Some(fund) = query.fund {
        cond.push("isin = ?", fund);
    }
    match query.live {
        Some(true) => cond.push_bare("(shares IS NULL OR shares > 0)"),
        Some(false) => cond.push_bare("shares = 0"),
        None => {}
    }
    if let Some(distributor) = query.distributor {
        cond.push("distributor = ?", distributor);
    }
    select(
        db,
        format!("{}{} ORDER BY account_id", source, cond.sql()),
        cond.params,
    )
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    /// Sale order; 0 selects what is still invested
    pub order: Option<i64>,
    /// Original subscription of the investment
    pub divestment: Option<i64>,
    /// Only the first subscription of each investment chain
    pub terminal: bool,
    /// Used when `order` is not given
    pub refunded: Option<bool>,
}

pub fn get_history(db: &Connector, query: &HistoryQuery) -> Result<RowStream> {
    let mut cond = Conditions::default();
    if let Some(order) = query.order {
        cond.push(r#""order" = ?"#, order);
    } else {
        match query.refunded {
            Some(true) => cond.push_bare(r#""order" <> 0"#),
            Some(false) => cond.push_bare(r#""order" = 0"#),
            None => {}
        }
    }
    if let Some(divestment) = query.divestment {
        cond.push("divestment = ?", divestment);
    }
    if query.terminal {
        cond.push_bare("divestment = subscription_id");
    }
    select(db, format!("SELECT * FROM history{}", cond.sql()), cond.params)
}

/// An `origin` subscription takes precedence over the other criteria.
/// `order` 0 selects gains not yet realised.
pub fn get_capital_gains(
    db: &Connector,
    origin: Option<i64>,
    order: Option<i64>,
    account: Option<&str>,
) -> Result<RowStream> {
    let mut cond = Conditions::default();
    if let Some(origin) = origin {
        cond.push("origin_id = ?", origin);
    } else {
        if let Some(order) = order {
            cond.push(r#""order" = ?"#, order);
        }
        if let Some(account) = account {
            cond.push("account_id = ?", account);
        }
    }
    select(db, format!("SELECT * FROM capital_gain{}", cond.sql()), cond.params)
}
