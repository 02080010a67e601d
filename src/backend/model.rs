/// Domain Records
///
/// The record types of the fund database. Field lists follow the column
/// order of the matching tables and views. Lookups of related records
/// (an account's fund, a subscription's account, ...) run on first use
/// and are remembered by the instance.
use super::queries::{self, HistoryQuery, PortfolioQuery, SubscriptionQuery};
use crate::core::db::{
    decode_date, decode_flag, encode_date, encode_flag, Bound, Connector, DbError, Entity, Record,
    RowStream, Table, Value,
};
use crate::core::Result;
use crate::record;
use crate::scraper::PluginManager;
use chrono::NaiveDate;
use once_cell::unsync::OnceCell;
use tracing::{debug, info, warn};

/// Every record type of the fund database.
pub fn entities() -> Vec<Entity> {
    vec![
        Entity::of::<Fund>(),
        Entity::of::<Account>(),
        Entity::of::<Quote>(),
        Entity::of::<Subscription>(),
        Entity::of::<Sale>(),
        Entity::of::<Transfer>(),
        Entity::of::<Portfolio>(),
        Entity::of::<History>(),
        Entity::of::<CapitalGain>(),
    ]
}

/// First record of type `T` matching `filter`, looked up once per `cell`.
fn memo<'a, T: Table>(
    cell: &'a OnceCell<Option<T>>,
    db: Result<&Connector>,
    filter: impl FnOnce() -> T::Filter,
) -> Result<Option<&'a T>> {
    cell.get_or_try_init(|| -> Result<Option<T>> { db?.entity::<T>()?.get(filter())?.first() })
        .map(Option::as_ref)
}

/// `memo` for lookups by a nullable key: no key, no record.
fn memo_key<'a, T: Table, K>(
    cell: &'a OnceCell<Option<T>>,
    db: Result<&Connector>,
    key: Option<K>,
    filter: impl FnOnce(K) -> T::Filter,
) -> Result<Option<&'a T>> {
    match key {
        Some(key) => memo(cell, db, || filter(key)),
        None => Ok(None),
    }
}

fn subscription_filter(id: i64) -> SubscriptionFilter {
    SubscriptionFilter {
        id: Some(id),
        live: None,
        ..Default::default()
    }
}

fn sale_filter(order: i64) -> SaleFilter {
    SaleFilter {
        order: Some(order),
        ..Default::default()
    }
}

fn account_filter(id: Option<&str>) -> AccountFilter {
    AccountFilter {
        id: Some(id.unwrap_or_default().to_string()),
    }
}

/// NAV of `isin` on `day`: the stored quote, else the scraped one when
/// the connection provides a `PluginManager`.
fn nav_on(db: &Connector, isin: &str, day: NaiveDate) -> Result<Option<f64>> {
    let quotes = db.entity::<Quote>()?;
    let quote = match db.provided::<PluginManager>() {
        Some(plugins) => Quote::force_get(&quotes, &plugins, isin, day)?,
        None => Quote::on(&quotes, isin, day)?,
    };
    Ok(quote.and_then(|quote| quote.nav()))
}

fn fund_filter(isin: &str) -> FundFilter {
    FundFilter {
        isin: Some(isin.to_string()),
        active: None,
    }
}

record! {
    /// A mutual fund.
    pub struct Fund: "isin* name alias manager currency risk scraper scraper_data active" {
        decode active => decode_flag;
        encode active => encode_flag;
    }
}

#[derive(Debug, Clone, Default)]
pub struct FundFilter {
    pub isin: Option<String>,
    pub active: Option<bool>,
}

impl Table for Fund {
    type Filter = FundFilter;

    fn insert_row(&self, db: &Connector) -> Result<Value> {
        queries::register_fund(db, &self.values())
    }

    fn select(db: &Connector, filter: &FundFilter) -> Result<RowStream> {
        queries::get_funds(db, filter.isin.as_deref(), filter.active)
    }
}

impl Fund {
    pub fn isin(&self) -> &str {
        self.get_text("isin").unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.get_text("name").unwrap_or_default()
    }

    /// Short name; the full name when there is none.
    pub fn alias(&self) -> &str {
        self.get_text("alias")
            .filter(|alias| !alias.is_empty())
            .unwrap_or_else(|| self.name())
    }

    pub fn risk(&self) -> Option<i64> {
        self.get_int("risk")
    }

    pub fn scraper(&self) -> Option<&str> {
        self.get_text("scraper")
    }

    /// What the scraper needs to find the fund; the ISIN unless set.
    pub fn scraper_data(&self) -> &str {
        self.get_text("scraper_data")
            .filter(|data| !data.is_empty())
            .unwrap_or_else(|| self.isin())
    }

    pub fn active(&self) -> bool {
        self.get_flag("active").unwrap_or(false)
    }

    /// Whether the two latest quotes went up. None without two quotes.
    pub fn growth(&self) -> Result<Option<bool>> {
        let quotes = self.bound()?.entity::<Quote>()?;
        let latest: Vec<Quote> = quotes
            .get(QuoteFilter {
                isin: self.isin().to_string(),
                limit: 2,
                ..Default::default()
            })?
            .collect::<Result<_>>()?;
        Ok(match latest.as_slice() {
            [last, previous] => match (last.nav(), previous.nav()) {
                (Some(last), Some(previous)) => Some(last - previous > 0.0),
                _ => None,
            },
            _ => None,
        })
    }
}

record! {
    /// A participation account holding shares of one fund.
    pub struct Account: "id* isin distributor" {
        cache fund: Option<Fund>;
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccountFilter {
    pub id: Option<String>,
}

impl Table for Account {
    type Filter = AccountFilter;

    fn insert_row(&self, db: &Connector) -> Result<Value> {
        queries::register_account(db, &self.values())
    }

    fn select(db: &Connector, filter: &AccountFilter) -> Result<RowStream> {
        queries::get_accounts(db, filter.id.as_deref())
    }
}

impl Account {
    pub fn id(&self) -> &str {
        self.get_text("id").unwrap_or_default()
    }

    pub fn isin(&self) -> &str {
        self.get_text("isin").unwrap_or_default()
    }

    pub fn distributor(&self) -> Option<&str> {
        self.get_text("distributor")
    }

    pub fn fund(&self) -> Result<Option<&Fund>> {
        memo(&self.fund, self.bound(), || fund_filter(self.isin()))
    }
}

record! {
    /// Net asset value of a fund on a day.
    pub struct Quote: "isin* date* nav" {
        decode date => decode_date;
        encode date => encode_date;
        cache fund: Option<Fund>;
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuoteFilter {
    pub isin: String,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// 0 for no limit
    pub limit: usize,
}

impl Table for Quote {
    type Filter = QuoteFilter;

    fn insert_row(&self, db: &Connector) -> Result<Value> {
        queries::record_quote(db, &self.values())
    }

    fn select(db: &Connector, filter: &QuoteFilter) -> Result<RowStream> {
        queries::get_quotes(db, &filter.isin, filter.from, filter.to, filter.limit)
    }
}

impl Quote {
    pub fn isin(&self) -> &str {
        self.get_text("isin").unwrap_or_default()
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.get_date("date")
    }

    pub fn nav(&self) -> Option<f64> {
        self.get_real("nav")
    }

    pub fn fund(&self) -> Result<Option<&Fund>> {
        memo(&self.fund, self.bound(), || fund_filter(self.isin()))
    }

    /// Latest stored quote of `isin`, not after `limit` when given.
    pub fn last(quotes: &Bound<Quote>, isin: &str, limit: Option<NaiveDate>) -> Result<Option<Quote>> {
        quotes
            .get(QuoteFilter {
                isin: isin.to_string(),
                to: limit,
                limit: 1,
                ..Default::default()
            })?
            .first()
    }

    /// Stored quote of `isin` on `date`.
    pub fn on(quotes: &Bound<Quote>, isin: &str, date: NaiveDate) -> Result<Option<Quote>> {
        quotes
            .get(QuoteFilter {
                isin: isin.to_string(),
                from: Some(date),
                to: Some(date),
                limit: 0,
            })?
            .first()
    }

    /// Builds (without storing) the quote of `isin` on `date` from the
    /// fund's scraper. The NAV stays null when the scraper fails.
    pub fn scrape(quotes: &Bound<Quote>, plugins: &PluginManager, isin: &str, date: NaiveDate) -> Result<Quote> {
        let fund = quotes
            .connector()
            .entity::<Fund>()?
            .get(fund_filter(isin))?
            .first()?
            .ok_or_else(|| DbError::Data(format!("No fund {}", isin)))?;

        let mut scraper = plugins.scraper(fund.scraper().unwrap_or_default(), fund.scraper_data())?;
        let nav = match scraper.connect(Some(date), None) {
            Ok(()) => match scraper.quotes().map(|quotes| quotes.next()) {
                Ok(Some((_, nav))) => Value::Real(nav),
                Ok(None) => {
                    warn!("No quote for {} on {}", isin, date);
                    Value::Null
                }
                Err(e) => {
                    warn!("Cannot read the quote of {}: {}", isin, e);
                    Value::Null
                }
            },
            Err(e) => {
                warn!("Cannot fetch the quote of {}: {}", isin, e);
                Value::Null
            }
        };
        scraper.disconnect();
        quotes.new([Value::from(isin), Value::Date(date), nav])
    }

    /// Stored quote of `isin` on `date`, scraping and storing it when
    /// missing. None when it cannot be obtained.
    pub fn force_get(
        quotes: &Bound<Quote>,
        plugins: &PluginManager,
        isin: &str,
        date: NaiveDate,
    ) -> Result<Option<Quote>> {
        if let Some(quote) = Quote::on(quotes, isin, date)? {
            return Ok(Some(quote));
        }
        debug!("No stored NAV of {} on {}", isin, date.format("%d/%m/%Y"));
        let mut quote = Quote::scrape(quotes, plugins, isin, date)?;
        match quote.insert() {
            Ok(_) => Ok(Some(quote)),
            Err(e) => {
                debug!("Quote of {} on {} not stored: {}", isin, date, e);
                Ok(None)
            }
        }
    }
}

record! {
    /// A purchase of shares, with fresh money or funded by a sale.
    pub struct Subscription: "id* account_id date shares cost origin" {
        decode date => decode_date;
        encode date => encode_date;
        cache account: Option<Account>;
        cache sale: Option<Sale>;
        cache nav: Option<f64>;
    }
}

#[derive(Debug, Clone)]
pub struct SubscriptionFilter {
    pub id: Option<i64>,
    pub account: Option<String>,
    pub live: Option<bool>,
    pub new_money: Option<bool>,
}

impl Default for SubscriptionFilter {
    /// Live subscriptions only.
    fn default() -> Self {
        SubscriptionFilter {
            id: None,
            account: None,
            live: Some(true),
            new_money: None,
        }
    }
}

impl Table for Subscription {
    type Filter = SubscriptionFilter;

    fn insert_row(&self, db: &Connector) -> Result<Value> {
        let mut row = self.values();
        match self.cost()? {
            Some(cost) => row[4] = Value::Real(cost),
            None => info!("The cost of the subscription is unknown"),
        }
        queries::subscribe(db, &row)
    }

    fn select(db: &Connector, filter: &SubscriptionFilter) -> Result<RowStream> {
        queries::get_subscriptions(
            db,
            &SubscriptionQuery {
                id: filter.id,
                account: filter.account.as_deref(),
                live: filter.live,
                new_money: filter.new_money,
            },
        )
    }
}

impl Subscription {
    pub fn id(&self) -> Option<i64> {
        self.get_int("id")
    }

    pub fn account_id(&self) -> Option<&str> {
        self.get_text("account_id")
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.get_date("date")
    }

    pub fn shares(&self) -> Option<f64> {
        self.get_real("shares")
    }

    pub fn origin(&self) -> Option<i64> {
        self.get_int("origin")
    }

    /// Shares left (an unknown amount counts as live).
    pub fn active(&self) -> bool {
        self.shares().map_or(true, |shares| shares > 0.0)
    }

    pub fn account(&self) -> Result<Option<&Account>> {
        memo(&self.account, self.bound(), || account_filter(self.account_id()))
    }

    /// NAV of the fund on the subscription day.
    pub fn nav(&self) -> Result<Option<f64>> {
        self.nav
            .get_or_try_init(|| -> Result<Option<f64>> {
                match (self.account()?, self.day()) {
                    (Some(account), Some(day)) => nav_on(self.bound()?, account.isin(), day),
                    _ => Ok(None),
                }
            })
            .copied()
    }

    /// Money paid; derived from the NAV when not recorded.
    pub fn cost(&self) -> Result<Option<f64>> {
        match self.get_real("cost").filter(|&cost| cost != 0.0) {
            Some(cost) => Ok(Some(cost)),
            None if self.connector().is_none() => Ok(None),
            None => Ok(self.nav()?.zip(self.shares()).map(|(nav, shares)| nav * shares)),
        }
    }

    /// Part of the cost that did not buy shares.
    pub fn fee(&self) -> Result<Option<f64>> {
        let (Some(cost), Some(shares)) = (self.cost()?, self.shares()) else {
            return Ok(None);
        };
        Ok(self.nav()?.map(|nav| cost - nav * shares))
    }

    /// Sale whose refund funded this subscription.
    pub fn origin_sale(&self) -> Result<Option<&Sale>> {
        memo_key(&self.sale, self.bound(), self.origin(), sale_filter)
    }
}

record! {
    /// Shares sold from an account.
    pub struct Sale: "order* account_id date shares refund comment" {
        decode date => decode_date;
        encode date => encode_date;
        cache account: Option<Account>;
        cache nav: Option<f64>;
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaleFilter {
    pub order: Option<i64>,
    pub account: Option<String>,
    pub refunded: Option<bool>,
}

impl Table for Sale {
    type Filter = SaleFilter;

    fn insert_row(&self, db: &Connector) -> Result<Value> {
        let mut row = self.values();
        if let Some(refund) = self.refund()? {
            row[4] = Value::Real(refund);
        }
        queries::sell(db, &row)
    }

    fn select(db: &Connector, filter: &SaleFilter) -> Result<RowStream> {
        queries::get_sales(db, filter.order, filter.account.as_deref(), filter.refunded)
    }
}

impl Sale {
    pub fn order(&self) -> Option<i64> {
        self.get_int("order")
    }

    pub fn account_id(&self) -> Option<&str> {
        self.get_text("account_id")
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.get_date("date")
    }

    pub fn shares(&self) -> Option<f64> {
        self.get_real("shares")
    }

    pub fn comment(&self) -> Option<&str> {
        self.get_text("comment")
    }

    pub fn account(&self) -> Result<Option<&Account>> {
        memo(&self.account, self.bound(), || account_filter(self.account_id()))
    }

    /// NAV of the fund on the sale day.
    pub fn nav(&self) -> Result<Option<f64>> {
        self.nav
            .get_or_try_init(|| -> Result<Option<f64>> {
                match (self.account()?, self.day()) {
                    (Some(account), Some(day)) => nav_on(self.bound()?, account.isin(), day),
                    _ => Ok(None),
                }
            })
            .copied()
    }

    /// Money received; derived from the NAV when not recorded.
    pub fn refund(&self) -> Result<Option<f64>> {
        match self.get_real("refund").filter(|&refund| refund != 0.0) {
            Some(refund) => Ok(Some(refund)),
            None if self.connector().is_none() => Ok(None),
            None => Ok(self.nav()?.zip(self.shares()).map(|(nav, shares)| nav * shares)),
        }
    }
}

record! {
    /// Money moved from one fund to another: a sale and the subscription
    /// it funded.
    pub struct Transfer: "order* source_id sale_date sale_shares amount target_id purchase_date purchase_shares comment" {
        decode sale_date => decode_date;
        decode purchase_date => decode_date;
        encode sale_date => encode_date;
        encode purchase_date => encode_date;
        cache source: Option<Account>;
        cache target: Option<Account>;
        cache sale: Option<Sale>;
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    pub order: Option<i64>,
    pub source: Option<String>,
    pub target: Option<String>,
}

impl Table for Transfer {
    type Filter = TransferFilter;

    fn insert_row(&self, db: &Connector) -> Result<Value> {
        queries::transfer(db, &self.values())
    }

    fn select(db: &Connector, filter: &TransferFilter) -> Result<RowStream> {
        queries::get_transfers(db, filter.order, filter.source.as_deref(), filter.target.as_deref())
    }
}

impl Transfer {
    pub fn order(&self) -> Option<i64> {
        self.get_int("order")
    }

    pub fn source(&self) -> Result<Option<&Account>> {
        memo(&self.source, self.bound(), || account_filter(self.get_text("source_id")))
    }

    pub fn target(&self) -> Result<Option<&Account>> {
        memo(&self.target, self.bound(), || account_filter(self.get_text("target_id")))
    }

    pub fn sale(&self) -> Result<Option<&Sale>> {
        memo_key(&self.sale, self.bound(), self.order(), sale_filter)
    }
}

record! {
    /// Holdings of an account, valued at the latest known quote.
    pub struct Portfolio: "isin account_id distributor capital date nav shares valuation gain" {
        decode date => decode_date;
        encode date => encode_date;
        cache account: Option<Account>;
        cache fund: Option<Fund>;
    }
}

#[derive(Debug, Clone, Default)]
pub struct PortfolioFilter {
    pub fund: Option<String>,
    pub distributor: Option<String>,
    pub live: Option<bool>,
    /// Either bound set: holdings of that period instead of today's
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl Table for Portfolio {
    type Filter = PortfolioFilter;

    fn select(db: &Connector, filter: &PortfolioFilter) -> Result<RowStream> {
        queries::get_portfolio(
            db,
            &PortfolioQuery {
                fund: filter.fund.as_deref(),
                distributor: filter.distributor.as_deref(),
                live: filter.live,
                from: filter.from,
                to: filter.to,
            },
        )
    }
}

impl Portfolio {
    pub fn isin(&self) -> &str {
        self.get_text("isin").unwrap_or_default()
    }

    pub fn account_id(&self) -> Option<&str> {
        self.get_text("account_id")
    }

    pub fn distributor(&self) -> Option<&str> {
        self.get_text("distributor")
    }

    pub fn capital(&self) -> Option<f64> {
        self.get_real("capital")
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.get_date("date")
    }

    pub fn nav(&self) -> Option<f64> {
        self.get_real("nav")
    }

    pub fn shares(&self) -> Option<f64> {
        self.get_real("shares")
    }

    pub fn valuation(&self) -> Option<f64> {
        self.get_real("valuation")
    }

    pub fn gain(&self) -> Option<f64> {
        self.get_real("gain")
    }

    pub fn account(&self) -> Result<Option<&Account>> {
        memo(&self.account, self.bound(), || account_filter(self.account_id()))
    }

    pub fn fund(&self) -> Result<Option<&Fund>> {
        memo(&self.fund, self.bound(), || fund_filter(self.isin()))
    }
}

record! {
    /// One step of an investment chain, from the original subscription
    /// through the transfers that moved it.
    pub struct History: "divestment subscription_id account_id order start date sale_date cost shares refund" {
        decode start => decode_date;
        decode date => decode_date;
        decode sale_date => decode_date;
        encode start => encode_date;
        encode date => encode_date;
        encode sale_date => encode_date;
        cache account: Option<Account>;
        cache subscription: Option<Subscription>;
    }
}

impl Table for History {
    type Filter = HistoryQuery;

    fn select(db: &Connector, filter: &HistoryQuery) -> Result<RowStream> {
        queries::get_history(db, filter)
    }
}

impl History {
    /// False while the investment is still held.
    pub fn refunded(&self) -> bool {
        self.get_int("order").map_or(false, |order| order != 0)
    }

    pub fn account(&self) -> Result<Option<&Account>> {
        memo(&self.account, self.bound(), || account_filter(self.get_text("account_id")))
    }

    pub fn subscription(&self) -> Result<Option<&Subscription>> {
        memo_key(&self.subscription, self.bound(), self.get_int("subscription_id"), subscription_filter)
    }
}

record! {
    /// Gain of shares sold (or still held, for order 0), per original
    /// subscription.
    pub struct CapitalGain: "divestment start capital origin_id sale_date order subscription_id account_id shares refund" {
        decode start => decode_date;
        decode sale_date => decode_date;
        encode start => encode_date;
        encode sale_date => encode_date;
        cache account: Option<Account>;
        cache subscription: Option<Subscription>;
        cache origin: Option<Subscription>;
    }
}

#[derive(Debug, Clone, Default)]
pub struct CapitalGainFilter {
    pub origin: Option<i64>,
    pub order: Option<i64>,
    pub account: Option<String>,
}

impl Table for CapitalGain {
    type Filter = CapitalGainFilter;

    fn select(db: &Connector, filter: &CapitalGainFilter) -> Result<RowStream> {
        queries::get_capital_gains(db, filter.origin, filter.order, filter.account.as_deref())
    }
}

impl CapitalGain {
    pub fn start(&self) -> Option<NaiveDate> {
        self.get_date("start")
    }

    pub fn sale_date(&self) -> Option<NaiveDate> {
        self.get_date("sale_date")
    }

    pub fn capital(&self) -> Option<f64> {
        self.get_real("capital")
    }

    pub fn shares(&self) -> Option<f64> {
        self.get_real("shares")
    }

    pub fn refund(&self) -> Option<f64> {
        self.get_real("refund")
    }

    /// True once the shares were actually sold.
    pub fn realised(&self) -> bool {
        self.get_int("order").map_or(false, |order| order != 0)
    }

    pub fn account(&self) -> Result<Option<&Account>> {
        memo(&self.account, self.bound(), || account_filter(self.get_text("account_id")))
    }

    pub fn subscription(&self) -> Result<Option<&Subscription>> {
        memo_key(&self.subscription, self.bound(), self.get_int("subscription_id"), subscription_filter)
    }

    /// Original subscription of the investment chain.
    pub fn origin(&self) -> Result<Option<&Subscription>> {
        memo_key(&self.origin, self.bound(), self.get_int("origin_id"), subscription_filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::queries::{sell, subscribe, transfer};
    use crate::core::FundError;
    use crate::test_utils::{date, FakeFetcher, StoreFixture};
    use std::rc::Rc;

    /// ACC-1 bought 10 shares (id 1), sold 4 of them (order 1) and moved
    /// 2 more to ACC-2 (order 2, subscription 2).
    fn movements() -> StoreFixture {
        let fixture = StoreFixture::with_samples();
        fixture
            .db
            .transaction(|db| {
                subscribe(db, &[Value::Null, "ACC-1".into(), date(2023, 5, 2).into(), 10.0.into(), 1000.0.into(), Value::Null])?;
                sell(db, &[Value::Null, "ACC-1".into(), date(2024, 1, 8).into(), 4.0.into(), 420.0.into(), Value::Null])?;
                transfer(
                    db,
                    &[
                        Value::Null,
                        "ACC-1".into(),
                        date(2024, 2, 1).into(),
                        2.0.into(),
                        230.0.into(),
                        "ACC-2".into(),
                        Value::Null,
                        20.0.into(),
                        Value::Null,
                    ],
                )?;
                Ok::<_, FundError>(())
            })
            .unwrap();
        fixture
    }

    fn nulls<const N: usize>() -> [Value; N] {
        std::array::from_fn(|_| Value::Null)
    }

    #[test]
    fn test_transfer_without_order_has_no_sale() {
        let fixture = movements();
        fixture
            .db
            .transaction(|db| -> Result<()> {
                let pending = db.entity::<Transfer>()?.new(nulls::<9>())?;
                assert!(pending.sale()?.is_none());

                let stored = db.entity::<Transfer>()?.all()?.first()?.unwrap();
                assert_eq!(stored.sale()?.and_then(Sale::order), Some(2));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_history_without_subscription_id_has_no_subscription() {
        let fixture = movements();
        fixture
            .db
            .transaction(|db| -> Result<()> {
                let histories = db.entity::<History>()?;
                assert!(histories.new(nulls::<10>())?.subscription()?.is_none());

                let mut row = nulls::<10>();
                row[1] = Value::Integer(2);
                let step = histories.new(row)?;
                assert_eq!(step.subscription()?.and_then(Subscription::account_id), Some("ACC-2"));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_capital_gain_without_ids_has_no_subscriptions() {
        let fixture = movements();
        fixture
            .db
            .transaction(|db| -> Result<()> {
                let gains = db.entity::<CapitalGain>()?;
                let orphan = gains.new(nulls::<10>())?;
                assert!(orphan.subscription()?.is_none());
                assert!(orphan.origin()?.is_none());

                let mut row = nulls::<10>();
                row[3] = Value::Integer(1);
                row[6] = Value::Integer(2);
                let gain = gains.new(row)?;
                assert_eq!(gain.origin()?.and_then(Subscription::id), Some(1));
                assert_eq!(gain.subscription()?.and_then(Subscription::origin), Some(2));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_origin_sale_follows_the_transfer() {
        let fixture = movements();
        fixture
            .db
            .transaction(|db| -> Result<()> {
                let subscriptions: Vec<Subscription> = db
                    .entity::<Subscription>()?
                    .get(SubscriptionFilter {
                        live: None,
                        ..Default::default()
                    })?
                    .collect::<Result<_>>()?;
                assert_eq!(subscriptions.len(), 2);
                assert!(subscriptions[0].origin_sale()?.is_none());
                assert_eq!(subscriptions[1].origin_sale()?.and_then(Sale::shares), Some(2.0));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_cost_and_refund_use_the_fetched_nav() {
        let fixture = StoreFixture::with_samples();
        let db = &fixture.db;
        let day = [Value::from("ACC-1"), Value::Date(date(2024, 3, 8))];

        // Nothing stored and nothing to fetch with
        let cost = db
            .transaction(|db| {
                let [account, date] = day.clone();
                db.entity::<Subscription>()?
                    .new([Value::Null, account, date, 100.0.into(), Value::Null, Value::Null])?
                    .cost()
            })
            .unwrap();
        assert_eq!(cost, None);

        let fetcher = Rc::new(FakeFetcher::csv("fecha;vl\n2024-03-08 00:00:00.0;10,5\n"));
        db.provide(PluginManager::with_builtin(fetcher.clone()));
        let (cost, refund) = db
            .transaction(|db| -> Result<_> {
                let [account, date] = day.clone();
                let subscription = db.entity::<Subscription>()?.new([
                    Value::Null,
                    account.clone(),
                    date.clone(),
                    100.0.into(),
                    Value::Null,
                    Value::Null,
                ])?;
                let sale = db
                    .entity::<Sale>()?
                    .new([Value::Null, account, date, 10.0.into(), Value::Null, Value::Null])?;
                Ok((subscription.cost()?, sale.refund()?))
            })
            .unwrap();
        assert_eq!(cost, Some(1050.0));
        assert_eq!(refund, Some(105.0));
        // The second lookup found the quote stored by the first
        assert_eq!(fetcher.requests().len(), 1);
    }
}
