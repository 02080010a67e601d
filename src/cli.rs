//! Command line front end
//!
//! `Cli` is the clap definition of the arguments; it resolves into
//! `Options`. `run` loads the configuration, sets up logging, opens the
//! database and then `execute`s the requested registrations, extraction
//! and report.
use crate::backend::model::{
    Account, CapitalGain, Fund, FundFilter, Portfolio, PortfolioFilter, Quote, QuoteFilter, Sale,
    Subscription, Transfer,
};
use crate::backend::store::{self, StoreOptions, BUNDLED_SCHEMA};
use crate::backend::tasks;
use crate::config::{self, Config, DATABASE_ENV};
use crate::core::db::{Connector, DumpSink, Key, Table, Value, DATE_FORMAT};
use crate::core::{FundError, Result};
use crate::input::{self, LineKind};
use crate::logging::{self, DEFAULT_VERBOSITY, MAX_VERBOSITY};
use crate::report::{self, ExportFormat};
use crate::scraper::PluginManager;
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{ArgAction, ArgGroup, Parser};
use std::fs::OpenOptions;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{error, info, warn};

const DEFAULT_HISTORY_DAYS: usize = 10;

/// Keeps track of mutual fund investments.
///
/// Registration options read one record per line from stdin, fields
/// separated by '|'. Blank lines and lines starting with '#' are ignored.
#[derive(Debug, Parser)]
#[command(name = "fundledger", version)]
#[command(group(
    ArgGroup::new("input").args(["fund", "account", "subscription", "sale", "transfer", "nav", "quotes"])
))]
#[command(group(ArgGroup::new("report").args(["portfolio", "gains", "history", "portfolio_history"])))]
pub struct Cli {
    /// Show more information; repeat for more detail
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Show errors only
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file
    #[arg(short = 'C', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Database file
    #[arg(short = 'D', long, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// File the SQL of every change is appended to
    #[arg(short, long, value_name = "FILE")]
    pub dump: Option<PathBuf>,

    /// Fetch the latest quote of every fund held
    #[arg(short, long)]
    pub extract: bool,

    /// Fetch the quotes a report needs and are missing
    #[arg(short = 'E', long)]
    pub force_extract: bool,

    /// Report format: table, csv, json or markdown
    #[arg(short = 'o', long, value_name = "FORMAT", default_value = "table", value_parser = ExportFormat::from_str)]
    pub format: ExportFormat,

    /// ISIN|NAME|ALIAS|MANAGER|SCRAPER|RISK[|ACTIVE|CURRENCY|SCRAPER_DATA]
    #[arg(short, long, help_heading = "Registration")]
    pub fund: bool,

    /// ID|ISIN|DISTRIBUTOR
    #[arg(short = 'c', long, help_heading = "Registration")]
    pub account: bool,

    /// ACCOUNT|DATE[|COST|SHARES]
    #[arg(short, long, help_heading = "Registration")]
    pub subscription: bool,

    /// ACCOUNT|DATE|SHARES[|REFUND|COMMENT]
    #[arg(short = 'r', long, help_heading = "Registration")]
    pub sale: bool,

    /// ACCOUNT|DATE|TARGET[|PURCHASE_DATE|SHARES|REFUND|PURCHASE_SHARES|COMMENT]
    #[arg(short, long, help_heading = "Registration")]
    pub transfer: bool,

    /// ISIN|DATE[|NAV] (fetched with the fund's scraper when missing)
    #[arg(short = 'l', long, help_heading = "Registration")]
    pub nav: bool,

    /// ISIN|FROM[|TO] (quotes fetched with the fund's scraper)
    #[arg(short = 'L', long, help_heading = "Registration")]
    pub quotes: bool,

    /// Current investments
    #[arg(short = 'i', long, help_heading = "Reports")]
    pub portfolio: bool,

    /// Capital gains
    #[arg(short = 'p', long, help_heading = "Reports")]
    pub gains: bool,

    /// Latest quotes of a fund (10 days by default)
    #[arg(short = 'H', long, value_name = "ISIN[:DAYS]", value_parser = parse_history, help_heading = "Reports")]
    pub history: Option<Report>,

    /// Investments of a period, valued at its last quote
    #[arg(short = 'I', long, value_name = "FROM[:TO]", value_parser = parse_period, help_heading = "Reports")]
    pub portfolio_history: Option<Report>,
}

/// Report requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    Portfolio,
    Gains,
    History { isin: String, days: usize },
    /// Open bounds read as unbounded
    PortfolioHistory {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    /// Set by `-v`/`-q`; the configuration decides otherwise
    pub verbose: Option<u8>,
    pub config: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub dump: Option<PathBuf>,
    pub extract: bool,
    pub force_extract: bool,
    pub input: Option<LineKind>,
    pub report: Option<Report>,
    pub format: ExportFormat,
}

impl From<Cli> for Options {
    fn from(cli: Cli) -> Self {
        let verbose = match (cli.quiet, cli.verbose) {
            (true, _) => Some(0),
            (false, 0) => None,
            (false, count) => Some(DEFAULT_VERBOSITY.saturating_add(count).min(MAX_VERBOSITY)),
        };
        let input = [
            (cli.fund, LineKind::Fund),
            (cli.account, LineKind::Account),
            (cli.subscription, LineKind::Subscription),
            (cli.sale, LineKind::Sale),
            (cli.transfer, LineKind::Transfer),
            (cli.nav, LineKind::Nav),
            (cli.quotes, LineKind::Quotes),
        ]
        .into_iter()
        .find_map(|(set, kind)| set.then_some(kind));
        let report = cli
            .history
            .or(cli.portfolio_history)
            .or_else(|| cli.portfolio.then_some(Report::Portfolio))
            .or_else(|| cli.gains.then_some(Report::Gains));

        Options {
            verbose,
            config: cli.config,
            database: cli.database,
            dump: cli.dump,
            extract: cli.extract,
            force_extract: cli.force_extract,
            input,
            report,
            format: cli.format,
        }
    }
}

/// Parses `ISIN[:DAYS]`.
pub fn parse_history(arg: &str) -> Result<Report> {
    match arg.split_once(':') {
        Some((isin, days)) => {
            let days = days
                .trim()
                .parse()
                .map_err(|_| FundError::Command(format!("The days of \"{}\" are not an integer", arg)))?;
            Ok(Report::History {
                isin: isin.trim().to_string(),
                days,
            })
        }
        None => Ok(Report::History {
            isin: arg.trim().to_string(),
            days: DEFAULT_HISTORY_DAYS,
        }),
    }
}

/// Parses `FROM[:TO]`. Either date may be left out, not both.
pub fn parse_period(arg: &str) -> Result<Report> {
    let bound = |text: &str| -> Result<Option<NaiveDate>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Some)
            .map_err(|_| FundError::Command(format!("\"{}\" is not a YYYY-MM-DD date", text)))
    };
    let (from, to) = arg.split_once(':').unwrap_or((arg, ""));
    match (bound(from)?, bound(to)?) {
        (None, None) => Err(FundError::Command("A period needs a start or an end date".into())),
        (Some(from), Some(to)) if from > to => {
            Err(FundError::Command(format!("The period \"{}\" ends before it starts", arg)))
        }
        (from, to) => Ok(Report::PortfolioHistory { from, to }),
    }
}

/// Sink appending every committed change to `path`.
fn dump_sink(path: PathBuf) -> DumpSink {
    Box::new(move |sql: &str| {
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut file| file.write_all(sql.as_bytes()));
        if let Err(e) = written {
            error!("Cannot write to {}: {}", path.display(), e);
        }
    })
}

/// Opens the database named by the options, the environment or the
/// configuration, in that order.
pub fn open_store(options: &Options, config: &Config) -> Result<Connector> {
    let path = options
        .database
        .clone()
        .unwrap_or_else(|| config.database_path(std::env::var(DATABASE_ENV).ok()));
    let path = path
        .to_str()
        .ok_or_else(|| FundError::Config(format!("{} is not a valid path", path.display())))?;

    let dump = options.dump.clone().or_else(|| config.database.dump.clone());
    let store_options = StoreOptions {
        schema: Some(config.schema()?.unwrap_or_else(|| BUNDLED_SCHEMA.to_string())),
        foreign_keys: config.database.foreign_keys.unwrap_or(true),
        dump: dump.map(dump_sink),
    };
    store::open(path, store_options)
}

/// Entry point of the binary.
pub fn run(options: Options) -> Result<()> {
    let config = config::load(options.config.as_deref())?;
    let verbose = options
        .verbose
        .or(config.logging.verbose)
        .unwrap_or(DEFAULT_VERBOSITY);
    logging::init(verbose, config.logging.file.as_deref())?;

    let db = open_store(&options, &config)?;
    let plugins = PluginManager::http()?;
    let stdout = io::stdout();
    let color = stdout.is_terminal();
    let result = execute(&options, &db, &plugins, io::stdin().lock(), &mut stdout.lock(), color);
    db.close()?;
    result
}

/// Registers the records read from `input`, extracts quotes and writes the
/// requested report to `out`.
pub fn execute(
    options: &Options,
    db: &Connector,
    plugins: &PluginManager,
    input: impl BufRead,
    out: &mut dyn Write,
    color: bool,
) -> Result<()> {
    db.provide(plugins.clone());
    if let Some(kind) = options.input {
        let count = register_lines(db, plugins, kind, input)?;
        info!("{} {} lines processed", count, kind.name());
    }

    let now = Local::now().naive_local();
    if options.extract {
        let extraction = tasks::extract_latest_quotes(db, plugins, None, now)?;
        info!(
            "{} quotes stored, {} funds skipped, {} failed",
            extraction.stored, extraction.skipped, extraction.failed
        );
    }

    let grid = match &options.report {
        None => return Ok(()),
        Some(Report::Portfolio) => show_portfolio(db, plugins, (None, None), options.force_extract, now)?,
        Some(Report::PortfolioHistory { from, to }) => {
            show_portfolio(db, plugins, (*from, *to), options.force_extract, now)?
        }
        Some(Report::Gains) => db.transaction(|db| {
            let gains = db.entity::<CapitalGain>()?.all()?.collect::<Result<Vec<_>>>()?;
            report::capital_gains(&gains)
        })?,
        Some(Report::History { isin, days }) => match show_history(db, isin, *days)? {
            Some(grid) => grid,
            None => return Ok(()),
        },
    };
    let color = color && options.format == ExportFormat::Table;
    out.write_all(grid.write(options.format, color)?.as_bytes())?;
    Ok(())
}

fn insert<R: Table>(db: &Connector, row: Vec<Value>) -> Result<Key> {
    db.entity::<R>()?.new(row)?.insert()
}

fn register(db: &Connector, plugins: &PluginManager, kind: LineKind, row: Vec<Value>) -> Result<()> {
    match kind {
        LineKind::Fund => insert::<Fund>(db, row).map(drop),
        LineKind::Account => insert::<Account>(db, row).map(drop),
        LineKind::Subscription => insert::<Subscription>(db, row).map(drop),
        LineKind::Sale => insert::<Sale>(db, row).map(drop),
        LineKind::Transfer => insert::<Transfer>(db, row).map(drop),
        LineKind::Nav if row.get(2).map_or(true, Value::is_null) => {
            let [Value::Text(isin), Value::Date(date), _] = row.as_slice() else {
                return Err(FundError::Parse(format!("Bad quote {:?}", row)));
            };
            match Quote::force_get(&db.entity::<Quote>()?, plugins, isin, *date)? {
                Some(_) => Ok(()),
                None => Err(FundError::Command(format!("No NAV of {} on {}", isin, date))),
            }
        }
        LineKind::Nav => insert::<Quote>(db, row).map(drop),
        LineKind::Quotes => {
            let (isin, date, days) = match row.as_slice() {
                [isin, Value::Date(date), days] => (isin.as_str().unwrap_or_default().to_string(), *date, days.as_i64()),
                _ => return Err(FundError::Parse(format!("Bad quote range {:?}", row))),
            };
            tasks::load_quotes(db, plugins, &isin, date, days).map(drop)
        }
    }
}

/// Registers every line of `input` in one session. Bad fund and quote
/// lines are reported and skipped; any other failure undoes the whole
/// input.
fn register_lines(db: &Connector, plugins: &PluginManager, kind: LineKind, input: impl BufRead) -> Result<usize> {
    db.transaction(|db| {
        let mut count = 0;
        for line in input.lines() {
            let line = line?;
            if input::is_skipped(&line) {
                continue;
            }
            let registered = input::parse_line(&line, kind).and_then(|row| register(db, plugins, kind, row));
            match registered {
                Ok(()) => count += 1,
                Err(e) if matches!(kind, LineKind::Fund | LineKind::Quotes) => {
                    error!("{}: {}", line.trim(), e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok::<_, FundError>(count)
    })
}

/// Live holdings, today's or those of `period`.
fn show_portfolio(
    db: &Connector,
    plugins: &PluginManager,
    period: (Option<NaiveDate>, Option<NaiveDate>),
    force_extract: bool,
    now: NaiveDateTime,
) -> Result<report::ResultsGrid> {
    db.transaction(|db| {
        let (from, to) = period;
        let live = || PortfolioFilter {
            live: Some(true),
            from,
            to,
            ..Default::default()
        };
        let portfolio = db.entity::<Portfolio>()?;
        let mut holdings = portfolio.get(live())?.collect::<Result<Vec<_>>>()?;

        if force_extract {
            let quotes = db.entity::<Quote>()?;
            let day = to.unwrap_or_else(|| tasks::reference_day(now, None));
            let mut fetched = false;
            for holding in holdings.iter().filter(|h| h.valuation().is_none()) {
                let date = holding.day().unwrap_or(day);
                match Quote::force_get(&quotes, plugins, holding.isin(), date)? {
                    Some(_) => fetched = true,
                    None => warn!(
                        "Unable to value {} [{}]",
                        holding.isin(),
                        holding.distributor().unwrap_or_default()
                    ),
                }
            }
            if fetched {
                holdings = portfolio.get(live())?.collect::<Result<Vec<_>>>()?;
            }
        }
        report::portfolio(&holdings)
    })
}

fn show_history(db: &Connector, isin: &str, days: usize) -> Result<Option<report::ResultsGrid>> {
    db.transaction(|db| {
        let fund = db
            .entity::<Fund>()?
            .get(FundFilter {
                isin: Some(isin.to_string()),
                active: None,
            })?
            .first()?
            .ok_or_else(|| FundError::Command(format!("{}: unknown fund", isin)))?;
        // One more than shown, as the base of the oldest variation
        let quotes = db
            .entity::<Quote>()?
            .get(QuoteFilter {
                isin: isin.to_string(),
                limit: days + 1,
                ..Default::default()
            })?
            .collect::<Result<Vec<_>>>()?;
        if quotes.is_empty() {
            warn!("No quotes of '{}'", fund.alias());
            return Ok(None);
        }
        Ok(Some(report::quote_history(&fund, &quotes, days)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::Record;
    use crate::test_utils::{date, FakeFetcher, StoreFixture};
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use std::rc::Rc;

    fn parse(args: &[&str]) -> std::result::Result<Options, clap::Error> {
        Cli::try_parse_from(std::iter::once("fundledger").chain(args.iter().copied())).map(Options::from)
    }

    fn plugins() -> PluginManager {
        PluginManager::with_builtin(Rc::new(FakeFetcher::csv("fecha;vl\n")))
    }

    fn conflict(args: &[&str]) -> bool {
        parse(args).map_or_else(|e| e.kind() == ErrorKind::ArgumentConflict, |_| false)
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let options = parse(&["-vv", "-D", "funds.db", "--format=csv", "-s", "-i"]).unwrap();
        assert_eq!(options.verbose, Some(3));
        assert_eq!(options.database, Some(PathBuf::from("funds.db")));
        assert_eq!(options.format, ExportFormat::Csv);
        assert_eq!(options.input, Some(LineKind::Subscription));
        assert_eq!(options.report, Some(Report::Portfolio));

        assert_eq!(parse(&["-v", "-v", "-v", "-v", "-v"]).unwrap().verbose, Some(4));
        assert_eq!(parse(&["--quiet"]).unwrap().verbose, Some(0));
        assert_eq!(parse(&[]).unwrap(), Options::default());
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(conflict(&["-f", "-c"]));
        assert!(conflict(&["-l", "--quotes"]));
        assert!(conflict(&["-i", "-p"]));
        assert!(conflict(&["-H", "ES01", "-I", "2024-01-01"]));
        assert!(conflict(&["-q", "-v"]));
        assert!(parse(&["-D"]).is_err());
        assert_eq!(parse(&["-o", "xml"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(parse(&["-I", "soon"]).unwrap_err().kind(), ErrorKind::ValueValidation);
        assert_eq!(parse(&["--nope"]).unwrap_err().kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn test_parse_period() {
        assert_eq!(
            parse_period("2024-01-01:2024-03-31").unwrap(),
            Report::PortfolioHistory {
                from: Some(date(2024, 1, 1)),
                to: Some(date(2024, 3, 31))
            }
        );
        assert_eq!(
            parse_period("2024-01-01").unwrap(),
            Report::PortfolioHistory {
                from: Some(date(2024, 1, 1)),
                to: None
            }
        );
        assert_eq!(
            parse_period(" : 2024-03-31").unwrap(),
            Report::PortfolioHistory {
                from: None,
                to: Some(date(2024, 3, 31))
            }
        );
        assert!(parse_period(":").is_err());
        assert!(parse_period("2024-03-31:2024-01-01").is_err());
        assert!(parse_period("31/03/2024").is_err());

        let options = parse(&["--portfolio-history", ":2024-03-31"]).unwrap();
        assert_eq!(
            options.report,
            Some(Report::PortfolioHistory {
                from: None,
                to: Some(date(2024, 3, 31))
            })
        );
    }

    #[test]
    fn test_parse_history() {
        assert_eq!(
            parse_history("ES01").unwrap(),
            Report::History {
                isin: "ES01".into(),
                days: 10
            }
        );
        assert_eq!(
            parse_history("ES01 : 3").unwrap(),
            Report::History {
                isin: "ES01".into(),
                days: 3
            }
        );
        assert!(parse_history("ES01:many").is_err());
    }

    #[test]
    fn test_register_and_report_portfolio() {
        let fixture = StoreFixture::with_samples();
        let plugins = plugins();
        let mut out = Vec::new();

        let subscribe = parse(&["-s"]).unwrap();
        let lines = "# account|date|cost|shares\nACC-1|2024-01-02|1000|100\n\n";
        execute(&subscribe, &fixture.db, &plugins, lines.as_bytes(), &mut out, false).unwrap();

        let nav = parse(&["-l", "-i", "-o", "csv"]).unwrap();
        execute(&nav, &fixture.db, &plugins, "ES0000000001|2024-03-01|11\n".as_bytes(), &mut out, false).unwrap();

        let csv = String::from_utf8(out).unwrap();
        assert_eq!(
            csv,
            "Fund,ISIN,R,Distributor,Capital,%Portfolio,Date,Shares,NAV,Gain\n\
             Alpha,ES0000000001,3,Bank One,1000.00,100.00,01/03/2024,100.00,11.0000,+100.00\n"
        );
    }

    #[test]
    fn test_failed_line_undoes_the_input() {
        let fixture = StoreFixture::with_samples();
        let options = parse(&["-c"]).unwrap();
        let lines = "ACC-3|ES0000000001|Bank Three\nACC-1|ES0000000001|Duplicate\n";
        let result = execute(&options, &fixture.db, &plugins(), lines.as_bytes(), &mut Vec::new(), false);
        assert!(result.is_err());

        let accounts = fixture
            .db
            .transaction(|db| db.entity::<Account>()?.all().map(Iterator::count))
            .unwrap();
        assert_eq!(accounts, 2);
    }

    #[test]
    fn test_bad_fund_lines_are_skipped() {
        let fixture = StoreFixture::with_samples();
        let options = parse(&["-f"]).unwrap();
        let lines = "ES0000000001|Dup|D|M|vinea|3\nES0000000003|Gamma|G|M|vinea|9\nES0000000004|Delta|D|M|vinea|2|1\n";
        execute(&options, &fixture.db, &plugins(), lines.as_bytes(), &mut Vec::new(), false).unwrap();

        let funds: Vec<Fund> = fixture
            .db
            .transaction(|db| db.entity::<Fund>()?.all()?.collect::<Result<Vec<_>>>())
            .unwrap();
        let isins: Vec<&str> = funds.iter().map(Fund::isin).collect();
        assert_eq!(isins, vec!["ES0000000001", "ES0000000002", "ES0000000004"]);
        assert!(funds[2].active());
    }

    #[test]
    fn test_history_report() {
        let fixture = StoreFixture::with_samples();
        let plugins = plugins();
        let options = parse(&["-l"]).unwrap();
        let lines = "ES0000000001|2024-03-01|10\nES0000000001|2024-03-04|11\nES0000000001|2024-03-05|10.45\n";
        execute(&options, &fixture.db, &plugins, lines.as_bytes(), &mut Vec::new(), false).unwrap();

        let mut out = Vec::new();
        let history = parse(&["-H", "ES0000000001:2", "-o", "csv"]).unwrap();
        execute(&history, &fixture.db, &plugins, io::empty(), &mut out, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Date,NAV,Var.\n05/03/2024,10.4500,-5.00%\n04/03/2024,11.0000,10.00%\n"
        );

        let unknown = parse(&["-H", "XX0000000000"]).unwrap();
        let result = execute(&unknown, &fixture.db, &plugins, io::empty(), &mut Vec::new(), false);
        assert!(matches!(result, Err(FundError::Command(_))));
    }

    #[test]
    fn test_nav_line_without_value_is_fetched() {
        let fixture = StoreFixture::with_samples();
        let fetcher = Rc::new(FakeFetcher::csv("fecha;vl\n2024-03-08 00:00:00.0;10,5\n"));
        let plugins = PluginManager::with_builtin(fetcher.clone());
        let options = parse(&["-l"]).unwrap();
        execute(&options, &fixture.db, &plugins, "ES0000000001|2024-03-08\n".as_bytes(), &mut Vec::new(), false)
            .unwrap();

        let quote = fixture
            .db
            .transaction(|db| Quote::on(&db.entity::<Quote>()?, "ES0000000001", date(2024, 3, 8)))
            .unwrap()
            .unwrap();
        assert_eq!(quote.nav(), Some(10.5));
        assert_eq!(fetcher.requests().len(), 1);
    }

    #[test]
    fn test_unfetchable_nav_line_undoes_the_input() {
        let fixture = StoreFixture::with_samples();
        let options = parse(&["-l"]).unwrap();
        let lines = "ES0000000001|2024-03-07|10\nES0000000001|2024-03-08\n";
        let result = execute(&options, &fixture.db, &plugins(), lines.as_bytes(), &mut Vec::new(), false);
        assert!(matches!(result, Err(FundError::Command(_))));

        let stored = fixture
            .db
            .transaction(|db| Quote::last(&db.entity::<Quote>()?, "ES0000000001", None))
            .unwrap();
        assert!(stored.is_none());
    }

    #[test]
    fn test_subscription_cost_from_fetched_nav() {
        let fixture = StoreFixture::with_samples();
        let plugins = PluginManager::with_builtin(Rc::new(FakeFetcher::csv("fecha;vl\n2024-03-08 00:00:00.0;10,5\n")));
        let options = parse(&["-s"]).unwrap();
        execute(&options, &fixture.db, &plugins, "ACC-1|2024-03-08||100\n".as_bytes(), &mut Vec::new(), false)
            .unwrap();

        let (subscriptions, quote) = fixture
            .db
            .transaction(|db| -> Result<_> {
                let subscriptions = db.entity::<Subscription>()?.all()?.collect::<Result<Vec<_>>>()?;
                let quote = Quote::on(&db.entity::<Quote>()?, "ES0000000001", date(2024, 3, 8))?;
                Ok((subscriptions, quote))
            })
            .unwrap();
        assert_eq!(subscriptions.len(), 1);
        assert_eq!(subscriptions[0].get_real("cost"), Some(1050.0));
        assert_eq!(quote.and_then(|q| q.nav()), Some(10.5));
    }

    #[test]
    fn test_portfolio_history_report() {
        let fixture = StoreFixture::with_samples();
        let plugins = plugins();
        let subscribe = parse(&["-s"]).unwrap();
        let lines = "ACC-1|2024-01-02|1000|100\nACC-1|2024-03-05|500|40\n";
        execute(&subscribe, &fixture.db, &plugins, lines.as_bytes(), &mut Vec::new(), false).unwrap();
        let navs = parse(&["-l"]).unwrap();
        let lines = "ES0000000001|2024-02-29|11\nES0000000001|2024-03-29|12\n";
        execute(&navs, &fixture.db, &plugins, lines.as_bytes(), &mut Vec::new(), false).unwrap();

        let mut out = Vec::new();
        let february = parse(&["-I", ":2024-02-29", "-o", "csv"]).unwrap();
        execute(&february, &fixture.db, &plugins, io::empty(), &mut out, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Fund,ISIN,R,Distributor,Capital,%Portfolio,Date,Shares,NAV,Gain\n\
             Alpha,ES0000000001,3,Bank One,1000.00,100.00,29/02/2024,100.00,11.0000,+100.00\n"
        );

        let mut out = Vec::new();
        let march = parse(&["-I", "2024-03-01", "-o", "csv"]).unwrap();
        execute(&march, &fixture.db, &plugins, io::empty(), &mut out, false).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Fund,ISIN,R,Distributor,Capital,%Portfolio,Date,Shares,NAV,Gain\n\
             Alpha,ES0000000001,3,Bank One,500.00,100.00,29/03/2024,40.00,12.0000,-20.00\n"
        );
    }
}
