//! Results Grid Module
//!
//! Tabular reports for the terminal. A grid is rendered as a boxed text
//! table, optionally coloured, or exported as CSV, JSON or Markdown.
use crate::backend::model::{CapitalGain, Fund, Portfolio, Quote};
use crate::core::db::Record;
use crate::core::{FundError, Result};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::str::FromStr;

const DISPLAY_DATE: &str = "%d/%m/%Y";

/// How a cell is aligned and formatted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Text,
    Number,
    Date,
    Empty,
}

/// Colour hint of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Plain,
    Gain,
    Loss,
}

impl Tone {
    fn of(value: f64) -> Self {
        if value > 0.0 {
            Tone::Gain
        } else if value < 0.0 {
            Tone::Loss
        } else {
            Tone::Plain
        }
    }
}

/// Represents a single cell in the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub content: String,
    pub kind: CellKind,
    pub tone: Tone,
}

impl Cell {
    pub fn text(content: impl Into<String>) -> Self {
        Cell {
            content: content.into(),
            kind: CellKind::Text,
            tone: Tone::Plain,
        }
    }

    pub fn empty() -> Self {
        Cell {
            content: String::new(),
            kind: CellKind::Empty,
            tone: Tone::Plain,
        }
    }

    pub fn int(value: Option<i64>) -> Self {
        value.map_or_else(Cell::empty, |v| Cell {
            content: v.to_string(),
            kind: CellKind::Number,
            tone: Tone::Plain,
        })
    }

    pub fn number(value: Option<f64>, decimals: usize) -> Self {
        value.map_or_else(Cell::empty, |v| Cell {
            content: format!("{:.*}", decimals, v),
            kind: CellKind::Number,
            tone: Tone::Plain,
        })
    }

    /// Signed amount toned by its sign.
    pub fn signed(value: Option<f64>) -> Self {
        value.map_or_else(Cell::empty, |v| Cell {
            content: format!("{:+.2}", v),
            kind: CellKind::Number,
            tone: Tone::of(v),
        })
    }

    pub fn date(value: Option<NaiveDate>) -> Self {
        value.map_or_else(Cell::empty, |d| Cell {
            content: d.format(DISPLAY_DATE).to_string(),
            kind: CellKind::Date,
            tone: Tone::Plain,
        })
    }

    pub fn toned(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }
}

/// Represents a row of cells in the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub cells: Vec<Cell>,
    pub row_index: usize,
    /// Inactive rows are rendered muted
    pub active: bool,
}

/// Output format of a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Table,
    Csv,
    Json,
    Markdown,
}

impl FromStr for ExportFormat {
    type Err = FundError;

    fn from_str(format: &str) -> Result<Self> {
        match format.to_lowercase().as_str() {
            "table" => Ok(ExportFormat::Table),
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "markdown" | "md" => Ok(ExportFormat::Markdown),
            _ => Err(FundError::Command(format!(
                "Unsupported export format: '{}'. Supported formats: table, csv, json, markdown",
                format
            ))),
        }
    }
}

/// Represents the entire grid structure.
#[derive(Debug, Clone, Default)]
pub struct ResultsGrid {
    pub title: Option<String>,
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl ResultsGrid {
    /// Creates a new, empty ResultsGrid.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the headers for the grid.
    pub fn set_headers<S: Into<String>>(&mut self, headers: impl IntoIterator<Item = S>) {
        self.headers = headers.into_iter().map(Into::into).collect();
    }

    /// Adds a row of plain text cells.
    pub fn add_row(&mut self, row: Vec<String>) {
        self.add_cells(row.into_iter().map(Cell::text).collect(), true);
    }

    pub fn add_cells(&mut self, cells: Vec<Cell>, active: bool) {
        self.rows.push(Row {
            cells,
            row_index: self.rows.len(),
            active,
        });
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.cells.iter().enumerate() {
                let len = cell.content.chars().count();
                match widths.get_mut(i) {
                    Some(width) => *width = (*width).max(len),
                    None => widths.push(len),
                }
            }
        }
        widths
    }

    /// Renders the grid as a boxed table. `color` adds ANSI colours: gains
    /// in green, losses in red and inactive rows in grey.
    pub fn render(&self, color: bool) -> String {
        let mut output = String::new();
        if let Some(title) = &self.title {
            output.push_str(title);
            output.push('\n');
        }
        if self.headers.is_empty() && self.rows.is_empty() {
            return output;
        }

        let widths = self.widths();
        let separator = format!(
            "+{}+\n",
            widths
                .iter()
                .map(|w| "-".repeat(w + 2))
                .collect::<Vec<_>>()
                .join("+")
        );

        output.push_str(&separator);
        if !self.headers.is_empty() {
            let headers: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, &w)| {
                    let header = self.headers.get(i).map_or("", String::as_str);
                    format!("{:^w$}", header, w = w)
                })
                .collect();
            output.push_str(&format!("| {} |\n", headers.join(" | ")));
            output.push_str(&separator);
        }
        for row in &self.rows {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, &w)| match row.cells.get(i) {
                    Some(cell) => paint(cell, w, row.active, color),
                    None => " ".repeat(w),
                })
                .collect();
            output.push_str(&format!("| {} |\n", cells.join(" | ")));
        }
        if !self.rows.is_empty() {
            output.push_str(&separator);
        }
        output
    }

    /// Renders the grid in `format`.
    pub fn write(&self, format: ExportFormat, color: bool) -> Result<String> {
        match format {
            ExportFormat::Table => Ok(self.render(color)),
            ExportFormat::Csv => self.export_to_csv(),
            ExportFormat::Json => self.export_to_json(),
            ExportFormat::Markdown => self.export_to_markdown(),
        }
    }

    /// Exports the grid data to a specified format.
    /// Supported formats: CSV, JSON, Markdown.
    pub fn export(&self, format: &str) -> Result<String> {
        self.write(format.parse()?, false)
    }

    fn export_to_csv(&self) -> Result<String> {
        let mut output = String::new();
        if !self.headers.is_empty() {
            let headers: Vec<String> = self.headers.iter().map(|h| csv_field(h)).collect();
            output.push_str(&headers.join(","));
            output.push('\n');
        }
        for row in &self.rows {
            let row_content: Vec<String> = row.cells.iter().map(|cell| csv_field(&cell.content)).collect();
            output.push_str(&row_content.join(","));
            output.push('\n');
        }
        Ok(output)
    }

    fn export_to_json(&self) -> Result<String> {
        let mut rows = Vec::new();
        for row in &self.rows {
            let mut row_map = BTreeMap::new();
            for (i, cell) in row.cells.iter().enumerate() {
                if let Some(header) = self.headers.get(i) {
                    row_map.insert(header.clone(), cell.content.clone());
                }
            }
            rows.push(row_map);
        }
        Ok(serde_json::to_string(&rows)?)
    }

    fn export_to_markdown(&self) -> Result<String> {
        let mut output = String::new();
        if !self.headers.is_empty() {
            output.push_str(&self.headers.join(" | "));
            output.push('\n');
            let underline: Vec<String> = self.headers.iter().map(|h| "-".repeat(h.len().max(3))).collect();
            output.push_str(&underline.join(" | "));
            output.push('\n');
        }
        for row in &self.rows {
            let row_content: Vec<&str> = row.cells.iter().map(|cell| cell.content.as_str()).collect();
            output.push_str(&row_content.join(" | "));
            output.push('\n');
        }
        Ok(output)
    }
}

fn paint(cell: &Cell, width: usize, active: bool, color: bool) -> String {
    let text = match cell.kind {
        CellKind::Number => format!("{:>w$}", cell.content, w = width),
        _ => format!("{:<w$}", cell.content, w = width),
    };
    if !color {
        return text;
    }
    match (active, cell.tone) {
        (false, _) => format!("\x1b[1;30m{}\x1b[0m", text),
        (true, Tone::Gain) => format!("\x1b[92m{}\x1b[0m", text),
        (true, Tone::Loss) => format!("\x1b[91m{}\x1b[0m", text),
        (true, Tone::Plain) => text,
    }
}

fn csv_field(content: &str) -> String {
    if content.contains([',', '"', '\n']) {
        format!("\"{}\"", content.replace('"', "\"\""))
    } else {
        content.to_string()
    }
}

/// Yearly rate equivalent to earning `gain` on `capital` over `days`, in
/// percent.
pub fn annualised(gain: f64, capital: f64, days: i64) -> Option<f64> {
    if capital == 0.0 || days <= 0 {
        return None;
    }
    Some(((1.0 + gain / capital).powf(365.0 / days as f64) - 1.0) * 100.0)
}

/// Latest quotes of a fund with their daily variation. `quotes` come newest
/// first and may hold one quote more than `days`, used as the base of the
/// oldest variation.
pub fn quote_history(fund: &Fund, quotes: &[Quote], days: usize) -> ResultsGrid {
    let mut grid = ResultsGrid::new();
    grid.title = Some(format!("Fund: {} -- {}", fund.alias(), fund.isin()));
    grid.set_headers(["Date", "NAV", "Var."]);

    let navs: Vec<(Option<NaiveDate>, f64)> = quotes.iter().filter_map(|q| q.nav().map(|nav| (q.day(), nav))).collect();
    for (i, &(day, nav)) in navs.iter().enumerate().take(days) {
        let previous = navs.get(i + 1).map_or(nav, |&(_, previous)| previous);
        let ratio = nav / previous;
        let tone = if (ratio * 1e5).round() / 1e5 < 1.0 {
            Tone::Loss
        } else {
            Tone::Gain
        };
        grid.add_cells(
            vec![
                Cell::date(day),
                Cell::number(Some(nav), 4).toned(tone),
                Cell {
                    content: format!("{:.2}%", (ratio - 1.0) * 100.0),
                    kind: CellKind::Number,
                    tone,
                },
            ],
            true,
        );
    }
    grid
}

/// Current holdings ordered by risk, with their gain and their share of
/// the total valuation.
pub fn portfolio(holdings: &[Portfolio]) -> Result<ResultsGrid> {
    let total: f64 = holdings.iter().filter_map(Portfolio::valuation).sum();

    let mut lines = Vec::with_capacity(holdings.len());
    for holding in holdings {
        let fund = holding.fund()?;
        let growth = match fund {
            Some(fund) => fund.growth()?,
            None => None,
        };
        let nav_tone = match growth {
            Some(true) => Tone::Gain,
            Some(false) => Tone::Loss,
            None => Tone::Plain,
        };
        let share = holding
            .valuation()
            .filter(|_| total != 0.0)
            .map(|valuation| valuation / total * 100.0);
        let risk = fund.and_then(Fund::risk);
        let cells = vec![
            Cell::text(fund.map_or("", Fund::alias)),
            Cell::text(holding.isin()),
            Cell::int(risk),
            Cell::text(holding.distributor().unwrap_or_default()),
            Cell::number(holding.capital(), 2),
            Cell::number(share, 2),
            Cell::date(holding.day()),
            Cell::number(holding.shares(), 2),
            Cell::number(holding.nav(), 4).toned(nav_tone),
            Cell::signed(holding.gain()),
        ];
        lines.push((risk.unwrap_or(0), cells));
    }
    lines.sort_by_key(|(risk, _)| *risk);

    let mut grid = ResultsGrid::new();
    grid.set_headers([
        "Fund", "ISIN", "R", "Distributor", "Capital", "%Portfolio", "Date", "Shares", "NAV", "Gain",
    ]);
    for (_, cells) in lines {
        grid.add_cells(cells, true);
    }
    Ok(grid)
}

/// Gains per investment, sold ones muted, followed by yearly totals of
/// what was sold.
pub fn capital_gains(gains: &[CapitalGain]) -> Result<ResultsGrid> {
    let mut grid = ResultsGrid::new();
    grid.set_headers([
        "ID", "Fund", "Distributor", "Capital", "Bought", "Sold", "Shares", "Refund", "Gain", "Gain (%)", "APR (%)",
    ]);

    let mut totals: BTreeMap<i32, (f64, f64, f64)> = BTreeMap::new();
    for row in gains {
        let (fund, distributor) = match row.account()? {
            Some(account) => (
                account.fund()?.map(|fund| fund.alias().to_string()),
                account.distributor().map(str::to_string),
            ),
            None => (None, None),
        };
        let capital = row.capital();
        let gain = row.refund().zip(capital).map(|(refund, capital)| refund - capital);
        let days = row
            .sale_date()
            .zip(row.start())
            .map(|(sold, bought)| (sold - bought).num_days());

        if let (Some(sold), Some(capital), Some(refund), Some(gain)) = (row.sale_date(), capital, row.refund(), gain) {
            let total = totals.entry(sold.year()).or_default();
            total.0 += capital;
            total.1 += refund;
            total.2 += gain;
        }

        let tone = gain.map_or(Tone::Plain, Tone::of);
        let percent = gain.zip(capital).filter(|&(_, c)| c != 0.0).map(|(g, c)| g / c * 100.0);
        let apr = match (gain, capital, days) {
            (Some(gain), Some(capital), Some(days)) => annualised(gain, capital, days),
            _ => None,
        };
        grid.add_cells(
            vec![
                Cell::text(format!(
                    "{}/{}",
                    row.get_int("divestment").unwrap_or_default(),
                    row.get_int("order").unwrap_or_default()
                )),
                Cell::text(fund.unwrap_or_default()),
                Cell::text(distributor.unwrap_or_default()),
                Cell::number(capital, 2),
                Cell::date(row.start()),
                Cell::date(row.sale_date()),
                Cell::number(row.shares(), 2),
                Cell::number(row.refund(), 2).toned(tone),
                Cell::signed(gain),
                Cell::signed(percent),
                Cell::signed(apr),
            ],
            !row.realised(),
        );
    }

    for (year, (capital, refund, gain)) in totals {
        let tone = Tone::of(gain);
        let percent = (capital != 0.0).then(|| gain / capital * 100.0);
        grid.add_cells(
            vec![
                Cell::empty(),
                Cell::text("Total"),
                Cell::text(year.to_string()),
                Cell::number(Some(capital), 2),
                Cell::empty(),
                Cell::empty(),
                Cell::empty(),
                Cell::number(Some(refund), 2).toned(tone),
                Cell::signed(Some(gain)),
                Cell::signed(percent),
                Cell::empty(),
            ],
            true,
        );
    }
    Ok(grid)
}
