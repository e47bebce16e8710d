//! Per-ticker metric derivation.
//!
//! Every ratio is computed from the trailing `min_years` annual periods of its
//! input series. Short, degenerate or non-positive inputs yield `None` rather
//! than an error, so a ticker with thin coverage still produces a row.

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

use crate::models::{CompanyFinancials, FinancialSeries, MetricRecord, StatementTable};

/// Canonical statement line items the extractor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineItem {
    Revenue,
    NetIncome,
    Eps,
    OperatingCashflow,
    Ebit,
    TotalAssets,
    CurrentLiabilities,
}

/// Which provider statement a line item lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    Income,
    CashFlow,
    BalanceSheet,
}

impl LineItem {
    pub const ALL: [LineItem; 7] = [
        LineItem::Revenue,
        LineItem::NetIncome,
        LineItem::Eps,
        LineItem::OperatingCashflow,
        LineItem::Ebit,
        LineItem::TotalAssets,
        LineItem::CurrentLiabilities,
    ];

    /// Provider labels accepted for this item, most preferred first
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            LineItem::Revenue => &["Total Revenue", "Revenue", "Operating Revenue"],
            LineItem::NetIncome => &["Net Income", "NetIncome", "Net Income Common Stockholders"],
            LineItem::Eps => &["Diluted EPS", "EPS", "Basic EPS"],
            LineItem::OperatingCashflow => &[
                "Total Cash From Operating Activities",
                "Operating Cash Flow",
            ],
            LineItem::Ebit => &["EBIT", "Operating Income"],
            LineItem::TotalAssets => &["Total Assets"],
            LineItem::CurrentLiabilities => &["Total Current Liabilities", "Current Liabilities"],
        }
    }

    pub fn statement(&self) -> Statement {
        match self {
            LineItem::Revenue | LineItem::NetIncome | LineItem::Eps | LineItem::Ebit => {
                Statement::Income
            }
            LineItem::OperatingCashflow => Statement::CashFlow,
            LineItem::TotalAssets | LineItem::CurrentLiabilities => Statement::BalanceSheet,
        }
    }
}

pub type LineItemSeries = HashMap<LineItem, FinancialSeries>;

/// Resolve every canonical line item against the provider's statement tables
pub fn resolve_line_items(company: &CompanyFinancials) -> LineItemSeries {
    LineItem::ALL
        .into_iter()
        .map(|item| {
            let table: &StatementTable = match item.statement() {
                Statement::Income => &company.income_statement,
                Statement::CashFlow => &company.cash_flow,
                Statement::BalanceSheet => &company.balance_sheet,
            };
            (item, table.row(item.labels()))
        })
        .collect()
}

/// Derive every ratio for one ticker. Missing line items count as empty series.
pub fn extract(
    ticker: &str,
    series: &LineItemSeries,
    industry: Option<String>,
    min_years: usize,
) -> MetricRecord {
    let empty = FinancialSeries::default();
    let get = |item: LineItem| series.get(&item).unwrap_or(&empty);

    let mut record = MetricRecord::undefined(ticker, industry);
    record.revenue_cagr = cagr(get(LineItem::Revenue), min_years);
    record.net_income_cagr = cagr(get(LineItem::NetIncome), min_years);
    record.eps_cagr = cagr(get(LineItem::Eps), min_years);
    record.operating_cashflow_cagr = cagr(get(LineItem::OperatingCashflow), min_years);
    record.net_profit_margin_avg =
        average_margin(get(LineItem::NetIncome), get(LineItem::Revenue), min_years);
    record.roce = average_roce(
        get(LineItem::Ebit),
        get(LineItem::TotalAssets),
        get(LineItem::CurrentLiabilities),
        min_years,
    );
    record
}

/// Resolve and extract in one step, carrying market cap from the company profile
pub fn extract_company(company: &CompanyFinancials, min_years: usize) -> MetricRecord {
    let series = resolve_line_items(company);
    let industry = company
        .info
        .industry
        .as_ref()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty());

    let mut record = extract(&company.ticker, &series, industry, min_years);
    record.market_cap = company.info.market_cap.filter(|cap| cap.is_finite());
    record
}

/// Compound annual growth over the trailing `min_years` defined points.
///
/// The window spans `min_years - 1` compounding periods. Any zero or negative
/// value inside the window makes the growth rate undefined.
pub fn cagr(series: &FinancialSeries, min_years: usize) -> Option<f64> {
    let points = series.defined();
    if points.len() < min_years {
        return None;
    }
    let window = trailing(&points, min_years);
    if window.len() < 2 || window.iter().any(|(_, v)| *v <= 0.0) {
        return None;
    }

    let first = window[0].1;
    let last = window[window.len() - 1].1;
    let periods = (window.len() - 1) as f64;
    let growth = (last / first).powf(1.0 / periods) - 1.0;
    growth.is_finite().then_some(growth)
}

/// Mean of `numerator / denominator` over dates present in both trailing windows
pub fn average_margin(
    numerator: &FinancialSeries,
    denominator: &FinancialSeries,
    min_years: usize,
) -> Option<f64> {
    let numerator = numerator.defined();
    let denominator = denominator.defined();
    if numerator.len() < min_years || denominator.len() < min_years {
        return None;
    }

    let denominator: BTreeMap<NaiveDate, f64> =
        trailing(&denominator, min_years).iter().copied().collect();
    let ratios: Vec<f64> = trailing(&numerator, min_years)
        .iter()
        .filter_map(|(date, n)| denominator.get(date).map(|d| n / d))
        .filter(|ratio| ratio.is_finite())
        .collect();

    mean(&ratios)
}

/// Mean EBIT / (total assets - current liabilities) over the trailing EBIT window
pub fn average_roce(
    ebit: &FinancialSeries,
    total_assets: &FinancialSeries,
    current_liabilities: &FinancialSeries,
    min_years: usize,
) -> Option<f64> {
    let ebit = ebit.defined();
    let liabilities: BTreeMap<NaiveDate, f64> = current_liabilities.defined().into_iter().collect();
    let capital_employed: BTreeMap<NaiveDate, f64> = total_assets
        .defined()
        .into_iter()
        .filter_map(|(date, assets)| liabilities.get(&date).map(|l| (date, assets - l)))
        .collect();

    if ebit.len() < min_years || capital_employed.len() < min_years {
        return None;
    }

    let ratios: Vec<f64> = trailing(&ebit, min_years)
        .iter()
        .filter_map(|(date, e)| capital_employed.get(date).map(|capital| e / capital))
        .filter(|ratio| ratio.is_finite())
        .collect();

    mean(&ratios)
}

fn trailing<T>(points: &[T], n: usize) -> &[T] {
    &points[points.len().saturating_sub(n)..]
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
