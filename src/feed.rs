//! External rate feed interface and bulk CSV import
//!
//! The engine treats each feed entry as a candidate Fetched edge
//! (base -> code) and applies the same upsert rules as manual input. A
//! failed or malformed fetch leaves the rate store untouched.

use crate::currency::CurrencyCode;
use crate::error::{RateError, Result};
use crate::types::{EffectiveDate, Rate};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::io;

/// A source of exchange rates for a base currency and date
///
/// Implementations wrap an external provider (HTTP client, file drop,
/// test fixture). Transport concerns such as timeouts belong to the
/// implementation; a failure must surface as [`RateError::UpstreamFeed`]
/// and must not write anything.
pub trait RateFeed: Send + Sync {
    /// Rates from `base` into each returned currency, effective on `date`
    fn fetch(
        &self,
        base: &CurrencyCode,
        date: EffectiveDate,
    ) -> Result<HashMap<CurrencyCode, Rate>>;
}

/// Fixed-table feed, for tests and offline seeding
#[derive(Debug, Clone, Default)]
pub struct StaticRateFeed {
    rates: HashMap<(CurrencyCode, EffectiveDate), HashMap<CurrencyCode, Rate>>,
}

impl StaticRateFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the payload returned for (base, date)
    pub fn set(
        &mut self,
        base: CurrencyCode,
        date: EffectiveDate,
        rates: HashMap<CurrencyCode, Rate>,
    ) {
        self.rates.insert((base, date), rates);
    }
}

impl RateFeed for StaticRateFeed {
    fn fetch(
        &self,
        base: &CurrencyCode,
        date: EffectiveDate,
    ) -> Result<HashMap<CurrencyCode, Rate>> {
        self.rates
            .get(&(base.clone(), date))
            .cloned()
            .ok_or_else(|| {
                RateError::UpstreamFeed(format!("No feed data for {} on {}", base, date))
            })
    }
}

/// One validated rate row ready for upserting
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRate {
    pub date: EffectiveDate,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    pub rate: Rate,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    from: String,
    to: String,
    rate: f64,
    note: Option<String>,
}

/// Parse a CSV of manual rates: `date,from,to,rate,note` with a header row
///
/// The whole file is validated before anything is returned, so a bad row
/// means no partial import.
pub fn parse_rates_csv<R: io::Read>(reader: R) -> Result<Vec<ParsedRate>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut rows = Vec::new();
    for record in csv_reader.deserialize::<CsvRow>() {
        let row = record?;
        let from = CurrencyCode::new(&row.from)?;
        let to = CurrencyCode::new(&row.to)?;
        if from == to {
            return Err(RateError::Validation(format!(
                "Self-edge {}->{} in CSV import",
                from, to
            )));
        }
        if !row.rate.is_finite() || row.rate <= 0.0 {
            return Err(RateError::Validation(format!(
                "Rate must be a positive finite number, got: {}",
                row.rate
            )));
        }
        rows.push(ParsedRate {
            date: row.date,
            from,
            to,
            rate: row.rate,
            note: row.note.filter(|n| !n.is_empty()),
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_static_feed() {
        let mut feed = StaticRateFeed::new();
        let d = date(2024, 1, 1);
        feed.set(
            code("USD"),
            d,
            HashMap::from([(code("EUR"), 0.92), (code("CNY"), 7.1)]),
        );

        let rates = feed.fetch(&code("USD"), d).unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[&code("EUR")], 0.92);

        let err = feed.fetch(&code("USD"), date(2024, 1, 2));
        assert!(matches!(err, Err(RateError::UpstreamFeed(_))));
    }

    #[test]
    fn test_parse_csv() {
        let csv_data = "\
date,from,to,rate,note
2024-01-01,USD,EUR,0.92,ECB fixing
2024-01-01,usd,cny,7.1,
";
        let rows = parse_rates_csv(csv_data.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].from, code("USD"));
        assert_eq!(rows[0].note.as_deref(), Some("ECB fixing"));
        assert_eq!(rows[1].to, code("CNY"));
        assert_eq!(rows[1].note, None);
    }

    #[test]
    fn test_parse_csv_rejects_bad_rows() {
        let bad_rate = "date,from,to,rate,note\n2024-01-01,USD,EUR,-1.0,\n";
        assert!(parse_rates_csv(bad_rate.as_bytes()).is_err());

        let self_edge = "date,from,to,rate,note\n2024-01-01,USD,USD,1.0,\n";
        assert!(parse_rates_csv(self_edge.as_bytes()).is_err());

        let bad_date = "date,from,to,rate,note\nyesterday,USD,EUR,0.92,\n";
        assert!(parse_rates_csv(bad_date.as_bytes()).is_err());
    }
}
