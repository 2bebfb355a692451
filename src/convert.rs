//! Conversion applier - turn amounts into a target currency
//!
//! Point-in-time balances convert at their own date; flow-style sums
//! convert each component at its own transaction date, never the period
//! end. A missing rate flags the result instead of failing the whole
//! aggregation: partial correctness beats total failure on a dashboard.

use crate::currency::{CurrencyCode, CurrencyRegistry};
use crate::error::Result;
use crate::resolver::{resolve, Resolution};
use crate::store::RateStore;
use crate::types::{round_half_even, EffectiveDate, UserId};

/// A monetary amount in its native currency, dated for conversion
#[derive(Debug, Clone, PartialEq)]
pub struct DatedAmount {
    pub amount: f64,
    pub currency: CurrencyCode,
    pub date: EffectiveDate,
}

impl DatedAmount {
    pub fn new(amount: f64, currency: CurrencyCode, date: EffectiveDate) -> Self {
        Self {
            amount,
            currency,
            date,
        }
    }
}

/// Outcome of converting a single amount
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    Converted {
        /// Rounded to the target currency's decimal places (half-even)
        value: f64,
        /// Unrounded product, for callers that keep summing
        precise: f64,
    },
    /// No rate was resolvable for the amount's date
    Unresolved,
}

impl Conversion {
    pub fn value(&self) -> Option<f64> {
        match self {
            Conversion::Converted { value, .. } => Some(*value),
            Conversion::Unresolved => None,
        }
    }
}

/// Sum of converted amounts with a reliability flag
///
/// `value` is rounded once, at the aggregate, to the target currency's
/// precision. `has_conversion_errors` is set when any component amount had
/// no resolvable rate; such components contribute nothing to the sum,
/// which downstream displays must surface rather than present as precise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvertedSum {
    pub value: f64,
    pub precise: f64,
    pub has_conversion_errors: bool,
}

/// Convert one amount into the target currency at the given date
pub fn convert_amount<S: RateStore + ?Sized>(
    store: &S,
    registry: &CurrencyRegistry,
    user: UserId,
    amount: f64,
    from: &CurrencyCode,
    to: &CurrencyCode,
    date: EffectiveDate,
) -> Result<Conversion> {
    let target = registry.require(user, to)?;
    registry.require(user, from)?;

    Ok(match resolve(store, user, from, to, date)? {
        Resolution::Found(rate) => {
            let precise = amount * rate;
            Conversion::Converted {
                value: round_half_even(precise, target.decimal_places),
                precise,
            }
        }
        Resolution::NotFound => Conversion::Unresolved,
    })
}

/// Convert a set of dated amounts into the target currency and sum them
pub fn convert_sum<S: RateStore + ?Sized>(
    store: &S,
    registry: &CurrencyRegistry,
    user: UserId,
    amounts: &[DatedAmount],
    to: &CurrencyCode,
) -> Result<ConvertedSum> {
    let target = registry.require(user, to)?;
    let mut precise = 0.0;
    let mut has_conversion_errors = false;

    for amount in amounts {
        registry.require(user, &amount.currency)?;
        match resolve(store, user, &amount.currency, to, amount.date)? {
            Resolution::Found(rate) => precise += amount.amount * rate,
            Resolution::NotFound => has_conversion_errors = true,
        }
    }

    Ok(ConvertedSum {
        value: round_half_even(precise, target.decimal_places),
        precise,
        has_conversion_errors,
    })
}
