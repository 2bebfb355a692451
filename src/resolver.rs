//! Rate resolver - "what is the conversion factor from A to B as of date D"

use crate::currency::CurrencyCode;
use crate::error::Result;
use crate::store::RateStore;
use crate::types::{EffectiveDate, Rate, UserId};

/// Outcome of a rate lookup
///
/// A missing rate is a first-class value, not an error: callers must branch
/// on it and treat it as a recoverable, reportable gap, never as a silent
/// zero or identity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Found(Rate),
    NotFound,
}

impl Resolution {
    /// The rate, if one was found
    pub fn rate(&self) -> Option<Rate> {
        match self {
            Resolution::Found(rate) => Some(*rate),
            Resolution::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

/// Resolve the conversion factor from `from` to `to` as of `as_of`
///
/// Identity conversions return 1 unconditionally, with no lookup. Otherwise
/// the edge with the latest `effective_date <= as_of` wins; when several
/// kinds share that date, Fetched beats Manual beats Derived, so explicit
/// or sourced data is never shadowed by generated data.
pub fn resolve<S: RateStore + ?Sized>(
    store: &S,
    user: UserId,
    from: &CurrencyCode,
    to: &CurrencyCode,
    as_of: EffectiveDate,
) -> Result<Resolution> {
    if from == to {
        return Ok(Resolution::Found(1.0));
    }

    let edges = store.edges_for_pair(user, from, to)?;
    let best = edges
        .iter()
        .filter(|e| e.effective_date <= as_of)
        .max_by(|a, b| {
            a.effective_date
                .cmp(&b.effective_date)
                .then(b.kind.precedence().cmp(&a.kind.precedence()))
        });

    Ok(match best {
        Some(edge) => Resolution::Found(edge.rate),
        None => Resolution::NotFound,
    })
}
