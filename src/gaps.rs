//! Gap reporter - which active-currency rates are still missing
//!
//! A pure read over the rate store: diffs the pairs aggregation needs
//! (every active currency into the base) against what the resolver can
//! actually answer today, so the caller can prompt for manual input.

use crate::currency::{ActiveCurrencySet, Currency, CurrencyRegistry};
use crate::error::Result;
use crate::resolver::{resolve, Resolution};
use crate::store::RateStore;
use crate::types::{EffectiveDate, UserId};

/// A currency pair the resolver cannot answer
///
/// Carries full currency descriptors so the caller can render a prompt
/// without a second registry lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct RateGap {
    pub from: Currency,
    pub to: Currency,
}

/// Report every active currency whose conversion into the base is
/// unresolvable as of `today`
pub fn find_gaps<S: RateStore + ?Sized>(
    store: &S,
    registry: &CurrencyRegistry,
    user: UserId,
    active: &ActiveCurrencySet,
    today: EffectiveDate,
) -> Result<Vec<RateGap>> {
    let base = active.base();
    let mut gaps = Vec::new();

    for code in active.iter() {
        if code == base {
            continue;
        }
        if resolve(store, user, code, base, today)? == Resolution::NotFound {
            gaps.push(RateGap {
                from: registry.require(user, code)?.clone(),
                to: registry.require(user, base)?.clone(),
            });
        }
    }
    Ok(gaps)
}
