//! # ratebook
//!
//! Exchange-rate resolution and closure generation for a personal
//! multi-currency ledger.
//!
//! Users (or an external rate feed) supply a sparse set of direct
//! conversion rates; ratebook maintains, per user and per effective date,
//! a consistent directed graph of rate edges so that any two currencies
//! the user actually uses can always be converted. The closure generator
//! materializes the missing edges (reverses and transitive paths), the
//! gap reporter surfaces what remains unresolvable, and the conversion
//! applier turns amounts into a target currency with per-currency
//! rounding.
//!
//! ## Example
//!
//! ```rust
//! use ratebook::prelude::*;
//! use std::sync::Arc;
//!
//! let user = UserId::new_v4();
//! let settings = InMemorySettings::new();
//! settings.set_active(
//!     user,
//!     ActiveCurrencySet::new(
//!         vec!["EUR".parse().unwrap(), "CNY".parse().unwrap()],
//!         "USD".parse().unwrap(),
//!     ),
//! );
//!
//! let engine = RateEngine::new(
//!     Arc::new(InMemoryRateStore::new()),
//!     CurrencyRegistry::with_defaults(),
//!     Arc::new(settings),
//! );
//!
//! let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
//! let usd: CurrencyCode = "USD".parse().unwrap();
//! let eur: CurrencyCode = "EUR".parse().unwrap();
//!
//! // One authoritative edge is enough for both directions
//! engine.set_rate(user, &usd, &eur, 0.92, date, None).unwrap();
//! let rate = engine.resolve(user, &eur, &usd, date).unwrap();
//! assert!(rate.is_found());
//! ```

pub mod closure;
pub mod convert;
pub mod currency;
pub mod engine;
pub mod error;
pub mod feed;
pub mod gaps;
pub mod resolver;
pub mod store;
pub mod types;

pub mod prelude {
    //! Commonly used types and traits
    pub use crate::closure::ClosureOutcome;
    pub use crate::convert::{Conversion, ConvertedSum, DatedAmount};
    pub use crate::currency::{
        ActiveCurrencySet, Currency, CurrencyCode, CurrencyRegistry, CurrencyScope,
    };
    pub use crate::engine::{FeedOutcome, InMemorySettings, RateEngine, SettingsProvider};
    pub use crate::error::{RateError, Result};
    pub use crate::feed::{RateFeed, StaticRateFeed};
    pub use crate::gaps::RateGap;
    pub use crate::resolver::Resolution;
    pub use crate::store::{
        InMemoryRateStore, RateEdge, RateKind, RateStore, SqliteRateStore,
    };
    pub use crate::types::{EdgeId, EffectiveDate, Rate, UserId};
}
