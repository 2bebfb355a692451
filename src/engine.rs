//! Rate engine facade
//!
//! Owns the injected storage handle and collaborator seams, and exposes
//! the four-operation boundary (resolve, generate closure, find gaps,
//! convert) plus the authoritative mutations that trigger closure
//! regeneration. Callable from any transport; no request/response
//! shuttling lives here.

use crate::closure::{self, ClosureOutcome};
use crate::convert::{self, Conversion, ConvertedSum, DatedAmount};
use crate::currency::{ActiveCurrencySet, CurrencyCode, CurrencyRegistry};
use crate::error::{RateError, Result};
use crate::feed::{parse_rates_csv, RateFeed};
use crate::gaps::{self, RateGap};
use crate::resolver::{self, Resolution};
use crate::store::{RateEdge, RateKind, RateStore};
use crate::types::{EdgeId, EffectiveDate, Rate, UserId};
use std::collections::{BTreeSet, HashMap};
use std::io;
use std::sync::{Arc, Mutex, RwLock};

/// Read-only source of per-user settings (an external collaborator)
pub trait SettingsProvider: Send + Sync {
    /// The user's active currencies and designated base
    fn active_set(&self, user: UserId) -> Result<ActiveCurrencySet>;
}

/// Map-backed settings provider, for tests and embedded use
#[derive(Debug, Default)]
pub struct InMemorySettings {
    sets: RwLock<HashMap<UserId, ActiveCurrencySet>>,
}

impl InMemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_active(&self, user: UserId, set: ActiveCurrencySet) {
        self.sets.write().unwrap().insert(user, set);
    }
}

impl SettingsProvider for InMemorySettings {
    fn active_set(&self, user: UserId) -> Result<ActiveCurrencySet> {
        self.sets
            .read()
            .unwrap()
            .get(&user)
            .cloned()
            .ok_or_else(|| RateError::Validation(format!("No active currency set for user {}", user)))
    }
}

/// Result of applying an external feed payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedOutcome {
    /// Authoritative Fetched edges upserted
    pub applied: usize,
    /// The closure run triggered by the write
    pub closure: ClosureOutcome,
}

/// The rate engine
///
/// Storage, registry and settings are constructed by the caller and
/// passed in; the engine holds no global state and has a lifecycle
/// independent of any persistence technology.
pub struct RateEngine {
    store: Arc<dyn RateStore>,
    registry: CurrencyRegistry,
    settings: Arc<dyn SettingsProvider>,
    /// Serializes closure runs: concurrent regeneration for the same
    /// user/date must never interleave the replace step.
    closure_lock: Mutex<()>,
}

impl RateEngine {
    pub fn new(
        store: Arc<dyn RateStore>,
        registry: CurrencyRegistry,
        settings: Arc<dyn SettingsProvider>,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
            closure_lock: Mutex::new(()),
        }
    }

    /// The currency registry this engine resolves codes against
    pub fn registry(&self) -> &CurrencyRegistry {
        &self.registry
    }

    /// Mutable registry access, for registering custom currencies
    pub fn registry_mut(&mut self) -> &mut CurrencyRegistry {
        &mut self.registry
    }

    /// Conversion factor from `from` to `to` as of `as_of`
    pub fn resolve(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
        as_of: EffectiveDate,
    ) -> Result<Resolution> {
        resolver::resolve(self.store.as_ref(), user, from, to, as_of)
    }

    /// Upsert a manual authoritative rate and regenerate the closure for
    /// its effective date
    pub fn set_rate(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
        rate: Rate,
        effective_date: EffectiveDate,
        note: Option<String>,
    ) -> Result<EdgeId> {
        self.registry.require(user, from)?;
        self.registry.require(user, to)?;
        let edge = RateEdge::authoritative(
            user,
            from.clone(),
            to.clone(),
            rate,
            effective_date,
            RateKind::Manual,
            note,
        )?;
        let id = self.store.upsert_authoritative(edge)?;
        log::debug!(
            "Set manual rate {}->{} = {} effective {} for user {}",
            from,
            to,
            rate,
            effective_date,
            user
        );
        self.generate_closure(user, effective_date)?;
        Ok(id)
    }

    /// Delete an authoritative rate; every Derived edge that depended on
    /// it is invalidated by the closure re-run for that date
    pub fn remove_rate(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
        effective_date: EffectiveDate,
        kind: RateKind,
    ) -> Result<bool> {
        if !kind.is_authoritative() {
            return Err(RateError::Validation(
                "Derived edges are removed by closure regeneration, not directly".to_string(),
            ));
        }
        let removed = self
            .store
            .delete_authoritative(user, from, to, effective_date, kind)?;
        if removed {
            log::debug!(
                "Removed {} rate {}->{} effective {} for user {}",
                kind.as_str(),
                from,
                to,
                effective_date,
                user
            );
            self.generate_closure(user, effective_date)?;
        }
        Ok(removed)
    }

    /// Materialize Derived edges for (user, date)
    ///
    /// Runs are serialized; the store's replace step is atomic.
    pub fn generate_closure(&self, user: UserId, date: EffectiveDate) -> Result<ClosureOutcome> {
        let active = self.settings.active_set(user)?;
        let _guard = self.closure_lock.lock().unwrap();
        closure::generate(self.store.as_ref(), user, &active, date)
    }

    /// Missing rates for the user's active set as of today
    pub fn find_gaps(&self, user: UserId) -> Result<Vec<RateGap>> {
        self.find_gaps_as_of(user, chrono::Utc::now().date_naive())
    }

    /// Missing rates as of an explicit date (deterministic variant)
    pub fn find_gaps_as_of(&self, user: UserId, today: EffectiveDate) -> Result<Vec<RateGap>> {
        let active = self.settings.active_set(user)?;
        gaps::find_gaps(self.store.as_ref(), &self.registry, user, &active, today)
    }

    /// Convert one amount into the target currency at a point in time
    pub fn convert(
        &self,
        user: UserId,
        amount: f64,
        from: &CurrencyCode,
        to: &CurrencyCode,
        date: EffectiveDate,
    ) -> Result<Conversion> {
        convert::convert_amount(
            self.store.as_ref(),
            &self.registry,
            user,
            amount,
            from,
            to,
            date,
        )
    }

    /// Convert and sum dated amounts, flagging unresolvable legs
    pub fn convert_sum(
        &self,
        user: UserId,
        amounts: &[DatedAmount],
        to: &CurrencyCode,
    ) -> Result<ConvertedSum> {
        convert::convert_sum(self.store.as_ref(), &self.registry, user, amounts, to)
    }

    /// Fetch rates from an external feed and apply them as Fetched edges
    ///
    /// The whole payload is validated before the first write; a feed
    /// failure or malformed entry leaves the rate store untouched and is
    /// reported as transient. A base->base entry (some feeds include the
    /// base at 1.0) is ignored.
    pub fn apply_feed(
        &self,
        user: UserId,
        feed: &dyn RateFeed,
        base: &CurrencyCode,
        date: EffectiveDate,
    ) -> Result<FeedOutcome> {
        self.registry.require(user, base)?;
        let payload = feed.fetch(base, date)?;

        let mut edges = Vec::with_capacity(payload.len());
        for (code, rate) in payload {
            if &code == base {
                continue;
            }
            edges.push(RateEdge::authoritative(
                user,
                base.clone(),
                code,
                rate,
                date,
                RateKind::Fetched,
                None,
            )?);
        }

        let applied = edges.len();
        for edge in edges {
            self.store.upsert_authoritative(edge)?;
        }
        log::info!(
            "Applied {} fetched rates from {} for user {} on {}",
            applied,
            base,
            user,
            date
        );
        let closure = self.generate_closure(user, date)?;
        Ok(FeedOutcome { applied, closure })
    }

    /// Bulk-import manual rates from CSV and regenerate each touched date
    ///
    /// Returns the number of imported rows. The file is fully validated
    /// before the first write.
    pub fn import_rates_csv<R: io::Read>(&self, user: UserId, reader: R) -> Result<usize> {
        let rows = parse_rates_csv(reader)?;
        for row in &rows {
            self.registry.require(user, &row.from)?;
            self.registry.require(user, &row.to)?;
        }

        let mut dates = BTreeSet::new();
        for row in rows.iter().cloned() {
            let edge = RateEdge::authoritative(
                user,
                row.from,
                row.to,
                row.rate,
                row.date,
                RateKind::Manual,
                row.note,
            )?;
            self.store.upsert_authoritative(edge)?;
            dates.insert(row.date);
        }
        for date in &dates {
            self.generate_closure(user, *date)?;
        }
        log::info!(
            "Imported {} manual rates across {} dates for user {}",
            rows.len(),
            dates.len(),
            user
        );
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::StaticRateFeed;
    use crate::store::InMemoryRateStore;
    use chrono::NaiveDate;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn engine_for(user: UserId, active: &[&str], base: &str) -> RateEngine {
        let settings = InMemorySettings::new();
        settings.set_active(
            user,
            ActiveCurrencySet::new(active.iter().map(|c| code(c)).collect(), code(base)),
        );
        RateEngine::new(
            Arc::new(InMemoryRateStore::new()),
            CurrencyRegistry::with_defaults(),
            Arc::new(settings),
        )
    }

    #[test]
    fn test_set_rate_triggers_closure() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR"], "USD");
        let d = date(2024, 1, 1);

        engine
            .set_rate(user, &code("USD"), &code("EUR"), 0.92, d, None)
            .unwrap();

        // The reverse edge was materialized without an explicit closure call
        let res = engine.resolve(user, &code("EUR"), &code("USD"), d).unwrap();
        assert!((res.rate().unwrap() - 1.0 / 0.92).abs() < 1e-12);
    }

    #[test]
    fn test_set_rate_unknown_currency_rejected() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR"], "USD");
        let d = date(2024, 1, 1);

        let result = engine.set_rate(user, &code("ZZZ"), &code("USD"), 1.0, d, None);
        assert!(matches!(result, Err(RateError::UnknownCurrency(_))));
    }

    #[test]
    fn test_remove_rate_invalidates_derived() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR"], "USD");
        let d = date(2024, 1, 1);

        engine
            .set_rate(user, &code("USD"), &code("EUR"), 0.92, d, None)
            .unwrap();
        assert!(engine
            .remove_rate(user, &code("USD"), &code("EUR"), d, RateKind::Manual)
            .unwrap());

        assert_eq!(
            engine.resolve(user, &code("EUR"), &code("USD"), d).unwrap(),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_remove_derived_directly_rejected() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR"], "USD");
        let d = date(2024, 1, 1);

        let result = engine.remove_rate(user, &code("EUR"), &code("USD"), d, RateKind::Derived);
        assert!(matches!(result, Err(RateError::Validation(_))));
    }

    #[test]
    fn test_apply_feed() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR", "CNY"], "USD");
        let d = date(2024, 1, 1);

        let mut feed = StaticRateFeed::new();
        feed.set(
            code("USD"),
            d,
            HashMap::from([
                (code("USD"), 1.0), // base entry is skipped
                (code("EUR"), 0.92),
                (code("CNY"), 7.1),
            ]),
        );

        let outcome = engine.apply_feed(user, &feed, &code("USD"), d).unwrap();
        assert_eq!(outcome.applied, 2);
        assert!(outcome.closure.created > 0);
        assert!(engine.find_gaps_as_of(user, d).unwrap().is_empty());
    }

    #[test]
    fn test_failed_feed_leaves_store_untouched() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR"], "USD");
        let d = date(2024, 1, 1);

        let feed = StaticRateFeed::new(); // no data configured
        let result = engine.apply_feed(user, &feed, &code("USD"), d);
        assert!(matches!(result, Err(RateError::UpstreamFeed(_))));

        assert_eq!(
            engine.resolve(user, &code("USD"), &code("EUR"), d).unwrap(),
            Resolution::NotFound
        );
    }

    #[test]
    fn test_fetched_shadows_manual_same_date() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR"], "USD");
        let d = date(2024, 1, 1);

        engine
            .set_rate(user, &code("USD"), &code("EUR"), 0.90, d, None)
            .unwrap();

        let mut feed = StaticRateFeed::new();
        feed.set(code("USD"), d, HashMap::from([(code("EUR"), 0.92)]));
        engine.apply_feed(user, &feed, &code("USD"), d).unwrap();

        let res = engine.resolve(user, &code("USD"), &code("EUR"), d).unwrap();
        assert_eq!(res, Resolution::Found(0.92));
    }

    #[test]
    fn test_csv_import() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR", "CNY"], "USD");

        let csv_data = "\
date,from,to,rate,note
2024-01-01,USD,EUR,0.92,
2024-01-02,USD,CNY,7.1,feed backfill
";
        let imported = engine.import_rates_csv(user, csv_data.as_bytes()).unwrap();
        assert_eq!(imported, 2);

        // Each date got its own closure run
        let res = engine
            .resolve(user, &code("EUR"), &code("USD"), date(2024, 1, 1))
            .unwrap();
        assert!(res.is_found());
        let res = engine
            .resolve(user, &code("CNY"), &code("USD"), date(2024, 1, 2))
            .unwrap();
        assert!(res.is_found());
    }

    #[test]
    fn test_csv_import_validates_currencies_before_writing() {
        let user = UserId::new_v4();
        let engine = engine_for(user, &["EUR"], "USD");

        let csv_data = "\
date,from,to,rate,note
2024-01-01,USD,EUR,0.92,
2024-01-01,USD,ZZZ,5.0,
";
        assert!(engine.import_rates_csv(user, csv_data.as_bytes()).is_err());

        // The valid first row must not have been written either
        let res = engine
            .resolve(user, &code("USD"), &code("EUR"), date(2024, 1, 1))
            .unwrap();
        assert_eq!(res, Resolution::NotFound);
    }
}
