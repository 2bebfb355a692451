//! In-memory rate store
//!
//! Pair-keyed maps with a BTreeMap per pair so as-of lookups are range
//! queries. Suitable for tests and for callers that load a user's edges up
//! front; the SQLite store is the persistent counterpart.

use super::{RateEdge, RateKind, RateStore};
use crate::currency::CurrencyCode;
use crate::error::Result;
use crate::types::{EdgeId, EffectiveDate, UserId};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

type PairKey = (CurrencyCode, CurrencyCode);
type PairHistory = BTreeMap<EffectiveDate, HashMap<RateKind, RateEdge>>;

/// In-memory implementation of [`RateStore`]
///
/// Storage layout: user -> (from, to) -> effective date -> kind -> edge.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateStore {
    edges: Arc<RwLock<HashMap<UserId, HashMap<PairKey, PairHistory>>>>,
}

impl InMemoryRateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored edges across all users (for tests/diagnostics)
    pub fn num_edges(&self) -> usize {
        let edges = self.edges.read().unwrap();
        edges
            .values()
            .flat_map(|pairs| pairs.values())
            .flat_map(|history| history.values())
            .map(|kinds| kinds.len())
            .sum()
    }
}

impl RateStore for InMemoryRateStore {
    fn upsert_authoritative(&self, mut edge: RateEdge) -> Result<EdgeId> {
        let mut edges = self.edges.write().unwrap();
        let slot = edges
            .entry(edge.user)
            .or_default()
            .entry((edge.from.clone(), edge.to.clone()))
            .or_default()
            .entry(edge.effective_date)
            .or_default();

        // Overwrite in place keeps the existing edge ID stable, so Derived
        // provenance links survive a rate correction.
        if let Some(existing) = slot.get(&edge.kind) {
            edge.id = existing.id;
        }
        let id = edge.id;
        slot.insert(edge.kind, edge);
        Ok(id)
    }

    fn delete_authoritative(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
        effective_date: EffectiveDate,
        kind: RateKind,
    ) -> Result<bool> {
        let mut edges = self.edges.write().unwrap();
        let removed = edges
            .get_mut(&user)
            .and_then(|pairs| pairs.get_mut(&(from.clone(), to.clone())))
            .and_then(|history| history.get_mut(&effective_date))
            .and_then(|kinds| kinds.remove(&kind));
        Ok(removed.is_some())
    }

    fn edges_for_pair(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Vec<RateEdge>> {
        let edges = self.edges.read().unwrap();
        let mut result = Vec::new();
        if let Some(history) = edges
            .get(&user)
            .and_then(|pairs| pairs.get(&(from.clone(), to.clone())))
        {
            for kinds in history.values() {
                let mut day: Vec<_> = kinds.values().cloned().collect();
                day.sort_by_key(|e| e.kind.precedence());
                result.extend(day);
            }
        }
        Ok(result)
    }

    fn authoritative_on_or_before(
        &self,
        user: UserId,
        as_of: EffectiveDate,
    ) -> Result<Vec<RateEdge>> {
        let edges = self.edges.read().unwrap();
        let mut result = Vec::new();
        if let Some(pairs) = edges.get(&user) {
            for history in pairs.values() {
                for (_, kinds) in history.range(..=as_of) {
                    result.extend(
                        kinds
                            .values()
                            .filter(|e| e.kind.is_authoritative())
                            .cloned(),
                    );
                }
            }
        }
        Ok(result)
    }

    fn derived_on(&self, user: UserId, date: EffectiveDate) -> Result<Vec<RateEdge>> {
        let edges = self.edges.read().unwrap();
        let mut result = Vec::new();
        if let Some(pairs) = edges.get(&user) {
            for history in pairs.values() {
                if let Some(edge) = history
                    .get(&date)
                    .and_then(|kinds| kinds.get(&RateKind::Derived))
                {
                    result.push(edge.clone());
                }
            }
        }
        Ok(result)
    }

    fn replace_derived(
        &self,
        user: UserId,
        date: EffectiveDate,
        new_edges: Vec<RateEdge>,
    ) -> Result<()> {
        // Single write lock spans the delete and the inserts, so readers
        // never observe a half-replaced derived set.
        let mut edges = self.edges.write().unwrap();
        let pairs = edges.entry(user).or_default();

        for history in pairs.values_mut() {
            if let Some(kinds) = history.get_mut(&date) {
                kinds.remove(&RateKind::Derived);
            }
        }

        for edge in new_edges {
            pairs
                .entry((edge.from.clone(), edge.to.clone()))
                .or_default()
                .entry(date)
                .or_default()
                .insert(RateKind::Derived, edge);
        }
        Ok(())
    }

    fn edge(&self, user: UserId, id: EdgeId) -> Result<Option<RateEdge>> {
        let edges = self.edges.read().unwrap();
        if let Some(pairs) = edges.get(&user) {
            for history in pairs.values() {
                for kinds in history.values() {
                    for edge in kinds.values() {
                        if edge.id == id {
                            return Ok(Some(edge.clone()));
                        }
                    }
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn code(s: &str) -> CurrencyCode {
        CurrencyCode::new(s).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn manual(user: UserId, from: &str, to: &str, rate: f64, d: NaiveDate) -> RateEdge {
        RateEdge::authoritative(user, code(from), code(to), rate, d, RateKind::Manual, None)
            .unwrap()
    }

    #[test]
    fn test_upsert_overwrites_same_key() {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let d = date(2024, 1, 1);

        let id1 = store
            .upsert_authoritative(manual(user, "USD", "EUR", 0.92, d))
            .unwrap();
        let id2 = store
            .upsert_authoritative(manual(user, "USD", "EUR", 0.93, d))
            .unwrap();

        // Same key keeps the same identity, no duplicate row
        assert_eq!(id1, id2);
        assert_eq!(store.num_edges(), 1);

        let edges = store.edges_for_pair(user, &code("USD"), &code("EUR")).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].rate, 0.93);
    }

    #[test]
    fn test_kinds_coexist_on_same_date() {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let d = date(2024, 1, 1);

        store
            .upsert_authoritative(manual(user, "USD", "EUR", 0.92, d))
            .unwrap();
        let fetched = RateEdge::authoritative(
            user,
            code("USD"),
            code("EUR"),
            0.91,
            d,
            RateKind::Fetched,
            None,
        )
        .unwrap();
        store.upsert_authoritative(fetched).unwrap();

        let edges = store.edges_for_pair(user, &code("USD"), &code("EUR")).unwrap();
        assert_eq!(edges.len(), 2);
        // Within a date, higher-precedence kind sorts first
        assert_eq!(edges[0].kind, RateKind::Fetched);
        assert_eq!(edges[1].kind, RateKind::Manual);
    }

    #[test]
    fn test_delete() {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let d = date(2024, 1, 1);

        store
            .upsert_authoritative(manual(user, "USD", "EUR", 0.92, d))
            .unwrap();
        assert!(store
            .delete_authoritative(user, &code("USD"), &code("EUR"), d, RateKind::Manual)
            .unwrap());
        assert!(!store
            .delete_authoritative(user, &code("USD"), &code("EUR"), d, RateKind::Manual)
            .unwrap());
        assert_eq!(store.num_edges(), 0);
    }

    #[test]
    fn test_authoritative_scan_excludes_derived_and_later() {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let d1 = date(2024, 1, 1);
        let d2 = date(2024, 2, 1);

        let auth = manual(user, "USD", "EUR", 0.92, d1);
        let auth_id = store.upsert_authoritative(auth).unwrap();
        store
            .upsert_authoritative(manual(user, "USD", "CNY", 7.1, d2))
            .unwrap();
        let derived = RateEdge::derived(
            user,
            code("EUR"),
            code("USD"),
            1.0 / 0.92,
            d1,
            vec![auth_id],
        )
        .unwrap();
        store.replace_derived(user, d1, vec![derived]).unwrap();

        let scan = store.authoritative_on_or_before(user, d1).unwrap();
        assert_eq!(scan.len(), 1);
        assert_eq!(scan[0].from, code("USD"));
        assert_eq!(scan[0].to, code("EUR"));
    }

    #[test]
    fn test_replace_derived_is_per_date() {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let d1 = date(2024, 1, 1);
        let d2 = date(2024, 2, 1);

        let auth_id = store
            .upsert_authoritative(manual(user, "USD", "EUR", 0.92, d1))
            .unwrap();
        let mk = |d| {
            RateEdge::derived(user, code("EUR"), code("USD"), 1.0 / 0.92, d, vec![auth_id])
                .unwrap()
        };
        store.replace_derived(user, d1, vec![mk(d1)]).unwrap();
        store.replace_derived(user, d2, vec![mk(d2)]).unwrap();

        // Replacing d1 with an empty set leaves d2 untouched
        store.replace_derived(user, d1, Vec::new()).unwrap();
        assert!(store.derived_on(user, d1).unwrap().is_empty());
        assert_eq!(store.derived_on(user, d2).unwrap().len(), 1);
    }

    #[test]
    fn test_users_are_isolated() {
        let store = InMemoryRateStore::new();
        let alice = UserId::new_v4();
        let bob = UserId::new_v4();
        let d = date(2024, 1, 1);

        store
            .upsert_authoritative(manual(alice, "USD", "EUR", 0.92, d))
            .unwrap();

        assert_eq!(
            store.edges_for_pair(bob, &code("USD"), &code("EUR")).unwrap().len(),
            0
        );
    }

    #[test]
    fn test_edge_lookup_by_id() {
        let store = InMemoryRateStore::new();
        let user = UserId::new_v4();
        let d = date(2024, 1, 1);

        let id = store
            .upsert_authoritative(manual(user, "USD", "EUR", 0.92, d))
            .unwrap();
        let found = store.edge(user, id).unwrap().unwrap();
        assert_eq!(found.rate, 0.92);
        assert!(store.edge(user, EdgeId::new_v4()).unwrap().is_none());
    }
}
