//! Closure generator - materializes Derived edges (reverses and transitive
//! paths) so every pair in the user's active set resolves without further
//! hops
//!
//! Only authoritative edges seed a run; Derived edges from earlier runs are
//! never graph input, so derivation error cannot compound across runs.
//! Regeneration replaces the whole Derived set for the target date, which
//! makes the operation idempotent and self-correcting.

use crate::currency::{ActiveCurrencySet, CurrencyCode};
use crate::error::Result;
use crate::store::{RateEdge, RateStore};
use crate::types::{EdgeId, EffectiveDate, Rate, UserId};
use std::collections::{BTreeMap, VecDeque};

/// Summary of one closure run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClosureOutcome {
    /// Derived pairs that did not exist before this run
    pub created: usize,
    /// Derived pairs whose rate or provenance changed
    pub updated: usize,
    /// Derived pairs from a previous run with no counterpart anymore
    pub removed: usize,
    /// Active-set pairs that remain unresolvable (no path)
    pub unresolved_pairs: Vec<(CurrencyCode, CurrencyCode)>,
}

impl ClosureOutcome {
    /// True when the run changed nothing in the store
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0
    }
}

/// One directed hop in the derivation graph
#[derive(Debug, Clone)]
struct Hop {
    rate: Rate,
    /// Authoritative edge backing this hop (the edge itself, or the edge
    /// this hop inverts)
    source: EdgeId,
}

/// Candidate derived edge before persistence
#[derive(Debug, Clone)]
struct Candidate {
    rate: Rate,
    derived_from: Vec<EdgeId>,
}

/// Generate the closure for (user, date) and persist it
///
/// Replaces every Derived edge for the date with the freshly computed set
/// in one atomic store operation. Pairs with no path are reported in the
/// outcome, not treated as errors.
pub fn generate<S: RateStore + ?Sized>(
    store: &S,
    user: UserId,
    active: &ActiveCurrencySet,
    date: EffectiveDate,
) -> Result<ClosureOutcome> {
    let seeds = seed_edges(store, user, date)?;

    // Reverse synthesis: for every seed X->Y make Y->X = 1/r a candidate,
    // unless an authoritative Y->X exists on or before the date.
    let mut candidates: BTreeMap<(CurrencyCode, CurrencyCode), Candidate> = BTreeMap::new();
    for ((from, to), edge) in &seeds {
        let reverse_key = (to.clone(), from.clone());
        if !seeds.contains_key(&reverse_key) {
            candidates.insert(
                reverse_key,
                Candidate {
                    rate: 1.0 / edge.rate,
                    derived_from: vec![edge.id],
                },
            );
        }
    }

    // Directed graph over seeds plus reverse candidates. BTreeMap adjacency
    // gives BFS a stable lexicographic visit order, so shortest-path ties
    // break the same way on every run.
    let mut graph: BTreeMap<CurrencyCode, BTreeMap<CurrencyCode, Hop>> = BTreeMap::new();
    for ((from, to), edge) in &seeds {
        graph.entry(from.clone()).or_default().insert(
            to.clone(),
            Hop {
                rate: edge.rate,
                source: edge.id,
            },
        );
    }
    for ((from, to), candidate) in &candidates {
        graph.entry(from.clone()).or_default().insert(
            to.clone(),
            Hop {
                rate: candidate.rate,
                source: candidate.derived_from[0],
            },
        );
    }

    // Transitive derivation for active pairs not yet covered
    let mut unresolved = Vec::new();
    for (from, to) in active.ordered_pairs() {
        let key = (from.clone(), to.clone());
        if seeds.contains_key(&key) || candidates.contains_key(&key) {
            continue;
        }
        match shortest_path(&graph, &from, &to) {
            Some(candidate) => {
                candidates.insert(key, candidate);
            }
            None => unresolved.push((from, to)),
        }
    }

    let outcome = persist(store, user, date, candidates, unresolved)?;
    log::debug!(
        "Closure for user {} on {}: {} created, {} updated, {} removed, {} unresolved",
        user,
        date,
        outcome.created,
        outcome.updated,
        outcome.removed,
        outcome.unresolved_pairs.len()
    );
    Ok(outcome)
}

/// Latest authoritative edge per ordered pair as of `date`
///
/// When two kinds share the latest date for a pair, precedence picks the
/// winner, mirroring the resolver's same-date rule.
fn seed_edges<S: RateStore + ?Sized>(
    store: &S,
    user: UserId,
    date: EffectiveDate,
) -> Result<BTreeMap<(CurrencyCode, CurrencyCode), RateEdge>> {
    let mut seeds: BTreeMap<(CurrencyCode, CurrencyCode), RateEdge> = BTreeMap::new();
    for edge in store.authoritative_on_or_before(user, date)? {
        let key = (edge.from.clone(), edge.to.clone());
        let wins = match seeds.get(&key) {
            Some(current) => {
                (edge.effective_date, current.kind.precedence())
                    > (current.effective_date, edge.kind.precedence())
            }
            None => true,
        };
        if wins {
            seeds.insert(key, edge);
        }
    }
    Ok(seeds)
}

/// Breadth-first shortest path (hop count) from `from` to `to`
///
/// Returns the composed rate and the ordered authoritative sources of each
/// hop. Visited tracking makes cycles harmless.
fn shortest_path(
    graph: &BTreeMap<CurrencyCode, BTreeMap<CurrencyCode, Hop>>,
    from: &CurrencyCode,
    to: &CurrencyCode,
) -> Option<Candidate> {
    let mut parents: BTreeMap<CurrencyCode, (CurrencyCode, Hop)> = BTreeMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(from.clone());

    while let Some(node) = queue.pop_front() {
        if &node == to {
            // Walk parents back to the origin
            let mut rate = 1.0;
            let mut sources = Vec::new();
            let mut cursor = node;
            while let Some((prev, hop)) = parents.get(&cursor) {
                rate *= hop.rate;
                sources.push(hop.source);
                cursor = prev.clone();
            }
            sources.reverse();
            return Some(Candidate {
                rate,
                derived_from: sources,
            });
        }
        if let Some(neighbours) = graph.get(&node) {
            for (next, hop) in neighbours {
                if next != from && !parents.contains_key(next) {
                    parents.insert(next.clone(), (node.clone(), hop.clone()));
                    queue.push_back(next.clone());
                }
            }
        }
    }
    None
}

/// Diff candidates against the existing Derived set and replace it
///
/// Unchanged pairs keep their previous edge identity, so repeat runs are
/// observably no-ops.
fn persist<S: RateStore + ?Sized>(
    store: &S,
    user: UserId,
    date: EffectiveDate,
    candidates: BTreeMap<(CurrencyCode, CurrencyCode), Candidate>,
    unresolved_pairs: Vec<(CurrencyCode, CurrencyCode)>,
) -> Result<ClosureOutcome> {
    let previous: BTreeMap<(CurrencyCode, CurrencyCode), RateEdge> = store
        .derived_on(user, date)?
        .into_iter()
        .map(|e| ((e.from.clone(), e.to.clone()), e))
        .collect();

    let mut outcome = ClosureOutcome {
        unresolved_pairs,
        ..Default::default()
    };
    let mut fresh = Vec::with_capacity(candidates.len());

    for ((from, to), candidate) in candidates {
        match previous.get(&(from.clone(), to.clone())) {
            Some(prev)
                if prev.rate == candidate.rate && prev.derived_from == candidate.derived_from =>
            {
                fresh.push(prev.clone());
            }
            Some(prev) => {
                let mut edge = RateEdge::derived(
                    user,
                    from,
                    to,
                    candidate.rate,
                    date,
                    candidate.derived_from,
                )?;
                edge.id = prev.id;
                fresh.push(edge);
                outcome.updated += 1;
            }
            None => {
                fresh.push(RateEdge::derived(
                    user,
                    from,
                    to,
                    candidate.rate,
                    date,
                    candidate.derived_from,
                )?);
                outcome.created += 1;
            }
        }
    }

    let fresh_pairs: std::collections::BTreeSet<_> = fresh
        .iter()
        .map(|e| (e.from.clone(), e.to.clone()))
        .collect();
    outcome.removed = previous
        .keys()
        .filter(|key| !fresh_pairs.contains(*key))
        .count();

    if outcome.is_noop() {
        return Ok(outcome);
    }
    store.replace_derived(user, date, fresh)?;
    Ok(outcome)
}
