//! Rate store - time-versioned directed rate edges and the storage trait

use crate::currency::CurrencyCode;
use crate::error::{RateError, Result};
use crate::types::{EdgeId, EffectiveDate, Rate, UserId};
use serde::{Deserialize, Serialize};

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryRateStore;
pub use sqlite::SqliteRateStore;

/// Origin of a rate edge
///
/// Fetched and Manual edges are authoritative (user/feed supplied); Derived
/// edges are produced only by the closure generator and never edited
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RateKind {
    /// Authoritative edge written by the external rate feed
    Fetched,
    /// Authoritative edge entered by the user
    Manual,
    /// Edge materialized by the closure generator
    Derived,
}

impl RateKind {
    /// Precedence when several kinds share the same effective date
    /// (lower wins): sourced data is never shadowed by generated data.
    pub fn precedence(&self) -> u8 {
        match self {
            RateKind::Fetched => 0,
            RateKind::Manual => 1,
            RateKind::Derived => 2,
        }
    }

    /// Whether this kind is user/feed supplied rather than generated
    pub fn is_authoritative(&self) -> bool {
        !matches!(self, RateKind::Derived)
    }

    /// Stable string form for storage
    pub fn as_str(&self) -> &'static str {
        match self {
            RateKind::Fetched => "fetched",
            RateKind::Manual => "manual",
            RateKind::Derived => "derived",
        }
    }

    /// Parse from stable string form
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "fetched" => Ok(RateKind::Fetched),
            "manual" => Ok(RateKind::Manual),
            "derived" => Ok(RateKind::Derived),
            _ => Err(RateError::Parse(format!("Unknown rate kind: {}", s))),
        }
    }
}

/// A directed conversion-rate edge, versioned by effective date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateEdge {
    pub id: EdgeId,
    pub user: UserId,
    pub from: CurrencyCode,
    pub to: CurrencyCode,
    /// Conversion factor: amount_in_to = amount_in_from * rate
    pub rate: Rate,
    pub effective_date: EffectiveDate,
    pub kind: RateKind,
    /// For Derived edges, the ordered IDs of the edges composing the path
    /// that produced this edge; empty for authoritative edges. Invalidation
    /// walks these links when an authoritative edge is deleted.
    pub derived_from: Vec<EdgeId>,
    pub note: Option<String>,
}

impl RateEdge {
    /// Create an authoritative (Manual or Fetched) edge
    pub fn authoritative(
        user: UserId,
        from: CurrencyCode,
        to: CurrencyCode,
        rate: Rate,
        effective_date: EffectiveDate,
        kind: RateKind,
        note: Option<String>,
    ) -> Result<Self> {
        if !kind.is_authoritative() {
            return Err(RateError::Validation(
                "Derived edges are created by the closure generator only".to_string(),
            ));
        }
        Self::validate(&from, &to, rate)?;
        Ok(Self {
            id: EdgeId::new_v4(),
            user,
            from,
            to,
            rate,
            effective_date,
            kind,
            derived_from: Vec::new(),
            note,
        })
    }

    /// Create a Derived edge from the path of edges that produced it
    pub fn derived(
        user: UserId,
        from: CurrencyCode,
        to: CurrencyCode,
        rate: Rate,
        effective_date: EffectiveDate,
        derived_from: Vec<EdgeId>,
    ) -> Result<Self> {
        Self::validate(&from, &to, rate)?;
        if derived_from.is_empty() {
            return Err(RateError::Validation(
                "Derived edge must reference the edges it was derived from".to_string(),
            ));
        }
        Ok(Self {
            id: EdgeId::new_v4(),
            user,
            from,
            to,
            rate,
            effective_date,
            kind: RateKind::Derived,
            derived_from,
            note: None,
        })
    }

    fn validate(from: &CurrencyCode, to: &CurrencyCode, rate: Rate) -> Result<()> {
        if from == to {
            return Err(RateError::Validation(format!(
                "Self-edge {}->{} is implicit and always 1",
                from, to
            )));
        }
        if !rate.is_finite() || rate <= 0.0 {
            return Err(RateError::Validation(format!(
                "Rate must be a positive finite number, got: {}",
                rate
            )));
        }
        Ok(())
    }
}

/// Storage handle for rate edges
///
/// An explicitly constructed, passed-in handle: the engine has no global
/// storage singleton. Implementations index by (user, from, to,
/// effective_date) for point lookups and by (user, effective_date) for
/// closure regeneration scans.
pub trait RateStore: Send + Sync {
    /// Upsert an authoritative edge, keyed by (user, from, to,
    /// effective_date, kind). Re-submitting the same key overwrites the
    /// rate and note rather than duplicating. Returns the stored edge's ID.
    fn upsert_authoritative(&self, edge: RateEdge) -> Result<EdgeId>;

    /// Delete an authoritative edge by key. Returns true if one existed.
    fn delete_authoritative(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
        effective_date: EffectiveDate,
        kind: RateKind,
    ) -> Result<bool>;

    /// All edges for the ordered pair, any kind, sorted by effective date
    /// ascending.
    fn edges_for_pair(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Vec<RateEdge>>;

    /// All authoritative edges with `effective_date <= as_of`.
    fn authoritative_on_or_before(
        &self,
        user: UserId,
        as_of: EffectiveDate,
    ) -> Result<Vec<RateEdge>>;

    /// Derived edges effective exactly on `date`.
    fn derived_on(&self, user: UserId, date: EffectiveDate) -> Result<Vec<RateEdge>>;

    /// Atomically replace every Derived edge for (user, date) with `edges`.
    /// All deletes and inserts commit together or not at all.
    fn replace_derived(
        &self,
        user: UserId,
        date: EffectiveDate,
        edges: Vec<RateEdge>,
    ) -> Result<()>;

    /// Look up a single edge by ID.
    fn edge(&self, user: UserId, id: EdgeId) -> Result<Option<RateEdge>>;
}
