//! SQLite-backed rate store
//!
//! Dates are stored as ISO `YYYY-MM-DD` text, derived-from links as a JSON
//! array of edge IDs. The (user, from, to, date, kind) unique index backs
//! the upsert contract.

use super::{RateEdge, RateKind, RateStore};
use crate::currency::CurrencyCode;
use crate::error::{RateError, Result};
use crate::types::{EdgeId, EffectiveDate, UserId};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

const DATE_FMT: &str = "%Y-%m-%d";

/// Raw row shape pulled out of SQLite before parsing into a [`RateEdge`]
struct RawEdge {
    id: String,
    user: String,
    from: String,
    to: String,
    rate: f64,
    effective_date: String,
    kind: String,
    derived_from: String,
    note: Option<String>,
}

impl RawEdge {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user: row.get(1)?,
            from: row.get(2)?,
            to: row.get(3)?,
            rate: row.get(4)?,
            effective_date: row.get(5)?,
            kind: row.get(6)?,
            derived_from: row.get(7)?,
            note: row.get(8)?,
        })
    }

    fn parse(self) -> Result<RateEdge> {
        let derived_from: Vec<EdgeId> = serde_json::from_str(&self.derived_from)?;
        Ok(RateEdge {
            id: self
                .id
                .parse()
                .map_err(|e| RateError::Parse(format!("Bad edge id: {}", e)))?,
            user: self
                .user
                .parse()
                .map_err(|e| RateError::Parse(format!("Bad user id: {}", e)))?,
            from: CurrencyCode::new(&self.from)?,
            to: CurrencyCode::new(&self.to)?,
            rate: self.rate,
            effective_date: NaiveDate::parse_from_str(&self.effective_date, DATE_FMT)
                .map_err(|e| RateError::Parse(format!("Bad effective date: {}", e)))?,
            kind: RateKind::parse(&self.kind)?,
            derived_from,
            note: self.note,
        })
    }
}

const SELECT_COLS: &str =
    "id, user, from_currency, to_currency, rate, effective_date, kind, derived_from, note";

/// Persistent [`RateStore`] backed by SQLite
pub struct SqliteRateStore {
    conn: Mutex<Connection>,
}

impl SqliteRateStore {
    /// Create or open database at path
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    /// Create in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS rate_edges (
                id TEXT PRIMARY KEY,
                user TEXT NOT NULL,
                from_currency TEXT NOT NULL,
                to_currency TEXT NOT NULL,
                rate REAL NOT NULL,
                effective_date TEXT NOT NULL,
                kind TEXT NOT NULL,
                derived_from TEXT NOT NULL DEFAULT '[]',
                note TEXT
            )",
            [],
        )?;
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_edge_key
             ON rate_edges(user, from_currency, to_currency, effective_date, kind)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_user_date ON rate_edges(user, effective_date)",
            [],
        )?;
        Ok(())
    }

    fn query_edges(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<RateEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, RawEdge::from_row)?;
        let mut edges = Vec::new();
        for row in rows {
            edges.push(row?.parse()?);
        }
        Ok(edges)
    }
}

impl RateStore for SqliteRateStore {
    fn upsert_authoritative(&self, edge: RateEdge) -> Result<EdgeId> {
        let conn = self.conn.lock().unwrap();
        let date = edge.effective_date.format(DATE_FMT).to_string();

        // Keep the existing row's ID on overwrite so Derived provenance
        // links stay valid across a rate correction.
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM rate_edges
                 WHERE user = ?1 AND from_currency = ?2 AND to_currency = ?3
                   AND effective_date = ?4 AND kind = ?5",
                params![
                    edge.user.to_string(),
                    edge.from.as_str(),
                    edge.to.as_str(),
                    date,
                    edge.kind.as_str(),
                ],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE rate_edges SET rate = ?1, note = ?2 WHERE id = ?3",
                    params![edge.rate, edge.note, id],
                )?;
                id.parse()
                    .map_err(|e| RateError::Parse(format!("Bad edge id: {}", e)))
            }
            None => {
                conn.execute(
                    "INSERT INTO rate_edges
                     (id, user, from_currency, to_currency, rate, effective_date, kind, derived_from, note)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]', ?8)",
                    params![
                        edge.id.to_string(),
                        edge.user.to_string(),
                        edge.from.as_str(),
                        edge.to.as_str(),
                        edge.rate,
                        date,
                        edge.kind.as_str(),
                        edge.note,
                    ],
                )?;
                Ok(edge.id)
            }
        }
    }

    fn delete_authoritative(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
        effective_date: EffectiveDate,
        kind: RateKind,
    ) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let affected = conn.execute(
            "DELETE FROM rate_edges
             WHERE user = ?1 AND from_currency = ?2 AND to_currency = ?3
               AND effective_date = ?4 AND kind = ?5",
            params![
                user.to_string(),
                from.as_str(),
                to.as_str(),
                effective_date.format(DATE_FMT).to_string(),
                kind.as_str(),
            ],
        )?;
        Ok(affected > 0)
    }

    fn edges_for_pair(
        &self,
        user: UserId,
        from: &CurrencyCode,
        to: &CurrencyCode,
    ) -> Result<Vec<RateEdge>> {
        self.query_edges(
            &format!(
                "SELECT {} FROM rate_edges
                 WHERE user = ?1 AND from_currency = ?2 AND to_currency = ?3
                 ORDER BY effective_date ASC, kind ASC",
                SELECT_COLS
            ),
            &[&user.to_string(), &from.as_str(), &to.as_str()],
        )
    }

    fn authoritative_on_or_before(
        &self,
        user: UserId,
        as_of: EffectiveDate,
    ) -> Result<Vec<RateEdge>> {
        self.query_edges(
            &format!(
                "SELECT {} FROM rate_edges
                 WHERE user = ?1 AND effective_date <= ?2 AND kind != 'derived'
                 ORDER BY effective_date ASC",
                SELECT_COLS
            ),
            &[&user.to_string(), &as_of.format(DATE_FMT).to_string()],
        )
    }

    fn derived_on(&self, user: UserId, date: EffectiveDate) -> Result<Vec<RateEdge>> {
        self.query_edges(
            &format!(
                "SELECT {} FROM rate_edges
                 WHERE user = ?1 AND effective_date = ?2 AND kind = 'derived'",
                SELECT_COLS
            ),
            &[&user.to_string(), &date.format(DATE_FMT).to_string()],
        )
    }

    fn replace_derived(
        &self,
        user: UserId,
        date: EffectiveDate,
        edges: Vec<RateEdge>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let date = date.format(DATE_FMT).to_string();

        tx.execute(
            "DELETE FROM rate_edges
             WHERE user = ?1 AND effective_date = ?2 AND kind = 'derived'",
            params![user.to_string(), date],
        )?;
        for edge in &edges {
            tx.execute(
                "INSERT INTO rate_edges
                 (id, user, from_currency, to_currency, rate, effective_date, kind, derived_from, note)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'derived', ?7, ?8)",
                params![
                    edge.id.to_string(),
                    edge.user.to_string(),
                    edge.from.as_str(),
                    edge.to.as_str(),
                    edge.rate,
                    date,
                    serde_json::to_string(&edge.derived_from)?,
                    edge.note,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn edge(&self, user: UserId, id: EdgeId) -> Result<Option<RateEdge>> {
        let conn = self.conn.lock().unwrap();
        let raw = conn
            .query_row(
                &format!(
                    "SELECT {} FROM rate_edges WHERE user = ?1 AND id = ?2",
                    SELECT_COLS
                ),
                params![user.to_string(), id.to_string()],
                RawEdge::from_row,
            )
            .optional()?;
        raw.map(RawEdge::parse).transpose()
    }
}
