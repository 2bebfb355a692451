//! Currency registry - codes, records, scoping and the active set

use crate::error::{RateError, Result};
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Validated currency code (short uppercase identifier)
///
/// Covers ISO 4217 codes plus user-defined codes for custom currencies,
/// which is why this is a newtype over a string rather than a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse and validate a currency code
    ///
    /// Codes are 1-8 characters, uppercased, must start with a letter and
    /// contain only ASCII letters and digits.
    pub fn new(code: &str) -> Result<Self> {
        let code = code.trim().to_uppercase();
        if code.is_empty() || code.len() > 8 {
            return Err(RateError::Validation(format!(
                "Currency code must be 1-8 characters, got: {:?}",
                code
            )));
        }
        if !code.chars().next().unwrap().is_ascii_alphabetic() {
            return Err(RateError::Validation(format!(
                "Currency code must start with a letter: {:?}",
                code
            )));
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RateError::Validation(format!(
                "Currency code must be alphanumeric: {:?}",
                code
            )));
        }
        Ok(Self(code))
    }

    /// Get code as string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for CurrencyCode {
    type Err = RateError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ownership scope of a currency record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CurrencyScope {
    /// Built-in default visible to every user
    Global,
    /// Custom currency owned by one user; shadows a global of the same code
    User(UserId),
}

/// A currency record
///
/// Identity (code, scope) is immutable once created; symbol and decimal
/// places are display metadata and may be updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: CurrencyCode,
    pub symbol: String,
    /// Decimal precision for display and rounding (0-10)
    pub decimal_places: u8,
    pub scope: CurrencyScope,
}

impl Currency {
    /// Create a new currency record
    pub fn new(
        code: CurrencyCode,
        symbol: impl Into<String>,
        decimal_places: u8,
        scope: CurrencyScope,
    ) -> Result<Self> {
        if decimal_places > 10 {
            return Err(RateError::Validation(format!(
                "Decimal places must be 0-10, got: {}",
                decimal_places
            )));
        }
        Ok(Self {
            code,
            symbol: symbol.into(),
            decimal_places,
            scope,
        })
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.code)
    }
}

/// Canonical set of currencies: global defaults plus per-user customs
///
/// Within one user's visible set a code resolves to exactly one record: a
/// user-owned currency shadows the global default of the same code.
#[derive(Debug, Clone, Default)]
pub struct CurrencyRegistry {
    global: HashMap<CurrencyCode, Currency>,
    custom: HashMap<(UserId, CurrencyCode), Currency>,
}

impl CurrencyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with common ISO 4217 defaults
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let defaults: &[(&str, &str, u8)] = &[
            ("USD", "$", 2),
            ("EUR", "\u{20ac}", 2),
            ("GBP", "\u{a3}", 2),
            ("JPY", "\u{a5}", 0),
            ("CHF", "CHF", 2),
            ("CAD", "C$", 2),
            ("AUD", "A$", 2),
            ("NZD", "NZ$", 2),
            ("CNY", "\u{a5}", 2),
            ("HKD", "HK$", 2),
            ("SGD", "S$", 2),
            ("KRW", "\u{20a9}", 0),
            ("INR", "\u{20b9}", 2),
            ("BRL", "R$", 2),
            ("MXN", "MX$", 2),
            ("ZAR", "R", 2),
            ("TRY", "\u{20ba}", 2),
        ];
        for (code, symbol, dp) in defaults {
            let code = CurrencyCode::new(code).expect("builtin code is valid");
            let currency = Currency::new(code.clone(), *symbol, *dp, CurrencyScope::Global)
                .expect("builtin currency is valid");
            registry.global.insert(code, currency);
        }
        registry
    }

    /// Register a global currency
    pub fn insert_global(&mut self, currency: Currency) -> Result<()> {
        if currency.scope != CurrencyScope::Global {
            return Err(RateError::Validation(
                "insert_global requires a Global-scoped currency".to_string(),
            ));
        }
        self.global.insert(currency.code.clone(), currency);
        Ok(())
    }

    /// Register a custom currency owned by a user
    pub fn insert_custom(&mut self, currency: Currency) -> Result<()> {
        match currency.scope {
            CurrencyScope::User(user) => {
                self.custom
                    .insert((user, currency.code.clone()), currency);
                Ok(())
            }
            CurrencyScope::Global => Err(RateError::Validation(
                "insert_custom requires a User-scoped currency".to_string(),
            )),
        }
    }

    /// Resolve a code within a user's visible set
    ///
    /// User-owned customs shadow globals of the same code.
    pub fn visible(&self, user: UserId, code: &CurrencyCode) -> Option<&Currency> {
        self.custom
            .get(&(user, code.clone()))
            .or_else(|| self.global.get(code))
    }

    /// Resolve a code or fail with `UnknownCurrency`
    pub fn require(&self, user: UserId, code: &CurrencyCode) -> Result<&Currency> {
        self.visible(user, code)
            .ok_or_else(|| RateError::UnknownCurrency(code.to_string()))
    }

    /// Number of global currencies
    pub fn num_global(&self) -> usize {
        self.global.len()
    }
}

/// Ordered set of currencies a user has opted into, plus the base currency
///
/// Closure generation and gap reporting only need completeness across this
/// set, not across every currency ever created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveCurrencySet {
    currencies: Vec<CurrencyCode>,
    base: CurrencyCode,
}

impl ActiveCurrencySet {
    /// Create an active set; `base` is added if not already a member
    pub fn new(currencies: Vec<CurrencyCode>, base: CurrencyCode) -> Self {
        let mut set = Self {
            currencies: Vec::new(),
            base: base.clone(),
        };
        set.push(base);
        for code in currencies {
            set.push(code);
        }
        set
    }

    fn push(&mut self, code: CurrencyCode) {
        if !self.currencies.contains(&code) {
            self.currencies.push(code);
        }
    }

    /// Add a currency to the set (no-op if already present)
    pub fn activate(&mut self, code: CurrencyCode) {
        self.push(code);
    }

    /// The designated base currency
    pub fn base(&self) -> &CurrencyCode {
        &self.base
    }

    /// Iterate members in their stable user-defined order
    pub fn iter(&self) -> impl Iterator<Item = &CurrencyCode> {
        self.currencies.iter()
    }

    /// Membership test
    pub fn contains(&self, code: &CurrencyCode) -> bool {
        self.currencies.contains(code)
    }

    /// Number of active currencies (including base)
    pub fn len(&self) -> usize {
        self.currencies.len()
    }

    /// True when only the base (or nothing) is active
    pub fn is_empty(&self) -> bool {
        self.currencies.is_empty()
    }

    /// All ordered pairs of distinct members, in stable order
    pub fn ordered_pairs(&self) -> Vec<(CurrencyCode, CurrencyCode)> {
        let mut pairs = Vec::new();
        for from in &self.currencies {
            for to in &self.currencies {
                if from != to {
                    pairs.push((from.clone(), to.clone()));
                }
            }
        }
        pairs
    }
}
