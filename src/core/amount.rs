//! Integer DOGE amounts.
//!
//! Every ledger value is stored in koinu (1 DOGE = 100 000 000 koinu) so balance
//! arithmetic never touches floating point.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Koinu per whole DOGE.
pub const KOINU_PER_DOGE: i64 = 100_000_000;

const MAX_DECIMALS: usize = 8;

/// Amount parsing errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,

    #[error("amount must be a positive decimal number: {0}")]
    Malformed(String),

    #[error("amount has more than 8 decimal places: {0}")]
    TooPrecise(String),

    #[error("amount is too large: {0}")]
    Overflow(String),
}

/// A non-negative DOGE amount held as koinu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Doge(i64);

impl Doge {
    pub const ZERO: Doge = Doge(0);

    pub const fn from_koinu(koinu: i64) -> Self {
        Doge(koinu)
    }

    pub const fn koinu(self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Doge) -> Option<Doge> {
        self.0.checked_add(other.0).map(Doge)
    }

    pub fn checked_sub(self, other: Doge) -> Option<Doge> {
        self.0.checked_sub(other.0).filter(|v| *v >= 0).map(Doge)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl FromStr for Doge {
    type Err = AmountError;

    /// Accepts `12`, `12.5`, `0,25` (comma as decimal separator) and surrounding
    /// whitespace. Signs, exponents and thousands separators are rejected.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let text = raw.trim();
        if text.is_empty() {
            return Err(AmountError::Empty);
        }

        let normalized = text.replace(',', ".");
        let (whole, frac) = match normalized.split_once('.') {
            Some((w, f)) => (w, f),
            None => (normalized.as_str(), ""),
        };

        let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !digits_only(whole) || !digits_only(frac) {
            return Err(AmountError::Malformed(text.to_string()));
        }
        if frac.len() > MAX_DECIMALS {
            return Err(AmountError::TooPrecise(text.to_string()));
        }

        let overflow = || AmountError::Overflow(text.to_string());

        let whole_koinu = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<i64>()
                .map_err(|_| overflow())?
                .checked_mul(KOINU_PER_DOGE)
                .ok_or_else(overflow)?
        };

        let frac_koinu = if frac.is_empty() {
            0
        } else {
            let padded = format!("{:0<width$}", frac, width = MAX_DECIMALS);
            padded.parse::<i64>().map_err(|_| overflow())?
        };

        whole_koinu.checked_add(frac_koinu).map(Doge).ok_or_else(overflow)
    }
}

impl fmt::Display for Doge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / KOINU_PER_DOGE;
        let frac = (self.0 % KOINU_PER_DOGE).abs();
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let frac = format!("{:08}", frac);
        write!(f, "{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl Serialize for Doge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Accepts either a decimal string or a JSON number of DOGE.
impl<'de> Deserialize<'de> for Doge {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s,
            Raw::Number(n) => n.to_string(),
        };
        text.parse().map_err(serde::de::Error::custom)
    }
}
