use serde::{Deserialize, Serialize};

use crate::constants::{UNITS_PER_COIN, UNIT_DECIMALS};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("empty amount")]
    Empty,
    #[error("invalid amount: {0}")]
    Invalid(String),
    #[error("too many decimal places (max {UNIT_DECIMALS})")]
    Precision,
    #[error("amount overflows")]
    Overflow,
}

/// A ledger amount in base units plus its human-readable form.
///
/// `display` is a presentation cache; `units` is authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub units: u64,
    pub display: String,
}

impl Amount {
    pub fn new(units: u64) -> Self {
        Self {
            units,
            display: format_units(units),
        }
    }

    /// Parse a decimal coin string (e.g. `"1.25"`) into base units.
    pub fn parse_decimal(input: &str) -> Result<Self, AmountError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Invalid(input.to_string()));
        }
        let all_digits = |p: &str| p.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(whole) || !all_digits(frac) {
            return Err(AmountError::Invalid(input.to_string()));
        }
        if frac.len() > UNIT_DECIMALS {
            return Err(AmountError::Precision);
        }

        let whole_units = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u64>()
                .map_err(|_| AmountError::Overflow)?
                .checked_mul(UNITS_PER_COIN)
                .ok_or(AmountError::Overflow)?
        };
        let frac_units = if frac.is_empty() {
            0
        } else {
            let padded = format!("{frac:0<width$}", width = UNIT_DECIMALS);
            padded
                .parse::<u64>()
                .map_err(|_| AmountError::Invalid(input.to_string()))?
        };
        let units = whole_units
            .checked_add(frac_units)
            .ok_or(AmountError::Overflow)?;
        Ok(Self::new(units))
    }

    /// Same units, display rounded to whole coins.
    pub fn rounded(&self) -> Self {
        let mut whole = self.units / UNITS_PER_COIN;
        if self.units % UNITS_PER_COIN >= UNITS_PER_COIN / 2 {
            whole += 1;
        }
        Self {
            units: self.units,
            display: group_thousands(whole),
        }
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.display)
    }
}

/// `1234500000` -> `"1,234.5"`
pub fn format_units(units: u64) -> String {
    let whole = group_thousands(units / UNITS_PER_COIN);
    let frac = format!("{:0width$}", units % UNITS_PER_COIN, width = UNIT_DECIMALS);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        whole
    } else {
        format!("{whole}.{frac}")
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
