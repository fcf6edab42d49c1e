//! Points and odds newtypes.
//!
//! # Motivation
//!
//! Points balances, stakes, and payouts are all plain integer point counts.
//! Odds are quoted to hundredths (e.g. `2.50`) but stored as scaled integers
//! so that settlement math (`floor(stake * odds)`) never touches floating
//! point. Wrapping both in newtypes keeps them from being accidentally mixed
//! with unrelated `i64`s (user ids, bet ids, row counts) at the call site.
//!
//! # Scale
//!
//! `OddsCenti` stores odds at 1e-2 scale: `OddsCenti(250)` means `2.50`.
//! The API boundary (JSON in/out) converts to/from `f64` via
//! [`OddsCenti::from_f64`] / [`OddsCenti::to_f64`]; everywhere else in the
//! core, the scaled integer is used directly.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Points
// ---------------------------------------------------------------------------

/// A signed point amount (balance, delta, stake, or payout).
///
/// There is intentionally no `From<i64>` impl for most uses — construct via
/// [`Points::new`] so call sites are explicit about handling a point amount
/// rather than some unrelated integer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Points(i64);

impl Points {
    pub const ZERO: Points = Points(0);

    pub const fn new(raw: i64) -> Self {
        Points(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn saturating_add(self, other: Points) -> Points {
        Points(self.0.saturating_add(other.0))
    }

    pub fn checked_add(self, other: Points) -> Option<Points> {
        self.0.checked_add(other.0).map(Points)
    }
}

impl Add for Points {
    type Output = Points;
    fn add(self, rhs: Points) -> Points {
        Points(self.0 + rhs.0)
    }
}

impl Sub for Points {
    type Output = Points;
    fn sub(self, rhs: Points) -> Points {
        Points(self.0 - rhs.0)
    }
}

impl Neg for Points {
    type Output = Points;
    fn neg(self) -> Points {
        Points(-self.0)
    }
}

impl AddAssign for Points {
    fn add_assign(&mut self, rhs: Points) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Points {
    fn sub_assign(&mut self, rhs: Points) {
        self.0 -= rhs.0;
    }
}

impl std::fmt::Display for Points {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `floor(amount * 0.02)` — the platform fee, expressed in whole points.
pub fn fee_on(amount: Points) -> Points {
    Points((amount.raw() as f64 * 0.02).floor() as i64)
}

// ---------------------------------------------------------------------------
// OddsCenti
// ---------------------------------------------------------------------------

/// Odds quoted to hundredths, stored as a scaled integer (`250` == `2.50`).
///
/// Minimum legal value is [`OddsCenti::MIN`] (`1.01`), per the bet-option
/// invariant in SPEC_FULL.md §3.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OddsCenti(i64);

impl OddsCenti {
    /// `1.01`, the minimum odds value the domain permits.
    pub const MIN: OddsCenti = OddsCenti(101);

    pub const fn new_unchecked(centi: i64) -> Self {
        OddsCenti(centi)
    }

    /// Construct from a scaled integer, rejecting values below [`OddsCenti::MIN`].
    pub fn new(centi: i64) -> Option<Self> {
        if centi < Self::MIN.0 {
            None
        } else {
            Some(OddsCenti(centi))
        }
    }

    /// Construct from a decimal odds value as received over the API boundary.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        Self::new((value * 100.0).round() as i64)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub const fn raw_centi(self) -> i64 {
        self.0
    }

    /// `floor(stake * self)`, the gross payout/cashout for a stake at these odds.
    pub fn apply_to(self, stake: Points) -> Points {
        // stake and odds are both bounded well under i64::MAX / 100 for any
        // realistic campus-economy balance, so the intermediate product is
        // computed in i128 purely as a defensive overflow guard.
        let gross = (stake.raw() as i128 * self.0 as i128) / 100;
        Points::new(gross as i64)
    }

    /// `floor(stake * current / purchase)` — the early cash-out ratio used by
    /// `sell`.
    pub fn ratio_apply(stake: Points, current: OddsCenti, purchase: OddsCenti) -> Points {
        let raw = (stake.raw() as i128 * current.0 as i128) / purchase.0 as i128;
        Points::new(raw as i64)
    }
}

impl std::fmt::Display for OddsCenti {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.2}", self.to_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_floors_down() {
        assert_eq!(fee_on(Points::new(100)), Points::new(2));
        assert_eq!(fee_on(Points::new(149)), Points::new(2));
    }

    #[test]
    fn odds_rejects_below_min() {
        assert!(OddsCenti::new(100).is_none());
        assert!(OddsCenti::new(101).is_some());
    }

    #[test]
    fn odds_from_f64_rounds_to_centi() {
        assert_eq!(OddsCenti::from_f64(2.5).unwrap().raw_centi(), 250);
    }

    #[test]
    fn apply_to_matches_spec_example() {
        // Bet buy/resolve example from SPEC_FULL.md §4.6: stake=100, odds=2.00.
        let odds = OddsCenti::new(200).unwrap();
        assert_eq!(odds.apply_to(Points::new(100)), Points::new(200));
    }

    #[test]
    fn ratio_apply_matches_sell_example() {
        // SPEC_FULL.md §4.5/§8 sell example: stake=50, purchase=2.50, current=3.00.
        let purchase = OddsCenti::new(250).unwrap();
        let current = OddsCenti::new(300).unwrap();
        let cashout = OddsCenti::ratio_apply(Points::new(50), current, purchase);
        assert_eq!(cashout, Points::new(60));
    }
}
