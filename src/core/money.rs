use serde::{Deserialize, Serialize};

/// A statutory percentage expressed in basis points (1/100 of a percent).
/// Every rate in the rules tables fits whole basis points, including the
/// 92.35% self-employment factor (9235 bps).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Rate(i64);

const BPS_DENOM: i128 = 10_000;

impl Rate {
    pub const ZERO: Rate = Rate(0);

    pub const fn from_bps(bps: i64) -> Self {
        Rate(bps)
    }

    pub const fn from_percent(percent: i64) -> Self {
        Rate(percent * 100)
    }

    pub const fn bps(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

pub const fn dollars(amount: i64) -> i64 {
    amount * 100
}

pub fn add_cents(a: i64, b: i64) -> i64 {
    a.saturating_add(b)
}

pub fn subtract_cents(a: i64, b: i64) -> i64 {
    a.saturating_sub(b)
}

/// Multiply an amount of cents by a rate, rounding half away from zero to
/// the nearest cent. Statutory bases are non-negative at every call site,
/// where this is exactly round-half-up.
pub fn multiply_cents(amount: i64, rate: Rate) -> i64 {
    let product = amount as i128 * rate.0 as i128;
    let half = BPS_DENOM / 2;
    let rounded = if product >= 0 {
        (product + half) / BPS_DENOM
    } else {
        (product - half) / BPS_DENOM
    };
    rounded as i64
}

pub fn max0(amount: i64) -> i64 {
    amount.max(0)
}

/// Position of `value` inside [start, end) as basis points, clamped to
/// [0, 10000]. Used by every linear phase-out/phase-in in the engine.
pub fn range_position_bps(value: i64, start: i64, end: i64) -> Rate {
    if end <= start {
        // Degenerate range: treat anything at or past the start as fully
        // phased.
        return if value >= start {
            Rate::from_bps(10_000)
        } else {
            Rate::ZERO
        };
    }
    if value <= start {
        return Rate::ZERO;
    }
    if value >= end {
        return Rate::from_bps(10_000);
    }
    let num = (value - start) as i128 * BPS_DENOM;
    let den = (end - start) as i128;
    let half = den / 2;
    Rate::from_bps(((num + half) / den) as i64)
}

/// Complement of `range_position_bps`: how much of the range remains.
pub fn range_remaining_bps(value: i64, start: i64, end: i64) -> Rate {
    Rate::from_bps(10_000 - range_position_bps(value, start, end).bps())
}
