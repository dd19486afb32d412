// 1.0: all the primitives live here. nothing in the engine works without these types.
// IDs, amounts, prices, leverage, timestamps. each is a newtype so the compiler catches type mixups.
// every value is a fixed-point integer with 8 decimals. Decimal only shows up at the edges.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;

/// Decimal digits carried by every amount, price and leverage value.
pub const DECIMALS: u32 = 8;
/// 1.0 in fixed point.
pub const BASE: u128 = 100_000_000;
/// 100% in basis points.
pub const BPS_BASE: u128 = 10_000;
/// 100% per year for funding rates and the cumulative funding index.
pub const FUNDING_BASE: i128 = 1_000_000_000_000;
pub const SECONDS_PER_YEAR: i128 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(pub u64);

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn from_is_long(is_long: bool) -> Self {
        if is_long {
            Side::Long
        } else {
            Side::Short
        }
    }

    pub fn is_long(&self) -> bool {
        matches!(self, Side::Long)
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

// 1.1: one slot per owner/instrument/side. at most one open position lives in a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub owner: AccountId,
    pub instrument: InstrumentId,
    pub side: Side,
}

impl PositionKey {
    pub fn new(owner: AccountId, instrument: InstrumentId, side: Side) -> Self {
        Self {
            owner,
            instrument,
            side,
        }
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{:?}", self.owner.0, self.instrument.0, self.side)
    }
}

fn scaled_from_decimal(value: Decimal) -> Option<u128> {
    if value.is_sign_negative() {
        return None;
    }
    (value * Decimal::from(BASE as u64)).trunc().to_u128()
}

fn scaled_to_decimal(raw: i128) -> Decimal {
    Decimal::try_from_i128_with_scale(raw, DECIMALS).unwrap_or(Decimal::MAX)
}

// 1.2: unsigned quote amount. margin, balances, fees, open interest, sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn new(raw: u128) -> Self {
        Self(raw)
    }

    /// Whole quote units, e.g. `from_units(1000)` is 1000.00000000.
    pub const fn from_units(units: u64) -> Self {
        Self(units as u128 * BASE)
    }

    /// Truncates anything below 1e-8. Negative values are rejected.
    pub fn from_decimal(value: Decimal) -> Option<Self> {
        scaled_from_decimal(value).map(Self)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn to_decimal(&self) -> Decimal {
        scaled_to_decimal(self.0 as i128)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(&self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn saturating_sub(&self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    pub fn min(self, other: Amount) -> Amount {
        Amount(self.0.min(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| Amount(acc.0.saturating_add(a.0)))
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// 1.3: signed quote amount. pnl, funding cost, settlement. negative = trader owes the vault.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignedAmount(i128);

impl SignedAmount {
    pub const ZERO: SignedAmount = SignedAmount(0);

    pub const fn new(raw: i128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i128 {
        self.0
    }

    pub fn to_decimal(&self) -> Decimal {
        scaled_to_decimal(self.0)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Magnitude as an unsigned amount.
    pub fn unsigned_abs(&self) -> Amount {
        Amount(self.0.unsigned_abs())
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// 1.4: price in quote per unit of base. must be positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(u128);

impl Price {
    #[must_use]
    pub fn new(raw: u128) -> Option<Self> {
        if raw > 0 {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub fn from_decimal(value: Decimal) -> Option<Self> {
        scaled_from_decimal(value).and_then(Self::new)
    }

    /// Whole-unit price; zero is rejected.
    pub fn from_units(units: u64) -> Option<Self> {
        Self::new(units as u128 * BASE)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn to_decimal(&self) -> Decimal {
        scaled_to_decimal(self.0 as i128)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// 1.5: leverage multiplier in fixed point. 10x = 10 * BASE.
// effective leverage can drop below 1x after margin is added, so no floor here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Leverage(u128);

impl Leverage {
    pub const ONE: Leverage = Leverage(BASE);

    #[must_use]
    pub fn new(raw: u128) -> Option<Self> {
        if raw > 0 {
            Some(Self(raw))
        } else {
            None
        }
    }

    pub const fn from_whole(multiple: u64) -> Self {
        Self(multiple as u128 * BASE)
    }

    pub fn from_decimal(value: Decimal) -> Option<Self> {
        scaled_from_decimal(value).and_then(Self::new)
    }

    pub fn raw(&self) -> u128 {
        self.0
    }

    pub fn to_decimal(&self) -> Decimal {
        scaled_to_decimal(self.0 as i128)
    }
}

impl fmt::Display for Leverage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.to_decimal())
    }
}

// 1.6: basis points. 100 bps = 1%. multipliers above 100% are allowed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Bps(u32);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const FULL: Bps = Bps(BPS_BASE as u32);

    pub const fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn raw(&self) -> u128 {
        self.0 as u128
    }

    pub fn as_fraction(&self) -> Decimal {
        Decimal::new(self.0 as i64, 4)
    }
}

// 1.7: second-resolution timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    pub fn plus_secs(&self, secs: i64) -> Self {
        Self(self.0.saturating_add(secs))
    }

    /// Seconds from `earlier` to self, never negative.
    pub fn secs_since(&self, earlier: Timestamp) -> i64 {
        (self.0 - earlier.0).max(0)
    }
}
