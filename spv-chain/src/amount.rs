//! A monetary amount, denominated in the coin's smallest unit (satoshis).
//!
//! Bitcoin's protocol represents amounts as a signed 64-bit integer of
//! satoshis, but most call sites only want *non-negative* amounts (output
//! values, balances) while the wire format for e.g. historical special
//! values allows `-1`. [`Amount`] is generic over a zero-sized
//! [`Constraint`] marker so both cases are distinct types that can't be
//! confused at compile time.

use std::{
    convert::TryFrom,
    fmt,
    io,
    marker::PhantomData,
    ops::{Add, Sub},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The largest valid amount, one satoshi short of 21 million BTC.
pub const MAX_MONEY: i64 = 21_000_000 * 100_000_000;

/// One whole coin, in satoshis.
pub const COIN: i64 = 100_000_000;

/// A constraint on the range of values an [`Amount`] may hold.
pub trait Constraint: Copy + Clone {
    /// The inclusive lower bound for this constraint.
    const MIN: i64;
    /// The inclusive upper bound for this constraint.
    const MAX: i64;
}

/// Amounts must be non-negative, i.e. in `[0, MAX_MONEY]`; used for output
/// values and anywhere a negative amount has no meaning.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NonNegative;

impl Constraint for NonNegative {
    const MIN: i64 = 0;
    const MAX: i64 = MAX_MONEY;
}

/// Amounts may additionally take the sentinel value `-1`, used by some
/// fields (e.g. certain RPC return values) to mean "unknown".
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NegativeAllowed;

impl Constraint for NegativeAllowed {
    const MIN: i64 = -MAX_MONEY;
    const MAX: i64 = MAX_MONEY;
}

/// An error constructing or combining [`Amount`]s.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum AmountError {
    #[error("{0} is outside the valid amount range [{1}, {2}]")]
    OutOfRange(i64, i64, i64),
    #[error("amount arithmetic overflowed")]
    Overflow,
}

/// A number of satoshis, constrained to the range permitted by `C`.
#[derive(Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Amount<C = NonNegative>(i64, #[serde(skip)] PhantomData<C>);

impl<C> fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl<C> fmt::Display for Amount<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<C: Constraint> Amount<C> {
    /// The zero amount, always valid regardless of constraint.
    pub fn zero() -> Amount<C> {
        Amount(0, PhantomData)
    }

    /// This amount's value in satoshis.
    pub fn satoshis(self) -> i64 {
        self.0
    }

    fn checked_new(value: i64) -> Result<Amount<C>, AmountError> {
        if value < C::MIN || value > C::MAX {
            Err(AmountError::OutOfRange(value, C::MIN, C::MAX))
        } else {
            Ok(Amount(value, PhantomData))
        }
    }
}

impl<C: Constraint> TryFrom<i64> for Amount<C> {
    type Error = AmountError;
    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Amount::checked_new(value)
    }
}

impl<C: Constraint> TryFrom<u64> for Amount<C> {
    type Error = AmountError;
    fn try_from(value: u64) -> Result<Self, Self::Error> {
        let value = i64::try_from(value).map_err(|_| AmountError::Overflow)?;
        Amount::checked_new(value)
    }
}

impl<C> From<Amount<C>> for i64 {
    fn from(amount: Amount<C>) -> i64 {
        amount.0
    }
}

impl<C: Constraint> Add for Amount<C> {
    type Output = Result<Amount<C>, AmountError>;
    fn add(self, rhs: Amount<C>) -> Self::Output {
        let value = self.0.checked_add(rhs.0).ok_or(AmountError::Overflow)?;
        Amount::checked_new(value)
    }
}

impl<C: Constraint> Sub for Amount<C> {
    type Output = Result<Amount<C>, AmountError>;
    fn sub(self, rhs: Amount<C>) -> Self::Output {
        let value = self.0.checked_sub(rhs.0).ok_or(AmountError::Overflow)?;
        Amount::checked_new(value)
    }
}

impl<C> BitcoinSerialize for Amount<C> {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl<C: Constraint> BitcoinDeserialize for Amount<C> {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let value = i64::bitcoin_deserialize(reader)?;
        Amount::checked_new(value)
            .map_err(|_| SerializationError::Parse("amount out of range"))
    }
}

#[cfg(any(test, feature = "proptest-impl"))]
impl<C: Constraint + 'static> proptest::arbitrary::Arbitrary for Amount<C> {
    type Parameters = ();
    type Strategy = proptest::strategy::BoxedStrategy<Self>;

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        use proptest::prelude::*;
        (C::MIN..=C::MAX)
            .prop_map(|value| Amount::checked_new(value).expect("value is within bounds"))
            .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_valid() {
        assert_eq!(Amount::<NonNegative>::zero().satoshis(), 0);
    }

    #[test]
    fn rejects_negative_for_non_negative() {
        assert!(Amount::<NonNegative>::try_from(-1i64).is_err());
    }

    #[test]
    fn rejects_above_max_money() {
        assert!(Amount::<NonNegative>::try_from(MAX_MONEY + 1).is_err());
    }

    #[test]
    fn add_checks_overflow() {
        let a = Amount::<NonNegative>::try_from(MAX_MONEY).unwrap();
        let b = Amount::<NonNegative>::try_from(1i64).unwrap();
        assert!((a + b).is_err());
    }
}
