//! Core types used throughout the oracle
//!
//! Defines tokens, fixed-point rates, liquidity signals and the quotes
//! that flow from price sources into the aggregator.

use ethers::types::{Address, H160, U256, U512};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::InputError;

/// Token identifier (20-byte address)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub Address);

impl Token {
    /// Absence of a connector
    pub const NONE: Token = Token(H160([0xff; 20]));
    /// Native asset of the chain
    pub const NATIVE: Token = Token(H160([0x00; 20]));
    /// Alternative native asset sentinel used by routers and aggregators
    pub const NATIVE_EEE: Token = Token(H160([0xee; 20]));

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// True for either native asset sentinel
    pub fn is_native(&self) -> bool {
        *self == Self::NATIVE || *self == Self::NATIVE_EEE
    }

    /// Resolve a built-in sentinel name (`NONE`, `ETH`, `EEE`)
    pub fn sentinel(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "NONE" => Some(Self::NONE),
            "ETH" | "NATIVE" => Some(Self::NATIVE),
            "EEE" => Some(Self::NATIVE_EEE),
            _ => None,
        }
    }
}

impl FromStr for Token {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if !trimmed.starts_with("0x") || trimmed.len() != 42 {
            return Err(InputError::MalformedToken(s.to_string()));
        }
        trimmed
            .parse::<Address>()
            .map(Token)
            .map_err(|_| InputError::MalformedToken(s.to_string()))
    }
}

impl From<Address> for Token {
    fn from(address: Address) -> Self {
        Self(address)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Adapter-defined liquidity signal (reserve depth, pool count, ...)
pub type Liquidity = U256;

/// Fixed-point rate with 18 decimals: destination units per one source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rate(pub U256);

impl Rate {
    pub const DECIMALS: u32 = 18;
    /// 1.0
    pub const ONE: Rate = Rate(U256([1_000_000_000_000_000_000, 0, 0, 0]));
    pub const ZERO: Rate = Rate(U256([0, 0, 0, 0]));

    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Fixed-point product, `None` on overflow
    pub fn checked_mul(self, other: Rate) -> Option<Rate> {
        mul_div(self.0, other.0, Self::ONE.0).map(Rate)
    }

    /// Fixed-point quotient, `None` on division by zero or overflow
    pub fn checked_div(self, other: Rate) -> Option<Rate> {
        mul_div(self.0, Self::ONE.0, other.0).map(Rate)
    }

    /// Rate of the reverse direction (1 / rate)
    pub fn inverse(self) -> Option<Rate> {
        Self::ONE.checked_div(self)
    }

    /// Build from a decimal value, e.g. `3000.25`. Negative values are rejected.
    pub fn from_decimal(value: Decimal) -> Option<Rate> {
        if value.is_sign_negative() && !value.is_zero() {
            return None;
        }
        let mantissa = U256::from(value.mantissa().unsigned_abs());
        let scale = value.scale();
        let raw = if scale <= Self::DECIMALS {
            mantissa.checked_mul(U256::exp10((Self::DECIMALS - scale) as usize))?
        } else {
            mantissa / U256::exp10((scale - Self::DECIMALS) as usize)
        };
        Some(Rate(raw))
    }

    /// Decimal view of the rate, `None` if it does not fit in 96 bits
    pub fn to_decimal(&self) -> Option<Decimal> {
        if self.0 > U256::from(i128::MAX as u128) {
            return None;
        }
        Decimal::try_from_i128_with_scale(self.0.as_u128() as i128, Self::DECIMALS)
            .ok()
            .map(|d| d.normalize())
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(d) => write!(f, "{}", d),
            None => write!(f, "{}e-{}", self.0, Self::DECIMALS),
        }
    }
}

fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    if denominator.is_zero() {
        return None;
    }
    let quotient = a.full_mul(b) / U512::from(denominator);
    U256::try_from(quotient).ok()
}

/// Which base representation a price source quotes against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleType {
    /// Priced against the wrapped base token
    Wrapped,
    /// Priced against the native asset sentinel
    Native,
    /// Both of the above
    WrappedAndNative,
}

impl Default for OracleType {
    fn default() -> Self {
        OracleType::Wrapped
    }
}

impl OracleType {
    pub fn quotes_wrapped(&self) -> bool {
        matches!(self, OracleType::Wrapped | OracleType::WrappedAndNative)
    }

    pub fn quotes_native(&self) -> bool {
        matches!(self, OracleType::Native | OracleType::WrappedAndNative)
    }
}

impl fmt::Display for OracleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleType::Wrapped => write!(f, "WRAPPED"),
            OracleType::Native => write!(f, "NATIVE"),
            OracleType::WrappedAndNative => write!(f, "WRAPPED_AND_NATIVE"),
        }
    }
}

/// A token reachable through the wrapping chain, with the factor that
/// converts one unit of the original token into this representative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Representative {
    pub token: Token,
    pub rate: Rate,
}

impl Representative {
    pub fn identity(token: Token) -> Self {
        Self {
            token,
            rate: Rate::ONE,
        }
    }
}

/// One priced path, already expressed in the caller's token units
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceQuote {
    /// Caller's source token
    pub src: Token,
    /// Caller's destination token
    pub dst: Token,
    /// Representative the source was priced as
    pub src_via: Token,
    /// Representative the destination was priced as
    pub dst_via: Token,
    /// Connector used, `Token::NONE` for a direct quote
    pub connector: Token,
    pub rate: Rate,
    pub liquidity: Liquidity,
    /// Name of the price source that produced this quote
    pub adapter: Arc<str>,
    /// Registration position of the adapter (tie-break)
    pub adapter_index: usize,
}

/// Per-call adapter accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryStats {
    /// Adapter calls issued
    pub issued: usize,
    /// Calls that returned a usable quote
    pub answered: usize,
    /// Calls that reported no pool / unsupported pair
    pub not_found: usize,
    /// Calls that errored or produced an unusable rate
    pub failed: usize,
    /// Calls that exceeded their timeout
    pub timed_out: usize,
}

impl QueryStats {
    pub fn merge(&mut self, other: &QueryStats) {
        self.issued += other.issued;
        self.answered += other.answered;
        self.not_found += other.not_found;
        self.failed += other.failed;
        self.timed_out += other.timed_out;
    }
}
