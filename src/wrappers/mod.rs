//! Token wrappers - Normalizes tokens through their wrapping chains
//!
//! A wrapper knows the 1:r equivalence between a token and its
//! wrapped/unwrapped counterpart (native ↔ wrapped base, aToken ↔
//! underlying, ...). The resolver walks every registered wrapper to find
//! all token identities a price source may know.

mod base_coin;
mod resolver;
mod static_wrapper;

pub use base_coin::BaseCoinWrapper;
pub use resolver::WrappingResolver;
pub use static_wrapper::StaticWrapper;

use async_trait::async_trait;

use crate::error::WrapError;
use crate::types::{Rate, Token};

/// Result of a successful wrap: the counterpart token and the factor that
/// converts an amount of the input token into an amount of `token`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wrapped {
    pub token: Token,
    pub rate: Rate,
}

/// Trait for token wrapper adapters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenWrapper: Send + Sync {
    /// Unique adapter name
    fn name(&self) -> &str;

    /// Map `token` to its counterpart, or `WrapError::NotRecognized`
    async fn wrap(&self, token: Token) -> Result<Wrapped, WrapError>;
}
