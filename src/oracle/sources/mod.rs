//! Price source adapters
//!
//! Every liquidity venue implements `PriceSource`. The router talks to
//! sources only through this trait, so venues can be registered and
//! removed at runtime without touching the aggregation code.

mod static_source;

pub use static_source::StaticPriceSource;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::{Liquidity, Rate, Token};

/// Rate and liquidity signal reported by one source for one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceQuote {
    pub rate: Rate,
    pub liquidity: Liquidity,
}

impl SourceQuote {
    pub fn new(rate: Rate, liquidity: Liquidity) -> Self {
        Self { rate, liquidity }
    }

    /// Compose `self` (src → connector) with `next` (connector → dst).
    /// Rates multiply; the path is only as liquid as its weaker leg.
    pub fn then(self, next: SourceQuote) -> Option<SourceQuote> {
        Some(SourceQuote {
            rate: self.rate.checked_mul(next.rate)?,
            liquidity: self.liquidity.min(next.liquidity),
        })
    }
}

/// Trait for price source adapters
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Unique adapter name
    fn name(&self) -> &str;

    /// Rate from `src` to `dst`, routed through `connector` unless it is
    /// `Token::NONE`. `threshold` is passed through for sources that
    /// pre-filter their pools.
    async fn get_rate(
        &self,
        src: Token,
        dst: Token,
        connector: Token,
        threshold: u64,
    ) -> Result<SourceQuote, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use rust_decimal_macros::dec;

    #[test]
    fn test_then_multiplies_and_takes_min_liquidity() {
        let a = SourceQuote::new(Rate::from_decimal(dec!(2000)).unwrap(), U256::from(50));
        let b = SourceQuote::new(Rate::from_decimal(dec!(0.5)).unwrap(), U256::from(20));
        let path = a.then(b).unwrap();
        assert_eq!(path.rate, Rate::from_decimal(dec!(1000)).unwrap());
        assert_eq!(path.liquidity, U256::from(20));
    }
}
