//! Table-backed price source
//!
//! Serves configured directed pair quotes. Useful for pinned reference
//! prices, offline evaluation and tests.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::SourceError;
use crate::oracle::sources::{PriceSource, SourceQuote};
use crate::types::{Liquidity, Rate, Token};

#[derive(Debug, Clone)]
pub struct StaticPriceSource {
    name: String,
    /// Directed quotes keyed by (src, dst)
    pairs: HashMap<(Token, Token), SourceQuote>,
    /// Derive missing reverse quotes as the inverse rate
    symmetric: bool,
}

impl StaticPriceSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pairs: HashMap::new(),
            symmetric: false,
        }
    }

    pub fn symmetric(mut self, symmetric: bool) -> Self {
        self.symmetric = symmetric;
        self
    }

    pub fn with_pair(mut self, src: Token, dst: Token, rate: Rate, liquidity: Liquidity) -> Self {
        self.pairs.insert((src, dst), SourceQuote::new(rate, liquidity));
        self
    }

    pub fn pair_count(&self) -> usize {
        self.pairs.len()
    }

    fn lookup(&self, src: Token, dst: Token) -> Option<SourceQuote> {
        if let Some(quote) = self.pairs.get(&(src, dst)) {
            return Some(*quote);
        }
        if !self.symmetric {
            return None;
        }
        let reverse = self.pairs.get(&(dst, src))?;
        Some(SourceQuote::new(reverse.rate.inverse()?, reverse.liquidity))
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_rate(
        &self,
        src: Token,
        dst: Token,
        connector: Token,
        _threshold: u64,
    ) -> Result<SourceQuote, SourceError> {
        if connector.is_none() {
            return self.lookup(src, dst).ok_or(SourceError::PoolNotFound);
        }

        let first = self
            .lookup(src, connector)
            .ok_or(SourceError::PoolNotFound)?;
        let second = self
            .lookup(connector, dst)
            .ok_or(SourceError::PoolNotFound)?;
        first
            .then(second)
            .ok_or_else(|| SourceError::Failed("rate overflow".to_string()))
    }
}
