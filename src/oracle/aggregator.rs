//! Rate Aggregator - Reduces routed quotes to one best rate
//!
//! Quotes arrive already expressed in the caller's token units, so they
//! are directly comparable. Quotes below the liquidity threshold are
//! discarded and the highest remaining rate wins. Equal rates prefer the
//! deeper quote, then the earlier-registered adapter.

use std::cmp::Ordering;

use ethers::types::U256;

use crate::types::{Liquidity, PriceQuote, QueryStats, Rate, Token};

/// Winning quote of one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BestRate {
    pub src: Token,
    pub dst: Token,
    pub rate: Rate,
    pub liquidity: Liquidity,
    /// Adapter that produced the winning quote
    pub adapter: String,
    /// Connector on the winning path, `Token::NONE` if direct
    pub connector: Token,
    pub src_via: Token,
    pub dst_via: Token,
    /// Quotes collected before filtering
    pub candidates: usize,
    /// Quotes that passed the threshold
    pub eligible: usize,
    /// Registry version the query ran against
    pub registry_version: u64,
    pub stats: QueryStats,
}

/// Result of a rate query. Absence of liquidity is a normal outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateOutcome {
    Found(BestRate),
    NotFound,
    /// The caller cancelled before all sources answered
    Cancelled,
}

impl RateOutcome {
    pub fn rate(&self) -> Option<Rate> {
        match self {
            RateOutcome::Found(best) => Some(best.rate),
            _ => None,
        }
    }

    pub fn best(&self) -> Option<&BestRate> {
        match self {
            RateOutcome::Found(best) => Some(best),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, RateOutcome::Found(_))
    }
}

/// Max-rate selection under a liquidity threshold
#[derive(Debug, Clone, Copy, Default)]
pub struct RateAggregator;

impl RateAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Quotes whose liquidity meets `threshold`
    pub fn eligible<'a>(
        &self,
        quotes: &'a [PriceQuote],
        threshold: u64,
    ) -> impl Iterator<Item = &'a PriceQuote> {
        let min = U256::from(threshold);
        quotes.iter().filter(move |q| q.liquidity >= min)
    }

    /// Best eligible quote, or `None` when nothing passes the threshold.
    /// For equal keys the first quote in input order wins.
    pub fn select<'a>(&self, quotes: &'a [PriceQuote], threshold: u64) -> Option<&'a PriceQuote> {
        let mut best: Option<&PriceQuote> = None;
        for quote in self.eligible(quotes, threshold) {
            best = match best {
                Some(current) if compare(quote, current) != Ordering::Greater => Some(current),
                _ => Some(quote),
            };
        }
        best
    }

    /// Reduce `quotes` into a `RateOutcome`
    pub fn aggregate(
        &self,
        quotes: &[PriceQuote],
        threshold: u64,
        registry_version: u64,
        stats: QueryStats,
    ) -> RateOutcome {
        let eligible = self.eligible(quotes, threshold).count();
        let Some(winner) = self.select(quotes, threshold) else {
            tracing::debug!(
                candidates = quotes.len(),
                threshold,
                "No quote passed the threshold"
            );
            return RateOutcome::NotFound;
        };

        RateOutcome::Found(BestRate {
            src: winner.src,
            dst: winner.dst,
            rate: winner.rate,
            liquidity: winner.liquidity,
            adapter: winner.adapter.to_string(),
            connector: winner.connector,
            src_via: winner.src_via,
            dst_via: winner.dst_via,
            candidates: quotes.len(),
            eligible,
            registry_version,
            stats,
        })
    }
}

/// Ordering of candidate quotes: higher rate, then higher liquidity,
/// then lower adapter registration index.
fn compare(a: &PriceQuote, b: &PriceQuote) -> Ordering {
    a.rate
        .cmp(&b.rate)
        .then(a.liquidity.cmp(&b.liquidity))
        .then(b.adapter_index.cmp(&a.adapter_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::H160;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn make_quote(adapter: &str, index: usize, rate: rust_decimal::Decimal, liquidity: u64) -> PriceQuote {
        PriceQuote {
            src: Token(H160([1; 20])),
            dst: Token(H160([2; 20])),
            src_via: Token(H160([1; 20])),
            dst_via: Token(H160([2; 20])),
            connector: Token::NONE,
            rate: Rate::from_decimal(rate).unwrap(),
            liquidity: U256::from(liquidity),
            adapter: Arc::from(adapter),
            adapter_index: index,
        }
    }

    #[test]
    fn test_aggregator_picks_max_rate() {
        let quotes = vec![
            make_quote("uniswap", 0, dec!(3000), 50),
            make_quote("dodo", 1, dec!(3010), 20),
            make_quote("curve", 2, dec!(2990), 90),
        ];
        let outcome = RateAggregator::new().aggregate(&quotes, 10, 1, QueryStats::default());
        let best = outcome.best().unwrap();
        assert_eq!(best.adapter, "dodo");
        assert_eq!(best.rate, Rate::from_decimal(dec!(3010)).unwrap());
        assert_eq!(best.candidates, 3);
        assert_eq!(best.eligible, 3);
    }

    #[test]
    fn test_aggregator_threshold_filters() {
        let quotes = vec![
            make_quote("uniswap", 0, dec!(3000), 50),
            make_quote("dodo", 1, dec!(3010), 20),
        ];
        let outcome = RateAggregator::new().aggregate(&quotes, 30, 1, QueryStats::default());
        assert_eq!(outcome.best().unwrap().adapter, "uniswap");

        let none = RateAggregator::new().aggregate(&quotes, 51, 1, QueryStats::default());
        assert_eq!(none, RateOutcome::NotFound);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let quotes = vec![make_quote("uniswap", 0, dec!(1), 10)];
        assert!(RateAggregator::new()
            .aggregate(&quotes, 10, 1, QueryStats::default())
            .is_found());
    }

    #[test]
    fn test_tie_prefers_liquidity_then_registration_order() {
        let quotes = vec![
            make_quote("late-deep", 2, dec!(5), 100),
            make_quote("early-shallow", 0, dec!(5), 40),
        ];
        let agg = RateAggregator::new();
        assert_eq!(agg.select(&quotes, 0).unwrap().adapter.as_ref(), "late-deep");

        let quotes = vec![
            make_quote("second", 1, dec!(5), 40),
            make_quote("first", 0, dec!(5), 40),
        ];
        assert_eq!(agg.select(&quotes, 0).unwrap().adapter.as_ref(), "first");
    }

    #[test]
    fn test_empty_input_is_not_found() {
        assert_eq!(
            RateAggregator::new().aggregate(&[], 0, 0, QueryStats::default()),
            RateOutcome::NotFound
        );
    }
}
