//! Connector Router - Enumerates priced paths between two tokens
//!
//! For every pair of wrapping representatives and every registered price
//! source, asks for the direct rate and the rate through each connector.
//! All calls run concurrently; each one is bounded by its own timeout and
//! by the query deadline. A failing call only drops its own path.

use ethers::types::U256;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::oracle::sources::{PriceSource, SourceQuote};
use crate::registry::OracleEntry;
use crate::types::{PriceQuote, QueryStats, Rate, Representative, Token};

/// Adapter name used for paths where both sides wrap into the same token
pub const WRAPPING_ADAPTER: &str = "wrapping";

/// Quotes collected for one query plus call accounting
#[derive(Debug, Clone, Default)]
pub struct RoutedQuotes {
    pub quotes: Vec<PriceQuote>,
    pub stats: QueryStats,
}

/// One path of a query: both sides and what they resolved to
#[derive(Debug, Clone, Copy)]
pub struct PathEnds<'a> {
    /// Caller's source token
    pub src: Token,
    /// Caller's destination token
    pub dst: Token,
    pub src_reps: &'a [Representative],
    pub dst_reps: &'a [Representative],
}

#[derive(Clone)]
struct Candidate {
    adapter_index: usize,
    source: Arc<dyn PriceSource>,
    src_rep: Representative,
    dst_rep: Representative,
    connector: Token,
}

#[derive(Debug, Clone)]
pub struct ConnectorRouter {
    /// Timeout applied to each individual price source call
    call_timeout: Duration,
}

impl ConnectorRouter {
    pub fn new(call_timeout: Duration) -> Self {
        Self { call_timeout }
    }

    /// Query every oracle along every candidate path.
    ///
    /// `oracles` carries each source with its registration index. `hops`
    /// lists every hop to try in order; `Token::NONE` is the direct path.
    pub async fn find_quotes(
        &self,
        ends: PathEnds<'_>,
        oracles: &[(usize, &OracleEntry)],
        hops: &[Token],
        threshold: u64,
        deadline: Instant,
    ) -> RoutedQuotes {
        let mut routed = RoutedQuotes::default();
        let candidates = enumerate(ends, oracles, hops);
        let call_deadline = deadline.min(Instant::now() + self.call_timeout);

        let calls = candidates.iter().map(|candidate| {
            timeout_at(
                call_deadline,
                candidate.source.get_rate(
                    candidate.src_rep.token,
                    candidate.dst_rep.token,
                    candidate.connector,
                    threshold,
                ),
            )
        });
        let results = join_all(calls).await;

        for (candidate, outcome) in candidates.iter().zip(results) {
            let source = &candidate.source;
            routed.stats.issued += 1;

            let quote = match outcome {
                Ok(Ok(quote)) => quote,
                Ok(Err(e)) if e.is_not_found() => {
                    routed.stats.not_found += 1;
                    tracing::trace!(
                        adapter = %source.name(),
                        src = %candidate.src_rep.token,
                        dst = %candidate.dst_rep.token,
                        connector = %candidate.connector,
                        "No pool for path"
                    );
                    continue;
                }
                Ok(Err(e)) => {
                    routed.stats.failed += 1;
                    tracing::debug!(
                        adapter = %source.name(),
                        src = %candidate.src_rep.token,
                        dst = %candidate.dst_rep.token,
                        error = %e,
                        "Price source call failed"
                    );
                    continue;
                }
                Err(_) => {
                    routed.stats.timed_out += 1;
                    tracing::warn!(
                        adapter = %source.name(),
                        src = %candidate.src_rep.token,
                        dst = %candidate.dst_rep.token,
                        "Price source call timed out"
                    );
                    continue;
                }
            };

            match to_caller_units(candidate, quote) {
                Some(rate) => {
                    routed.stats.answered += 1;
                    routed.quotes.push(PriceQuote {
                        src: ends.src,
                        dst: ends.dst,
                        src_via: candidate.src_rep.token,
                        dst_via: candidate.dst_rep.token,
                        connector: candidate.connector,
                        rate,
                        liquidity: quote.liquidity,
                        adapter: Arc::from(source.name()),
                        adapter_index: candidate.adapter_index,
                    });
                }
                None => {
                    routed.stats.failed += 1;
                    tracing::debug!(
                        adapter = %source.name(),
                        "Quote overflowed while converting to caller units"
                    );
                }
            }
        }

        routed.quotes.extend(wrapping_quotes(ends));
        routed
    }
}

impl Default for ConnectorRouter {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

/// Adapter-major, then representative pair, then hop in the given order.
/// Connectors equal to either representative are skipped.
fn enumerate(
    ends: PathEnds<'_>,
    oracles: &[(usize, &OracleEntry)],
    hops: &[Token],
) -> Vec<Candidate> {
    let mut out = Vec::new();
    for (adapter_index, entry) in oracles {
        for src_rep in ends.src_reps {
            for dst_rep in ends.dst_reps {
                if src_rep.token == dst_rep.token {
                    continue;
                }
                let usable = hops
                    .iter()
                    .copied()
                    .filter(|c| c.is_none() || (*c != src_rep.token && *c != dst_rep.token));
                for connector in usable {
                    out.push(Candidate {
                        adapter_index: *adapter_index,
                        source: Arc::clone(&entry.source),
                        src_rep: *src_rep,
                        dst_rep: *dst_rep,
                        connector,
                    });
                }
            }
        }
    }
    out
}

/// `src_rep.rate * quote / dst_rep.rate`: one source unit becomes
/// `src_rep.rate` representatives, priced into destination representatives,
/// which convert back into `1 / dst_rep.rate` destination units.
fn to_caller_units(candidate: &Candidate, quote: SourceQuote) -> Option<Rate> {
    candidate
        .src_rep
        .rate
        .checked_mul(quote.rate)?
        .checked_div(candidate.dst_rep.rate)
}

/// Paths where both sides wrap into the same token need no price source:
/// the rate is the ratio of the two wrapping factors.
fn wrapping_quotes(ends: PathEnds<'_>) -> Vec<PriceQuote> {
    let mut out = Vec::new();
    for src_rep in ends.src_reps {
        for dst_rep in ends.dst_reps {
            if src_rep.token != dst_rep.token {
                continue;
            }
            if let Some(rate) = src_rep.rate.checked_div(dst_rep.rate) {
                out.push(PriceQuote {
                    src: ends.src,
                    dst: ends.dst,
                    src_via: src_rep.token,
                    dst_via: dst_rep.token,
                    connector: Token::NONE,
                    rate,
                    liquidity: U256::MAX,
                    adapter: Arc::from(WRAPPING_ADAPTER),
                    adapter_index: usize::MAX,
                });
            }
        }
    }
    out
}
