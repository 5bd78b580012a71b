//! Oracle module - Multi-source rate aggregation
//!
//! `OffchainOracle` is the public entry point. A query expands both tokens
//! through the wrapping chain, fans out to every registered price source
//! along direct and connector paths, and reduces the surviving quotes to
//! the best rate above the liquidity threshold.

mod aggregator;
mod router;
pub mod sources;

pub use aggregator::{BestRate, RateAggregator, RateOutcome};
pub use router::{ConnectorRouter, PathEnds, RoutedQuotes, WRAPPING_ADAPTER};

use ethers::types::U256;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{InputError, RegistryError, Result};
use crate::registry::{AdapterRegistry, OracleEntry, RegistrySnapshot};
use crate::types::{OracleType, QueryStats, Rate, Representative, Token};
use crate::wrappers::{TokenWrapper, WrappingResolver};
use sources::PriceSource;

/// Adapter name reported when source and destination are the same token
pub const IDENTITY_ADAPTER: &str = "identity";

/// Query-time tunables
#[derive(Debug, Clone)]
pub struct OracleSettings {
    /// Timeout for each individual adapter call
    pub adapter_timeout: Duration,
    /// Overall deadline for one query
    pub query_deadline: Duration,
    /// Largest accepted threshold filter
    pub max_threshold: u64,
    /// Maximum wrapping hops explored per token
    pub max_wrap_depth: usize,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_millis(2000),
            query_deadline: Duration::from_millis(5000),
            max_threshold: 100,
            max_wrap_depth: 3,
        }
    }
}

/// A single rate request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuery {
    pub src: Token,
    pub dst: Token,
    /// `Token::NONE` to try every registered connector
    pub connector: Token,
    pub threshold: u64,
}

/// Validated query bound to one registry snapshot
struct QueryPlan {
    snapshot: Arc<RegistrySnapshot>,
    src: Token,
    dst: Token,
    use_wrappers: bool,
    /// Hops tried for every representative pair, `Token::NONE` is direct
    hops: Vec<Token>,
    threshold: u64,
}

/// Rate aggregation facade
pub struct OffchainOracle {
    registry: AdapterRegistry,
    resolver: WrappingResolver,
    router: ConnectorRouter,
    aggregator: RateAggregator,
    settings: OracleSettings,
}

impl OffchainOracle {
    pub fn new(registry: AdapterRegistry, settings: OracleSettings) -> Self {
        Self {
            resolver: WrappingResolver::new(settings.adapter_timeout, settings.max_wrap_depth),
            router: ConnectorRouter::new(settings.adapter_timeout),
            aggregator: RateAggregator::new(),
            registry,
            settings,
        }
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Best rate from `src` to `dst`, directly or through `connector`
    /// (`Token::NONE` tries every registered connector).
    pub async fn get_rate(
        &self,
        src: Token,
        dst: Token,
        connector: Token,
        threshold: u64,
    ) -> Result<RateOutcome> {
        let plan = self.plan(src, dst, connector, threshold)?;
        Ok(self.evaluate(plan).await)
    }

    /// Like `get_rate`, but returns `RateOutcome::Cancelled` as soon as
    /// `cancel` completes. In-flight adapter calls are dropped.
    pub async fn get_rate_cancellable<C>(&self, query: RateQuery, cancel: C) -> Result<RateOutcome>
    where
        C: Future<Output = ()>,
    {
        let plan = self.plan(query.src, query.dst, query.connector, query.threshold)?;
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!(src = %query.src, dst = %query.dst, "Rate query cancelled");
                Ok(RateOutcome::Cancelled)
            }
            outcome = self.evaluate(plan) => Ok(outcome),
        }
    }

    /// Route only through `connectors` (unregistered tokens allowed). The
    /// direct path is tried only when the list contains `Token::NONE`.
    /// `use_wrappers = false` prices each side as itself only.
    pub async fn get_rate_with_custom_connectors(
        &self,
        src: Token,
        dst: Token,
        use_wrappers: bool,
        connectors: &[Token],
        threshold: u64,
    ) -> Result<RateOutcome> {
        self.validate(src, dst, threshold)?;
        let plan = QueryPlan {
            snapshot: self.registry.snapshot(),
            src,
            dst,
            use_wrappers,
            hops: connectors.to_vec(),
            threshold,
        };
        Ok(self.evaluate(plan).await)
    }

    /// Every quote that routing produced for this query, before threshold
    /// filtering and selection.
    pub async fn find_quotes(
        &self,
        src: Token,
        dst: Token,
        connector: Token,
        threshold: u64,
    ) -> Result<RoutedQuotes> {
        let plan = self.plan(src, dst, connector, threshold)?;
        Ok(self.collect(&plan).await)
    }

    /// Value `src` in the base currency. Each source is asked for the
    /// representation(s) its type tag declares: the wrapped base token,
    /// the native asset, or both.
    pub async fn get_rate_to_base(
        &self,
        src: Token,
        use_wrappers: bool,
        threshold: u64,
    ) -> Result<RateOutcome> {
        let snapshot = self.registry.snapshot();
        let base = snapshot.base_token;
        self.validate(src, base, threshold)?;

        if src == base || src.is_native() {
            return Ok(identity_outcome(src, base, snapshot.version));
        }

        let deadline = Instant::now() + self.settings.query_deadline;
        let src_reps = self
            .expand(&snapshot.wrappers, src, use_wrappers, deadline)
            .await;

        let wrapped: Vec<(usize, &OracleEntry)> = indexed_oracles(&snapshot)
            .filter(|(_, o)| o.oracle_type.quotes_wrapped())
            .collect();
        let native: Vec<(usize, &OracleEntry)> = indexed_oracles(&snapshot)
            .filter(|(_, o)| o.oracle_type.quotes_native())
            .collect();

        let hops = with_direct(&snapshot.connectors);
        let base_reps = [Representative::identity(base)];
        let native_reps = [Representative::identity(Token::NATIVE)];
        let (mut routed, native_routed) = tokio::join!(
            self.router.find_quotes(
                PathEnds {
                    src,
                    dst: base,
                    src_reps: &src_reps,
                    dst_reps: &base_reps,
                },
                &wrapped,
                &hops,
                threshold,
                deadline,
            ),
            self.router.find_quotes(
                PathEnds {
                    src,
                    dst: base,
                    src_reps: &src_reps,
                    dst_reps: &native_reps,
                },
                &native,
                &hops,
                threshold,
                deadline,
            ),
        );
        routed.quotes.extend(native_routed.quotes);
        routed.stats.merge(&native_routed.stats);

        Ok(self.finish(src, base, &snapshot, routed, threshold))
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Registered price sources and their type tags, in registration order
    pub fn oracles(&self) -> Vec<(String, OracleType)> {
        self.registry
            .snapshot()
            .oracles
            .iter()
            .map(|o| (o.name().to_string(), o.oracle_type))
            .collect()
    }

    pub fn connectors(&self) -> Vec<Token> {
        self.registry.snapshot().connectors.clone()
    }

    /// Names of the wrappers used for token expansion
    pub fn multi_wrapper(&self) -> Vec<String> {
        self.registry.snapshot().wrapper_names()
    }

    pub fn base_token(&self) -> Token {
        self.registry.snapshot().base_token
    }

    pub fn registry_version(&self) -> u64 {
        self.registry.version()
    }

    // ------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------

    pub fn add_oracle(
        &self,
        source: Arc<dyn PriceSource>,
        oracle_type: OracleType,
    ) -> std::result::Result<u64, RegistryError> {
        self.registry.add_oracle(source, oracle_type)
    }

    pub fn remove_oracle(&self, name: &str) -> std::result::Result<u64, RegistryError> {
        self.registry.remove_oracle(name)
    }

    pub fn add_connector(&self, connector: Token) -> std::result::Result<u64, RegistryError> {
        self.registry.add_connector(connector)
    }

    pub fn remove_connector(&self, connector: Token) -> std::result::Result<u64, RegistryError> {
        self.registry.remove_connector(connector)
    }

    pub fn add_wrapper(
        &self,
        wrapper: Arc<dyn TokenWrapper>,
    ) -> std::result::Result<u64, RegistryError> {
        self.registry.add_wrapper(wrapper)
    }

    pub fn remove_wrapper(&self, name: &str) -> std::result::Result<u64, RegistryError> {
        self.registry.remove_wrapper(name)
    }

    pub fn set_base_token(&self, base_token: Token) -> std::result::Result<u64, RegistryError> {
        self.registry.set_base_token(base_token)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn validate(&self, src: Token, dst: Token, threshold: u64) -> Result<()> {
        for token in [src, dst] {
            if token.is_none() {
                return Err(InputError::SentinelToken(token).into());
            }
        }
        if threshold > self.settings.max_threshold {
            return Err(InputError::ThresholdOutOfRange {
                threshold,
                max: self.settings.max_threshold,
            }
            .into());
        }
        Ok(())
    }

    fn plan(&self, src: Token, dst: Token, connector: Token, threshold: u64) -> Result<QueryPlan> {
        self.validate(src, dst, threshold)?;
        let snapshot = self.registry.snapshot();

        let hops = if connector.is_none() {
            with_direct(&snapshot.connectors)
        } else if snapshot.has_connector(connector) {
            with_direct(&[connector])
        } else {
            return Err(InputError::UnknownConnector(connector).into());
        };

        Ok(QueryPlan {
            snapshot,
            src,
            dst,
            use_wrappers: true,
            hops,
            threshold,
        })
    }

    async fn evaluate(&self, plan: QueryPlan) -> RateOutcome {
        if plan.src == plan.dst {
            return identity_outcome(plan.src, plan.dst, plan.snapshot.version);
        }
        let routed = self.collect(&plan).await;
        self.finish(plan.src, plan.dst, &plan.snapshot, routed, plan.threshold)
    }

    async fn collect(&self, plan: &QueryPlan) -> RoutedQuotes {
        let deadline = Instant::now() + self.settings.query_deadline;
        let wrappers = &plan.snapshot.wrappers;
        let (src_reps, dst_reps) = tokio::join!(
            self.expand(wrappers, plan.src, plan.use_wrappers, deadline),
            self.expand(wrappers, plan.dst, plan.use_wrappers, deadline),
        );

        let oracles: Vec<(usize, &OracleEntry)> = indexed_oracles(&plan.snapshot).collect();
        self.router
            .find_quotes(
                PathEnds {
                    src: plan.src,
                    dst: plan.dst,
                    src_reps: &src_reps,
                    dst_reps: &dst_reps,
                },
                &oracles,
                &plan.hops,
                plan.threshold,
                deadline,
            )
            .await
    }

    async fn expand(
        &self,
        wrappers: &[Arc<dyn TokenWrapper>],
        token: Token,
        use_wrappers: bool,
        deadline: Instant,
    ) -> Vec<Representative> {
        if use_wrappers {
            self.resolver.expand(token, wrappers, deadline).await
        } else {
            vec![Representative::identity(token)]
        }
    }

    fn finish(
        &self,
        src: Token,
        dst: Token,
        snapshot: &RegistrySnapshot,
        routed: RoutedQuotes,
        threshold: u64,
    ) -> RateOutcome {
        let stats: QueryStats = routed.stats;
        tracing::debug!(
            src = %src,
            dst = %dst,
            threshold,
            registry_version = snapshot.version,
            issued = stats.issued,
            answered = stats.answered,
            not_found = stats.not_found,
            failed = stats.failed,
            timed_out = stats.timed_out,
            quotes = routed.quotes.len(),
            "Rate query complete"
        );
        self.aggregator
            .aggregate(&routed.quotes, threshold, snapshot.version, stats)
    }
}

impl std::fmt::Debug for OffchainOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffchainOracle")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .finish()
    }
}

fn indexed_oracles(snapshot: &RegistrySnapshot) -> impl Iterator<Item = (usize, &OracleEntry)> {
    snapshot.oracles.iter().enumerate()
}

/// The direct path followed by `connectors`
fn with_direct(connectors: &[Token]) -> Vec<Token> {
    std::iter::once(Token::NONE)
        .chain(connectors.iter().copied())
        .collect()
}

fn identity_outcome(src: Token, dst: Token, registry_version: u64) -> RateOutcome {
    RateOutcome::Found(BestRate {
        src,
        dst,
        rate: Rate::ONE,
        liquidity: U256::MAX,
        adapter: IDENTITY_ADAPTER.to_string(),
        connector: Token::NONE,
        src_via: src,
        dst_via: dst,
        candidates: 0,
        eligible: 0,
        registry_version,
        stats: QueryStats::default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::oracle::sources::{MockPriceSource, StaticPriceSource};
    use crate::wrappers::{BaseCoinWrapper, StaticWrapper};
    use ethers::types::H160;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    fn token(byte: u8) -> Token {
        Token(H160([byte; 20]))
    }

    fn rate(d: rust_decimal::Decimal) -> Rate {
        Rate::from_decimal(d).unwrap()
    }

    const WETH: u8 = 0xa1;
    const USDC: u8 = 0xa2;
    const DAI: u8 = 0xa3;
    const ADAI: u8 = 0xa4;

    fn oracle() -> OffchainOracle {
        let registry = AdapterRegistry::new(token(WETH)).unwrap();
        OffchainOracle::new(registry, OracleSettings::default())
    }

    #[tokio::test]
    async fn test_invalid_input_issues_no_adapter_calls() {
        let oracle = oracle();
        let mut source = MockPriceSource::new();
        source.expect_name().return_const("never".to_string());
        source.expect_get_rate().never();
        oracle
            .add_oracle(Arc::new(source), OracleType::Wrapped)
            .unwrap();

        let unknown = oracle.get_rate(token(WETH), token(USDC), token(DAI), 10).await;
        assert_eq!(
            unknown,
            Err(OracleError::Input(InputError::UnknownConnector(token(DAI))))
        );
        let threshold = oracle.get_rate(token(WETH), token(USDC), Token::NONE, 101).await;
        assert_eq!(
            threshold,
            Err(OracleError::Input(InputError::ThresholdOutOfRange {
                threshold: 101,
                max: 100
            }))
        );
        assert_err!(oracle.get_rate(Token::NONE, token(USDC), Token::NONE, 1).await);
    }

    #[tokio::test]
    async fn test_same_token_is_unit_rate() {
        let outcome = assert_ok!(oracle().get_rate(token(DAI), token(DAI), Token::NONE, 0).await);
        assert_eq!(outcome.rate(), Some(Rate::ONE));
        assert_eq!(outcome.best().unwrap().adapter, IDENTITY_ADAPTER);
    }

    #[tokio::test]
    async fn test_wrapped_token_priced_through_underlying() {
        let oracle = oracle();
        oracle
            .add_wrapper(Arc::new(
                StaticWrapper::new("aave").with_pair(token(ADAI), token(DAI), rate(dec!(1.1))),
            ))
            .unwrap();
        oracle
            .add_oracle(
                Arc::new(
                    StaticPriceSource::new("venue")
                        .with_pair(token(DAI), token(USDC), rate(dec!(1)), U256::from(50)),
                ),
                OracleType::Wrapped,
            )
            .unwrap();

        let outcome = oracle
            .get_rate(token(ADAI), token(USDC), Token::NONE, 10)
            .await
            .unwrap();
        let best = outcome.best().unwrap();
        assert_eq!(best.rate, rate(dec!(1.1)));
        assert_eq!(best.src_via, token(DAI));
    }

    #[tokio::test]
    async fn test_custom_connectors_without_wrappers() {
        let oracle = oracle();
        oracle
            .add_wrapper(Arc::new(
                StaticWrapper::new("aave").with_pair(token(ADAI), token(DAI), Rate::ONE),
            ))
            .unwrap();
        oracle
            .add_oracle(
                Arc::new(
                    StaticPriceSource::new("venue")
                        .with_pair(token(DAI), token(WETH), rate(dec!(0.0005)), U256::from(50))
                        .with_pair(token(WETH), token(USDC), rate(dec!(2000)), U256::from(50)),
                ),
                OracleType::Wrapped,
            )
            .unwrap();

        let routed = oracle
            .get_rate_with_custom_connectors(token(DAI), token(USDC), false, &[token(WETH)], 0)
            .await
            .unwrap();
        assert_eq!(routed.rate(), Some(rate(dec!(1))));
        assert_eq!(routed.best().unwrap().connector, token(WETH));

        let unwrapped = oracle
            .get_rate_with_custom_connectors(token(ADAI), token(USDC), false, &[token(WETH)], 0)
            .await
            .unwrap();
        assert_eq!(unwrapped, RateOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_custom_connectors_skip_direct_unless_listed() {
        let oracle = oracle();
        oracle
            .add_oracle(
                Arc::new(
                    StaticPriceSource::new("venue")
                        .with_pair(token(DAI), token(USDC), rate(dec!(5)), U256::from(50))
                        .with_pair(token(DAI), token(WETH), rate(dec!(1)), U256::from(50))
                        .with_pair(token(WETH), token(USDC), rate(dec!(1)), U256::from(50)),
                ),
                OracleType::Wrapped,
            )
            .unwrap();

        let via_weth = oracle
            .get_rate_with_custom_connectors(token(DAI), token(USDC), false, &[token(WETH)], 0)
            .await
            .unwrap();
        let best = via_weth.best().unwrap();
        assert_eq!(best.rate, Rate::ONE);
        assert_eq!(best.connector, token(WETH));
        assert_eq!(best.stats.issued, 1);

        let with_direct = oracle
            .get_rate_with_custom_connectors(
                token(DAI),
                token(USDC),
                false,
                &[Token::NONE, token(WETH)],
                0,
            )
            .await
            .unwrap();
        assert_eq!(with_direct.rate(), Some(rate(dec!(5))));
        assert_eq!(with_direct.best().unwrap().connector, Token::NONE);
    }

    #[tokio::test]
    async fn test_rate_to_base_respects_oracle_type() {
        let oracle = oracle();
        oracle
            .add_wrapper(Arc::new(BaseCoinWrapper::new(token(WETH))))
            .unwrap();
        oracle
            .add_oracle(
                Arc::new(
                    StaticPriceSource::new("weth-venue")
                        .with_pair(token(USDC), token(WETH), rate(dec!(0.0005)), U256::from(50)),
                ),
                OracleType::Wrapped,
            )
            .unwrap();
        oracle
            .add_oracle(
                Arc::new(
                    StaticPriceSource::new("eth-venue")
                        .with_pair(token(USDC), Token::NATIVE, rate(dec!(0.0006)), U256::from(50))
                        .with_pair(token(USDC), token(WETH), rate(dec!(0.0009)), U256::from(50)),
                ),
                OracleType::Native,
            )
            .unwrap();

        let outcome = oracle.get_rate_to_base(token(USDC), true, 10).await.unwrap();
        let best = outcome.best().unwrap();
        assert_eq!(best.rate, rate(dec!(0.0006)));
        assert_eq!(best.adapter, "eth-venue");
        assert_eq!(best.dst, token(WETH));

        let native = oracle.get_rate_to_base(Token::NATIVE_EEE, true, 10).await.unwrap();
        assert_eq!(native.rate(), Some(Rate::ONE));
    }

    #[tokio::test]
    async fn test_cancellation_returns_cancelled() {
        struct Hanging;
        #[async_trait::async_trait]
        impl PriceSource for Hanging {
            fn name(&self) -> &str {
                "hanging"
            }
            async fn get_rate(
                &self,
                _src: Token,
                _dst: Token,
                _connector: Token,
                _threshold: u64,
            ) -> std::result::Result<sources::SourceQuote, crate::error::SourceError> {
                std::future::pending().await
            }
        }

        let oracle = oracle();
        oracle
            .add_oracle(Arc::new(Hanging), OracleType::Wrapped)
            .unwrap();

        let query = RateQuery {
            src: token(WETH),
            dst: token(USDC),
            connector: Token::NONE,
            threshold: 0,
        };
        let outcome = oracle
            .get_rate_cancellable(query, tokio::time::sleep(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(outcome, RateOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_introspection() {
        let oracle = oracle();
        oracle
            .add_oracle(Arc::new(StaticPriceSource::new("a")), OracleType::WrappedAndNative)
            .unwrap();
        oracle.add_connector(token(USDC)).unwrap();
        oracle
            .add_wrapper(Arc::new(BaseCoinWrapper::new(token(WETH))))
            .unwrap();

        assert_eq!(
            oracle.oracles(),
            vec![("a".to_string(), OracleType::WrappedAndNative)]
        );
        assert_eq!(oracle.connectors(), vec![token(USDC)]);
        assert_eq!(oracle.multi_wrapper(), vec!["base-coin".to_string()]);
        assert_eq!(oracle.base_token(), token(WETH));
        assert_eq!(oracle.registry_version(), 3);
    }
}
