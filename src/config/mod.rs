//! Configuration management for the oracle
//!
//! Loads from YAML files + environment variables via .env

use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::InputError;
use crate::oracle::sources::StaticPriceSource;
use crate::oracle::{OffchainOracle, OracleSettings, RateQuery};
use crate::registry::AdapterRegistry;
use crate::types::{OracleType, Rate, Token};
use crate::wrappers::{BaseCoinWrapper, StaticWrapper};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    /// Symbol -> address book used to resolve token fields
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    pub wrappers: WrappersConfig,
    /// Queries evaluated by the binary
    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Wrapped base currency token (symbol or address)
    pub base_token: String,
    /// Connector tokens tried when a query names no connector
    pub connectors: Vec<String>,
    /// Threshold used by queries that do not set one
    pub default_threshold: u64,
    /// Largest threshold a caller may pass
    pub max_threshold: u64,
    /// Per adapter call timeout in milliseconds
    pub adapter_timeout_ms: u64,
    /// Overall query deadline in milliseconds
    pub query_deadline_ms: u64,
    /// Maximum wrapping hops explored per token
    pub max_wrap_depth: usize,
    /// Expand tokens through wrappers
    pub use_wrappers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(default)]
    pub oracle_type: OracleType,
    /// Derive reverse quotes from configured ones
    #[serde(default)]
    pub symmetric: bool,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairConfig {
    pub src: String,
    pub dst: String,
    pub rate: Decimal,
    pub liquidity: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrappersConfig {
    /// Register the native ↔ wrapped base wrapper
    pub base_coin: bool,
    #[serde(default)]
    pub tables: Vec<WrapperTableConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrapperTableConfig {
    pub name: String,
    /// Directed edges
    #[serde(default)]
    pub edges: Vec<EdgeConfig>,
    /// Edges added together with their exact inverse
    #[serde(default)]
    pub pairs: Vec<EdgeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeConfig {
    pub from: String,
    pub to: String,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    pub src: String,
    pub dst: String,
    #[serde(default)]
    pub connector: Option<String>,
    #[serde(default)]
    pub threshold: Option<u64>,
}

/// Case-insensitive symbol resolution (config keys arrive lowercased)
#[derive(Debug, Clone, Default)]
pub struct TokenBook {
    symbols: HashMap<String, Token>,
}

impl TokenBook {
    pub fn from_symbols(symbols: &HashMap<String, String>) -> Result<Self, InputError> {
        let mut book = HashMap::with_capacity(symbols.len());
        for (symbol, address) in symbols {
            book.insert(symbol.to_lowercase(), address.parse::<Token>()?);
        }
        Ok(Self { symbols: book })
    }

    /// Resolve a hex address, a built-in sentinel, or a known symbol
    pub fn resolve(&self, value: &str) -> Result<Token, InputError> {
        let value = value.trim();
        if value.starts_with("0x") {
            return value.parse();
        }
        if let Some(token) = self.symbols.get(&value.to_lowercase()) {
            return Ok(*token);
        }
        Token::sentinel(value).ok_or_else(|| InputError::UnknownToken(value.to_string()))
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let config = Self::with_defaults()?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (OFFCHAIN_ORACLE__*)
            .add_source(Environment::with_prefix("OFFCHAIN_ORACLE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Load configuration from an in-memory YAML document (defaults still apply)
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config = Self::with_defaults()?
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    fn with_defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            // Oracle defaults
            .set_default("oracle.base_token", "WETH")?
            .set_default("oracle.connectors", Vec::<String>::new())?
            .set_default("oracle.default_threshold", 10)?
            .set_default("oracle.max_threshold", 100)?
            .set_default("oracle.adapter_timeout_ms", 2000)?
            .set_default("oracle.query_deadline_ms", 5000)?
            .set_default("oracle.max_wrap_depth", 3)?
            .set_default("oracle.use_wrappers", true)?
            // Wrapper defaults
            .set_default("wrappers.base_coin", true)?)
    }

    pub fn token_book(&self) -> Result<TokenBook> {
        TokenBook::from_symbols(&self.tokens).context("Invalid token address in [tokens]")
    }

    pub fn settings(&self) -> Result<OracleSettings> {
        if self.oracle.default_threshold > self.oracle.max_threshold {
            bail!(
                "oracle.default_threshold ({}) exceeds oracle.max_threshold ({})",
                self.oracle.default_threshold,
                self.oracle.max_threshold
            );
        }
        if self.oracle.adapter_timeout_ms == 0 || self.oracle.query_deadline_ms == 0 {
            bail!("oracle timeouts must be greater than zero");
        }
        Ok(OracleSettings {
            adapter_timeout: Duration::from_millis(self.oracle.adapter_timeout_ms),
            query_deadline: Duration::from_millis(self.oracle.query_deadline_ms),
            max_threshold: self.oracle.max_threshold,
            max_wrap_depth: self.oracle.max_wrap_depth,
        })
    }

    /// Construct the registry and oracle described by this configuration
    pub fn build_oracle(&self) -> Result<OffchainOracle> {
        let book = self.token_book()?;
        let settings = self.settings()?;

        let base = book
            .resolve(&self.oracle.base_token)
            .context("Invalid oracle.base_token")?;
        let registry = AdapterRegistry::new(base)?;

        if self.wrappers.base_coin {
            registry.add_wrapper(Arc::new(BaseCoinWrapper::new(base)))?;
        }

        for table in &self.wrappers.tables {
            let mut wrapper = StaticWrapper::new(table.name.clone());
            for edge in &table.edges {
                let (from, to, rate) = resolve_edge(&book, edge)
                    .with_context(|| format!("Invalid edge in wrapper '{}'", table.name))?;
                wrapper = wrapper.with_edge(from, to, rate);
            }
            for edge in &table.pairs {
                let (from, to, rate) = resolve_edge(&book, edge)
                    .with_context(|| format!("Invalid pair in wrapper '{}'", table.name))?;
                wrapper = wrapper.with_pair(from, to, rate);
            }
            registry.add_wrapper(Arc::new(wrapper))?;
        }

        for source in &self.sources {
            let mut adapter = StaticPriceSource::new(source.name.clone()).symmetric(source.symmetric);
            for pair in &source.pairs {
                let src = book.resolve(&pair.src)?;
                let dst = book.resolve(&pair.dst)?;
                let rate = Rate::from_decimal(pair.rate).with_context(|| {
                    format!("Invalid rate {} in source '{}'", pair.rate, source.name)
                })?;
                adapter = adapter.with_pair(src, dst, rate, pair.liquidity.into());
            }
            registry.add_oracle(Arc::new(adapter), source.oracle_type)?;
        }

        for connector in &self.oracle.connectors {
            let token = book
                .resolve(connector)
                .with_context(|| format!("Invalid connector '{}'", connector))?;
            registry.add_connector(token)?;
        }

        Ok(OffchainOracle::new(registry, settings))
    }

    /// Queries from the `queries` section with symbols resolved
    pub fn resolve_queries(&self) -> Result<Vec<RateQuery>> {
        let book = self.token_book()?;
        self.queries
            .iter()
            .map(|q| -> Result<RateQuery> {
                let connector = match &q.connector {
                    Some(c) => book.resolve(c)?,
                    None => Token::NONE,
                };
                Ok(RateQuery {
                    src: book.resolve(&q.src)?,
                    dst: book.resolve(&q.dst)?,
                    connector,
                    threshold: q.threshold.unwrap_or(self.oracle.default_threshold),
                })
            })
            .collect()
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "base={} connectors={:?} sources={} wrapper_tables={} base_coin={} threshold={}/{} timeout_ms={}",
            self.oracle.base_token,
            self.oracle.connectors,
            self.sources.len(),
            self.wrappers.tables.len(),
            self.wrappers.base_coin,
            self.oracle.default_threshold,
            self.oracle.max_threshold,
            self.oracle.adapter_timeout_ms
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}

fn resolve_edge(book: &TokenBook, edge: &EdgeConfig) -> Result<(Token, Token, Rate)> {
    let from = book.resolve(&edge.from)?;
    let to = book.resolve(&edge.to)?;
    let rate = Rate::from_decimal(edge.rate)
        .with_context(|| format!("Invalid wrap rate {}", edge.rate))?;
    Ok((from, to, rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"
oracle:
  base_token: WETH
  connectors: [USDC]
tokens:
  WETH: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2"
  USDC: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"
  WBTC: "0x2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599"
sources:
  - name: pinned
    oracle_type: wrapped
    pairs:
      - { src: WETH, dst: USDC, rate: "3000", liquidity: 500 }
wrappers:
  tables:
    - name: bridge
      pairs:
        - { from: WBTC, to: "0x0000000000000000000000000000000000000001", rate: "1" }
queries:
  - { src: WETH, dst: USDC }
  - { src: WBTC, dst: WETH, connector: USDC, threshold: 20 }
"#;

    #[test]
    fn test_defaults_apply() {
        let config = AppConfig::from_yaml_str("tokens: {}").unwrap();
        assert_eq!(config.oracle.default_threshold, 10);
        assert_eq!(config.oracle.max_threshold, 100);
        assert_eq!(config.oracle.adapter_timeout_ms, 2000);
        assert!(config.wrappers.base_coin);
        assert!(config.sources.is_empty());
    }

    #[test]
    fn test_sample_builds_oracle() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(config.sources[0].pairs[0].rate, dec!(3000));

        let oracle = config.build_oracle().unwrap();
        assert_eq!(oracle.oracles(), vec![("pinned".to_string(), OracleType::Wrapped)]);
        assert_eq!(oracle.multi_wrapper(), vec!["base-coin", "bridge"]);
        assert_eq!(oracle.connectors().len(), 1);
    }

    #[test]
    fn test_queries_resolve_symbols_and_defaults() {
        let config = AppConfig::from_yaml_str(SAMPLE).unwrap();
        let queries = config.resolve_queries().unwrap();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].connector, Token::NONE);
        assert_eq!(queries[0].threshold, 10);
        assert_eq!(queries[1].threshold, 20);
        assert!(!queries[1].connector.is_none());
    }

    #[test]
    fn test_token_book_resolution() {
        let symbols = HashMap::from([(
            "dai".to_string(),
            "0x6B175474E89094C44Da98b954EedeAC495271d0F".to_string(),
        )]);
        let book = TokenBook::from_symbols(&symbols).unwrap();
        assert!(book.resolve("DAI").is_ok());
        assert_eq!(book.resolve("NONE"), Ok(Token::NONE));
        assert_eq!(book.resolve("eth"), Ok(Token::NATIVE));
        assert_eq!(
            book.resolve("XYZ"),
            Err(InputError::UnknownToken("XYZ".to_string()))
        );
    }

    #[test]
    fn test_threshold_bounds_validated() {
        let config = AppConfig::from_yaml_str(
            "oracle:\n  default_threshold: 500\n  max_threshold: 100\ntokens:\n  WETH: \"0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2\"\n",
        )
        .unwrap();
        assert!(config.build_oracle().is_err());
    }
}
