//! Offchain Oracle Library
//!
//! Best exchange rate between two tokens across pluggable price sources,
//! connector tokens and token wrappers

pub mod config;
pub mod error;
pub mod oracle;
pub mod registry;
pub mod types;
pub mod wrappers;

pub use error::{InputError, OracleError, RegistryError, SourceError, WrapError};
pub use oracle::{BestRate, OffchainOracle, OracleSettings, RateOutcome, RateQuery};
pub use registry::AdapterRegistry;
pub use types::{OracleType, PriceQuote, Rate, Token};
