use thiserror::Error;

use crate::types::Token;

/// Caller errors, surfaced before any adapter is queried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("malformed token identifier '{0}'")]
    MalformedToken(String),

    #[error("unknown token symbol '{0}'")]
    UnknownToken(String),

    #[error("sentinel token {0} cannot be priced")]
    SentinelToken(Token),

    #[error("connector {0} is not configured")]
    UnknownConnector(Token),

    #[error("threshold {threshold} outside valid range 0..={max}")]
    ThresholdOutOfRange { threshold: u64, max: u64 },
}

/// Administrative errors raised by registry mutations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("oracle '{0}' is not registered")]
    UnknownOracle(String),

    #[error("oracle '{0}' is already registered")]
    OracleAlreadyAdded(String),

    #[error("connector {0} is not registered")]
    UnknownConnector(Token),

    #[error("connector {0} is already registered")]
    ConnectorAlreadyAdded(Token),

    #[error("token {0} cannot be used as a connector")]
    InvalidConnector(Token),

    #[error("wrapper '{0}' is not registered")]
    UnknownWrapper(String),

    #[error("wrapper '{0}' is already registered")]
    WrapperAlreadyAdded(String),

    #[error("invalid base token {0}")]
    InvalidBaseToken(Token),
}

/// Failure reported by a single price source call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("pool not found")]
    PoolNotFound,

    #[error("source failed: {0}")]
    Failed(String),
}

impl SourceError {
    /// "No liquidity here" as opposed to a malfunctioning source
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::PoolNotFound)
    }
}

/// Failure reported by a single wrapper call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WrapError {
    #[error("token not recognized")]
    NotRecognized,

    #[error("wrapper failed: {0}")]
    Failed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub type Result<T> = std::result::Result<T, OracleError>;
