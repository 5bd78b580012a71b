//! Adapter Registry - The only mutable state of the oracle
//!
//! Holds price sources (with their type tag), connector tokens, wrappers
//! and the base token. Readers take an `Arc` to an immutable snapshot;
//! writers clone the current snapshot, modify the clone and swap it in
//! under the write lock. A query that already holds a snapshot never sees
//! a later mutation.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::error::RegistryError;
use crate::oracle::sources::PriceSource;
use crate::types::{OracleType, Token};
use crate::wrappers::TokenWrapper;

/// A registered price source with its type tag
#[derive(Clone)]
pub struct OracleEntry {
    pub source: Arc<dyn PriceSource>,
    pub oracle_type: OracleType,
}

impl OracleEntry {
    pub fn name(&self) -> &str {
        self.source.name()
    }
}

impl fmt::Debug for OracleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleEntry")
            .field("name", &self.name())
            .field("oracle_type", &self.oracle_type)
            .finish()
    }
}

/// Immutable view of the registry at one version
#[derive(Clone)]
pub struct RegistrySnapshot {
    /// Incremented on every successful mutation
    pub version: u64,
    /// Price sources in registration order
    pub oracles: Vec<OracleEntry>,
    /// Connector tokens in registration order
    pub connectors: Vec<Token>,
    /// Wrappers in registration order
    pub wrappers: Vec<Arc<dyn TokenWrapper>>,
    /// Wrapped base currency token
    pub base_token: Token,
}

impl RegistrySnapshot {
    fn empty(base_token: Token) -> Self {
        Self {
            version: 0,
            oracles: Vec::new(),
            connectors: Vec::new(),
            wrappers: Vec::new(),
            base_token,
        }
    }

    pub fn has_connector(&self, token: Token) -> bool {
        self.connectors.contains(&token)
    }

    pub fn wrapper_names(&self) -> Vec<String> {
        self.wrappers.iter().map(|w| w.name().to_string()).collect()
    }
}

impl fmt::Debug for RegistrySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrySnapshot")
            .field("version", &self.version)
            .field("oracles", &self.oracles)
            .field("connectors", &self.connectors)
            .field("wrappers", &self.wrapper_names())
            .field("base_token", &self.base_token)
            .finish()
    }
}

/// Process-wide adapter registry with snapshot-at-call reads
pub struct AdapterRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl AdapterRegistry {
    pub fn new(base_token: Token) -> Result<Self, RegistryError> {
        validate_base_token(base_token)?;
        Ok(Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::empty(base_token))),
        })
    }

    /// Consistent view for one query
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        // Snapshots are swapped whole, so a poisoned lock still guards a valid one
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    pub fn add_oracle(
        &self,
        source: Arc<dyn PriceSource>,
        oracle_type: OracleType,
    ) -> Result<u64, RegistryError> {
        let name = source.name().to_string();
        let version = self.mutate(|snap| {
            if snap.oracles.iter().any(|o| o.name() == name) {
                return Err(RegistryError::OracleAlreadyAdded(name.clone()));
            }
            snap.oracles.push(OracleEntry {
                source,
                oracle_type,
            });
            Ok(())
        })?;
        tracing::info!(oracle = %name, oracle_type = %oracle_type, version, "Oracle added");
        Ok(version)
    }

    pub fn remove_oracle(&self, name: &str) -> Result<u64, RegistryError> {
        let version = self.mutate(|snap| {
            let idx = snap
                .oracles
                .iter()
                .position(|o| o.name() == name)
                .ok_or_else(|| RegistryError::UnknownOracle(name.to_string()))?;
            snap.oracles.remove(idx);
            Ok(())
        })?;
        tracing::info!(oracle = %name, version, "Oracle removed");
        Ok(version)
    }

    pub fn add_connector(&self, connector: Token) -> Result<u64, RegistryError> {
        if connector.is_none() {
            return Err(RegistryError::InvalidConnector(connector));
        }
        let version = self.mutate(|snap| {
            if snap.has_connector(connector) {
                return Err(RegistryError::ConnectorAlreadyAdded(connector));
            }
            snap.connectors.push(connector);
            Ok(())
        })?;
        tracing::info!(connector = %connector, version, "Connector added");
        Ok(version)
    }

    pub fn remove_connector(&self, connector: Token) -> Result<u64, RegistryError> {
        let version = self.mutate(|snap| {
            let idx = snap
                .connectors
                .iter()
                .position(|c| *c == connector)
                .ok_or(RegistryError::UnknownConnector(connector))?;
            snap.connectors.remove(idx);
            Ok(())
        })?;
        tracing::info!(connector = %connector, version, "Connector removed");
        Ok(version)
    }

    pub fn add_wrapper(&self, wrapper: Arc<dyn TokenWrapper>) -> Result<u64, RegistryError> {
        let name = wrapper.name().to_string();
        let version = self.mutate(|snap| {
            if snap.wrappers.iter().any(|w| w.name() == name) {
                return Err(RegistryError::WrapperAlreadyAdded(name.clone()));
            }
            snap.wrappers.push(wrapper);
            Ok(())
        })?;
        tracing::info!(wrapper = %name, version, "Wrapper added");
        Ok(version)
    }

    pub fn remove_wrapper(&self, name: &str) -> Result<u64, RegistryError> {
        let version = self.mutate(|snap| {
            let idx = snap
                .wrappers
                .iter()
                .position(|w| w.name() == name)
                .ok_or_else(|| RegistryError::UnknownWrapper(name.to_string()))?;
            snap.wrappers.remove(idx);
            Ok(())
        })?;
        tracing::info!(wrapper = %name, version, "Wrapper removed");
        Ok(version)
    }

    pub fn set_base_token(&self, base_token: Token) -> Result<u64, RegistryError> {
        validate_base_token(base_token)?;
        let version = self.mutate(|snap| {
            snap.base_token = base_token;
            Ok(())
        })?;
        tracing::info!(base_token = %base_token, version, "Base token changed");
        Ok(version)
    }

    /// Single-writer clone-modify-swap. The snapshot is only replaced when
    /// `f` succeeds, so a rejected mutation leaves the version unchanged.
    fn mutate<F>(&self, f: F) -> Result<u64, RegistryError>
    where
        F: FnOnce(&mut RegistrySnapshot) -> Result<(), RegistryError>,
    {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = RegistrySnapshot::clone(&guard);
        f(&mut next)?;
        next.version += 1;
        let version = next.version;
        *guard = Arc::new(next);
        Ok(version)
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AdapterRegistry")
            .field(&self.snapshot())
            .finish()
    }
}

fn validate_base_token(token: Token) -> Result<(), RegistryError> {
    if token.is_none() || token.is_native() {
        return Err(RegistryError::InvalidBaseToken(token));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::sources::StaticPriceSource;
    use crate::wrappers::StaticWrapper;
    use ethers::types::H160;

    fn token(byte: u8) -> Token {
        Token(H160([byte; 20]))
    }

    fn registry() -> AdapterRegistry {
        AdapterRegistry::new(token(0xaa)).unwrap()
    }

    #[test]
    fn test_add_and_remove_oracle() {
        let reg = registry();
        let v1 = reg
            .add_oracle(Arc::new(StaticPriceSource::new("a")), OracleType::Wrapped)
            .unwrap();
        let v2 = reg
            .add_oracle(Arc::new(StaticPriceSource::new("b")), OracleType::Native)
            .unwrap();
        assert!(v2 > v1);

        let names: Vec<String> = reg
            .snapshot()
            .oracles
            .iter()
            .map(|o| o.name().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"]);

        reg.remove_oracle("a").unwrap();
        assert_eq!(reg.snapshot().oracles.len(), 1);
    }

    #[test]
    fn test_duplicate_and_unknown_are_rejected() {
        let reg = registry();
        reg.add_oracle(Arc::new(StaticPriceSource::new("a")), OracleType::Wrapped)
            .unwrap();
        let version = reg.version();

        assert_eq!(
            reg.add_oracle(Arc::new(StaticPriceSource::new("a")), OracleType::Native),
            Err(RegistryError::OracleAlreadyAdded("a".to_string()))
        );
        assert_eq!(
            reg.remove_oracle("missing"),
            Err(RegistryError::UnknownOracle("missing".to_string()))
        );
        assert_eq!(
            reg.remove_connector(token(1)),
            Err(RegistryError::UnknownConnector(token(1)))
        );
        assert_eq!(
            reg.remove_wrapper("missing"),
            Err(RegistryError::UnknownWrapper("missing".to_string()))
        );
        assert_eq!(reg.version(), version);
    }

    #[test]
    fn test_connectors_and_wrappers() {
        let reg = registry();
        reg.add_connector(token(1)).unwrap();
        assert_eq!(
            reg.add_connector(token(1)),
            Err(RegistryError::ConnectorAlreadyAdded(token(1)))
        );
        assert_eq!(
            reg.add_connector(Token::NONE),
            Err(RegistryError::InvalidConnector(Token::NONE))
        );

        reg.add_wrapper(Arc::new(StaticWrapper::new("w"))).unwrap();
        assert_eq!(
            reg.add_wrapper(Arc::new(StaticWrapper::new("w"))),
            Err(RegistryError::WrapperAlreadyAdded("w".to_string()))
        );
        assert_eq!(reg.snapshot().wrapper_names(), vec!["w"]);
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let reg = registry();
        reg.add_connector(token(1)).unwrap();
        let before = reg.snapshot();

        reg.remove_connector(token(1)).unwrap();
        reg.add_oracle(Arc::new(StaticPriceSource::new("late")), OracleType::Wrapped)
            .unwrap();

        assert_eq!(before.connectors, vec![token(1)]);
        assert!(before.oracles.is_empty());
        assert!(reg.snapshot().connectors.is_empty());
    }

    #[test]
    fn test_invalid_base_token() {
        assert!(AdapterRegistry::new(Token::NONE).is_err());
        let reg = registry();
        assert_eq!(
            reg.set_base_token(Token::NATIVE),
            Err(RegistryError::InvalidBaseToken(Token::NATIVE))
        );
        reg.set_base_token(token(0xbb)).unwrap();
        assert_eq!(reg.snapshot().base_token, token(0xbb));
    }
}
