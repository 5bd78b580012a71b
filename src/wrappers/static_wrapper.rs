//! Table-backed wrapper for configured token equivalences
//! (yield-bearing receipts, rebasing wrappers, bridged copies).

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::WrapError;
use crate::types::{Rate, Token};
use crate::wrappers::{TokenWrapper, Wrapped};

#[derive(Debug, Clone)]
pub struct StaticWrapper {
    name: String,
    edges: HashMap<Token, Wrapped>,
}

impl StaticWrapper {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            edges: HashMap::new(),
        }
    }

    /// Add a directed edge `from -> to`; a later edge for the same `from` replaces it
    pub fn with_edge(mut self, from: Token, to: Token, rate: Rate) -> Self {
        self.edges.insert(from, Wrapped { token: to, rate });
        self
    }

    /// Add `underlying -> wrapped` at `rate` plus the exact inverse edge
    pub fn with_pair(self, underlying: Token, wrapped: Token, rate: Rate) -> Self {
        match rate.inverse() {
            Some(inverse) => self
                .with_edge(underlying, wrapped, rate)
                .with_edge(wrapped, underlying, inverse),
            None => self.with_edge(underlying, wrapped, rate),
        }
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }
}

#[async_trait]
impl TokenWrapper for StaticWrapper {
    fn name(&self) -> &str {
        &self.name
    }

    async fn wrap(&self, token: Token) -> Result<Wrapped, WrapError> {
        self.edges
            .get(&token)
            .copied()
            .ok_or(WrapError::NotRecognized)
    }
}
