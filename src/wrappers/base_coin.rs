//! Native asset ↔ wrapped base token equivalence

use async_trait::async_trait;

use crate::error::WrapError;
use crate::types::{Rate, Token};
use crate::wrappers::{TokenWrapper, Wrapped};

/// Maps both native sentinels to the wrapped base token and back at 1:1
#[derive(Debug, Clone)]
pub struct BaseCoinWrapper {
    wrapped_base: Token,
}

impl BaseCoinWrapper {
    pub fn new(wrapped_base: Token) -> Self {
        Self { wrapped_base }
    }
}

#[async_trait]
impl TokenWrapper for BaseCoinWrapper {
    fn name(&self) -> &str {
        "base-coin"
    }

    async fn wrap(&self, token: Token) -> Result<Wrapped, WrapError> {
        if token.is_native() {
            Ok(Wrapped {
                token: self.wrapped_base,
                rate: Rate::ONE,
            })
        } else if token == self.wrapped_base {
            Ok(Wrapped {
                token: Token::NATIVE,
                rate: Rate::ONE,
            })
        } else {
            Err(WrapError::NotRecognized)
        }
    }
}
