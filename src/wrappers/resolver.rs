//! Wrapping Resolver - Expands a token into every priceable identity
//!
//! Walks the registered wrappers breadth-first starting from the origin
//! token. Each reachable token is tagged with the compounded conversion
//! rate from the origin. A visited set keeps cyclic wrapper graphs finite.

use futures_util::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::types::{Representative, Token};
use crate::wrappers::TokenWrapper;

/// Breadth-first expansion of tokens through registered wrappers
#[derive(Debug, Clone)]
pub struct WrappingResolver {
    /// Timeout applied to each individual wrapper call
    call_timeout: Duration,
    /// Maximum number of wrapping hops from the origin
    max_depth: usize,
}

impl WrappingResolver {
    pub fn new(call_timeout: Duration, max_depth: usize) -> Self {
        Self {
            call_timeout,
            max_depth,
        }
    }

    /// Expand `token` into all representatives reachable through `wrappers`.
    ///
    /// The origin is always first with rate 1.0. Wrapper errors, timeouts and
    /// zero rates drop only the branch they occur on.
    pub async fn expand(
        &self,
        token: Token,
        wrappers: &[Arc<dyn TokenWrapper>],
        deadline: Instant,
    ) -> Vec<Representative> {
        let mut result = vec![Representative::identity(token)];
        let mut visited: HashSet<Token> = HashSet::from([token]);
        let mut frontier = vec![Representative::identity(token)];

        for depth in 0..self.max_depth {
            if frontier.is_empty() || wrappers.is_empty() {
                break;
            }

            let call_deadline = deadline.min(Instant::now() + self.call_timeout);
            let calls = frontier.iter().copied().flat_map(|node| {
                wrappers.iter().map(move |wrapper| {
                    let wrapper = Arc::clone(wrapper);
                    async move {
                        let outcome = timeout_at(call_deadline, wrapper.wrap(node.token)).await;
                        (node, wrapper, outcome)
                    }
                })
            });

            let mut next = Vec::new();
            for (node, wrapper, outcome) in join_all(calls).await {
                let wrapped = match outcome {
                    Ok(Ok(wrapped)) => wrapped,
                    Ok(Err(e)) => {
                        tracing::trace!(
                            wrapper = %wrapper.name(),
                            token = %node.token,
                            error = %e,
                            "Wrapper declined token"
                        );
                        continue;
                    }
                    Err(_) => {
                        tracing::warn!(
                            wrapper = %wrapper.name(),
                            token = %node.token,
                            "Wrapper call timed out"
                        );
                        continue;
                    }
                };

                if wrapped.rate.is_zero() || !visited.insert(wrapped.token) {
                    continue;
                }

                let Some(rate) = node.rate.checked_mul(wrapped.rate) else {
                    tracing::warn!(
                        wrapper = %wrapper.name(),
                        token = %node.token,
                        "Compounded wrap rate overflowed"
                    );
                    continue;
                };
                if rate.is_zero() {
                    continue;
                }

                let rep = Representative {
                    token: wrapped.token,
                    rate,
                };
                tracing::trace!(
                    origin = %token,
                    token = %rep.token,
                    rate = %rep.rate,
                    depth = depth + 1,
                    "Reached representative"
                );
                result.push(rep);
                next.push(rep);
            }
            frontier = next;
        }

        result
    }
}

impl Default for WrappingResolver {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), 3)
    }
}
