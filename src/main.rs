//! Offchain Oracle - evaluates the configured rate queries
//!
//! Usage: cargo run -- (queries are read from config/default.yaml)

use anyhow::Result;
use futures_util::future::join_all;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use offchain_oracle::config::AppConfig;
use offchain_oracle::{OffchainOracle, RateOutcome, RateQuery};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting offchain oracle");

    let config = AppConfig::load()?;
    info!(config = %config, "Configuration loaded");

    let oracle = Arc::new(config.build_oracle()?);
    info!(
        oracles = oracle.oracles().len(),
        connectors = oracle.connectors().len(),
        wrappers = ?oracle.multi_wrapper(),
        base_token = %oracle.base_token(),
        version = oracle.registry_version(),
        "Oracle ready"
    );

    let queries = config.resolve_queries()?;
    if queries.is_empty() {
        warn!("No queries configured, nothing to do");
        return Ok(());
    }

    let results = join_all(queries.into_iter().map(|query| {
        let oracle = Arc::clone(&oracle);
        async move {
            let outcome = oracle
                .get_rate_cancellable(query, cancel_on(tokio::signal::ctrl_c()))
                .await;
            (query, outcome)
        }
    }))
    .await;

    for (query, outcome) in results {
        match outcome {
            Ok(outcome) => println!("{}", report(&oracle, &query, &outcome)),
            Err(e) => {
                error!(src = %query.src, dst = %query.dst, error = %e, "Query rejected");
                println!(
                    "{}",
                    serde_json::json!({
                        "src": query.src.to_string(),
                        "dst": query.dst.to_string(),
                        "status": "rejected",
                        "error": e.to_string(),
                        "queried_at": chrono::Utc::now().to_rfc3339(),
                    })
                );
            }
        }
    }

    Ok(())
}

/// Completes when `signal` fires. A signal that cannot be installed never
/// fires, so queries run to completion instead of reporting cancelled.
async fn cancel_on<F, E>(signal: F)
where
    F: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "Failed to listen for Ctrl-C, queries cannot be cancelled");
        std::future::pending::<()>().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("OFFCHAIN_ORACLE_LOG_JSON")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    // stdout carries the query results
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn report(oracle: &OffchainOracle, query: &RateQuery, outcome: &RateOutcome) -> serde_json::Value {
    let mut line = serde_json::json!({
        "src": query.src.to_string(),
        "dst": query.dst.to_string(),
        "connector": query.connector.to_string(),
        "threshold": query.threshold,
        "queried_at": chrono::Utc::now().to_rfc3339(),
    });

    let fields = match outcome {
        RateOutcome::Found(best) => serde_json::json!({
            "status": "found",
            "rate": best.rate.to_string(),
            "rate_raw": best.rate.raw().to_string(),
            "liquidity": best.liquidity.to_string(),
            "adapter": best.adapter,
            "via": best.connector.to_string(),
            "candidates": best.candidates,
            "eligible": best.eligible,
            "registry_version": best.registry_version,
            "stats": best.stats,
        }),
        RateOutcome::NotFound => serde_json::json!({
            "status": "not_found",
            "registry_version": oracle.registry_version(),
        }),
        RateOutcome::Cancelled => serde_json::json!({ "status": "cancelled" }),
    };

    if let (Some(line), serde_json::Value::Object(fields)) = (line.as_object_mut(), fields) {
        line.extend(fields);
    }
    line
}
