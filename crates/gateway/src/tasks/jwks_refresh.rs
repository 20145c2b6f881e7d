//! JWKS refresh background task.
//!
//! Re-fetches the signing key set on a fixed interval so that keys the
//! provider retires eventually stop verifying. Newly published keys are
//! picked up on demand by the resolver regardless of this task.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is cancelled. An in-flight
//! fetch is allowed to finish.

use crate::auth::KeyResolver;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Start the JWKS refresh background task.
///
/// The first refresh happens one `period` after start; the resolver has
/// already been initialized by then.
///
/// # Arguments
///
/// * `resolver` - Key resolver shared with the token verifier
/// * `period` - Time between refreshes
/// * `cancel_token` - Token for graceful shutdown
///
/// # Returns
///
/// Returns when the cancellation token is triggered.
#[instrument(skip_all, name = "gateway.task.jwks_refresh")]
pub async fn start_jwks_refresh(
    resolver: Arc<KeyResolver>,
    period: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "gateway.task.jwks_refresh",
        jwks_url = %resolver.jwks_url(),
        interval_seconds = period.as_secs(),
        "Starting JWKS refresh task"
    );

    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match resolver.refresh().await {
                    Ok(keys) => {
                        info!(
                            target: "gateway.task.jwks_refresh",
                            key_count = keys.len(),
                            "Periodic JWKS refresh complete"
                        );
                    }
                    Err(e) => {
                        // Keep serving the previous key set; try again next tick
                        warn!(
                            target: "gateway.task.jwks_refresh",
                            error = %e,
                            "Periodic JWKS refresh failed"
                        );
                    }
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "gateway.task.jwks_refresh",
                    "JWKS refresh task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "gateway.task.jwks_refresh", "JWKS refresh task stopped");
}
