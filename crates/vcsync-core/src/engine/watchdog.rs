//! Phase watchdog
//!
//! Bounds are an observability signal: an overrunning phase is reported but
//! never cancelled.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Drive `fut` to completion, warning once if it outlives `bound`
pub async fn watch<F: Future>(phase: &str, bound: Duration, fut: F) -> F::Output {
    let started = Instant::now();
    tokio::pin!(fut);

    tokio::select! {
        output = &mut fut => return output,
        _ = tokio::time::sleep(bound) => {
            warn!(phase, bound_ms = bound.as_millis() as u64, "Phase exceeded its watchdog bound");
        }
    }

    let output = fut.await;
    info!(
        phase,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Overrunning phase completed"
    );
    output
}
