//! Height iteration driver
//!
//! Composes the lifecycle controller across a range of heights. Cycles are
//! strictly sequential: the indexer's data directory and HTTP port are
//! non-reentrant, so height H+1 never starts before H's server has exited.

use crate::capture::Strategy;
use crate::events::{LifecycleEvent, Reporter};
use crate::ord_process::{LifecycleError, OrdIndexer};

/// Capture one snapshot per height in `from..=to` under `label`.
///
/// The first failed cycle aborts the whole run; silently skipping a height
/// would leave a hole that a later diff could misread as a ledger
/// difference.
pub async fn capture_range(
    indexer: &OrdIndexer,
    reporter: &dyn Reporter,
    from: u64,
    to: u64,
    label: &str,
    strategy: Strategy,
    fan_out: usize,
) -> Result<(), LifecycleError> {
    for height in from..=to {
        if let Err(e) = run_cycle(indexer, height, label, strategy, fan_out).await {
            reporter.event(LifecycleEvent::CycleFailed {
                height,
                error: &e.to_string(),
            });
            return Err(e);
        }
    }
    Ok(())
}

async fn run_cycle(
    indexer: &OrdIndexer,
    height: u64,
    label: &str,
    strategy: Strategy,
    fan_out: usize,
) -> Result<(), LifecycleError> {
    indexer.update_index(height).await?;
    indexer
        .capture_height(height, label, strategy, fan_out)
        .await?;
    Ok(())
}
