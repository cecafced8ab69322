//! Fixed-period poll loop with graceful shutdown.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::sync::SyncEngine;

/// What the poll loop did before it stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollSummary {
    pub cycles: usize,
    pub failed_cycles: usize,
    /// Failures that will not clear up by themselves (credentials,
    /// mailbox name, cursor database). Polling continues regardless.
    pub persistent_failures: usize,
    pub attachments_saved: usize,
}

/// Poll until SIGINT or SIGTERM.
pub async fn run(engine: SyncEngine, period: Duration) -> PollSummary {
    run_until(engine, period, shutdown_signal()).await
}

/// Run a cycle immediately and then every `period` until `shutdown`
/// completes.
///
/// Cycles never overlap: the next tick is only awaited after the previous
/// cycle returned, and late ticks are delayed rather than bunched up. A
/// shutdown request during a cycle takes effect once it finishes. The
/// engine, and with it the cursor store, is dropped before returning.
pub async fn run_until<F>(mut engine: SyncEngine, period: Duration, shutdown: F) -> PollSummary
where
    F: Future<Output = ()>,
{
    let mut summary = PollSummary::default();
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutting down email monitor");
                break;
            }
            _ = ticker.tick() => {}
        }

        let cycle = tokio::task::spawn_blocking(move || {
            let outcome = engine.run_cycle();
            (engine, outcome)
        });

        match cycle.await {
            Ok((returned, outcome)) => {
                engine = returned;
                summary.cycles += 1;
                match outcome {
                    Ok(report) => summary.attachments_saved += report.attachments_saved.len(),
                    Err(e) if e.is_transient() => {
                        summary.failed_cycles += 1;
                        warn!(error = %e, "Sync cycle failed, retrying next interval");
                    }
                    Err(e) => {
                        summary.failed_cycles += 1;
                        summary.persistent_failures += 1;
                        error!(error = %e, "Sync cycle failed and needs attention, still polling");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Sync cycle panicked, stopping");
                summary.failed_cycles += 1;
                return summary;
            }
        }
    }

    drop(engine);
    info!(
        cycles = summary.cycles,
        failed = summary.failed_cycles,
        persistent = summary.persistent_failures,
        saved = summary.attachments_saved,
        "Cursor store closed"
    );
    summary
}

/// Completes on Ctrl+C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
