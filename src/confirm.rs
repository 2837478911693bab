//! Transaction confirmation tracking
//!
//! A submitted transaction resolves to a hash immediately; the caller then
//! waits for a confirmation-count threshold. `PendingTx::wait` polls the
//! provider until the threshold is met, and supports explicit cancellation
//! for callers that abandon the operation (e.g. the screen that submitted
//! it goes away) so a late result never lands on stale state.

use crate::contracts::ChainProvider;
use crate::error::AggregatorError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Threshold reached; carries the confirmation count observed.
    Confirmed(u32),
    /// The caller cancelled the wait before the threshold was reached.
    Cancelled,
}

/// Cancels the associated `PendingTx::wait`. Cheap to clone and safe to
/// trigger after the wait has already resolved.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// A transaction that has been submitted but not yet confirmed to the
/// configured threshold.
pub struct PendingTx {
    pub hash: String,
    provider: Arc<dyn ChainProvider>,
    threshold: u32,
    poll_interval: Duration,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for PendingTx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTx")
            .field("hash", &self.hash)
            .field("threshold", &self.threshold)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

impl PendingTx {
    pub fn new(
        hash: String,
        provider: Arc<dyn ChainProvider>,
        threshold: u32,
        poll_interval: Duration,
    ) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        PendingTx {
            hash,
            provider,
            threshold,
            poll_interval,
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
        }
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Wait until the transaction has at least the threshold number of
    /// confirmations, polling the provider between checks. Provider errors
    /// propagate verbatim; cancellation resolves with
    /// `ConfirmOutcome::Cancelled` and stops polling immediately.
    pub async fn wait(mut self) -> Result<ConfirmOutcome, AggregatorError> {
        loop {
            if *self.cancel_rx.borrow() {
                log::debug!("Confirmation wait for {} cancelled", self.hash);
                return Ok(ConfirmOutcome::Cancelled);
            }

            let confirmations = self.provider.confirmations(&self.hash).await?;
            if confirmations >= self.threshold {
                log::debug!(
                    "Transaction {} confirmed ({} >= {})",
                    self.hash,
                    confirmations,
                    self.threshold
                );
                return Ok(ConfirmOutcome::Confirmed(confirmations));
            }

            tokio::select! {
                changed = self.cancel_rx.changed() => {
                    if changed.is_ok() && *self.cancel_rx.borrow() {
                        log::debug!("Confirmation wait for {} cancelled", self.hash);
                        return Ok(ConfirmOutcome::Cancelled);
                    }
                }
                _ = sleep(self.poll_interval) => {}
            }
        }
    }
}
