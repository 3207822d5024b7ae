//! Cooperative cancellation shared by every stage of a job.

use tokio::sync::watch;

use crate::error::{MediaError, MediaResult};

/// Create a cancel switch and the token observing it.
pub fn cancel_pair() -> (watch::Sender<bool>, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (tx, CancelToken::new(rx))
}

/// Read side of a job's cancel switch.
///
/// Checked between stages and once per frame; never blocks.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// `Err(Cancelled)` once the switch has been flipped.
    pub fn check(&self) -> MediaResult<()> {
        if self.is_cancelled() {
            Err(MediaError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve when cancelled; pend forever if the switch is dropped unflipped.
    pub async fn cancelled(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}
