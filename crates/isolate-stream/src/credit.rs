//! The credit window itself (spec.md §4.4 "Credit protocol"), built on a
//! `tokio::sync::Semaphore` used as a byte-weighted permit pool: spending
//! credit is `acquire_many` (suspends the producer until enough credit
//! exists, never goes negative), granting credit is `add_permits`.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::StreamError;

#[derive(Clone)]
pub struct CreditWindow {
    semaphore: Arc<Semaphore>,
}

impl CreditWindow {
    #[must_use]
    pub fn new(initial_credit: u64) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(permits(initial_credit))),
        }
    }

    /// Suspends until `len` bytes of credit are available, then spends them.
    /// Resolves with `StreamError::Closed` if the window is closed (the
    /// paired `Stream-end` has already been observed) while waiting.
    pub async fn spend(&self, len: u64, stream_id: u64) -> Result<(), StreamError> {
        if len == 0 {
            return Ok(());
        }
        let permit = self
            .semaphore
            .acquire_many(u32::try_from(len).unwrap_or(u32::MAX))
            .await
            .map_err(|_| StreamError::Closed(stream_id))?;
        permit.forget();
        Ok(())
    }

    pub fn grant(&self, len: u64) {
        if len == 0 {
            return;
        }
        self.semaphore.add_permits(permits(len));
    }

    #[must_use]
    pub fn available(&self) -> u64 {
        self.semaphore.available_permits() as u64
    }

    /// Wakes every producer waiting on `spend` with an error -- used when a
    /// stream session transitions to `closed`.
    pub fn close(&self) {
        self.semaphore.close();
    }
}

fn permits(credit: u64) -> usize {
    usize::try_from(credit).unwrap_or(usize::MAX)
}
