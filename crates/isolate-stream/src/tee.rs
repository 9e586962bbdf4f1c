//! Tee (spec.md §4.4, §9 Design Notes open question 2). Two branches share
//! one source; a pump task decouples draining the source from either
//! branch's consumption rate by buffering per branch up to a configurable
//! spill budget, cancelling a branch that overruns its budget instead of
//! ever stalling the other one (chosen option (b), see `DESIGN.md`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use isolate_protocol::{StreamId, WireError};
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::session::{StreamConsumer, StreamItem};

#[derive(Debug, Clone, Copy)]
pub struct TeeConfig {
    pub spill_budget_bytes: u64,
}

impl Default for TeeConfig {
    fn default() -> Self {
        // DESIGN.md open-question decision: 1 MiB default spill budget.
        Self {
            spill_budget_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone)]
pub enum TeeItem {
    Chunk(Bytes),
    End(Result<(), WireError>),
    /// This branch exceeded its spill budget; no further items will arrive.
    Cancelled(StreamError),
}

struct BranchHandle {
    tx: mpsc::UnboundedSender<TeeItem>,
    buffered_bytes: Arc<AtomicU64>,
    alive: bool,
}

pub struct TeeBranch {
    stream_id: StreamId,
    rx: mpsc::UnboundedReceiver<TeeItem>,
    buffered_bytes: Arc<AtomicU64>,
}

impl TeeBranch {
    pub async fn recv(&mut self) -> Option<TeeItem> {
        let item = self.rx.recv().await?;
        if let TeeItem::Chunk(ref bytes) = item {
            self.buffered_bytes
                .fetch_sub(bytes.len() as u64, Ordering::Relaxed);
        }
        Some(item)
    }

    #[must_use]
    pub const fn stream_id(&self) -> StreamId {
        self.stream_id
    }
}

/// Splits `source` into two independently back-pressured branches and
/// spawns the pump task that drains `source` into both.
pub fn tee(stream_id: StreamId, source: StreamConsumer, config: TeeConfig) -> (TeeBranch, TeeBranch) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    let buffered_a = Arc::new(AtomicU64::new(0));
    let buffered_b = Arc::new(AtomicU64::new(0));

    let branch_a = TeeBranch {
        stream_id,
        rx: rx_a,
        buffered_bytes: buffered_a.clone(),
    };
    let branch_b = TeeBranch {
        stream_id,
        rx: rx_b,
        buffered_bytes: buffered_b.clone(),
    };

    tokio::spawn(pump(
        source,
        config,
        BranchHandle {
            tx: tx_a,
            buffered_bytes: buffered_a,
            alive: true,
        },
        BranchHandle {
            tx: tx_b,
            buffered_bytes: buffered_b,
            alive: true,
        },
    ));

    (branch_a, branch_b)
}

async fn pump(
    mut source: StreamConsumer,
    config: TeeConfig,
    mut a: BranchHandle,
    mut b: BranchHandle,
) {
    loop {
        if !a.alive && !b.alive {
            return;
        }
        match source.recv().await {
            Some(StreamItem::Chunk(bytes)) => {
                deliver_chunk(&mut a, &bytes, config.spill_budget_bytes);
                deliver_chunk(&mut b, &bytes, config.spill_budget_bytes);
            }
            Some(StreamItem::End(result)) => {
                if a.alive {
                    let _ = a.tx.send(TeeItem::End(result.clone()));
                }
                if b.alive {
                    let _ = b.tx.send(TeeItem::End(result));
                }
                return;
            }
            None => return,
        }
    }
}

fn deliver_chunk(branch: &mut BranchHandle, bytes: &Bytes, spill_budget_bytes: u64) {
    if !branch.alive {
        return;
    }
    let current = branch.buffered_bytes.load(Ordering::Relaxed);
    if current + bytes.len() as u64 > spill_budget_bytes {
        let _ = branch.tx.send(TeeItem::Cancelled(StreamError::SpillBudgetExceeded {
            budget: spill_budget_bytes,
        }));
        branch.alive = false;
        return;
    }
    branch
        .buffered_bytes
        .fetch_add(bytes.len() as u64, Ordering::Relaxed);
    let _ = branch.tx.send(TeeItem::Chunk(bytes.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session;
    use std::time::Duration;

    #[tokio::test]
    async fn both_branches_see_every_chunk_in_order() {
        let (producer, consumer) = session::channel(1, 1024);
        let (mut a, mut b) = tee(1, consumer, TeeConfig::default());

        for i in 0..3u8 {
            producer.send_chunk(Bytes::from(vec![i])).await.unwrap();
        }
        producer.end(Ok(()));

        for branch in [&mut a, &mut b] {
            let mut seen = Vec::new();
            loop {
                match branch.recv().await.unwrap() {
                    TeeItem::Chunk(bytes) => seen.push(bytes[0]),
                    TeeItem::End(result) => {
                        result.unwrap();
                        break;
                    }
                    TeeItem::Cancelled(e) => panic!("unexpected cancellation: {e}"),
                }
            }
            assert_eq!(seen, vec![0, 1, 2]);
        }
    }

    #[tokio::test]
    async fn unread_sibling_does_not_stall_the_active_branch() {
        let (producer, consumer) = session::channel(1, 1024 * 1024);
        let (mut active, _dangling) = tee(1, consumer, TeeConfig::default());

        for i in 0..50u8 {
            producer.send_chunk(Bytes::from(vec![i])).await.unwrap();
        }
        producer.end(Ok(()));

        let mut seen = 0;
        loop {
            match tokio::time::timeout(Duration::from_millis(500), active.recv())
                .await
                .expect("active branch must not stall because of the unread sibling")
                .unwrap()
            {
                TeeItem::Chunk(_) => seen += 1,
                TeeItem::End(result) => {
                    result.unwrap();
                    break;
                }
                TeeItem::Cancelled(e) => panic!("unexpected cancellation: {e}"),
            }
        }
        assert_eq!(seen, 50);
    }

    #[tokio::test]
    async fn sibling_exceeding_spill_budget_is_cancelled_not_blocking() {
        let (producer, consumer) = session::channel(1, 1024 * 1024);
        let tiny_budget = TeeConfig { spill_budget_bytes: 4 };
        let (mut active, mut dangling) = tee(1, consumer, tiny_budget);

        for _ in 0..10u8 {
            producer.send_chunk(Bytes::from_static(b"12345")).await.unwrap();
        }
        producer.end(Ok(()));

        let cancelled = loop {
            match dangling.recv().await.unwrap() {
                TeeItem::Cancelled(e) => break e,
                TeeItem::End(_) => panic!("expected cancellation before a normal end"),
                TeeItem::Chunk(_) => continue,
            }
        };
        assert!(matches!(cancelled, StreamError::SpillBudgetExceeded { .. }));

        // The active branch still drains to completion.
        let mut count = 0;
        loop {
            match active.recv().await.unwrap() {
                TeeItem::Chunk(_) => count += 1,
                TeeItem::End(result) => {
                    result.unwrap();
                    break;
                }
                TeeItem::Cancelled(e) => panic!("unexpected cancellation: {e}"),
            }
        }
        assert_eq!(count, 10);
    }
}
