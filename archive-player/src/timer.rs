use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::player::PlayerEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Re-render motion once the visible window stops changing
    MotionSettle,
    /// Reload the source after a fatal network error
    NetworkRetry,
}

/// Single-shot timers, at most one pending per purpose.
///
/// Scheduling a purpose again cancels the previous timer. Each firing carries the generation
/// it was scheduled with so a late delivery can be recognised with [`TimerRegistry::take_if_current`].
pub struct TimerRegistry {
    sender: mpsc::UnboundedSender<PlayerEvent>,
    pending: HashMap<TimerPurpose, (u64, CancellationToken)>,
    generation: u64,
}

impl TimerRegistry {
    pub fn new(sender: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self {
            sender,
            pending: HashMap::new(),
            generation: 0,
        }
    }

    pub fn schedule(&mut self, purpose: TimerPurpose, delay: Duration) -> u64 {
        self.cancel(purpose);
        self.generation += 1;
        let generation = self.generation;
        let token = CancellationToken::new();
        self.pending.insert(purpose, (generation, token.clone()));

        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = sender.send(PlayerEvent::TimerFired(purpose, generation));
                }
            }
        });

        debug!(?purpose, generation, ?delay, "Timer scheduled");
        generation
    }

    pub fn cancel(&mut self, purpose: TimerPurpose) {
        if let Some((generation, token)) = self.pending.remove(&purpose) {
            token.cancel();
            debug!(?purpose, generation, "Timer cancelled");
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, token)) in self.pending.drain() {
            token.cancel();
        }
    }

    pub fn is_pending(&self, purpose: TimerPurpose) -> bool {
        self.pending.contains_key(&purpose)
    }

    /// Consume the pending timer if `generation` is still the latest for `purpose`.
    pub fn take_if_current(&mut self, purpose: TimerPurpose, generation: u64) -> bool {
        match self.pending.get(&purpose) {
            Some((current, _)) if *current == generation => {
                self.pending.remove(&purpose);
                true
            }
            _ => {
                debug!(?purpose, generation, "Dropping stale timer");
                false
            }
        }
    }
}

impl Drop for TimerRegistry {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
