use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::player::PlayerEvent;

/// Post `make()` every `period` until `shutdown` is cancelled or the receiver goes away.
/// The first event arrives one period after spawning.
pub fn spawn_ticker(
    period: Duration,
    sender: mpsc::UnboundedSender<PlayerEvent>,
    shutdown: CancellationToken,
    make: fn() -> PlayerEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if sender.send(make()).is_err() {
                        break;
                    }
                }
            }
        }
        debug!(?period, "Ticker stopped");
    })
}

/// Wall-clock heartbeat advancing the live edge
pub fn spawn_heartbeat(
    period: Duration,
    sender: mpsc::UnboundedSender<PlayerEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    spawn_ticker(period, sender, shutdown, || PlayerEvent::Heartbeat)
}

/// Periodic read of the video element's elapsed time
pub fn spawn_position_ticker(
    period: Duration,
    sender: mpsc::UnboundedSender<PlayerEvent>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    spawn_ticker(period, sender, shutdown, || PlayerEvent::PositionTick)
}
