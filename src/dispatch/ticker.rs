use super::Input;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Feed `Input::Tick` into the queue every `period`
pub fn spawn_ticker(
    sender: mpsc::Sender<Input>,
    period: Duration,
    cancellation_token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Ticker started ({:?})", period);

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    debug!("Ticker cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if sender.send(Input::Tick(Utc::now())).await.is_err() {
                        debug!("Input queue closed, stopping ticker");
                        break;
                    }
                }
            }
        }
    })
}
