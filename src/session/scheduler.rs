//! Periodic driver for [`Recorder::tick`].

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::recorder::{Recorder, TickOutcome};
use crate::config::RecorderConfig;

/// Tick `recorder` every `period` until `shutdown` resolves
///
/// Tick failures are logged and the loop carries on; the recorder keeps its
/// buffered records and retries on the next period.
///
/// # Returns
///
/// * `u64` - Number of ticks run
pub async fn run<F>(recorder: Arc<Mutex<Recorder>>, period: Duration, shutdown: F) -> u64
where
    F: Future<Output = ()>,
{
    let mut ticker = interval(period);
    // A slow flush must not cause a burst of catch-up ticks
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!("Tick scheduler running every {:?}", period);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut recorder = recorder.lock().await;
                match recorder.tick().await {
                    Ok(TickOutcome::Recorded { flushed }) if flushed > 0 => {
                        debug!("Tick {} flushed {} records", ticks, flushed);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Tick {} failed: {}", ticks, e),
                }
                ticks += 1;
            }

            _ = &mut shutdown => {
                info!("Tick scheduler stopped after {} ticks", ticks);
                break;
            }
        }
    }

    ticks
}

/// Spawn [`run`] on the current runtime at the configured tick interval.
pub fn spawn<F>(recorder: Arc<Mutex<Recorder>>, config: &RecorderConfig, shutdown: F) -> JoinHandle<u64>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(run(recorder, config.tick_interval(), shutdown))
}
