use crate::error::Result;
use crate::store::AppointmentStore;
use crate::time::TimeProvider;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Archives every past-due appointment into its customer's single
/// history record. Safe to repeat: with nothing newly expired it returns
/// 0 and changes nothing.
pub async fn sweep_expired_appointments(
    appointments: &dyn AppointmentStore,
    time: &TimeProvider,
) -> Result<usize> {
    let processed = appointments.archive_expired(time.now_utc()).await?;
    if processed > 0 {
        info!(processed, "archived expired appointments");
    }
    Ok(processed)
}

/// Runs the sweep once immediately, then on a fixed interval until the
/// token is cancelled.
pub async fn run_sweeper(
    appointments: Arc<dyn AppointmentStore>,
    time: TimeProvider,
    interval: Duration,
    token: CancellationToken,
) {
    loop {
        if let Err(e) = sweep_expired_appointments(appointments.as_ref(), &time).await {
            warn!("appointment sweep failed: {}", e);
        }
        select! {
            _ = token.cancelled() => {
                info!("appointment sweeper stopped");
                return;
            }
            _ = sleep(interval) => {}
        }
    }
}
