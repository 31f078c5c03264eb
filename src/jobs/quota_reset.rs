//! Background job: periodic quota reset.
//!
//! Provider quotas reset on a fixed schedule (daily for Gemini), so every
//! credential taken out of rotation for quota reasons is put back on the same
//! cadence.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time;

use crate::store::credentials::CredentialStore;

/// Spawn the reset task. The first reset happens one full `interval` after
/// the call.
pub fn spawn(store: Arc<CredentialStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            reset(&store);
        }
    })
}

fn reset(store: &CredentialStore) {
    let reactivated = store.reactivate_all();
    if reactivated > 0 {
        tracing::info!(reactivated = reactivated, "quota reset: reactivated credentials");
    } else {
        tracing::debug!("quota reset: no inactive credentials");
    }
}
