use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{profile_store::ProfileStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_FAILED_CHECKS: u32 = 3;

/// Connect to the profile service and keep the shared state in degraded mode while it is
/// unreachable.
///
/// After `MAX_FAILED_CHECKS` consecutive failed health checks the store is rebuilt through
/// `connect`.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn ProfileStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_profile_store(store.clone()).await;
                info!("profile store installed");
                delay = INITIAL_DELAY;
                supervise(&state, store.as_ref()).await;
                warn!("profile store kept failing health checks; reconnecting");
            }
            Err(err) => {
                warn!(error = %err, "profile store connection attempt failed");
                state.update_degraded(true);
            }
        }
        sleep(delay).await;
        delay = (delay * 2).min(MAX_DELAY);
    }
}

/// Poll `store` until it fails too many health checks in a row.
async fn supervise(state: &SharedState, store: &dyn ProfileStore) {
    let mut failures = 0;
    let mut retry_delay = INITIAL_DELAY;

    while failures < MAX_FAILED_CHECKS {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("profile store healthy; leaving degraded mode");
                    state.update_degraded(false);
                }
                failures = 0;
                retry_delay = INITIAL_DELAY;
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                if failures == 0 {
                    warn!(
                        error = %err,
                        "profile store health check failed; entering degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt = failures, error = %err, "profile store still unhealthy");
                }
                failures += 1;
                sleep(retry_delay).await;
                retry_delay = (retry_delay * 2).min(MAX_DELAY);
            }
        }
    }
}
