//! Periodic subscription status checks.
//!
//! A background task that re-runs the reconciler on a fixed interval while
//! the same user stays signed in. It holds only a weak reference to the
//! controller, so dropping every controller handle ends it too.
//!
//! The task stops itself when:
//! - the controller is gone
//! - the user signed out or another user signed in
//!
//! A failed check is logged and the next tick tries again.

use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::api::HttpTransport;
use crate::controller::{PushController, Shared};
use crate::platform::PushPlatform;

pub(crate) fn spawn<P: PushPlatform, T: HttpTransport>(
    shared: Weak<Shared<P, T>>,
    generation: u64,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(status_checker(shared, generation, period))
}

#[profiling::function]
async fn status_checker<P: PushPlatform, T: HttpTransport>(
    shared: Weak<Shared<P, T>>,
    generation: u64,
    period: Duration,
) {
    info!("push status checker started, every {}s", period.as_secs());

    // the first tick fires one period from now, not immediately
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut checks: u64 = 0;

    loop {
        ticker.tick().await;

        let Some(shared) = shared.upgrade() else {
            debug!("push controller dropped");
            break;
        };
        let Some(session) = shared.session_for(generation) else {
            info!("user signed out, stopping push status checks");
            break;
        };

        checks += 1;
        let controller = PushController::from_shared(shared);
        match controller.reconcile_for(&session, generation).await {
            Ok(()) => debug!("push status check #{checks} done"),
            Err(err) => warn!("push status check #{checks} failed: {err}"),
        }
    }

    info!("push status checker stopped after {checks} checks");
}
