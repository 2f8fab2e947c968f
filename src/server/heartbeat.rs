// ABOUTME: Gateway-side heartbeat: probes idle sessions with ActiveTest and drops silent ones
// ABOUTME: Any inbound frame resets a session's missed count, not only ActiveTestResp

use super::GatewayContext;
use crate::datatypes::ActiveTest;
use crate::sequence::SequenceGenerator;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

/// Run until `shutdown` flips to true
pub(crate) async fn run(ctx: Arc<GatewayContext>, mut shutdown: watch::Receiver<bool>) {
    let gateway = &ctx.config.gateway;
    let mut ticker = interval(gateway.heartbeat_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => tick(&ctx).await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("heartbeat stopped");
}

async fn tick(ctx: &GatewayContext) {
    let (probe, expired) = ctx
        .sessions
        .heartbeat_tick(ctx.config.gateway.heartbeat_max_missed);

    for (handle, missed) in expired {
        warn!(peer = %handle.peer(), missed, "heartbeat timeout, closing session");
        handle.close().await;
    }

    for (handle, version) in probe {
        let probe = ActiveTest::new(ctx.sequences.frames.next_val());
        if !handle.send_pdu(&probe, version).await {
            debug!(peer = %handle.peer(), "heartbeat probe not queued");
        }
    }
}
