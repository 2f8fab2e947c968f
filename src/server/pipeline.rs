// ABOUTME: Simulated upstream handling of admitted messages: SubmitResp, status report, MO acknowledgement
// ABOUTME: Runs on the worker pool; every reply goes back through the session's ConnectionHandle

use super::GatewayContext;
use super::session::{ConnectionHandle, JobGuard};
use crate::datatypes::{Deliver, DeliverResult, ProtocolVersion, Submit, SubmitResult};
use crate::sequence::{MessageIdGenerator, SequenceGenerator};
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{debug, info};

/// Answer one admitted Submit and, when asked for, schedule its status report.
///
/// `permit` holds the submission's slot in the receive window until the
/// outcome is decided. `_job` keeps the connection from being terminated
/// before the response is queued.
pub(crate) async fn process_submit(
    ctx: Arc<GatewayContext>,
    handle: ConnectionHandle,
    submit: Submit,
    permit: OwnedSemaphorePermit,
    version: ProtocolVersion,
    _job: JobGuard,
) {
    let submitted_at = Local::now();
    let processing = ctx.simulator.processing_delay();
    tokio::time::sleep(processing).await;

    let success = ctx.simulator.roll_success();
    let (msg_id, result) = if success {
        (ctx.sequences.msg_ids.next_id(), SubmitResult::Ok)
    } else {
        (0, SubmitResult::InvalidDestTerminalId)
    };

    drop(permit);

    let response = submit.to_response(result, msg_id, version);
    let queued = handle.respond(response, version).await;

    debug!(
        peer = %handle.peer(),
        sequence_id = submit.header.sequence_id,
        msg_id,
        ?result,
        "submit answered"
    );

    if queued && success && submit.registered_delivery == 1 {
        let report_job = handle.begin_job();
        let job = deliver_report(
            ctx.clone(),
            handle,
            submit,
            msg_id,
            submitted_at,
            processing,
            version,
            report_job,
        );
        ctx.pool.spawn("status-report", job);
    }
}

#[allow(clippy::too_many_arguments)]
async fn deliver_report(
    ctx: Arc<GatewayContext>,
    handle: ConnectionHandle,
    submit: Submit,
    msg_id: u64,
    submitted_at: DateTime<Local>,
    processing: Duration,
    version: ProtocolVersion,
    _job: JobGuard,
) {
    if ctx.simulator.skip_report() {
        debug!(msg_id, "status report skipped");
        return;
    }

    // Counted from the moment the response was queued
    tokio::time::sleep(ctx.simulator.report_delay(processing)).await;

    let stat = ctx.simulator.report_stat();
    let report = submit.to_report(
        ctx.sequences.frames.next_val(),
        msg_id,
        stat.clone(),
        ctx.sequences.reports.next_val(),
        submitted_at,
        version,
    );

    if handle.send_pdu(&report, version).await {
        info!(peer = %handle.peer(), msg_id, stat = stat.as_str(), "status report sent");
    } else {
        debug!(peer = %handle.peer(), msg_id, "status report dropped, connection gone");
    }
}

/// Acknowledge an MO Deliver from the SP side after the simulated delay
pub(crate) async fn process_mo(
    ctx: Arc<GatewayContext>,
    handle: ConnectionHandle,
    deliver: Deliver,
    version: ProtocolVersion,
    _job: JobGuard,
) {
    tokio::time::sleep(ctx.simulator.processing_delay()).await;

    let result = if ctx.simulator.roll_success() {
        DeliverResult::Ok
    } else {
        DeliverResult::UnknownError
    };
    handle.respond(deliver.to_response(result, version), version).await;
}
