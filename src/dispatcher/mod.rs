//! Message routing between SCTP associations and the backend pool.
//!
//! The uplink path picks a ready backend by round-robin; the downlink
//! path demultiplexes AMF frames back onto the right gNB association.
//! Both hold the registry lock for the duration of one applied
//! message, so observers never see a partially-applied frame.


use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::context::LbContext;
use crate::proto::{MsgType, SctplbMessage};
use crate::sctp::SctpAssociation;

/// Uplink entry point: one NGAP datagram from one association, or an
/// empty buffer marking gNB disconnect.
pub async fn dispatch_uplink(ctx: &LbContext, conn: &Arc<SctpAssociation>, msg: &[u8]) {
    let mut state = ctx.lock().await;
    let handle = conn.handle();

    let peer_addr = match state.peer(handle) {
        Some(peer) => peer.address.clone(),
        None => {
            info!("message for unknown connection");
            return;
        }
    };

    if msg.is_empty() {
        // gNB went away: tell every ready backend, then drop the RAN.
        // The broadcast is deliberately blind to which backends ever
        // saw this gNB.
        info!(peer = %peer_addr, "send gNB connection close message to all AMF instances");
        if state.backend_len() > 0 {
            let ran = state.ran_by_conn(handle);
            for backend in state.backends() {
                if backend.state() {
                    if let Err(e) = backend.send(msg, true, ran) {
                        error!(address = %backend.address(), error = %e, "can not send");
                    }
                }
            }
        } else {
            error!("no AMF connections");
        }
        state.delete_ran(handle);
        return;
    }

    if state.ran_by_conn(handle).is_none() {
        state.new_ran(conn);
    }
    debug!(remote = %conn.remote_addr(), "message received from remote");

    if state.backend_len() == 0 {
        error!("no backend available");
        return;
    }

    // At most pool-length probes through the cursor; the first ready
    // backend wins, otherwise the message is dropped.
    let probes = state.backend_len();
    for _ in 0..probes {
        let Some(idx) = state.round_robin() else {
            break;
        };
        let backend = &state.backends()[idx];
        if backend.state() {
            let ran = state.ran_by_conn(handle);
            if let Err(e) = backend.send(msg, false, ran) {
                error!(address = %backend.address(), error = %e, "can not send");
            }
            break;
        }
    }
}

/// Routes one frame received from the backend at `from_address`.
pub async fn dispatch_downlink(ctx: &LbContext, from_address: &str, frame: SctplbMessage) {
    match MsgType::try_from(frame.msgtype) {
        Ok(MsgType::InitMsg) => {
            info!(
                backend = %from_address,
                amf_id = %frame.amf_id,
                verbose = %frame.verbose_msg,
                "init response from server"
            );
        }
        Ok(MsgType::RedirectMsg) => redirect(ctx, from_address, frame).await,
        _ => downlink_to_ran(ctx, from_address, frame).await,
    }
}

/// Re-emits a redirected payload on the backend the AMF named, when
/// that backend is pooled and ready.
async fn redirect(ctx: &LbContext, from_address: &str, frame: SctplbMessage) {
    let state = ctx.lock().await;
    let Some(backend) = state
        .backends()
        .iter()
        .find(|b| b.address() == frame.redirect_id)
    else {
        warn!(
            backend = %from_address,
            redirect_id = %frame.redirect_id,
            "dropping redirected message as backend ip does not exist"
        );
        return;
    };
    if !backend.state() {
        warn!(
            redirect_id = %frame.redirect_id,
            "backend is not in READY state, not forwarding redirected msg"
        );
        return;
    }
    let forward = SctplbMessage {
        msgtype: MsgType::GnbMsg as i32,
        verbose_msg: "Hello From gNB Message !".to_string(),
        sctplb_id: ctx.lb_id.clone(),
        gnb_id: frame.gnb_id,
        msg: frame.msg,
        ..Default::default()
    };
    match backend.send_raw(forward) {
        Ok(()) => debug!(redirect_id = %frame.redirect_id, "forwarded msg to correct AMF"),
        Err(e) => error!(redirect_id = %frame.redirect_id, error = %e, "can not send"),
    }
}

/// Delivers a downlink payload to its gNB. NGSetup responses arrive
/// keyed by gNB address and carry the freshly assigned identifier,
/// which is learned into the RAN record here; later frames resolve by
/// identifier alone.
async fn downlink_to_ran(ctx: &LbContext, from_address: &str, frame: SctplbMessage) {
    let mut state = ctx.lock().await;

    let ran = if frame.gnb_id.is_empty() {
        warn!(backend = %from_address, "received null GnbId from backend NF");
        None
    } else if !frame.gnb_ip_addr.is_empty() {
        match state.ran_by_gnb_ip_mut(&frame.gnb_ip_addr) {
            Some(ran) => {
                ran.set_ran_id(&frame.gnb_id);
                info!(
                    gnb_id = %frame.gnb_id,
                    gnb_ip = %frame.gnb_ip_addr,
                    "received GnbId for GnbIpAddress from NF"
                );
                Some(ran)
            }
            None => None,
        }
    } else {
        state.ran_by_gnb_id_mut(&frame.gnb_id)
    };

    let Some(ran) = ran else {
        warn!(gnb_id = %frame.gnb_id, "couldn't fetch sctp connection with GnbId");
        return;
    };
    if let Err(e) = ran.conn.write(&frame.msg).await {
        // The gNB's own NGAP layer retries; the association stays up.
        error!(parent: &ran.log, error = %e, "write to RAN failed");
    }
}
