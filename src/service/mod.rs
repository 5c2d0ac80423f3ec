//! SCTP front-end.
//!
//! Accepts NGAP associations, applies the per-association socket
//! configuration, runs one sequential read loop per association and
//! surfaces SCTP lifecycle notifications as RAN registry actions. On
//! shutdown the listener closes, every association is closed and the
//! connection handlers are drained before returning.

#[cfg(test)]
mod service_test;

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};
use waitgroup::{WaitGroup, Worker};

use crate::context::{LbContext, Peer};
use crate::dispatcher;
use crate::error::{Error, Result};
use crate::sctp::notification::{self, Notification};
use crate::sctp::{EventSubscribe, InitMsg, ReadEvent, SctpAssociation, SctpListener};
use crate::{NGAP_PPID, READ_BUF_SIZE, READ_TIMEOUT};

/// Resolves the configured bind addresses, binds the NGAP listener
/// and serves until the shutdown signal fires.
pub async fn run(ctx: Arc<LbContext>, addresses: Vec<String>, port: u16) -> Result<()> {
    let mut bind_addrs: Vec<SocketAddrV4> = Vec::new();
    for addr in &addresses {
        match tokio::net::lookup_host((addr.as_str(), port)).await {
            Ok(resolved) => {
                let before = bind_addrs.len();
                for sa in resolved {
                    if let SocketAddr::V4(v4) = sa {
                        bind_addrs.push(v4);
                    }
                }
                if bind_addrs.len() == before {
                    warn!(%addr, "no IPv4 address for listen address");
                } else {
                    debug!(%addr, "resolved listen address");
                }
            }
            Err(e) => error!(%addr, error = %e, "error resolving address"),
        }
    }
    if addresses.is_empty() {
        // No configured addresses means the wildcard address.
        bind_addrs.push(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    }

    let listener = SctpListener::bind(&bind_addrs, InitMsg::default())?;
    info!(addr = %listener.local_addr()?, "listen on");
    serve(ctx, listener).await;
    Ok(())
}

async fn serve(ctx: Arc<LbContext>, listener: SctpListener) {
    let wg = WaitGroup::new();
    loop {
        tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let conn = match accepted {
                    Ok(conn) => Arc::new(conn),
                    Err(Error::Io(e)) if e.kind() == io::ErrorKind::Interrupted => {
                        debug!(error = %e, "accept");
                        continue;
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept");
                        continue;
                    }
                };
                if let Err(e) = configure(&conn) {
                    error!(remote = %conn.remote_addr(), error = %e, "accept failed");
                    let _ = conn.close();
                    continue;
                }
                info!(remote = %conn.remote_addr(), "SCTP accept");
                {
                    let mut state = ctx.lock().await;
                    state.add_peer(
                        conn.handle(),
                        Peer {
                            address: conn.remote_addr().to_string(),
                            conn: conn.clone(),
                        },
                    );
                }
                tokio::spawn(handle_connection(ctx.clone(), conn, wg.worker()));
            }
        }
    }

    // Close the listener first, then every association so blocked
    // reads observe EOF, then drain the handlers.
    drop(listener);
    let conns = { ctx.lock().await.associations() };
    for conn in conns {
        let _ = conn.close();
    }
    wg.wait().await;
    info!("sctp service stopped");
}

/// Accept-time socket configuration. Any failure abandons the
/// association while accept continues.
fn configure(conn: &SctpAssociation) -> Result<()> {
    conn.set_default_send_ppid(NGAP_PPID)?;
    debug!("set default sent param PPID 60");
    conn.subscribe_events(EventSubscribe {
        data_io: 1,
        association: 1,
        shutdown: 1,
        ..Default::default()
    })?;
    debug!("subscribe SCTP event[DATA_IO, SHUTDOWN_EVENT, ASSOCIATION_CHANGE]");
    conn.set_read_buffer(READ_BUF_SIZE)?;
    debug!(bytes = READ_BUF_SIZE, "set read buffer");
    Ok(())
}

async fn handle_connection(ctx: Arc<LbContext>, conn: Arc<SctpAssociation>, worker: Worker) {
    read_loop(&ctx, &conn).await;
    // Loop exit means the peer is gone or we are shutting down:
    // deliver the empty close marker, then drop the bookkeeping.
    info!(remote = %conn.remote_addr(), "closing gnb connection");
    dispatcher::dispatch_uplink(&ctx, &conn, &[]).await;
    if let Err(e) = conn.close() {
        debug!(remote = %conn.remote_addr(), error = %e, "close connection");
    }
    ctx.lock().await.remove_peer(conn.handle());
    drop(worker);
}

async fn read_loop(ctx: &LbContext, conn: &Arc<SctpAssociation>) {
    let mut buf = vec![0u8; READ_BUF_SIZE];
    loop {
        let event = tokio::select! {
            biased;
            _ = ctx.shutdown.cancelled() => return,
            res = timeout(READ_TIMEOUT, conn.read(&mut buf)) => match res {
                Err(_elapsed) => {
                    debug!("SCTP read timeout");
                    continue;
                }
                Ok(Ok(event)) => event,
                Ok(Err(Error::Io(e))) => match e.kind() {
                    io::ErrorKind::Interrupted => {
                        debug!(error = %e, "sctp read interrupted");
                        continue;
                    }
                    io::ErrorKind::UnexpectedEof => {
                        debug!("read EOF from client");
                        return;
                    }
                    io::ErrorKind::ConnectionReset | io::ErrorKind::NotConnected => {
                        debug!(error = %e, "connection gone");
                        return;
                    }
                    _ => {
                        error!(remote = %conn.remote_addr(), error = %e, "handle connection error");
                        return;
                    }
                },
                Ok(Err(e)) => {
                    error!(remote = %conn.remote_addr(), error = %e, "handle connection error");
                    return;
                }
            },
        };

        match event {
            ReadEvent::Notification { len } => {
                handle_notification(ctx, conn, &buf[..len]).await;
            }
            ReadEvent::Data { len, ppid } => {
                if ppid != NGAP_PPID {
                    warn!("received SCTP PPID != 60, discard this packet");
                    continue;
                }
                trace!(len, payload = %hex::encode(&buf[..len]), "packet content");
                dispatcher::dispatch_uplink(ctx, conn, &buf[..len]).await;
            }
        }
    }
}

/// Maps one SCTP notification onto RAN lifecycle actions. Undecodable
/// notifications are dropped without action; the association stays up.
pub(crate) async fn handle_notification(ctx: &LbContext, conn: &Arc<SctpAssociation>, buf: &[u8]) {
    let remote = conn.remote_addr();
    let parsed = match notification::parse(buf) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(%remote, error = %e, "discarding SCTP notification");
            return;
        }
    };
    match parsed {
        Notification::AssocChange(change) => match change.state {
            notification::SCTP_COMM_LOST => {
                warn!(%remote, "SCTP communication lost");
                remove_ran(ctx, conn).await;
            }
            notification::SCTP_SHUTDOWN_COMP => {
                info!(%remote, "SCTP shutdown complete");
                remove_ran(ctx, conn).await;
            }
            notification::SCTP_COMM_UP => debug!(
                %remote,
                outbound = change.outbound_streams,
                inbound = change.inbound_streams,
                "SCTP communication up"
            ),
            notification::SCTP_RESTART => info!(%remote, "SCTP association restart"),
            other => debug!(%remote, state = other, "association change"),
        },
        Notification::Shutdown => {
            info!(%remote, "SCTP shutdown event");
            remove_ran(ctx, conn).await;
        }
        Notification::PeerAddrChange => debug!(%remote, "peer address change"),
        Notification::RemoteError => warn!(%remote, "remote operation error"),
        Notification::SendFailed => warn!(%remote, "send failed event"),
        Notification::Unknown(kind) => debug!(%remote, kind, "unhandled notification type"),
    }
}

async fn remove_ran(ctx: &LbContext, conn: &Arc<SctpAssociation>) {
    let mut state = ctx.lock().await;
    if let Some(ran) = state.delete_ran(conn.handle()) {
        info!(parent: &ran.log, ran_id = %ran.ran_id_display(), "remove RAN context");
    }
    let purged = state.purge_closed_rans();
    if purged > 0 {
        debug!(purged, "purged RAN records with closed associations");
    }
}
