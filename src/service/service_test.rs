use std::io::Read;
use std::sync::Arc;

use socket2::Socket;

use super::*;
use crate::dispatcher::dispatch_downlink;
use crate::proto::{MsgType, SctplbMessage};
use crate::sctp::notification::{
    SCTP_ASSOC_CHANGE, SCTP_COMM_LOST, SCTP_COMM_UP, SCTP_SHUTDOWN_EVENT,
};

fn assoc(remote: &str) -> (Arc<SctpAssociation>, std::os::unix::net::UnixStream) {
    let (a, b) = std::os::unix::net::UnixStream::pair().unwrap();
    let assoc = SctpAssociation::from_socket(Socket::from(a), remote.to_string()).unwrap();
    (Arc::new(assoc), b)
}

async fn ctx_with_ran(
    gnb_id: &str,
) -> (
    Arc<LbContext>,
    Arc<SctpAssociation>,
    std::os::unix::net::UnixStream,
) {
    let ctx = Arc::new(LbContext::new("sctplb-0".to_string()));
    let (conn, peer_sock) = assoc("192.168.1.5:38412");
    {
        let mut state = ctx.lock().await;
        state.add_peer(
            conn.handle(),
            Peer {
                address: conn.remote_addr().to_string(),
                conn: conn.clone(),
            },
        );
        state.new_ran(&conn).set_ran_id(gnb_id);
    }
    (ctx, conn, peer_sock)
}

fn shutdown_event() -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&SCTP_SHUTDOWN_EVENT.to_ne_bytes());
    buf.extend_from_slice(&0u16.to_ne_bytes());
    buf.extend_from_slice(&8u32.to_ne_bytes());
    buf
}

fn assoc_change(state: u16) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&SCTP_ASSOC_CHANGE.to_ne_bytes());
    buf.extend_from_slice(&0u16.to_ne_bytes());
    buf.extend_from_slice(&20u32.to_ne_bytes());
    buf.extend_from_slice(&state.to_ne_bytes());
    buf.extend_from_slice(&0u16.to_ne_bytes());
    buf.extend_from_slice(&3u16.to_ne_bytes());
    buf.extend_from_slice(&5u16.to_ne_bytes());
    buf.extend_from_slice(&1i32.to_ne_bytes());
    buf
}

#[tokio::test]
async fn test_shutdown_event_removes_ran_and_later_downlink_is_dropped() {
    let (ctx, conn, mut peer_sock) = ctx_with_ran("gnb001").await;

    handle_notification(&ctx, &conn, &shutdown_event()).await;
    assert_eq!(ctx.lock().await.ran_len(), 0);

    // A downlink frame still naming the gNB now has nowhere to go.
    let frame = SctplbMessage {
        msgtype: MsgType::GnbMsg as i32,
        gnb_id: "gnb001".to_string(),
        msg: b"late-downlink".to_vec(),
        ..Default::default()
    };
    dispatch_downlink(&ctx, "10.0.0.1", frame).await;

    peer_sock.set_nonblocking(true).unwrap();
    let mut buf = [0u8; 16];
    let err = peer_sock.read(&mut buf).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
}

#[tokio::test]
async fn test_comm_lost_removes_ran() {
    let (ctx, conn, _peer_sock) = ctx_with_ran("gnb001").await;
    handle_notification(&ctx, &conn, &assoc_change(SCTP_COMM_LOST)).await;
    assert_eq!(ctx.lock().await.ran_len(), 0);
}

#[tokio::test]
async fn test_comm_up_keeps_ran() {
    let (ctx, conn, _peer_sock) = ctx_with_ran("gnb001").await;
    handle_notification(&ctx, &conn, &assoc_change(SCTP_COMM_UP)).await;
    assert_eq!(ctx.lock().await.ran_len(), 1);
}

#[tokio::test]
async fn test_malformed_notification_is_dropped_without_action() {
    let (ctx, conn, _peer_sock) = ctx_with_ran("gnb001").await;
    handle_notification(&ctx, &conn, &[0u8; 4]).await;
    assert_eq!(ctx.lock().await.ran_len(), 1);
}

#[tokio::test]
async fn test_ran_removal_purges_closed_associations() {
    let (ctx, conn, _peer_sock) = ctx_with_ran("gnb001").await;
    let (stale, _stale_sock) = assoc("192.168.1.6:38412");
    {
        let mut state = ctx.lock().await;
        state.new_ran(&stale);
    }
    stale.close().unwrap();

    handle_notification(&ctx, &conn, &assoc_change(SCTP_COMM_LOST)).await;
    assert_eq!(ctx.lock().await.ran_len(), 0);
}
