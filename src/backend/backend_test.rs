use std::sync::Arc;

use socket2::Socket;

use super::*;
use crate::context::State;
use crate::sctp::SctpAssociation;

fn test_backend(address: &str) -> (GrpcBackend, mpsc::UnboundedReceiver<SctplbMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut backend = GrpcBackend::new(address.to_string(), "sctplb-0".to_string());
    backend.stream = Some(tx);
    backend.state = true;
    (backend, rx)
}

fn assoc(remote: &str) -> (Arc<SctpAssociation>, std::os::unix::net::UnixStream) {
    let (a, b) = std::os::unix::net::UnixStream::pair().unwrap();
    let assoc = SctpAssociation::from_socket(Socket::from(a), remote.to_string()).unwrap();
    (Arc::new(assoc), b)
}

#[tokio::test]
async fn test_send_prefers_gnb_id() {
    let mut state = State::default();
    let (conn, _peer) = assoc("192.168.1.5:38412");
    let ran = state.new_ran(&conn);
    ran.set_ran_id("gnb001");

    let (backend, mut rx) = test_backend("10.0.0.1");
    let backend = Backend::Grpc(backend);
    backend.send(b"payload", false, Some(ran)).unwrap();

    let frame = rx.try_recv().unwrap();
    assert_eq!(frame.msgtype, MsgType::GnbMsg as i32);
    assert_eq!(frame.gnb_id, "gnb001");
    assert!(frame.gnb_ip_addr.is_empty());
    assert_eq!(frame.verbose_msg, "Hello From gNB Message !");
}

#[tokio::test]
async fn test_send_falls_back_to_gnb_address() {
    let mut state = State::default();
    let (conn, _peer) = assoc("192.168.1.5:38412");
    let ran = state.new_ran(&conn);

    let (backend, mut rx) = test_backend("10.0.0.1");
    let backend = Backend::Grpc(backend);
    backend.send(b"payload", false, Some(ran)).unwrap();

    let frame = rx.try_recv().unwrap();
    assert!(frame.gnb_id.is_empty());
    assert_eq!(frame.gnb_ip_addr, "192.168.1.5:38412");
}

#[tokio::test]
async fn test_disconnect_frame_never_carries_the_address() {
    let mut state = State::default();
    let (conn, _peer) = assoc("192.168.1.5:38412");
    let ran = state.new_ran(&conn);

    let (backend, mut rx) = test_backend("10.0.0.1");
    let backend = Backend::Grpc(backend);
    backend.send(&[], true, Some(ran)).unwrap();

    let frame = rx.try_recv().unwrap();
    assert_eq!(frame.msgtype, MsgType::GnbDisc as i32);
    assert!(frame.gnb_id.is_empty());
    assert!(frame.gnb_ip_addr.is_empty());
    assert_eq!(frame.verbose_msg, "Bye From gNB Message !");
}

#[tokio::test]
async fn test_send_without_stream_fails() {
    let backend = Backend::Grpc(GrpcBackend::new(
        "10.0.0.1".to_string(),
        "sctplb-0".to_string(),
    ));
    assert!(matches!(
        backend.send(b"payload", false, None),
        Err(Error::ErrStreamNotOpen)
    ));
}

#[tokio::test]
async fn test_send_after_stream_closed_fails() {
    let (backend, rx) = test_backend("10.0.0.1");
    drop(rx);
    let backend = Backend::Grpc(backend);
    assert!(matches!(
        backend.send(b"payload", false, None),
        Err(Error::ErrStreamClosed)
    ));
}
