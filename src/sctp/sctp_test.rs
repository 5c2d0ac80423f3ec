use std::io::{Read, Write};
use std::time::Duration;

use socket2::Socket;

use super::*;
use crate::error::Error;

// A Unix socket pair stands in for a live association; recvmsg and
// send behave the same way minus SCTP ancillary data.
fn pair(remote: &str) -> (SctpAssociation, std::os::unix::net::UnixStream) {
    let (a, b) = std::os::unix::net::UnixStream::pair().unwrap();
    let assoc = SctpAssociation::from_socket(Socket::from(a), remote.to_string()).unwrap();
    (assoc, b)
}

#[tokio::test]
async fn test_read_returns_data_event() {
    let (assoc, mut peer) = pair("192.168.1.5:38412");
    peer.write_all(&[0x00, 0x15, 0x00, 0x2e]).unwrap();

    let mut buf = vec![0u8; 64];
    let event = assoc.read(&mut buf).await.unwrap();
    match event {
        ReadEvent::Data { len, .. } => {
            assert_eq!(&buf[..len], &[0x00, 0x15, 0x00, 0x2e]);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_write_reaches_peer() {
    let (assoc, mut peer) = pair("192.168.1.5:38412");
    peer.set_read_timeout(Some(Duration::from_secs(1))).unwrap();

    let n = assoc.write(b"ngap-bytes").await.unwrap();
    assert_eq!(n, 10);

    let mut buf = [0u8; 16];
    let read = peer.read(&mut buf).unwrap();
    assert_eq!(&buf[..read], b"ngap-bytes");
}

#[tokio::test]
async fn test_read_after_peer_hangup_is_eof() {
    let (assoc, peer) = pair("192.168.1.5:38412");
    drop(peer);

    let mut buf = vec![0u8; 16];
    match assoc.read(&mut buf).await {
        Err(Error::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn test_close_marks_association() {
    let (assoc, _peer) = pair("192.168.1.5:38412");
    assert!(!assoc.is_closed());
    assoc.close().unwrap();
    assert!(assoc.is_closed());
}
