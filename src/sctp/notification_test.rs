use super::notification::*;
use crate::error::Error;

fn header_bytes(kind: u16, length: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&kind.to_ne_bytes());
    buf.extend_from_slice(&0u16.to_ne_bytes());
    buf.extend_from_slice(&length.to_ne_bytes());
    buf
}

fn assoc_change_bytes(state: u16) -> Vec<u8> {
    let mut buf = header_bytes(SCTP_ASSOC_CHANGE, 20);
    buf.extend_from_slice(&state.to_ne_bytes());
    buf.extend_from_slice(&0u16.to_ne_bytes()); // error
    buf.extend_from_slice(&3u16.to_ne_bytes()); // outbound streams
    buf.extend_from_slice(&5u16.to_ne_bytes()); // inbound streams
    buf.extend_from_slice(&7i32.to_ne_bytes()); // assoc id
    buf
}

#[test]
fn test_parse_assoc_change() {
    let buf = assoc_change_bytes(SCTP_COMM_LOST);
    let parsed = parse(&buf).unwrap();
    assert_eq!(
        parsed,
        Notification::AssocChange(AssocChange {
            state: SCTP_COMM_LOST,
            error: 0,
            outbound_streams: 3,
            inbound_streams: 5,
            assoc_id: 7,
        })
    );
}

#[test]
fn test_parse_shutdown_event() {
    let buf = header_bytes(SCTP_SHUTDOWN_EVENT, 8);
    assert_eq!(parse(&buf).unwrap(), Notification::Shutdown);
}

#[test]
fn test_parse_log_only_kinds() {
    let cases = [
        (SCTP_PEER_ADDR_CHANGE, Notification::PeerAddrChange),
        (SCTP_REMOTE_ERROR, Notification::RemoteError),
        (SCTP_SEND_FAILED, Notification::SendFailed),
    ];
    for (kind, want) in cases {
        let buf = header_bytes(kind, 8);
        assert_eq!(parse(&buf).unwrap(), want);
    }
}

#[test]
fn test_parse_unknown_kind() {
    let kind = (1 << 15) | 0x00ff;
    let buf = header_bytes(kind, 8);
    assert_eq!(parse(&buf).unwrap(), Notification::Unknown(kind));
}

#[test]
fn test_header_shorter_than_eight_bytes() {
    let buf = [0u8; 7];
    assert!(matches!(
        parse(&buf),
        Err(Error::ErrNotificationTooShort { len: 7 })
    ));
}

#[test]
fn test_declared_length_beyond_buffer() {
    // Header says 64 bytes but only the header arrived.
    let buf = header_bytes(SCTP_ASSOC_CHANGE, 64);
    assert!(matches!(
        parse(&buf),
        Err(Error::ErrNotificationTruncated {
            declared: 64,
            len: 8
        })
    ));
}

#[test]
fn test_assoc_change_shorter_than_twenty_bytes() {
    let mut buf = header_bytes(SCTP_ASSOC_CHANGE, 12);
    buf.extend_from_slice(&0u32.to_ne_bytes());
    assert!(matches!(
        parse(&buf),
        Err(Error::ErrAssocChangeTooShort { len: 12 })
    ));
}
