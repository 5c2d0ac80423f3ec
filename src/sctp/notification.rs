//! Explicit decoding of SCTP event notifications.
//!
//! The kernel delivers notifications in the read buffer with the
//! MSG_NOTIFICATION flag set. Every notification starts with the same
//! 8 byte header (type, flags, length); the ASSOC_CHANGE body is a
//! fixed 20 byte layout. Fields are host byte order. Lengths are
//! validated before any field is read; short or truncated input is an
//! error and the caller drops the packet.

use crate::error::{Error, Result};

// Notification type values from linux/sctp.h.
pub const SCTP_ASSOC_CHANGE: u16 = (1 << 15) | 0x0001;
pub const SCTP_PEER_ADDR_CHANGE: u16 = (1 << 15) | 0x0002;
pub const SCTP_SEND_FAILED: u16 = (1 << 15) | 0x0003;
pub const SCTP_REMOTE_ERROR: u16 = (1 << 15) | 0x0004;
pub const SCTP_SHUTDOWN_EVENT: u16 = (1 << 15) | 0x0005;

// sctp_assoc_change state values.
pub const SCTP_COMM_UP: u16 = 0;
pub const SCTP_COMM_LOST: u16 = 1;
pub const SCTP_RESTART: u16 = 2;
pub const SCTP_SHUTDOWN_COMP: u16 = 3;
pub const SCTP_CANT_STR_ASSOC: u16 = 4;

const HEADER_LEN: usize = 8;
const ASSOC_CHANGE_LEN: usize = 20;

/// The common notification header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub kind: u16,
    pub flags: u16,
    pub length: u32,
}

/// Decoded body of an SCTP_ASSOC_CHANGE notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssocChange {
    pub state: u16,
    pub error: u16,
    pub outbound_streams: u16,
    pub inbound_streams: u16,
    pub assoc_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    AssocChange(AssocChange),
    Shutdown,
    PeerAddrChange,
    RemoteError,
    SendFailed,
    Unknown(u16),
}

pub fn parse_header(buf: &[u8]) -> Result<Header> {
    if buf.len() < HEADER_LEN {
        return Err(Error::ErrNotificationTooShort { len: buf.len() });
    }
    let kind = u16::from_ne_bytes([buf[0], buf[1]]);
    let flags = u16::from_ne_bytes([buf[2], buf[3]]);
    let length = u32::from_ne_bytes([buf[4], buf[5], buf[6], buf[7]]);
    if length as usize > buf.len() {
        return Err(Error::ErrNotificationTruncated {
            declared: length as usize,
            len: buf.len(),
        });
    }
    Ok(Header {
        kind,
        flags,
        length,
    })
}

pub fn parse(buf: &[u8]) -> Result<Notification> {
    let header = parse_header(buf)?;
    match header.kind {
        SCTP_ASSOC_CHANGE => {
            if buf.len() < ASSOC_CHANGE_LEN {
                return Err(Error::ErrAssocChangeTooShort { len: buf.len() });
            }
            Ok(Notification::AssocChange(AssocChange {
                state: u16::from_ne_bytes([buf[8], buf[9]]),
                error: u16::from_ne_bytes([buf[10], buf[11]]),
                outbound_streams: u16::from_ne_bytes([buf[12], buf[13]]),
                inbound_streams: u16::from_ne_bytes([buf[14], buf[15]]),
                assoc_id: i32::from_ne_bytes([buf[16], buf[17], buf[18], buf[19]]),
            }))
        }
        SCTP_SHUTDOWN_EVENT => Ok(Notification::Shutdown),
        SCTP_PEER_ADDR_CHANGE => Ok(Notification::PeerAddrChange),
        SCTP_REMOTE_ERROR => Ok(Notification::RemoteError),
        SCTP_SEND_FAILED => Ok(Notification::SendFailed),
        other => Ok(Notification::Unknown(other)),
    }
}
