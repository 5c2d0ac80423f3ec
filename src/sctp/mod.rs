//! Kernel SCTP sockets for the NGAP front-end.
//!
//! One-to-one (SOCK_STREAM style) sockets over `IPPROTO_SCTP`, driven
//! nonblocking through tokio's `AsyncFd`. Only the surface the
//! front-end needs is wrapped: multi-homed listening via bindx, the
//! INITMSG / event-subscription / default-send-parameter options, and
//! a receive call that tells user data apart from notifications and
//! reports the PPID each datagram carried.

pub mod notification;

#[cfg(test)]
mod notification_test;
#[cfg(test)]
mod sctp_test;

use std::io;
use std::mem;
use std::net::{SocketAddr, SocketAddrV4};
use std::os::fd::{AsRawFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use crate::error::{Error, Result};

pub(crate) const SOL_SCTP: libc::c_int = 132;

// Socket option numbers from linux/sctp.h.
pub(crate) const SCTP_INITMSG: libc::c_int = 2;
pub(crate) const SCTP_DEFAULT_SEND_PARAM: libc::c_int = 10;
pub(crate) const SCTP_EVENTS: libc::c_int = 11;
pub(crate) const SCTP_SOCKOPT_BINDX_ADD: libc::c_int = 100;

// Ancillary data type carrying sctp_sndrcvinfo on received datagrams.
pub(crate) const SCTP_SNDRCV: libc::c_int = 1;

// recvmsg flag marking a notification instead of user data.
pub(crate) const MSG_NOTIFICATION: libc::c_int = 0x8000;

/// INIT parameters applied to the listening socket
/// (struct sctp_initmsg).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct InitMsg {
    pub num_ostreams: u16,
    pub max_instreams: u16,
    pub max_attempts: u16,
    pub max_init_timeout: u16,
}

impl Default for InitMsg {
    fn default() -> Self {
        InitMsg {
            num_ostreams: 3,
            max_instreams: 5,
            max_attempts: 2,
            max_init_timeout: 2,
        }
    }
}

/// Per-message send/receive parameters (struct sctp_sndrcvinfo).
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct SndRcvInfo {
    pub stream: u16,
    pub ssn: u16,
    pub flags: u16,
    /// Passed through to the wire untouched by the kernel, so held in
    /// network byte order here.
    pub ppid: u32,
    pub context: u32,
    pub timetolive: u32,
    pub tsn: u32,
    pub cumtsn: u32,
    pub assoc_id: i32,
}

/// Event subscription mask (struct sctp_event_subscribe); each field
/// is a 0/1 flag.
#[derive(Debug, Default, Clone, Copy)]
#[repr(C)]
pub struct EventSubscribe {
    pub data_io: u8,
    pub association: u8,
    pub address: u8,
    pub send_failure: u8,
    pub peer_error: u8,
    pub shutdown: u8,
    pub partial_delivery: u8,
    pub adaptation_layer: u8,
    pub authentication: u8,
    pub sender_dry: u8,
    pub stream_reset: u8,
}

/// One completed read: user data tagged with the PPID it carried, or
/// a notification blob for [`notification::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    Data { len: usize, ppid: u32 },
    Notification { len: usize },
}

/// Listening NGAP socket, possibly bound to several local addresses.
#[derive(Debug)]
pub struct SctpListener {
    io: AsyncFd<Socket>,
}

impl SctpListener {
    /// Binds a one-to-one SCTP socket on `addrs` (the first address is
    /// bound directly, the rest are added with bindx), applies the
    /// INIT parameters and starts listening.
    pub fn bind(addrs: &[SocketAddrV4], init: InitMsg) -> Result<SctpListener> {
        let first = addrs.first().ok_or(Error::ErrNoListenAddress)?;
        let socket = Socket::new(
            Domain::IPV4,
            Type::STREAM,
            Some(Protocol::from(libc::IPPROTO_SCTP)),
        )?;
        setsockopt(&socket, SCTP_INITMSG, &init)?;
        socket.bind(&SockAddr::from(*first))?;
        for addr in &addrs[1..] {
            bindx_add(&socket, *addr)?;
        }
        socket.listen(128)?;
        socket.set_nonblocking(true)?;
        Ok(SctpListener {
            io: AsyncFd::with_interest(socket, Interest::READABLE)?,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        let addr = self.io.get_ref().local_addr()?;
        addr.as_socket().ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "listener bound to a non-ip address",
            ))
        })
    }

    /// Accepts the next association.
    pub async fn accept(&self) -> Result<SctpAssociation> {
        loop {
            let mut guard = self.io.readable().await?;
            match guard.try_io(|inner| inner.get_ref().accept()) {
                Ok(res) => {
                    let (socket, peer) = res?;
                    return SctpAssociation::new(socket, peer);
                }
                Err(_would_block) => continue,
            }
        }
    }
}

/// One accepted gNB association.
#[derive(Debug)]
pub struct SctpAssociation {
    io: AsyncFd<Socket>,
    remote: String,
    closed: AtomicBool,
}

impl SctpAssociation {
    fn new(socket: Socket, peer: SockAddr) -> Result<SctpAssociation> {
        let remote = match peer.as_socket() {
            Some(sa) => sa.to_string(),
            None => String::from("unknown"),
        };
        SctpAssociation::from_socket(socket, remote)
    }

    /// Wraps an already connected socket. Also the seam tests use to
    /// stand a Unix socket pair in for a live association.
    pub fn from_socket(socket: Socket, remote: String) -> Result<SctpAssociation> {
        socket.set_nonblocking(true)?;
        Ok(SctpAssociation {
            io: AsyncFd::new(socket)?,
            remote,
            closed: AtomicBool::new(false),
        })
    }

    /// Raw fd of the association, the registry's primary key.
    pub fn handle(&self) -> RawFd {
        self.io.get_ref().as_raw_fd()
    }

    pub fn remote_addr(&self) -> &str {
        &self.remote
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reads one datagram or notification into `buf`.
    pub async fn read(&self, buf: &mut [u8]) -> Result<ReadEvent> {
        loop {
            let mut guard = self.io.readable().await?;
            match guard.try_io(|inner| recv_event(inner.get_ref(), buf)) {
                Ok(res) => return Ok(res?),
                Err(_would_block) => continue,
            }
        }
    }

    /// Writes one datagram. The outbound PPID comes from the default
    /// send parameters stamped at accept time.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        loop {
            let mut guard = self.io.writable().await?;
            match guard.try_io(|inner| inner.get_ref().send(buf)) {
                Ok(res) => return Ok(res?),
                Err(_would_block) => continue,
            }
        }
    }

    /// Shuts the association down; blocked reads observe EOF.
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.io.get_ref().shutdown(std::net::Shutdown::Both)?;
        Ok(())
    }

    /// Stamps `ppid` into the default send parameters so every
    /// outbound datagram is tagged without per-write ancillary data.
    pub fn set_default_send_ppid(&self, ppid: u32) -> Result<()> {
        let mut info: SndRcvInfo = getsockopt(self.io.get_ref(), SCTP_DEFAULT_SEND_PARAM)?;
        info.ppid = ppid.to_be();
        setsockopt(self.io.get_ref(), SCTP_DEFAULT_SEND_PARAM, &info)
    }

    pub fn subscribe_events(&self, events: EventSubscribe) -> Result<()> {
        setsockopt(self.io.get_ref(), SCTP_EVENTS, &events)
    }

    pub fn set_read_buffer(&self, bytes: usize) -> Result<()> {
        self.io.get_ref().set_recv_buffer_size(bytes)?;
        Ok(())
    }
}

fn setsockopt<T>(socket: &Socket, opt: libc::c_int, value: &T) -> Result<()> {
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            SOL_SCTP,
            opt,
            value as *const T as *const libc::c_void,
            mem::size_of::<T>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

fn getsockopt<T: Default>(socket: &Socket, opt: libc::c_int) -> Result<T> {
    let mut value = T::default();
    let mut len = mem::size_of::<T>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            socket.as_raw_fd(),
            SOL_SCTP,
            opt,
            &mut value as *mut T as *mut libc::c_void,
            &mut len,
        )
    };
    if rc < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(value)
}

fn bindx_add(socket: &Socket, addr: SocketAddrV4) -> Result<()> {
    let raw = libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: addr.port().to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from_ne_bytes(addr.ip().octets()),
        },
        sin_zero: [0; 8],
    };
    let rc = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            SOL_SCTP,
            SCTP_SOCKOPT_BINDX_ADD,
            &raw as *const libc::sockaddr_in as *const libc::c_void,
            mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if rc < 0 {
        return Err(Error::Io(io::Error::last_os_error()));
    }
    Ok(())
}

// Ancillary buffer for one sctp_sndrcvinfo cmsg, kept cmsghdr-aligned.
#[repr(align(8))]
struct CmsgSpace([u8; 128]);

fn recv_event(socket: &Socket, buf: &mut [u8]) -> io::Result<ReadEvent> {
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };
    let mut control = CmsgSpace([0u8; 128]);
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.0.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = control.0.len() as _;

    let n = unsafe { libc::recvmsg(socket.as_raw_fd(), &mut msg, 0) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    if n == 0 {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
    }
    if msg.msg_flags & MSG_NOTIFICATION != 0 {
        return Ok(ReadEvent::Notification { len: n as usize });
    }

    let mut ppid = 0u32;
    unsafe {
        let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
        while !cmsg.is_null() {
            if (*cmsg).cmsg_level == SOL_SCTP && (*cmsg).cmsg_type == SCTP_SNDRCV {
                let mut info = SndRcvInfo::default();
                std::ptr::copy_nonoverlapping(
                    libc::CMSG_DATA(cmsg),
                    &mut info as *mut SndRcvInfo as *mut u8,
                    mem::size_of::<SndRcvInfo>(),
                );
                ppid = u32::from_be(info.ppid);
            }
            cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
        }
    }
    Ok(ReadEvent::Data {
        len: n as usize,
        ppid,
    })
}
