//! AMF backend pool members and their connection lifecycle.
//!
//! Each discovered AMF gets one connector task that walks the backend
//! through its states: dial, open the message stream, announce the
//! already-known RANs (INIT fan-out), then run a read pump and a
//! transport watch until something fails and the backend leaves the
//! pool. Readiness gates uplink dispatch the whole way.

pub mod discovery;

#[cfg(test)]
mod backend_test;

use std::sync::Arc;
use std::time::Duration;

use http::Request;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tonic::body::BoxBody;
use tonic::transport::{Channel, Endpoint};
use tonic::Streaming;
use tower::ServiceExt;
use tracing::{debug, error, info, warn};

use crate::context::{LbContext, Ran};
use crate::dispatcher;
use crate::error::{Error, Result};
use crate::proto::{MsgType, NgapServiceClient, SctplbMessage};

/// Interval between transport readiness probes while a backend runs.
const STATE_WATCH_INTERVAL: Duration = Duration::from_secs(2);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(2);
const KEEP_ALIVE_TIMEOUT: Duration = Duration::from_secs(2);

/// A pool member, tagged by transport family so new kinds can be
/// added without virtual dispatch. `grpc` is the only family this
/// revision supports.
pub enum Backend {
    Grpc(GrpcBackend),
}

impl Backend {
    pub fn address(&self) -> &str {
        match self {
            Backend::Grpc(b) => &b.address,
        }
    }

    /// Readiness flag; uplink dispatch only touches backends
    /// reporting true.
    pub fn state(&self) -> bool {
        match self {
            Backend::Grpc(b) => b.state,
        }
    }

    /// Builds and sends one uplink frame: GNB_DISC when `disconnect`
    /// is set, GNB_MSG otherwise. The gNB identifier rides along when
    /// known; for regular uplink without an identifier the gNB
    /// address stands in so the AMF can answer the first exchange.
    pub fn send(&self, msg: &[u8], disconnect: bool, ran: Option<&Ran>) -> Result<()> {
        match self {
            Backend::Grpc(b) => b.send(msg, disconnect, ran),
        }
    }

    /// Emits an already-built frame, used by redirect forwarding.
    pub(crate) fn send_raw(&self, frame: SctplbMessage) -> Result<()> {
        match self {
            Backend::Grpc(b) => b.send_frame(frame),
        }
    }
}

/// One AMF reached over a bidirectional gRPC message stream.
pub struct GrpcBackend {
    pub(crate) address: String,
    pub(crate) lb_id: String,
    pub(crate) channel: Option<Channel>,
    pub(crate) stream: Option<mpsc::UnboundedSender<SctplbMessage>>,
    pub(crate) state: bool,
}

impl GrpcBackend {
    pub fn new(address: String, lb_id: String) -> GrpcBackend {
        GrpcBackend {
            address,
            lb_id,
            channel: None,
            stream: None,
            state: false,
        }
    }

    fn send(&self, msg: &[u8], disconnect: bool, ran: Option<&Ran>) -> Result<()> {
        let mut frame = SctplbMessage {
            msgtype: if disconnect {
                MsgType::GnbDisc as i32
            } else {
                MsgType::GnbMsg as i32
            },
            verbose_msg: if disconnect {
                "Bye From gNB Message !"
            } else {
                "Hello From gNB Message !"
            }
            .to_string(),
            sctplb_id: self.lb_id.clone(),
            msg: msg.to_vec(),
            ..Default::default()
        };
        if let Some(ran) = ran {
            if let Some(id) = &ran.ran_id {
                frame.gnb_id = id.clone();
            } else if !disconnect {
                frame.gnb_ip_addr = ran.gnb_ip.clone();
            }
        }
        self.send_frame(frame)
    }

    fn send_frame(&self, frame: SctplbMessage) -> Result<()> {
        let stream = self.stream.as_ref().ok_or(Error::ErrStreamNotOpen)?;
        stream.send(frame).map_err(|_| Error::ErrStreamClosed)
    }
}

/// Dials one backend, opens its message stream and runs it to
/// completion. Spawned by discovery for every new pool entry.
pub async fn connect_to_server(ctx: Arc<LbContext>, address: String, port: u16) {
    let target = format!("http://{address}:{port}");
    info!(%target, "connecting to backend");

    let channel = match dial(&target).await {
        Ok(channel) => channel,
        Err(e) => {
            error!(%address, error = %e, "did not connect");
            delete_backend(&ctx, &address).await;
            return;
        }
    };

    let mut client = NgapServiceClient::new(channel.clone());
    let (tx, rx) = mpsc::unbounded_channel();
    let mut inbound = match client
        .handle_message(UnboundedReceiverStream::new(rx))
        .await
    {
        Ok(response) => response.into_inner(),
        Err(e) => {
            error!(%address, error = %e, "open stream error");
            delete_backend(&ctx, &address).await;
            return;
        }
    };

    // Install the stream, mark ready and snapshot the RANs that need
    // announcing, all in one critical section.
    let known_rans = {
        let mut state = ctx.lock().await;
        let Some(Backend::Grpc(backend)) = state.backend_mut(&address) else {
            // Evicted while dialing.
            return;
        };
        backend.channel = Some(channel.clone());
        backend.stream = Some(tx.clone());
        backend.state = true;

        let mut ids = Vec::new();
        for ran in state.rans() {
            match &ran.ran_id {
                Some(id) => ids.push(id.clone()),
                None => info!(
                    gnb_ip = %ran.gnb_ip,
                    "ran connection exists without GnbId, not sending this ran to NF"
                ),
            }
        }
        ids
    };

    // INIT fan-out: one round-trip per already-known RAN. A receive
    // failure flips readiness off but keeps the backend pooled.
    let mut ready = true;
    for gnb_id in known_rans {
        let init = SctplbMessage {
            msgtype: MsgType::InitMsg as i32,
            verbose_msg: "Hello From SCTP LB !".to_string(),
            sctplb_id: ctx.lb_id.clone(),
            gnb_id,
            ..Default::default()
        };
        if tx.send(init).is_err() {
            warn!(%address, "can not send init");
            ready = false;
            continue;
        }
        match inbound.message().await {
            Ok(Some(response)) => {
                debug!(
                    amf_id = %response.amf_id,
                    verbose = %response.verbose_msg,
                    "init response from server"
                );
                ready = true;
            }
            Ok(None) => {
                warn!(%address, "stream closed during init");
                ready = false;
            }
            Err(e) => {
                warn!(%address, error = %e, "init response error");
                ready = false;
            }
        }
    }
    set_backend_state(&ctx, &address, ready).await;

    if ready {
        tokio::spawn(connection_on_state(
            ctx.clone(),
            address.clone(),
            channel,
        ));
        read_from_server(ctx, address, inbound).await;
    }
}

async fn dial(target: &str) -> Result<Channel> {
    let endpoint = Endpoint::from_shared(target.to_string())?
        .connect_timeout(CONNECT_TIMEOUT)
        .http2_keep_alive_interval(KEEP_ALIVE_INTERVAL)
        .keep_alive_timeout(KEEP_ALIVE_TIMEOUT)
        .keep_alive_while_idle(true);
    Ok(endpoint.connect().await?)
}

/// Periodically probes the channel's readiness. A readiness error
/// means the transport worker is gone for good, so the backend leaves
/// the pool.
async fn connection_on_state(ctx: Arc<LbContext>, address: String, channel: Channel) {
    let mut channel = channel;
    loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => return,
            _ = tokio::time::sleep(STATE_WATCH_INTERVAL) => {}
        }
        if let Err(e) = ServiceExt::<Request<BoxBody>>::ready(&mut channel).await {
            warn!(%address, error = %e, "backend channel failed");
            delete_backend(&ctx, &address).await;
            return;
        }
    }
}

/// Pumps frames off the backend stream into the dispatcher until the
/// stream dies, then evicts.
async fn read_from_server(ctx: Arc<LbContext>, address: String, mut inbound: Streaming<SctplbMessage>) {
    loop {
        match inbound.message().await {
            Ok(Some(frame)) => dispatcher::dispatch_downlink(&ctx, &address, frame).await,
            Ok(None) => {
                warn!(%address, "backend closed the stream, stop listening for this server");
                break;
            }
            Err(e) => {
                error!(%address, error = %e, "error in recv, stop listening for this server");
                break;
            }
        }
    }
    delete_backend(&ctx, &address).await;
}

/// Removes one backend from the pool and logs the survivors.
pub(crate) async fn delete_backend(ctx: &LbContext, address: &str) {
    let mut state = ctx.lock().await;
    if state.delete_backend(address) {
        info!(%address, "backend removed from pool");
    }
    for backend in state.backends() {
        info!(
            address = %backend.address(),
            state = backend.state(),
            "available backend"
        );
    }
}

async fn set_backend_state(ctx: &LbContext, address: &str, ready: bool) {
    let mut state = ctx.lock().await;
    if let Some(Backend::Grpc(backend)) = state.backend_mut(address) {
        backend.state = ready;
    }
}
