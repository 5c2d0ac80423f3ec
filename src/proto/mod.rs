//! Wire frames exchanged with AMF workers.
//!
//! Every backend carries one bidirectional gRPC stream of
//! [`SctplbMessage`] frames, the `sdcoreAmfServer.NgapService`
//! contract the AMF side speaks. Frames are prost messages declared
//! in-source; there is no build-time protoc step.

use tonic::codec::{ProstCodec, Streaming};
use tonic::transport::Channel;
use tonic::{IntoStreamingRequest, Response, Status};

use crate::error::Result;

/// Fully qualified method driven on every AMF worker.
pub const HANDLE_MESSAGE_PATH: &str = "/sdcoreAmfServer.NgapService/HandleMessage";

/// One frame on the backend stream, either direction. Uplink frames
/// carry the balancer identity plus the gNB identifier when known
/// (the gNB address stands in until the AMF reports the identifier);
/// AMF responses may additionally carry `amf_id` and, for redirects,
/// the target backend IP in `redirect_id`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SctplbMessage {
    #[prost(enumeration = "MsgType", tag = "1")]
    pub msgtype: i32,
    /// Free-form greeting, informational only.
    #[prost(string, tag = "2")]
    pub verbose_msg: ::prost::alloc::string::String,
    /// Identity of the balancer process (its hostname).
    #[prost(string, tag = "3")]
    pub sctplb_id: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub gnb_id: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub gnb_ip_addr: ::prost::alloc::string::String,
    /// Opaque NGAP payload, forwarded verbatim.
    #[prost(bytes = "vec", tag = "6")]
    pub msg: ::prost::alloc::vec::Vec<u8>,
    /// Responding AMF instance, set by the server side only.
    #[prost(string, tag = "7")]
    pub amf_id: ::prost::alloc::string::String,
    /// Target AMF IP on REDIRECT_MSG responses.
    #[prost(string, tag = "8")]
    pub redirect_id: ::prost::alloc::string::String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum MsgType {
    /// Announces an already-known gNB to a freshly connected AMF.
    InitMsg = 0,
    /// Uplink NGAP payload from a gNB.
    GnbMsg = 1,
    /// A gNB association went away.
    GnbDisc = 2,
    /// AMF instruction to resend the payload to another backend.
    RedirectMsg = 3,
}

/// Client half of the NgapService message stream.
#[derive(Debug, Clone)]
pub struct NgapServiceClient {
    inner: tonic::client::Grpc<Channel>,
}

impl NgapServiceClient {
    pub fn new(channel: Channel) -> Self {
        Self {
            inner: tonic::client::Grpc::new(channel),
        }
    }

    /// Opens the bidirectional message stream. The request side is any
    /// stream of frames; the response is the AMF's frame stream.
    pub async fn handle_message(
        &mut self,
        request: impl IntoStreamingRequest<Message = SctplbMessage>,
    ) -> Result<Response<Streaming<SctplbMessage>>> {
        self.inner
            .ready()
            .await
            .map_err(|e| Status::unknown(format!("service was not ready: {e}")))?;
        let codec: ProstCodec<SctplbMessage, SctplbMessage> = ProstCodec::default();
        let path = http::uri::PathAndQuery::from_static(HANDLE_MESSAGE_PATH);
        Ok(self
            .inner
            .streaming(request.into_streaming_request(), path, codec)
            .await?)
    }
}
