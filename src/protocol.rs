use bytes::{BufMut, Bytes, BytesMut};
use serde::Deserialize;

/// Logical endpoints exposed to the BLE peripheral process.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    Volume,
    Mode,
    Battery,
    Status,
    AudioStream,
}

impl Endpoint {
    /// First byte of every outbound datagram.
    pub fn tag(&self) -> u8 {
        match self {
            Endpoint::Volume => 1,
            Endpoint::Mode => 2,
            Endpoint::Battery => 3,
            Endpoint::Status => 4,
            Endpoint::AudioStream => 5,
        }
    }

    pub fn readable(&self) -> bool {
        !matches!(self, Endpoint::AudioStream)
    }

    pub fn writable(&self) -> bool {
        matches!(self, Endpoint::Volume | Endpoint::Mode)
    }

    pub fn notifiable(&self) -> bool {
        matches!(self, Endpoint::Battery | Endpoint::AudioStream)
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Read,
    Write,
    Subscribe,
    Unsubscribe,
}

/// Inbound JSON request from the peripheral process.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub op: Op,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub value: Option<String>,
}

/// Tag byte followed by the payload.
pub fn encode_outbound(endpoint: Endpoint, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(payload.len() + 1);
    buf.put_u8(endpoint.tag());
    buf.put_slice(payload);
    buf.freeze()
}
