use crate::config::Config;
use crate::notify_bridge::NotificationSink;
use crate::protocol::{Endpoint, RemoteRequest, encode_outbound};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

pub enum RemoteEvent {
    Request(RemoteRequest),
}

/// Local UDP link to the BLE peripheral process. Inbound datagrams are JSON
/// requests; outbound datagrams are tagged binary payloads.
pub struct RemoteLink {
    socket: Arc<UdpSocket>,
    target_addr: String,
    tx: mpsc::Sender<RemoteEvent>,
    buffer_size: usize,
}

impl RemoteLink {
    pub async fn new(config: &Config, tx: mpsc::Sender<RemoteEvent>) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(format!(
            "{}:{}",
            config.remote_local_ip, config.remote_local_port
        ))
        .await?;
        let target_addr = format!("{}:{}", config.remote_remote_ip, config.remote_remote_port);

        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            tx,
            buffer_size: config.remote_buffer_size,
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                continue;
            }
            let request = match serde_json::from_slice::<RemoteRequest>(&buf[..len]) {
                Ok(req) => req,
                Err(e) => {
                    log::warn!("Ignoring malformed remote request: {}", e);
                    continue;
                }
            };
            if self.tx.send(RemoteEvent::Request(request)).await.is_err() {
                log::warn!("Remote event receiver dropped");
                break;
            }
        }
        Ok(())
    }

    pub async fn send(&self, endpoint: Endpoint, payload: &[u8]) -> anyhow::Result<()> {
        self.socket
            .send_to(&encode_outbound(endpoint, payload), &self.target_addr)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for RemoteLink {
    async fn notify(&self, endpoint: Endpoint, payload: Bytes) -> anyhow::Result<()> {
        self.send(endpoint, &payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Op;

    async fn link_pair() -> (RemoteLink, UdpSocket, mpsc::Receiver<RemoteEvent>) {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, rx) = mpsc::channel(8);
        let link = RemoteLink {
            socket: Arc::new(socket),
            target_addr: peer.local_addr().unwrap().to_string(),
            tx,
            buffer_size: 2048,
        };
        (link, peer, rx)
    }

    #[tokio::test]
    async fn requests_are_decoded_and_forwarded() {
        let (link, peer, mut rx) = link_pair().await;
        let link_addr = link.socket.local_addr().unwrap();
        let link = Arc::new(link);
        let runner = link.clone();
        let task = tokio::spawn(async move { runner.run().await });

        peer.send_to(b"not json", link_addr).await.unwrap();
        peer.send_to(br#"{"op":"write","endpoint":"volume","value":"70"}"#, link_addr)
            .await
            .unwrap();

        let RemoteEvent::Request(req) = rx.recv().await.unwrap();
        assert_eq!(req.op, Op::Write);
        assert_eq!(req.endpoint, Endpoint::Volume);
        assert_eq!(req.value.as_deref(), Some("70"));
        task.abort();
    }

    #[tokio::test]
    async fn notifications_are_tagged() {
        let (link, peer, _rx) = link_pair().await;
        link.notify(Endpoint::Status, Bytes::from_static(b"TEARIS_READY"))
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(buf[0], Endpoint::Status.tag());
        assert_eq!(&buf[1..len], b"TEARIS_READY");
    }
}
