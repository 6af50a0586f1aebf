//! Datagram client: keep-alive hellos plus frame reassembly.
//!
//! The client binds an ephemeral port, announces itself to the server every
//! 500 ms with a `LSU2` hello, and feeds every received datagram to the
//! assembler. Completed JPEGs are handed to a [`FrameSink`]; decoding and
//! painting are the viewer's business.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::constants::UDP_HELLO_INTERVAL;
use crate::error::Result;
use crate::udp::bind_udp;
use crate::udp::wire::FrameAssembler;

/// Receives completed JPEG frames from the datagram client.
pub trait FrameSink: Send {
    fn on_frame(&mut self, jpeg: Bytes);
}

/// Runs the datagram client until cancelled.
pub async fn run_udp_client(
    server: SocketAddr,
    mut sink: impl FrameSink,
    stop: CancellationToken,
) -> Result<()> {
    let socket = bind_udp(0)?;
    let mut assembler = FrameAssembler::new();
    let mut hello = tokio::time::interval(UDP_HELLO_INTERVAL);
    let mut buf = [0u8; 1600];

    log::info!("Subscribing to UDP server {server}");

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = hello.tick() => {
                let _ = socket.send_to(b"LSU2", server).await;
            }
            res = socket.recv_from(&mut buf) => {
                let Ok((n, _)) = res else { continue };
                if let Some(jpeg) = assembler.ingest(&buf[..n]) {
                    sink.on_frame(jpeg);
                }
            }
        }
    }

    log::info!("UDP client stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::udp::wire::chunk_frame;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct CollectingSink(Arc<Mutex<Vec<Bytes>>>);

    impl FrameSink for CollectingSink {
        fn on_frame(&mut self, jpeg: Bytes) {
            self.0.lock().unwrap().push(jpeg);
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn client_hellos_and_reassembles() {
        // A bare socket plays the server role.
        let server = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let frames: Arc<Mutex<Vec<Bytes>>> = Arc::new(Mutex::new(Vec::new()));
        let stop = CancellationToken::new();
        let client = tokio::spawn(run_udp_client(
            server_addr,
            CollectingSink(Arc::clone(&frames)),
            stop.clone(),
        ));

        // The client announces itself with the hello magic.
        let mut buf = [0u8; 64];
        let (n, client_addr) =
            tokio::time::timeout(Duration::from_secs(2), server.recv_from(&mut buf))
                .await
                .expect("hello arrives")
                .unwrap();
        assert_eq!(&buf[..n], b"LSU2");

        // Push one chunked frame back and wait for the sink.
        let jpeg: Vec<u8> = (0..2500).map(|i| (i % 17) as u8).collect();
        for packet in chunk_frame(1, &jpeg) {
            server.send_to(&packet, client_addr).await.unwrap();
        }

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if !frames.lock().unwrap().is_empty() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("frame reaches the sink");
        assert_eq!(&frames.lock().unwrap()[0][..], &jpeg[..]);

        stop.cancel();
        tokio::time::timeout(Duration::from_secs(2), client)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }
}
