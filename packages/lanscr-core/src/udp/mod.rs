//! Chunked-JPEG datagram transport.
//!
//! One JPEG frame becomes `ceil(len / 1200)` datagrams sharing a `frameId`.
//! The server treats any received packet as a subscriber keep-alive and
//! expires silent peers; the client reassembles by `(frameId, chunkIndex)`
//! and abandons a partial frame as soon as the next one starts. No
//! retransmission, no ordering between frames, no partial renders.

pub mod client;
pub mod server;
pub mod wire;

pub use client::{run_udp_client, FrameSink};
pub use server::{run_udp_server, UdpServerOptions};
pub use wire::{chunk_frame, ChunkHeader, FrameAssembler};

use std::net::{Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::constants::UDP_SOCKET_BUFFER;
use crate::error::{Error, Result};

/// Binds a UDP socket with the large send/recv buffers both peers use.
pub(crate) fn bind_udp(port: u16) -> Result<UdpSocket> {
    let bind = |port: u16| -> std::io::Result<UdpSocket> {
        let addr: SocketAddr = (Ipv4Addr::UNSPECIFIED, port).into();
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_send_buffer_size(UDP_SOCKET_BUFFER)?;
        socket.set_recv_buffer_size(UDP_SOCKET_BUFFER)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;
        UdpSocket::from_std(socket.into())
    };
    bind(port).map_err(|source| Error::Bind { port, source })
}
