// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CAN endpoint: raw frames out, timestamped frames fanned out to readers.
//!
//! The endpoint owns no retry policy. Send errors surface to the caller; a
//! failed receive disables the endpoint until it is re-bound. Readers run
//! synchronously in registration order on the receive task and must not
//! block; anything heavy hands off through a queue.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use prost_types::Timestamp;
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Frame, Socket};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::error;

use harrow_bus::stamp;

/// Identifier bits of an extended CAN id.
pub const CAN_EFF_MASK: u32 = 0x1FFF_FFFF;
/// Extended-frame bit, accepted in the `flags` argument of send.
pub const CAN_EFF_FLAG: u32 = 0x8000_0000;

/// Synchronous frame consumer: `(masked cob_id, payload, recv stamp)`.
pub type CanReader = Box<dyn FnMut(u32, &[u8], &Timestamp) + Send>;

#[derive(Debug, Clone)]
struct VirtualFrame {
    cob_id: u32,
    data: Bytes,
}

/// One end of an in-process frame channel, standing in for a CAN interface.
pub struct VirtualCan {
    peer_tx: mpsc::Sender<VirtualFrame>,
    rx: tokio::sync::Mutex<mpsc::Receiver<VirtualFrame>>,
}

/// Byte-in/byte-out CAN transport.
pub enum CanTransport {
    /// Kernel SocketCAN interface.
    Socket(AsyncFd<CanSocket>),
    /// In-process pair backing the simulator and tests.
    Virtual(VirtualCan),
}

impl CanTransport {
    /// Open a SocketCAN interface (e.g. `can0`, `vcan0`).
    pub fn open(interface: &str) -> anyhow::Result<Self> {
        let socket = CanSocket::open(interface)?;
        socket.set_nonblocking(true)?;
        Ok(Self::Socket(AsyncFd::new(socket)?))
    }

    /// Two cross-linked virtual endpoints; frames sent on one arrive on the
    /// other.
    pub fn virtual_pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::channel(256);
        let (tx_b, rx_b) = mpsc::channel(256);
        (
            Self::Virtual(VirtualCan { peer_tx: tx_b, rx: tokio::sync::Mutex::new(rx_a) }),
            Self::Virtual(VirtualCan { peer_tx: tx_a, rx: tokio::sync::Mutex::new(rx_b) }),
        )
    }

    /// Queue one frame. `flags` carries the extended-frame bit.
    pub fn send(&self, cob_id: u32, data: &[u8], flags: u32) -> anyhow::Result<()> {
        match self {
            Self::Socket(fd) => {
                let frame = CanFrame::from_raw_id(cob_id | flags, data).ok_or_else(|| {
                    anyhow::anyhow!("invalid CAN frame: id {cob_id:#x}, {} bytes", data.len())
                })?;
                fd.get_ref().write_frame(&frame)?;
                Ok(())
            }
            Self::Virtual(link) => {
                let frame =
                    VirtualFrame { cob_id: cob_id | flags, data: Bytes::copy_from_slice(data) };
                link.peer_tx
                    .try_send(frame)
                    .map_err(|_| anyhow::anyhow!("virtual CAN peer gone or not draining"))
            }
        }
    }

    /// Wait for the next frame: raw id word, payload, receive stamp.
    ///
    /// The stamp is produced at the transport seam, as close to the frame's
    /// arrival as the backend allows.
    pub async fn recv(&self) -> anyhow::Result<(u32, Bytes, Timestamp)> {
        match self {
            Self::Socket(fd) => loop {
                let mut guard = fd.readable().await?;
                match guard.try_io(|inner| inner.get_ref().read_frame()) {
                    Ok(Ok(frame)) => {
                        return Ok((
                            frame.raw_id(),
                            Bytes::copy_from_slice(frame.data()),
                            stamp::now(),
                        ));
                    }
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_would_block) => continue,
                }
            },
            Self::Virtual(link) => {
                let frame = link
                    .rx
                    .lock()
                    .await
                    .recv()
                    .await
                    .ok_or_else(|| anyhow::anyhow!("virtual CAN peer closed"))?;
                Ok((frame.cob_id, frame.data, stamp::now()))
            }
        }
    }

    /// Non-blocking receive; `Ok(None)` when no frame is pending.
    pub fn try_recv(&self) -> anyhow::Result<Option<(u32, Bytes, Timestamp)>> {
        match self {
            Self::Socket(fd) => match fd.get_ref().read_frame() {
                Ok(frame) => Ok(Some((
                    frame.raw_id(),
                    Bytes::copy_from_slice(frame.data()),
                    stamp::now(),
                ))),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
                Err(e) => Err(e.into()),
            },
            Self::Virtual(link) => {
                let Ok(mut rx) = link.rx.try_lock() else {
                    return Ok(None);
                };
                Ok(rx.try_recv().ok().map(|f| (f.cob_id, f.data, stamp::now())))
            }
        }
    }
}

struct CanBusInner {
    transport: Arc<CanTransport>,
    readers: Arc<Mutex<Vec<CanReader>>>,
    shutdown: CancellationToken,
}

impl Drop for CanBusInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// CAN endpoint handle: send frames, fan received frames out to readers.
#[derive(Clone)]
pub struct CanBus {
    inner: Arc<CanBusInner>,
}

impl CanBus {
    pub fn new(transport: CanTransport) -> Self {
        let transport = Arc::new(transport);
        let readers: Arc<Mutex<Vec<CanReader>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = CancellationToken::new();
        spawn_recv(Arc::clone(&transport), Arc::clone(&readers), shutdown.clone());
        Self { inner: Arc::new(CanBusInner { transport, readers, shutdown }) }
    }

    /// Register a frame consumer. Readers run in registration order.
    pub fn add_reader(&self, reader: impl FnMut(u32, &[u8], &Timestamp) + Send + 'static) {
        self.inner.readers.lock().push(Box::new(reader));
    }

    /// Send one frame; errors surface to the caller.
    pub fn send(&self, cob_id: u32, data: &[u8], flags: u32) -> anyhow::Result<()> {
        self.inner.transport.send(cob_id, data, flags)
    }
}

fn spawn_recv(
    transport: Arc<CanTransport>,
    readers: Arc<Mutex<Vec<CanReader>>>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                _ = shutdown.cancelled() => break,
                f = transport.recv() => f,
            };
            match frame {
                Ok((cob_id, data, recv_stamp)) => {
                    let masked = cob_id & CAN_EFF_MASK;
                    for reader in readers.lock().iter_mut() {
                        reader(masked, &data, &recv_stamp);
                    }
                }
                Err(e) => {
                    error!("CAN receive failed, endpoint disabled until re-bound: {e}");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
#[path = "canbus_tests.rs"]
mod tests;
