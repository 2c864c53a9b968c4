//! SocketCAN backend (Linux, `socketcan` feature)
//!
//! Bus bring-up (bitrates, `ip link set ... up`) is done with system tools;
//! this only binds a raw CAN FD socket to an already configured device.

use async_trait::async_trait;
use crate::core::Frame;
use crate::hardware::can_interface::{BusError, CanConfig, CanInterface, CanResult, CanStatus};
use socketcan::frame::FdFlags;
use socketcan::{
    CanAnyFrame, CanFdFrame, CanFdSocket, CanFrame, EmbeddedFrame, Frame as _, Socket,
    SocketOptions, StandardId,
};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

pub struct SocketCanInterface {
    name: String,
    status: CanStatus,
    socket: Option<Arc<CanFdSocket>>,
}

impl SocketCanInterface {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: CanStatus::Disconnected,
            socket: None,
        }
    }

    fn to_socket_frame(frame: &Frame) -> CanResult<OutgoingFrame> {
        let id = u16::try_from(frame.arbitration_id)
            .ok()
            .and_then(StandardId::new)
            .ok_or_else(|| BusError::Send(format!("invalid standard id 0x{:X}", frame.arbitration_id)))?;

        if frame.is_fd {
            let flags = if frame.bitrate_switch { FdFlags::BRS } else { FdFlags::empty() };
            CanFdFrame::with_flags(id, &frame.payload, flags)
                .map(OutgoingFrame::Fd)
                .ok_or_else(|| BusError::Send(format!("cannot build FD frame {}", frame)))
        } else {
            CanFrame::new(id, &frame.payload)
                .map(OutgoingFrame::Classic)
                .ok_or_else(|| BusError::Send(format!("cannot build frame {}", frame)))
        }
    }

    fn from_socket_frame(frame: CanAnyFrame) -> Option<Frame> {
        match frame {
            CanAnyFrame::Normal(f) => Some(Frame {
                arbitration_id: f.raw_id(),
                payload: f.data().to_vec(),
                is_fd: false,
                bitrate_switch: false,
            }),
            CanAnyFrame::Fd(f) => Some(Frame {
                arbitration_id: f.raw_id(),
                payload: f.data().to_vec(),
                is_fd: true,
                bitrate_switch: f.is_brs(),
            }),
            // Remote and error frames are not part of a replayed trace
            _ => None,
        }
    }
}

enum OutgoingFrame {
    Classic(CanFrame),
    Fd(CanFdFrame),
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

#[async_trait]
impl CanInterface for SocketCanInterface {
    fn name(&self) -> &str {
        &self.name
    }

    fn status(&self) -> CanStatus {
        self.status
    }

    async fn connect(&mut self, config: CanConfig) -> CanResult<()> {
        info!("Opening SocketCAN channel {} (fd: {}, own frames: {})",
              config.channel, config.fd_mode, config.receive_own_frames);

        let open_error = |e: io::Error| BusError::Open {
            channel: config.channel.clone(),
            reason: e.to_string(),
        };

        let socket = CanFdSocket::open(&config.channel).map_err(open_error)?;
        socket.set_recv_own_msgs(config.receive_own_frames).map_err(open_error)?;

        self.socket = Some(Arc::new(socket));
        self.status = CanStatus::Connected;
        Ok(())
    }

    async fn disconnect(&mut self) -> CanResult<()> {
        if self.socket.take().is_some() {
            info!("Closed SocketCAN channel {}", self.name);
        }
        self.status = CanStatus::Disconnected;
        Ok(())
    }

    async fn send(&mut self, frame: &Frame) -> CanResult<()> {
        let socket = self.socket.clone().ok_or(BusError::NotConnected)?;
        let outgoing = Self::to_socket_frame(frame)?;

        tokio::task::spawn_blocking(move || match outgoing {
            OutgoingFrame::Classic(f) => socket.write_frame(&f),
            OutgoingFrame::Fd(f) => socket.write_frame(&f),
        })
        .await
        .map_err(|e| BusError::Send(e.to_string()))?
        .map_err(|e| BusError::Send(e.to_string()))?;

        trace!("Sent {}", frame);
        Ok(())
    }

    async fn receive(&mut self, timeout: Duration) -> CanResult<Option<Frame>> {
        let socket = self.socket.clone().ok_or(BusError::NotConnected)?;

        tokio::task::spawn_blocking(move || -> CanResult<Option<Frame>> {
            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Ok(None);
                }
                socket.set_read_timeout(remaining)
                    .map_err(|e| BusError::Receive(e.to_string()))?;

                match socket.read_frame() {
                    Ok(raw) => {
                        if let Some(frame) = Self::from_socket_frame(raw) {
                            return Ok(Some(frame));
                        }
                        debug!("Skipping non-data frame");
                    }
                    Err(e) if is_timeout(&e) => return Ok(None),
                    Err(e) => return Err(BusError::Receive(e.to_string())),
                }
            }
        })
        .await
        .map_err(|e| BusError::Receive(e.to_string()))?
    }

    fn supports_fd(&self) -> bool {
        true
    }
}
