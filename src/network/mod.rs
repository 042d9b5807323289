//! Worker threads between the codec and the room layer
//!
//! [`EncoderPushWorker`] moves captured audio into encoders and encoded
//! packets onto the network. [`DecoderDispatchWorker`] moves received
//! datagrams into every decoder listening to their sender. Both accept work
//! from any thread without blocking and do all codec and network calls on
//! their own thread.

pub mod dispatch;
pub mod encoder_push;
pub mod worker;

pub use dispatch::{DecoderDispatchHandle, DecoderDispatchStats, DecoderDispatchWorker};
pub use encoder_push::{EncoderPushHandle, EncoderPushStats, EncoderPushWorker};
pub use worker::Wakeup;

use bytes::Bytes;

use crate::error::NetworkError;
use crate::handle::{ChannelMask, EncoderHandle, PeerId, RoomHandle, SsrcId};

/// Outbound side of the room layer
pub trait DatagramTransport: Send + Sync {
    fn send_datagram(&self, room: RoomHandle, datagram: &[u8]) -> Result<(), NetworkError>;
}

impl<F> DatagramTransport for F
where
    F: Fn(RoomHandle, &[u8]) -> Result<(), NetworkError> + Send + Sync,
{
    fn send_datagram(&self, room: RoomHandle, datagram: &[u8]) -> Result<(), NetworkError> {
        self(room, datagram)
    }
}

/// Captured audio waiting for its encoder
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub encoder: EncoderHandle,
    /// Interleaved PCM
    pub samples: Vec<f32>,
}

impl AudioFrame {
    pub fn new(encoder: EncoderHandle, samples: Vec<f32>) -> Self {
        Self { encoder, samples }
    }
}

/// A datagram received from a remote peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramEvent {
    pub room: RoomHandle,
    pub peer: PeerId,
    pub channel_mask: ChannelMask,
    pub ssrc: SsrcId,
    pub datagram: Bytes,
}
