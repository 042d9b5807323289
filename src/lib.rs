//! # Voice Stream Core
//!
//! Real-time concurrency core of a voice chat client: moves captured audio
//! through encoders onto the network, received datagrams into decoders, and
//! decoded audio out to any number of listeners.
//!
//! ## Architecture Overview
//!
//! ```text
//!  capture callback                          network receive callback
//!        │ push_audio_to_encoder                      │ handle_datagram
//!        ▼                                            ▼
//! ┌──────────────────────┐                 ┌──────────────────────────┐
//! │  EncoderPushWorker   │                 │  DecoderDispatchWorker   │
//! │  frame queue         │                 │  datagram queue          │
//! │  prune ─ snapshot    │                 │  prune ─ snapshot        │
//! │  encoder_push/pop    │                 │  decoder_push x N        │
//! └──────────┬───────────┘                 └────────────┬─────────────┘
//!            │ send_datagram                            │
//!            ▼                                          ▼
//!      room layer                               codec decoders
//!                                                       │ decoder_pop (on miss)
//!                                                       ▼
//!                                         ┌──────────────────────────┐
//!                                         │  PlaybackStream          │
//!                                         │  ring cache + origin lock│
//!                                         └──┬─────────┬─────────┬───┘
//!                                            ▼         ▼         ▼
//!                                        reader A  reader B  reader C
//! ```
//!
//! Both workers look up their targets in a [`registry::LinkRegistry`] whose
//! entries are pruned lazily against a [`registry::RoomValidity`] oracle.
//! [`VoiceCore`] wires everything together.

pub mod audio;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod handle;
pub mod network;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_support;

pub use engine::VoiceCore;
pub use error::{Error, Result};
pub use handle::{ChannelMask, DecoderHandle, EncoderHandle, PeerId, RoomHandle, SsrcId};

/// Library-wide constants
pub mod constants {
    /// Default sample rate for decoded playback
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default playback channel count (mono voice)
    pub const DEFAULT_CHANNELS: u16 = 1;

    /// Audio requested by one render callback, in milliseconds
    pub const DEFAULT_CALLBACK_MS: u32 = 20;

    /// Render callbacks worth of audio kept in a playback cache
    pub const DEFAULT_CACHE_MULTIPLIER: u32 = 2;

    /// Worker wake interval when nothing signals it
    pub const DEFAULT_WAKE_INTERVAL_MS: u64 = 10;

    /// Size of the buffer encoded packets are popped into
    pub const MAX_DATAGRAM_SIZE: usize = 1300;
}
