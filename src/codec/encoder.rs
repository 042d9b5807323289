//! Opus encoder wrapper
//!
//! Buffers pushed PCM until a full Opus frame is available, encodes it and
//! queues the packet for the next pop.

use bytes::Bytes;
use opus::{Application, Channels, Encoder};
use std::collections::VecDeque;

use super::pop_packet;
use crate::error::CodecError;

/// Largest packet a single Opus frame can produce
const MAX_OPUS_PACKET: usize = 4000;

/// Kind of audio the encoder is tuned for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceApplication {
    Voip,
    Audio,
    LowDelay,
}

/// Encoder settings
#[derive(Debug, Clone, PartialEq)]
pub struct OpusSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub application: VoiceApplication,
    pub bitrate: u32,
    pub frame_duration_ms: f32,
    pub vbr: bool,
    pub fec: bool,
    pub packet_loss_perc: u8,
}

impl OpusSettings {
    /// Speech at 48kHz mono, 20ms frames with in-band FEC
    pub fn voice() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            application: VoiceApplication::Voip,
            bitrate: 32_000,
            frame_duration_ms: 20.0,
            vbr: true,
            fec: true,
            packet_loss_perc: 10,
        }
    }

    /// Samples per channel in one frame
    pub fn frame_size(&self) -> usize {
        (self.sample_rate as f32 * self.frame_duration_ms / 1000.0) as usize
    }

    /// Interleaved samples in one frame
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size() * self.channels as usize
    }
}

impl Default for OpusSettings {
    fn default() -> Self {
        Self::voice()
    }
}

/// Opus encoder with a packet queue
pub struct OpusEncoder {
    encoder: Encoder,
    settings: OpusSettings,
    pending: Vec<f32>,
    packets: VecDeque<Bytes>,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl OpusEncoder {
    pub fn new(settings: OpusSettings) -> Result<Self, CodecError> {
        let channels = match settings.channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            n => {
                return Err(CodecError::Unsupported(format!(
                    "Unsupported channel count: {n}"
                )))
            }
        };

        let application = match settings.application {
            VoiceApplication::Voip => Application::Voip,
            VoiceApplication::Audio => Application::Audio,
            VoiceApplication::LowDelay => Application::LowDelay,
        };

        let mut encoder = Encoder::new(settings.sample_rate, channels, application)
            .map_err(|e| CodecError::Unsupported(e.to_string()))?;
        Self::configure_encoder(&mut encoder, &settings)?;

        Ok(Self {
            pending: Vec::with_capacity(settings.samples_per_frame() * 2),
            encoder,
            settings,
            packets: VecDeque::new(),
            encode_buffer: vec![0u8; MAX_OPUS_PACKET],
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    fn configure_encoder(encoder: &mut Encoder, settings: &OpusSettings) -> Result<(), CodecError> {
        let init_err = |what: &str, e: opus::Error| {
            CodecError::Unsupported(format!("Failed to set {what}: {e}"))
        };

        encoder
            .set_bitrate(opus::Bitrate::Bits(settings.bitrate as i32))
            .map_err(|e| init_err("bitrate", e))?;
        encoder
            .set_vbr(settings.vbr)
            .map_err(|e| init_err("VBR", e))?;
        encoder
            .set_inband_fec(settings.fec)
            .map_err(|e| init_err("FEC", e))?;
        if settings.fec {
            encoder
                .set_packet_loss_perc(settings.packet_loss_perc as i32)
                .map_err(|e| init_err("packet loss", e))?;
        }
        Ok(())
    }

    /// Queue PCM and encode every complete frame
    pub fn push(&mut self, samples: &[f32]) -> Result<(), CodecError> {
        self.pending.extend_from_slice(samples);
        let frame = self.settings.samples_per_frame();

        while self.pending.len() >= frame {
            let size = self
                .encoder
                .encode_float(&self.pending[..frame], &mut self.encode_buffer)
                .map_err(|e| CodecError::Failed(e.to_string()))?;
            self.pending.drain(..frame);

            self.frames_encoded += 1;
            self.bytes_produced += size as u64;
            self.packets
                .push_back(Bytes::copy_from_slice(&self.encode_buffer[..size]));
        }
        Ok(())
    }

    pub fn pop(&mut self, out: &mut [u8]) -> Result<usize, CodecError> {
        pop_packet(&mut self.packets, out)
    }

    pub fn settings(&self) -> &OpusSettings {
        &self.settings
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            queued_packets: self.packets.len(),
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub queued_packets: usize,
}
