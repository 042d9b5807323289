//! Opus decoder wrapper
//!
//! Decodes each pushed packet straight into a PCM queue that pops drain at
//! the render cadence. An empty packet triggers packet loss concealment.

use opus::{Channels, Decoder};
use std::collections::VecDeque;

use super::{drain_pcm, Decoded};
use crate::error::CodecError;

/// 120ms at 48kHz stereo, the longest Opus frame
const MAX_DECODED_SAMPLES: usize = 48000 * 2 * 120 / 1000;

/// Opus decoder with a PCM queue
pub struct OpusDecoder {
    decoder: Decoder,
    sample_rate: u32,
    channels: u16,
    pcm: VecDeque<f32>,
    /// Decoding buffer (reused to avoid allocations)
    decode_buffer: Vec<f32>,
    frames_decoded: u64,
    frames_lost: u64,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            n => {
                return Err(CodecError::Unsupported(format!(
                    "Unsupported channel count: {n}"
                )))
            }
        };

        let decoder = Decoder::new(sample_rate, opus_channels)
            .map_err(|e| CodecError::Unsupported(e.to_string()))?;

        Ok(Self {
            decoder,
            sample_rate,
            channels,
            pcm: VecDeque::with_capacity(MAX_DECODED_SAMPLES),
            decode_buffer: vec![0.0f32; MAX_DECODED_SAMPLES],
            frames_decoded: 0,
            frames_lost: 0,
        })
    }

    pub fn push(&mut self, packet: &[u8]) -> Result<(), CodecError> {
        let per_channel = self
            .decoder
            .decode_float(packet, &mut self.decode_buffer, false)
            .map_err(|e| CodecError::Failed(e.to_string()))?;

        if packet.is_empty() {
            self.frames_lost += 1;
        } else {
            self.frames_decoded += 1;
        }
        let total = per_channel * self.channels as usize;
        self.pcm.extend(&self.decode_buffer[..total]);
        Ok(())
    }

    pub fn pop(&mut self, out: &mut [f32]) -> Decoded {
        drain_pcm(&mut self.pcm, out)
    }

    pub fn reset(&mut self) -> Result<(), CodecError> {
        self.pcm.clear();
        self.decoder
            .reset_state()
            .map_err(|e| CodecError::Failed(e.to_string()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn stats(&self) -> DecoderStats {
        DecoderStats {
            frames_decoded: self.frames_decoded,
            frames_lost: self.frames_lost,
            buffered_samples: self.pcm.len(),
        }
    }
}

/// Decoder statistics
#[derive(Debug, Clone)]
pub struct DecoderStats {
    pub frames_decoded: u64,
    pub frames_lost: u64,
    pub buffered_samples: usize,
}
