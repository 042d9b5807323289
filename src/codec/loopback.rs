//! In-memory loopback codec
//!
//! Packets carry the raw PCM as little-endian `f32`, so whatever an encoder
//! receives comes out of a decoder bit-exact. Used by the demo binary and the
//! end-to-end tests; no real compression happens here.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::VecDeque;

use super::{drain_pcm, pop_packet, Decoded, DecoderCodec, EncoderCodec, HandleTable};
use crate::error::CodecError;
use crate::handle::{DecoderHandle, EncoderHandle};

const BYTES_PER_SAMPLE: usize = std::mem::size_of::<f32>();

struct LoopbackEncoder {
    frame_samples: usize,
    pending: Vec<f32>,
    packets: VecDeque<Bytes>,
}

impl LoopbackEncoder {
    fn push(&mut self, samples: &[f32]) {
        self.pending.extend_from_slice(samples);
        while self.pending.len() >= self.frame_samples {
            let mut packet = BytesMut::with_capacity(self.frame_samples * BYTES_PER_SAMPLE);
            for sample in self.pending.drain(..self.frame_samples) {
                packet.put_f32_le(sample);
            }
            self.packets.push_back(packet.freeze());
        }
    }
}

#[derive(Default)]
struct LoopbackDecoder {
    pcm: VecDeque<f32>,
}

impl LoopbackDecoder {
    fn push(&mut self, datagram: &[u8]) -> Result<(), CodecError> {
        if datagram.len() % BYTES_PER_SAMPLE != 0 {
            return Err(CodecError::failed(format!(
                "datagram of {} bytes is not whole f32 samples",
                datagram.len()
            )));
        }
        self.pcm.extend(
            datagram
                .chunks_exact(BYTES_PER_SAMPLE)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        Ok(())
    }
}

/// Codec that frames PCM into packets without compressing it
pub struct LoopbackCodec {
    encoders: HandleTable<LoopbackEncoder>,
    decoders: HandleTable<LoopbackDecoder>,
}

impl LoopbackCodec {
    pub fn new() -> Self {
        Self {
            encoders: HandleTable::new(),
            decoders: HandleTable::new(),
        }
    }

    /// Create an encoder emitting one packet per `frame_samples` pushed samples
    pub fn create_encoder(&self, frame_samples: usize) -> Result<EncoderHandle, CodecError> {
        if frame_samples == 0 {
            return Err(CodecError::Unsupported("frame of zero samples".into()));
        }
        let raw = self.encoders.insert(LoopbackEncoder {
            frame_samples,
            pending: Vec::with_capacity(frame_samples * 2),
            packets: VecDeque::new(),
        });
        Ok(EncoderHandle::from_raw(raw))
    }

    pub fn destroy_encoder(&self, encoder: EncoderHandle) -> bool {
        self.encoders.remove(encoder.raw())
    }

    pub fn create_decoder(&self) -> DecoderHandle {
        DecoderHandle::from_raw(self.decoders.insert(LoopbackDecoder::default()))
    }

    pub fn destroy_decoder(&self, decoder: DecoderHandle) -> bool {
        self.decoders.remove(decoder.raw())
    }

    /// Samples buffered in `decoder` and not yet popped
    pub fn buffered_samples(&self, decoder: DecoderHandle) -> Result<usize, CodecError> {
        self.decoders.with(decoder.raw(), |d| d.pcm.len())
    }
}

impl Default for LoopbackCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderCodec for LoopbackCodec {
    fn encoder_push(&self, encoder: EncoderHandle, samples: &[f32]) -> Result<(), CodecError> {
        self.encoders.with(encoder.raw(), |e| e.push(samples))
    }

    fn encoder_pop(&self, encoder: EncoderHandle, out: &mut [u8]) -> Result<usize, CodecError> {
        self.encoders
            .with(encoder.raw(), |e| pop_packet(&mut e.packets, out))?
    }
}

impl DecoderCodec for LoopbackCodec {
    fn decoder_push(&self, decoder: DecoderHandle, datagram: &[u8]) -> Result<(), CodecError> {
        self.decoders.with(decoder.raw(), |d| d.push(datagram))?
    }

    fn decoder_pop(&self, decoder: DecoderHandle, out: &mut [f32]) -> Result<Decoded, CodecError> {
        self.decoders
            .with(decoder.raw(), |d| drain_pcm(&mut d.pcm, out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_pushed_audio() {
        let codec = LoopbackCodec::new();
        let encoder = codec.create_encoder(4).unwrap();

        codec.encoder_push(encoder, &[0.1, 0.2, 0.3]).unwrap();
        let mut out = [0u8; 64];
        assert_eq!(codec.encoder_pop(encoder, &mut out), Err(CodecError::NoData));

        codec.encoder_push(encoder, &[0.4, 0.5]).unwrap();
        assert_eq!(codec.encoder_pop(encoder, &mut out), Ok(16));
        assert_eq!(codec.encoder_pop(encoder, &mut out), Err(CodecError::NoData));
    }

    #[test]
    fn test_encoder_to_decoder_is_lossless() {
        let codec = LoopbackCodec::new();
        let encoder = codec.create_encoder(3).unwrap();
        let decoder = codec.create_decoder();

        codec.encoder_push(encoder, &[0.25, -0.5, 1.0]).unwrap();
        let mut packet = [0u8; 64];
        let len = codec.encoder_pop(encoder, &mut packet).unwrap();
        codec.decoder_push(decoder, &packet[..len]).unwrap();
        assert_eq!(codec.buffered_samples(decoder), Ok(3));

        let mut pcm = [0.0f32; 4];
        assert_eq!(codec.decoder_pop(decoder, &mut pcm), Ok(Decoded::AUDIO));
        assert_eq!(pcm, [0.25, -0.5, 1.0, 0.0]);
        assert_eq!(codec.decoder_pop(decoder, &mut pcm), Ok(Decoded::SILENCE));
    }

    #[test]
    fn test_destroyed_handles_are_invalid() {
        let codec = LoopbackCodec::new();
        let encoder = codec.create_encoder(2).unwrap();
        let decoder = codec.create_decoder();
        assert!(codec.destroy_encoder(encoder));
        assert!(codec.destroy_decoder(decoder));

        assert_eq!(
            codec.encoder_push(encoder, &[0.0]),
            Err(CodecError::InvalidHandle)
        );
        assert_eq!(
            codec.decoder_push(decoder, &[0, 0, 0, 0]),
            Err(CodecError::InvalidHandle)
        );
    }

    #[test]
    fn test_rejects_ragged_datagram() {
        let codec = LoopbackCodec::new();
        let decoder = codec.create_decoder();
        assert!(matches!(
            codec.decoder_push(decoder, &[1, 2, 3]),
            Err(CodecError::Failed(_))
        ));
    }
}
