//! Opus-backed codec
//!
//! Owns one Opus encoder or decoder per handle and exposes them through the
//! codec capability traits.

use super::decoder::OpusDecoder;
use super::encoder::{OpusEncoder, OpusSettings};
use super::{Decoded, DecoderCodec, EncoderCodec, HandleTable};
use crate::error::CodecError;
use crate::handle::{DecoderHandle, EncoderHandle};

#[derive(Default)]
pub struct OpusCodec {
    encoders: HandleTable<OpusEncoder>,
    decoders: HandleTable<OpusDecoder>,
}

impl OpusCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_encoder(&self, settings: OpusSettings) -> Result<EncoderHandle, CodecError> {
        let encoder = OpusEncoder::new(settings)?;
        Ok(EncoderHandle::from_raw(self.encoders.insert(encoder)))
    }

    pub fn destroy_encoder(&self, encoder: EncoderHandle) -> bool {
        self.encoders.remove(encoder.raw())
    }

    pub fn create_decoder(&self, sample_rate: u32, channels: u16) -> Result<DecoderHandle, CodecError> {
        let decoder = OpusDecoder::new(sample_rate, channels)?;
        Ok(DecoderHandle::from_raw(self.decoders.insert(decoder)))
    }

    pub fn destroy_decoder(&self, decoder: DecoderHandle) -> bool {
        self.decoders.remove(decoder.raw())
    }
}

impl EncoderCodec for OpusCodec {
    fn encoder_push(&self, encoder: EncoderHandle, samples: &[f32]) -> Result<(), CodecError> {
        self.encoders.with(encoder.raw(), |e| e.push(samples))?
    }

    fn encoder_pop(&self, encoder: EncoderHandle, out: &mut [u8]) -> Result<usize, CodecError> {
        self.encoders.with(encoder.raw(), |e| e.pop(out))?
    }
}

impl DecoderCodec for OpusCodec {
    fn decoder_push(&self, decoder: DecoderHandle, datagram: &[u8]) -> Result<(), CodecError> {
        self.decoders.with(decoder.raw(), |d| d.push(datagram))?
    }

    fn decoder_pop(&self, decoder: DecoderHandle, out: &mut [f32]) -> Result<Decoded, CodecError> {
        self.decoders.with(decoder.raw(), |d| d.pop(out))
    }
}
