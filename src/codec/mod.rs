//! Codec boundary
//!
//! The streaming core talks to the codec library only through the two
//! capability traits below, one per handle kind. Both are synchronous and may
//! block briefly; they are only ever called from worker threads or from the
//! playback cache-miss path.
//!
//! Two implementations ship with the crate: an in-memory [`LoopbackCodec`]
//! that carries raw PCM, and an Opus-backed codec behind the `opus` feature.

pub mod loopback;

#[cfg(feature = "opus")]
pub mod decoder;
#[cfg(feature = "opus")]
pub mod encoder;
#[cfg(feature = "opus")]
pub mod opus_codec;

pub use loopback::LoopbackCodec;

#[cfg(feature = "opus")]
pub use opus_codec::OpusCodec;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::CodecError;
use crate::handle::{DecoderHandle, EncoderHandle};

/// Outcome of a successful decoder pop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decoded {
    /// The codec had nothing to play and produced silence
    pub is_silent: bool,
}

impl Decoded {
    pub const AUDIO: Self = Self { is_silent: false };
    pub const SILENCE: Self = Self { is_silent: true };
}

/// Encoder side of the codec library
pub trait EncoderCodec: Send + Sync {
    /// Feed captured interleaved PCM into `encoder`
    fn encoder_push(&self, encoder: EncoderHandle, samples: &[f32]) -> Result<(), CodecError>;

    /// Take the next encoded packet of `encoder`, returning its length
    ///
    /// `Err(CodecError::NoData)` means the encoder has nothing more right now.
    fn encoder_pop(&self, encoder: EncoderHandle, out: &mut [u8]) -> Result<usize, CodecError>;
}

/// Decoder side of the codec library
pub trait DecoderCodec: Send + Sync {
    /// Feed one received datagram into `decoder`
    fn decoder_push(&self, decoder: DecoderHandle, datagram: &[u8]) -> Result<(), CodecError>;

    /// Fill `out` with decoded interleaved PCM
    fn decoder_pop(&self, decoder: DecoderHandle, out: &mut [f32]) -> Result<Decoded, CodecError>;
}

/// Handle-indexed storage for codec state
///
/// Each entry has its own lock so two handles never contend.
pub struct HandleTable<T> {
    entries: RwLock<HashMap<u64, Arc<Mutex<T>>>>,
    next_handle: AtomicU64,
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Store `value` under a fresh non-zero handle
    pub fn insert(&self, value: T) -> u64 {
        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.entries.write().insert(raw, Arc::new(Mutex::new(value)));
        raw
    }

    pub fn remove(&self, raw: u64) -> bool {
        self.entries.write().remove(&raw).is_some()
    }

    /// Run `f` on the entry behind `raw`
    pub fn with<R>(&self, raw: u64, f: impl FnOnce(&mut T) -> R) -> Result<R, CodecError> {
        let entry = self
            .entries
            .read()
            .get(&raw)
            .cloned()
            .ok_or(CodecError::InvalidHandle)?;
        let mut guard = entry.lock();
        Ok(f(&mut *guard))
    }

    pub fn contains(&self, raw: u64) -> bool {
        self.entries.read().contains_key(&raw)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Move the oldest queued packet into `out`
///
/// A packet that does not fit is kept queued and reported as a failure.
pub(crate) fn pop_packet(packets: &mut VecDeque<Bytes>, out: &mut [u8]) -> Result<usize, CodecError> {
    let Some(packet) = packets.pop_front() else {
        return Err(CodecError::NoData);
    };
    if packet.len() > out.len() {
        let len = packet.len();
        packets.push_front(packet);
        return Err(CodecError::Failed(format!(
            "packet of {} bytes does not fit a {} byte buffer",
            len,
            out.len()
        )));
    }
    out[..packet.len()].copy_from_slice(&packet);
    Ok(packet.len())
}

/// Fill `out` from buffered PCM, padding with silence on underrun
pub(crate) fn drain_pcm(pcm: &mut VecDeque<f32>, out: &mut [f32]) -> Decoded {
    if pcm.is_empty() {
        out.fill(0.0);
        return Decoded::SILENCE;
    }
    let available = pcm.len().min(out.len());
    for (slot, sample) in out.iter_mut().zip(pcm.drain(..available)) {
        *slot = sample;
    }
    out[available..].fill(0.0);
    Decoded::AUDIO
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_table_lifecycle() {
        let table = HandleTable::<Vec<u8>>::new();
        let raw = table.insert(Vec::new());
        assert_ne!(raw, 0);

        table.with(raw, |v| v.push(1)).unwrap();
        assert_eq!(table.with(raw, |v| v.len()).unwrap(), 1);

        assert!(table.remove(raw));
        assert_eq!(table.with(raw, |v| v.len()), Err(CodecError::InvalidHandle));
    }

    #[test]
    fn test_pop_packet_keeps_oversized_packet() {
        let mut packets = VecDeque::from(vec![Bytes::from_static(&[1, 2, 3, 4])]);
        let mut small = [0u8; 2];
        assert!(matches!(
            pop_packet(&mut packets, &mut small),
            Err(CodecError::Failed(_))
        ));
        assert_eq!(packets.len(), 1);

        let mut out = [0u8; 8];
        assert_eq!(pop_packet(&mut packets, &mut out), Ok(4));
        assert_eq!(&out[..4], &[1, 2, 3, 4]);
        assert_eq!(pop_packet(&mut packets, &mut out), Err(CodecError::NoData));
    }

    #[test]
    fn test_drain_pcm_pads_underrun() {
        let mut pcm = VecDeque::from(vec![0.5, 0.25]);
        let mut out = [1.0f32; 4];
        assert_eq!(drain_pcm(&mut pcm, &mut out), Decoded::AUDIO);
        assert_eq!(out, [0.5, 0.25, 0.0, 0.0]);

        assert_eq!(drain_pcm(&mut pcm, &mut out), Decoded::SILENCE);
        assert_eq!(out, [0.0; 4]);
    }
}
