//! Shared playback stream
//!
//! One decoded stream, many listeners reading at their own pace. Every
//! reader owns a [`ReaderCursor`] into the stream's [`PlaybackRingBuffer`].
//! Readers that find enough cached samples copy them out under the ring
//! buffer's lock only. Readers that run dry serialize on a separate origin
//! lock, and only the first of them calls into the decoder; the rest find
//! the freshly cached block once they get the lock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::buffer::PlaybackRingBuffer;
use crate::codec::{Decoded, DecoderCodec};
use crate::config::PlaybackConfig;
use crate::error::{BufferError, CodecError, Result};
use crate::handle::DecoderHandle;

/// Where a stream gets new samples from on a cache miss
pub trait DecodeSource: Send + Sync {
    fn pop(&self, out: &mut [f32]) -> std::result::Result<Decoded, CodecError>;
}

impl<F> DecodeSource for F
where
    F: Fn(&mut [f32]) -> std::result::Result<Decoded, CodecError> + Send + Sync,
{
    fn pop(&self, out: &mut [f32]) -> std::result::Result<Decoded, CodecError> {
        self(out)
    }
}

/// A codec decoder used as the origin of a stream
pub struct DecoderSource {
    codec: Arc<dyn DecoderCodec>,
    decoder: DecoderHandle,
}

impl DecoderSource {
    pub fn new(codec: Arc<dyn DecoderCodec>, decoder: DecoderHandle) -> Self {
        Self { codec, decoder }
    }

    pub fn decoder(&self) -> DecoderHandle {
        self.decoder
    }
}

impl DecodeSource for DecoderSource {
    fn pop(&self, out: &mut [f32]) -> std::result::Result<Decoded, CodecError> {
        self.codec.decoder_pop(self.decoder, out)
    }
}

/// Receives every freshly decoded block
pub trait PlaybackListener: Send + Sync {
    fn on_decoded(&self, samples: &[f32], channels: u16);
}

/// Position of one reader in a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReaderCursor(u64);

impl ReaderCursor {
    pub const fn at(position: u64) -> Self {
        Self(position)
    }

    pub const fn position(self) -> u64 {
        self.0
    }
}

struct OriginState {
    /// Decode target, reused between misses
    scratch: Vec<f32>,
}

/// Ring-buffered decoded stream with a serialized origin
pub struct PlaybackStream {
    cache: PlaybackRingBuffer,
    origin: Mutex<OriginState>,
    source: Arc<dyn DecodeSource>,
    listeners: Mutex<Vec<Weak<dyn PlaybackListener>>>,
    channels: u16,
    latest_block_start: AtomicU64,
    last_silent: AtomicBool,
    decode_calls: AtomicU64,
}

impl PlaybackStream {
    pub fn new(
        source: Arc<dyn DecodeSource>,
        capacity: usize,
        channels: u16,
    ) -> std::result::Result<Self, BufferError> {
        Ok(Self {
            cache: PlaybackRingBuffer::new(capacity)?,
            origin: Mutex::new(OriginState {
                scratch: Vec::with_capacity(capacity),
            }),
            source,
            listeners: Mutex::new(Vec::new()),
            channels,
            latest_block_start: AtomicU64::new(0),
            last_silent: AtomicBool::new(true),
            decode_calls: AtomicU64::new(0),
        })
    }

    /// Stream decoding from `decoder`, sized from `config`
    pub fn for_decoder(
        codec: Arc<dyn DecoderCodec>,
        decoder: DecoderHandle,
        config: &PlaybackConfig,
    ) -> std::result::Result<Self, BufferError> {
        Self::new(
            Arc::new(DecoderSource::new(codec, decoder)),
            config.cache_capacity(),
            config.channels,
        )
    }

    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of times the origin has been asked to decode
    pub fn decode_calls(&self) -> u64 {
        self.decode_calls.load(Ordering::Relaxed)
    }

    /// Cursor at the oldest sample still cached
    pub fn attach_reader(&self) -> ReaderCursor {
        let write = self.cache.write_cursor();
        ReaderCursor(write.saturating_sub(self.cache.capacity() as u64))
    }

    /// Cursor at the start of the most recently decoded block
    pub fn attach_reader_latest(&self) -> ReaderCursor {
        ReaderCursor(self.latest_block_start())
    }

    pub fn latest_block_start(&self) -> u64 {
        self.latest_block_start.load(Ordering::Acquire)
    }

    pub fn available_samples(&self, cursor: &ReaderCursor) -> usize {
        self.cache.available_samples(cursor.0)
    }

    /// Fill `out` for the reader at `cursor` and advance it by `out.len()`
    ///
    /// Cache hits report the status of the last successful decode. On a
    /// decode failure `out` is zeroed and `cursor` stays where it was.
    pub fn read_data(&self, cursor: &mut ReaderCursor, out: &mut [f32]) -> Result<Decoded> {
        let count = out.len();
        let capacity = self.cache.capacity();
        if count > capacity {
            tracing::error!(
                requested = count,
                capacity,
                "Playback read larger than the cache, aborting"
            );
            out.fill(0.0);
            return Err(BufferError::CapacityExceeded {
                requested: count,
                capacity,
            }
            .into());
        }

        if self.cache.available_samples(cursor.0) >= count {
            cursor.0 = self.cache.read(cursor.0, out)?;
            return Ok(self.last_decoded());
        }

        let mut origin = self.origin.lock();

        // another reader may have decoded while we waited
        if self.cache.available_samples(cursor.0) >= count {
            drop(origin);
            cursor.0 = self.cache.read(cursor.0, out)?;
            return Ok(self.last_decoded());
        }

        origin.scratch.resize(count, 0.0);
        let block = &mut origin.scratch[..count];
        self.decode_calls.fetch_add(1, Ordering::Relaxed);
        let decoded = match self.source.pop(block) {
            Ok(decoded) => decoded,
            Err(e) => {
                out.fill(0.0);
                return Err(e.into());
            }
        };

        let block_start = self.cache.write_cursor();
        cursor.0 = self.cache.read_and_extend(cursor.0, out, block);
        self.latest_block_start.store(block_start, Ordering::Release);
        self.last_silent.store(decoded.is_silent, Ordering::Release);

        self.notify(block);
        Ok(decoded)
    }

    fn last_decoded(&self) -> Decoded {
        Decoded {
            is_silent: self.last_silent.load(Ordering::Acquire),
        }
    }

    /// Register `listener` without keeping it alive
    pub fn add_listener<L: PlaybackListener + 'static>(&self, listener: &Arc<L>) {
        let weak: Weak<dyn PlaybackListener> = Arc::downgrade(listener) as Weak<dyn PlaybackListener>;
        self.listeners.lock().push(weak);
    }

    pub fn remove_listener<L: PlaybackListener + 'static>(&self, listener: &Arc<L>) {
        let target = Arc::as_ptr(listener) as *const ();
        self.listeners
            .lock()
            .retain(|weak| weak.as_ptr() as *const () != target);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().iter().filter(|w| w.strong_count() > 0).count()
    }

    fn notify(&self, block: &[f32]) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|weak| match weak.upgrade() {
            Some(listener) => {
                listener.on_decoded(block, self.channels);
                true
            }
            None => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    /// Origin producing a rising ramp and counting its calls
    struct RampSource {
        next: AtomicU64,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl RampSource {
        fn new() -> Self {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                next: AtomicU64::new(0),
                calls: AtomicUsize::new(0),
                delay,
            }
        }
    }

    impl DecodeSource for RampSource {
        fn pop(&self, out: &mut [f32]) -> std::result::Result<Decoded, CodecError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                thread::sleep(self.delay);
            }
            let start = self.next.fetch_add(out.len() as u64, Ordering::SeqCst);
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = (start + i as u64) as f32;
            }
            Ok(Decoded::AUDIO)
        }
    }

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_second_reader_hits_cache() {
        let source = Arc::new(RampSource::new());
        let stream = PlaybackStream::new(source.clone(), 1920, 1).unwrap();

        let mut a = ReaderCursor::default();
        let mut b = ReaderCursor::default();
        let mut out_a = vec![0.0; 960];
        let mut out_b = vec![0.0; 960];

        assert_eq!(stream.read_data(&mut a, &mut out_a).unwrap(), Decoded::AUDIO);
        assert_eq!(a.position(), 960);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);

        assert_eq!(stream.read_data(&mut b, &mut out_b).unwrap(), Decoded::AUDIO);
        assert_eq!(b.position(), 960);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(out_a, out_b);
        assert_eq!(out_a, ramp(0, 960));
    }

    #[test]
    fn test_partial_miss_is_gap_free() {
        let source = Arc::new(RampSource::new());
        let stream = PlaybackStream::new(source.clone(), 16, 1).unwrap();

        let mut fast = ReaderCursor::default();
        let mut slow = ReaderCursor::default();
        let mut out = vec![0.0; 4];
        stream.read_data(&mut fast, &mut out).unwrap();

        let mut first = vec![0.0; 2];
        stream.read_data(&mut slow, &mut first).unwrap();
        assert_eq!(first, ramp(0, 2));

        // two samples still cached, the other two come from a fresh decode
        let mut second = vec![0.0; 4];
        stream.read_data(&mut slow, &mut second).unwrap();
        assert_eq!(second, ramp(2, 4));
        assert_eq!(slow.position(), 6);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);

        // the fast reader continues straight into the new block
        stream.read_data(&mut fast, &mut out).unwrap();
        assert_eq!(out, ramp(4, 4));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_concurrent_misses_decode_once() {
        const READERS: usize = 8;
        let source = Arc::new(RampSource::with_delay(Duration::from_millis(20)));
        let stream = Arc::new(PlaybackStream::new(source.clone(), 1920, 1).unwrap());
        let barrier = Arc::new(Barrier::new(READERS));

        let workers: Vec<_> = (0..READERS)
            .map(|_| {
                let stream = stream.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    let mut cursor = ReaderCursor::default();
                    let mut out = vec![0.0; 960];
                    barrier.wait();
                    stream.read_data(&mut cursor, &mut out).unwrap();
                    (cursor, out)
                })
            })
            .collect();

        for worker in workers {
            let (cursor, out) = worker.join().unwrap();
            assert_eq!(cursor.position(), 960);
            assert_eq!(out, ramp(0, 960));
        }
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.decode_calls(), 1);
    }

    #[test]
    fn test_failed_decode_zeroes_and_holds_cursor() {
        let stream = PlaybackStream::new(
            Arc::new(|_: &mut [f32]| -> std::result::Result<Decoded, CodecError> {
                Err(CodecError::failed("corrupt frame"))
            }),
            64,
            1,
        )
        .unwrap();

        let mut cursor = ReaderCursor::default();
        let mut out = vec![1.0; 32];
        let err = stream.read_data(&mut cursor, &mut out).unwrap_err();
        assert!(matches!(err, crate::Error::Codec(CodecError::Failed(_))));
        assert_eq!(cursor.position(), 0);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_oversized_read_rejected() {
        let source = Arc::new(RampSource::new());
        let stream = PlaybackStream::new(source.clone(), 8, 1).unwrap();
        let mut cursor = ReaderCursor::default();
        let mut out = vec![0.0; 9];

        let err = stream.read_data(&mut cursor, &mut out).unwrap_err();
        assert!(matches!(err, crate::Error::Buffer(BufferError::CapacityExceeded { .. })));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_silence_flag_follows_last_decode() {
        let stream = PlaybackStream::new(
            Arc::new(|out: &mut [f32]| -> std::result::Result<Decoded, CodecError> {
                out.fill(0.0);
                Ok(Decoded::SILENCE)
            }),
            8,
            1,
        )
        .unwrap();

        let mut a = ReaderCursor::default();
        let mut b = ReaderCursor::default();
        let mut out = vec![0.0; 4];
        assert_eq!(stream.read_data(&mut a, &mut out).unwrap(), Decoded::SILENCE);
        assert_eq!(stream.read_data(&mut b, &mut out).unwrap(), Decoded::SILENCE);
    }

    struct CountingListener {
        blocks: AtomicUsize,
        samples: AtomicUsize,
    }

    impl PlaybackListener for CountingListener {
        fn on_decoded(&self, samples: &[f32], _channels: u16) {
            self.blocks.fetch_add(1, Ordering::SeqCst);
            self.samples.fetch_add(samples.len(), Ordering::SeqCst);
        }
    }

    #[test]
    fn test_listeners_see_each_block_once() {
        let source = Arc::new(RampSource::new());
        let stream = PlaybackStream::new(source, 64, 1).unwrap();
        let listener = Arc::new(CountingListener {
            blocks: AtomicUsize::new(0),
            samples: AtomicUsize::new(0),
        });
        stream.add_listener(&listener);

        let mut a = ReaderCursor::default();
        let mut b = ReaderCursor::default();
        let mut out = vec![0.0; 16];
        stream.read_data(&mut a, &mut out).unwrap();
        stream.read_data(&mut b, &mut out).unwrap();
        assert_eq!(listener.blocks.load(Ordering::SeqCst), 1);
        assert_eq!(listener.samples.load(Ordering::SeqCst), 16);

        stream.remove_listener(&listener);
        stream.read_data(&mut a, &mut out).unwrap();
        assert_eq!(listener.blocks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_listener_is_forgotten() {
        let source = Arc::new(RampSource::new());
        let stream = PlaybackStream::new(source, 64, 1).unwrap();
        let listener = Arc::new(CountingListener {
            blocks: AtomicUsize::new(0),
            samples: AtomicUsize::new(0),
        });
        stream.add_listener(&listener);
        assert_eq!(stream.listener_count(), 1);

        drop(listener);
        let mut cursor = ReaderCursor::default();
        let mut out = vec![0.0; 8];
        stream.read_data(&mut cursor, &mut out).unwrap();
        assert_eq!(stream.listener_count(), 0);
    }

    #[test]
    fn test_late_joiner_starts_at_latest_block() {
        let source = Arc::new(RampSource::new());
        let stream = PlaybackStream::new(source, 32, 1).unwrap();
        let mut first = ReaderCursor::default();
        let mut out = vec![0.0; 8];
        stream.read_data(&mut first, &mut out).unwrap();
        stream.read_data(&mut first, &mut out).unwrap();

        assert_eq!(stream.latest_block_start(), 8);
        let mut late = stream.attach_reader_latest();
        stream.read_data(&mut late, &mut out).unwrap();
        assert_eq!(out, ramp(8, 8));
        assert_eq!(stream.attach_reader().position(), 0);
    }
}
