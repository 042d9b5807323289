//! Circular sample cache shared by many playback readers
//!
//! There is a single writer cursor and any number of reader cursors. All
//! cursors are absolute sample positions that only ever grow; the storage
//! slot of a position is `position % capacity`. A reader that falls more
//! than `capacity` samples behind is moved up to the oldest sample still
//! held, which loses audio but is not an error.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::BufferError;

struct RingStorage {
    samples: Vec<f32>,
}

impl RingStorage {
    /// Copy `data` in at `position`, wrapping at most once
    fn copy_in(&mut self, position: u64, data: &[f32]) {
        let capacity = self.samples.len();
        let start = (position % capacity as u64) as usize;
        let first = data.len().min(capacity - start);
        self.samples[start..start + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.samples[..rest].copy_from_slice(&data[first..]);
        }
    }

    /// Copy `out.len()` samples starting at `position` into `out`
    fn copy_out(&self, position: u64, out: &mut [f32]) {
        let capacity = self.samples.len();
        let start = (position % capacity as u64) as usize;
        let first = out.len().min(capacity - start);
        out[..first].copy_from_slice(&self.samples[start..start + first]);
        let rest = out.len() - first;
        if rest > 0 {
            out[first..].copy_from_slice(&self.samples[..rest]);
        }
    }
}

/// Fixed-capacity ring of `f32` samples
pub struct PlaybackRingBuffer {
    storage: Mutex<RingStorage>,
    /// Mirrors the write position so availability checks skip the lock
    write_cursor: AtomicU64,
    capacity: usize,
}

impl PlaybackRingBuffer {
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        Ok(Self {
            storage: Mutex::new(RingStorage {
                samples: vec![0.0; capacity],
            }),
            write_cursor: AtomicU64::new(0),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total samples written since creation
    pub fn write_cursor(&self) -> u64 {
        self.write_cursor.load(Ordering::Acquire)
    }

    fn check_len(&self, requested: usize, op: &str) -> Result<(), BufferError> {
        if requested > self.capacity {
            tracing::error!(
                requested,
                capacity = self.capacity,
                "Tried to {op} more samples than the ring buffer holds, aborting"
            );
            return Err(BufferError::CapacityExceeded {
                requested,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Move `reader` into the window of samples still held
    fn clamp_reader(&self, reader: u64, write: u64) -> u64 {
        if reader > write {
            tracing::error!(reader, write, "Reader cursor is ahead of the writer");
            return write;
        }
        let oldest = write.saturating_sub(self.capacity as u64);
        if reader < oldest {
            tracing::trace!(reader, oldest, "Reader fell behind, skipping ahead");
            return oldest;
        }
        reader
    }

    /// Append `data`, returning the new write cursor
    ///
    /// Writes larger than the capacity are rejected and leave the buffer untouched.
    pub fn write(&self, data: &[f32]) -> Result<u64, BufferError> {
        self.check_len(data.len(), "write")?;

        let mut storage = self.storage.lock();
        let write = self.write_cursor.load(Ordering::Acquire);
        storage.copy_in(write, data);
        let new_write = write + data.len() as u64;
        self.write_cursor.store(new_write, Ordering::Release);
        Ok(new_write)
    }

    /// Copy `out.len()` samples starting at `reader` into `out`
    ///
    /// This is a plain copy: it does not check that the samples were ever
    /// written. Returns the advanced reader cursor.
    pub fn read(&self, reader: u64, out: &mut [f32]) -> Result<u64, BufferError> {
        self.check_len(out.len(), "read")?;

        let storage = self.storage.lock();
        let reader = self.clamp_reader(reader, self.write_cursor.load(Ordering::Acquire));
        storage.copy_out(reader, out);
        Ok(reader + out.len() as u64)
    }

    /// Samples `reader` can read without new data, at most `capacity`
    pub fn available_samples(&self, reader: u64) -> usize {
        let write = self.write_cursor.load(Ordering::Acquire);
        if reader > write {
            return 0;
        }
        (write - reader).min(self.capacity as u64) as usize
    }

    /// Hand `reader` its remaining cached samples followed by the head of
    /// `block`, then append all of `block`
    ///
    /// `out` and `block` have the same length. Returns the reader cursor
    /// advanced by `out.len()`.
    pub(crate) fn read_and_extend(&self, reader: u64, out: &mut [f32], block: &[f32]) -> u64 {
        debug_assert_eq!(out.len(), block.len());

        let mut storage = self.storage.lock();
        let write = self.write_cursor.load(Ordering::Acquire);
        let reader = self.clamp_reader(reader, write);
        let cached = ((write - reader) as usize).min(out.len());

        storage.copy_out(reader, &mut out[..cached]);
        let fresh = out.len() - cached;
        out[cached..].copy_from_slice(&block[..fresh]);

        storage.copy_in(write, block);
        self.write_cursor
            .store(write + block.len() as u64, Ordering::Release);
        reader + out.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ramp(start: usize, len: usize) -> Vec<f32> {
        (start..start + len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(
            PlaybackRingBuffer::new(0),
            Err(BufferError::ZeroCapacity)
        ));
    }

    #[test]
    fn test_write_wraps_around() {
        let buffer = PlaybackRingBuffer::new(8).unwrap();
        buffer.write(&ramp(0, 6)).unwrap();
        assert_eq!(buffer.write(&ramp(6, 4)).unwrap(), 10);

        // samples 2..10 are still held, 8 and 9 wrapped to slots 0 and 1
        let mut out = vec![0.0; 8];
        assert_eq!(buffer.read(2, &mut out).unwrap(), 10);
        assert_eq!(out, ramp(2, 8));
    }

    #[test]
    fn test_oversized_write_leaves_buffer_untouched() {
        let buffer = PlaybackRingBuffer::new(4).unwrap();
        buffer.write(&[1.0, 2.0]).unwrap();

        let err = buffer.write(&[9.0; 5]).unwrap_err();
        assert_eq!(
            err,
            BufferError::CapacityExceeded {
                requested: 5,
                capacity: 4
            }
        );
        assert_eq!(buffer.write_cursor(), 2);

        let mut out = [0.0; 2];
        buffer.read(0, &mut out).unwrap();
        assert_eq!(out, [1.0, 2.0]);
    }

    #[test]
    fn test_oversized_read_rejected() {
        let buffer = PlaybackRingBuffer::new(4).unwrap();
        let mut out = [0.0; 5];
        assert!(buffer.read(0, &mut out).is_err());
    }

    #[test]
    fn test_lagging_reader_skips_to_oldest() {
        let buffer = PlaybackRingBuffer::new(4).unwrap();
        buffer.write(&ramp(0, 4)).unwrap();
        buffer.write(&ramp(4, 4)).unwrap();
        assert_eq!(buffer.available_samples(0), 4);

        let mut out = [0.0; 2];
        let next = buffer.read(0, &mut out).unwrap();
        assert_eq!(out, [4.0, 5.0]);
        assert_eq!(next, 6);
    }

    #[test]
    fn test_read_and_extend_keeps_reader_gap_free() {
        let buffer = PlaybackRingBuffer::new(8).unwrap();
        buffer.write(&ramp(0, 3)).unwrap();

        // reader at 1 still has samples 1 and 2 cached
        let mut out = vec![0.0; 4];
        let next = buffer.read_and_extend(1, &mut out, &ramp(3, 4));
        assert_eq!(out, ramp(1, 4));
        assert_eq!(next, 5);
        assert_eq!(buffer.write_cursor(), 7);
        assert_eq!(buffer.available_samples(next), 2);
    }

    proptest! {
        #[test]
        fn prop_write_then_read_returns_same_samples(
            capacity in 1usize..512,
            prefill in 0usize..2048,
            data in proptest::collection::vec(-1.0f32..1.0, 1..512),
        ) {
            prop_assume!(data.len() <= capacity);
            let buffer = PlaybackRingBuffer::new(capacity).unwrap();
            for chunk in vec![0.5f32; prefill].chunks(capacity) {
                buffer.write(chunk).unwrap();
            }

            let reader = buffer.write_cursor();
            buffer.write(&data).unwrap();

            let mut out = vec![0.0; data.len()];
            let next = buffer.read(reader, &mut out).unwrap();
            prop_assert_eq!(out, data.clone());
            prop_assert_eq!(next, reader + data.len() as u64);
        }

        #[test]
        fn prop_available_tracks_written_samples(
            capacity in 1usize..256,
            writes in proptest::collection::vec(0usize..256, 0..16),
        ) {
            let buffer = PlaybackRingBuffer::new(capacity).unwrap();
            let reader = buffer.write_cursor();
            let mut total = 0usize;
            for len in writes {
                let len = len.min(capacity);
                buffer.write(&vec![0.0; len]).unwrap();
                total += len;
                prop_assert_eq!(buffer.available_samples(reader), total.min(capacity));
            }
        }
    }
}
