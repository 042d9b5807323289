//! Playback side: shared decoded streams and their readers

pub mod buffer;
pub mod consumer;
pub mod playback;

pub use buffer::PlaybackRingBuffer;
pub use consumer::PlaybackConsumer;
pub use playback::{DecodeSource, DecoderSource, PlaybackListener, PlaybackStream, ReaderCursor};
