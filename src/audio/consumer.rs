//! Render callback adapter
//!
//! Wraps one reader of a [`PlaybackStream`] for an audio output callback.
//! The callback always gets a completely filled buffer; decode problems turn
//! into silence and a log line.

use std::sync::Arc;

use super::playback::{PlaybackStream, ReaderCursor};
use crate::config::PlaybackConfig;
use crate::error::{Error, Severity};

/// One speaker-side consumer of a shared stream
pub struct PlaybackConsumer {
    stream: Option<Arc<PlaybackStream>>,
    cursor: ReaderCursor,
    desired_samples: usize,
    rendered_samples: u64,
    silent_renders: u64,
}

impl PlaybackConsumer {
    /// Attach to `stream` at its most recent block
    pub fn new(stream: Arc<PlaybackStream>, config: &PlaybackConfig) -> Self {
        let cursor = stream.attach_reader_latest();
        Self {
            stream: Some(stream),
            cursor,
            desired_samples: config.samples_per_callback(),
            rendered_samples: 0,
            silent_renders: 0,
        }
    }

    /// Samples the output device should request per callback
    pub fn desired_samples_per_callback(&self) -> usize {
        self.desired_samples
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    pub fn cursor(&self) -> ReaderCursor {
        self.cursor
    }

    /// Stop reading; every later render is silence
    pub fn detach(&mut self) {
        if self.stream.take().is_some() {
            tracing::debug!(cursor = self.cursor.position(), "Playback consumer detached");
        }
    }

    /// Fill `out` completely, returning how many samples carry audio
    pub fn render(&mut self, out: &mut [f32]) -> usize {
        self.rendered_samples += out.len() as u64;
        let Some(stream) = self.stream.clone() else {
            out.fill(0.0);
            self.silent_renders += 1;
            return 0;
        };

        let mut audible = 0;
        let chunk_len = stream.capacity();
        let mut offset = 0;
        while offset < out.len() {
            let end = (offset + chunk_len).min(out.len());
            let chunk = &mut out[offset..end];
            match stream.read_data(&mut self.cursor, chunk) {
                Ok(decoded) if !decoded.is_silent => audible += end - offset,
                Ok(_) => {}
                Err(Error::Codec(e)) => match e.severity() {
                    Severity::Expected => tracing::trace!("Playback underrun"),
                    Severity::Teardown => {
                        tracing::debug!("Decoder handle gone, rendering silence from now on");
                        self.detach();
                        out[offset..].fill(0.0);
                        break;
                    }
                    Severity::Hard => {
                        tracing::error!(error = %e, "Failed to decode playback audio")
                    }
                },
                Err(e) => {
                    chunk.fill(0.0);
                    tracing::error!(error = %e, "Failed to read playback audio");
                }
            }
            offset = end;
        }

        if audible == 0 {
            self.silent_renders += 1;
        }
        audible
    }

    /// Total samples requested by the output so far
    pub fn rendered_samples(&self) -> u64 {
        self.rendered_samples
    }

    /// Renders that produced no audible samples
    pub fn silent_renders(&self) -> u64 {
        self.silent_renders
    }
}
