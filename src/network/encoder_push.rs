//! Capture to encoder to network
//!
//! Capture callbacks enqueue [`AudioFrame`]s through an [`EncoderPushHandle`].
//! Each pass of the worker:
//!
//! 1. prunes links whose room the oracle reports dead,
//! 2. copies the link map once,
//! 3. pushes every queued frame whose encoder is in that copy,
//! 4. pops every linked encoder until it runs dry and sends each packet.
//!
//! Codec and network failures are logged and never leave the worker.

use crossbeam::queue::SegQueue;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::worker::{wake_channel, Wakeup, WorkerThread};
use super::{AudioFrame, DatagramTransport};
use crate::codec::EncoderCodec;
use crate::config::WorkerConfig;
use crate::error::{CodecError, NetworkError, Severity, WorkerError};
use crate::handle::{EncoderHandle, RoomHandle};
use crate::registry::EncoderLinks;

const DEFAULT_THREAD_NAME: &str = "voice-encoder-push";

/// Counters of the encoder push worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderPushStats {
    /// Frames handed to `encoder_push` without error
    pub frames_pushed: u64,
    /// Frames discarded because their encoder was null or not linked
    pub frames_dropped: u64,
    pub packets_sent: u64,
    /// Packets popped for a room that went away before they could be sent
    pub packets_discarded: u64,
    pub send_errors: u64,
    pub codec_errors: u64,
    pub passes: u64,
}

#[derive(Default)]
struct Counters {
    frames_pushed: AtomicU64,
    frames_dropped: AtomicU64,
    packets_sent: AtomicU64,
    packets_discarded: AtomicU64,
    send_errors: AtomicU64,
    codec_errors: AtomicU64,
    passes: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EncoderPushStats {
        EncoderPushStats {
            frames_pushed: self.frames_pushed.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            packets_discarded: self.packets_discarded.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }
}

/// State shared between the worker thread and its handles
pub(crate) struct EncoderPush {
    codec: Arc<dyn EncoderCodec>,
    transport: Arc<dyn DatagramTransport>,
    links: Arc<EncoderLinks>,
    frames: SegQueue<AudioFrame>,
    max_datagram_size: usize,
    counters: Counters,
}

impl EncoderPush {
    pub(crate) fn new(
        codec: Arc<dyn EncoderCodec>,
        transport: Arc<dyn DatagramTransport>,
        links: Arc<EncoderLinks>,
        max_datagram_size: usize,
    ) -> Self {
        Self {
            codec,
            transport,
            links,
            frames: SegQueue::new(),
            max_datagram_size,
            counters: Counters::default(),
        }
    }

    /// Queue `samples` for `encoder`; returns whether the frame was accepted
    pub(crate) fn enqueue(&self, encoder: EncoderHandle, samples: &[f32]) -> bool {
        if encoder.is_null() {
            tracing::warn!("Dropping captured audio for a null encoder");
            Counters::bump(&self.counters.frames_dropped);
            return false;
        }
        if samples.is_empty() {
            return false;
        }
        self.frames.push(AudioFrame::new(encoder, samples.to_vec()));
        true
    }

    pub(crate) fn queued_frames(&self) -> usize {
        self.frames.len()
    }

    /// One complete pass over the frame queue and every linked encoder
    ///
    /// `packet` receives popped packets and must hold `max_datagram_size` bytes.
    /// The pass stops early once `running` is cleared; what it leaves queued
    /// is discarded by the stopping worker.
    pub(crate) fn run_pass(&self, packet: &mut [u8], running: &AtomicBool) {
        Counters::bump(&self.counters.passes);

        let pruned = self.links.prune();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned encoder links before pass");
        }
        let links = self.links.snapshot();

        // encoders whose handle went away during this pass
        let mut gone: HashSet<EncoderHandle> = HashSet::new();

        for _ in 0..self.frames.len() {
            if !running.load(Ordering::Acquire) {
                return;
            }
            let Some(frame) = self.frames.pop() else {
                break;
            };
            if !links.contains_key(&frame.encoder) || gone.contains(&frame.encoder) {
                tracing::trace!(encoder = ?frame.encoder, "Dropping audio for unlinked encoder");
                Counters::bump(&self.counters.frames_dropped);
                continue;
            }
            match self.codec.encoder_push(frame.encoder, &frame.samples) {
                Ok(()) => Counters::bump(&self.counters.frames_pushed),
                Err(e) => {
                    if self.report_codec_error(frame.encoder, "push", &e) {
                        gone.insert(frame.encoder);
                    }
                }
            }
        }

        for (&encoder, &room) in &links {
            if !running.load(Ordering::Acquire) {
                return;
            }
            if gone.contains(&encoder) {
                continue;
            }
            self.pop_encoder(encoder, room, packet, running);
        }
    }

    fn pop_encoder(
        &self,
        encoder: EncoderHandle,
        room: RoomHandle,
        packet: &mut [u8],
        running: &AtomicBool,
    ) {
        while running.load(Ordering::Acquire) {
            let len = match self.codec.encoder_pop(encoder, packet) {
                Ok(len) => len,
                Err(CodecError::NoData) => break,
                Err(e) => {
                    self.report_codec_error(encoder, "pop", &e);
                    break;
                }
            };

            // a codec claiming more than the buffer holds is broken
            let Some(datagram) = packet.get(..len) else {
                let error = NetworkError::PacketTooLarge(len);
                tracing::error!(
                    ?encoder,
                    capacity = packet.len(),
                    error = %error,
                    "Encoder reported a packet larger than the pop buffer"
                );
                Counters::bump(&self.counters.codec_errors);
                break;
            };

            match self.send(room, datagram) {
                Ok(()) => Counters::bump(&self.counters.packets_sent),
                Err(NetworkError::InvalidRoom) => {
                    tracing::trace!(?encoder, ?room, "Room went away, discarding encoded packet");
                    Counters::bump(&self.counters.packets_discarded);
                }
                Err(e) => {
                    tracing::error!(?encoder, ?room, error = %e, "Failed to send encoded audio");
                    Counters::bump(&self.counters.send_errors);
                }
            }
        }
    }

    /// Send one packet unless its room died since the snapshot
    fn send(&self, room: RoomHandle, datagram: &[u8]) -> Result<(), NetworkError> {
        if !self.links.is_room_valid(room) {
            return Err(NetworkError::InvalidRoom);
        }
        self.transport.send_datagram(room, datagram)
    }

    /// Log a codec failure at its severity; true if the handle is gone
    fn report_codec_error(&self, encoder: EncoderHandle, op: &str, error: &CodecError) -> bool {
        match error.severity() {
            Severity::Expected => false,
            Severity::Teardown => {
                tracing::debug!(?encoder, op, "Encoder handle invalid, skipping for this pass");
                true
            }
            Severity::Hard => {
                tracing::error!(?encoder, op, error = %error, "Encoder call failed");
                Counters::bump(&self.counters.codec_errors);
                false
            }
        }
    }

    /// Throw away everything still queued, returning how much was dropped
    fn discard_queued(&self) -> usize {
        let mut dropped = 0;
        while self.frames.pop().is_some() {
            dropped += 1;
        }
        dropped
    }

    fn stats(&self) -> EncoderPushStats {
        self.counters.snapshot()
    }
}

/// Cloneable entry point for capture callbacks and link management
#[derive(Clone)]
pub struct EncoderPushHandle {
    shared: Arc<EncoderPush>,
    wakeup: Wakeup,
}

impl EncoderPushHandle {
    /// Queue captured interleaved PCM for `encoder` and wake the worker
    ///
    /// Never blocks. Audio for encoders that are not linked when the worker
    /// gets to it is dropped.
    pub fn push_audio_to_encoder(&self, encoder: EncoderHandle, samples: &[f32]) {
        if self.shared.enqueue(encoder, samples) {
            self.wakeup.notify();
        }
    }

    pub fn link_encoder(&self, encoder: EncoderHandle, room: RoomHandle) -> bool {
        self.shared.links.link(encoder, room)
    }

    pub fn unlink_encoder(&self, encoder: EncoderHandle) -> bool {
        self.shared.links.unlink(encoder)
    }

    /// Run a pass now instead of waiting for the interval
    pub fn wake(&self) {
        self.wakeup.notify();
    }

    pub fn stats(&self) -> EncoderPushStats {
        self.shared.stats()
    }
}

/// Owner of the encoder push thread
pub struct EncoderPushWorker {
    handle: EncoderPushHandle,
    thread: WorkerThread,
}

impl EncoderPushWorker {
    /// Start the worker thread
    pub fn spawn(
        codec: Arc<dyn EncoderCodec>,
        transport: Arc<dyn DatagramTransport>,
        links: Arc<EncoderLinks>,
        config: &WorkerConfig,
        max_datagram_size: usize,
    ) -> Result<Self, WorkerError> {
        let shared = Arc::new(EncoderPush::new(codec, transport, links, max_datagram_size));
        let (wakeup, wake_rx) = wake_channel();

        let pass_state = shared.clone();
        let mut packet = vec![0u8; max_datagram_size];
        let thread = WorkerThread::spawn(
            config.thread_name_or(DEFAULT_THREAD_NAME),
            config.wake_interval(),
            wakeup.clone(),
            wake_rx,
            move |running| pass_state.run_pass(&mut packet, running),
        )?;

        tracing::info!(
            interval_ms = config.wake_interval_ms,
            max_datagram_size,
            "Encoder push worker started"
        );
        Ok(Self {
            handle: EncoderPushHandle { shared, wakeup },
            thread,
        })
    }

    pub fn handle(&self) -> EncoderPushHandle {
        self.handle.clone()
    }

    pub fn push_audio_to_encoder(&self, encoder: EncoderHandle, samples: &[f32]) {
        self.handle.push_audio_to_encoder(encoder, samples);
    }

    pub fn link_encoder(&self, encoder: EncoderHandle, room: RoomHandle) -> bool {
        self.handle.link_encoder(encoder, room)
    }

    pub fn unlink_encoder(&self, encoder: EncoderHandle) -> bool {
        self.handle.unlink_encoder(encoder)
    }

    pub fn stats(&self) -> EncoderPushStats {
        self.handle.stats()
    }

    pub fn queued_frames(&self) -> usize {
        self.handle.shared.queued_frames()
    }

    pub fn max_datagram_size(&self) -> usize {
        self.handle.shared.max_datagram_size
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Stop the thread, discarding queued audio and clearing every link
    pub fn stop(&mut self) -> Result<(), WorkerError> {
        self.thread.stop()?;
        let dropped = self.handle.shared.discard_queued();
        self.handle.shared.links.clear();
        tracing::info!(dropped, "Encoder push worker stopped");
        Ok(())
    }
}

impl Drop for EncoderPushWorker {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
