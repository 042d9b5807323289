//! Network to decoders
//!
//! The room layer hands every inbound datagram to a [`DecoderDispatchHandle`]
//! from its own thread. The worker later pushes each one into every decoder
//! registered for the sending (room, peer), at most once per decoder.

use bytes::Bytes;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::worker::{wake_channel, Wakeup, WorkerThread};
use super::DatagramEvent;
use crate::codec::DecoderCodec;
use crate::config::WorkerConfig;
use crate::error::{CodecError, Severity, WorkerError};
use crate::handle::{ChannelMask, DecoderHandle, PeerId, RoomHandle, SsrcId};
use crate::registry::DecoderLinks;

const DEFAULT_THREAD_NAME: &str = "voice-datagram-dispatch";

/// Counters of the datagram dispatch worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderDispatchStats {
    /// Datagrams that had at least one registered decoder
    pub datagrams_delivered: u64,
    /// Datagrams with no decoder or a dead room
    pub datagrams_dropped: u64,
    /// Successful `decoder_push` calls
    pub decoder_pushes: u64,
    pub codec_errors: u64,
    pub passes: u64,
}

#[derive(Default)]
struct Counters {
    datagrams_delivered: AtomicU64,
    datagrams_dropped: AtomicU64,
    decoder_pushes: AtomicU64,
    codec_errors: AtomicU64,
    passes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DecoderDispatchStats {
        DecoderDispatchStats {
            datagrams_delivered: self.datagrams_delivered.load(Ordering::Relaxed),
            datagrams_dropped: self.datagrams_dropped.load(Ordering::Relaxed),
            decoder_pushes: self.decoder_pushes.load(Ordering::Relaxed),
            codec_errors: self.codec_errors.load(Ordering::Relaxed),
            passes: self.passes.load(Ordering::Relaxed),
        }
    }
}

pub(crate) struct DecoderDispatch {
    codec: Arc<dyn DecoderCodec>,
    links: Arc<DecoderLinks>,
    datagrams: SegQueue<DatagramEvent>,
    counters: Counters,
}

impl DecoderDispatch {
    pub(crate) fn new(codec: Arc<dyn DecoderCodec>, links: Arc<DecoderLinks>) -> Self {
        Self {
            codec,
            links,
            datagrams: SegQueue::new(),
            counters: Counters::default(),
        }
    }

    pub(crate) fn enqueue(&self, event: DatagramEvent) {
        self.datagrams.push(event);
    }

    pub(crate) fn queued_datagrams(&self) -> usize {
        self.datagrams.len()
    }

    /// Deliver the datagrams queued at the start of the pass
    ///
    /// Stops early once `running` is cleared.
    pub(crate) fn run_pass(&self, running: &AtomicBool) {
        self.counters.passes.fetch_add(1, Ordering::Relaxed);

        let pruned = self.links.prune();
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned decoder registrations before pass");
        }

        let pending = self.datagrams.len();
        if pending == 0 {
            return;
        }
        let links = self.links.snapshot();

        for _ in 0..pending {
            if !running.load(Ordering::Acquire) {
                return;
            }
            let Some(event) = self.datagrams.pop() else {
                break;
            };
            let decoders = match links.get(&(event.room, event.peer)) {
                Some(decoders) if self.links.is_room_valid(event.room) => decoders,
                _ => {
                    tracing::trace!(
                        room = ?event.room,
                        peer = event.peer,
                        ssrc = event.ssrc,
                        "No decoder for datagram, dropping"
                    );
                    self.counters.datagrams_dropped.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };

            self.counters
                .datagrams_delivered
                .fetch_add(1, Ordering::Relaxed);
            for &decoder in decoders {
                match self.codec.decoder_push(decoder, &event.datagram) {
                    Ok(()) => {
                        self.counters.decoder_pushes.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => self.report_codec_error(decoder, &event, &e),
                }
            }
        }
    }

    fn report_codec_error(&self, decoder: DecoderHandle, event: &DatagramEvent, error: &CodecError) {
        match error.severity() {
            Severity::Expected => {}
            Severity::Teardown => tracing::debug!(
                ?decoder,
                peer = event.peer,
                "Decoder handle invalid, datagram not delivered"
            ),
            Severity::Hard => {
                tracing::error!(
                    ?decoder,
                    room = ?event.room,
                    peer = event.peer,
                    error = %error,
                    "Failed to push datagram into decoder"
                );
                self.counters.codec_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn discard_queued(&self) -> usize {
        let mut dropped = 0;
        while self.datagrams.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

/// Cloneable entry point for the network receive callback
#[derive(Clone)]
pub struct DecoderDispatchHandle {
    shared: Arc<DecoderDispatch>,
    wakeup: Wakeup,
}

impl DecoderDispatchHandle {
    /// Queue a received datagram and wake the worker; never blocks
    pub fn handle_datagram(
        &self,
        room: RoomHandle,
        peer: PeerId,
        channel_mask: ChannelMask,
        ssrc: SsrcId,
        datagram: &[u8],
    ) {
        self.submit(DatagramEvent {
            room,
            peer,
            channel_mask,
            ssrc,
            datagram: Bytes::copy_from_slice(datagram),
        });
    }

    pub fn submit(&self, event: DatagramEvent) {
        self.shared.enqueue(event);
        self.wakeup.notify();
    }

    pub fn link_decoder_to_peer(&self, decoder: DecoderHandle, room: RoomHandle, peer: PeerId) -> bool {
        self.shared.links.link(decoder, room, peer)
    }

    /// Remove `decoder` from every peer, returning how many registrations it had
    pub fn unlink_decoder(&self, decoder: DecoderHandle) -> usize {
        self.shared.links.unlink(decoder)
    }

    pub fn wake(&self) {
        self.wakeup.notify();
    }

    pub fn stats(&self) -> DecoderDispatchStats {
        self.shared.counters.snapshot()
    }
}

/// Owner of the datagram dispatch thread
pub struct DecoderDispatchWorker {
    handle: DecoderDispatchHandle,
    thread: WorkerThread,
}

impl DecoderDispatchWorker {
    pub fn spawn(
        codec: Arc<dyn DecoderCodec>,
        links: Arc<DecoderLinks>,
        config: &WorkerConfig,
    ) -> Result<Self, WorkerError> {
        let shared = Arc::new(DecoderDispatch::new(codec, links));
        let (wakeup, wake_rx) = wake_channel();

        let pass_state = shared.clone();
        let thread = WorkerThread::spawn(
            config.thread_name_or(DEFAULT_THREAD_NAME),
            config.wake_interval(),
            wakeup.clone(),
            wake_rx,
            move |running| pass_state.run_pass(running),
        )?;

        tracing::info!(
            interval_ms = config.wake_interval_ms,
            "Datagram dispatch worker started"
        );
        Ok(Self {
            handle: DecoderDispatchHandle { shared, wakeup },
            thread,
        })
    }

    pub fn handle(&self) -> DecoderDispatchHandle {
        self.handle.clone()
    }

    pub fn handle_datagram(
        &self,
        room: RoomHandle,
        peer: PeerId,
        channel_mask: ChannelMask,
        ssrc: SsrcId,
        datagram: &[u8],
    ) {
        self.handle
            .handle_datagram(room, peer, channel_mask, ssrc, datagram);
    }

    pub fn link_decoder_to_peer(&self, decoder: DecoderHandle, room: RoomHandle, peer: PeerId) -> bool {
        self.handle.link_decoder_to_peer(decoder, room, peer)
    }

    pub fn unlink_decoder(&self, decoder: DecoderHandle) -> usize {
        self.handle.unlink_decoder(decoder)
    }

    pub fn stats(&self) -> DecoderDispatchStats {
        self.handle.stats()
    }

    pub fn queued_datagrams(&self) -> usize {
        self.handle.shared.queued_datagrams()
    }

    pub fn is_running(&self) -> bool {
        self.thread.is_running()
    }

    /// Stop the thread; datagrams still queued are discarded
    pub fn stop(&mut self) -> Result<(), WorkerError> {
        self.thread.stop()?;
        let dropped = self.handle.shared.discard_queued();
        self.handle.shared.links.clear();
        tracing::info!(dropped, "Datagram dispatch worker stopped");
        Ok(())
    }
}

impl Drop for DecoderDispatchWorker {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}
