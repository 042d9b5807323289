//! Everything a voice client needs, wired together
//!
//! [`VoiceCore`] owns the room registry used as validity oracle, both link
//! maps and both workers. Codecs and the transport are injected, so the same
//! core runs over Opus and a real room layer or over the loopback codec in
//! tests.

use std::sync::Arc;

use crate::audio::{PlaybackConsumer, PlaybackStream};
use crate::codec::{DecoderCodec, EncoderCodec};
use crate::config::{CoreConfig, PlaybackConfig};
use crate::error::Result;
use crate::handle::{ChannelMask, DecoderHandle, EncoderHandle, PeerId, RoomHandle, SsrcId};
use crate::network::{
    DatagramTransport, DecoderDispatchHandle, DecoderDispatchStats, DecoderDispatchWorker,
    EncoderPushHandle, EncoderPushStats, EncoderPushWorker,
};
use crate::registry::{LinkRegistry, RoomRegistry};

/// Streaming core with both worker threads running
pub struct VoiceCore {
    rooms: Arc<RoomRegistry>,
    registry: LinkRegistry,
    encoder_worker: EncoderPushWorker,
    dispatch_worker: DecoderDispatchWorker,
    decoder_codec: Arc<dyn DecoderCodec>,
    config: CoreConfig,
}

impl VoiceCore {
    /// Validate `config` and start both workers
    pub fn start(
        encoder_codec: Arc<dyn EncoderCodec>,
        decoder_codec: Arc<dyn DecoderCodec>,
        transport: Arc<dyn DatagramTransport>,
        config: CoreConfig,
    ) -> Result<Self> {
        config.validate()?;

        let rooms = Arc::new(RoomRegistry::new());
        let registry = LinkRegistry::new(rooms.clone());

        let encoder_worker = EncoderPushWorker::spawn(
            encoder_codec,
            transport,
            registry.encoders().clone(),
            &config.encoder,
            config.max_datagram_size,
        )?;
        let dispatch_worker = DecoderDispatchWorker::spawn(
            decoder_codec.clone(),
            registry.decoders().clone(),
            &config.decoder,
        )?;

        Ok(Self {
            rooms,
            registry,
            encoder_worker,
            dispatch_worker,
            decoder_codec,
            config,
        })
    }

    /// Start with one codec serving both directions
    pub fn with_codec<C>(
        codec: Arc<C>,
        transport: Arc<dyn DatagramTransport>,
        config: CoreConfig,
    ) -> Result<Self>
    where
        C: EncoderCodec + DecoderCodec + 'static,
    {
        Self::start(codec.clone(), codec, transport, config)
    }

    /// Rooms the core treats as alive
    pub fn rooms(&self) -> &Arc<RoomRegistry> {
        &self.rooms
    }

    pub fn registry(&self) -> &LinkRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn playback_config(&self) -> &PlaybackConfig {
        &self.config.playback
    }

    pub fn link_encoder(&self, encoder: EncoderHandle, room: RoomHandle) -> bool {
        self.encoder_worker.link_encoder(encoder, room)
    }

    pub fn unlink_encoder(&self, encoder: EncoderHandle) -> bool {
        self.encoder_worker.unlink_encoder(encoder)
    }

    pub fn push_audio_to_encoder(&self, encoder: EncoderHandle, samples: &[f32]) {
        self.encoder_worker.push_audio_to_encoder(encoder, samples);
    }

    /// Handle for the capture callback thread
    pub fn encoder_handle(&self) -> EncoderPushHandle {
        self.encoder_worker.handle()
    }

    pub fn link_decoder_to_peer(&self, decoder: DecoderHandle, room: RoomHandle, peer: PeerId) -> bool {
        self.dispatch_worker.link_decoder_to_peer(decoder, room, peer)
    }

    pub fn unlink_decoder(&self, decoder: DecoderHandle) -> usize {
        self.dispatch_worker.unlink_decoder(decoder)
    }

    pub fn handle_datagram(
        &self,
        room: RoomHandle,
        peer: PeerId,
        channel_mask: ChannelMask,
        ssrc: SsrcId,
        datagram: &[u8],
    ) {
        self.dispatch_worker
            .handle_datagram(room, peer, channel_mask, ssrc, datagram);
    }

    /// Handle for the network receive callback thread
    pub fn dispatch_handle(&self) -> DecoderDispatchHandle {
        self.dispatch_worker.handle()
    }

    /// Shared playback stream decoding from `decoder`
    pub fn create_playback_stream(&self, decoder: DecoderHandle) -> Result<Arc<PlaybackStream>> {
        let stream =
            PlaybackStream::for_decoder(self.decoder_codec.clone(), decoder, &self.config.playback)?;
        tracing::debug!(
            ?decoder,
            capacity = stream.capacity(),
            "Created playback stream"
        );
        Ok(Arc::new(stream))
    }

    /// New render-side reader of `stream`
    pub fn create_consumer(&self, stream: Arc<PlaybackStream>) -> PlaybackConsumer {
        PlaybackConsumer::new(stream, &self.config.playback)
    }

    pub fn encoder_stats(&self) -> EncoderPushStats {
        self.encoder_worker.stats()
    }

    pub fn dispatch_stats(&self) -> DecoderDispatchStats {
        self.dispatch_worker.stats()
    }

    pub fn is_running(&self) -> bool {
        self.encoder_worker.is_running() || self.dispatch_worker.is_running()
    }

    /// Stop both workers, discarding queued work
    pub fn shutdown(&mut self) -> Result<()> {
        let encoder = self.encoder_worker.stop();
        let dispatch = self.dispatch_worker.stop();
        encoder?;
        dispatch?;
        tracing::info!("Voice core shut down");
        Ok(())
    }
}
