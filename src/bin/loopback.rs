//! Loopback demo
//!
//! Sends a sine tone through the whole core: capture, encoder push worker,
//! an in-process "network", datagram dispatch, and two listeners sharing one
//! playback stream.
//!
//! Usage: `loopback [config.toml]`

use anyhow::{Context, Result};
use bytes::Bytes;
use crossbeam_channel::unbounded;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voice_stream_core::{
    audio::PlaybackListener,
    codec::LoopbackCodec,
    config::CoreConfig,
    error::NetworkError,
    ChannelMask, RoomHandle, VoiceCore,
};

const REMOTE_PEER: u64 = 1;
const SSRC: u32 = 0x5157;
const TONE_HZ: f32 = 440.0;
const SECONDS: usize = 2;

/// Counts decoded blocks as they come out of the origin
#[derive(Default)]
struct BlockCounter {
    blocks: AtomicU64,
    samples: AtomicU64,
}

impl PlaybackListener for BlockCounter {
    fn on_decoded(&self, samples: &[f32], _channels: u16) {
        self.blocks.fetch_add(1, Ordering::Relaxed);
        self.samples.fetch_add(samples.len() as u64, Ordering::Relaxed);
    }
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => CoreConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => CoreConfig::default(),
    };
    let playback = config.playback;
    let frame = playback.samples_per_callback();
    tracing::info!(
        sample_rate = playback.sample_rate,
        channels = playback.channels,
        frame,
        "Starting loopback demo"
    );

    // Everything sent comes straight back from the remote peer
    let (wire_tx, wire_rx) = unbounded::<(RoomHandle, Bytes)>();
    let transport = move |room: RoomHandle, datagram: &[u8]| -> Result<(), NetworkError> {
        wire_tx
            .send((room, Bytes::copy_from_slice(datagram)))
            .map_err(|e| NetworkError::SendFailed(e.to_string()))
    };

    let codec = Arc::new(LoopbackCodec::new());
    let mut core = VoiceCore::with_codec(codec.clone(), Arc::new(transport), config)?;

    let room = core.rooms().allocate();
    let encoder = codec.create_encoder(frame)?;
    let decoder = codec.create_decoder();
    core.link_encoder(encoder, room);
    core.link_decoder_to_peer(decoder, room, REMOTE_PEER);

    let network = {
        let dispatch = core.dispatch_handle();
        thread::Builder::new()
            .name("loopback-network".into())
            .spawn(move || {
                for (room, datagram) in wire_rx {
                    dispatch.handle_datagram(room, REMOTE_PEER, ChannelMask::full(), SSRC, &datagram);
                }
            })?
    };

    let stream = core.create_playback_stream(decoder)?;
    let counter = Arc::new(BlockCounter::default());
    stream.add_listener(&counter);
    let mut speakers = [core.create_consumer(stream.clone()), core.create_consumer(stream.clone())];

    let capture = core.encoder_handle();
    let callback = Duration::from_millis(playback.callback_ms as u64);
    let step = TONE_HZ * 2.0 * std::f32::consts::PI / playback.sample_rate as f32;
    let mut phase = 0.0f32;
    let mut out = vec![0.0f32; frame];
    let mut audible = [0usize; 2];

    for _ in 0..(SECONDS * 1000 / playback.callback_ms as usize) {
        let tone: Vec<f32> = (0..frame)
            .map(|_| {
                phase += step;
                phase.sin() * 0.5
            })
            .collect();
        capture.push_audio_to_encoder(encoder, &tone);

        thread::sleep(callback);
        for (speaker, heard) in speakers.iter_mut().zip(audible.iter_mut()) {
            *heard += speaker.render(&mut out);
        }
    }

    core.shutdown()?;
    let sent = core.encoder_stats();
    let dispatched = core.dispatch_stats();

    // the transport holds the last wire sender
    drop(capture);
    drop(core);
    if network.join().is_err() {
        tracing::error!("Network thread panicked");
    }

    println!("\n=== Loopback Summary ===");
    println!("  Frames pushed:       {}", sent.frames_pushed);
    println!("  Packets sent:        {}", sent.packets_sent);
    println!("  Datagrams delivered: {}", dispatched.datagrams_delivered);
    println!("  Origin decodes:      {}", stream.decode_calls());
    println!(
        "  Blocks to listeners: {} ({} samples)",
        counter.blocks.load(Ordering::Relaxed),
        counter.samples.load(Ordering::Relaxed)
    );
    for (i, heard) in audible.iter().enumerate() {
        println!("  Speaker {i} audible samples: {heard}");
    }
    Ok(())
}
