//! Recording fakes for unit tests

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::codec::{Decoded, DecoderCodec, EncoderCodec};
use crate::error::{CodecError, NetworkError};
use crate::handle::{DecoderHandle, EncoderHandle, RoomHandle};
use crate::network::DatagramTransport;
use crate::registry::RoomValidity;

/// Oracle where every room is valid until invalidated
#[derive(Default)]
pub(crate) struct SwitchableValidity {
    invalid: Mutex<HashSet<RoomHandle>>,
}

impl SwitchableValidity {
    pub(crate) fn all_valid() -> Self {
        Self::default()
    }

    pub(crate) fn invalidate(&self, room: RoomHandle) {
        self.invalid.lock().insert(room);
    }

    pub(crate) fn revalidate(&self, room: RoomHandle) {
        self.invalid.lock().remove(&room);
    }
}

impl RoomValidity for SwitchableValidity {
    fn is_room_valid(&self, room: RoomHandle) -> bool {
        !self.invalid.lock().contains(&room)
    }
}

/// Codec that records every call and replays scripted pop results
#[derive(Default)]
pub(crate) struct RecordingCodec {
    encoder_pushes: Mutex<Vec<(EncoderHandle, Vec<f32>)>>,
    encoder_pops: Mutex<Vec<EncoderHandle>>,
    pop_script: Mutex<HashMap<EncoderHandle, VecDeque<Result<Vec<u8>, CodecError>>>>,
    encoder_push_errors: Mutex<HashMap<EncoderHandle, CodecError>>,
    decoder_pushes: Mutex<Vec<(DecoderHandle, Vec<u8>)>>,
    decoder_push_errors: Mutex<HashMap<DecoderHandle, CodecError>>,
}

impl RecordingCodec {
    /// Queue the result of the next pop of `encoder`; unscripted pops report no data
    pub(crate) fn script_pop(&self, encoder: EncoderHandle, result: Result<Vec<u8>, CodecError>) {
        self.pop_script
            .lock()
            .entry(encoder)
            .or_default()
            .push_back(result);
    }

    pub(crate) fn fail_encoder_push(&self, encoder: EncoderHandle, error: CodecError) {
        self.encoder_push_errors.lock().insert(encoder, error);
    }

    pub(crate) fn fail_decoder_push(&self, decoder: DecoderHandle, error: CodecError) {
        self.decoder_push_errors.lock().insert(decoder, error);
    }

    pub(crate) fn encoder_pushes(&self) -> Vec<(EncoderHandle, Vec<f32>)> {
        self.encoder_pushes.lock().clone()
    }

    pub(crate) fn encoder_pops(&self) -> Vec<EncoderHandle> {
        self.encoder_pops.lock().clone()
    }

    pub(crate) fn decoder_pushes(&self) -> Vec<(DecoderHandle, Vec<u8>)> {
        self.decoder_pushes.lock().clone()
    }

    /// Scripted pops that were never consumed
    pub(crate) fn unconsumed_pops(&self, encoder: EncoderHandle) -> usize {
        self.pop_script.lock().get(&encoder).map_or(0, |q| q.len())
    }
}

impl EncoderCodec for RecordingCodec {
    fn encoder_push(&self, encoder: EncoderHandle, samples: &[f32]) -> Result<(), CodecError> {
        self.encoder_pushes.lock().push((encoder, samples.to_vec()));
        match self.encoder_push_errors.lock().get(&encoder) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn encoder_pop(&self, encoder: EncoderHandle, out: &mut [u8]) -> Result<usize, CodecError> {
        self.encoder_pops.lock().push(encoder);
        let next = self
            .pop_script
            .lock()
            .get_mut(&encoder)
            .and_then(|q| q.pop_front());
        match next {
            // reports the full length even when `out` is too small
            Some(Ok(packet)) => {
                let n = packet.len().min(out.len());
                out[..n].copy_from_slice(&packet[..n]);
                Ok(packet.len())
            }
            Some(Err(e)) => Err(e),
            None => Err(CodecError::NoData),
        }
    }
}

impl DecoderCodec for RecordingCodec {
    fn decoder_push(&self, decoder: DecoderHandle, datagram: &[u8]) -> Result<(), CodecError> {
        self.decoder_pushes.lock().push((decoder, datagram.to_vec()));
        match self.decoder_push_errors.lock().get(&decoder) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn decoder_pop(&self, _decoder: DecoderHandle, out: &mut [f32]) -> Result<Decoded, CodecError> {
        out.fill(0.0);
        Ok(Decoded::SILENCE)
    }
}

/// Transport that keeps every datagram it is asked to send
#[derive(Default)]
pub(crate) struct RecordingTransport {
    sent: Mutex<Vec<(RoomHandle, Vec<u8>)>>,
    failing_rooms: Mutex<HashSet<RoomHandle>>,
}

impl RecordingTransport {
    pub(crate) fn fail_room(&self, room: RoomHandle) {
        self.failing_rooms.lock().insert(room);
    }

    pub(crate) fn sent(&self) -> Vec<(RoomHandle, Vec<u8>)> {
        self.sent.lock().clone()
    }
}

impl DatagramTransport for RecordingTransport {
    fn send_datagram(&self, room: RoomHandle, datagram: &[u8]) -> Result<(), NetworkError> {
        if self.failing_rooms.lock().contains(&room) {
            return Err(NetworkError::SendFailed("room unreachable".into()));
        }
        self.sent.lock().push((room, datagram.to_vec()));
        Ok(())
    }
}
