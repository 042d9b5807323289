//! Decoder registrations per (room, peer)

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

use super::{RoomValidity, SharedValidity};
use crate::handle::{DecoderHandle, PeerId, RoomHandle};

/// Key of a decoder registration
pub type DecoderKey = (RoomHandle, PeerId);

/// Copy of the decoder registrations taken under the registry lock
pub type DecoderSnapshot = HashMap<DecoderKey, HashSet<DecoderHandle>>;

/// Any number of decoders may listen to the same remote peer
pub struct DecoderLinks {
    links: Mutex<DecoderSnapshot>,
    validity: SharedValidity,
}

impl DecoderLinks {
    pub fn new(validity: SharedValidity) -> Self {
        Self {
            links: Mutex::new(HashMap::new()),
            validity,
        }
    }

    /// Register `decoder` for datagrams of `peer` in `room`
    ///
    /// Registering the same decoder twice is a no-op.
    pub fn link(&self, decoder: DecoderHandle, room: RoomHandle, peer: PeerId) -> bool {
        if decoder.is_null() || room.is_null() {
            tracing::error!(?decoder, ?room, peer, "Linking a decoder requires non-null handles");
            return false;
        }

        let inserted = self
            .links
            .lock()
            .entry((room, peer))
            .or_default()
            .insert(decoder);
        if inserted {
            tracing::debug!(?decoder, ?room, peer, "Linked decoder to peer");
        }
        true
    }

    /// Remove `decoder` from every peer it was registered for
    ///
    /// Peer sets left empty, or belonging to rooms that are no longer valid,
    /// are dropped. Returns how many registrations were removed.
    pub fn unlink(&self, decoder: DecoderHandle) -> usize {
        let mut links = self.links.lock();
        let mut removed = 0;
        let validity = &*self.validity;
        links.retain(|(room, _), decoders| {
            if decoders.remove(&decoder) {
                removed += 1;
            }
            !decoders.is_empty() && validity.is_room_valid(*room)
        });
        tracing::debug!(
            ?decoder,
            removed,
            remaining = links.len(),
            "Unlinked decoder"
        );
        removed
    }

    /// Drop registrations of rooms that are no longer valid
    pub fn prune(&self) -> usize {
        let mut links = self.links.lock();
        Self::retain_valid(&mut links, &*self.validity)
    }

    fn retain_valid(links: &mut DecoderSnapshot, validity: &dyn RoomValidity) -> usize {
        let before = links.len();
        links.retain(|(room, peer), _| {
            let keep = validity.is_room_valid(*room);
            if !keep {
                tracing::debug!(?room, peer, "Removed decoder registrations of invalid room");
            }
            keep
        });
        before - links.len()
    }

    /// Decoders registered for `peer` in `room`
    ///
    /// Empty when the room is no longer valid, so datagrams for a dead room
    /// are never delivered.
    pub fn decoders_for(&self, room: RoomHandle, peer: PeerId) -> Vec<DecoderHandle> {
        if !self.validity.is_room_valid(room) {
            return Vec::new();
        }
        self.links
            .lock()
            .get(&(room, peer))
            .map(|decoders| decoders.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Copy of every registration
    pub fn snapshot(&self) -> DecoderSnapshot {
        self.links.lock().clone()
    }

    pub fn is_room_valid(&self, room: RoomHandle) -> bool {
        self.validity.is_room_valid(room)
    }

    pub fn is_linked(&self, decoder: DecoderHandle) -> bool {
        self.links
            .lock()
            .values()
            .any(|decoders| decoders.contains(&decoder))
    }

    /// Number of (room, peer) keys with at least one decoder
    pub fn len(&self) -> usize {
        self.links.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.lock().is_empty()
    }

    pub fn clear(&self) {
        self.links.lock().clear();
    }
}
