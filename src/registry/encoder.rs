//! Encoder to room links

use parking_lot::Mutex;
use std::collections::HashMap;

use super::SharedValidity;
use crate::handle::{EncoderHandle, RoomHandle};

/// Each encoder sends to at most one room
pub struct EncoderLinks {
    links: Mutex<HashMap<EncoderHandle, RoomHandle>>,
    validity: SharedValidity,
}

impl EncoderLinks {
    pub fn new(validity: SharedValidity) -> Self {
        Self {
            links: Mutex::new(HashMap::new()),
            validity,
        }
    }

    /// Route `encoder` to `room`, replacing any previous target
    ///
    /// Null handles and rooms the oracle already reports dead are ignored.
    /// Returns whether the link was stored.
    pub fn link(&self, encoder: EncoderHandle, room: RoomHandle) -> bool {
        if encoder.is_null() || room.is_null() {
            tracing::error!(?encoder, ?room, "Linking an encoder requires non-null handles");
            return false;
        }
        if !self.validity.is_room_valid(room) {
            tracing::warn!(?encoder, ?room, "Refusing to link encoder to invalid room");
            return false;
        }

        let previous = self.links.lock().insert(encoder, room);
        match previous {
            Some(old) if old != room => {
                tracing::debug!(?encoder, from = ?old, to = ?room, "Relinked encoder")
            }
            Some(_) => {}
            None => tracing::debug!(?encoder, ?room, "Linked encoder"),
        }
        true
    }

    /// Remove the link of `encoder`, returning whether one existed
    ///
    /// Links to rooms that have gone invalid are pruned on the way.
    pub fn unlink(&self, encoder: EncoderHandle) -> bool {
        let mut links = self.links.lock();
        let removed = links.remove(&encoder);
        if let Some(room) = removed {
            tracing::debug!(?encoder, ?room, "Unlinked encoder");
        }
        Self::retain_valid(&mut links, &*self.validity);
        removed.is_some()
    }

    /// Drop every link whose encoder is null or whose room is no longer valid
    ///
    /// Returns the number of links removed.
    pub fn prune(&self) -> usize {
        let mut links = self.links.lock();
        Self::retain_valid(&mut links, &*self.validity)
    }

    fn retain_valid(
        links: &mut HashMap<EncoderHandle, RoomHandle>,
        validity: &dyn super::RoomValidity,
    ) -> usize {
        let before = links.len();
        links.retain(|encoder, room| {
            let keep = !encoder.is_null() && !room.is_null() && validity.is_room_valid(*room);
            if !keep {
                tracing::debug!(?encoder, ?room, "Removed encoder link to invalid room");
            }
            keep
        });
        before - links.len()
    }

    /// Copy of the current links
    pub fn snapshot(&self) -> HashMap<EncoderHandle, RoomHandle> {
        self.links.lock().clone()
    }

    /// Ask the oracle about `room` without touching the links
    pub fn is_room_valid(&self, room: RoomHandle) -> bool {
        !room.is_null() && self.validity.is_room_valid(room)
    }

    pub fn room_for(&self, encoder: EncoderHandle) -> Option<RoomHandle> {
        self.links.lock().get(&encoder).copied()
    }

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
