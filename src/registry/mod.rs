//! Link registries
//!
//! Thread-safe maps from local codec handles to network targets. Each map sits
//! behind its own mutex; workers copy a map once per pass and make every codec
//! or network call against the copy.
//!
//! Entries may briefly point at a room that has already gone away. They are
//! pruned lazily (on unlink and at the start of each worker pass) by asking the
//! [`RoomValidity`] oracle, never on a timer.

pub mod decoder;
pub mod encoder;
pub mod rooms;

pub use decoder::{DecoderKey, DecoderLinks};
pub use encoder::EncoderLinks;
pub use rooms::RoomRegistry;

use std::sync::Arc;

use crate::handle::RoomHandle;

/// Answers whether a room handle is still alive
///
/// Implementations must not block; they are queried from worker threads and
/// from under registry locks.
pub trait RoomValidity: Send + Sync {
    fn is_room_valid(&self, room: RoomHandle) -> bool;
}

impl<F> RoomValidity for F
where
    F: Fn(RoomHandle) -> bool + Send + Sync,
{
    fn is_room_valid(&self, room: RoomHandle) -> bool {
        self(room)
    }
}

pub type SharedValidity = Arc<dyn RoomValidity>;

/// Both link maps, sharing one validity oracle
#[derive(Clone)]
pub struct LinkRegistry {
    encoders: Arc<EncoderLinks>,
    decoders: Arc<DecoderLinks>,
}

impl LinkRegistry {
    pub fn new(validity: SharedValidity) -> Self {
        Self {
            encoders: Arc::new(EncoderLinks::new(validity.clone())),
            decoders: Arc::new(DecoderLinks::new(validity)),
        }
    }

    pub fn encoders(&self) -> &Arc<EncoderLinks> {
        &self.encoders
    }

    pub fn decoders(&self) -> &Arc<DecoderLinks> {
        &self.decoders
    }
}
