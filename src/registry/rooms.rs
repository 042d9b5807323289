//! Registry of live rooms
//!
//! The owning layer registers a room when it is joined and deregisters it when
//! it is left. Workers only ever read it, through [`RoomValidity`].

use dashmap::DashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use super::RoomValidity;
use crate::handle::RoomHandle;

pub struct RoomRegistry {
    rooms: DashSet<RoomHandle>,
    next_handle: AtomicU64,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: DashSet::new(),
            next_handle: AtomicU64::new(1),
        }
    }

    /// Hand out a fresh non-null handle and register it
    ///
    /// For hosts that have no handle space of their own. Handles the host
    /// registered itself are skipped.
    pub fn allocate(&self) -> RoomHandle {
        loop {
            let room = RoomHandle::from_raw(self.next_handle.fetch_add(1, Ordering::Relaxed));
            if !room.is_null() && self.rooms.insert(room) {
                tracing::info!(?room, "Allocated room");
                return room;
            }
        }
    }

    pub fn register(&self, room: RoomHandle) {
        if room.is_null() {
            tracing::error!("Tried registering the null room handle");
            return;
        }
        tracing::info!(?room, "Registering room");
        self.rooms.insert(room);
    }

    /// Returns false if the room was never registered
    pub fn deregister(&self, room: RoomHandle) -> bool {
        if self.rooms.remove(&room).is_some() {
            tracing::info!(?room, "Deregistering room");
            true
        } else {
            tracing::warn!(?room, "Failed deregistering room - handle was never registered");
            false
        }
    }

    pub fn is_registered(&self, room: RoomHandle) -> bool {
        self.rooms.contains(&room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomValidity for RoomRegistry {
    fn is_room_valid(&self, room: RoomHandle) -> bool {
        self.is_registered(room)
    }
}
