//! Opaque handle types
//!
//! Handles are owned by the codec and network libraries. This crate only
//! copies and compares them; it never allocates or frees the objects behind
//! them. The raw value `0` is reserved as the null handle.

use std::fmt;

macro_rules! opaque_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            /// The reserved null handle
            pub const NULL: Self = Self(0);

            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }

            pub const fn is_null(self) -> bool {
                self.0 == 0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }
    };
}

opaque_handle!(
    /// Handle of a codec-side encoder
    EncoderHandle
);
opaque_handle!(
    /// Handle of a codec-side decoder
    DecoderHandle
);
opaque_handle!(
    /// Handle of a joined room on the network layer
    RoomHandle
);

/// Identifier of a remote participant
pub type PeerId = u64;

/// Synchronization source identifier carried by inbound datagrams
pub type SsrcId = u32;

/// 64-bit set of voice channels a datagram belongs to
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChannelMask(u64);

impl ChannelMask {
    pub const fn new(mask: u64) -> Self {
        Self(mask)
    }

    pub const fn full() -> Self {
        Self(!0)
    }

    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build a mask from its lower and upper 32-bit halves
    pub const fn from_parts(lower: u32, higher: u32) -> Self {
        Self(((higher as u64) << 32) | lower as u64)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    /// True if any channel of `mask` is set
    pub const fn is_set(self, mask: u64) -> bool {
        self.0 & mask != 0
    }

    /// Set or clear a single channel. Indices above 63 are ignored.
    pub fn set(&mut self, index: u32, on: bool) -> u64 {
        if index > 63 {
            return self.0;
        }
        let bit = 1u64 << index;
        if on {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
        self.0
    }

    /// Toggle a single channel. Indices above 63 are ignored.
    pub fn flip(&mut self, index: u32) -> u64 {
        if index <= 63 {
            self.0 ^= 1u64 << index;
        }
        self.0
    }
}

impl fmt::Debug for ChannelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelMask({:#018x})", self.0)
    }
}

impl From<u64> for ChannelMask {
    fn from(mask: u64) -> Self {
        Self(mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handles() {
        assert!(EncoderHandle::NULL.is_null());
        assert!(!RoomHandle::from_raw(7).is_null());
        assert_eq!(DecoderHandle::from(42).raw(), 42);
    }

    #[test]
    fn test_channel_mask_set_and_flip() {
        let mut mask = ChannelMask::empty();
        mask.set(0, true);
        mask.set(63, true);
        assert!(mask.is_set(1));
        assert!(mask.is_set(1 << 63));
        assert!(!mask.is_set(2));

        mask.flip(0);
        assert!(!mask.is_set(1));

        // out of range is ignored
        assert_eq!(mask.set(64, true), 1 << 63);
        assert_eq!(mask.flip(100), 1 << 63);
    }

    #[test]
    fn test_channel_mask_from_parts() {
        let mask = ChannelMask::from_parts(0x0000_0001, 0x8000_0000);
        assert_eq!(mask.bits(), 0x8000_0000_0000_0001);
        assert_eq!(ChannelMask::full().bits(), u64::MAX);
    }
}
