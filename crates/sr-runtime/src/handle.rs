use std::fmt;

/// Opaque caller-visible session identifier.
///
/// Upper 32 bits are the generation, lower 32 bits the slot. Both are
/// non-zero for any handle the registry hands out, so the raw value 0 is free
/// to mean "no handle" across the boundary.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// The sentinel returned by a failed load.
    pub const NULL: Handle = Handle(0);

    /// Encode a (generation, slot) pair. `None` if either part is zero.
    pub fn from_parts(generation: u32, slot: u32) -> Option<Handle> {
        if generation == 0 || slot == 0 {
            return None;
        }
        Some(Handle((u64::from(generation) << 32) | u64::from(slot)))
    }

    /// Reinterpret a value received from the caller.
    pub const fn from_raw(raw: u64) -> Handle {
        Handle(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn slot(self) -> u32 {
        self.0 as u32
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}
