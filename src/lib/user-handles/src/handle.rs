//! The externally visible 32-bit handle value and its encoding.

use core::fmt;

/// Generation value that matches any live occupant of an index.
pub const WILDCARD_GENERATION_ZERO: u16 = 0;
/// The other reserved wildcard generation. Never stored for a live slot.
pub const WILDCARD_GENERATION_MAX: u16 = 0xffff;

#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Ord, Eq, Hash, Default)]
#[repr(transparent)]
/// A user handle: slot index in the low 16 bits, generation in the high 16 bits.
///
/// Two handles with the same index but different generations name different objects. A
/// handle whose generation is `0` or `0xffff` is a short (truncated) form that only
/// [crate::HandleTable::canonicalize] and the wildcard-accepting lookups understand.
pub struct UserHandle(u32);

impl UserHandle {
    /// The null handle. Starts an enumeration from the beginning of the table.
    pub const NULL: Self = Self(0);

    /// Encode an index and generation.
    pub const fn new(index: u16, generation: u16) -> Self {
        Self(index as u32 | (generation as u32) << 16)
    }

    /// Build a handle from its raw value.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw 32-bit value.
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// The slot index.
    pub const fn index(&self) -> u16 {
        (self.0 & 0xffff) as u16
    }

    /// The generation half.
    pub const fn generation(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Split into `(index, generation)`.
    pub const fn decode(&self) -> (u16, u16) {
        (self.index(), self.generation())
    }

    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the generation half accepts any live generation.
    pub const fn has_wildcard_generation(&self) -> bool {
        is_wildcard_generation(self.generation())
    }

    /// Returns true if this handle matches a live slot holding `generation`.
    pub const fn matches_generation(&self, generation: u16) -> bool {
        self.generation() == generation || self.has_wildcard_generation()
    }
}

/// Returns true for the reserved generations `0` and `0xffff`.
pub const fn is_wildcard_generation(generation: u16) -> bool {
    generation == WILDCARD_GENERATION_ZERO || generation == WILDCARD_GENERATION_MAX
}

/// The generation a slot gets the next time it is handed out after holding `current`.
pub const fn next_generation(current: u16) -> u16 {
    let next = current as u32 + 1;
    if next >= WILDCARD_GENERATION_MAX as u32 {
        1
    } else {
        next as u16
    }
}

impl From<u32> for UserHandle {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<UserHandle> for u32 {
    fn from(value: UserHandle) -> Self {
        value.0
    }
}

impl From<UserHandle> for u64 {
    fn from(value: UserHandle) -> Self {
        value.0 as u64
    }
}

impl fmt::Display for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

impl fmt::LowerHex for UserHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

#[cfg(kani)]
mod proofs {
    use super::*;

    #[kani::proof]
    fn encode_decode_roundtrip() {
        let index: u16 = kani::any();
        let generation: u16 = kani::any();
        let handle = UserHandle::new(index, generation);
        assert_eq!(handle.decode(), (index, generation));
    }

    #[kani::proof]
    fn next_generation_never_wildcard() {
        let current: u16 = kani::any();
        assert!(!is_wildcard_generation(next_generation(current)));
    }
}
