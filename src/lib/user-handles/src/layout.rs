//! Byte layout of the shared session region.
//!
//! ```text
//! +--------------------------+  offset 0
//! | SessionHeader (24 bytes) |  magic, version, nb_handles, max_handles, first_handle
//! +--------------------------+  offset 24
//! | HandleEntry[0]           |  24 bytes each, max_handles entries
//! | HandleEntry[1]           |
//! | ...                      |
//! +--------------------------+
//! ```
//!
//! Every process that maps the region must agree on this layout. All fields are atomics:
//! the owner writes them while other processes read them through their own mappings.

use std::sync::atomic::{fence, AtomicU32, AtomicU64, Ordering};

use static_assertions::{const_assert, const_assert_eq};

use crate::{
    handle::is_wildcard_generation, ObjectRef, ObjectType, Owner, RegionError, UserHandle,
};

/// Magic number at the start of an initialized region.
pub const SESSION_MAGIC: u32 = 0x5548_444c;
/// Current layout version.
pub const SESSION_VERSION: u32 = 1;

/// The first index ever handed out. Lower indices, index 0 in particular, are never valid.
pub const FIRST_USER_HANDLE: u16 = 0x0020;
/// Indices at or above this value are never handed out.
pub const LAST_USER_HANDLE: u16 = 0xffef;

#[repr(C)]
/// Fixed header at the start of the session region.
pub struct SessionHeader {
    magic: AtomicU32,
    version: AtomicU32,
    nb_handles: AtomicU32,
    max_handles: AtomicU32,
    first_handle: AtomicU32,
    #[allow(dead_code)]
    reserved: AtomicU32,
}

impl SessionHeader {
    pub fn magic(&self) -> u32 {
        self.magic.load(Ordering::Acquire)
    }

    pub fn version(&self) -> u32 {
        self.version.load(Ordering::Acquire)
    }

    /// Number of slot indices handed out so far, including the reserved ones.
    pub fn nb_handles(&self) -> u32 {
        self.nb_handles.load(Ordering::Acquire)
    }

    pub fn max_handles(&self) -> u32 {
        self.max_handles.load(Ordering::Acquire)
    }

    pub fn first_handle(&self) -> u32 {
        self.first_handle.load(Ordering::Acquire)
    }

    pub(crate) fn publish_nb_handles(&self, count: u32) {
        self.nb_handles.store(count, Ordering::Release);
    }

    pub(crate) fn init(&self, limits: TableLimits) {
        self.version.store(SESSION_VERSION, Ordering::Relaxed);
        self.first_handle
            .store(limits.first_index as u32, Ordering::Relaxed);
        self.max_handles
            .store(limits.last_index as u32, Ordering::Relaxed);
        self.nb_handles
            .store(limits.first_index as u32, Ordering::Release);
        // Readers check the magic before anything else.
        self.magic.store(SESSION_MAGIC, Ordering::Release);
    }
}

#[repr(C)]
/// One slot of the handle table.
pub struct HandleEntry {
    object: AtomicU64,
    tid: AtomicU32,
    pid: AtomicU32,
    uniq: AtomicU32,
    #[allow(dead_code)]
    reserved: AtomicU32,
}

const_assert_eq!(core::mem::size_of::<SessionHeader>(), 24);
const_assert_eq!(core::mem::size_of::<HandleEntry>(), 24);
const_assert_eq!(core::mem::offset_of!(HandleEntry, uniq), 16);
const_assert!(core::mem::size_of::<SessionHeader>() % core::mem::align_of::<HandleEntry>() == 0);

#[inline]
const fn pack(generation: u16, ty: u16) -> u32 {
    (generation as u32) << 16 | ty as u32
}

#[inline]
const fn unpack(uniq: u32) -> (u16, u16) {
    ((uniq >> 16) as u16, (uniq & 0xffff) as u16)
}

impl HandleEntry {
    /// The combined generation/type word, loaded atomically.
    pub fn uniq(&self) -> u32 {
        self.uniq.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u16 {
        unpack(self.uniq()).0
    }

    /// The raw type tag. 0 means the slot is free or was never used.
    pub fn type_tag(&self) -> u16 {
        unpack(self.uniq()).1
    }

    pub fn is_live(&self) -> bool {
        self.type_tag() != 0
    }

    /// Read the entry. Returns None if the slot is free, or if its generation/type word
    /// changed while the payload was being read.
    pub fn snapshot(&self) -> Option<EntryInfo> {
        let before = self.uniq();
        let (generation, tag) = unpack(before);
        let ty = ObjectType::new(tag)?;
        let object = ObjectRef::new(self.object.load(Ordering::Relaxed));
        let owner = Owner::new(
            self.pid.load(Ordering::Relaxed),
            self.tid.load(Ordering::Relaxed),
        );
        fence(Ordering::Acquire);
        if self.uniq.load(Ordering::Relaxed) != before {
            return None;
        }
        Some(EntryInfo {
            generation,
            ty,
            object,
            owner,
        })
    }

    pub(crate) fn object(&self) -> ObjectRef {
        ObjectRef::new(self.object.load(Ordering::Relaxed))
    }

    /// Write the payload, then make the slot live with a single store of the combined word.
    pub(crate) fn publish(&self, generation: u16, ty: ObjectType, object: ObjectRef, owner: Owner) {
        debug_assert!(!is_wildcard_generation(generation));
        // Keep the payload stores after any earlier retire of this slot.
        fence(Ordering::Release);
        self.object.store(object.raw(), Ordering::Relaxed);
        self.tid.store(owner.tid, Ordering::Relaxed);
        self.pid.store(owner.pid, Ordering::Relaxed);
        self.uniq.store(pack(generation, ty.raw()), Ordering::Release);
    }

    /// Clear the type half, keeping the generation so old handles keep failing.
    pub(crate) fn retire(&self) {
        let generation = self.generation();
        self.uniq.store(pack(generation, 0), Ordering::Release);
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// A consistent copy of a live entry.
pub struct EntryInfo {
    pub generation: u16,
    pub ty: ObjectType,
    pub object: ObjectRef,
    pub owner: Owner,
}

impl EntryInfo {
    /// The full handle of this entry, given its index.
    pub fn handle(&self, index: u16) -> UserHandle {
        UserHandle::new(index, self.generation)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
/// Index bounds of a session table.
pub struct TableLimits {
    /// First index handed out. Must be at least 1; index 0 is a permanent sentinel.
    pub first_index: u16,
    /// Hard maximum: indices at or above this are never handed out.
    pub last_index: u16,
}

impl Default for TableLimits {
    fn default() -> Self {
        Self {
            first_index: FIRST_USER_HANDLE,
            last_index: LAST_USER_HANDLE,
        }
    }
}

impl TableLimits {
    pub fn new(first_index: u16, last_index: u16) -> Result<Self, RegionError> {
        let limits = Self {
            first_index,
            last_index,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Set the first index handed out.
    pub fn first(mut self, first_index: u16) -> Self {
        self.first_index = first_index;
        self
    }

    /// Set the hard maximum.
    pub fn last(mut self, last_index: u16) -> Self {
        self.last_index = last_index;
        self
    }

    pub fn validate(&self) -> Result<(), RegionError> {
        if self.first_index == 0 || self.first_index >= self.last_index {
            return Err(RegionError::BadLimits {
                first: self.first_index as u32,
                last: self.last_index as u32,
            });
        }
        Ok(())
    }

    /// Number of indices that can ever be live at once.
    pub fn capacity(&self) -> usize {
        (self.last_index - self.first_index) as usize
    }

    /// Bytes of backing storage a region with these limits needs.
    pub fn region_size(&self) -> usize {
        region_size_for(self.last_index as u32)
    }
}

pub(crate) fn region_size_for(max_handles: u32) -> usize {
    core::mem::size_of::<SessionHeader>()
        + max_handles as usize * core::mem::size_of::<HandleEntry>()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sizes() {
        let limits = TableLimits::default();
        assert_eq!(limits.region_size(), 24 + 0xffef * 24);
        assert_eq!(limits.capacity(), 0xffef - 0x20);
    }

    #[test]
    fn limits() {
        assert!(TableLimits::new(0, 10).is_err());
        assert!(TableLimits::new(10, 10).is_err());
        assert!(TableLimits::new(1, 2).is_ok());
        assert_eq!(
            TableLimits::default().first(4).last(8),
            TableLimits::new(4, 8).unwrap()
        );
    }

    #[test]
    fn publish_and_retire() {
        let entry = HandleEntry {
            object: AtomicU64::new(0),
            tid: AtomicU32::new(0),
            pid: AtomicU32::new(0),
            uniq: AtomicU32::new(0),
            reserved: AtomicU32::new(0),
        };
        assert!(entry.snapshot().is_none());

        entry.publish(3, ObjectType::MENU, ObjectRef::new(99), Owner::new(7, 8));
        assert_eq!(entry.uniq(), 3 << 16 | 2);
        let info = entry.snapshot().unwrap();
        assert_eq!(info.generation, 3);
        assert_eq!(info.ty, ObjectType::MENU);
        assert_eq!(info.object, ObjectRef::new(99));
        assert_eq!(info.owner, Owner::new(7, 8));
        assert_eq!(info.handle(0x40), UserHandle::new(0x40, 3));

        entry.retire();
        assert_eq!(entry.uniq(), 3 << 16);
        assert_eq!(entry.generation(), 3);
        assert!(!entry.is_live());
        assert!(entry.snapshot().is_none());
    }
}
