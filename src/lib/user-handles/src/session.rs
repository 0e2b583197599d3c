//! Read-side logic over a mapped session region.
//!
//! Both the owner and every client process resolve handles with the same code: a
//! [SharedSession] is just a pair of references into whatever mapping the caller holds.
//! Nothing here blocks or writes to the region.

use std::mem::{align_of, size_of};

use tracing::debug;

use crate::{
    layout::{region_size_for, EntryInfo, HandleEntry, SessionHeader, TableLimits},
    ObjectRef, ObjectType, RegionError, UserHandle, SESSION_MAGIC, SESSION_VERSION,
};

#[derive(Clone, Copy)]
/// A view of the session header and slot array.
pub struct SharedSession<'a> {
    header: &'a SessionHeader,
    entries: &'a [HandleEntry],
}

/// Initialize a fresh region and return a view of it.
///
/// The region must be zero-filled, as freshly created shared memory is. This writes the
/// layout version, the limits and the initial handle count (so that indices below
/// `limits.first_index` are never handed out), and publishes the magic last.
///
/// # Safety
///
/// `ptr` must point to `len` bytes of writable memory that stays mapped for `'a`, and
/// nothing other than atomic accesses through the returned view (or other views of the
/// same memory) may touch it for that time.
pub unsafe fn init_session_shared_data<'a>(
    ptr: *mut u8,
    len: usize,
    limits: TableLimits,
) -> Result<SharedSession<'a>, RegionError> {
    limits.validate()?;
    check_region(ptr, len, limits.region_size())?;
    let header = unsafe { &*(ptr as *const SessionHeader) };
    header.init(limits);
    debug!(
        "initialized session region at {:p}: {} bytes, handles {:#x}..{:#x}",
        ptr, len, limits.first_index, limits.last_index
    );
    unsafe { SharedSession::from_raw(ptr, len) }
}

fn check_region(ptr: *const u8, len: usize, required: usize) -> Result<(), RegionError> {
    if len < required {
        return Err(RegionError::TooSmall { len, required });
    }
    if ptr.is_null() || ptr as usize % align_of::<HandleEntry>() != 0 {
        return Err(RegionError::Misaligned);
    }
    Ok(())
}

impl<'a> SharedSession<'a> {
    /// Build a view over an initialized region, validating its header.
    ///
    /// # Safety
    ///
    /// `ptr` must point to `len` readable bytes that stay mapped for `'a`, and the memory
    /// must only ever be accessed atomically (by this and other views).
    pub unsafe fn from_raw(ptr: *const u8, len: usize) -> Result<Self, RegionError> {
        check_region(ptr, len, size_of::<SessionHeader>())?;
        let header = unsafe { &*(ptr as *const SessionHeader) };

        let magic = header.magic();
        if magic != SESSION_MAGIC {
            return Err(RegionError::BadMagic(magic));
        }
        let version = header.version();
        if version != SESSION_VERSION {
            return Err(RegionError::BadVersion(version));
        }

        let max = header.max_handles();
        let first = header.first_handle();
        if first == 0 || first >= max || max > u16::MAX as u32 {
            return Err(RegionError::BadLimits { first, last: max });
        }
        let required = region_size_for(max);
        if len < required {
            return Err(RegionError::TooSmall { len, required });
        }
        let count = header.nb_handles();
        if count > max {
            return Err(RegionError::Corrupt { count, max });
        }

        let entries = unsafe {
            std::slice::from_raw_parts(
                ptr.add(size_of::<SessionHeader>()) as *const HandleEntry,
                max as usize,
            )
        };
        Ok(Self { header, entries })
    }

    /// Build a view over a region this crate already validated.
    ///
    /// # Safety
    ///
    /// Same as [SharedSession::from_raw], and the region must have passed validation with a
    /// header reporting `max_handles`.
    pub(crate) unsafe fn from_validated(ptr: *const u8, max_handles: u32) -> Self {
        unsafe {
            Self {
                header: &*(ptr as *const SessionHeader),
                entries: std::slice::from_raw_parts(
                    ptr.add(size_of::<SessionHeader>()) as *const HandleEntry,
                    max_handles as usize,
                ),
            }
        }
    }

    pub fn header(&self) -> &'a SessionHeader {
        self.header
    }

    /// The currently published number of handed-out indices.
    pub fn nb_handles(&self) -> u32 {
        self.header.nb_handles()
    }

    /// The limits the region was initialized with.
    pub fn limits(&self) -> TableLimits {
        TableLimits {
            first_index: self.header.first_handle() as u16,
            last_index: self.entries.len() as u16,
        }
    }

    // The published count is re-checked against the array length in case a foreign writer
    // scribbled over the header after validation.
    fn bound(&self) -> usize {
        (self.nb_handles() as usize).min(self.entries.len())
    }

    /// Get a slot by index, bounds-checked against the published handle count.
    pub fn entry(&self, index: u16) -> Option<&'a HandleEntry> {
        let index = index as usize;
        if index >= self.bound() {
            return None;
        }
        self.entries.get(index)
    }

    /// Find the live entry a handle names. A wildcard generation matches any live occupant.
    pub fn lookup(&self, handle: UserHandle) -> Option<EntryInfo> {
        let info = self.entry(handle.index())?.snapshot()?;
        handle
            .matches_generation(info.generation)
            .then_some(info)
    }

    /// Get the object a handle names, if it is live and of type `ty`.
    pub fn get(&self, handle: UserHandle, ty: ObjectType) -> Option<ObjectRef> {
        self.lookup(handle)
            .filter(|info| info.ty == ty)
            .map(|info| info.object)
    }

    /// Turn a short handle (generation 0) into the full handle of the live occupant of its
    /// index. Handles that already carry a generation, and handles whose index is not live,
    /// come back unchanged.
    pub fn full_handle(&self, handle: UserHandle) -> UserHandle {
        if handle.generation() != 0 {
            return handle;
        }
        match self.lookup(handle) {
            Some(info) => info.handle(handle.index()),
            None => handle,
        }
    }

    /// Find the first live slot after `prev` (or from the start, if `prev` is null) whose type
    /// matches `filter`. A `None` filter matches every live slot.
    pub fn next(
        &self,
        prev: UserHandle,
        filter: Option<ObjectType>,
    ) -> Option<(UserHandle, EntryInfo)> {
        let bound = self.bound();
        let start = if prev.is_null() {
            0
        } else {
            let index = prev.index() as usize;
            if index >= bound {
                return None;
            }
            index + 1
        };

        (start..bound).find_map(|index| {
            let info = self.entries[index].snapshot()?;
            if filter.is_some_and(|ty| ty != info.ty) {
                return None;
            }
            Some((info.handle(index as u16), info))
        })
    }

    /// Iterate live slots matching `filter` in ascending index order.
    pub fn iter(&self, filter: Option<ObjectType>) -> Entries<'a> {
        Entries {
            session: *self,
            prev: UserHandle::NULL,
            filter,
            done: false,
        }
    }
}

/// Forward iterator over live entries, driven by [SharedSession::next].
pub struct Entries<'a> {
    session: SharedSession<'a>,
    prev: UserHandle,
    filter: Option<ObjectType>,
    done: bool,
}

impl<'a> Iterator for Entries<'a> {
    type Item = (UserHandle, EntryInfo);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.session.next(self.prev, self.filter) {
            Some((handle, info)) => {
                self.prev = handle;
                Some((handle, info))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl std::fmt::Debug for SharedSession<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSession")
            .field("nb_handles", &self.nb_handles())
            .field("limits", &self.limits())
            .finish()
    }
}
