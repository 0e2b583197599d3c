//! Ownership of the memory backing a session table.

use std::{
    fs::OpenOptions,
    path::{Path, PathBuf},
    ptr::NonNull,
};

use memmap2::MmapMut;
use tracing::debug;

use crate::{
    session::{init_session_shared_data, SharedSession},
    RegionError, TableLimits,
};

/// Owns the writable mapping of a session region.
///
/// The publisher is the only thing allowed to mutate the region. Other processes map the
/// same bytes read-only (see [crate::SessionView]) and resolve handles without talking to
/// the owner.
pub struct SessionPublisher {
    map: MmapMut,
    base: NonNull<u8>,
    limits: TableLimits,
    path: Option<PathBuf>,
}

// Safety: the region is only ever accessed through atomics.
unsafe impl Send for SessionPublisher {}
unsafe impl Sync for SessionPublisher {}

impl SessionPublisher {
    /// Back the table with private anonymous memory. Only this process can see it.
    pub fn anonymous(limits: TableLimits) -> Result<Self, RegionError> {
        limits.validate()?;
        let map = MmapMut::map_anon(limits.region_size())?;
        Self::init(map, limits, None)
    }

    /// Create (or truncate) the file at `path`, size it for `limits` and map it shared.
    /// Client processes open the same path with [crate::SessionView::open].
    pub fn create<P: AsRef<Path>>(path: P, limits: TableLimits) -> Result<Self, RegionError> {
        limits.validate()?;
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(limits.region_size() as u64)?;
        // Safety: we just created and sized the file; readers only map it read-only.
        let map = unsafe { MmapMut::map_mut(&file)? };
        debug!("created session region {}", path.display());
        Self::init(map, limits, Some(path.to_path_buf()))
    }

    /// Adopt a zero-filled writable mapping handed over by whatever publishes the region.
    pub fn from_mmap(map: MmapMut, limits: TableLimits) -> Result<Self, RegionError> {
        limits.validate()?;
        Self::init(map, limits, None)
    }

    fn init(
        mut map: MmapMut,
        limits: TableLimits,
        path: Option<PathBuf>,
    ) -> Result<Self, RegionError> {
        let ptr = map.as_mut_ptr();
        // Safety: the mapping is owned by the returned publisher and outlives every view.
        unsafe { init_session_shared_data(ptr, map.len(), limits)? };
        let base = NonNull::new(ptr).ok_or(RegionError::Misaligned)?;
        Ok(Self {
            map,
            base,
            limits,
            path,
        })
    }

    /// A view of the live table, the same one client processes get.
    pub fn session(&self) -> SharedSession<'_> {
        // Safety: validated in init; the mapping lives as long as &self.
        unsafe { SharedSession::from_validated(self.base.as_ptr(), self.limits.last_index as u32) }
    }

    pub fn limits(&self) -> TableLimits {
        self.limits
    }

    /// Base address of the region in this process.
    pub fn as_ptr(&self) -> *const u8 {
        self.base.as_ptr()
    }

    /// Size of the region in bytes.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The file backing the region, if it is shareable with other processes.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Flush a file-backed region. Readers see stores without this; it only matters for
    /// the on-disk copy.
    pub fn flush(&self) -> Result<(), RegionError> {
        self.map.flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for SessionPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPublisher")
            .field("base", &self.base)
            .field("len", &self.len())
            .field("limits", &self.limits)
            .field("path", &self.path)
            .finish()
    }
}
