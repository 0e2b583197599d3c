use std::{fs::File, path::Path};

use memmap2::Mmap;
use tracing::debug;

use crate::{session::SharedSession, RegionError};

/// A read-only mapping of a session region published by another process.
///
/// Lookups through the view never block and never contact the owner. The owner may be
/// mutating the table concurrently; every read goes through the same atomics it writes.
pub struct SessionView {
    map: Mmap,
    max_handles: u32,
}

impl SessionView {
    /// Map the region file at `path` read-only and validate its header.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RegionError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        // Safety: the owner only ever changes the file through atomic stores into its own
        // mapping; it never truncates a live region.
        let map = unsafe { Mmap::map(&file)? };
        let view = Self::from_mmap(map)?;
        debug!(
            "mapped session region {} ({} bytes, {:#x} handles)",
            path.display(),
            view.map.len(),
            view.session().nb_handles()
        );
        Ok(view)
    }

    /// Adopt an existing read-only mapping.
    pub fn from_mmap(map: Mmap) -> Result<Self, RegionError> {
        // Safety: the mapping is owned by the returned view.
        let session = unsafe { SharedSession::from_raw(map.as_ptr(), map.len())? };
        let max_handles = session.limits().last_index as u32;
        Ok(Self { map, max_handles })
    }

    pub fn session(&self) -> SharedSession<'_> {
        // Safety: validated in from_mmap; the mapping lives as long as &self.
        unsafe { SharedSession::from_validated(self.map.as_ptr(), self.max_handles) }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
