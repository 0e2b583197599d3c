//! Slot storage and recycling.

use tracing::trace;

use crate::{
    handle::next_generation,
    layout::{EntryInfo, HandleEntry},
    publisher::SessionPublisher,
    session::SharedSession,
    HandleError, ObjectRef, ObjectType, Owner,
};

/// The writer side of the slot array: the published memory plus the free list.
///
/// Freed indices are kept on a stack owned by the writer instead of being threaded through
/// the shared entries, so the most recently freed slot is reused first and the shared
/// layout never carries link values.
pub struct SlotStore {
    publisher: SessionPublisher,
    free_list: Vec<u16>,
}

impl SlotStore {
    pub fn new(publisher: SessionPublisher) -> Self {
        Self {
            publisher,
            free_list: Vec::new(),
        }
    }

    pub fn publisher(&self) -> &SessionPublisher {
        &self.publisher
    }

    pub fn session(&self) -> SharedSession<'_> {
        self.publisher.session()
    }

    /// Reserve a slot, returning its index and the generation it will carry.
    ///
    /// The slot stays free (type 0) until [SlotStore::commit] publishes it.
    pub fn allocate_slot(&mut self) -> Result<(u16, u16), HandleError> {
        let session = self.publisher.session();
        if let Some(index) = self.free_list.pop() {
            // Unwrap-Ok: indices on the free list are below the published count.
            let entry = session.entry(index).unwrap();
            return Ok((index, next_generation(entry.generation())));
        }

        let header = session.header();
        let nb_handles = header.nb_handles();
        if nb_handles >= header.max_handles() {
            return Err(HandleError::Exhausted);
        }
        // A never-used slot reads as free, so it is safe to expose it before it is stamped.
        header.publish_nb_handles(nb_handles + 1);
        Ok((nb_handles as u16, 1))
    }

    /// Stamp a reserved slot and make it live.
    pub fn commit(
        &mut self,
        index: u16,
        generation: u16,
        object: ObjectRef,
        ty: ObjectType,
        owner: Owner,
    ) {
        let session = self.publisher.session();
        // Unwrap-Ok: the index came from allocate_slot.
        let entry = session.entry(index).unwrap();
        entry.publish(generation, ty, object, owner);
        trace!(
            "slot {:#x} live: gen {} type {} object {}",
            index,
            generation,
            ty,
            object
        );
    }

    /// Return a slot to the free list. Its generation is preserved.
    pub fn release_slot(&mut self, index: u16) -> Option<ObjectRef> {
        let session = self.publisher.session();
        let entry = session.entry(index)?;
        if !entry.is_live() {
            return None;
        }
        let object = entry.object();
        entry.retire();
        self.free_list.push(index);
        trace!("slot {:#x} freed (gen {})", index, entry.generation());
        Some(object)
    }

    /// Get a slot by index, bounds-checked against the published count.
    pub fn get(&self, index: u16) -> Option<&HandleEntry> {
        self.publisher.session().entry(index)
    }

    /// Snapshot a live slot by index.
    pub fn info(&self, index: u16) -> Option<EntryInfo> {
        self.get(index)?.snapshot()
    }

    /// Number of freed slots waiting to be reused.
    pub fn free_count(&self) -> usize {
        self.free_list.len()
    }

    /// Number of indices ever handed out, including the reserved ones.
    pub fn live_count(&self) -> u32 {
        self.publisher.session().nb_handles()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::TableLimits;

    fn store(first: u16, last: u16) -> SlotStore {
        let limits = TableLimits::new(first, last).unwrap();
        SlotStore::new(SessionPublisher::anonymous(limits).unwrap())
    }

    #[test]
    fn append_then_exhaust() {
        let mut store = store(2, 5);
        assert_eq!(store.allocate_slot(), Ok((2, 1)));
        assert_eq!(store.allocate_slot(), Ok((3, 1)));
        assert_eq!(store.allocate_slot(), Ok((4, 1)));
        assert_eq!(store.allocate_slot(), Err(HandleError::Exhausted));
        assert_eq!(store.live_count(), 5);
    }

    #[test]
    fn lifo_reuse_bumps_generation() {
        let mut store = store(1, 8);
        let owner = Owner::new(1, 1);
        for _ in 0..3 {
            let (index, generation) = store.allocate_slot().unwrap();
            store.commit(index, generation, ObjectRef::new(index as u64), ObjectType::MENU, owner);
        }
        assert_eq!(store.release_slot(1), Some(ObjectRef::new(1)));
        assert_eq!(store.release_slot(3), Some(ObjectRef::new(3)));
        assert_eq!(store.release_slot(3), None);
        assert_eq!(store.free_count(), 2);

        assert_eq!(store.get(3).unwrap().generation(), 1);
        assert!(!store.get(3).unwrap().is_live());

        assert_eq!(store.allocate_slot(), Ok((3, 2)));
        assert_eq!(store.allocate_slot(), Ok((1, 2)));
        assert_eq!(store.allocate_slot(), Ok((4, 1)));
        assert_eq!(store.live_count(), 5);
    }

    #[test]
    fn out_of_range() {
        let store = store(2, 5);
        assert!(store.get(0).is_some());
        assert!(store.get(2).is_none());
        assert!(store.info(0).is_none());
    }
}
