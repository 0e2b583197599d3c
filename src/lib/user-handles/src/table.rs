//! The owner-side handle table.

use tracing::{trace, warn};

use crate::{
    layout::EntryInfo,
    publisher::SessionPublisher,
    session::{Entries, SharedSession},
    store::SlotStore,
    HandleError, ObjectRef, ObjectType, Owner, UserHandle,
};

/// A session-wide table of generational handles.
///
/// All mutation goes through `&mut self`: the table assumes a single writer and does no
/// locking of its own. Owners that call in from several threads wrap it in a mutex. Reads
/// go through [SharedSession], the same logic client processes run against their read-only
/// mapping.
pub struct HandleTable {
    store: SlotStore,
}

impl HandleTable {
    pub fn new(publisher: SessionPublisher) -> Self {
        Self {
            store: SlotStore::new(publisher),
        }
    }

    pub fn publisher(&self) -> &SessionPublisher {
        self.store.publisher()
    }

    /// The reader view of the live table.
    pub fn session(&self) -> SharedSession<'_> {
        self.store.session()
    }

    /// Allocate a handle for `object`, owned by `owner`.
    pub fn allocate(
        &mut self,
        object: ObjectRef,
        ty: ObjectType,
        owner: Owner,
    ) -> Result<UserHandle, HandleError> {
        let (index, generation) = self.store.allocate_slot().inspect_err(|_| {
            warn!(
                "user handle table exhausted ({:#x} slots in use), cannot allocate {}",
                self.store.live_count(),
                ty
            )
        })?;
        self.store.commit(index, generation, object, ty, owner);
        let handle = UserHandle::new(index, generation);
        trace!("allocated {} -> {} for {}", handle, object, ty);
        Ok(handle)
    }

    /// Get the object a handle names, if it is live and of type `ty`.
    pub fn resolve(&self, handle: UserHandle, ty: ObjectType) -> Result<ObjectRef, HandleError> {
        self.session().get(handle, ty).ok_or(HandleError::Invalid)
    }

    /// Like [HandleTable::resolve], also returning the full form of the handle.
    pub fn resolve_full(
        &self,
        handle: UserHandle,
        ty: ObjectType,
    ) -> Result<(UserHandle, ObjectRef), HandleError> {
        let info = self
            .session()
            .lookup(handle)
            .filter(|info| info.ty == ty)
            .ok_or(HandleError::Invalid)?;
        Ok((info.handle(handle.index()), info.object))
    }

    /// Fill in the generation of a short handle. See [SharedSession::full_handle].
    pub fn canonicalize(&self, handle: UserHandle) -> UserHandle {
        self.session().full_handle(handle)
    }

    /// Free the slot a handle names, returning the object that was stored there.
    pub fn release(&mut self, handle: UserHandle) -> Result<ObjectRef, HandleError> {
        self.release_if(handle, |_| true)
    }

    /// Free the slot a handle names, but only if its type satisfies `pred`.
    pub fn release_if(
        &mut self,
        handle: UserHandle,
        pred: impl Fn(ObjectType) -> bool,
    ) -> Result<ObjectRef, HandleError> {
        let info = self
            .session()
            .lookup(handle)
            .filter(|info| pred(info.ty))
            .ok_or(HandleError::Invalid)?;
        let object = self
            .store
            .release_slot(handle.index())
            .ok_or(HandleError::Invalid)?;
        trace!("released {} ({})", info.handle(handle.index()), info.ty);
        Ok(object)
    }

    /// Find the next live handle after `prev` whose type matches `filter` (any type if
    /// `None`). Pass the null handle to start from the beginning.
    pub fn enumerate_next(
        &self,
        prev: UserHandle,
        filter: Option<ObjectType>,
    ) -> Option<(UserHandle, ObjectRef)> {
        self.session()
            .next(prev, filter)
            .map(|(handle, info)| (handle, info.object))
    }

    /// Iterate live handles matching `filter` in ascending index order.
    pub fn iter(&self, filter: Option<ObjectType>) -> Entries<'_> {
        self.session().iter(filter)
    }

    /// Free every live slot holding `object` whose type satisfies `pred`. Returns the number
    /// of slots freed.
    pub fn release_all_owned_by(
        &mut self,
        object: ObjectRef,
        pred: impl Fn(ObjectType) -> bool,
    ) -> usize {
        let doomed: Vec<u16> = self
            .session()
            .iter(None)
            .filter(|(_, info)| info.object == object && pred(info.ty))
            .map(|(handle, _)| handle.index())
            .collect();
        doomed
            .into_iter()
            .filter(|index| self.store.release_slot(*index).is_some())
            .count()
    }

    /// Snapshot the entry a handle names, owner ids included.
    pub fn entry_info(&self, handle: UserHandle) -> Option<EntryInfo> {
        self.session().lookup(handle)
    }

    /// Number of indices ever handed out, including the reserved ones.
    pub fn live_count(&self) -> u32 {
        self.store.live_count()
    }

    /// Number of freed slots waiting to be reused.
    pub fn free_count(&self) -> usize {
        self.store.free_count()
    }
}

impl std::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleTable")
            .field("session", &self.session())
            .field("free", &self.free_count())
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{TableLimits, FIRST_USER_HANDLE};

    const A: ObjectType = ObjectType::MENU;
    const B: ObjectType = ObjectType::ICON;

    fn table(first: u16, last: u16) -> HandleTable {
        let limits = TableLimits::new(first, last).unwrap();
        HandleTable::new(SessionPublisher::anonymous(limits).unwrap())
    }

    fn default_table() -> HandleTable {
        HandleTable::new(SessionPublisher::anonymous(TableLimits::default()).unwrap())
    }

    fn owner() -> Owner {
        Owner::new(100, 101)
    }

    #[test]
    fn reuse_scenario() {
        let mut table = default_table();
        let h1 = table.allocate(ObjectRef::new(1), A, owner()).unwrap();
        assert_eq!(h1, UserHandle::new(FIRST_USER_HANDLE, 1));
        let h2 = table.allocate(ObjectRef::new(2), A, owner()).unwrap();
        assert_eq!(h2, UserHandle::new(FIRST_USER_HANDLE + 1, 1));

        assert_eq!(table.release(h1), Ok(ObjectRef::new(1)));
        let h3 = table.allocate(ObjectRef::new(3), B, owner()).unwrap();
        assert_eq!(h3, UserHandle::new(h1.index(), 2));

        assert_eq!(table.resolve(h1, A), Err(HandleError::Invalid));
        assert_eq!(table.resolve(h3, B), Ok(ObjectRef::new(3)));
        assert_eq!(table.resolve(h3, A), Err(HandleError::Invalid));
        assert_eq!(table.resolve(h2, A), Ok(ObjectRef::new(2)));
    }

    #[test]
    fn no_aliasing() {
        let mut table = table(1, 16);
        let mut prev = table.allocate(ObjectRef::new(0), A, owner()).unwrap();
        for i in 1..100u64 {
            table.release(prev).unwrap();
            let next = table.allocate(ObjectRef::new(i), A, owner()).unwrap();
            assert_eq!(next.index(), prev.index());
            assert_ne!(next, prev);
            assert_eq!(table.resolve(prev, A), Err(HandleError::Invalid));
            assert_eq!(table.resolve(next, A), Ok(ObjectRef::new(i)));
            prev = next;
        }
    }

    #[test]
    fn stale_rejected_for_every_type() {
        let mut table = table(1, 16);
        let h = table.allocate(ObjectRef::new(5), A, owner()).unwrap();
        table.release(h).unwrap();
        for raw in 1..=0x20u16 {
            let ty = ObjectType::new(raw).unwrap();
            assert_eq!(table.resolve(h, ty), Err(HandleError::Invalid));
        }
        assert_eq!(table.release(h), Err(HandleError::Invalid));

        table.allocate(ObjectRef::new(6), A, owner()).unwrap();
        assert_eq!(table.resolve(h, A), Err(HandleError::Invalid));
        assert_eq!(table.release(h), Err(HandleError::Invalid));
    }

    #[test]
    fn out_of_range_and_null() {
        let table = table(4, 16);
        assert_eq!(table.resolve(UserHandle::NULL, A), Err(HandleError::Invalid));
        assert_eq!(table.resolve(UserHandle::new(3, 1), A), Err(HandleError::Invalid));
        assert_eq!(table.resolve(UserHandle::new(4, 1), A), Err(HandleError::Invalid));
        assert_eq!(table.resolve(UserHandle::new(0xfff0, 1), A), Err(HandleError::Invalid));
    }

    #[test]
    fn canonicalize() {
        let mut table = table(1, 16);
        let h1 = table.allocate(ObjectRef::new(1), A, owner()).unwrap();
        table.release(h1).unwrap();
        let h2 = table.allocate(ObjectRef::new(2), B, owner()).unwrap();
        assert_eq!(h2.generation(), 2);

        let short = UserHandle::new(h2.index(), 0);
        assert_eq!(table.canonicalize(short), h2);
        assert_eq!(table.resolve(short, B), Ok(ObjectRef::new(2)));
        assert_eq!(table.resolve_full(short, B), Ok((h2, ObjectRef::new(2))));
        assert_eq!(table.resolve_full(short, A), Err(HandleError::Invalid));

        // Already carries a generation, even a stale one.
        assert_eq!(table.canonicalize(h1), h1);
        let max = UserHandle::new(h2.index(), 0xffff);
        assert_eq!(table.canonicalize(max), max);
        assert_eq!(table.resolve(max, B), Ok(ObjectRef::new(2)));

        // Not live.
        let dead = UserHandle::new(9, 0);
        assert_eq!(table.canonicalize(dead), dead);
    }

    #[test]
    fn exhaustion_and_recovery() {
        let limits = TableLimits::new(2, 10).unwrap();
        let mut table = table(2, 10);
        let handles: Vec<_> = (0..limits.capacity())
            .map(|i| table.allocate(ObjectRef::new(i as u64), A, owner()).unwrap())
            .collect();
        assert_eq!(table.live_count(), 10);
        assert_eq!(
            table.allocate(ObjectRef::new(99), A, owner()),
            Err(HandleError::Exhausted)
        );
        // A failed allocation leaves nothing behind.
        assert_eq!(table.iter(None).count(), limits.capacity());

        table.release(handles[3]).unwrap();
        let again = table.allocate(ObjectRef::new(99), A, owner()).unwrap();
        assert_eq!(again, UserHandle::new(handles[3].index(), 2));
        assert_eq!(
            table.allocate(ObjectRef::new(100), A, owner()),
            Err(HandleError::Exhausted)
        );
    }

    #[test]
    fn release_if_checks_type() {
        let mut table = table(1, 16);
        let w = table
            .allocate(ObjectRef::new(1), ObjectType::WINDOW, owner())
            .unwrap();
        let m = table.allocate(ObjectRef::new(2), A, owner()).unwrap();
        assert_eq!(
            table.release_if(w, |ty| ty.is_client_type()),
            Err(HandleError::Invalid)
        );
        assert_eq!(table.resolve(w, ObjectType::WINDOW), Ok(ObjectRef::new(1)));
        assert_eq!(
            table.release_if(m, |ty| ty.is_client_type()),
            Ok(ObjectRef::new(2))
        );
    }

    #[test]
    fn bulk_cleanup() {
        let mut table = table(1, 64);
        let p = ObjectRef::process(7);
        let q = ObjectRef::process(8);
        let mut kept = Vec::new();
        for i in 0..10 {
            let ty = if i % 3 == 0 { ObjectType::HOOK } else { A };
            let h = table.allocate(p, ty, Owner::new(7, 1)).unwrap();
            if ty == ObjectType::HOOK {
                kept.push(h);
            }
            kept.push(table.allocate(q, B, Owner::new(8, 1)).unwrap());
        }

        let freed = table.release_all_owned_by(p, |ty| ty.is_client_type());
        assert_eq!(freed, 6);
        assert_eq!(table.free_count(), 6);
        for (h, info) in table.iter(None) {
            assert!(kept.contains(&h));
            assert!(info.object != p || !info.ty.is_client_type());
        }
        assert_eq!(table.iter(None).count(), kept.len());
        assert_eq!(table.release_all_owned_by(p, |ty| ty.is_client_type()), 0);
    }

    #[test]
    fn enumeration() {
        let mut table = table(1, 64);
        let mut menus = Vec::new();
        for i in 0..20u64 {
            let ty = if i % 2 == 0 { A } else { B };
            let h = table.allocate(ObjectRef::new(i), ty, owner()).unwrap();
            if ty == A {
                menus.push(h);
            }
        }
        table.release(menus.remove(2)).unwrap();
        table.release(menus.remove(5)).unwrap();

        let mut seen = Vec::new();
        let mut prev = UserHandle::NULL;
        while let Some((h, object)) = table.enumerate_next(prev, Some(A)) {
            assert_eq!(table.resolve(h, A), Ok(object));
            seen.push(h);
            prev = h;
        }
        assert_eq!(seen, menus);

        let all: Vec<_> = table.iter(None).map(|(h, _)| h).collect();
        assert_eq!(all.len(), 18);
        assert!(all.windows(2).all(|w| w[0].index() < w[1].index()));

        // Past the published count.
        assert!(table
            .enumerate_next(UserHandle::new(table.live_count() as u16, 1), None)
            .is_none());
    }

    #[test]
    fn entry_info_records_owner() {
        let mut table = table(1, 16);
        let h = table.allocate(ObjectRef::new(9), A, Owner::new(3, 4)).unwrap();
        let info = table.entry_info(h).unwrap();
        assert_eq!(info.owner, Owner::new(3, 4));
        assert_eq!(info.object, ObjectRef::new(9));
        assert_eq!(info.ty, A);
        assert_eq!(info.generation, 1);
    }

    #[test]
    fn generation_wraps() {
        let mut table = table(1, 4);
        let mut h = table.allocate(ObjectRef::new(0), A, owner()).unwrap();
        for _ in 0..0xfffd {
            table.release(h).unwrap();
            h = table.allocate(ObjectRef::new(0), A, owner()).unwrap();
        }
        assert_eq!(h.generation(), 0xfffe);
        let stale = h;
        table.release(h).unwrap();
        h = table.allocate(ObjectRef::new(1), A, owner()).unwrap();
        assert_eq!(h, UserHandle::new(stale.index(), 1));
        assert_eq!(table.resolve(stale, A), Err(HandleError::Invalid));
        assert_eq!(table.resolve(h, A), Ok(ObjectRef::new(1)));
    }
}
