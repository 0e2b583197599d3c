//! The privileged owner of a session's user handle table.
//!
//! A [UserSession] serializes every mutation of the table behind one lock, applies the
//! session's policy on which object types clients may allocate and free themselves, and
//! sweeps a process's handles when it exits. Client processes read the table directly out of
//! the published region and only come here to change it.

use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, info, warn};
use user_handles::{
    HandleError, HandleTable, ObjectRef, ObjectType, Owner, RegionError, SessionPublisher,
    UserHandle,
};

mod config;
mod status;

pub use config::{Backing, ServerConfig};
pub use status::{Opcode, Status};

/// The process and thread a request came from. Allocations record it as the slot's owner.
pub type Caller = Owner;

/// One session's handle table and the lock that serializes writers.
pub struct UserSession {
    table: Mutex<HandleTable>,
}

impl UserSession {
    /// Create the session region described by `config` and start with an empty table.
    pub fn new(config: &ServerConfig) -> Result<Self, RegionError> {
        let publisher = match &config.backing {
            Backing::Anonymous => SessionPublisher::anonymous(config.limits)?,
            Backing::File(path) => SessionPublisher::create(path, config.limits)?,
        };
        info!(
            "user handle session ready: {} bytes, handles {:#x}..{:#x}{}",
            publisher.len(),
            config.limits.first_index,
            config.limits.last_index,
            publisher
                .path()
                .map(|p| format!(" at {}", p.display()))
                .unwrap_or_default()
        );
        Ok(Self::from_table(HandleTable::new(publisher)))
    }

    pub fn from_table(table: HandleTable) -> Self {
        Self {
            table: Mutex::new(table),
        }
    }

    /// Allocate a handle of a client-scoped type for the calling process.
    pub fn alloc_user_handle(&self, caller: Caller, ty: ObjectType) -> Result<UserHandle, Status> {
        if !ty.is_client_type() {
            debug!("pid {} asked for owner-managed type {}", caller.pid, ty);
            return Err(Status::InvalidParameter);
        }
        let handle = self
            .table
            .lock()
            .allocate(ObjectRef::process(caller.pid), ty, caller)?;
        Ok(handle)
    }

    /// Free a handle on behalf of a client. Only client-scoped types may be freed this way.
    pub fn free_user_handle(&self, caller: Caller, handle: UserHandle) -> Result<(), Status> {
        self.table
            .lock()
            .release_if(handle, |ty| ty.is_client_type())
            .map_err(|_| {
                debug!("pid {} failed to free {}", caller.pid, handle);
                Status::InvalidHandle
            })?;
        Ok(())
    }

    /// Allocate a handle for an owner-side object of any type.
    pub fn create_object(
        &self,
        owner: Owner,
        object: ObjectRef,
        ty: ObjectType,
    ) -> Result<UserHandle, HandleError> {
        self.table.lock().allocate(object, ty, owner)
    }

    pub fn get_object(&self, handle: UserHandle, ty: ObjectType) -> Result<ObjectRef, HandleError> {
        self.table.lock().resolve(handle, ty)
    }

    pub fn get_full_handle(&self, handle: UserHandle) -> UserHandle {
        self.table.lock().canonicalize(handle)
    }

    /// Free an owner-side object's handle, whatever its type.
    pub fn destroy_object(&self, handle: UserHandle) -> Result<ObjectRef, HandleError> {
        self.table.lock().release(handle)
    }

    /// Free every client-scoped handle a process allocated. Call once, when it exits.
    pub fn process_exited(&self, pid: u32) -> usize {
        let freed = self
            .table
            .lock()
            .release_all_owned_by(ObjectRef::process(pid), |ty| ty.is_client_type());
        if freed > 0 {
            info!("freed {} user handles of exited process {}", freed, pid);
        }
        freed
    }

    /// Handle a raw request. Returns the status code and the reply value.
    pub fn dispatch(&self, caller: Caller, opcode: u64, args: &[u64]) -> (u64, u64) {
        match self.do_dispatch(caller, opcode, args) {
            Ok(value) => (Status::Success.code(), value),
            Err(status) => (status.code(), 0),
        }
    }

    fn do_dispatch(&self, caller: Caller, opcode: u64, args: &[u64]) -> Result<u64, Status> {
        let Ok(opcode) = Opcode::try_from(opcode) else {
            warn!("pid {} sent unknown opcode {}", caller.pid, opcode);
            return Err(Status::NotImplemented);
        };
        if args.len() != opcode.num_args() {
            return Err(Status::InvalidParameter);
        }
        match opcode {
            Opcode::AllocUserHandle => {
                let ty = u16::try_from(args[0])
                    .ok()
                    .and_then(ObjectType::new)
                    .ok_or(Status::InvalidParameter)?;
                self.alloc_user_handle(caller, ty).map(u64::from)
            }
            Opcode::FreeUserHandle => {
                let handle = u32::try_from(args[0]).map_err(|_| Status::InvalidHandle)?;
                self.free_user_handle(caller, handle.into()).map(|_| 0)
            }
        }
    }

    /// The file clients map to read the table, if there is one.
    pub fn session_path(&self) -> Option<std::path::PathBuf> {
        self.table.lock().publisher().path().map(Path::to_path_buf)
    }

    pub fn region_size(&self) -> usize {
        self.table.lock().publisher().len()
    }

    /// Run `f` with the table locked.
    pub fn with_table<R>(&self, f: impl FnOnce(&mut HandleTable) -> R) -> R {
        f(&mut self.table.lock())
    }
}
