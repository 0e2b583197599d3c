//! A session-wide table of generational user handles.
//!
//! The table lives in a memory region that one privileged owner writes and any number of
//! client processes map read-only. A handle is a slot index plus a generation counter, so a
//! handle to a freed object keeps failing even after its slot is reused. Clients resolve
//! handles straight out of their mapping with [SharedSession] and never wait on the owner.

mod error;
mod handle;
mod layout;
mod publisher;
mod session;
mod store;
mod table;
mod types;
mod view;

pub use error::{HandleError, RegionError};
pub use handle::{
    is_wildcard_generation, next_generation, UserHandle, WILDCARD_GENERATION_MAX,
    WILDCARD_GENERATION_ZERO,
};
pub use layout::{
    EntryInfo, HandleEntry, SessionHeader, TableLimits, FIRST_USER_HANDLE, LAST_USER_HANDLE,
    SESSION_MAGIC, SESSION_VERSION,
};
pub use publisher::SessionPublisher;
pub use session::{init_session_shared_data, Entries, SharedSession};
pub use store::SlotStore;
pub use table::HandleTable;
pub use types::{ObjectRef, ObjectType, Owner};
pub use view::SessionView;
