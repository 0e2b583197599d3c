//! Object categories, opaque object references and owner identities.

use core::{fmt, num::NonZeroU16};

#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Ord, Eq, Hash)]
#[repr(transparent)]
/// The type tag of a live slot. Tag 0 means "free" and cannot be represented here.
pub struct ObjectType(NonZeroU16);

impl ObjectType {
    pub const WINDOW: Self = Self::from_const(0x01);
    pub const MENU: Self = Self::from_const(0x02);
    pub const ICON: Self = Self::from_const(0x03);
    pub const WINPOS: Self = Self::from_const(0x04);
    pub const ACCEL: Self = Self::from_const(0x08);
    pub const HOOK: Self = Self::from_const(0x0f);
    pub const IMAGE: Self = Self::from_const(0x11);

    const fn from_const(raw: u16) -> Self {
        match NonZeroU16::new(raw) {
            Some(v) => Self(v),
            None => panic!("object type 0 is reserved for free slots"),
        }
    }

    /// Build a type from its raw tag. Returns None for the free tag 0.
    pub const fn new(raw: u16) -> Option<Self> {
        match NonZeroU16::new(raw) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    pub const fn raw(&self) -> u16 {
        self.0.get()
    }

    /// The default session policy: every type except windows and hooks may be allocated and
    /// freed directly by a client process. Windows and hooks are owner-managed.
    pub const fn is_client_type(&self) -> bool {
        self.raw() != Self::WINDOW.raw() && self.raw() != Self::HOOK.raw()
    }

    /// A short name for diagnostics.
    pub const fn name(&self) -> &'static str {
        match self.raw() {
            0x01 => "window",
            0x02 => "menu",
            0x03 => "icon",
            0x04 => "winpos",
            0x08 => "accel",
            0x0f => "hook",
            0x11 => "image",
            _ => "other",
        }
    }
}

impl TryFrom<u16> for ObjectType {
    type Error = crate::HandleError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(crate::HandleError::Invalid)
    }
}

impl From<ObjectType> for u16 {
    fn from(value: ObjectType) -> Self {
        value.raw()
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:#x})", self.name(), self.raw())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, PartialOrd, Ord, Eq, Hash, Default)]
#[repr(transparent)]
/// An opaque reference to the object a slot stands for.
///
/// The table never interprets this value. It crosses the shared region as a plain integer,
/// so it must not be a native pointer; owners keep a process-local side table if they need
/// to get from a reference back to a real object.
pub struct ObjectRef(u64);

impl ObjectRef {
    /// Tag bit for references that name a process rather than an owner-side object.
    const PROCESS_TAG: u64 = 1 << 63;

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The reference stored for client-scoped handles allocated on behalf of `pid`.
    pub const fn process(pid: u32) -> Self {
        Self(Self::PROCESS_TAG | pid as u64)
    }

    /// If this reference names a process, return its id.
    pub const fn as_process(&self) -> Option<u32> {
        if self.0 >> 32 == Self::PROCESS_TAG >> 32 {
            Some(self.0 as u32)
        } else {
            None
        }
    }

    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ObjectRef {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_process() {
            Some(pid) => write!(f, "process:{}", pid),
            None => write!(f, "{:#x}", self.0),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
/// The thread and process on whose behalf a slot was allocated.
pub struct Owner {
    pub pid: u32,
    pub tid: u32,
}

impl Owner {
    pub const fn new(pid: u32, tid: u32) -> Self {
        Self { pid, tid }
    }
}
