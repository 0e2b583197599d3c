use num_enum::{FromPrimitive, IntoPrimitive};

#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    PartialOrd,
    Ord,
    Eq,
    IntoPrimitive,
    FromPrimitive,
    thiserror::Error,
)]
#[repr(u64)]
/// Possible error values for handle table operations.
pub enum HandleError {
    /// An unknown error occurred.
    #[num_enum(default)]
    #[error("unknown error")]
    Unknown = 0,
    /// The table is at its hard capacity and no slot is free.
    #[error("user handle table exhausted")]
    Exhausted = 1,
    /// The handle does not name a live slot of the required type.
    #[error("invalid user handle")]
    Invalid = 2,
}

/// Errors from creating, adopting or validating a shared session region.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("i/o error on session region: {0}")]
    Io(#[from] std::io::Error),
    #[error("session region is {len} bytes, need at least {required}")]
    TooSmall { len: usize, required: usize },
    #[error("session region is not suitably aligned")]
    Misaligned,
    #[error("bad session magic {0:#x}")]
    BadMagic(u32),
    #[error("unsupported session layout version {0}")]
    BadVersion(u32),
    #[error("invalid table limits: first {first:#x}, last {last:#x}")]
    BadLimits { first: u32, last: u32 },
    #[error("published handle count {count:#x} exceeds maximum {max:#x}")]
    Corrupt { count: u32, max: u32 },
}
