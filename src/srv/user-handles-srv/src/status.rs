use num_enum::{IntoPrimitive, TryFromPrimitive};
use user_handles::HandleError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
/// Status codes reported back to the requesting process.
pub enum Status {
    Success = 0,
    NotImplemented = 0xC000_0002,
    InvalidHandle = 0xC000_0008,
    InvalidParameter = 0xC000_000D,
    InsufficientResources = 0xC000_009A,
}

impl Status {
    /// The code as it travels in a reply word.
    pub fn code(self) -> u64 {
        u32::from(self) as u64
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl core::fmt::Display for Status {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Self::Success => "success",
            Self::NotImplemented => "not implemented",
            Self::InvalidHandle => "invalid handle",
            Self::InvalidParameter => "invalid parameter",
            Self::InsufficientResources => "insufficient resources",
        };
        f.write_str(msg)
    }
}

impl From<HandleError> for Status {
    fn from(value: HandleError) -> Self {
        match value {
            HandleError::Exhausted => Self::InsufficientResources,
            HandleError::Invalid => Self::InvalidHandle,
            HandleError::Unknown => Self::InvalidParameter,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u64)]
/// Requests a client process may send to the owner.
pub enum Opcode {
    AllocUserHandle = 1,
    FreeUserHandle = 2,
}

impl Opcode {
    /// Number of argument words the request carries.
    pub fn num_args(&self) -> usize {
        match self {
            Self::AllocUserHandle => 1,
            Self::FreeUserHandle => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn codes() {
        assert_eq!(Status::InvalidHandle.code(), 0xC000_0008);
        assert_eq!(Status::try_from(0xC000_009Au32), Ok(Status::InsufficientResources));
        assert!(Status::try_from(1u32).is_err());
        assert_eq!(Status::from(HandleError::Exhausted), Status::InsufficientResources);
        assert_eq!(Status::from(HandleError::Invalid), Status::InvalidHandle);
        assert_eq!(Opcode::try_from(2u64), Ok(Opcode::FreeUserHandle));
        assert!(Opcode::try_from(0u64).is_err());
    }

    #[test]
    fn only_failures_are_reported_as_failures() {
        assert!(Status::Success.is_success());
        assert!(!Status::InvalidHandle.is_success());
        assert_eq!(Status::Success.code(), 0);
        assert_eq!(Status::InvalidParameter.to_string(), "invalid parameter");
    }
}
