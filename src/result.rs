use nix::errno::Errno;
use std::result;
use thiserror::Error;

/// Everything that can go wrong while creating, inspecting or releasing a mapping.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Rejected before any OS resource was acquired.
    #[error("{0}")]
    Validation(&'static str),
    /// A system call failed. `op` names the call.
    #[error("{op} failed: {errno}")]
    Os { op: &'static str, errno: Errno },
    #[error("mmap closed or invalid")]
    Closed,
    /// The mapping lacks the permission named here.
    #[error("mmap is not {0}")]
    Access(&'static str),
    #[error("cannot close or mutate mmap: {0} exported views are still alive")]
    Exported(usize),
}

impl Error {
    pub(crate) fn os(op: &'static str, errno: Errno) -> Error {
        Error::Os { op, errno }
    }

    /// The native error code, if this error came from a system call.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            Error::Os { errno, .. } => Some(*errno),
            _ => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_carries_errno() {
        let err = Error::os("dup", Errno::EBADF);
        assert_eq!(err.errno(), Some(Errno::EBADF));
        assert!(err.to_string().starts_with("dup failed"));
        assert_eq!(Error::Closed.errno(), None);
    }
}
