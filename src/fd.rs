use libc::c_int;
use log::warn;
use nix::fcntl::{fcntl, FcntlArg};
use nix::unistd::close;
use std::mem;
use std::os::unix::prelude::{AsRawFd, RawFd};

use crate::consts::MAP_ANONYMOUS;
use crate::result::{Error, Result};
use crate::validate::Backing;

/// Descriptor value meaning "no backing file".
pub const SENTINEL: RawFd = -1;

/// The descriptor a mapping holds on to. Either a private duplicate of the
/// caller's descriptor or `SENTINEL` for anonymous mappings.
#[derive(Debug)]
pub struct BackingFd {
    fd: RawFd,
}

impl BackingFd {
    pub fn anonymous() -> BackingFd {
        BackingFd { fd: SENTINEL }
    }

    /// Duplicates `fd` with `FD_CLOEXEC` set. The duplicate outlives the
    /// caller's descriptor: closing the original does not affect it.
    pub fn duplicate(fd: RawFd) -> Result<BackingFd> {
        let fd = fcntl(fd, FcntlArg::F_DUPFD_CLOEXEC(0)).map_err(|e| Error::os("dup", e))?;
        Ok(BackingFd { fd })
    }

    /// Takes ownership of the descriptor for `backing` and returns the mmap
    /// flags to use with it (`MAP_ANONYMOUS` added for anonymous mappings).
    pub fn acquire(backing: Backing, flags: c_int) -> Result<(BackingFd, c_int)> {
        match backing {
            Backing::Anonymous => Ok((BackingFd::anonymous(), flags | MAP_ANONYMOUS)),
            Backing::Descriptor(fd) => Ok((BackingFd::duplicate(fd)?, flags)),
        }
    }

    #[cfg(test)]
    pub(crate) fn from_raw(fd: RawFd) -> BackingFd {
        BackingFd { fd }
    }

    pub fn is_sentinel(&self) -> bool {
        self.fd == SENTINEL
    }

    /// Closes the descriptor. The stored value becomes `SENTINEL` even if
    /// close(2) fails, so this never closes the same number twice.
    pub fn close(&mut self) -> Result<()> {
        if self.is_sentinel() {
            return Ok(());
        }
        let fd = mem::replace(&mut self.fd, SENTINEL);
        close(fd).map_err(|e| Error::os("close", e))
    }
}

impl AsRawFd for BackingFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for BackingFd {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close mapping descriptor: {}", e);
        }
    }
}
