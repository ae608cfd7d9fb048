use libc::{c_int, c_void, off_t};
use log::warn;
use nix::errno::Errno;
use std::os::unix::prelude::AsRawFd;
use std::ptr::{self, NonNull};

use crate::fd::BackingFd;
use crate::region::MappedRegion;
use crate::result::{Error, Result};

/// Unmaps a mapping that never became a `MappedRegion`.
unsafe fn discard(addr: *mut c_void, length: usize) -> Result<()> {
    Errno::result(libc::munmap(addr, length))
        .map(|_| ())
        .map_err(|e| Error::os("munmap", e))
}

/// Maps `length` bytes of `fd` (or anonymous memory for the sentinel).
///
/// The descriptor is handed back on success. On failure it is closed before
/// the error is returned, so a failed mapping never leaks the duplicate.
pub fn map(
    length: usize,
    prot: c_int,
    flags: c_int,
    mut fd: BackingFd,
    offset: off_t,
) -> Result<(MappedRegion, BackingFd)> {
    let addr = unsafe { libc::mmap(ptr::null_mut(), length, prot, flags, fd.as_raw_fd(), offset) };
    if addr == libc::MAP_FAILED {
        let errno = Errno::last();
        if let Err(e) = fd.close() {
            warn!("failed to release descriptor after failed mmap: {}", e);
        }
        return Err(Error::os("mmap", errno));
    }

    match NonNull::new(addr as *mut u8) {
        Some(addr) => Ok((unsafe { MappedRegion::from_raw(addr, length) }, fd)),
        None => {
            // only possible with MAP_FIXED at address zero
            if let Err(e) = unsafe { discard(addr, length) } {
                warn!("failed to unmap null mapping ({}B): {}", length, e);
            }
            if let Err(e) = fd.close() {
                warn!("failed to release descriptor after failed mmap: {}", e);
            }
            Err(Error::os("mmap", Errno::EINVAL))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{page_size, MAP_ANONYMOUS, MAP_PRIVATE, MAP_SHARED, PROT_READ, PROT_WRITE};
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn test_map_anonymous() {
        let (region, fd) = map(
            page_size(),
            PROT_READ | PROT_WRITE,
            MAP_PRIVATE | MAP_ANONYMOUS,
            BackingFd::anonymous(),
            0,
        )
        .expect("mmap failed");
        assert!(fd.is_sentinel());
        assert_eq!(region.len(), page_size());
        region.unmap().expect("munmap failed");
    }

    #[test]
    fn test_discard() {
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                page_size(),
                PROT_READ,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(addr, libc::MAP_FAILED);
        assert_eq!(unsafe { discard(addr, page_size()) }, Ok(()));

        // munmap rejects addresses that are not page aligned
        let unaligned = (addr as usize + 1) as *mut c_void;
        assert_eq!(
            unsafe { discard(unaligned, page_size()) },
            Err(Error::os("munmap", Errno::EINVAL))
        );
    }

    #[test]
    fn test_map_failure_reports_errno() {
        let mut tmp = tempfile::NamedTempFile::new().expect("cannot create tempfile");
        tmp.write_all(&[0u8; 64]).expect("cannot write tempfile");
        let readonly = File::open(tmp.path()).expect("cannot open tempfile");
        let fd = BackingFd::duplicate(readonly.as_raw_fd()).expect("dup failed");

        // a writable shared mapping of a read-only descriptor is refused
        let err = map(64, PROT_READ | PROT_WRITE, MAP_SHARED, fd, 0).expect_err("EACCES");
        assert_eq!(err, Error::os("mmap", Errno::EACCES));
    }

    #[test]
    fn test_map_zero_length() {
        let err = map(
            0,
            PROT_READ,
            MAP_PRIVATE | MAP_ANONYMOUS,
            BackingFd::anonymous(),
            0,
        )
        .expect_err("zero length mappings are invalid");
        assert_eq!(err.errno(), Some(Errno::EINVAL));
    }
}
