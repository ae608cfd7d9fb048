use libc::c_void;
use log::warn;
use nix::errno::Errno;
use std::mem;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::result::{Error, Result};

/// Live mapped memory. Unmapped by `unmap` or, failing that, on drop.
#[derive(Debug)]
pub struct MappedRegion {
    addr: NonNull<u8>,
    len: usize,
}

unsafe fn munmap_raw(addr: NonNull<u8>, len: usize) -> Result<()> {
    let res = libc::munmap(addr.as_ptr() as *mut c_void, len);
    Errno::result(res)
        .map(|_| ())
        .map_err(|e| Error::os("munmap", e))
}

impl MappedRegion {
    /// # Safety
    ///
    /// `addr..addr + len` must be a mapping returned by mmap(2) that nothing
    /// else unmaps.
    pub(crate) unsafe fn from_raw(addr: NonNull<u8>, len: usize) -> MappedRegion {
        MappedRegion { addr, len }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.addr.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn unmap(self) -> Result<()> {
        let res = unsafe { munmap_raw(self.addr, self.len) };
        // the region is gone whether or not munmap succeeded; never retry it
        mem::forget(self);
        res
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap_raw(self.addr, self.len) } {
            warn!("failed to unmap {:?} ({}B): {}", self.addr, self.len, e);
        }
    }
}

/// A counted view of a mapping handed out to code outside the borrow
/// checker's reach (buffer exporters in a binding layer). The mapping cannot
/// be closed while an `Export` is alive and stays mapped until the last one
/// is dropped.
#[derive(Debug, Clone)]
pub struct Export {
    region: Rc<MappedRegion>,
}

impl Export {
    pub(crate) fn new(region: Rc<MappedRegion>) -> Export {
        Export { region }
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.region.as_ptr()
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }
}

/// Number of exports sharing `region`.
pub(crate) fn export_count(region: &Rc<MappedRegion>) -> usize {
    Rc::strong_count(region) - 1
}
