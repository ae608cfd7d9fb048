use libc::{c_int, off_t};
use log::{debug, warn};
use std::os::unix::prelude::{AsRawFd, RawFd};
use std::rc::Rc;
use std::slice;

use crate::access::Access;
use crate::fd::{BackingFd, SENTINEL};
use crate::mapper;
use crate::region::{export_count, Export, MappedRegion};
use crate::result::{Error, Result};
use crate::validate::validate;

/// Raw creation parameters, bit-compatible with mmap(2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapArgs {
    /// Backing descriptor or `-1` for anonymous memory.
    pub fd: RawFd,
    /// 0 maps from `offset` to the end of the file.
    pub length: usize,
    /// `MAP_SHARED` or `MAP_PRIVATE`.
    pub flags: c_int,
    pub prot: c_int,
    pub offset: off_t,
}

impl MapArgs {
    pub fn anonymous(length: usize, flags: c_int, prot: c_int) -> MapArgs {
        MapArgs {
            fd: SENTINEL,
            length,
            flags,
            prot,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Open,
    Closed,
}

/// An open memory mapping together with the descriptor backing it.
///
/// The handle owns a private duplicate of the caller's descriptor, so the
/// caller may close its own at any time. Permissions are fixed at creation.
/// Once closed, every accessor fails with `Error::Closed`.
///
/// Handles are confined to the thread that created them.
#[derive(Debug)]
pub struct MappingHandle {
    region: Option<Rc<MappedRegion>>,
    fd: BackingFd,
    access: Access,
    anonymous: bool,
    state: State,
}

impl MappingHandle {
    pub fn create(
        fd: RawFd,
        length: usize,
        flags: c_int,
        prot: c_int,
        offset: off_t,
    ) -> Result<MappingHandle> {
        MappingHandle::create_with(&MapArgs {
            fd,
            length,
            flags,
            prot,
            offset,
        })
    }

    pub fn create_with(args: &MapArgs) -> Result<MappingHandle> {
        let request = validate(args.fd, args.length, args.offset)?;
        let access = Access::from_raw(args.prot, args.flags);

        let (owned, flags) = BackingFd::acquire(request.backing, args.flags)?;
        let (region, owned) =
            mapper::map(request.length, args.prot, flags, owned, request.offset)?;

        debug!(
            "mmap fd={} (dup {}) len={} flags={:#x} prot={:#x} offset={} -> {:?}",
            args.fd,
            owned.as_raw_fd(),
            region.len(),
            flags,
            args.prot,
            request.offset,
            region.as_ptr()
        );

        Ok(MappingHandle {
            region: Some(Rc::new(region)),
            fd: owned,
            access,
            anonymous: request.is_anonymous(),
            state: State::Open,
        })
    }

    /// Releases the descriptor and the mapped region.
    ///
    /// Both steps always run; the first failure is reported. Closing a closed
    /// handle does nothing. Refused while exports are alive.
    pub fn close(&mut self) -> Result<()> {
        if self.state == State::Closed {
            return Ok(());
        }
        let exports = self.exports();
        if exports > 0 {
            return Err(Error::Exported(exports));
        }
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let fd_res = self.fd.close();
        let unmap_res = match self.region.take() {
            // a shared region is unmapped by whoever drops the last export
            Some(region) => Rc::try_unwrap(region).map_or(Ok(()), MappedRegion::unmap),
            None => Ok(()),
        };
        self.state = State::Closed;
        debug!("mmap closed");
        fd_res.and(unmap_res)
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }

    fn region(&self) -> Result<&Rc<MappedRegion>> {
        match (self.state, &self.region) {
            (State::Open, Some(region)) => Ok(region),
            _ => Err(Error::Closed),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        self.region().map(|_| ())
    }

    pub fn addr(&self) -> Result<*mut u8> {
        Ok(self.region()?.as_ptr())
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> Result<usize> {
        Ok(self.region()?.len())
    }

    /// The handle's own descriptor, `-1` for anonymous mappings.
    pub fn fd(&self) -> Result<RawFd> {
        self.ensure_open()?;
        Ok(self.fd.as_raw_fd())
    }

    pub fn access(&self) -> Result<Access> {
        self.ensure_open()?;
        Ok(self.access)
    }

    pub fn readable(&self) -> Result<bool> {
        Ok(self.access()?.contains(Access::READABLE))
    }

    pub fn writable(&self) -> Result<bool> {
        Ok(self.access()?.contains(Access::WRITABLE))
    }

    pub fn copy_on_write(&self) -> Result<bool> {
        Ok(self.access()?.contains(Access::COPY_ON_WRITE))
    }

    /// Number of live `Export`s. 0 once closed.
    pub fn exports(&self) -> usize {
        self.region.as_ref().map_or(0, export_count)
    }

    pub fn export(&self) -> Result<Export> {
        Ok(Export::new(Rc::clone(self.region()?)))
    }

    /// The mapped bytes. Like any shared file mapping, the contents change
    /// if other processes write to the file, and truncating the file under
    /// the mapping makes access fault.
    pub fn as_slice(&self) -> Result<&[u8]> {
        let region = self.region()?;
        if !self.access.contains(Access::READABLE) {
            return Err(Error::Access("readable"));
        }
        // the region stays mapped while `self` is borrowed: close needs `&mut self`
        Ok(unsafe { slice::from_raw_parts(region.as_ptr(), region.len()) })
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [u8]> {
        let region = self.region()?;
        if !self.access.contains(Access::WRITABLE) {
            return Err(Error::Access("writable"));
        }
        let exports = export_count(region);
        if exports > 0 {
            return Err(Error::Exported(exports));
        }
        Ok(unsafe { slice::from_raw_parts_mut(region.as_ptr(), region.len()) })
    }
}

impl Drop for MappingHandle {
    fn drop(&mut self) {
        if self.state == State::Closed {
            return;
        }
        if let Err(e) = self.release() {
            warn!("failed to release mmap: {}", e);
        }
    }
}
