use bitflags::bitflags;
use libc::c_int;

use crate::consts::{MAP_PRIVATE, MAP_SHARED, PROT_READ, PROT_WRITE};

bitflags! {
    /// Capabilities of a mapping, frozen when it is created.
    pub struct Access: u8 {
        /// Mapped with `PROT_READ`.
        const READABLE =      1;
        /// Mapped with `PROT_WRITE`.
        const WRITABLE =      1 << 1;
        /// Mapped `MAP_PRIVATE`: writes never reach the backing file.
        const COPY_ON_WRITE = 1 << 2;
    }
}

/// True when `flags` requests a private mapping. `MAP_SHARED_VALIDATE` sets both
/// sharing bits and counts as shared.
pub fn is_private(flags: c_int) -> bool {
    flags & MAP_PRIVATE != 0 && flags & MAP_SHARED == 0
}

impl Access {
    pub fn from_raw(prot: c_int, flags: c_int) -> Access {
        let mut access = Access::empty();
        if prot & PROT_READ != 0 {
            access |= Access::READABLE;
        }
        if prot & PROT_WRITE != 0 {
            access |= Access::WRITABLE;
        }
        if is_private(flags) {
            access |= Access::COPY_ON_WRITE;
        }
        access
    }
}
