use libc::off_t;
use nix::sys::stat::fstat;
use std::convert::TryFrom;
use std::os::unix::prelude::RawFd;

use crate::fd::SENTINEL;
use crate::result::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    Anonymous,
    /// Caller-owned descriptor. Not duplicated yet.
    Descriptor(RawFd),
}

/// A mapping request whose length has been checked against (or derived from)
/// the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub backing: Backing,
    pub length: usize,
    pub offset: off_t,
}

impl Request {
    pub fn is_anonymous(&self) -> bool {
        self.backing == Backing::Anonymous
    }
}

/// Checks `length` and `offset` against the size of the file behind `fd`.
///
/// A `length` of 0 maps everything from `offset` to the end of the file.
/// Descriptors that are not regular files (or cannot be stat'ed) are passed
/// through unchecked; the kernel has the final word on those.
pub fn validate(fd: RawFd, length: usize, offset: off_t) -> Result<Request> {
    if offset < 0 {
        return Err(Error::Validation("mmap offset must be non-negative"));
    }
    if fd == SENTINEL {
        return Ok(Request {
            backing: Backing::Anonymous,
            length,
            offset,
        });
    }

    let length = match fstat(fd) {
        Ok(st) if st.st_mode & libc::S_IFMT == libc::S_IFREG => {
            check_file_size(st.st_size, length, offset)?
        }
        _ => length,
    };

    Ok(Request {
        backing: Backing::Descriptor(fd),
        length,
        offset,
    })
}

fn check_file_size(size: off_t, length: usize, offset: off_t) -> Result<usize> {
    if length == 0 {
        if size == 0 {
            return Err(Error::Validation("cannot mmap an empty file"));
        }
        if offset >= size {
            return Err(Error::Validation("mmap offset is greater than file size"));
        }
        return usize::try_from(size - offset)
            .map_err(|_| Error::Validation("mmap length is greater than address space"));
    }

    let too_long = Error::Validation("mmap length is greater than file size");
    if offset > size {
        return Err(too_long);
    }
    match u64::try_from(size - offset) {
        Ok(available) if available >= length as u64 => Ok(length),
        _ => Err(too_long),
    }
}
