use lazy_static::lazy_static;
use libc::c_int;
use nix::unistd::{sysconf, SysconfVar};

pub const PROT_READ: c_int = libc::PROT_READ;
pub const PROT_WRITE: c_int = libc::PROT_WRITE;
pub const PROT_EXEC: c_int = libc::PROT_EXEC;
pub const MAP_SHARED: c_int = libc::MAP_SHARED;
pub const MAP_PRIVATE: c_int = libc::MAP_PRIVATE;
pub const MAP_ANONYMOUS: c_int = libc::MAP_ANONYMOUS;

lazy_static! {
    /// Native page size, queried once per process.
    pub static ref PAGESIZE: usize = query_page_size();
}

fn query_page_size() -> usize {
    // _SC_PAGESIZE is always defined on the platforms we support
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as usize,
        _ => 4096,
    }
}

pub fn page_size() -> usize {
    *PAGESIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_is_native() {
        let native = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        assert_eq!(page_size(), native as usize);
        assert!(page_size().is_power_of_two());
    }
}
