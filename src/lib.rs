#![deny(clippy::print_stdout, clippy::print_stderr, clippy::unwrap_used)]

pub mod access;
pub mod consts;
pub mod fd;
pub mod mapper;
pub mod mmap;
pub mod region;
pub mod result;
pub mod validate;

pub use access::Access;
pub use mmap::{MapArgs, MappingHandle, State};
pub use region::Export;
pub use result::{Error, Result};
