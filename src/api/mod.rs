//! API module
//!
//! The C-compatible boundary: `dbx_` entry points and their codec.

mod codec;
pub mod ffi;

pub use ffi::DbxHandle;
