//! # iobase-core
//!
//! Byte-level building blocks for the iobase runtime.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Files, iterators and the event loop live in `iobase-runtime`.
//!
//! ## Modules
//!
//! - `blob` - growable byte buffer, owning or borrowing
//! - `tmpmem` - append-only registry of shared owners
//! - `sequence` - zero-copy concatenation of byte views
//! - `error` - Error types
//! - `kprint` - Leveled stderr logging macros
//! - `env` - Environment variable utilities

pub mod blob;
pub mod tmpmem;
pub mod sequence;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use blob::Blob;
pub use tmpmem::TmpMem;
pub use sequence::BlobSequence;
pub use error::{IobError, IobResult};
pub use kprint::{LogLevel, set_log_level};
pub use env::{env_get, env_get_bool, env_get_octal, env_get_opt, env_get_str};
