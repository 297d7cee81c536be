//! # iobase-runtime
//!
//! OS-facing half of iobase.
//!
//! This crate provides:
//! - Files with optional memory mapping, direct and synchronous modes
//! - Chunked and delimiter-split sequential readers
//! - A memory-or-disk accumulator that spills to a temporary file
//! - A readiness event loop over epoll (Linux) or kqueue (BSD, macOS)
//!
//! Byte buffers, sequences and logging come from `iobase-core`.

#[cfg(not(unix))]
compile_error!("iobase-runtime supports unix targets only");

pub mod config;
pub mod file;
pub mod chunks;
pub mod memdisk;
pub mod evloop;

mod blkdev;
mod sys;

// Re-exports
pub use config::{ConfigError, RuntimeConfig};
pub use file::{Access, File, FileMode};
pub use chunks::{ChunkIterator, PartIterator};
pub use memdisk::MemDisk;
pub use evloop::{
    fatal, Alive, AliveCheck, Completion, DerefAlive, Event, EventLoop, Filter, Flags, FnNode,
    Node, SelfAlive, Token, Trigger, Waker,
};
