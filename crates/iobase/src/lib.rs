//! # iobase - byte buffers, mapped files and a readiness loop
//!
//! Low-level I/O building blocks for services that move a lot of bytes.
//!
//! ## Features
//!
//! - **Blob**: growable byte buffer that either owns or borrows its bytes
//! - **BlobSequence**: zero-copy concatenation of byte views kept alive by
//!   a shared-ownership registry (`TmpMem`)
//! - **File**: open/create/inspect with the contents memory-mapped, direct
//!   and synchronous write modes, block devices sized via ioctl
//! - **ChunkIterator / PartIterator**: fixed-size and delimiter-split reads
//! - **MemDisk**: in-memory accumulator that spills to a temporary file
//! - **EventLoop**: epoll/kqueue readiness loop with cross-thread wake
//!
//! ## Quick Start
//!
//! ```ignore
//! use iobase::prelude::*;
//!
//! fn main() {
//!     let file = File::open("access.log", Access::RdOnly);
//!     if !file.is_ok() {
//!         return;
//!     }
//!
//!     let mut parts = PartIterator::new(&file, b"\n", 64 * 1024);
//!     let mut spill = MemDisk::with_config(&RuntimeConfig::from_env());
//!     while let Some(line) = parts.next() {
//!         spill.append(line).append(b"\n");
//!     }
//!     spill.finish();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        File, PartIterator, MemDisk, EventLoop, Blob         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┴───────────────────┐
//!          ▼                                       ▼
//!    ┌──────────────────────────┐      ┌──────────────────────────┐
//!    │      iobase-runtime      │      │       iobase-core        │
//!    │  mmap, pread, epoll,     │ ───► │  Blob, TmpMem, sequence, │
//!    │  kqueue, socketpair      │      │  errors, kprint, env     │
//!    └──────────────────────────┘      └──────────────────────────┘
//! ```
//!
//! ## Environment Variables
//!
//! - `IOB_LOG_LEVEL` - off, error, warn, info, debug, trace
//! - `IOB_FLUSH_EPRINT=1` - flush stderr after every log line
//! - `IOB_CHUNK_SIZE`, `IOB_WAIT_CAPACITY`, `IOB_WAIT_TIMEOUT_MS`,
//!   `IOB_MEMDISK_THRESHOLD`, `IOB_TMP_TEMPLATE`, `IOB_CREATE_MODE` -
//!   see [`RuntimeConfig::from_env`]

// Re-export core types
pub use iobase_core::{
    Blob,
    BlobSequence,
    TmpMem,
    IobError,
    IobResult,
};
pub use iobase_core::blob::find;

// Re-export kprint macros for logging
pub use iobase_core::{kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use iobase_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use iobase_core::{env_get, env_get_bool, env_get_octal, env_get_opt, env_get_str};

// Re-export runtime types
pub use iobase_runtime::{
    Access,
    File,
    FileMode,
    ChunkIterator,
    PartIterator,
    MemDisk,
    RuntimeConfig,
    ConfigError,
};
pub use iobase_runtime::config::defaults;

/// Event loop and node types
pub mod evloop {
    pub use iobase_runtime::evloop::*;
}

pub use iobase_runtime::{EventLoop, Event, Filter, Flags, Node, Token, Trigger, Waker};

/// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Blob,
        BlobSequence,
        TmpMem,
        IobError,
        IobResult,
        Access,
        File,
        FileMode,
        ChunkIterator,
        PartIterator,
        MemDisk,
        RuntimeConfig,
        EventLoop,
        Event,
        Filter,
        Flags,
        Node,
        Token,
    };
    pub use crate::evloop::{Completion, FnNode, SelfAlive, DerefAlive};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_prelude_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("facade");

        let mut file = File::open(&path, Access::Create);
        assert!(file.append(b"x|y"));
        drop(file);

        let file = File::open(&path, Access::RdOnly);
        let mut parts = PartIterator::new(&file, b"|", 2);
        let mut seq = BlobSequence::new();
        while let Some(p) = parts.next() {
            seq.concat_blob(Blob::copy_from(p));
        }
        assert_eq!(seq.to_vec(), b"xy");
    }
}
