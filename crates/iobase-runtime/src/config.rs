//! Runtime configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables (`from_env`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use iobase_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .chunk_size(16 * 1024)
//!     .memdisk_threshold(4 << 20);
//! ```

use std::time::Duration;

use iobase_core::env::{env_get, env_get_octal, env_get_str};

pub mod defaults {
    /// Bytes per chunk read by the file iterators
    pub const CHUNK_SIZE: usize = 64 * 1024;
    /// Events fetched per kernel wait
    pub const WAIT_CAPACITY: usize = 100;
    /// Ceiling on a single kernel wait; a wait that reaches it simply returns
    pub const WAIT_TIMEOUT_MS: u64 = 24 * 60 * 60 * 1000;
    /// Bytes the memory-or-disk accumulator keeps in memory
    pub const MEMDISK_THRESHOLD: usize = 1024 * 1024;
    /// mkstemp-style template for spill files
    pub const TMP_TEMPLATE: &str = "/tmp/iobase.XXXXXX";
    /// Permission bits for files created by `File::open` and `File::open_with_config`
    pub const CREATE_MODE: u32 = 0o644;
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub chunk_size: usize,
    pub wait_capacity: usize,
    pub wait_timeout: Duration,
    pub memdisk_threshold: usize,
    pub tmp_template: String,
    pub create_mode: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Library defaults overridden by any of:
    /// - `IOB_CHUNK_SIZE`
    /// - `IOB_WAIT_CAPACITY`
    /// - `IOB_WAIT_TIMEOUT_MS`
    /// - `IOB_MEMDISK_THRESHOLD`
    /// - `IOB_TMP_TEMPLATE`
    /// - `IOB_CREATE_MODE` (octal)
    pub fn from_env() -> Self {
        Self {
            chunk_size: env_get("IOB_CHUNK_SIZE", defaults::CHUNK_SIZE),
            wait_capacity: env_get("IOB_WAIT_CAPACITY", defaults::WAIT_CAPACITY),
            wait_timeout: Duration::from_millis(env_get(
                "IOB_WAIT_TIMEOUT_MS",
                defaults::WAIT_TIMEOUT_MS,
            )),
            memdisk_threshold: env_get("IOB_MEMDISK_THRESHOLD", defaults::MEMDISK_THRESHOLD),
            tmp_template: env_get_str("IOB_TMP_TEMPLATE", defaults::TMP_TEMPLATE),
            create_mode: env_get_octal("IOB_CREATE_MODE", defaults::CREATE_MODE),
        }
    }

    /// Library defaults only, ignoring the environment.
    pub fn new() -> Self {
        Self {
            chunk_size: defaults::CHUNK_SIZE,
            wait_capacity: defaults::WAIT_CAPACITY,
            wait_timeout: Duration::from_millis(defaults::WAIT_TIMEOUT_MS),
            memdisk_threshold: defaults::MEMDISK_THRESHOLD,
            tmp_template: defaults::TMP_TEMPLATE.to_string(),
            create_mode: defaults::CREATE_MODE,
        }
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    pub fn wait_capacity(mut self, n: usize) -> Self {
        self.wait_capacity = n;
        self
    }

    pub fn wait_timeout(mut self, d: Duration) -> Self {
        self.wait_timeout = d;
        self
    }

    pub fn memdisk_threshold(mut self, n: usize) -> Self {
        self.memdisk_threshold = n;
        self
    }

    pub fn tmp_template(mut self, template: impl Into<String>) -> Self {
        self.tmp_template = template.into();
        self
    }

    pub fn create_mode(mut self, mode: u32) -> Self {
        self.create_mode = mode;
        self
    }

    /// Kernel wait timeout in milliseconds, clamped to what `epoll_wait` accepts.
    pub fn wait_timeout_ms(&self) -> i32 {
        self.wait_timeout.as_millis().min(i32::MAX as u128) as i32
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::InvalidValue("chunk_size must be > 0"));
        }
        if self.wait_capacity == 0 {
            return Err(ConfigError::InvalidValue("wait_capacity must be > 0"));
        }
        if !self.tmp_template.ends_with("XXXXXX") {
            return Err(ConfigError::InvalidValue("tmp_template must end in XXXXXX"));
        }
        if self.create_mode > 0o7777 {
            return Err(ConfigError::InvalidValue("create_mode must be <= 0o7777"));
        }
        Ok(())
    }

    pub fn print(&self) {
        eprintln!("iobase configuration:");
        eprintln!("  chunk_size:         {}", self.chunk_size);
        eprintln!("  wait_capacity:      {}", self.wait_capacity);
        eprintln!("  wait_timeout:       {:?}", self.wait_timeout);
        eprintln!("  memdisk_threshold:  {}", self.memdisk_threshold);
        eprintln!("  tmp_template:       {}", self.tmp_template);
        eprintln!("  create_mode:        {:o}", self.create_mode);
    }
}

#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
