//! Memory-or-disk accumulator
//!
//! Bytes accumulate in a [`Blob`] until the total would pass a threshold.
//! At that point everything moves into a temporary file and stays there:
//! once spilled, appends never go back to memory. [`MemDisk::finish`]
//! maps the spill file so either backing reads as one contiguous slice.

use std::path::{Path, PathBuf};

use iobase_core::{kdebug, Blob};

use crate::config::RuntimeConfig;
use crate::file::{Access, File};

pub struct MemDisk<'a> {
    threshold: usize,
    template: PathBuf,
    /// permission bits of the spill file
    perms: u32,
    mem: Blob<'a>,
    disk: Option<File>,
    /// bytes written to `disk`
    spilled: usize,
}

impl<'a> MemDisk<'a> {
    /// Keep up to `threshold` bytes in memory; spill to a file created
    /// from `template` (mkstemp-style, ending in `XXXXXX`).
    pub fn new(threshold: usize, template: impl AsRef<Path>) -> Self {
        Self {
            threshold,
            template: template.as_ref().to_path_buf(),
            perms: 0o600,
            mem: Blob::new(),
            disk: None,
            spilled: 0,
        }
    }

    /// Threshold and template from `config`; the spill file gets
    /// `config.create_mode` instead of `0o600`.
    pub fn with_config(config: &RuntimeConfig) -> Self {
        let mut md = Self::new(config.memdisk_threshold, &config.tmp_template);
        md.perms = config.create_mode;
        md
    }

    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        if let Some(disk) = &mut self.disk {
            if disk.append(bytes) {
                self.spilled += bytes.len();
            }
            return self;
        }

        if self.mem.len() + bytes.len() > self.threshold {
            self.spill(bytes);
        } else {
            self.mem.append(bytes);
        }
        self
    }

    fn spill(&mut self, bytes: &[u8]) {
        let mut disk = File::open_with_mode_bits(&self.template, Access::Temporary, self.perms);
        kdebug!(
            "memdisk spilling {} bytes to {}",
            self.mem.len() + bytes.len(),
            disk.path().display()
        );

        if disk.append(self.mem.data()) && disk.append(bytes) {
            self.spilled = self.mem.len() + bytes.len();
        }
        self.mem.reset();
        self.disk = Some(disk);
    }

    /// Use caller memory as the in-memory contents. Refused once spilled.
    pub fn wrap(&mut self, bytes: &'a [u8]) -> bool {
        if self.disk.is_some() {
            return false;
        }
        self.mem.wrap(bytes);
        true
    }

    /// Map the spill file, if any, over everything written so far.
    pub fn finish(&mut self) -> bool {
        match &mut self.disk {
            Some(disk) => disk.remap(0),
            None => true,
        }
    }

    #[inline]
    pub fn is_spilled(&self) -> bool {
        self.disk.is_some()
    }

    /// Health of whichever backing is active.
    pub fn is_ok(&self) -> bool {
        self.disk.as_ref().map_or(true, File::is_ok)
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        match &self.disk {
            Some(_) => self.spilled,
            None => self.mem.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accumulated bytes. After spilling this is only complete once
    /// `finish` has mapped the file.
    pub fn data(&self) -> &[u8] {
        match &self.disk {
            Some(disk) => disk.data(),
            None => self.mem.data(),
        }
    }

    pub fn get(&self, index: usize) -> Option<u8> {
        self.data().get(index).copied()
    }

    /// Spill file, if any.
    pub fn file(&self) -> Option<&File> {
        self.disk.as_ref()
    }
}

impl std::fmt::Debug for MemDisk<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemDisk")
            .field("threshold", &self.threshold)
            .field("len", &self.len())
            .field("spilled", &self.is_spilled())
            .finish()
    }
}
