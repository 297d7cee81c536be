//! File handle with optional memory mapping
//!
//! A [`File`] opens, creates or merely inspects a path according to a
//! [`FileMode`]. Random-access modes are stat'ed and mapped right away so
//! [`File::data`] is usable immediately. Sequential modes stat lazily,
//! the first time a length is needed.
//!
//! # Health flag
//!
//! Any failing OS call (open, stat, mmap, truncate, sync, seek, write)
//! is logged, recorded in [`File::last_error`], and drops the handle's
//! health flag. After that every data operation is a no-op returning
//! `false`/`None`. Dropping the handle still releases the mapping and the
//! descriptor, and a temporary file still unlinks itself.
//!
//! ```ignore
//! let file = File::open("/var/data/blob", Access::RdOnly);
//! if !file.is_ok() {
//!     return;
//! }
//! consume(file.data());
//! ```

use std::cell::Cell;
use std::io::SeekFrom;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use iobase_core::error::{IobError, IobResult};
use iobase_core::{kdebug, kerror, kwarn};

use crate::blkdev;
use crate::config::{defaults, RuntimeConfig};
use crate::sys::{self, AlignedBuf, DIRECT_ALIGN};

/// How a path is accessed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// stat only; no descriptor is kept open
    Info,
    RdOnly,
    RdWr,
    WrOnly,
    /// read-write, created if missing, truncated if present
    Create,
    /// read-write, fails if the path exists
    CreateExclusive,
    /// `mkstemp` on the path as a template, unlinked on drop
    Temporary,
    /// read-only bypassing the page cache; never mapped
    DirectRdOnly,
    /// read-write bypassing the page cache; never mapped
    DirectRdWr,
}

/// An [`Access`] plus whether every write must be durable before it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode {
    pub access: Access,
    pub sync: bool,
}

impl FileMode {
    pub const fn new(access: Access) -> Self {
        Self { access, sync: false }
    }

    /// Synchronous-write variant of this mode.
    pub const fn sync(mut self) -> Self {
        self.sync = true;
        self
    }

    #[inline]
    pub fn is_direct(&self) -> bool {
        matches!(self.access, Access::DirectRdOnly | Access::DirectRdWr)
    }

    /// Modes that are stat'ed and mapped at open time.
    #[inline]
    fn maps_on_open(&self) -> bool {
        matches!(self.access, Access::RdOnly | Access::RdWr)
    }

    #[inline]
    fn can_map(&self) -> bool {
        !self.is_direct() && !matches!(self.access, Access::Info | Access::WrOnly)
    }

    #[inline]
    fn read_only(&self) -> bool {
        matches!(self.access, Access::RdOnly | Access::DirectRdOnly)
    }

    /// Whether `O_SYNC` can go straight into `open(2)` for this mode.
    /// Elsewhere the write paths `fsync` after every write instead.
    fn sync_in_open_flags(&self) -> bool {
        if !self.sync || self.access == Access::Temporary {
            return false;
        }
        cfg!(any(target_os = "linux", target_os = "android")) || !self.is_direct()
    }

    fn open_flags(&self) -> libc::c_int {
        let mut flags = match self.access {
            Access::Info => 0,
            Access::RdOnly | Access::DirectRdOnly => libc::O_RDONLY,
            Access::RdWr | Access::DirectRdWr => libc::O_RDWR,
            Access::WrOnly => libc::O_WRONLY,
            Access::Create => libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC,
            Access::CreateExclusive | Access::Temporary => {
                libc::O_RDWR | libc::O_CREAT | libc::O_EXCL
            }
        };

        #[cfg(any(target_os = "linux", target_os = "android"))]
        if self.is_direct() {
            flags |= libc::O_DIRECT;
        }

        if self.sync_in_open_flags() {
            flags |= libc::O_SYNC;
        }

        flags | libc::O_CLOEXEC
    }

    fn prot(&self) -> libc::c_int {
        if self.read_only() {
            libc::PROT_READ
        } else {
            libc::PROT_READ | libc::PROT_WRITE
        }
    }
}

impl From<Access> for FileMode {
    fn from(access: Access) -> Self {
        FileMode::new(access)
    }
}

#[derive(Debug, Clone, Copy)]
struct Meta {
    len: usize,
    inode: u64,
    block_device: bool,
}

struct Mapping {
    ptr: NonNull<u8>,
    len: usize,
    writable: bool,
}

pub struct File {
    fd: RawFd,
    mode: FileMode,
    path: PathBuf,
    map: Option<Mapping>,
    meta: Cell<Option<Meta>>,
    ok: Cell<bool>,
    last_error: Cell<Option<IobError>>,
    flush_each_write: bool,
    unlink_on_drop: bool,
}

// Safety: the mapping and descriptor are exclusively owned by the handle;
// `Cell` keeps it `!Sync`, so it can move between threads but never be
// shared by two.
unsafe impl Send for File {}

impl File {
    /// Open `path` with `mode`. New files get the default permission bits.
    pub fn open(path: impl AsRef<Path>, mode: impl Into<FileMode>) -> File {
        Self::open_with_mode_bits(path, mode, defaults::CREATE_MODE)
    }

    /// Open `path` with `mode`; new files get `config.create_mode`.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        mode: impl Into<FileMode>,
        config: &RuntimeConfig,
    ) -> File {
        Self::open_with_mode_bits(path, mode, config.create_mode)
    }

    /// Open `path` with `mode`; newly created files get `perms`.
    ///
    /// For [`Access::Temporary`], `path` is a template ending in
    /// `XXXXXX` and [`File::path`] reports the generated name.
    pub fn open_with_mode_bits(path: impl AsRef<Path>, mode: impl Into<FileMode>, perms: u32) -> File {
        let mode = mode.into();
        let mut file = File {
            fd: -1,
            mode,
            path: path.as_ref().to_path_buf(),
            map: None,
            meta: Cell::new(None),
            ok: Cell::new(true),
            last_error: Cell::new(None),
            flush_each_write: mode.sync && !mode.sync_in_open_flags(),
            unlink_on_drop: false,
        };

        if let Err(err) = file.open_impl(perms) {
            file.fail("open", err);
        } else {
            kdebug!("opened {} as {:?}", file.path.display(), mode);
        }
        file
    }

    /// Create a uniquely named file from `template`, unlinked on drop.
    pub fn temporary(template: impl AsRef<Path>) -> File {
        Self::open_with_mode_bits(template, Access::Temporary, 0o600)
    }

    /// stat-only handle.
    pub fn info(path: impl AsRef<Path>) -> File {
        Self::open(path, Access::Info)
    }

    fn open_impl(&mut self, perms: u32) -> IobResult<()> {
        match self.mode.access {
            Access::Info => {
                self.meta.set(Some(self.stat_impl()?));
                return Ok(());
            }
            Access::Temporary => self.open_temporary(perms)?,
            _ => {
                let path = sys::cpath(&self.path)?;
                let flags = self.mode.open_flags();
                let fd = sys::retry(|| unsafe {
                    libc::open(path.as_ptr(), flags, perms as libc::c_uint) as isize
                })
                .map_err(|e| IobError::os("open", e as i32))?;
                self.fd = fd as RawFd;
            }
        }

        #[cfg(any(target_os = "macos", target_os = "ios"))]
        if self.mode.is_direct() && unsafe { libc::fcntl(self.fd, libc::F_NOCACHE, 1) } < 0 {
            return Err(sys::last_os("fcntl(F_NOCACHE)"));
        }

        if self.mode.maps_on_open() {
            self.meta.set(Some(self.stat_impl()?));
            self.map_impl()?;
        } else if self.mode.is_direct() {
            self.meta.set(Some(self.stat_impl()?));
        }
        Ok(())
    }

    fn open_temporary(&mut self, perms: u32) -> IobResult<()> {
        let template = self.path.to_string_lossy().into_owned();
        if !template.ends_with("XXXXXX") {
            return Err(IobError::BadTemplate(template));
        }

        let (fd, path) = nix::unistd::mkstemp(self.path.as_path())
            .map_err(|e| IobError::os("mkstemp", e as i32))?;
        self.fd = fd;
        self.path = path;
        self.unlink_on_drop = true;

        sys::set_cloexec(fd).map_err(|e| IobError::os("fcntl", e as i32))?;
        if perms != 0o600 && unsafe { libc::fchmod(fd, perms as libc::mode_t) } < 0 {
            return Err(sys::last_os("fchmod"));
        }
        Ok(())
    }

    #[inline]
    pub fn is_ok(&self) -> bool {
        self.ok.get()
    }

    /// The error that took the handle down, if any.
    pub fn last_error(&self) -> Option<IobError> {
        let err = self.last_error.take();
        self.last_error.set(err.clone());
        err
    }

    #[inline]
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw descriptor, `-1` for info-only or failed handles.
    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    /// Mapped contents; empty when nothing is mapped.
    pub fn data(&self) -> &[u8] {
        match &self.map {
            // Safety: the mapping stays valid until `unmap`, which needs `&mut self`.
            Some(m) => unsafe { std::slice::from_raw_parts(m.ptr.as_ptr(), m.len) },
            None => &[],
        }
    }

    /// Writable view of the mapping, if the mode mapped it read-write.
    pub fn data_mut(&mut self) -> Option<&mut [u8]> {
        match &self.map {
            // Safety: as `data`, and `&mut self` excludes other views.
            Some(m) if m.writable => {
                Some(unsafe { std::slice::from_raw_parts_mut(m.ptr.as_ptr(), m.len) })
            }
            _ => None,
        }
    }

    /// Bytes currently mapped.
    #[inline]
    pub fn mapped_len(&self) -> usize {
        self.map.as_ref().map_or(0, |m| m.len)
    }

    /// File length, stat'ing first if it is not known yet.
    pub fn len(&self) -> usize {
        self.ensure_meta().map_or(0, |m| m.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inode(&self) -> Option<u64> {
        self.ensure_meta().map(|m| m.inode)
    }

    pub fn is_block_device(&self) -> bool {
        self.ensure_meta().is_some_and(|m| m.block_device)
    }

    /// Refresh length and inode.
    pub fn stat(&self) -> bool {
        if !self.is_ok() {
            return false;
        }
        match self.stat_impl() {
            Ok(meta) => {
                self.meta.set(Some(meta));
                true
            }
            Err(err) => {
                self.fail("stat", err);
                false
            }
        }
    }

    fn ensure_meta(&self) -> Option<Meta> {
        if let Some(meta) = self.meta.get() {
            return Some(meta);
        }
        if self.stat() {
            self.meta.get()
        } else {
            None
        }
    }

    fn stat_impl(&self) -> IobResult<Meta> {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };

        if self.fd >= 0 {
            if unsafe { libc::fstat(self.fd, &mut st) } < 0 {
                return Err(sys::last_os("fstat"));
            }
        } else {
            let path = sys::cpath(&self.path)?;
            if unsafe { libc::stat(path.as_ptr(), &mut st) } < 0 {
                return Err(sys::last_os("stat"));
            }
        }

        let block_device = (st.st_mode & libc::S_IFMT) == libc::S_IFBLK;
        let mut len = st.st_size as usize;

        if block_device {
            len = self.block_device_len()? as usize;
        }

        Ok(Meta { len, inode: st.st_ino as u64, block_device })
    }

    fn block_device_len(&self) -> IobResult<u64> {
        if self.fd >= 0 {
            return blkdev::block_device_size(self.fd)
                .map_err(|e| IobError::os("ioctl(blkgetsize)", e as i32));
        }

        // Info handles keep no descriptor; borrow one just for the query.
        let path = sys::cpath(&self.path)?;
        let fd = unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) };
        if fd < 0 {
            return Err(sys::last_os("open"));
        }
        let size = blkdev::block_device_size(fd)
            .map_err(|e| IobError::os("ioctl(blkgetsize)", e as i32));
        unsafe { libc::close(fd) };
        size
    }

    /// (Re)establish the mapping over the current length.
    pub fn map(&mut self) -> bool {
        if !self.is_ok() {
            return false;
        }
        match self.map_impl() {
            Ok(()) => true,
            Err(err) => {
                self.fail("mmap", err);
                false
            }
        }
    }

    fn map_impl(&mut self) -> IobResult<()> {
        self.unmap();

        if !self.mode.can_map() {
            return Ok(());
        }

        let len = match self.meta.get() {
            Some(meta) => meta.len,
            None => {
                let meta = self.stat_impl()?;
                self.meta.set(Some(meta));
                meta.len
            }
        };

        if len == 0 {
            return Ok(());
        }

        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                self.mode.prot(),
                libc::MAP_SHARED,
                self.fd,
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(sys::last_os("mmap"));
        }

        let ptr = NonNull::new(addr as *mut u8).ok_or(IobError::os("mmap", libc::ENOMEM))?;
        self.map = Some(Mapping { ptr, len, writable: !self.mode.read_only() });
        Ok(())
    }

    pub fn unmap(&mut self) {
        if let Some(m) = self.map.take() {
            if unsafe { libc::munmap(m.ptr.as_ptr() as *mut libc::c_void, m.len) } < 0 {
                kwarn!("munmap {}: {}", self.path.display(), nix::errno::Errno::last());
            }
        }
    }

    /// Truncate or extend the file to `len` and map the new extent.
    pub fn resize(&mut self, len: usize) -> bool {
        if !self.is_ok() {
            return false;
        }
        self.unmap();

        if let Err(e) = sys::retry(|| unsafe { libc::ftruncate(self.fd, len as libc::off_t) as isize }) {
            self.fail("resize", IobError::os("ftruncate", e as i32));
            return false;
        }

        self.meta.set(None);
        self.map()
    }

    /// Map `len` bytes of a file that grew behind our back, without
    /// truncating. `len == 0` re-stats and maps the whole file.
    pub fn remap(&mut self, len: usize) -> bool {
        if !self.is_ok() {
            return false;
        }
        self.unmap();

        if len == 0 {
            self.meta.set(None);
        } else {
            match self.ensure_meta() {
                Some(meta) => self.meta.set(Some(Meta { len, ..meta })),
                None => return false,
            }
        }
        self.map()
    }

    /// Move the descriptor position. Returns the new offset.
    pub fn seek(&mut self, pos: SeekFrom) -> Option<u64> {
        if !self.is_ok() {
            return None;
        }
        let (offset, whence) = match pos {
            SeekFrom::Start(n) => (n as libc::off_t, libc::SEEK_SET),
            SeekFrom::Current(n) => (n as libc::off_t, libc::SEEK_CUR),
            SeekFrom::End(n) => (n as libc::off_t, libc::SEEK_END),
        };

        let ret = unsafe { libc::lseek(self.fd, offset, whence) };
        if ret < 0 {
            self.fail("seek", sys::last_os("lseek"));
            return None;
        }
        Some(ret as u64)
    }

    pub fn seek_to_start(&mut self) -> bool {
        self.seek(SeekFrom::Start(0)).is_some()
    }

    pub fn seek_to_end(&mut self) -> bool {
        self.seek(SeekFrom::End(0)).is_some()
    }

    /// Flush the mapping to the file. Nothing mapped counts as success.
    pub fn msync(&self) -> bool {
        if !self.is_ok() {
            return false;
        }
        let Some(m) = &self.map else {
            return true;
        };
        if unsafe { libc::msync(m.ptr.as_ptr() as *mut libc::c_void, m.len, libc::MS_SYNC) } < 0 {
            self.fail("msync", sys::last_os("msync"));
            return false;
        }
        true
    }

    /// Flush descriptor writes to stable storage.
    pub fn fsync(&self) -> bool {
        if !self.is_ok() {
            return false;
        }
        if let Err(e) = sys::retry(|| unsafe { libc::fsync(self.fd) as isize }) {
            self.fail("fsync", IobError::os("fsync", e as i32));
            return false;
        }
        true
    }

    /// Write all of `bytes` at the descriptor position.
    pub fn append(&mut self, bytes: &[u8]) -> bool {
        if self.mode.is_direct() {
            return self.direct_append(bytes);
        }
        let fd = self.fd;
        self.write_all("write", bytes, |_, rest| unsafe {
            libc::write(fd, rest.as_ptr() as *const libc::c_void, rest.len()) as isize
        })
    }

    /// Write all of `bytes` at `offset`, leaving the descriptor position alone.
    pub fn write_at(&mut self, offset: usize, bytes: &[u8]) -> bool {
        if self.mode.is_direct() {
            return self.direct_write_at(offset, bytes);
        }
        self.pwrite_all(offset, bytes)
    }

    fn pwrite_all(&mut self, offset: usize, bytes: &[u8]) -> bool {
        let fd = self.fd;
        self.write_all("pwrite", bytes, |done, rest| unsafe {
            libc::pwrite(
                fd,
                rest.as_ptr() as *const libc::c_void,
                rest.len(),
                (offset + done) as libc::off_t,
            ) as isize
        })
    }

    /// Positioned read into `buf`. `Some(0)` is end of file.
    ///
    /// Direct-mode handles read the covering aligned blocks into a bounce
    /// buffer and copy the requested range out.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> Option<usize> {
        if !self.is_ok() {
            return None;
        }
        if !self.mode.is_direct() {
            return match sys::pread(self.fd, buf, offset) {
                Ok(n) => Some(n),
                Err(e) => {
                    self.fail("read", IobError::os("pread", e as i32));
                    None
                }
            };
        }

        let start = sys::align_down(offset, DIRECT_ALIGN);
        let end = sys::align_up(offset + buf.len(), DIRECT_ALIGN);
        let mut bounce = AlignedBuf::new(end - start, DIRECT_ALIGN);
        match sys::pread(self.fd, &mut bounce, start) {
            Ok(n) => {
                let head = offset - start;
                let got = n.saturating_sub(head).min(buf.len());
                buf[..got].copy_from_slice(&bounce[head..head + got]);
                Some(got)
            }
            Err(e) => {
                self.fail("read", IobError::os("pread", e as i32));
                None
            }
        }
    }

    fn direct_append(&mut self, bytes: &[u8]) -> bool {
        let Some(pos) = self.seek(SeekFrom::Current(0)) else {
            return false;
        };
        let pos = pos as usize;
        if !self.direct_write_at(pos, bytes) {
            return false;
        }
        self.seek(SeekFrom::Start((pos + bytes.len()) as u64)).is_some()
    }

    /// Read-modify-write of the aligned blocks covering `offset..offset+len`,
    /// then trim the file back if the last block ran past the new end.
    fn direct_write_at(&mut self, offset: usize, bytes: &[u8]) -> bool {
        if !self.is_ok() {
            return false;
        }
        if bytes.is_empty() {
            return true;
        }

        let old_len = match self.stat_impl() {
            Ok(meta) => meta.len,
            Err(err) => {
                self.fail("stat", err);
                return false;
            }
        };

        let start = sys::align_down(offset, DIRECT_ALIGN);
        let end = sys::align_up(offset + bytes.len(), DIRECT_ALIGN);
        let mut bounce = AlignedBuf::new(end - start, DIRECT_ALIGN);

        if start < old_len {
            if let Err(e) = sys::pread(self.fd, &mut bounce, start) {
                self.fail("read", IobError::os("pread", e as i32));
                return false;
            }
        }
        let head = offset - start;
        bounce[head..head + bytes.len()].copy_from_slice(bytes);

        let saved = self.flush_each_write;
        self.flush_each_write = false;
        let written = self.pwrite_all(start, &bounce);
        self.flush_each_write = saved;
        if !written {
            return false;
        }

        let new_len = old_len.max(offset + bytes.len());
        if end > new_len {
            if let Err(e) =
                sys::retry(|| unsafe { libc::ftruncate(self.fd, new_len as libc::off_t) as isize })
            {
                self.fail("write", IobError::os("ftruncate", e as i32));
                return false;
            }
        }

        if self.flush_each_write {
            return self.fsync();
        }
        true
    }

    /// Loop `write_once(done, remaining)` until everything is written.
    /// Short writes accumulate and `EINTR` retries. A write that makes no
    /// progress, or any other error, fails the handle.
    fn write_all<F>(&mut self, op: &'static str, bytes: &[u8], mut write_once: F) -> bool
    where
        F: FnMut(usize, &[u8]) -> isize,
    {
        if !self.is_ok() {
            return false;
        }

        let mut done = 0;
        while done < bytes.len() {
            match sys::retry(|| write_once(done, &bytes[done..])) {
                Ok(0) => {
                    self.fail("write", IobError::os(op, libc::EIO));
                    return false;
                }
                Ok(n) => done += n,
                Err(e) => {
                    self.fail("write", IobError::os(op, e as i32));
                    return false;
                }
            }
        }

        self.meta.set(None);

        if self.flush_each_write {
            return self.fsync();
        }
        true
    }

    fn fail(&self, what: &str, err: IobError) {
        kerror!("{} {}: {}", what, self.path.display(), sys::describe(&err));
        self.ok.set(false);
        self.last_error.set(Some(err));
    }
}

impl AsRawFd for File {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.unmap();

        if self.fd >= 0 {
            if unsafe { libc::close(self.fd) } < 0 {
                kwarn!("close {}: {}", self.path.display(), nix::errno::Errno::last());
            }
            self.fd = -1;
        }

        if self.unlink_on_drop {
            if let Ok(path) = sys::cpath(&self.path) {
                if unsafe { libc::unlink(path.as_ptr()) } < 0 {
                    kwarn!("unlink {}: {}", self.path.display(), nix::errno::Errno::last());
                }
            }
        }
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("fd", &self.fd)
            .field("mode", &self.mode)
            .field("mapped", &self.mapped_len())
            .field("ok", &self.is_ok())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fixture(dir: &tempfile::TempDir, name: &str, body: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::File::create(&path).unwrap().write_all(body).unwrap();
        path
    }

    #[test]
    fn test_rdonly_maps_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "a", b"mapped bytes");

        let file = File::open(&path, Access::RdOnly);
        assert!(file.is_ok());
        assert_eq!(file.data(), b"mapped bytes");
        assert_eq!(file.len(), 12);
        assert!(file.inode().is_some());
        assert!(!file.is_block_device());
    }

    #[test]
    fn test_rdonly_mapping_is_not_writable() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "ro", b"x");
        let mut file = File::open(&path, Access::RdOnly);
        assert!(file.data_mut().is_none());
    }

    #[test]
    fn test_empty_file_is_ok_without_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "empty", b"");

        let file = File::open(&path, Access::RdWr);
        assert!(file.is_ok());
        assert!(file.data().is_empty());
        assert_eq!(file.mapped_len(), 0);
    }

    #[test]
    fn test_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::open(dir.path().join("missing"), Access::RdOnly);
        assert!(!file.is_ok());
        assert_eq!(file.last_error().and_then(|e| e.errno()), Some(libc::ENOENT));
        assert!(!file.append(b"ignored"));
        assert!(!file.resize(10));
        assert!(file.data().is_empty());
    }

    #[test]
    fn test_info_mode_keeps_no_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "info", b"12345");

        let file = File::info(&path);
        assert!(file.is_ok());
        assert_eq!(file.fd(), -1);
        assert_eq!(file.len(), 5);
        assert!(file.data().is_empty());
    }

    #[test]
    fn test_create_exclusive_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "exists", b"");
        assert!(!File::open(&path, Access::CreateExclusive).is_ok());
        assert!(File::open(dir.path().join("fresh"), Access::CreateExclusive).is_ok());
    }

    #[test]
    fn test_create_uses_requested_perms() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("perms");
        let file = File::open_with_mode_bits(&path, Access::Create, 0o600);
        assert!(file.is_ok());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_create_uses_configured_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("configured");
        let config = RuntimeConfig::new().create_mode(0o640);
        let file = File::open_with_config(&path, Access::Create, &config);
        assert!(file.is_ok());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[test]
    fn test_write_without_progress_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::open(dir.path().join("stuck"), Access::Create);
        assert!(!file.write_all("write", b"abc", |_, _| 0));
        assert!(!file.is_ok());
        assert_eq!(file.last_error().and_then(|e| e.errno()), Some(libc::EIO));
    }

    #[test]
    fn test_append_then_remap() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::open(dir.path().join("log"), Access::Create);
        assert!(file.append(b"first,"));
        assert!(file.append(b"second"));
        assert_eq!(file.len(), 12);
        assert!(file.remap(0));
        assert_eq!(file.data(), b"first,second");

        assert!(file.remap(5));
        assert_eq!(file.data(), b"first");
    }

    #[test]
    fn test_write_at_ignores_position() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::open(dir.path().join("pw"), Access::Create);
        assert!(file.append(b"aaaaaa"));
        assert!(file.write_at(2, b"XY"));
        assert!(file.append(b"!"));
        assert!(file.remap(0));
        assert_eq!(file.data(), b"aaXYaa!");
    }

    #[test]
    fn test_seek_and_read_at() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(&dir, "seek", b"0123456789");
        let mut file = File::open(&path, Access::RdWr);

        assert!(file.seek_to_end());
        assert!(file.append(b"ab"));
        assert_eq!(file.seek(SeekFrom::Current(0)), Some(12));
        assert!(file.seek_to_start());
        assert!(file.append(b"Z"));

        let mut buf = [0u8; 4];
        assert_eq!(file.read_at(9, &mut buf), Some(3));
        assert_eq!(&buf[..3], b"9ab");
        assert_eq!(file.read_at(0, &mut buf[..1]), Some(1));
        assert_eq!(buf[0], b'Z');
    }

    #[test]
    fn test_sync_mode_writes() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = File::open(dir.path().join("sync"), FileMode::new(Access::Create).sync());
        assert!(file.append(b"durable"));
        assert!(file.fsync());
        assert_eq!(std::fs::read(dir.path().join("sync")).unwrap(), b"durable");
    }

    #[test]
    fn test_temporary_unlinks_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("spill.XXXXXX");

        let mut file = File::temporary(&template);
        assert!(file.is_ok());
        let path = file.path().to_path_buf();
        assert_ne!(path, template);
        assert!(path.exists());
        assert!(file.append(b"scratch"));

        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_temporary_rejects_bad_template() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::temporary(dir.path().join("no-placeholder"));
        assert!(!file.is_ok());
        assert!(matches!(file.last_error(), Some(IobError::BadTemplate(_))));
    }

    #[test]
    fn test_msync_without_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let file = File::open(dir.path().join("m"), Access::Create);
        assert!(file.msync());
    }
}
