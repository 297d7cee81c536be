//! Thin syscall helpers shared by files, iterators and the event loop

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;

use iobase_core::error::{IobError, IobResult};
use nix::errno::Errno;

/// Call `f` until it stops failing with `EINTR`.
///
/// `f` returns the raw syscall result (`-1` on failure, errno set).
#[inline]
pub(crate) fn retry<F>(mut f: F) -> Result<usize, Errno>
where
    F: FnMut() -> isize,
{
    loop {
        let ret = f();
        if ret >= 0 {
            return Ok(ret as usize);
        }
        match Errno::last() {
            Errno::EINTR => continue,
            e => return Err(e),
        }
    }
}

/// Positioned read that survives `EINTR`. `Ok(0)` means end of file.
pub(crate) fn pread(fd: RawFd, buf: &mut [u8], offset: usize) -> Result<usize, Errno> {
    retry(|| unsafe {
        libc::pread(
            fd,
            buf.as_mut_ptr() as *mut libc::c_void,
            buf.len(),
            offset as libc::off_t,
        ) as isize
    })
}

/// Buffer, offset and length granularity for direct I/O.
pub(crate) const DIRECT_ALIGN: usize = 4096;

#[inline]
pub(crate) fn align_down(n: usize, align: usize) -> usize {
    n - n % align
}

#[inline]
pub(crate) fn align_up(n: usize, align: usize) -> usize {
    n.div_ceil(align) * align
}

/// Zeroed buffer whose usable window starts on an `align` boundary.
///
/// The backing `Vec` is over-allocated by `align - 1` bytes and never
/// resized, so the window stays put.
pub(crate) struct AlignedBuf {
    buf: Vec<u8>,
    base: usize,
    len: usize,
}

impl AlignedBuf {
    pub(crate) fn new(len: usize, align: usize) -> Self {
        let align = align.max(1);
        let buf = vec![0u8; len + align - 1];
        let addr = buf.as_ptr() as usize;
        let base = (align - addr % align) % align;
        Self { buf, base, len }
    }
}

impl std::ops::Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[self.base..self.base + self.len]
    }
}

impl std::ops::DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf[self.base..self.base + self.len]
    }
}

pub(crate) fn set_nonblock_cloexec(fd: RawFd) -> Result<(), Errno> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(Errno::last());
        }
    }
    set_cloexec(fd)
}

pub(crate) fn set_cloexec(fd: RawFd) -> Result<(), Errno> {
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFD);
        if flags < 0 || libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC) < 0 {
            return Err(Errno::last());
        }
    }
    Ok(())
}

pub(crate) fn cpath(path: &Path) -> IobResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| IobError::BadPath)
}

/// `IobError::Os` for the current errno.
#[inline]
pub(crate) fn last_os(op: &'static str) -> IobError {
    IobError::os(op, Errno::last() as i32)
}

/// Human-readable errno, e.g. "ENOENT: No such file or directory".
pub(crate) fn describe(err: &IobError) -> String {
    match err.errno() {
        Some(errno) => Errno::from_raw(errno).to_string(),
        None => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aligned_buf_window() {
        for len in [1, 100, DIRECT_ALIGN, 3 * DIRECT_ALIGN] {
            let mut buf = AlignedBuf::new(len, DIRECT_ALIGN);
            assert_eq!(buf.len(), len);
            assert_eq!(buf.as_ptr() as usize % DIRECT_ALIGN, 0);
            buf[len - 1] = 7;
            assert!(buf[..len - 1].iter().all(|&b| b == 0));
        }
        assert_eq!(AlignedBuf::new(5, 1).len(), 5);
    }

    #[test]
    fn test_align_helpers() {
        assert_eq!(align_down(4097, 4096), 4096);
        assert_eq!(align_down(4095, 4096), 0);
        assert_eq!(align_up(1, 4096), 4096);
        assert_eq!(align_up(4096, 4096), 4096);
        assert_eq!(align_up(0, 4096), 0);
    }
}
